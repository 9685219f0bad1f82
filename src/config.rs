use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::enrollment::Policy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub seed_file: Option<PathBuf>,
    pub policy: Policy,
    /// Courses a student must have passed to count as having finished the core.
    pub core_courses: Vec<String>,
}

pub const DEFAULT_CORE_COURSES: &[&str] = &["CMPS151", "CMPS251", "CMPS350"];

impl AppConfig {
    pub fn new_from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://registrar.db".to_string());
        let bind_addr = parse_var("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?;
        let seed_file = env::var("SEED_FILE").ok().map(PathBuf::from);

        let defaults = Policy::default();
        let policy = Policy {
            min_registrations_to_validate: parse_var(
                "MIN_REGISTRATIONS_TO_VALIDATE",
                defaults.min_registrations_to_validate,
            )?,
            revoke_completions_on_cancel: parse_var(
                "REVOKE_COMPLETIONS_ON_CANCEL",
                defaults.revoke_completions_on_cancel,
            )?,
        };

        let core_courses = match env::var("CORE_COURSES") {
            Ok(list) => split_list(&list),
            Err(_) => DEFAULT_CORE_COURSES.iter().map(|c| c.to_string()).collect(),
        };

        Ok(Self {
            database_url,
            bind_addr,
            seed_file,
            policy,
            core_courses,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}
