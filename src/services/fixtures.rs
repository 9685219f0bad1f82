use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use crate::db::repository;
use crate::models::{Course, User};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse fixture file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Initial data set: the user directory and the course catalog.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub users: usize,
    pub courses: usize,
}

pub async fn load_file(path: &Path) -> Result<Fixture, FixtureError> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

/// Loads `fixture` into a database that has no users and no courses yet.
/// Returns `None` when there was already data.
pub async fn import(db: &SqlitePool, fixture: &Fixture) -> Result<Option<ImportStats>, FixtureError> {
    if !repository::is_empty(db).await? {
        info!("database already populated, skipping fixture import");
        return Ok(None);
    }

    let mut tx = db.begin().await?;
    for user in &fixture.users {
        repository::insert_user(&mut tx, user).await?;
    }
    for course in &fixture.courses {
        repository::insert_course(&mut tx, course).await?;
    }
    tx.commit().await?;

    let stats = ImportStats {
        users: fixture.users.len(),
        courses: fixture.courses.len(),
    };
    info!(users = stats.users, courses = stats.courses, "fixture imported");
    Ok(Some(stats))
}
