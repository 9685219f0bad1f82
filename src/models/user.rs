use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Grade, ParseEnumError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(ParseEnumError::new("role", other)),
        }
    }
}

/// A course the student finished with a passing grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub grade: Grade,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default, alias = "completedCourses")]
    pub completed_courses: Vec<Completion>,
    #[serde(default)]
    pub expertise: Vec<String>,
}

impl User {
    pub fn has_completed(&self, code: &str) -> bool {
        self.completed_courses.iter().any(|c| c.code == code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserRequest {
    pub username: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub expertise: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}
