use crate::models::{Class, Role, User};

use super::EnrollmentError;

/// The user a request acts on behalf of, reduced to what each role may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Student { id: String },
    /// Instructors are matched to classes by display name.
    Instructor { id: String, name: String },
    Admin { id: String },
}

impl Actor {
    pub fn id(&self) -> &str {
        match self {
            Actor::Student { id } | Actor::Instructor { id, .. } | Actor::Admin { id } => id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Actor::Student { .. } => Role::Student,
            Actor::Instructor { .. } => Role::Instructor,
            Actor::Admin { .. } => Role::Admin,
        }
    }

    pub fn student_id(&self) -> Result<&str, EnrollmentError> {
        match self {
            Actor::Student { id } => Ok(id),
            _ => Err(EnrollmentError::unauthorized("only students can do this")),
        }
    }

    pub fn instructor_name(&self) -> Result<&str, EnrollmentError> {
        match self {
            Actor::Instructor { name, .. } => Ok(name),
            _ => Err(EnrollmentError::unauthorized("only instructors can do this")),
        }
    }

    pub fn require_admin(&self) -> Result<(), EnrollmentError> {
        match self {
            Actor::Admin { .. } => Ok(()),
            _ => Err(EnrollmentError::unauthorized("admin role required")),
        }
    }

    pub fn require_instructor_of(&self, class: &Class) -> Result<(), EnrollmentError> {
        let name = self.instructor_name()?;
        if name == class.instructor {
            Ok(())
        } else {
            Err(EnrollmentError::unauthorized(format!(
                "{} is not the instructor of class {}",
                name, class.class_id
            )))
        }
    }

    pub fn require_admin_or_instructor_of(&self, class: &Class) -> Result<(), EnrollmentError> {
        match self {
            Actor::Admin { .. } => Ok(()),
            _ => self.require_instructor_of(class),
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        match user.role {
            Role::Student => Actor::Student {
                id: user.id.clone(),
            },
            Role::Instructor => Actor::Instructor {
                id: user.id.clone(),
                name: user.name.clone(),
            },
            Role::Admin => Actor::Admin {
                id: user.id.clone(),
            },
        }
    }
}
