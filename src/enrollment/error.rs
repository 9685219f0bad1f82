use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrollmentError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{0}")]
    PreconditionFailed(#[from] Precondition),

    #[error("{0} not found")]
    NotFound(Missing),

    #[error("Not authorized: {0}")]
    AuthorizationFailed(String),
}

impl EnrollmentError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        EnrollmentError::AuthorizationFailed(msg.into())
    }
}

/// Reason a transition was refused. Nothing is mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Precondition {
    #[error("Missing prerequisites: {}", missing.join(", "))]
    PrerequisiteMissing { missing: Vec<String> },

    #[error("Class is full")]
    ClassFull,

    #[error("Already registered for this class")]
    AlreadyRegistered,

    #[error("Class is closed")]
    ClassClosed,

    #[error("Course is not open for registration")]
    CourseNotOpen,

    #[error("Registration is not pending")]
    NotPending,

    #[error("Registration is not approved")]
    NotApproved,

    #[error("Requires at least {required} registrations (currently {registered})")]
    InsufficientRegistrations { required: usize, registered: usize },
}

impl Precondition {
    pub fn code(&self) -> &'static str {
        match self {
            Precondition::PrerequisiteMissing { .. } => "prerequisite_missing",
            Precondition::ClassFull => "class_full",
            Precondition::AlreadyRegistered => "already_registered",
            Precondition::ClassClosed => "class_closed",
            Precondition::CourseNotOpen => "course_not_open",
            Precondition::NotPending => "not_pending",
            Precondition::NotApproved => "not_approved",
            Precondition::InsufficientRegistrations { .. } => "insufficient_registrations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Missing {
    #[error("Course {0}")]
    Course(String),

    #[error("Class {0}")]
    Class(String),

    #[error("User {0}")]
    User(String),

    #[error("Registration for {0}")]
    Registration(String),
}
