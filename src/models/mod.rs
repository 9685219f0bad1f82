pub mod course;
pub mod user;

use thiserror::Error;

pub use course::{
    AssignInstructorRequest, Class, ClassStatus, Course, CourseStatus, Grade, GradeRequest,
    NewClassRequest, NewCourseRequest, PublishCoursesRequest, Registration, RegistrationStatus,
    UpdateCourseRequest, UpdateCourseStatusRequest,
};
pub use user::{Completion, LoginRequest, NewUserRequest, Role, User};

#[derive(Debug, Error)]
#[error("invalid {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
