use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Draft,
    Open,
    Validated,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassStatus {
    #[default]
    Pending,
    Validated,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    #[default]
    Pending,
    Approved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn is_passing(&self) -> bool {
        !matches!(self, Grade::F)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl FromStr for Grade {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "F" => Ok(Grade::F),
            _ => Err(ParseEnumError::new("grade", s)),
        }
    }
}

macro_rules! text_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ParseEnumError::new($label, other)),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(CourseStatus, "course status", {
    Draft => "draft",
    Open => "open",
    Validated => "validated",
    Cancelled => "cancelled",
});

text_enum!(ClassStatus, "class status", {
    Pending => "pending",
    Validated => "validated",
    Cancelled => "cancelled",
});

text_enum!(RegistrationStatus, "registration status", {
    Pending => "pending",
    Approved => "approved",
});

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student's seat in a class.
///
/// Older data stores a roster as a bare list of student ids; those entries
/// deserialize as already approved registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RegistrationRepr")]
pub struct Registration {
    pub student_id: String,
    pub status: RegistrationStatus,
    pub grade: Option<Grade>,
}

impl Registration {
    pub fn pending(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            status: RegistrationStatus::Pending,
            grade: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistrationRepr {
    StudentId(String),
    Full {
        #[serde(alias = "studentId")]
        student_id: String,
        #[serde(default)]
        status: RegistrationStatus,
        #[serde(default)]
        grade: Option<Grade>,
    },
}

impl From<RegistrationRepr> for Registration {
    fn from(repr: RegistrationRepr) -> Self {
        match repr {
            RegistrationRepr::StudentId(student_id) => Registration {
                student_id,
                status: RegistrationStatus::Approved,
                grade: None,
            },
            RegistrationRepr::Full {
                student_id,
                status,
                grade,
            } => Registration {
                student_id,
                status,
                grade,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    #[serde(alias = "classId")]
    pub class_id: String,
    pub instructor: String,
    pub schedule: String,
    pub capacity: u32,
    #[serde(default)]
    pub status: ClassStatus,
    #[serde(default, alias = "registeredStudents")]
    pub registered_students: Vec<Registration>,
    #[serde(default, alias = "gradingComplete")]
    pub grading_complete: bool,
}

impl Class {
    pub fn registration(&self, student_id: &str) -> Option<&Registration> {
        self.registered_students
            .iter()
            .find(|r| r.student_id == student_id)
    }

    pub fn is_full(&self) -> bool {
        self.registered_students.len() >= self.capacity as usize
    }

    pub fn seats_left(&self) -> u32 {
        self.capacity
            .saturating_sub(self.registered_students.len() as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub name: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub status: CourseStatus,
    #[serde(default)]
    pub classes: Vec<Class>,
}

impl Course {
    pub fn class(&self, class_id: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.class_id == class_id)
    }

    pub fn taught_by(&self, instructor: &str) -> bool {
        self.classes.iter().any(|c| c.instructor == instructor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClassRequest {
    pub class_id: String,
    pub instructor: String,
    pub schedule: String,
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourseRequest {
    pub code: String,
    pub name: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub status: Option<CourseStatus>,
    pub class: NewClassRequest,
}

/// Partial edit of a course. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCourseRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub prerequisites: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignInstructorRequest {
    pub instructor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCourseStatusRequest {
    pub status: CourseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishCoursesRequest {
    pub codes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub grade: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_parsing_is_lenient() {
        assert_eq!(" b ".parse::<Grade>().unwrap(), Grade::B);
        assert_eq!("f".parse::<Grade>().unwrap(), Grade::F);
        assert!("E".parse::<Grade>().is_err());
        assert!("".parse::<Grade>().is_err());
        assert!(!Grade::F.is_passing());
        assert!(Grade::D.is_passing());
    }

    #[test]
    fn test_legacy_roster_is_normalized() {
        let class: Class = serde_json::from_value(serde_json::json!({
            "classId": "C1",
            "instructor": "Dr. Smith",
            "schedule": "Mon/Wed 10:00-11:15",
            "capacity": 30,
            "registeredStudents": ["s1", { "studentId": "s2", "status": "pending" }]
        }))
        .unwrap();

        assert_eq!(class.status, ClassStatus::Pending);
        assert_eq!(class.registered_students.len(), 2);
        assert_eq!(class.registered_students[0].student_id, "s1");
        assert_eq!(class.registered_students[0].status, RegistrationStatus::Approved);
        assert_eq!(class.registered_students[1].status, RegistrationStatus::Pending);
        assert!(!class.grading_complete);
    }

    #[test]
    fn test_course_status_text() {
        assert_eq!("open".parse::<CourseStatus>().unwrap(), CourseStatus::Open);
        assert_eq!(CourseStatus::Cancelled.to_string(), "cancelled");
        assert!("Open".parse::<CourseStatus>().is_err());
    }
}
