//! Registration lifecycle for a single (course, class, student) triple.
//!
//! Every transition validates the whole snapshot before touching it, so an
//! `Err` always leaves the course and users exactly as they were passed in.

pub mod actor;
pub mod error;
pub mod prerequisites;

use serde::Serialize;

use crate::models::{
    Class, ClassStatus, Completion, Course, CourseStatus, Grade, Registration,
    RegistrationStatus, Role, User,
};

pub use actor::Actor;
pub use error::{EnrollmentError, Missing, Precondition};

/// Knobs that changed between deployments of the registration office.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Registrations a class needs before an admin may validate it.
    pub min_registrations_to_validate: usize,
    /// Cancelling a class strips the course from every user's completions.
    pub revoke_completions_on_cancel: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_registrations_to_validate: 1,
            revoke_completions_on_cancel: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub newly_validated: bool,
    pub approved: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancellationOutcome {
    pub removed_registrations: Vec<String>,
    pub revoked_completions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GradeOutcome {
    pub student_id: String,
    pub grade: Grade,
    pub completion_recorded: bool,
    pub grading_complete: bool,
}

fn class_index(course: &Course, class_id: &str) -> Result<usize, EnrollmentError> {
    course
        .classes
        .iter()
        .position(|c| c.class_id == class_id)
        .ok_or_else(|| EnrollmentError::NotFound(Missing::Class(class_id.to_string())))
}

fn registration_index(class: &Class, student_id: &str) -> Result<usize, EnrollmentError> {
    class
        .registered_students
        .iter()
        .position(|r| r.student_id == student_id)
        .ok_or_else(|| EnrollmentError::NotFound(Missing::Registration(student_id.to_string())))
}

/// Unregistered -> Pending.
pub fn register<'c>(
    actor: &Actor,
    student: &User,
    course: &'c mut Course,
    class_id: &str,
) -> Result<&'c Registration, EnrollmentError> {
    if actor.student_id()? != student.id {
        return Err(EnrollmentError::unauthorized(
            "students can only register themselves",
        ));
    }

    let idx = class_index(course, class_id)?;
    let class = &course.classes[idx];

    if course.status != CourseStatus::Open {
        return Err(Precondition::CourseNotOpen.into());
    }
    if class.status == ClassStatus::Cancelled {
        return Err(Precondition::ClassClosed.into());
    }
    if class.registration(&student.id).is_some() {
        return Err(Precondition::AlreadyRegistered.into());
    }
    let missing = prerequisites::missing_prerequisites(course, student);
    if !missing.is_empty() {
        return Err(Precondition::PrerequisiteMissing { missing }.into());
    }
    if class.is_full() {
        return Err(Precondition::ClassFull.into());
    }

    let roster = &mut course.classes[idx].registered_students;
    roster.push(Registration::pending(student.id.clone()));
    Ok(&roster[roster.len() - 1])
}

/// Pending -> Unregistered. Approved seats cannot be given back.
pub fn cancel_registration(
    actor: &Actor,
    course: &mut Course,
    class_id: &str,
) -> Result<Registration, EnrollmentError> {
    let student_id = actor.student_id()?;
    let idx = class_index(course, class_id)?;
    let class = &mut course.classes[idx];
    let pos = registration_index(class, student_id)?;

    if class.registered_students[pos].status != RegistrationStatus::Pending {
        return Err(Precondition::NotPending.into());
    }

    Ok(class.registered_students.remove(pos))
}

/// Pending -> Approved for one student.
pub fn approve(
    actor: &Actor,
    course: &mut Course,
    class_id: &str,
    student_id: &str,
) -> Result<(), EnrollmentError> {
    let idx = class_index(course, class_id)?;
    let class = &mut course.classes[idx];
    actor.require_admin_or_instructor_of(class)?;

    if class.status == ClassStatus::Cancelled {
        return Err(Precondition::ClassClosed.into());
    }
    let pos = registration_index(class, student_id)?;
    let registration = &mut class.registered_students[pos];
    if registration.status != RegistrationStatus::Pending {
        return Err(Precondition::NotPending.into());
    }

    registration.status = RegistrationStatus::Approved;
    Ok(())
}

/// Admin sign-off on a class: pending -> validated, approving every pending
/// registration. A second validation changes nothing.
pub fn validate_class(
    actor: &Actor,
    policy: &Policy,
    course: &mut Course,
    class_id: &str,
) -> Result<ValidationOutcome, EnrollmentError> {
    actor.require_admin()?;
    let idx = class_index(course, class_id)?;
    let class = &mut course.classes[idx];

    match class.status {
        ClassStatus::Cancelled => return Err(Precondition::ClassClosed.into()),
        ClassStatus::Validated => {
            return Ok(ValidationOutcome {
                newly_validated: false,
                approved: vec![],
            });
        }
        ClassStatus::Pending => {}
    }

    let registered = class.registered_students.len();
    if registered < policy.min_registrations_to_validate {
        return Err(Precondition::InsufficientRegistrations {
            required: policy.min_registrations_to_validate,
            registered,
        }
        .into());
    }

    class.status = ClassStatus::Validated;
    let approved = class
        .registered_students
        .iter_mut()
        .filter(|r| r.status == RegistrationStatus::Pending)
        .map(|r| {
            r.status = RegistrationStatus::Approved;
            r.student_id.clone()
        })
        .collect();

    Ok(ValidationOutcome {
        newly_validated: true,
        approved,
    })
}

/// Terminal cancellation of a class.
///
/// With `revoke_completions_on_cancel` set, every user in `users` loses their
/// completion of this course, whichever class they took it in.
pub fn cancel_class(
    actor: &Actor,
    policy: &Policy,
    course: &mut Course,
    class_id: &str,
    users: &mut [User],
) -> Result<CancellationOutcome, EnrollmentError> {
    actor.require_admin()?;
    let idx = class_index(course, class_id)?;
    if course.classes[idx].status == ClassStatus::Cancelled {
        return Err(Precondition::ClassClosed.into());
    }

    let class = &mut course.classes[idx];
    class.status = ClassStatus::Cancelled;
    let removed_registrations = std::mem::take(&mut class.registered_students)
        .into_iter()
        .map(|r| r.student_id)
        .collect();

    let mut revoked_completions = Vec::new();
    if policy.revoke_completions_on_cancel {
        for user in users.iter_mut() {
            let before = user.completed_courses.len();
            user.completed_courses.retain(|c| c.code != course.code);
            if user.completed_courses.len() != before {
                revoked_completions.push(user.id.clone());
            }
        }
    }

    Ok(CancellationOutcome {
        removed_registrations,
        revoked_completions,
    })
}

/// Approved -> graded. The registration leaves the roster; a passing grade is
/// written to the student's completions, replacing any earlier grade.
pub fn submit_grade(
    actor: &Actor,
    course: &mut Course,
    class_id: &str,
    student: &mut User,
    grade: Grade,
) -> Result<GradeOutcome, EnrollmentError> {
    let idx = class_index(course, class_id)?;
    actor.require_instructor_of(&course.classes[idx])?;

    let class = &mut course.classes[idx];
    let pos = registration_index(class, &student.id)?;
    if class.registered_students[pos].status != RegistrationStatus::Approved {
        return Err(Precondition::NotApproved.into());
    }

    class.registered_students.remove(pos);
    if class.registered_students.is_empty() {
        class.grading_complete = true;
    }
    let grading_complete = class.grading_complete;

    let completion_recorded = grade.is_passing();
    if completion_recorded {
        match student
            .completed_courses
            .iter_mut()
            .find(|c| c.code == course.code)
        {
            Some(existing) => existing.grade = grade,
            None => student.completed_courses.push(Completion {
                code: course.code.clone(),
                name: course.name.clone(),
                grade,
                description: course.description.clone(),
            }),
        }
    }

    Ok(GradeOutcome {
        student_id: student.id.clone(),
        grade,
        completion_recorded,
        grading_complete,
    })
}

/// Admin publish action. Does not touch class statuses.
pub fn set_course_status(
    actor: &Actor,
    course: &mut Course,
    status: CourseStatus,
) -> Result<(), EnrollmentError> {
    actor.require_admin()?;
    course.status = status;
    Ok(())
}

/// Hands a class to another instructor, who from then on approves and grades
/// its roster. Returns the previous instructor's name.
pub fn assign_instructor(
    actor: &Actor,
    course: &mut Course,
    class_id: &str,
    instructor: &User,
) -> Result<String, EnrollmentError> {
    actor.require_admin()?;
    if instructor.role != Role::Instructor {
        return Err(EnrollmentError::Validation(format!(
            "{} is not an instructor",
            instructor.id
        )));
    }

    let idx = class_index(course, class_id)?;
    let class = &mut course.classes[idx];
    if class.status == ClassStatus::Cancelled {
        return Err(Precondition::ClassClosed.into());
    }

    Ok(std::mem::replace(&mut class.instructor, instructor.name.clone()))
}
