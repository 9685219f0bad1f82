use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::db::repository;
use crate::enrollment::{self, Actor, EnrollmentError, Missing, prerequisites};
use crate::error::AppError;
use crate::models::{
    Class, ClassStatus, Completion, Course, CourseStatus, LoginRequest, NewClassRequest,
    NewCourseRequest, NewUserRequest, Registration, RegistrationStatus, UpdateCourseRequest, User,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CourseOrder {
    #[default]
    Code,
    PrerequisiteDepth,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CourseQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub order: CourseOrder,
}

/// Catalog listing as the actor is allowed to see it. Instructors only get
/// courses they teach a class of.
pub fn search(courses: Vec<Course>, actor: &Actor, query: &CourseQuery) -> Vec<Course> {
    let term = query
        .q
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .unwrap_or_default();
    let category = query
        .category
        .as_deref()
        .map(str::to_lowercase)
        .filter(|c| c != "all");

    let depth_order = query.order == CourseOrder::PrerequisiteDepth;
    let depths: Vec<(String, usize)> = if depth_order {
        let graph = prerequisites::prerequisite_graph(&courses);
        courses
            .iter()
            .map(|c| (c.code.clone(), prerequisites::chain_length(&c.code, &graph)))
            .collect()
    } else {
        Vec::new()
    };

    let mut found: Vec<Course> = courses
        .into_iter()
        .filter(|c| {
            term.is_empty()
                || c.name.to_lowercase().contains(&term)
                || c.code.to_lowercase().contains(&term)
                || c.category.to_lowercase().contains(&term)
        })
        .filter(|c| {
            category
                .as_deref()
                .is_none_or(|cat| c.category.to_lowercase() == cat)
        })
        .filter(|c| match actor {
            Actor::Instructor { name, .. } => c.taught_by(name),
            _ => true,
        })
        .collect();

    if depth_order {
        let depth_of = |code: &str| {
            depths
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, d)| *d)
                .unwrap_or(0)
        };
        found.sort_by(|a, b| {
            depth_of(&a.code)
                .cmp(&depth_of(&b.code))
                .then_with(|| a.code.cmp(&b.code))
        });
    } else {
        found.sort_by(|a, b| a.code.cmp(&b.code));
    }

    found
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    pub code: String,
    pub name: String,
    pub description: String,
    pub class_id: String,
    pub instructor: String,
    pub schedule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearningPath {
    pub completed: Vec<Completion>,
    pub in_progress: Vec<PathEntry>,
    pub pending: Vec<PathEntry>,
}

pub fn learning_path(student: &User, courses: &[Course]) -> LearningPath {
    let mut in_progress = Vec::new();
    let mut pending = Vec::new();

    for course in courses {
        for class in &course.classes {
            let Some(registration) = class.registration(&student.id) else {
                continue;
            };
            let entry = PathEntry {
                code: course.code.clone(),
                name: course.name.clone(),
                description: course.description.clone(),
                class_id: class.class_id.clone(),
                instructor: class.instructor.clone(),
                schedule: class.schedule.clone(),
            };
            match registration.status {
                RegistrationStatus::Approved => in_progress.push(entry),
                RegistrationStatus::Pending => pending.push(entry),
            }
        }
    }

    LearningPath {
        completed: student.completed_courses.clone(),
        in_progress,
        pending,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructorClass {
    pub course_code: String,
    pub course_name: String,
    pub class_id: String,
    pub schedule: String,
    pub capacity: u32,
    pub status: ClassStatus,
    pub to_grade: Vec<Registration>,
    pub awaiting_approval: usize,
}

/// Classes of `instructor` that still need grading.
pub fn instructor_classes(instructor: &str, courses: &[Course]) -> Vec<InstructorClass> {
    courses
        .iter()
        .flat_map(|course| {
            course
                .classes
                .iter()
                .filter(|c| {
                    c.instructor == instructor
                        && c.status != ClassStatus::Cancelled
                        && !c.grading_complete
                })
                .map(move |class| InstructorClass {
                    course_code: course.code.clone(),
                    course_name: course.name.clone(),
                    class_id: class.class_id.clone(),
                    schedule: class.schedule.clone(),
                    capacity: class.capacity,
                    status: class.status,
                    to_grade: class
                        .registered_students
                        .iter()
                        .filter(|r| r.status == RegistrationStatus::Approved)
                        .cloned()
                        .collect(),
                    awaiting_approval: class
                        .registered_students
                        .iter()
                        .filter(|r| r.status == RegistrationStatus::Pending)
                        .count(),
                })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleSlot {
    pub time: String,
    pub course_name: String,
    pub instructor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleDay {
    pub day: String,
    pub slots: Vec<ScheduleSlot>,
}

/// Week view of open courses. Schedules look like `"Mon/Wed 10:00-11:15"`;
/// anything without a time part is left out.
pub fn weekly_schedule(courses: &[Course]) -> Vec<ScheduleDay> {
    let mut days: Vec<ScheduleDay> = Vec::new();

    for course in courses.iter().filter(|c| c.status == CourseStatus::Open) {
        for class in &course.classes {
            let Some((day_list, time)) = class.schedule.trim().split_once(char::is_whitespace) else {
                continue;
            };
            for day in day_list.split('/').map(str::trim).filter(|d| !d.is_empty()) {
                let slot = ScheduleSlot {
                    time: time.trim().to_string(),
                    course_name: course.name.clone(),
                    instructor: class.instructor.clone(),
                };
                match days.iter_mut().find(|d| d.day == day) {
                    Some(existing) => existing.slots.push(slot),
                    None => days.push(ScheduleDay {
                        day: day.to_string(),
                        slots: vec![slot],
                    }),
                }
            }
        }
    }

    days
}

fn required(field: &str, value: &str) -> Result<String, EnrollmentError> {
    let value = value.trim();
    if value.is_empty() {
        Err(EnrollmentError::Validation(format!("{} is required", field)))
    } else {
        Ok(value.to_string())
    }
}

/// Passwords are stored exactly as given.
fn secret(value: &str) -> Result<String, EnrollmentError> {
    if value.is_empty() {
        Err(EnrollmentError::Validation("password is required".to_string()))
    } else {
        Ok(value.to_string())
    }
}

pub fn new_class(req: NewClassRequest) -> Result<Class, EnrollmentError> {
    if req.capacity == 0 {
        return Err(EnrollmentError::Validation(
            "capacity must be greater than zero".to_string(),
        ));
    }

    Ok(Class {
        class_id: required("class_id", &req.class_id)?,
        instructor: required("instructor", &req.instructor)?,
        schedule: required("schedule", &req.schedule)?,
        capacity: req.capacity,
        status: ClassStatus::Pending,
        registered_students: Vec::new(),
        grading_complete: false,
    })
}

pub fn new_course(req: NewCourseRequest) -> Result<Course, EnrollmentError> {
    let mut prerequisites: Vec<String> = Vec::new();
    for code in req.prerequisites.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        if !prerequisites.iter().any(|p| p == code) {
            prerequisites.push(code.to_string());
        }
    }

    Ok(Course {
        code: required("code", &req.code)?,
        name: required("name", &req.name)?,
        category: required("category", &req.category)?,
        description: required("description", &req.description)?,
        prerequisites,
        status: req.status.unwrap_or(CourseStatus::Draft),
        classes: vec![new_class(req.class)?],
    })
}

fn unique_violation(err: sqlx::Error, msg: String) -> AppError {
    let duplicate = matches!(&err, sqlx::Error::Database(db_err) if db_err.is_unique_violation());
    if duplicate {
        AppError::Conflict(msg)
    } else {
        AppError::Database(err)
    }
}

pub async fn create_course(
    db: &SqlitePool,
    actor: &Actor,
    req: NewCourseRequest,
) -> Result<Course, AppError> {
    actor.require_admin()?;
    let course = new_course(req)?;

    if repository::find_course(db, &course.code).await?.is_some() {
        return Err(AppError::Conflict(format!(
            "A course with code {} already exists",
            course.code
        )));
    }

    let mut tx = db.begin().await?;
    repository::insert_course(&mut tx, &course)
        .await
        .map_err(|e| unique_violation(e, format!("A course with code {} already exists", course.code)))?;
    tx.commit().await?;

    info!(course = %course.code, status = %course.status, "course created");
    Ok(course)
}

pub async fn add_class(
    db: &SqlitePool,
    actor: &Actor,
    course_code: &str,
    req: NewClassRequest,
) -> Result<Class, AppError> {
    actor.require_admin()?;
    let class = new_class(req)?;
    let course = repository::find_course(db, course_code)
        .await?
        .ok_or_else(|| EnrollmentError::NotFound(Missing::Course(course_code.to_string())))?;

    if course.class(&class.class_id).is_some() {
        return Err(AppError::Conflict(format!(
            "Class {} already exists in {}",
            class.class_id, course_code
        )));
    }

    let mut conn = db.acquire().await?;
    repository::insert_class(&mut conn, course_code, course.classes.len(), &class)
        .await
        .map_err(|e| {
            unique_violation(
                e,
                format!("Class {} already exists in {}", class.class_id, course_code),
            )
        })?;

    info!(course = course_code, class = %class.class_id, "class added");
    Ok(class)
}

pub async fn set_course_status(
    db: &SqlitePool,
    actor: &Actor,
    course_code: &str,
    status: CourseStatus,
) -> Result<Course, AppError> {
    let mut course = repository::find_course(db, course_code)
        .await?
        .ok_or_else(|| EnrollmentError::NotFound(Missing::Course(course_code.to_string())))?;
    enrollment::set_course_status(actor, &mut course, status)?;

    if !repository::update_course_status(db, course_code, status).await? {
        return Err(AppError::NotFound);
    }
    info!(course = course_code, status = %status, "course status changed");
    Ok(course)
}

/// Applies the fields present in `req`. Classes and status are not touched.
pub fn apply_course_update(course: &mut Course, req: UpdateCourseRequest) -> Result<(), EnrollmentError> {
    if let Some(name) = req.name {
        course.name = required("name", &name)?;
    }
    if let Some(category) = req.category {
        course.category = required("category", &category)?;
    }
    if let Some(description) = req.description {
        course.description = required("description", &description)?;
    }
    if let Some(prerequisites) = req.prerequisites {
        let mut unique: Vec<String> = Vec::new();
        for code in prerequisites.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            if code == course.code {
                return Err(EnrollmentError::Validation(format!(
                    "{} cannot be its own prerequisite",
                    code
                )));
            }
            if !unique.iter().any(|p| p == code) {
                unique.push(code.to_string());
            }
        }
        course.prerequisites = unique;
    }
    Ok(())
}

pub async fn update_course(
    db: &SqlitePool,
    actor: &Actor,
    course_code: &str,
    req: UpdateCourseRequest,
) -> Result<Course, AppError> {
    actor.require_admin()?;
    let mut course = repository::find_course(db, course_code)
        .await?
        .ok_or_else(|| EnrollmentError::NotFound(Missing::Course(course_code.to_string())))?;
    apply_course_update(&mut course, req)?;

    let mut conn = db.acquire().await?;
    if !repository::update_course(&mut conn, &course).await? {
        return Err(EnrollmentError::NotFound(Missing::Course(course_code.to_string())).into());
    }

    info!(course = course_code, "course updated");
    Ok(course)
}

pub async fn delete_course(db: &SqlitePool, actor: &Actor, course_code: &str) -> Result<(), AppError> {
    actor.require_admin()?;
    if !repository::delete_course(db, course_code).await? {
        return Err(EnrollmentError::NotFound(Missing::Course(course_code.to_string())).into());
    }

    info!(course = course_code, "course deleted");
    Ok(())
}

/// Opens the selected draft courses. Selected courses that are not drafts
/// are left as they are.
pub async fn publish(
    db: &SqlitePool,
    actor: &Actor,
    codes: &[String],
) -> Result<Vec<String>, AppError> {
    actor.require_admin()?;
    let courses = repository::fetch_courses(db).await?;

    if let Some(unknown) = codes.iter().find(|code| !courses.iter().any(|c| &c.code == *code)) {
        return Err(EnrollmentError::NotFound(Missing::Course(unknown.clone())).into());
    }

    let mut published = Vec::new();
    for mut course in courses
        .into_iter()
        .filter(|c| c.status == CourseStatus::Draft && codes.contains(&c.code))
    {
        enrollment::set_course_status(actor, &mut course, CourseStatus::Open)?;
        repository::update_course_status(db, &course.code, course.status).await?;
        published.push(course.code);
    }

    info!(count = published.len(), "courses published");
    Ok(published)
}

pub async fn create_user(
    db: &SqlitePool,
    actor: &Actor,
    req: NewUserRequest,
) -> Result<User, AppError> {
    actor.require_admin()?;
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: required("username", &req.username)?,
        password: secret(&req.password)?,
        name: required("name", &req.name)?,
        role: req.role,
        completed_courses: Vec::new(),
        expertise: req.expertise,
    };

    let mut conn = db.acquire().await?;
    repository::insert_user(&mut conn, &user)
        .await
        .map_err(|e| unique_violation(e, format!("Username {} is taken", user.username)))?;

    info!(user = %user.id, role = %user.role, "user created");
    Ok(user)
}

pub async fn login(db: &SqlitePool, req: LoginRequest) -> Result<User, AppError> {
    let username = req.username.trim();
    let password = req.password.as_str();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Please enter both username and password".to_string(),
        ));
    }

    match repository::find_user_by_username(db, username).await? {
        Some(user) if user.password == password => Ok(user),
        _ => Err(AppError::Unauthorized("Invalid username or password".to_string())),
    }
}

pub async fn set_interest(
    db: &SqlitePool,
    actor: &Actor,
    course_code: &str,
    interested: bool,
) -> Result<bool, AppError> {
    actor.instructor_name()?;
    if repository::find_course(db, course_code).await?.is_none() {
        return Err(EnrollmentError::NotFound(Missing::Course(course_code.to_string())).into());
    }

    let changed = if interested {
        repository::add_interest(db, actor.id(), course_code).await?
    } else {
        repository::remove_interest(db, actor.id(), course_code).await?
    };
    Ok(changed)
}
