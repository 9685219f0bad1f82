use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::repository;
use crate::enrollment::Actor;
use crate::error::AppError;
use crate::models::{ClassStatus, Course, Role, User};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Count {
    pub key: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRate {
    pub code: String,
    pub name: String,
    pub completed: usize,
    pub registered: usize,
    /// `completed / registered`, 0 when nobody is registered.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentSummary {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub users_by_role: Vec<Count>,
    pub students_per_course: Vec<Count>,
    pub classes_per_instructor: Vec<Count>,
    pub completion_rates: Vec<CompletionRate>,
    pub most_completed_courses: Vec<Count>,
    pub active_classes: usize,
    pub courses_by_status: Vec<Count>,
    pub instructor_interest: Vec<Count>,
    pub average_prerequisites: f64,
    pub completed_core_courses: Vec<StudentSummary>,
}

fn counts(map: BTreeMap<String, usize>) -> Vec<Count> {
    map.into_iter()
        .map(|(key, count)| Count { key, count })
        .collect()
}

pub fn compute(
    users: &[User],
    courses: &[Course],
    interest: Vec<(String, i64)>,
    top: usize,
    core_courses: &[String],
) -> Statistics {
    let mut by_role = BTreeMap::new();
    for user in users {
        *by_role.entry(user.role.to_string()).or_insert(0) += 1;
    }

    let mut completions = BTreeMap::new();
    for completion in users.iter().flat_map(|u| &u.completed_courses) {
        *completions.entry(completion.code.clone()).or_insert(0) += 1;
    }
    let completion_rates = courses
        .iter()
        .map(|course| {
            let completed = completions.get(&course.code).copied().unwrap_or(0);
            let registered: usize = course
                .classes
                .iter()
                .map(|c| c.registered_students.len())
                .sum();
            CompletionRate {
                code: course.code.clone(),
                name: course.name.clone(),
                completed,
                registered,
                completion_rate: if registered == 0 {
                    0.0
                } else {
                    completed as f64 / registered as f64
                },
            }
        })
        .collect();

    let completed_core_courses = users
        .iter()
        .filter(|u| u.role == Role::Student && !core_courses.is_empty())
        .filter(|u| core_courses.iter().all(|code| u.has_completed(code)))
        .map(|u| StudentSummary {
            id: u.id.clone(),
            name: u.name.clone(),
            username: u.username.clone(),
        })
        .collect();

    let mut most_completed = counts(completions);
    most_completed.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    most_completed.truncate(top);

    let mut by_instructor = BTreeMap::new();
    let mut by_status = BTreeMap::new();
    let mut per_course = BTreeMap::new();
    let mut active_classes = 0;
    for course in courses {
        *by_status.entry(course.status.to_string()).or_insert(0) += 1;
        per_course.insert(
            course.code.clone(),
            course
                .classes
                .iter()
                .map(|c| c.registered_students.len())
                .sum(),
        );
        for class in &course.classes {
            *by_instructor.entry(class.instructor.clone()).or_insert(0) += 1;
            if class.status != ClassStatus::Cancelled && !class.grading_complete {
                active_classes += 1;
            }
        }
    }

    let average_prerequisites = if courses.is_empty() {
        0.0
    } else {
        let total: usize = courses.iter().map(|c| c.prerequisites.len()).sum();
        total as f64 / courses.len() as f64
    };

    Statistics {
        users_by_role: counts(by_role),
        students_per_course: counts(per_course),
        classes_per_instructor: counts(by_instructor),
        completion_rates,
        most_completed_courses: most_completed,
        active_classes,
        courses_by_status: counts(by_status),
        instructor_interest: interest
            .into_iter()
            .map(|(key, count)| Count {
                key,
                count: usize::try_from(count).unwrap_or(0),
            })
            .collect(),
        average_prerequisites,
        completed_core_courses,
    }
}

pub async fn collect(
    db: &SqlitePool,
    actor: &Actor,
    top: usize,
    core_courses: &[String],
) -> Result<Statistics, AppError> {
    actor.require_admin()?;
    let users = repository::fetch_users(db).await?;
    let courses = repository::fetch_courses(db).await?;
    let interest = repository::fetch_interest_counts(db).await?;
    Ok(compute(&users, &courses, interest, top, core_courses))
}
