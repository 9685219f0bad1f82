use std::sync::Arc;

use sqlx::SqlitePool;

use crate::services::EnrollmentService;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub enrollment: Arc<EnrollmentService>,
    pub core_courses: Arc<[String]>,
}

impl AppState {
    pub fn new(db: SqlitePool, enrollment: EnrollmentService, core_courses: Vec<String>) -> Self {
        Self {
            db,
            enrollment: Arc::new(enrollment),
            core_courses: core_courses.into(),
        }
    }
}
