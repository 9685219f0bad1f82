#![allow(dead_code)]

use registrar::db;
use registrar::services::{Fixture, fixtures};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Three students, two instructors and an admin. CS101 and CS201 are open,
/// CS301 is still a draft. Alice has passed CS101, Bob has not.
pub const CATALOG: &str = r#"{
    "users": [
        { "id": "s1", "username": "alice", "password": "pw", "name": "Alice", "role": "student",
          "completed_courses": [{ "code": "CS101", "name": "Intro to Programming", "grade": "B", "description": "Basics" }] },
        { "id": "s2", "username": "bob", "password": "pw", "name": "Bob", "role": "student" },
        { "id": "s3", "username": "carol", "password": "pw", "name": "Carol", "role": "student",
          "completed_courses": [{ "code": "CS101", "name": "Intro to Programming", "grade": "A", "description": "Basics" }] },
        { "id": "i1", "username": "smith", "password": "pw", "name": "Dr. Smith", "role": "instructor", "expertise": ["programming"] },
        { "id": "i2", "username": "jones", "password": "pw", "name": "Dr. Jones", "role": "instructor" },
        { "id": "a1", "username": "admin", "password": "pw", "name": "Registrar", "role": "admin" }
    ],
    "courses": [
        { "code": "CS101", "name": "Intro to Programming", "category": "programming", "description": "Basics",
          "prerequisites": [], "status": "open",
          "classes": [{ "class_id": "C1", "instructor": "Dr. Smith", "schedule": "Mon/Wed 09:00-10:15", "capacity": 30 }] },
        { "code": "CS201", "name": "Data Structures", "category": "programming", "description": "Trees and lists",
          "prerequisites": ["CS101"], "status": "open",
          "classes": [
              { "class_id": "C1", "instructor": "Dr. Smith", "schedule": "Tue/Thu 10:00-11:15", "capacity": 1 },
              { "class_id": "C2", "instructor": "Dr. Jones", "schedule": "Fri 13:00-15:45", "capacity": 2 }
          ] },
        { "code": "CS301", "name": "Algorithms", "category": "programming", "description": "Graphs",
          "prerequisites": ["CS201"], "status": "draft",
          "classes": [{ "class_id": "C1", "instructor": "Dr. Jones", "schedule": "Mon 14:00-16:45", "capacity": 20 }] }
    ]
}"#;

pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test db");
    db::MIGRATOR.run(&pool).await.expect("Failed to run migrations");

    let fixture: Fixture = serde_json::from_str(CATALOG).expect("Failed to parse catalog");
    fixtures::import(&pool, &fixture)
        .await
        .expect("Failed to import catalog")
        .expect("Database was not empty");
    pool
}
