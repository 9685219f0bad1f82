use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use crate::models::{
    Class, Completion, Course, CourseStatus, Registration, User,
};

#[derive(FromRow)]
struct CourseRow {
    code: String,
    name: String,
    category: String,
    description: String,
    prerequisites: String,
    status: String,
}

#[derive(FromRow)]
struct ClassRow {
    course_code: String,
    class_id: String,
    instructor: String,
    schedule: String,
    capacity: i64,
    status: String,
    grading_complete: bool,
}

#[derive(FromRow)]
struct RegistrationRow {
    course_code: String,
    class_id: String,
    student_id: String,
    status: String,
    grade: Option<String>,
}

#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    password: String,
    name: String,
    role: String,
    expertise: String,
}

#[derive(FromRow)]
struct CompletionRow {
    user_id: String,
    course_code: String,
    course_name: String,
    grade: String,
    description: String,
}

fn decode<T>(value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse().map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn decode_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(value).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn assemble_courses(
    courses: Vec<CourseRow>,
    classes: Vec<ClassRow>,
    registrations: Vec<RegistrationRow>,
) -> Result<Vec<Course>, sqlx::Error> {
    let mut rosters: HashMap<(String, String), Vec<Registration>> = HashMap::new();
    for row in registrations {
        let registration = Registration {
            student_id: row.student_id,
            status: decode(&row.status)?,
            grade: row.grade.as_deref().map(decode).transpose()?,
        };
        rosters
            .entry((row.course_code, row.class_id))
            .or_default()
            .push(registration);
    }

    let mut classes_by_course: HashMap<String, Vec<Class>> = HashMap::new();
    for row in classes {
        let registered_students = rosters
            .remove(&(row.course_code.clone(), row.class_id.clone()))
            .unwrap_or_default();
        let class = Class {
            class_id: row.class_id,
            instructor: row.instructor,
            schedule: row.schedule,
            capacity: u32::try_from(row.capacity)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            status: decode(&row.status)?,
            registered_students,
            grading_complete: row.grading_complete,
        };
        classes_by_course
            .entry(row.course_code)
            .or_default()
            .push(class);
    }

    courses
        .into_iter()
        .map(|row| -> Result<Course, sqlx::Error> {
            Ok(Course {
                classes: classes_by_course.remove(&row.code).unwrap_or_default(),
                prerequisites: decode_json(&row.prerequisites)?,
                status: decode(&row.status)?,
                code: row.code,
                name: row.name,
                category: row.category,
                description: row.description,
            })
        })
        .collect()
}

pub async fn fetch_courses(db: &SqlitePool) -> Result<Vec<Course>, sqlx::Error> {
    let courses = sqlx::query_as::<_, CourseRow>(
        "SELECT code, name, category, description, prerequisites, status FROM courses ORDER BY code",
    )
    .fetch_all(db)
    .await?;

    let classes = sqlx::query_as::<_, ClassRow>(
        "SELECT course_code, class_id, instructor, schedule, capacity, status, grading_complete FROM classes ORDER BY course_code, position",
    )
    .fetch_all(db)
    .await?;

    let registrations = sqlx::query_as::<_, RegistrationRow>(
        "SELECT course_code, class_id, student_id, status, grade FROM registrations ORDER BY course_code, class_id, position",
    )
    .fetch_all(db)
    .await?;

    assemble_courses(courses, classes, registrations)
}

pub async fn find_course(db: &SqlitePool, code: &str) -> Result<Option<Course>, sqlx::Error> {
    let Some(course) = sqlx::query_as::<_, CourseRow>(
        "SELECT code, name, category, description, prerequisites, status FROM courses WHERE code = ?",
    )
    .bind(code)
    .fetch_optional(db)
    .await?
    else {
        return Ok(None);
    };

    let classes = sqlx::query_as::<_, ClassRow>(
        "SELECT course_code, class_id, instructor, schedule, capacity, status, grading_complete FROM classes WHERE course_code = ? ORDER BY position",
    )
    .bind(code)
    .fetch_all(db)
    .await?;

    let registrations = sqlx::query_as::<_, RegistrationRow>(
        "SELECT course_code, class_id, student_id, status, grade FROM registrations WHERE course_code = ? ORDER BY class_id, position",
    )
    .bind(code)
    .fetch_all(db)
    .await?;

    Ok(assemble_courses(vec![course], classes, registrations)?.pop())
}

/// Inserts a course together with all of its classes and rosters.
pub async fn insert_course(conn: &mut SqliteConnection, course: &Course) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO courses (code, name, category, description, prerequisites, status, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&course.code)
    .bind(&course.name)
    .bind(&course.category)
    .bind(&course.description)
    .bind(encode_json(&course.prerequisites)?)
    .bind(course.status.as_str())
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    for (position, class) in course.classes.iter().enumerate() {
        insert_class(&mut *conn, &course.code, position, class).await?;
    }

    Ok(())
}

/// Updates the descriptive fields of a course. Status and classes are left alone.
pub async fn update_course(conn: &mut SqliteConnection, course: &Course) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "UPDATE courses SET name = ?1, category = ?2, description = ?3, prerequisites = ?4, updated_at = ?5 WHERE code = ?6",
    )
    .bind(&course.name)
    .bind(&course.category)
    .bind(&course.description)
    .bind(encode_json(&course.prerequisites)?)
    .bind(&now)
    .bind(&course.code)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    Ok(result > 0)
}

/// Deletes a course with its classes, rosters and interests. Completions are kept.
pub async fn delete_course(db: &SqlitePool, code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM courses WHERE code = ?")
        .bind(code)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// Inserts a new class row and its roster. Fails with a unique violation when
/// the class id is already taken in the course.
pub async fn insert_class(
    conn: &mut SqliteConnection,
    course_code: &str,
    position: usize,
    class: &Class,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO classes
            (course_code, class_id, instructor, schedule, capacity, status,
            grading_complete, position, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(course_code)
    .bind(&class.class_id)
    .bind(&class.instructor)
    .bind(&class.schedule)
    .bind(i64::from(class.capacity))
    .bind(class.status.as_str())
    .bind(class.grading_complete)
    .bind(position as i64)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    insert_roster(conn, course_code, class).await
}

/// Writes an existing class row and replaces its roster. Other classes of the
/// same course are left alone. Returns `false` when the class is gone.
pub async fn save_class(
    conn: &mut SqliteConnection,
    course_code: &str,
    class: &Class,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        UPDATE classes SET
            instructor = ?1,
            schedule = ?2,
            capacity = ?3,
            status = ?4,
            grading_complete = ?5,
            updated_at = ?6
        WHERE course_code = ?7 AND class_id = ?8
        "#,
    )
    .bind(&class.instructor)
    .bind(&class.schedule)
    .bind(i64::from(class.capacity))
    .bind(class.status.as_str())
    .bind(class.grading_complete)
    .bind(&now)
    .bind(course_code)
    .bind(&class.class_id)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if result == 0 {
        return Ok(false);
    }

    sqlx::query("DELETE FROM registrations WHERE course_code = ? AND class_id = ?")
        .bind(course_code)
        .bind(&class.class_id)
        .execute(&mut *conn)
        .await?;

    insert_roster(conn, course_code, class).await?;
    Ok(true)
}

async fn insert_roster(
    conn: &mut SqliteConnection,
    course_code: &str,
    class: &Class,
) -> Result<(), sqlx::Error> {
    for (position, registration) in class.registered_students.iter().enumerate() {
        sqlx::query(
            "INSERT INTO registrations (course_code, class_id, student_id, status, grade, position) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(course_code)
        .bind(&class.class_id)
        .bind(&registration.student_id)
        .bind(registration.status.as_str())
        .bind(registration.grade.map(|g| g.as_str()))
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn update_course_status(
    db: &SqlitePool,
    code: &str,
    status: CourseStatus,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query("UPDATE courses SET status = ?1, updated_at = ?2 WHERE code = ?3")
        .bind(status.as_str())
        .bind(&now)
        .bind(code)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

fn assemble_users(users: Vec<UserRow>, completions: Vec<CompletionRow>) -> Result<Vec<User>, sqlx::Error> {
    let mut by_user: HashMap<String, Vec<Completion>> = HashMap::new();
    for row in completions {
        let completion = Completion {
            code: row.course_code,
            name: row.course_name,
            grade: decode(&row.grade)?,
            description: row.description,
        };
        by_user.entry(row.user_id).or_default().push(completion);
    }

    users
        .into_iter()
        .map(|row| -> Result<User, sqlx::Error> {
            Ok(User {
                completed_courses: by_user.remove(&row.id).unwrap_or_default(),
                role: decode(&row.role)?,
                expertise: decode_json(&row.expertise)?,
                id: row.id,
                username: row.username,
                password: row.password,
                name: row.name,
            })
        })
        .collect()
}

pub async fn fetch_users(db: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    let users = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, password, name, role, expertise FROM users ORDER BY username",
    )
    .fetch_all(db)
    .await?;

    let completions = sqlx::query_as::<_, CompletionRow>(
        "SELECT user_id, course_code, course_name, grade, description FROM completions ORDER BY user_id, position",
    )
    .fetch_all(db)
    .await?;

    assemble_users(users, completions)
}

async fn find_user_where(
    db: &SqlitePool,
    column: &str,
    value: &str,
) -> Result<Option<User>, sqlx::Error> {
    let Some(user) = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT id, username, password, name, role, expertise FROM users WHERE {} = ?",
        column
    ))
    .bind(value)
    .fetch_optional(db)
    .await?
    else {
        return Ok(None);
    };

    let completions = sqlx::query_as::<_, CompletionRow>(
        "SELECT user_id, course_code, course_name, grade, description FROM completions WHERE user_id = ? ORDER BY position",
    )
    .bind(&user.id)
    .fetch_all(db)
    .await?;

    Ok(assemble_users(vec![user], completions)?.pop())
}

pub async fn find_user(db: &SqlitePool, id: &str) -> Result<Option<User>, sqlx::Error> {
    find_user_where(db, "id", id).await
}

pub async fn find_user_by_username(
    db: &SqlitePool,
    username: &str,
) -> Result<Option<User>, sqlx::Error> {
    find_user_where(db, "username", username).await
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, username, password, name, role, expertise) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.password)
    .bind(&user.name)
    .bind(user.role.as_str())
    .bind(encode_json(&user.expertise)?)
    .execute(&mut *conn)
    .await?;

    save_completions(conn, user).await
}

/// Replaces the user's completion list with `user.completed_courses`.
pub async fn save_completions(conn: &mut SqliteConnection, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM completions WHERE user_id = ?")
        .bind(&user.id)
        .execute(&mut *conn)
        .await?;

    for (position, completion) in user.completed_courses.iter().enumerate() {
        sqlx::query(
            "INSERT INTO completions (user_id, course_code, course_name, grade, description, position) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&completion.code)
        .bind(&completion.name)
        .bind(completion.grade.as_str())
        .bind(&completion.description)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub async fn add_interest(db: &SqlitePool, user_id: &str, course_code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO instructor_interests (user_id, course_code) VALUES (?, ?)",
    )
    .bind(user_id)
    .bind(course_code)
    .execute(db)
    .await?
    .rows_affected();

    Ok(result > 0)
}

pub async fn remove_interest(db: &SqlitePool, user_id: &str, course_code: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM instructor_interests WHERE user_id = ? AND course_code = ?")
        .bind(user_id)
        .bind(course_code)
        .execute(db)
        .await?
        .rows_affected();

    Ok(result > 0)
}

/// (course code, number of interested instructors), most wanted first.
pub async fn fetch_interest_counts(db: &SqlitePool) -> Result<Vec<(String, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i64)>(
        "SELECT course_code, COUNT(*) AS interested FROM instructor_interests GROUP BY course_code ORDER BY interested DESC, course_code",
    )
    .fetch_all(db)
    .await
}

pub async fn is_empty(db: &SqlitePool) -> Result<bool, sqlx::Error> {
    let (users, courses): (i64, i64) = sqlx::query_as(
        "SELECT (SELECT COUNT(*) FROM users), (SELECT COUNT(*) FROM courses)",
    )
    .fetch_one(db)
    .await?;

    Ok(users == 0 && courses == 0)
}
