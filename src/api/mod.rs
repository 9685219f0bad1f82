pub mod identity;

use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{patch, post, put};
use axum::{Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::db::repository;
use crate::enrollment::{
    CancellationOutcome, EnrollmentError, GradeOutcome, Missing, ValidationOutcome,
};
use crate::error::AppError;
use crate::models::*;
use crate::services::catalog::{self, InstructorClass, ScheduleDay};
use crate::services::{CourseQuery, LearningPath, Statistics, stats};
use crate::state::AppState;

pub use identity::{CurrentUser, USER_HEADER};

#[derive(Deserialize)]
struct StatsQueryParams {
    #[serde(default = "default_top")]
    top: usize,
}

fn default_top() -> usize {
    5
}

#[derive(Serialize)]
struct InterestResponse {
    course_code: String,
    interested: bool,
    changed: bool,
}

#[derive(Serialize)]
struct PublishResponse {
    published: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/users", post(create_user))
        .route("/me/learning-path", get(learning_path))
        .route("/courses", get(list_courses).post(create_course))
        .route("/courses/publish", post(publish_courses))
        .route(
            "/courses/{code}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/courses/{code}/status", patch(update_course_status))
        .route("/courses/{code}/interest", post(express_interest).delete(withdraw_interest))
        .route("/courses/{code}/classes", post(add_class))
        .route("/courses/{code}/classes/{class_id}/validate", post(validate_class))
        .route("/courses/{code}/classes/{class_id}/cancel", post(cancel_class))
        .route("/courses/{code}/classes/{class_id}/instructor", put(assign_instructor))
        .route(
            "/courses/{code}/classes/{class_id}/registrations",
            post(register).delete(cancel_registration),
        )
        .route(
            "/courses/{code}/classes/{class_id}/registrations/{student_id}/approve",
            post(approve_registration),
        )
        .route(
            "/courses/{code}/classes/{class_id}/registrations/{student_id}/grade",
            post(submit_grade),
        )
        .route("/instructor/classes", get(instructor_classes))
        .route("/schedule", get(weekly_schedule))
        .route("/stats", get(statistics))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<User>, AppError> {
    let user = catalog::login(&state.db, req).await?;
    Ok(Json(user))
}

async fn create_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<NewUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = catalog::create_user(&state.db, &current.actor, req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn learning_path(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<LearningPath>, AppError> {
    current.actor.student_id()?;
    let courses = repository::fetch_courses(&state.db).await?;
    Ok(Json(catalog::learning_path(&current.user, &courses)))
}

async fn list_courses(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<CourseQuery>,
) -> Result<Json<Vec<Course>>, AppError> {
    let courses = repository::fetch_courses(&state.db).await?;
    Ok(Json(catalog::search(courses, &current.actor, &query)))
}

async fn create_course(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<NewCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    let course = catalog::create_course(&state.db, &current.actor, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn publish_courses(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<PublishCoursesRequest>,
) -> Result<Json<PublishResponse>, AppError> {
    let published = catalog::publish(&state.db, &current.actor, &req.codes).await?;
    Ok(Json(PublishResponse { published }))
}

async fn get_course(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<Course>, AppError> {
    let course = repository::find_course(&state.db, &code)
        .await?
        .ok_or(EnrollmentError::NotFound(Missing::Course(code)))?;
    Ok(Json(course))
}

async fn update_course(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<Course>, AppError> {
    let course = catalog::update_course(&state.db, &current.actor, &code, req).await?;
    Ok(Json(course))
}

async fn delete_course(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    catalog::delete_course(&state.db, &current.actor, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_course_status(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
    Json(req): Json<UpdateCourseStatusRequest>,
) -> Result<Json<Course>, AppError> {
    let course = catalog::set_course_status(&state.db, &current.actor, &code, req.status).await?;
    Ok(Json(course))
}

async fn set_interest(
    state: AppState,
    current: CurrentUser,
    code: String,
    interested: bool,
) -> Result<Json<InterestResponse>, AppError> {
    let changed = catalog::set_interest(&state.db, &current.actor, &code, interested).await?;
    Ok(Json(InterestResponse {
        course_code: code,
        interested,
        changed,
    }))
}

async fn express_interest(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<InterestResponse>, AppError> {
    set_interest(state, current, code, true).await
}

async fn withdraw_interest(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<InterestResponse>, AppError> {
    set_interest(state, current, code, false).await
}

async fn add_class(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(code): Path<String>,
    Json(req): Json<NewClassRequest>,
) -> Result<(StatusCode, Json<Class>), AppError> {
    let class = catalog::add_class(&state.db, &current.actor, &code, req).await?;
    Ok((StatusCode::CREATED, Json(class)))
}

async fn validate_class(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id)): Path<(String, String)>,
) -> Result<Json<ValidationOutcome>, AppError> {
    let outcome = state
        .enrollment
        .validate_class(&current.actor, &code, &class_id)
        .await?;
    Ok(Json(outcome))
}

async fn cancel_class(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id)): Path<(String, String)>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let outcome = state
        .enrollment
        .cancel_class(&current.actor, &code, &class_id)
        .await?;
    Ok(Json(outcome))
}

async fn assign_instructor(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id)): Path<(String, String)>,
    Json(req): Json<AssignInstructorRequest>,
) -> Result<Json<Class>, AppError> {
    let class = state
        .enrollment
        .assign_instructor(&current.actor, &code, &class_id, &req.instructor_id)
        .await?;
    Ok(Json(class))
}

async fn register(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Registration>), AppError> {
    let registration = state
        .enrollment
        .register(&current.actor, &code, &class_id)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn cancel_registration(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .enrollment
        .cancel_registration(&current.actor, &code, &class_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn approve_registration(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id, student_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    state
        .enrollment
        .approve(&current.actor, &code, &class_id, &student_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_grade(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((code, class_id, student_id)): Path<(String, String, String)>,
    Json(req): Json<GradeRequest>,
) -> Result<Json<GradeOutcome>, AppError> {
    let grade: Grade = req
        .grade
        .parse()
        .map_err(|_| EnrollmentError::Validation("grade must be one of A, B, C, D, F".to_string()))?;

    let outcome = state
        .enrollment
        .submit_grade(&current.actor, &code, &class_id, &student_id, grade)
        .await?;
    Ok(Json(outcome))
}

async fn instructor_classes(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<InstructorClass>>, AppError> {
    let name = current.actor.instructor_name()?;
    let courses = repository::fetch_courses(&state.db).await?;
    Ok(Json(catalog::instructor_classes(name, &courses)))
}

async fn weekly_schedule(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<ScheduleDay>>, AppError> {
    current.actor.require_admin()?;
    let courses = repository::fetch_courses(&state.db).await?;
    Ok(Json(catalog::weekly_schedule(&courses)))
}

async fn statistics(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<StatsQueryParams>,
) -> Result<Json<Statistics>, AppError> {
    let stats = stats::collect(&state.db, &current.actor, params.top, &state.core_courses).await?;
    Ok(Json(stats))
}
