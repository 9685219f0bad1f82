mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use registrar::api::{USER_HEADER, router};
use registrar::enrollment::Policy;
use registrar::services::EnrollmentService;
use registrar::state::AppState;

use common::setup_test_db;

async fn test_app() -> Router {
    let pool = setup_test_db().await;
    let enrollment = EnrollmentService::new(pool.clone(), Policy::default());
    router(AppState::new(pool, enrollment, vec!["CS101".to_string(), "CS201".to_string()]))
}

async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    let (status, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_unknown_identity() {
    let app = test_app().await;

    let (status, _) = send(&app, Method::GET, "/courses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/courses", Some("nobody"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_hides_password() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "alice", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "s1");
    assert!(body.get("password").is_none());

    let (status, _) = send(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_instructors_only_see_courses_they_teach() {
    let app = test_app().await;
    let codes = |body: &Value| -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|c| c["code"].as_str().unwrap().to_string())
            .collect()
    };

    let (status, body) = send(&app, Method::GET, "/courses", Some("s1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(codes(&body), vec!["CS101", "CS201", "CS301"]);

    let (_, body) = send(&app, Method::GET, "/courses", Some("i2"), None).await;
    assert_eq!(codes(&body), vec!["CS201", "CS301"]);

    let (_, body) = send(&app, Method::GET, "/courses?q=data", Some("a1"), None).await;
    assert_eq!(codes(&body), vec!["CS201"]);

    let (_, body) = send(&app, Method::GET, "/courses?order=prerequisite_depth", Some("a1"), None).await;
    assert_eq!(codes(&body), vec!["CS101", "CS201", "CS301"]);
}

#[tokio::test]
async fn test_register_conflicts_carry_reason() {
    let app = test_app().await;
    let uri = "/courses/CS201/classes/C1/registrations";

    let (status, body) = send(&app, Method::POST, uri, Some("s1"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");

    let (status, body) = send(&app, Method::POST, uri, Some("s1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "already_registered");

    let (status, body) = send(&app, Method::POST, uri, Some("s3"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "class_full");

    let (status, body) = send(&app, Method::POST, uri, Some("s2"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "prerequisite_missing");

    let (status, _) = send(&app, Method::POST, "/courses/CS201/classes/C9/registrations", Some("s1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validate_requires_admin() {
    let app = test_app().await;
    send(&app, Method::POST, "/courses/CS201/classes/C1/registrations", Some("s1"), None).await;

    let (status, _) = send(&app, Method::POST, "/courses/CS201/classes/C1/validate", Some("i1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/courses/CS201/classes/C1/validate", Some("a1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_validated"], true);
    assert_eq!(body["approved"], json!(["s1"]));
}

#[tokio::test]
async fn test_grade_flow() {
    let app = test_app().await;
    send(&app, Method::POST, "/courses/CS201/classes/C1/registrations", Some("s1"), None).await;
    send(&app, Method::POST, "/courses/CS201/classes/C1/validate", Some("a1"), None).await;

    let grade_uri = "/courses/CS201/classes/C1/registrations/s1/grade";

    let (status, _) = send(&app, Method::POST, grade_uri, Some("i1"), Some(json!({ "grade": "Z" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, grade_uri, Some("a1"), Some(json!({ "grade": "A" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, grade_uri, Some("i1"), Some(json!({ "grade": "a" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["grade"], "A");
    assert_eq!(body["completion_recorded"], true);
    assert_eq!(body["grading_complete"], true);

    let (status, body) = send(&app, Method::GET, "/me/learning-path", Some("s1"), None).await;
    assert_eq!(status, StatusCode::OK);
    let completed: Vec<&str> = body["completed"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["code"].as_str().unwrap())
        .collect();
    assert!(completed.contains(&"CS201"));
}

#[tokio::test]
async fn test_cancel_registration_and_approve() {
    let app = test_app().await;
    let uri = "/courses/CS201/classes/C2/registrations";

    send(&app, Method::POST, uri, Some("s1"), None).await;
    send(&app, Method::POST, uri, Some("s3"), None).await;

    let (status, _) = send(&app, Method::DELETE, uri, Some("s1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::POST, &format!("{}/s3/approve", uri), Some("i1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::POST, &format!("{}/s3/approve", uri), Some("i2"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::DELETE, uri, Some("s3"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "not_pending");
}

#[tokio::test]
async fn test_course_administration() {
    let app = test_app().await;

    let new_course = json!({
        "code": "CS401",
        "name": "Compilers",
        "category": "programming",
        "description": "Parsing and codegen",
        "prerequisites": ["CS301", "CS301"],
        "class": { "class_id": "C1", "instructor": "Dr. Jones", "schedule": "Wed 10:00-12:45", "capacity": 15 }
    });

    let (status, _) = send(&app, Method::POST, "/courses", Some("s1"), Some(new_course.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/courses", Some("a1"), Some(new_course.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["prerequisites"], json!(["CS301"]));

    let (status, _) = send(&app, Method::POST, "/courses", Some("a1"), Some(new_course)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::POST,
        "/courses/publish",
        Some("a1"),
        Some(json!({ "codes": ["CS301"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], json!(["CS301"]));

    let (status, body) = send(
        &app,
        Method::PATCH,
        "/courses/CS301/status",
        Some("a1"),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send(
        &app,
        Method::POST,
        "/courses/CS101/classes",
        Some("a1"),
        Some(json!({ "class_id": "C1", "instructor": "Dr. Jones", "schedule": "Fri 09:00-10:00", "capacity": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_instructor_views_and_stats() {
    let app = test_app().await;

    let (status, body) = send(&app, Method::GET, "/instructor/classes", Some("i1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, _) = send(&app, Method::GET, "/instructor/classes", Some("s1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/courses/CS301/interest", Some("i1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (status, body) = send(&app, Method::GET, "/stats", Some("a1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instructor_interest"][0]["key"], "CS301");
    assert_eq!(body["instructor_interest"][0]["count"], 1);

    let (status, _) = send(&app, Method::GET, "/stats", Some("i1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/schedule", Some("a1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_delete_and_reassign() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/courses/CS201",
        Some("a1"),
        Some(json!({ "name": "Data Structures II" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Data Structures II");
    assert_eq!(body["prerequisites"], json!(["CS101"]));

    let (status, _) = send(&app, Method::PUT, "/courses/CS201", Some("i1"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = "/courses/CS201/classes/C1/instructor";
    let (status, _) = send(&app, Method::PUT, uri, Some("i1"), Some(json!({ "instructor_id": "i2" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::PUT, uri, Some("a1"), Some(json!({ "instructor_id": "i2" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["instructor"], "Dr. Jones");

    let (status, _) = send(&app, Method::PUT, uri, Some("a1"), Some(json!({ "instructor_id": "s1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, "/courses/CS301", Some("s1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::DELETE, "/courses/CS301", Some("a1"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/courses/CS301", Some("a1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_include_rates_and_core_completers() {
    let app = test_app().await;
    send(&app, Method::POST, "/courses/CS201/classes/C1/registrations", Some("s1"), None).await;
    send(&app, Method::POST, "/courses/CS201/classes/C1/validate", Some("a1"), None).await;
    send(
        &app,
        Method::POST,
        "/courses/CS201/classes/C1/registrations/s1/grade",
        Some("i1"),
        Some(json!({ "grade": "B" })),
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/stats", Some("a1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let cs101 = &body["completion_rates"][0];
    assert_eq!(cs101["code"], "CS101");
    assert_eq!(cs101["completed"], 2);
    assert_eq!(cs101["registered"], 0);
    assert_eq!(cs101["completion_rate"], 0.0);

    // Core courses for this app are CS101 and CS201.
    assert_eq!(body["completed_core_courses"], json!([{ "id": "s1", "name": "Alice", "username": "alice" }]));
}
