mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use intellimark_backend::{middleware::request_id::REQUEST_ID_HEADER, models::user::Role, routes};

use common::{offline_state, refresh_token_for, send, token_for};

#[tokio::test]
async fn health_answers_on_both_prefixes() {
    let app = routes::router(offline_state());

    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = send(&app, "GET", "/api/v1/bd/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn every_response_carries_a_request_id() {
    let app = routes::router(offline_state());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let id = response
        .headers()
        .get(REQUEST_ID_HEADER)
        .expect("request id header")
        .to_str()
        .unwrap();
    assert!(Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn protected_routes_require_a_token() {
    let app = routes::router(offline_state());

    let (status, body) = send(&app, "GET", "/api/v1/bd/student/assessments", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(&app, "GET", "/api/v1/profile", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_tokens_cannot_be_used_as_access_tokens() {
    let app = routes::router(offline_state());
    let token = refresh_token_for(Uuid::new_v4(), Role::Lecturer);

    let (status, _) = send(&app, "GET", "/api/v1/bd/lecturer/assessments", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_are_enforced_per_route() {
    let app = routes::router(offline_state());
    let student = token_for(Uuid::new_v4(), Role::Student);
    let lecturer = token_for(Uuid::new_v4(), Role::Lecturer);
    let admin = token_for(Uuid::new_v4(), Role::Admin);
    let id = Uuid::new_v4();

    let cases = [
        ("POST", "/api/v1/bd/assessments".to_string(), &student),
        ("POST", "/api/v1/bd/ai/generate-assessments".to_string(), &student),
        ("GET", "/api/v1/admin/analytics".to_string(), &lecturer),
        ("POST", "/api/v1/admin/lecturers".to_string(), &student),
        ("GET", "/api/v1/lecturer/courses".to_string(), &student),
        ("POST", format!("/api/v1/bd/questions/{}/answer", id), &lecturer),
        ("POST", format!("/api/v1/bd/assessments/{}/submit", id), &admin),
        ("DELETE", format!("/api/v1/bd/assessments/{}", id), &student),
        ("GET", format!("/api/v1/bd/assessments/{}", id), &admin),
        ("PATCH", format!("/api/v1/bd/results/{}", id), &student),
        ("GET", format!("/api/v1/bd/notes/{}/download", id), &admin),
        ("POST", "/api/v1/student/units/join".to_string(), &lecturer),
    ];

    for (method, uri, token) in cases {
        let (status, body) = send(&app, method, &uri, Some(token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} {}", method, uri);
        assert_eq!(body["error"], "forbidden");
    }
}

#[tokio::test]
async fn malformed_login_bodies_are_rejected_before_lookup() {
    let app = routes::router(offline_state());

    let (status, body) = send(&app, "POST", "/api/v1/auth/login", None, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": "not-an-email", "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn registration_requires_every_student_field() {
    let app = routes::router(offline_state());

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/auth/register",
        None,
        Some(json!({ "email": "jane@example.com", "password": "longenough" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openapi_document_lists_the_assessment_routes() {
    let app = routes::router(offline_state());

    let (status, body) = send(&app, "GET", "/api/v1/docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().expect("paths object");
    assert!(paths.contains_key("/api/v1/bd/assessments"));
    assert!(paths.contains_key("/api/v1/auth/login"));
    assert!(body["components"]["securitySchemes"]["bearer_auth"].is_object());
}
