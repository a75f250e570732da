#![expect(clippy::expect_used)]

use std::sync::Arc;

use analysis_server::AppState;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> axum::Router {
    analysis_server::app(Arc::new(AppState::new()), &["http://localhost:3000".to_string()])
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn root_reports_service_banner() {
    let response = app().oneshot(Request::get("/").body(Body::empty()).expect("request")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn health_reports_healthy() {
    let response =
        app().oneshot(Request::get("/health").body(Body::empty()).expect("request")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn chat_round_trip_creates_a_session_and_lists_it() {
    let app = app();

    let chat_request = Request::post("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({"message": "how is my portfolio?"}).to_string()))
        .expect("request");
    let response = app.clone().oneshot(chat_request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let chat_body = body_json(response).await;
    assert!(chat_body["response"].as_str().expect("response text").contains("portfolio"));
    let session_id = chat_body["sessionId"].as_str().expect("sessionId").to_string();

    let list_response =
        app.clone().oneshot(Request::get("/api/sessions").body(Body::empty()).expect("request")).await.expect("response");
    let sessions = body_json(list_response).await;
    assert_eq!(sessions.as_array().expect("array").len(), 1);

    let history_response = app
        .oneshot(Request::get(format!("/api/sessions/{session_id}")).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(history_response.status(), StatusCode::OK);
    let history = body_json(history_response).await;
    assert_eq!(history["messages"].as_array().expect("messages").len(), 2);
}

#[tokio::test]
async fn unknown_session_returns_404() {
    let response = app()
        .oneshot(
            Request::get("/api/sessions/00000000-0000-0000-0000-000000000000")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_unknown_session_returns_404() {
    let response = app()
        .oneshot(
            Request::delete("/api/sessions/00000000-0000-0000-0000-000000000000")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
