use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use uuid::Uuid;

use analysis_core::model::{Message, Role};

use crate::chat;
use crate::dto::{
    ChatRequest, ChatResponse, ErrorBody, HealthResponse, MessageResponse, ServiceBanner,
    SessionHistory, SessionInfo,
};
use crate::state::SharedState;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .route("/ws/chat/:id", get(crate::ws::handler))
        .with_state(state)
}

#[utoipa::path(get, path = "/", responses((status = 200, body = ServiceBanner)))]
pub async fn root() -> Json<ServiceBanner> {
    Json(ServiceBanner { app: "Smart Assist API", version: env!("CARGO_PKG_VERSION"), status: "running" })
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", timestamp: Utc::now() })
}

#[utoipa::path(
    post,
    path = "/api/chat",
    request_body = ChatRequest,
    responses((status = 200, body = ChatResponse))
)]
pub async fn chat_handler(State(state): State<SharedState>, Json(body): Json<ChatRequest>) -> Json<ChatResponse> {
    let session_id = state.sessions.create(body.session_id);

    state
        .sessions
        .append(session_id, Message { role: Role::User, content: body.message.clone(), timestamp: Utc::now() })
        .await;

    let reply = chat::respond_to(&body.message);

    state
        .sessions
        .append(session_id, Message { role: Role::Assistant, content: reply.clone(), timestamp: Utc::now() })
        .await;

    Json(ChatResponse { session_id, response: reply, timestamp: Utc::now() })
}

#[utoipa::path(get, path = "/api/sessions", responses((status = 200, body = [SessionInfo])))]
pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionInfo>> {
    let summaries = state.sessions.summarize().await;
    Json(summaries.into_iter().map(SessionInfo::from).collect())
}

#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    responses((status = 200, body = SessionHistory), (status = 404, body = ErrorBody))
)]
pub async fn get_session(State(state): State<SharedState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.sessions.list(id).await {
        Ok(messages) => {
            let history = SessionHistory { session_id: id, messages: messages.into_iter().map(Into::into).collect() };
            (StatusCode::OK, Json(history)).into_response()
        }
        Err(_) => not_found().into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    responses((status = 200, body = MessageResponse), (status = 404, body = ErrorBody))
)]
pub async fn delete_session(State(state): State<SharedState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    if state.sessions.delete(id) {
        (StatusCode::OK, Json(MessageResponse { message: "Session deleted successfully".to_string() }))
            .into_response()
    } else {
        not_found().into_response()
    }
}

fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ErrorBody { detail: "Session not found".to_string() }))
}
