#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod chat;
pub mod dto;
pub mod routes;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::root,
        routes::health,
        routes::chat_handler,
        routes::list_sessions,
        routes::get_session,
        routes::delete_session,
    ),
    components(schemas(
        dto::ServiceBanner,
        dto::HealthResponse,
        dto::ChatRequest,
        dto::ChatResponse,
        dto::SessionInfo,
        dto::SessionHistory,
        dto::MessageDto,
        dto::RoleDto,
        dto::MessageResponse,
        dto::ErrorBody,
    )),
    tags((name = "analysis", description = "Chat and session endpoints"))
)]
struct ApiDoc;

/// Builds the full `axum::Router`: application routes, Swagger UI, CORS
/// (an explicit origin allowlist with credentials enabled, per the external
/// interfaces contract), and request tracing.
pub fn app(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    routes::router(state)
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
}

/// `tower_http` refuses to pair a wildcard origin with `Allow-Credentials`,
/// so the chat UI's dev origins are listed explicitly rather than using
/// `CorsLayer::permissive()`. Origins that fail to parse as header values
/// are dropped rather than panicking on a bad config file.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        allowed_origins.iter().filter_map(|origin| HeaderValue::from_str(origin).ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}
