//! Wire-format request/response bodies for the HTTP and WebSocket surface.
//!
//! Kept separate from `analysis_core::model` so the internal session/message
//! shapes can evolve without changing the public API's camelCase contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use analysis_core::model::{Message, Role, SessionSummary};

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceBanner {
    pub app: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<SessionSummary> for SessionInfo {
    fn from(summary: SessionSummary) -> Self {
        Self {
            session_id: summary.id,
            message_count: summary.message_count,
            created_at: summary.created_at,
            last_updated: summary.last_updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub role: RoleDto,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleDto {
    User,
    Assistant,
}

impl From<Role> for RoleDto {
    fn from(role: Role) -> Self {
        match role {
            Role::User => RoleDto::User,
            Role::Assistant => RoleDto::Assistant,
        }
    }
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self { role: message.role.into(), content: message.content, timestamp: message.timestamp }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub session_id: Uuid,
    pub messages: Vec<MessageDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

/// Inbound WebSocket frame: `{"message": "..."}`.
#[derive(Debug, Deserialize)]
pub struct WsInbound {
    pub message: String,
}

/// Outbound WebSocket frame: a chat reply or a non-fatal error, per session.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsOutbound {
    Message { content: String, timestamp: DateTime<Utc> },
    Error { content: String },
}
