use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChannelKind, MessageType, NotificationType, Role, Severity};

// -- JWT Claims --

/// Claims minted by the platform's identity provider. Shared across
/// campus-api (REST middleware) and campus-gateway (WebSocket Identify).
/// Canonical definition lives here in campus-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagMessageRequest {
    pub reason: Option<String>,
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub kind: ChannelKind,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CreateChannelResponse {
    pub channel_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub id: Uuid,
    pub kind: ChannelKind,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: u64,
}

// -- Incidents --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIncidentRequest {
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
}

#[derive(Debug, Serialize)]
pub struct CreateIncidentResponse {
    pub incident: crate::models::EmergencyIncident,
    /// Live privileged sessions that received the relay.
    pub delivered: usize,
}

// -- Content analysis --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeRequest {
    pub content: String,
}
