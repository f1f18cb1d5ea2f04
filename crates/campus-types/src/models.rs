use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform roles. Emergency broadcasts only reach admin-class roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Parent,
    Teacher,
    Admin,
}

impl Role {
    /// Admin-class roles receive emergency incident fan-out.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Announcement,
    Emergency,
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// Content written in place of a soft-deleted message.
pub const DELETED_TOMBSTONE: &str = "[message deleted]";

/// A chat message. Immutable once delivered, except for the flag bit and
/// the soft-delete transition (content replaced by [`DELETED_TOMBSTONE`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub content: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub is_flagged: bool,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Message,
    Moderation,
    Emergency,
    Announcement,
}

/// A per-user inbox entry. `is_read` only ever transitions false -> true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.into(),
            message: message.into(),
            data,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// An emergency incident. Relay-only: this subsystem fans it out to
/// privileged sessions but does not own its persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyIncident {
    pub id: Uuid,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Direct,
    ClassAnnouncement,
    Emergency,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub kind: ChannelKind,
    pub created_at: DateTime<Utc>,
}
