use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use campus_types::models::{Message, MessageType, Notification, NotificationType, Role};

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub content: String,
    pub message_type: String,
    pub is_flagged: bool,
    pub is_deleted: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: String,
    pub is_read: bool,
    pub created_at: String,
}

fn parse_uuid(value: &str, what: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, value, e);
        Uuid::default()
    })
}

fn parse_timestamp(value: &str, what: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite default timestamps are "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, value, e);
            DateTime::default()
        })
}

pub fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::Student => "student",
        Role::Parent => "parent",
        Role::Teacher => "teacher",
        Role::Admin => "admin",
    }
}

pub fn role_from_str(value: &str) -> Role {
    match value {
        "student" => Role::Student,
        "parent" => Role::Parent,
        "teacher" => Role::Teacher,
        "admin" => Role::Admin,
        other => {
            warn!("Unknown role '{}', defaulting to student", other);
            Role::Student
        }
    }
}

pub fn message_type_to_str(kind: MessageType) -> &'static str {
    match kind {
        MessageType::Text => "text",
        MessageType::Announcement => "announcement",
        MessageType::Emergency => "emergency",
    }
}

pub fn message_type_from_str(value: &str) -> MessageType {
    match value {
        "announcement" => MessageType::Announcement,
        "emergency" => MessageType::Emergency,
        _ => MessageType::Text,
    }
}

pub fn notification_type_to_str(kind: NotificationType) -> &'static str {
    match kind {
        NotificationType::Message => "message",
        NotificationType::Moderation => "moderation",
        NotificationType::Emergency => "emergency",
        NotificationType::Announcement => "announcement",
    }
}

pub fn notification_type_from_str(value: &str) -> NotificationType {
    match value {
        "moderation" => NotificationType::Moderation,
        "emergency" => NotificationType::Emergency,
        "announcement" => NotificationType::Announcement,
        _ => NotificationType::Message,
    }
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        Message {
            id: parse_uuid(&self.id, "message id"),
            channel_id: parse_uuid(&self.channel_id, "channel_id"),
            sender_id: parse_uuid(&self.sender_id, "sender_id"),
            sender_name: self.sender_name,
            sender_role: role_from_str(&self.sender_role),
            content: self.content,
            message_type: message_type_from_str(&self.message_type),
            created_at: parse_timestamp(&self.created_at, "message created_at"),
            is_flagged: self.is_flagged,
            is_deleted: self.is_deleted,
        }
    }
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        let data = serde_json::from_str(&self.data).unwrap_or_else(|e| {
            warn!("Corrupt notification data on '{}': {}", self.id, e);
            serde_json::Value::Null
        });

        Notification {
            id: parse_uuid(&self.id, "notification id"),
            user_id: parse_uuid(&self.user_id, "notification user_id"),
            kind: notification_type_from_str(&self.kind),
            title: self.title,
            message: self.message,
            data,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at, "notification created_at"),
        }
    }
}
