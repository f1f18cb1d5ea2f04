use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EmergencyIncident, Message, Notification, Role};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, role: Role },

    /// A new message was posted to a channel
    MessageCreate { message: Message },

    /// An existing message changed (flagged or soft-deleted)
    MessageUpdate { message: Message },

    /// A notification landed in this user's inbox
    NotificationCreate { notification: Notification },

    /// An emergency incident, fanned out to privileged sessions only
    EmergencyBroadcast { incident: EmergencyIncident },
}

impl GatewayEvent {
    /// Returns the channel_id if this event is scoped to a specific channel.
    /// Events that return `None` are targeted and bypass channel subscriptions.
    pub fn channel_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { message } => Some(message.channel_id),
            Self::MessageUpdate { message } => Some(message.channel_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start receiving message events for a channel
    Subscribe { channel_id: Uuid },

    /// Stop receiving message events for a channel
    Unsubscribe { channel_id: Uuid },

    /// Mark an inbox notification as read
    MarkNotificationRead { notification_id: Uuid },
}
