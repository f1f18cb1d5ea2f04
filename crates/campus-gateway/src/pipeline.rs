use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use campus_moderation::{RiskLevel, analyze_content};
use campus_types::error::RealtimeError;
use campus_types::models::{
    EmergencyIncident, Message, MessageType, Notification, NotificationType, Role, Severity,
};

use crate::dispatcher::Dispatcher;
use crate::storage::RealtimeStore;

/// Message content longer than this is rejected up front.
pub const MAX_MESSAGE_LEN: usize = 4000;

const PREVIEW_LEN: usize = 120;

/// Identity of the sending session, as supplied by the identity provider.
#[derive(Debug, Clone)]
pub struct Sender {
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
}

/// Accept a message: validate, score, persist, fan out, notify.
///
/// Analysis is advisory — a `high`/`critical` verdict flags the stored
/// message and alerts moderators, but never blocks the send. Failures after
/// validation surface as `Send`; nothing is dropped silently.
pub async fn submit_message(
    hub: &Dispatcher,
    store: &Arc<dyn RealtimeStore>,
    sender: &Sender,
    channel_id: Uuid,
    content: &str,
    message_type: MessageType,
) -> Result<Message, RealtimeError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(RealtimeError::Validation("message content is empty".into()));
    }
    if trimmed.len() > MAX_MESSAGE_LEN {
        return Err(RealtimeError::Validation(format!(
            "message content exceeds {} bytes",
            MAX_MESSAGE_LEN
        )));
    }

    let analysis = analyze_content(trimmed);
    let is_flagged = analysis.risk_level >= RiskLevel::High;

    let message = Message {
        id: Uuid::new_v4(),
        channel_id,
        sender_id: sender.user_id,
        sender_name: sender.name.clone(),
        sender_role: sender.role,
        content: trimmed.to_string(),
        message_type,
        created_at: Utc::now(),
        is_flagged,
        is_deleted: false,
    };

    // Persist before fan-out: subscribers only ever see accepted messages
    let store_clone = store.clone();
    let to_insert = message.clone();
    tokio::task::spawn_blocking(move || store_clone.insert_message(&to_insert))
        .await
        .map_err(|e| RealtimeError::Send(format!("persistence task failed: {}", e)))?
        .map_err(|e| RealtimeError::Send(format!("could not persist message: {}", e)))?;

    hub.publish_message(message.clone());

    // Inbox notifications for participants not currently viewing the
    // channel. Best effort: the message is already accepted, so failures
    // here are logged rather than failing the send.
    if let Err(e) = notify_participants(hub, store, sender, &message).await {
        warn!("Participant notification for {} failed: {}", message.id, e);
    }

    if is_flagged {
        info!(
            "Message {} flagged at {:?} (keywords: {:?})",
            message.id, analysis.risk_level, analysis.flagged_keywords
        );
        if let Err(e) = notify_moderators(hub, store, &message, &analysis).await {
            warn!("Moderator notification for {} failed: {}", message.id, e);
        }
    }

    // Emergency-type messages also go down the privileged fan-out path
    if message.message_type == MessageType::Emergency {
        let incident = EmergencyIncident {
            id: Uuid::new_v4(),
            incident_type: "emergency_message".to_string(),
            description: preview(&message.content),
            severity: Severity::High,
            created_at: message.created_at,
        };
        let delivered = hub.broadcast_incident(&incident).await;
        info!(
            "Emergency message {} relayed to {} privileged session(s)",
            message.id, delivered
        );
    }

    Ok(message)
}

async fn notify_participants(
    hub: &Dispatcher,
    store: &Arc<dyn RealtimeStore>,
    sender: &Sender,
    message: &Message,
) -> anyhow::Result<()> {
    let store_clone = store.clone();
    let channel_id = message.channel_id;
    let members =
        tokio::task::spawn_blocking(move || store_clone.channel_members(channel_id)).await??;

    let kind = match message.message_type {
        MessageType::Emergency => NotificationType::Emergency,
        MessageType::Announcement => NotificationType::Announcement,
        MessageType::Text => NotificationType::Message,
    };

    for member in members {
        if member == sender.user_id || hub.is_viewing(member, channel_id).await {
            continue;
        }
        let notification = Notification::new(
            member,
            kind,
            format!("New message from {}", sender.name),
            preview(&message.content),
            serde_json::json!({
                "channel_id": message.channel_id,
                "message_id": message.id,
            }),
        );
        deliver_notification(hub, store, notification).await?;
    }
    Ok(())
}

async fn notify_moderators(
    hub: &Dispatcher,
    store: &Arc<dyn RealtimeStore>,
    message: &Message,
    analysis: &campus_moderation::ContentAnalysisResult,
) -> anyhow::Result<()> {
    let store_clone = store.clone();
    let admins = tokio::task::spawn_blocking(move || store_clone.admin_user_ids()).await??;

    for admin in admins {
        let notification = Notification::new(
            admin,
            NotificationType::Moderation,
            "Message flagged for review",
            preview(&message.content),
            serde_json::json!({
                "message_id": message.id,
                "channel_id": message.channel_id,
                "risk_level": analysis.risk_level,
                "flagged_keywords": analysis.flagged_keywords,
            }),
        );
        deliver_notification(hub, store, notification).await?;
    }
    Ok(())
}

/// Relay an incident to every privileged session, and persist an inbox
/// entry per admin so disconnected admins catch up on next login. Returns
/// the number of live sessions reached.
pub async fn submit_incident(
    hub: &Dispatcher,
    store: &Arc<dyn RealtimeStore>,
    incident_type: &str,
    description: &str,
    severity: Severity,
) -> Result<(EmergencyIncident, usize), RealtimeError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(RealtimeError::Validation(
            "incident description is empty".into(),
        ));
    }

    let incident = EmergencyIncident {
        id: Uuid::new_v4(),
        incident_type: incident_type.to_string(),
        description: description.to_string(),
        severity,
        created_at: Utc::now(),
    };

    let delivered = hub.broadcast_incident(&incident).await;

    let store_clone = store.clone();
    let admins = tokio::task::spawn_blocking(move || store_clone.admin_user_ids())
        .await
        .map_err(|e| RealtimeError::Storage(e.to_string()))?
        .map_err(|e| RealtimeError::Storage(e.to_string()))?;

    for admin in admins {
        let notification = Notification::new(
            admin,
            NotificationType::Emergency,
            format!("Emergency: {}", incident.incident_type),
            preview(&incident.description),
            serde_json::json!({
                "incident_id": incident.id,
                "severity": incident.severity,
            }),
        );
        if let Err(e) = deliver_notification(hub, store, notification).await {
            warn!("Emergency notification to admin failed: {}", e);
        }
    }

    Ok((incident, delivered))
}

async fn deliver_notification(
    hub: &Dispatcher,
    store: &Arc<dyn RealtimeStore>,
    notification: Notification,
) -> anyhow::Result<()> {
    let store_clone = store.clone();
    let to_insert = notification.clone();
    tokio::task::spawn_blocking(move || store_clone.insert_notification(&to_insert)).await??;
    hub.notify_user(notification.user_id, notification).await;
    Ok(())
}

fn preview(content: &str) -> String {
    if content.len() <= PREVIEW_LEN {
        return content.to_string();
    }
    let mut end = PREVIEW_LEN;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &content[..end])
}
