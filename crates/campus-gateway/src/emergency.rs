use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc};
use tracing::{info, warn};
use uuid::Uuid;

use campus_types::events::GatewayEvent;
use campus_types::models::EmergencyIncident;

/// Privileged fan-out path. Sessions whose role is admin-class are enrolled
/// at registration time; every incident goes to all of them, with no
/// subscription step. Delivery to disconnected sessions is not attempted —
/// the durable store covers catch-up.
#[derive(Default)]
pub struct EmergencyBroadcast {
    recipients: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl EmergencyBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        tx: mpsc::UnboundedSender<GatewayEvent>,
    ) {
        self.recipients
            .write()
            .await
            .insert(user_id, (session_id, tx));
    }

    /// Unregister, but only if the session still owns the slot. A newer
    /// session for the same user must not be torn down by a stale one.
    pub async fn unregister(&self, user_id: Uuid, session_id: Uuid) {
        let mut recipients = self.recipients.write().await;
        if let Some((stored, _)) = recipients.get(&user_id) {
            if *stored == session_id {
                recipients.remove(&user_id);
            }
        }
    }

    /// Deliver to every currently-enrolled privileged session. Returns how
    /// many sessions accepted the event.
    pub async fn broadcast(&self, incident: &EmergencyIncident) -> usize {
        let recipients = self.recipients.read().await;
        let mut delivered = 0;
        for (user_id, (_, tx)) in recipients.iter() {
            let event = GatewayEvent::EmergencyBroadcast {
                incident: incident.clone(),
            };
            if tx.send(event).is_ok() {
                delivered += 1;
            } else {
                warn!("Emergency delivery to {} failed: session gone", user_id);
            }
        }
        info!(
            "Emergency incident {} ({}) delivered to {} privileged session(s)",
            incident.id, incident.incident_type, delivered
        );
        delivered
    }

    pub async fn recipient_count(&self) -> usize {
        self.recipients.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_types::models::Severity;
    use chrono::Utc;

    fn incident() -> EmergencyIncident {
        EmergencyIncident {
            id: Uuid::new_v4(),
            incident_type: "lockdown".into(),
            description: "drill".into(),
            severity: Severity::High,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_all_registered_sessions() {
        let broadcast = EmergencyBroadcast::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        broadcast.register(Uuid::new_v4(), Uuid::new_v4(), tx1).await;
        broadcast.register(Uuid::new_v4(), Uuid::new_v4(), tx2).await;

        assert_eq!(broadcast.broadcast(&incident()).await, 2);
        assert!(matches!(
            rx1.try_recv().unwrap(),
            GatewayEvent::EmergencyBroadcast { .. }
        ));
        assert!(matches!(
            rx2.try_recv().unwrap(),
            GatewayEvent::EmergencyBroadcast { .. }
        ));
    }

    #[tokio::test]
    async fn stale_session_cannot_unregister_newer_one() {
        let broadcast = EmergencyBroadcast::new();
        let user = Uuid::new_v4();
        let old_session = Uuid::new_v4();
        let new_session = Uuid::new_v4();

        let (tx_old, _rx_old) = mpsc::unbounded_channel();
        let (tx_new, mut rx_new) = mpsc::unbounded_channel();
        broadcast.register(user, old_session, tx_old).await;
        broadcast.register(user, new_session, tx_new).await;

        // Old session disconnects late; the new registration must survive
        broadcast.unregister(user, old_session).await;
        assert_eq!(broadcast.recipient_count().await, 1);
        assert_eq!(broadcast.broadcast(&incident()).await, 1);
        assert!(rx_new.try_recv().is_ok());
    }
}
