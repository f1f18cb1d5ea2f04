use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use campus_types::events::GatewayEvent;
use campus_types::models::{EmergencyIncident, Message, Notification, Role};

use crate::emergency::EmergencyBroadcast;

/// Process-wide hub. Channel-scoped events go over a broadcast channel and
/// are filtered per session by its registry; notifications and emergency
/// incidents go over per-session targeted channels.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Channel-scoped events — every session receives and filters locally
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (session_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,

    /// Channels each user is actively viewing; used to decide whether a
    /// participant gets an inbox notification for a message
    viewing: RwLock<HashMap<Uuid, HashSet<Uuid>>>,

    emergency: EmergencyBroadcast,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
                viewing: RwLock::new(HashMap::new()),
                emergency: EmergencyBroadcast::new(),
            }),
        }
    }

    /// Subscribe to the channel-scoped event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Register a session for a user. A re-registration replaces the prior
    /// session's channel: single active session per user. Privileged roles
    /// are enrolled for emergency fan-out.
    pub async fn register_session(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let session_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        if role.is_privileged() {
            self.inner
                .emergency
                .register(user_id, session_id, tx.clone())
                .await;
        }

        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (session_id, tx));

        debug!("Session {} registered for user {}", session_id, user_id);
        (session_id, rx)
    }

    /// Tear down a session, but only if session_id still owns the slot.
    pub async fn unregister_session(&self, user_id: Uuid, session_id: Uuid) {
        {
            let mut channels = self.inner.user_channels.write().await;
            if let Some((stored, _)) = channels.get(&user_id) {
                if *stored == session_id {
                    channels.remove(&user_id);
                    self.inner.viewing.write().await.remove(&user_id);
                }
            }
        }
        self.inner.emergency.unregister(user_id, session_id).await;
    }

    /// Fan a newly accepted message out to all sessions.
    pub fn publish_message(&self, message: Message) {
        let _ = self
            .inner
            .broadcast_tx
            .send(GatewayEvent::MessageCreate { message });
    }

    /// Fan out a flag/soft-delete transition so thread views converge.
    pub fn publish_message_update(&self, message: Message) {
        let _ = self
            .inner
            .broadcast_tx
            .send(GatewayEvent::MessageUpdate { message });
    }

    /// Targeted notification delivery. Returns true if the user has a live
    /// session that accepted the event.
    pub async fn notify_user(&self, user_id: Uuid, notification: Notification) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx
                .send(GatewayEvent::NotificationCreate { notification })
                .is_ok(),
            None => false,
        }
    }

    /// Unconditional fan-out to privileged sessions.
    pub async fn broadcast_incident(&self, incident: &EmergencyIncident) -> usize {
        self.inner.emergency.broadcast(incident).await
    }

    // -- Viewing state --

    pub async fn set_viewing(&self, user_id: Uuid, channel_id: Uuid, viewing: bool) {
        let mut map = self.inner.viewing.write().await;
        if viewing {
            map.entry(user_id).or_default().insert(channel_id);
        } else if let Some(channels) = map.get_mut(&user_id) {
            channels.remove(&channel_id);
        }
    }

    pub async fn is_viewing(&self, user_id: Uuid, channel_id: Uuid) -> bool {
        self.inner
            .viewing
            .read()
            .await
            .get(&user_id)
            .is_some_and(|channels| channels.contains(&channel_id))
    }

    pub async fn has_session(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
