use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use campus_types::error::RealtimeError;
use campus_types::events::GatewayEvent;
use campus_types::models::{EmergencyIncident, Message, MessageType, Role};

use crate::alerts::AlertSink;
use crate::dispatcher::Dispatcher;
use crate::notifications::{NotificationCallback, NotificationDispatcher};
use crate::pipeline::{self, Sender};
use crate::registry::{ChannelRegistry, MessageCallback};
use crate::storage::RealtimeStore;

pub type IncidentCallback = Arc<dyn Fn(EmergencyIncident) + Send + Sync>;

struct Session {
    session_id: Uuid,
    task: JoinHandle<()>,
}

/// Session-scoped entry point to the realtime core. One instance per
/// authenticated session, constructed at session start and torn down with
/// [`RealtimeManager::cleanup`] — never a process-global.
///
/// The manager owns the only shared mutable state for its session: the
/// channel registry and the notification inbox. Neither is shared across
/// sessions.
pub struct RealtimeManager {
    user_id: Uuid,
    user_name: String,
    role: Role,
    hub: Dispatcher,
    store: Arc<dyn RealtimeStore>,
    registry: Arc<ChannelRegistry>,
    notifications: Arc<NotificationDispatcher>,
    incident_handler: Arc<Mutex<Option<IncidentCallback>>>,
    session: tokio::sync::Mutex<Option<Session>>,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl RealtimeManager {
    pub fn new(
        hub: Dispatcher,
        store: Arc<dyn RealtimeStore>,
        alerts: Arc<dyn AlertSink>,
        user_id: Uuid,
        user_name: impl Into<String>,
        role: Role,
        dedup_window: usize,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            role,
            hub,
            store,
            registry: Arc::new(ChannelRegistry::new(dedup_window)),
            notifications: Arc::new(NotificationDispatcher::new(alerts)),
            incident_handler: Arc::new(Mutex::new(None)),
            session: tokio::sync::Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Transport health flag. Disconnects land here instead of being thrown
    /// from every pending operation.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Establish the session: register with the hub (and the emergency
    /// fan-out when the role is privileged) and start the routing task.
    /// Idempotent per user — re-initialization replaces the prior session.
    pub async fn initialize(&self) -> Result<(), RealtimeError> {
        let mut session = self.session.lock().await;
        if let Some(prev) = session.take() {
            debug!("Re-initializing session for {}", self.user_id);
            prev.task.abort();
            self.hub
                .unregister_session(self.user_id, prev.session_id)
                .await;
        }

        let (session_id, mut targeted_rx) =
            self.hub.register_session(self.user_id, self.role).await;
        let mut broadcast_rx = self.hub.subscribe();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let registry = self.registry.clone();
        let notifications = self.notifications.clone();
        let incident_handler = self.incident_handler.clone();
        let connected = self.connected.clone();
        let generation_counter = self.generation.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = broadcast_rx.recv() => match result {
                        Ok(GatewayEvent::MessageCreate { message }) => {
                            registry.deliver_new(&message).await;
                        }
                        Ok(GatewayEvent::MessageUpdate { message }) => {
                            registry.deliver_update(&message).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Session event stream lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = targeted_rx.recv() => match event {
                        Some(GatewayEvent::NotificationCreate { notification }) => {
                            notifications.deliver(notification);
                        }
                        Some(GatewayEvent::EmergencyBroadcast { incident }) => {
                            let handler = incident_handler
                                .lock()
                                .expect("incident handler lock poisoned")
                                .clone();
                            if let Some(handler) = handler {
                                handler(incident);
                            }
                        }
                        Some(_) => {}
                        // Sender dropped: a newer session took over
                        None => break,
                    },
                }
            }
            // Only flip the flag if no newer session has started since
            if generation_counter.load(Ordering::SeqCst) == generation {
                connected.store(false, Ordering::SeqCst);
            }
        });

        *session = Some(Session { session_id, task });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Load persisted notifications into the session inbox so the unread
    /// count includes history, without firing handlers or alerts.
    pub async fn load_inbox(&self, limit: u32) -> Result<(), RealtimeError> {
        let store = self.store.clone();
        let user_id = self.user_id;
        let history =
            tokio::task::spawn_blocking(move || store.recent_notifications(user_id, limit))
                .await
                .map_err(|e| RealtimeError::Storage(e.to_string()))?
                .map_err(|e| RealtimeError::Storage(e.to_string()))?;
        self.notifications.seed(history);
        Ok(())
    }

    /// Register the notification handler. Last writer wins: one active
    /// notification surface per session.
    pub fn on_notification(&self, callback: NotificationCallback) {
        self.notifications.set_handler(callback);
    }

    /// Register the emergency incident handler. Last writer wins.
    pub fn on_emergency_incident(&self, callback: IncidentCallback) {
        *self
            .incident_handler
            .lock()
            .expect("incident handler lock poisoned") = Some(callback);
    }

    /// Register interest in a channel. Every subsequent message on it is
    /// delivered to `on_message` exactly once — including this session's
    /// own sends, so local echo shares the receive path.
    pub async fn subscribe_to_channel(
        &self,
        channel_id: Uuid,
        on_message: MessageCallback,
    ) -> Result<(), RealtimeError> {
        self.registry.insert(channel_id, on_message).await;
        self.hub.set_viewing(self.user_id, channel_id, true).await;
        Ok(())
    }

    /// Remove the channel callback. Effective for every message published
    /// after this returns; unsubscribing a channel that was never
    /// subscribed is a no-op.
    pub async fn unsubscribe_from_channel(&self, channel_id: Uuid) -> Result<(), RealtimeError> {
        self.registry.remove(channel_id).await;
        self.hub.set_viewing(self.user_id, channel_id, false).await;
        Ok(())
    }

    /// Validate, persist, and fan out a message. Fails fast with `Send`
    /// while disconnected; a failure never clears or corrupts session
    /// state, so the caller can retry with the composed text intact.
    pub async fn send_message(
        &self,
        channel_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> Result<Message, RealtimeError> {
        if !self.is_connected() {
            return Err(RealtimeError::Send("session is disconnected".into()));
        }
        let sender = Sender {
            user_id: self.user_id,
            name: self.user_name.clone(),
            role: self.role,
        };
        pipeline::submit_message(&self.hub, &self.store, &sender, channel_id, content, message_type)
            .await
    }

    /// Idempotent read transition; already-read ids are a no-op.
    pub async fn mark_notification_as_read(
        &self,
        notification_id: Uuid,
    ) -> Result<(), RealtimeError> {
        self.notifications.mark_read(notification_id);

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.mark_notification_read(notification_id))
            .await
            .map_err(|e| RealtimeError::Storage(e.to_string()))?
            .map_err(|e| RealtimeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Count of unread notifications in the session inbox. Never fails;
    /// during storage trouble it reflects the last-known-good state.
    pub fn get_unread_notification_count(&self) -> usize {
        self.notifications.unread_count()
    }

    /// Deterministic teardown of subscriptions, handlers, and the session
    /// registration. Safe to call any number of times.
    pub async fn cleanup(&self) {
        let mut session = self.session.lock().await;
        if let Some(prev) = session.take() {
            prev.task.abort();
            self.hub
                .unregister_session(self.user_id, prev.session_id)
                .await;
        }
        self.registry.clear().await;
        self.notifications.clear_handler();
        *self
            .incident_handler
            .lock()
            .expect("incident handler lock poisoned") = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogAlertSink;
    use crate::storage::testing::MemoryStore;
    use campus_types::models::{Notification, NotificationType, Severity};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn manager(
        hub: &Dispatcher,
        store: &Arc<MemoryStore>,
        role: Role,
    ) -> (RealtimeManager, Uuid) {
        let user_id = Uuid::new_v4();
        let manager = RealtimeManager::new(
            hub.clone(),
            store.clone() as Arc<dyn RealtimeStore>,
            Arc::new(LogAlertSink),
            user_id,
            "Test User",
            role,
            16,
        );
        (manager, user_id)
    }

    fn collector() -> (MessageCallback, Arc<Mutex<Vec<Uuid>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: MessageCallback = Arc::new(move |m: Message| {
            sink.lock().unwrap().push(m.id);
        });
        (cb, seen)
    }

    /// Routing is asynchronous; poll until the condition holds or time out.
    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[tokio::test]
    async fn sender_receives_own_message_through_subscription() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, _) = manager(&hub, &store, Role::Teacher);
        manager.initialize().await.unwrap();

        let channel = Uuid::new_v4();
        let (cb, seen) = collector();
        manager.subscribe_to_channel(channel, cb).await.unwrap();

        let sent = manager
            .send_message(channel, "Reminder: field trip forms due", MessageType::Text)
            .await
            .unwrap();

        wait_until(|| !seen.lock().unwrap().is_empty()).await;
        assert_eq!(seen.lock().unwrap().as_slice(), &[sent.id]);
        assert_eq!(store.messages.lock().unwrap().len(), 1);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn transport_redelivery_is_deduplicated() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, _) = manager(&hub, &store, Role::Student);
        manager.initialize().await.unwrap();

        let channel = Uuid::new_v4();
        let (cb, seen) = collector();
        manager.subscribe_to_channel(channel, cb).await.unwrap();

        let message = Message {
            id: Uuid::new_v4(),
            channel_id: channel,
            sender_id: Uuid::new_v4(),
            sender_name: "peer".into(),
            sender_role: Role::Student,
            content: "hello".into(),
            message_type: MessageType::Text,
            created_at: chrono::Utc::now(),
            is_flagged: false,
            is_deleted: false,
        };

        // Simulate a reconnect burst: same message id arrives three times
        hub.publish_message(message.clone());
        hub.publish_message(message.clone());
        hub.publish_message(message.clone());

        wait_until(|| !seen.lock().unwrap().is_empty()).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn unsubscribe_stops_subsequent_deliveries() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, _) = manager(&hub, &store, Role::Parent);
        manager.initialize().await.unwrap();

        let channel = Uuid::new_v4();
        let (cb, seen) = collector();
        manager.subscribe_to_channel(channel, cb).await.unwrap();

        let mut message = Message {
            id: Uuid::new_v4(),
            channel_id: channel,
            sender_id: Uuid::new_v4(),
            sender_name: "peer".into(),
            sender_role: Role::Teacher,
            content: "before".into(),
            message_type: MessageType::Text,
            created_at: chrono::Utc::now(),
            is_flagged: false,
            is_deleted: false,
        };
        hub.publish_message(message.clone());
        wait_until(|| seen.lock().unwrap().len() == 1).await;

        manager.unsubscribe_from_channel(channel).await.unwrap();

        message.id = Uuid::new_v4();
        message.content = "after".into();
        hub.publish_message(message);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(seen.lock().unwrap().len(), 1);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn empty_content_fails_validation_without_side_effects() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, _) = manager(&hub, &store, Role::Student);
        manager.initialize().await.unwrap();

        let channel = Uuid::new_v4();
        let (cb, seen) = collector();
        manager.subscribe_to_channel(channel, cb).await.unwrap();

        let result = manager.send_message(channel, "   ", MessageType::Text).await;
        assert!(matches!(result, Err(RealtimeError::Validation(_))));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.messages.lock().unwrap().is_empty());
        assert!(seen.lock().unwrap().is_empty());

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn persistence_failure_surfaces_as_send_error() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        store.fail_inserts.store(true, Ordering::Relaxed);
        let (manager, _) = manager(&hub, &store, Role::Teacher);
        manager.initialize().await.unwrap();

        let result = manager
            .send_message(Uuid::new_v4(), "hello", MessageType::Text)
            .await;
        assert!(matches!(result, Err(RealtimeError::Send(_))));

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn emergency_reaches_privileged_sessions_only() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());

        let (admin_a, _) = manager(&hub, &store, Role::Admin);
        let (admin_b, _) = manager(&hub, &store, Role::Admin);
        let (student, _) = manager(&hub, &store, Role::Student);
        admin_a.initialize().await.unwrap();
        admin_b.initialize().await.unwrap();
        student.initialize().await.unwrap();

        let admin_hits = Arc::new(AtomicUsize::new(0));
        let student_hits = Arc::new(AtomicUsize::new(0));
        for m in [&admin_a, &admin_b] {
            let hits = admin_hits.clone();
            m.on_emergency_incident(Arc::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let hits = student_hits.clone();
        student.on_emergency_incident(Arc::new(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
        }));

        let store_dyn: Arc<dyn RealtimeStore> = store.clone();
        let (_, delivered) = pipeline::submit_incident(
            &hub,
            &store_dyn,
            "lockdown",
            "Unauthorized person at the east entrance",
            Severity::Critical,
        )
        .await
        .unwrap();
        assert_eq!(delivered, 2);

        wait_until(|| admin_hits.load(Ordering::SeqCst) == 2).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(student_hits.load(Ordering::SeqCst), 0);

        admin_a.cleanup().await;
        admin_b.cleanup().await;
        student.cleanup().await;
    }

    #[tokio::test]
    async fn emergency_message_type_triggers_privileged_fanout() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());

        let (admin, _) = manager(&hub, &store, Role::Admin);
        admin.initialize().await.unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        admin.on_emergency_incident(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let (teacher, _) = manager(&hub, &store, Role::Teacher);
        teacher.initialize().await.unwrap();
        teacher
            .send_message(Uuid::new_v4(), "Evacuate the gym now", MessageType::Emergency)
            .await
            .unwrap();

        wait_until(|| hits.load(Ordering::SeqCst) == 1).await;

        admin.cleanup().await;
        teacher.cleanup().await;
    }

    #[tokio::test]
    async fn unread_count_follows_live_stream_and_read_transitions() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, user_id) = manager(&hub, &store, Role::Parent);
        manager.initialize().await.unwrap();

        let notification = Notification::new(
            user_id,
            NotificationType::Message,
            "New message",
            "You have a new message",
            serde_json::json!({}),
        );
        hub.notify_user(user_id, notification.clone()).await;
        wait_until(|| manager.get_unread_notification_count() == 1).await;

        manager
            .mark_notification_as_read(notification.id)
            .await
            .unwrap();
        assert_eq!(manager.get_unread_notification_count(), 0);

        // Marking again is a no-op, not an error
        manager
            .mark_notification_as_read(notification.id)
            .await
            .unwrap();
        assert_eq!(manager.get_unread_notification_count(), 0);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn flagged_message_alerts_moderators_but_still_delivers() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());

        let (admin, admin_id) = manager(&hub, &store, Role::Admin);
        store.admins.lock().unwrap().push(admin_id);
        admin.initialize().await.unwrap();

        let moderation_hits = Arc::new(AtomicUsize::new(0));
        let hits = moderation_hits.clone();
        admin.on_notification(Arc::new(move |n: Notification| {
            if n.kind == NotificationType::Moderation {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let (student, _) = manager(&hub, &store, Role::Student);
        student.initialize().await.unwrap();

        let sent = student
            .send_message(Uuid::new_v4(), "you are worthless", MessageType::Text)
            .await
            .unwrap();
        assert!(sent.is_flagged);
        assert_eq!(store.messages.lock().unwrap().len(), 1);

        wait_until(|| moderation_hits.load(Ordering::SeqCst) == 1).await;

        admin.cleanup().await;
        student.cleanup().await;
    }

    #[tokio::test]
    async fn cleanup_is_idempotent_and_leaves_no_dangling_callbacks() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, _) = manager(&hub, &store, Role::Teacher);
        manager.initialize().await.unwrap();

        let channel = Uuid::new_v4();
        let (cb, seen) = collector();
        manager.subscribe_to_channel(channel, cb).await.unwrap();

        manager.cleanup().await;
        manager.cleanup().await;
        assert!(!manager.is_connected());

        hub.publish_message(Message {
            id: Uuid::new_v4(),
            channel_id: channel,
            sender_id: Uuid::new_v4(),
            sender_name: "peer".into(),
            sender_role: Role::Teacher,
            content: "into the void".into(),
            message_type: MessageType::Text,
            created_at: chrono::Utc::now(),
            is_flagged: false,
            is_deleted: false,
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reinitialize_replaces_prior_session() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let (manager, user_id) = manager(&hub, &store, Role::Teacher);

        manager.initialize().await.unwrap();
        manager.initialize().await.unwrap();
        assert!(manager.is_connected());

        let notification = Notification::new(
            user_id,
            NotificationType::Message,
            "still here",
            "delivered to the replacement session",
            serde_json::json!({}),
        );
        hub.notify_user(user_id, notification).await;
        wait_until(|| manager.get_unread_notification_count() == 1).await;

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn participants_not_viewing_get_inbox_notifications() {
        let hub = Dispatcher::new();
        let store = Arc::new(MemoryStore::default());
        let channel = Uuid::new_v4();

        let (sender, sender_id) = manager(&hub, &store, Role::Teacher);
        let (viewer, viewer_id) = manager(&hub, &store, Role::Student);
        let (absent, absent_id) = manager(&hub, &store, Role::Parent);
        sender.initialize().await.unwrap();
        viewer.initialize().await.unwrap();
        absent.initialize().await.unwrap();

        store
            .members
            .lock()
            .unwrap()
            .insert(channel, vec![sender_id, viewer_id, absent_id]);

        // Viewer is watching the thread; absent parent is not
        let (cb, _) = collector();
        viewer.subscribe_to_channel(channel, cb).await.unwrap();

        sender
            .send_message(channel, "Progress reports are out", MessageType::Text)
            .await
            .unwrap();

        wait_until(|| absent.get_unread_notification_count() == 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(viewer.get_unread_notification_count(), 0);
        assert_eq!(sender.get_unread_notification_count(), 0);

        sender.cleanup().await;
        viewer.cleanup().await;
        absent.cleanup().await;
    }
}
