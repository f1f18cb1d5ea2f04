use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;
use uuid::Uuid;

use campus_types::models::{Notification, NotificationType};

use crate::alerts::AlertSink;

pub type NotificationCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// Per-user inbox plus side effects. Each delivered notification updates
/// local state, fires the registered handler exactly once, and triggers the
/// side-channel alert. Alert failures are logged and never block delivery.
pub struct NotificationDispatcher {
    inbox: Mutex<HashMap<Uuid, Notification>>,
    handler: Mutex<Option<NotificationCallback>>,
    alerts: Arc<dyn AlertSink>,
}

impl NotificationDispatcher {
    pub fn new(alerts: Arc<dyn AlertSink>) -> Self {
        Self {
            inbox: Mutex::new(HashMap::new()),
            handler: Mutex::new(None),
            alerts,
        }
    }

    /// Register the handler. Last writer wins: a session has a single
    /// active notification surface at a time.
    pub fn set_handler(&self, callback: NotificationCallback) {
        *self.handler.lock().expect("handler lock poisoned") = Some(callback);
    }

    pub fn clear_handler(&self) {
        *self.handler.lock().expect("handler lock poisoned") = None;
    }

    /// Load previously persisted notifications without firing handlers or
    /// alerts. Used at session start so unread counts include history.
    pub fn seed(&self, notifications: Vec<Notification>) {
        let mut inbox = self.inbox.lock().expect("inbox lock poisoned");
        for n in notifications {
            inbox.entry(n.id).or_insert(n);
        }
    }

    /// Deliver a live notification. Returns false if this id was already
    /// delivered (the handler fires at most once per notification).
    pub fn deliver(&self, notification: Notification) -> bool {
        {
            let mut inbox = self.inbox.lock().expect("inbox lock poisoned");
            if inbox.contains_key(&notification.id) {
                return false;
            }
            inbox.insert(notification.id, notification.clone());
        }

        let handler = self
            .handler
            .lock()
            .expect("handler lock poisoned")
            .clone();
        if let Some(handler) = handler {
            handler(notification.clone());
        }

        // Side-channel alerts are fire and forget
        let is_emergency = notification.kind == NotificationType::Emergency;
        if let Err(e) = self.alerts.desktop_alert(
            &notification.title,
            &notification.message,
            &notification.id.to_string(),
            is_emergency,
        ) {
            warn!("Desktop alert failed for {}: {}", notification.id, e);
        }
        if is_emergency {
            if let Err(e) = self.alerts.emergency_cue() {
                warn!("Emergency cue failed for {}: {}", notification.id, e);
            }
        }

        true
    }

    /// Monotonic read transition. Unknown or already-read ids are a no-op.
    /// Returns true if the notification transitioned to read.
    pub fn mark_read(&self, id: Uuid) -> bool {
        let mut inbox = self.inbox.lock().expect("inbox lock poisoned");
        match inbox.get_mut(&id) {
            Some(n) if !n.is_read => {
                n.is_read = true;
                true
            }
            _ => false,
        }
    }

    pub fn unread_count(&self) -> usize {
        self.inbox
            .lock()
            .expect("inbox lock poisoned")
            .values()
            .filter(|n| !n.is_read)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn notification(kind: NotificationType) -> Notification {
        Notification::new(
            Uuid::new_v4(),
            kind,
            "Title",
            "Body",
            serde_json::json!({}),
        )
    }

    /// Sink that always fails, to prove alerts cannot block delivery.
    struct FailingSink {
        desktop_calls: AtomicUsize,
        cue_calls: AtomicUsize,
    }

    impl AlertSink for FailingSink {
        fn desktop_alert(&self, _: &str, _: &str, _: &str, _: bool) -> anyhow::Result<()> {
            self.desktop_calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("permission denied"))
        }
        fn emergency_cue(&self) -> anyhow::Result<()> {
            self.cue_calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("no audio device"))
        }
    }

    #[test]
    fn handler_fires_once_per_notification() {
        let dispatcher = NotificationDispatcher::new(Arc::new(crate::alerts::LogAlertSink));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        dispatcher.set_handler(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let n = notification(NotificationType::Message);
        assert!(dispatcher.deliver(n.clone()));
        assert!(!dispatcher.deliver(n));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn last_registered_handler_wins() {
        let dispatcher = NotificationDispatcher::new(Arc::new(crate::alerts::LogAlertSink));
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let c1 = first.clone();
        dispatcher.set_handler(Arc::new(move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = second.clone();
        dispatcher.set_handler(Arc::new(move |_| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.deliver(notification(NotificationType::Message));
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn alert_failure_does_not_block_delivery() {
        let sink = Arc::new(FailingSink {
            desktop_calls: AtomicUsize::new(0),
            cue_calls: AtomicUsize::new(0),
        });
        let dispatcher = NotificationDispatcher::new(sink.clone());

        assert!(dispatcher.deliver(notification(NotificationType::Emergency)));
        assert_eq!(dispatcher.unread_count(), 1);
        assert_eq!(sink.desktop_calls.load(Ordering::SeqCst), 1);
        // Audible cue fires for emergency type only
        assert_eq!(sink.cue_calls.load(Ordering::SeqCst), 1);

        assert!(dispatcher.deliver(notification(NotificationType::Message)));
        assert_eq!(sink.cue_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unread_count_tracks_read_transitions() {
        let dispatcher = NotificationDispatcher::new(Arc::new(crate::alerts::LogAlertSink));
        let a = notification(NotificationType::Message);
        let b = notification(NotificationType::Moderation);
        dispatcher.deliver(a.clone());
        dispatcher.deliver(b);
        assert_eq!(dispatcher.unread_count(), 2);

        assert!(dispatcher.mark_read(a.id));
        assert_eq!(dispatcher.unread_count(), 1);

        // Idempotent: marking again changes nothing
        assert!(!dispatcher.mark_read(a.id));
        assert_eq!(dispatcher.unread_count(), 1);

        // Unknown id is a no-op, not an error
        assert!(!dispatcher.mark_read(Uuid::new_v4()));
    }

    #[test]
    fn seed_does_not_fire_handler() {
        let dispatcher = NotificationDispatcher::new(Arc::new(crate::alerts::LogAlertSink));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        dispatcher.set_handler(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let mut read = notification(NotificationType::Message);
        read.is_read = true;
        dispatcher.seed(vec![read, notification(NotificationType::Message)]);

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.unread_count(), 1);
    }
}
