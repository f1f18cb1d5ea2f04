use anyhow::Result;
use uuid::Uuid;

use campus_types::models::{Message, Notification, Role};

/// Seam to the durable store. The realtime core persists through this trait
/// so sessions can be exercised against an in-memory store in tests and the
/// server can plug in SQLite.
pub trait RealtimeStore: Send + Sync {
    fn insert_message(&self, message: &Message) -> Result<()>;
    fn insert_notification(&self, notification: &Notification) -> Result<()>;
    fn mark_notification_read(&self, id: Uuid) -> Result<bool>;
    fn recent_notifications(&self, user_id: Uuid, limit: u32) -> Result<Vec<Notification>>;
    fn channel_members(&self, channel_id: Uuid) -> Result<Vec<Uuid>>;
    fn admin_user_ids(&self) -> Result<Vec<Uuid>>;
}

impl RealtimeStore for campus_db::Database {
    fn insert_message(&self, message: &Message) -> Result<()> {
        campus_db::Database::insert_message(self, message)
    }

    fn insert_notification(&self, notification: &Notification) -> Result<()> {
        campus_db::Database::insert_notification(self, notification)
    }

    fn mark_notification_read(&self, id: Uuid) -> Result<bool> {
        campus_db::Database::mark_notification_read(self, &id.to_string())
    }

    fn recent_notifications(&self, user_id: Uuid, limit: u32) -> Result<Vec<Notification>> {
        let rows = self.get_notifications(&user_id.to_string(), limit)?;
        Ok(rows.into_iter().map(|r| r.into_notification()).collect())
    }

    fn channel_members(&self, channel_id: Uuid) -> Result<Vec<Uuid>> {
        let ids = campus_db::Database::channel_members(self, &channel_id.to_string())?;
        Ok(ids.iter().filter_map(|id| id.parse().ok()).collect())
    }

    fn admin_user_ids(&self) -> Result<Vec<Uuid>> {
        let ids = self.users_with_role(Role::Admin)?;
        Ok(ids.iter().filter_map(|id| id.parse().ok()).collect())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store for session tests.
    #[derive(Default)]
    pub struct MemoryStore {
        pub messages: Mutex<Vec<Message>>,
        pub notifications: Mutex<Vec<Notification>>,
        pub members: Mutex<HashMap<Uuid, Vec<Uuid>>>,
        pub admins: Mutex<Vec<Uuid>>,
        pub fail_inserts: std::sync::atomic::AtomicBool,
    }

    impl RealtimeStore for MemoryStore {
        fn insert_message(&self, message: &Message) -> Result<()> {
            if self.fail_inserts.load(std::sync::atomic::Ordering::Relaxed) {
                anyhow::bail!("store unavailable");
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        fn insert_notification(&self, notification: &Notification) -> Result<()> {
            self.notifications.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn mark_notification_read(&self, id: Uuid) -> Result<bool> {
            let mut all = self.notifications.lock().unwrap();
            for n in all.iter_mut() {
                if n.id == id && !n.is_read {
                    n.is_read = true;
                    return Ok(true);
                }
            }
            Ok(false)
        }

        fn recent_notifications(&self, user_id: Uuid, limit: u32) -> Result<Vec<Notification>> {
            let all = self.notifications.lock().unwrap();
            Ok(all
                .iter()
                .filter(|n| n.user_id == user_id)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        fn channel_members(&self, channel_id: Uuid) -> Result<Vec<Uuid>> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .get(&channel_id)
                .cloned()
                .unwrap_or_default())
        }

        fn admin_user_ids(&self) -> Result<Vec<Uuid>> {
            Ok(self.admins.lock().unwrap().clone())
        }
    }
}
