use crate::models::{
    self, MessageRow, NotificationRow,
};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

use campus_types::models::{ChannelKind, Message, Notification, Role};

impl Database {
    // -- Channels --

    pub fn create_channel(&self, id: &str, kind: ChannelKind) -> Result<()> {
        let kind = match kind {
            ChannelKind::Direct => "direct",
            ChannelKind::ClassAnnouncement => "class_announcement",
            ChannelKind::Emergency => "emergency",
        };
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, kind, created_at) VALUES (?1, ?2, datetime('now'))",
                (id, kind),
            )?;
            Ok(())
        })
    }

    pub fn add_channel_member(&self, channel_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
                (channel_id, user_id),
            )?;
            Ok(())
        })
    }

    pub fn channel_exists(&self, channel_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM channels WHERE id = ?1",
                [channel_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    pub fn channel_members(&self, channel_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM channel_members WHERE channel_id = ?1")?;
            let rows = stmt
                .query_map([channel_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    pub fn channels_for_user(&self, user_id: &str) -> Result<Vec<(String, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.kind FROM channels c
                 JOIN channel_members m ON m.channel_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.created_at",
            )?;
            let rows = stmt
                .query_map([user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- User directory --

    pub fn upsert_user_role(&self, user_id: &str, role: Role) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_roles (user_id, role) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET role = excluded.role",
                (user_id, models::role_to_str(role)),
            )?;
            Ok(())
        })
    }

    pub fn users_with_role(&self, role: Role) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT user_id FROM user_roles WHERE role = ?1")?;
            let rows = stmt
                .query_map([models::role_to_str(role)], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, channel_id, sender_id, sender_name, sender_role, content,
                     message_type, is_flagged, is_deleted, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    message.id.to_string(),
                    message.channel_id.to_string(),
                    message.sender_id.to_string(),
                    message.sender_name,
                    models::role_to_str(message.sender_role),
                    message.content,
                    models::message_type_to_str(message.message_type),
                    message.is_flagged,
                    message.is_deleted,
                    message.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, sender_id, sender_name, sender_role, content,
                        message_type, is_flagged, is_deleted, created_at
                 FROM messages WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // Cursor-based pagination: `before` is the created_at of the
            // oldest message from the previous page.
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, sender_id, sender_name, sender_role, content,
                        message_type, is_flagged, is_deleted, created_at
                 FROM messages
                 WHERE channel_id = ?1 AND (?2 IS NULL OR created_at < ?2)
                 ORDER BY created_at DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![channel_id, before, limit], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flag a message. Sticky: the first flag wins, later calls are no-ops.
    /// Returns true if the row transitioned.
    pub fn flag_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_flagged = 1 WHERE id = ?1 AND is_flagged = 0",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Soft-delete: content is replaced by the tombstone marker so thread
    /// history keeps its shape. Returns true if the row transitioned.
    pub fn soft_delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_deleted = 1, content = ?2
                 WHERE id = ?1 AND is_deleted = 0",
                rusqlite::params![id, campus_types::models::DELETED_TOMBSTONE],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Notifications --

    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                    (id, user_id, type, title, message, data, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    notification.id.to_string(),
                    notification.user_id.to_string(),
                    models::notification_type_to_str(notification.kind),
                    notification.title,
                    notification.message,
                    serde_json::to_string(&notification.data)?,
                    notification.is_read,
                    notification.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_notifications(&self, user_id: &str, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, type, title, message, data, is_read, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], |row| {
                    Ok(NotificationRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        message: row.get(4)?,
                        data: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Read transition is monotonic: false -> true, never back. Marking an
    /// already-read notification is a no-op. Returns true if it transitioned.
    pub fn mark_notification_read(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications
                 SET is_read = 1, read_at = datetime('now')
                 WHERE id = ?1 AND is_read = 0",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn unread_count(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_name: row.get(3)?,
        sender_role: row.get(4)?,
        content: row.get(5)?,
        message_type: row.get(6)?,
        is_flagged: row.get(7)?,
        is_deleted: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_types::models::{
        DELETED_TOMBSTONE, MessageType, Notification, NotificationType,
    };
    use chrono::Utc;
    use uuid::Uuid;

    fn test_message(channel_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            channel_id,
            sender_id: Uuid::new_v4(),
            sender_name: "Ms. Rivera".to_string(),
            sender_role: Role::Teacher,
            content: "Homework is due Friday".to_string(),
            message_type: MessageType::Text,
            created_at: Utc::now(),
            is_flagged: false,
            is_deleted: false,
        }
    }

    fn seeded_db() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let channel_id = Uuid::new_v4();
        db.create_channel(&channel_id.to_string(), ChannelKind::Direct)
            .unwrap();
        (db, channel_id)
    }

    #[test]
    fn message_roundtrip_preserves_fields() {
        let (db, channel_id) = seeded_db();
        let message = test_message(channel_id);
        db.insert_message(&message).unwrap();

        let rows = db.get_messages(&channel_id.to_string(), 50, None).unwrap();
        assert_eq!(rows.len(), 1);
        let loaded = rows.into_iter().next().unwrap().into_message();
        assert_eq!(loaded.id, message.id);
        assert_eq!(loaded.sender_role, Role::Teacher);
        assert_eq!(loaded.content, message.content);
        assert!(!loaded.is_flagged);
    }

    #[test]
    fn flag_is_sticky() {
        let (db, channel_id) = seeded_db();
        let message = test_message(channel_id);
        db.insert_message(&message).unwrap();
        let id = message.id.to_string();

        assert!(db.flag_message(&id).unwrap());
        // Second flag (same or different user) is a no-op
        assert!(!db.flag_message(&id).unwrap());
        assert!(db.get_message(&id).unwrap().unwrap().is_flagged);
    }

    #[test]
    fn soft_delete_writes_tombstone() {
        let (db, channel_id) = seeded_db();
        let message = test_message(channel_id);
        db.insert_message(&message).unwrap();
        let id = message.id.to_string();

        assert!(db.soft_delete_message(&id).unwrap());
        assert!(!db.soft_delete_message(&id).unwrap());

        let row = db.get_message(&id).unwrap().unwrap();
        assert!(row.is_deleted);
        assert_eq!(row.content, DELETED_TOMBSTONE);
    }

    #[test]
    fn mark_read_is_monotonic_and_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        let notification = Notification::new(
            user_id,
            NotificationType::Message,
            "New message",
            "You have a new message",
            serde_json::json!({}),
        );
        db.insert_notification(&notification).unwrap();

        let uid = user_id.to_string();
        assert_eq!(db.unread_count(&uid).unwrap(), 1);

        assert!(db.mark_notification_read(&notification.id.to_string()).unwrap());
        assert_eq!(db.unread_count(&uid).unwrap(), 0);

        // Already read: no-op, not an error, count unchanged
        assert!(!db.mark_notification_read(&notification.id.to_string()).unwrap());
        assert_eq!(db.unread_count(&uid).unwrap(), 0);
    }

    #[test]
    fn pagination_cursor_returns_older_messages() {
        let (db, channel_id) = seeded_db();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut m = test_message(channel_id);
            m.content = format!("message {}", i);
            m.created_at = Utc::now() + chrono::Duration::seconds(i);
            ids.push(m.id);
            db.insert_message(&m).unwrap();
        }

        let first_page = db.get_messages(&channel_id.to_string(), 2, None).unwrap();
        assert_eq!(first_page.len(), 2);
        let cursor = first_page.last().unwrap().created_at.clone();

        let second_page = db
            .get_messages(&channel_id.to_string(), 10, Some(&cursor))
            .unwrap();
        assert_eq!(second_page.len(), 3);
    }

    #[test]
    fn role_directory_filters_by_role() {
        let db = Database::open_in_memory().unwrap();
        let admin = Uuid::new_v4();
        let student = Uuid::new_v4();
        db.upsert_user_role(&admin.to_string(), Role::Admin).unwrap();
        db.upsert_user_role(&student.to_string(), Role::Student).unwrap();

        let admins = db.users_with_role(Role::Admin).unwrap();
        assert_eq!(admins, vec![admin.to_string()]);
    }
}
