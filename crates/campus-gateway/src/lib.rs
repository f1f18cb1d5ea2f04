//! Realtime communication core: channel pub/sub, per-user notification
//! inboxes, and emergency fan-out to privileged sessions.
//!
//! The [`dispatcher::Dispatcher`] is the process-wide hub; each connected
//! session owns a [`manager::RealtimeManager`] that routes hub events to
//! its local subscriptions and inbox. [`connection`] adapts the whole thing
//! to a WebSocket.

pub mod alerts;
pub mod connection;
pub mod dispatcher;
pub mod emergency;
pub mod manager;
pub mod notifications;
pub mod pipeline;
pub mod registry;
pub mod storage;

/// Per-channel dedup window: how many recently-seen message ids a session
/// remembers per channel. Sized to absorb one reconnect cycle's worth of
/// transport redelivery; tune via `CAMPUS_DEDUP_WINDOW`.
pub const DEFAULT_DEDUP_WINDOW: usize = 256;

/// Dedup window from the environment, falling back to the default on a
/// missing or unparseable `CAMPUS_DEDUP_WINDOW`.
pub fn dedup_window_from_env() -> usize {
    std::env::var("CAMPUS_DEDUP_WINDOW")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DEDUP_WINDOW)
}
