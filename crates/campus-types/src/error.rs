use thiserror::Error;

/// Error taxonomy for the realtime core.
///
/// Transport loss is surfaced as `Connection` once per lifecycle transition
/// and otherwise as the manager's `is_connected` flag; it is never bubbled
/// through every pending operation. `Validation` is caller-correctable and
/// never retried automatically. `Send` means validation passed but
/// persistence or fan-out failed, and must reach the caller.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("connection unavailable: {0}")]
    Connection(String),

    #[error("invalid content: {0}")]
    Validation(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("storage error: {0}")]
    Storage(String),
}
