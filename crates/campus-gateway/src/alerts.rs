use anyhow::Result;
use tracing::debug;

/// Side-channel alert primitives consumed by the notification dispatcher.
/// Implementations live in client adapters (desktop notification API, audio
/// cue); delivery never depends on them succeeding.
pub trait AlertSink: Send + Sync {
    /// Desktop-style notification. `tag` collapses repeats of the same
    /// notification; `require_interaction` keeps emergency alerts on screen.
    fn desktop_alert(
        &self,
        title: &str,
        body: &str,
        tag: &str,
        require_interaction: bool,
    ) -> Result<()>;

    /// Audible cue, fired for emergency-type notifications only.
    fn emergency_cue(&self) -> Result<()>;
}

/// Default sink for headless deployments: logs instead of alerting.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn desktop_alert(
        &self,
        title: &str,
        _body: &str,
        tag: &str,
        require_interaction: bool,
    ) -> Result<()> {
        debug!(
            "desktop alert: '{}' (tag={}, require_interaction={})",
            title, tag, require_interaction
        );
        Ok(())
    }

    fn emergency_cue(&self) -> Result<()> {
        debug!("emergency audio cue");
        Ok(())
    }
}
