pub mod telegram;

use crate::error::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub disable_link_preview: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            disable_link_preview: true,
        }
    }
}

/// Where formatted offers end up.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: &str, text: &str, opts: SendOptions) -> Result<(), SinkError>;

    fn name(&self) -> &'static str;
}

/// Dry-run sink: logs messages instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: &str, text: &str, _opts: SendOptions) -> Result<(), SinkError> {
        tracing::info!(target: "notify", %channel, "dry run, not sending:\n{text}");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
