use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use shelfwatch_common::DeliveryError;

use super::sink::NotifySink;

/// Sink for environments with no webhook configured. Accepts everything and
/// logs a one-line summary so dry runs still show what would have gone out.
pub struct NoopSink;

#[async_trait]
impl NotifySink for NoopSink {
    async fn post(&self, content: &str) -> Result<(), DeliveryError> {
        info!(
            bytes = self.measure(content),
            first_line = content.lines().next().unwrap_or(""),
            "Webhook disabled, dropping message"
        );
        Ok(())
    }

    fn measure(&self, content: &str) -> usize {
        // Same wire shape the real sink would use, so chunking dry-runs match.
        serde_json::to_vec(&json!({
            "msgtype": "markdown",
            "markdown": { "content": content },
        }))
        .map(|v| v.len())
        .unwrap_or(usize::MAX)
    }

    fn name(&self) -> &str {
        "noop"
    }
}
