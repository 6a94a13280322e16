use async_trait::async_trait;

use shelfwatch_common::DeliveryError;

/// Pluggable webhook endpoint for the delivery engine.
///
/// The sink owns the wire encoding, so it also owns size measurement: the
/// chunker asks it how many bytes a candidate message costs once serialized.
#[async_trait]
pub trait NotifySink: Send + Sync {
    /// Transmit one message. `Ok` means the endpoint accepted it.
    async fn post(&self, content: &str) -> Result<(), DeliveryError>;

    /// Serialized payload size of `content` under this sink's wire encoding.
    fn measure(&self, content: &str) -> usize;

    fn name(&self) -> &str;
}
