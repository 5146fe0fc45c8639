use std::sync::Arc;

use tracing::info;

use crate::Error;
use crate::platforms::ChatSender;

/// Best-effort delivery of the one-shot text notice posted before a
/// streaming cycle begins. Callers skip this entirely when no message is
/// configured.
pub struct Notifier {
    chat: Arc<dyn ChatSender>,
}

impl Notifier {
    pub fn new(chat: Arc<dyn ChatSender>) -> Self {
        Self { chat }
    }

    pub async fn notify(&self, channel_id: u64, message: &str) -> Result<(), Error> {
        self.chat.send_message(channel_id, message).await.map_err(|e| {
            Error::Channel(format!(
                "failed to send alert notice to channel {channel_id}: {e}"
            ))
        })?;
        info!("(Notifier) sent alert notice to channel {channel_id}");
        Ok(())
    }
}
