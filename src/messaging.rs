//! Messaging port and the sensitive-message auto-delete helper.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::errors::WalletError;

/// Outbound messaging port. Best-effort by contract: callers treat
/// deletion failures as non-fatal.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a message; returns the platform message id.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, WalletError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), WalletError>;
}

/// Send a message containing sensitive content (an exported secret) and
/// schedule its deletion after `ttl`. The delete runs as a detached task:
/// it must never block or fail the main flow, so any error is logged at
/// `warn` and swallowed.
pub async fn send_sensitive(
    messenger: Arc<dyn Messenger>,
    chat_id: i64,
    text: &str,
    ttl: Duration,
) -> Result<i64, WalletError> {
    let message_id = messenger.send_message(chat_id, text).await?;

    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        match messenger.delete_message(chat_id, message_id).await {
            Ok(()) => debug!(chat_id, message_id, "Sensitive message auto-deleted"),
            Err(e) => warn!(chat_id, message_id, "Failed to auto-delete sensitive message: {}", e),
        }
    });

    Ok(message_id)
}
