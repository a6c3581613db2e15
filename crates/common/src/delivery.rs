use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::{Recipient, Result};

/// Single-recipient send primitive of a notification transport.
#[async_trait]
pub trait DirectSender: Send + Sync {
    async fn send_direct(&self, recipient: &Recipient, text: &str) -> Result<()>;
}

/// Aggregate result of a multi-recipient send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Multi-recipient send primitive. A failure for one recipient is counted,
/// never propagated.
///
/// `per_recipient_timeout` bounds each individual send, so every recipient
/// is attempted however long the list is.
#[async_trait]
pub trait BroadcastSender: Send + Sync {
    async fn send_broadcast(
        &self,
        recipients: &BTreeSet<Recipient>,
        text: &str,
        per_recipient_timeout: Duration,
    ) -> BroadcastOutcome;
}

#[async_trait]
impl<T: DirectSender + ?Sized> BroadcastSender for T {
    async fn send_broadcast(
        &self,
        recipients: &BTreeSet<Recipient>,
        text: &str,
        per_recipient_timeout: Duration,
    ) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        for recipient in recipients {
            match tokio::time::timeout(per_recipient_timeout, self.send_direct(recipient, text)).await {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(e)) => {
                    warn!(
                        recipient = %recipient,
                        error = %e,
                        "Broadcast send failed for recipient"
                    );
                    outcome.failed += 1;
                }
                Err(_) => {
                    warn!(
                        recipient = %recipient,
                        timeout_secs = per_recipient_timeout.as_secs(),
                        "Broadcast send timed out for recipient"
                    );
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}

/// Read-only view of a recipient set, e.g. the subscriber registry.
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Consistent copy of the current recipients.
    async fn snapshot(&self) -> BTreeSet<Recipient>;
}
