//! Alert delivery seam.

use std::thread;

use tracing::{debug, warn};

use crate::config::RetryPolicy;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by messaging API: {0}")]
    Rejected(String),
}

/// Destination for finished report text (a chat bot, a webhook, a file).
pub trait AlertSink: Send + Sync {
    fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError>;
}

impl<F> AlertSink for F
where
    F: Fn(&str, &str) -> Result<(), DeliveryError> + Send + Sync,
{
    fn send(&self, destination: &str, text: &str) -> Result<(), DeliveryError> {
        self(destination, text)
    }
}

/// Send `text`, retrying with a fixed pause between attempts.
///
/// Returns whether the message went out. A message that still fails after
/// the last attempt is dropped with a warning; it is never queued.
pub fn deliver_with_retry<S: AlertSink + ?Sized>(
    sink: &S,
    destination: &str,
    text: &str,
    policy: &RetryPolicy,
) -> bool {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match sink.send(destination, text) {
            Ok(()) => {
                debug!(attempt, chars = text.chars().count(), "alert delivered");
                return true;
            }
            Err(err) if attempt < attempts => {
                debug!(attempt, error = %err, "delivery failed, retrying");
                thread::sleep(policy.backoff());
            }
            Err(err) => {
                warn!(attempts, error = %err, "dropping alert after final delivery failure");
            }
        }
    }
    false
}
