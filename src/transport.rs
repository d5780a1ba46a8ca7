//! Push-transport contract and inbound delivery hygiene.
//!
//! The push channel is best-effort: messages may be dropped, duplicated, or
//! reordered, and no acknowledgement exists. Implementations wrap whatever
//! push service the application uses; the orchestrator only sees this trait.

use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{PeerToken, SignalMessage};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("push delivery failed: {0}")]
    Delivery(String),

    #[error("peer token rejected by push service: {0}")]
    BadToken(String),

    #[error("payload could not be encoded: {0}")]
    Encode(String),
}

/// Best-effort outbound signaling channel.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Deliver `message` to the peer addressed by `to`. Returning `Ok` means
    /// the message was handed to the push service, not that it arrived.
    async fn send(&self, to: &PeerToken, message: &SignalMessage) -> Result<(), TransportError>;
}

/// Drops exact-duplicate push deliveries.
///
/// Keeps a bounded ring of digests over raw payload bytes. Duplicates that
/// fall outside the window still reach the orchestrator, which handles every
/// message idempotently.
#[derive(Debug)]
pub struct MessageDeduper {
    seen: VecDeque<u64>,
    capacity: usize,
}

impl MessageDeduper {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record the payload and report whether it was already observed.
    pub fn check_and_record(&mut self, payload: &[u8]) -> bool {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        payload.hash(&mut hasher);
        let digest = hasher.finish();

        if self.seen.contains(&digest) {
            return true;
        }
        if self.seen.len() == self.capacity {
            self.seen.pop_front();
        }
        self.seen.push_back(digest);
        false
    }
}

impl Default for MessageDeduper {
    fn default() -> Self {
        Self::new(64)
    }
}
