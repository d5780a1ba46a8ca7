//! Call-related error types.

use thiserror::Error;

use crate::state::InvalidTransition;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("media permission denied: {0}")]
    MediaPermission(String),

    #[error("no matching media device: {0}")]
    MediaDevice(String),

    #[error("media session setup failed: {0}")]
    MediaSetup(String),

    #[error("negotiation error: {0}")]
    Negotiation(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("a call is already in progress: {0}")]
    CallInUse(String),

    #[error("no active call")]
    NoActiveCall,

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),
}

impl CallError {
    /// True for local media acquisition failures that must be surfaced to the
    /// user rather than retried.
    pub fn is_media_failure(&self) -> bool {
        matches!(
            self,
            Self::MediaPermission(_) | Self::MediaDevice(_) | Self::MediaSetup(_)
        )
    }
}
