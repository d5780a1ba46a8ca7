//! Contracts for the underlying real-time media engine.
//!
//! Capture, codecs, and media transport live behind these traits; the
//! orchestrator only drives sessions through them. Production code plugs in
//! a real engine, tests plug in fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::CallError;
use crate::message::{IceCandidate, SessionDescription};

/// Connectivity-assist server (STUN/TURN) handed to the engine at session
/// construction.
#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Which local media to acquire.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Opaque handle to a local or remote media stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaStream {
    pub id: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Asynchronous notifications emitted by an RTC session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new local connectivity candidate was discovered. Timing is
    /// nondeterministic and discovery may continue after negotiation
    /// completes.
    LocalCandidate(IceCandidate),
    /// The peer's media arrived.
    RemoteTrack(MediaStream),
}

/// One underlying RTC session.
///
/// The engine is the sole mutator of session internals; the orchestrator
/// drives it exclusively through this contract.
#[async_trait]
pub trait RtcSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, CallError>;

    /// Fails with [`CallError::Negotiation`] if no remote description has
    /// been applied yet.
    async fn create_answer(&self) -> Result<SessionDescription, CallError>;

    async fn set_local_description(&self, desc: &SessionDescription) -> Result<(), CallError>;

    /// Applying the remote description is what unblocks queued candidate
    /// application on the caller's side of this contract.
    async fn set_remote_description(&self, desc: &SessionDescription) -> Result<(), CallError>;

    /// Fails when applied before a remote description exists. Callers must
    /// queue early candidates rather than rely on this to enforce ordering.
    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> Result<(), CallError>;

    /// Releases all underlying resources. Idempotent.
    async fn close(&self);
}

/// Factory for RTC sessions and local media.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Instantiate one RTC session. Discovered local candidates and incoming
    /// remote tracks are reported on `events`.
    async fn create_session(
        &self,
        ice_servers: &[IceServer],
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Arc<dyn RtcSession>, CallError>;

    /// Acquire camera/microphone access per `constraints` and register the
    /// resulting tracks with `session` so they are offered to the peer.
    async fn attach_local_media(
        &self,
        session: &Arc<dyn RtcSession>,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, CallError>;
}
