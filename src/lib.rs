//! Peer-to-peer call signaling over a push-notification transport.
//!
//! Establishes a two-party real-time audio/video session by carrying the
//! offer/answer and ICE exchange over an out-of-band push channel, for
//! deployments without a dedicated signaling server. The push channel gives
//! no ordering or delivery guarantee, so the orchestrator is built to
//! tolerate duplicate, late, and reordered messages.
//!
//! # Architecture
//!
//! - [`SignalMessage`]: the JSON wire schema, tagged by `type`
//! - [`SignalingTransport`]: best-effort outbound push delivery
//! - [`MediaEngine`] & [`RtcSession`]: contracts for the real-time media engine
//! - [`CallState`] & [`CallSession`]: call state machine for one call attempt
//! - [`CallOrchestrator`]: interprets signaling, buffers early candidates,
//!   drives the session through negotiation
//! - [`CallController`]: the facade the presentation layer talks to
//!
//! # Message flow
//!
//! Push payload → [`CallOrchestrator::handle_push`] → state machine → media
//! engine; engine events (local candidates, remote tracks) flow back through
//! the same dispatcher and out over the transport.

pub mod controller;
pub mod error;
pub mod media;
pub mod message;
pub mod orchestrator;
pub mod state;
pub mod transport;


pub use controller::CallController;
pub use error::CallError;
pub use media::{IceServer, MediaConstraints, MediaEngine, MediaStream, RtcSession, SessionEvent};
pub use message::{
    CallId, CallerInfo, IceCandidate, PeerToken, SdpKind, SessionDescription, SignalMessage,
};
pub use orchestrator::{CallOrchestrator, CallSnapshot, OrchestratorConfig};
pub use state::{CallEvent, CallRole, CallSession, CallState, CallTransition, InvalidTransition};
pub use transport::{MessageDeduper, SignalingTransport, TransportError};
