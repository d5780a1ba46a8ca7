//! Call state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::media::MediaStream;
use crate::message::{
    CallId, CallerInfo, IceCandidate, PeerToken, SdpKind, SessionDescription, SignalMessage,
};

/// Which side of the call this endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallRole {
    Caller,
    Callee,
}

/// Current state of a call attempt.
#[derive(Debug, Clone, Serialize, Default)]
pub enum CallState {
    /// Session created, offer not yet on the wire.
    #[default]
    Idle,
    /// Caller: offer sent, waiting for the answer.
    Calling { offer_sent_at: DateTime<Utc> },
    /// Callee: incoming offer surfaced, waiting for local accept/decline.
    Ringing { received_at: DateTime<Utc> },
    /// Descriptions exchanged, waiting for remote media to arrive.
    Negotiating { answered_at: DateTime<Utc> },
    /// Remote media is flowing.
    Connected { connected_at: DateTime<Utc> },
    /// Call ended normally (hangup from either side).
    Ended { ended_at: DateTime<Utc> },
    /// Callee declined without answering.
    Declined { ended_at: DateTime<Utc> },
    /// Unrecoverable error tore the call down.
    Failed { reason: String },
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Ended { .. } | Self::Declined { .. } | Self::Failed { .. }
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn can_accept(&self) -> bool {
        matches!(self, Self::Ringing { .. })
    }

    pub fn can_decline(&self) -> bool {
        matches!(self, Self::Ringing { .. })
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Calling { .. } => "calling",
            Self::Ringing { .. } => "ringing",
            Self::Negotiating { .. } => "negotiating",
            Self::Connected { .. } => "connected",
            Self::Ended { .. } => "ended",
            Self::Declined { .. } => "declined",
            Self::Failed { .. } => "failed",
        }
    }
}

/// State transitions applied to a call session.
#[derive(Debug, Clone)]
pub enum CallTransition {
    /// Caller: the initial offer went out.
    OfferSent,
    /// Caller: the peer's answer was applied.
    AnswerApplied,
    /// Callee: local accept completed and the answer went out.
    AnswerSent,
    /// Remote media arrived.
    RemoteTrack,
    /// Callee declined locally.
    DeclinedLocally,
    /// The peer declined our pending offer.
    DeclinedRemotely,
    /// Hangup from either side.
    Terminated,
    /// Unrecoverable error.
    Failure { reason: String },
}

/// Inbound stimulus consumed by the orchestrator's single dispatch path.
///
/// Push messages and media-engine events are folded into one tagged type so
/// the state machine can be driven without a real transport or engine.
#[derive(Debug, Clone)]
pub enum CallEvent {
    IncomingCall {
        call_id: CallId,
        peer_token: PeerToken,
        caller: CallerInfo,
        offer: Option<SessionDescription>,
    },
    AnswerReceived {
        call_id: CallId,
        answer: SessionDescription,
    },
    CandidateReceived {
        call_id: CallId,
        candidate: IceCandidate,
    },
    DeclineReceived {
        call_id: CallId,
    },
    HangupReceived {
        call_id: CallId,
    },
    LocalCandidateDiscovered(IceCandidate),
    RemoteTrackReceived(MediaStream),
}

impl CallEvent {
    pub fn from_message(message: SignalMessage) -> Self {
        match message {
            SignalMessage::IncomingCall {
                call_id,
                caller_name,
                handle,
                peer_token,
                rtc_message,
            } => Self::IncomingCall {
                call_id,
                peer_token,
                caller: CallerInfo {
                    name: caller_name,
                    handle,
                },
                offer: rtc_message,
            },
            SignalMessage::Answer { call_id, sdp } => Self::AnswerReceived {
                call_id,
                answer: SessionDescription {
                    kind: SdpKind::Answer,
                    sdp,
                },
            },
            SignalMessage::Candidate { call_id, candidate } => Self::CandidateReceived {
                call_id,
                candidate,
            },
            SignalMessage::Decline { call_id } => Self::DeclineReceived { call_id },
            SignalMessage::Hangup { call_id } => Self::HangupReceived { call_id },
        }
    }

    pub fn from_session_event(event: crate::media::SessionEvent) -> Self {
        match event {
            crate::media::SessionEvent::LocalCandidate(candidate) => {
                Self::LocalCandidateDiscovered(candidate)
            }
            crate::media::SessionEvent::RemoteTrack(stream) => Self::RemoteTrackReceived(stream),
        }
    }
}

/// One call attempt and everything negotiated for it.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: CallId,
    pub role: CallRole,
    /// Counterpart's address on the push transport. Immutable for the
    /// lifetime of the session.
    pub peer_token: PeerToken,
    pub caller_info: Option<CallerInfo>,
    pub state: CallState,
    /// Set at most once; renegotiation is unsupported.
    pub local_description: Option<SessionDescription>,
    /// Set at most once; a second description is a logged no-op upstream.
    pub remote_description: Option<SessionDescription>,
    /// Offer embedded in the incoming-call message, held un-applied until
    /// the user accepts.
    pub held_offer: Option<SessionDescription>,
    /// Remote candidates that arrived before the remote description; flushed
    /// in arrival order once it is set, exactly once.
    pub pending_remote_candidates: Vec<IceCandidate>,
    /// Local candidates discovered before the initial offer went out.
    pub pending_local_candidates: Vec<IceCandidate>,
    pub local_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
    pub created_at: DateTime<Utc>,
    /// Set once a hangup notification went out, keeping teardown idempotent.
    pub hangup_sent: bool,
}

impl CallSession {
    pub fn new_outgoing(call_id: CallId, peer_token: PeerToken) -> Self {
        Self {
            call_id,
            role: CallRole::Caller,
            peer_token,
            caller_info: None,
            state: CallState::Idle,
            local_description: None,
            remote_description: None,
            held_offer: None,
            pending_remote_candidates: Vec::new(),
            pending_local_candidates: Vec::new(),
            local_stream: None,
            remote_stream: None,
            created_at: Utc::now(),
            hangup_sent: false,
        }
    }

    pub fn new_incoming(
        call_id: CallId,
        peer_token: PeerToken,
        caller: CallerInfo,
        offer: SessionDescription,
    ) -> Self {
        Self {
            call_id,
            role: CallRole::Callee,
            peer_token,
            caller_info: Some(caller),
            state: CallState::Ringing {
                received_at: Utc::now(),
            },
            local_description: None,
            remote_description: None,
            held_offer: Some(offer),
            pending_remote_candidates: Vec::new(),
            pending_local_candidates: Vec::new(),
            local_stream: None,
            remote_stream: None,
            created_at: Utc::now(),
            hangup_sent: false,
        }
    }

    pub fn is_initiator(&self) -> bool {
        self.role == CallRole::Caller
    }

    /// Remote candidates queued ahead of the remote description, in arrival
    /// order. The queue is emptied; it is consumed exactly once.
    pub fn take_pending_remote_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_remote_candidates)
    }

    /// Local candidates queued before the peer could be addressed.
    pub fn take_pending_local_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_local_candidates)
    }

    /// Record the remote description. Returns false (and leaves the session
    /// untouched) if one is already set.
    pub fn record_remote_description(&mut self, desc: SessionDescription) -> bool {
        if self.remote_description.is_some() {
            return false;
        }
        self.remote_description = Some(desc);
        true
    }

    /// Apply a state transition. Returns error if transition is invalid.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<(), InvalidTransition> {
        let new_state = match (&self.state, transition) {
            (CallState::Idle, CallTransition::OfferSent) => CallState::Calling {
                offer_sent_at: Utc::now(),
            },
            (CallState::Calling { .. }, CallTransition::AnswerApplied) => CallState::Negotiating {
                answered_at: Utc::now(),
            },
            (CallState::Ringing { .. }, CallTransition::AnswerSent) => CallState::Negotiating {
                answered_at: Utc::now(),
            },
            (CallState::Ringing { .. }, CallTransition::DeclinedLocally) => CallState::Declined {
                ended_at: Utc::now(),
            },
            (CallState::Calling { .. }, CallTransition::DeclinedRemotely) => CallState::Ended {
                ended_at: Utc::now(),
            },
            (CallState::Negotiating { .. }, CallTransition::RemoteTrack) => CallState::Connected {
                connected_at: Utc::now(),
            },
            (state, CallTransition::Terminated) if !state.is_terminal() => CallState::Ended {
                ended_at: Utc::now(),
            },
            (state, CallTransition::Failure { reason }) if !state.is_terminal() => {
                CallState::Failed { reason }
            }
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        self.state = new_state;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_outgoing_call() -> CallSession {
        CallSession::new_outgoing(
            CallId::new("AC90CFD09DF712D981142B172706F9F2"),
            PeerToken::new("token-b"),
        )
    }

    fn make_incoming_call() -> CallSession {
        CallSession::new_incoming(
            CallId::new("BC5BD1EDE9BBE601F408EF3795479E93"),
            PeerToken::new("token-a"),
            CallerInfo {
                name: "Alice".to_string(),
                handle: "alice@example.com".to_string(),
            },
            SessionDescription::offer("v=0\r\n"),
        )
    }

    /// Flow: Idle → Calling → Negotiating → Connected → Ended
    #[test]
    fn test_outgoing_call_flow() {
        let mut call = make_outgoing_call();
        assert!(matches!(call.state, CallState::Idle));
        assert!(call.is_initiator());

        call.apply_transition(CallTransition::OfferSent).unwrap();
        assert!(matches!(call.state, CallState::Calling { .. }));

        call.apply_transition(CallTransition::AnswerApplied)
            .unwrap();
        assert!(matches!(call.state, CallState::Negotiating { .. }));

        call.apply_transition(CallTransition::RemoteTrack).unwrap();
        assert!(call.state.is_connected());

        call.apply_transition(CallTransition::Terminated).unwrap();
        assert!(call.state.is_terminal());
        assert!(matches!(call.state, CallState::Ended { .. }));
    }

    /// Flow: Ringing → Negotiating → Connected → Ended
    #[test]
    fn test_incoming_call_flow() {
        let mut call = make_incoming_call();
        assert!(call.state.can_accept());
        assert!(!call.is_initiator());
        assert!(call.held_offer.is_some());

        call.apply_transition(CallTransition::AnswerSent).unwrap();
        assert!(matches!(call.state, CallState::Negotiating { .. }));

        call.apply_transition(CallTransition::RemoteTrack).unwrap();
        assert!(call.state.is_connected());

        call.apply_transition(CallTransition::Terminated).unwrap();
        assert!(matches!(call.state, CallState::Ended { .. }));
    }

    /// Caller receiving a decline goes straight to Ended, never Connected.
    #[test]
    fn test_remote_decline_ends_pending_offer() {
        let mut call = make_outgoing_call();
        call.apply_transition(CallTransition::OfferSent).unwrap();

        call.apply_transition(CallTransition::DeclinedRemotely)
            .unwrap();
        assert!(matches!(call.state, CallState::Ended { .. }));
    }

    #[test]
    fn test_local_decline_from_ringing() {
        let mut call = make_incoming_call();
        assert!(call.state.can_decline());

        call.apply_transition(CallTransition::DeclinedLocally)
            .unwrap();
        assert!(matches!(call.state, CallState::Declined { .. }));
    }

    /// Failure is reachable from every non-terminal state.
    #[test]
    fn test_failure_from_non_terminal_states() {
        for make in [make_outgoing_call, make_incoming_call] {
            let mut call = make();
            call.apply_transition(CallTransition::Failure {
                reason: "media permission denied".to_string(),
            })
            .unwrap();
            assert!(matches!(call.state, CallState::Failed { .. }));
        }

        let mut call = make_outgoing_call();
        call.apply_transition(CallTransition::OfferSent).unwrap();
        call.apply_transition(CallTransition::AnswerApplied)
            .unwrap();
        call.apply_transition(CallTransition::Failure {
            reason: "send failed".to_string(),
        })
        .unwrap();
        assert!(call.state.is_terminal());
    }

    /// Terminal states absorb nothing: every further transition is invalid.
    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut call = make_incoming_call();
        call.apply_transition(CallTransition::DeclinedLocally)
            .unwrap();

        assert!(call.apply_transition(CallTransition::AnswerSent).is_err());
        assert!(call.apply_transition(CallTransition::RemoteTrack).is_err());
        assert!(call.apply_transition(CallTransition::Terminated).is_err());
        assert!(
            call.apply_transition(CallTransition::Failure {
                reason: "late".to_string(),
            })
            .is_err()
        );
    }

    #[test]
    fn test_invalid_transitions() {
        let mut call = make_outgoing_call();

        // Can't apply an answer before the offer went out
        assert!(
            call.apply_transition(CallTransition::AnswerApplied)
                .is_err()
        );
        // Remote track before negotiation is invalid
        assert!(call.apply_transition(CallTransition::RemoteTrack).is_err());
        // Callee-only transition on a caller session
        assert!(call.apply_transition(CallTransition::AnswerSent).is_err());
    }

    #[test]
    fn test_pending_remote_candidates_consumed_once() {
        let mut call = make_incoming_call();
        call.pending_remote_candidates
            .push(IceCandidate::new("candidate:1"));
        call.pending_remote_candidates
            .push(IceCandidate::new("candidate:2"));

        let flushed = call.take_pending_remote_candidates();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].candidate, "candidate:1");
        assert_eq!(flushed[1].candidate, "candidate:2");

        assert!(call.take_pending_remote_candidates().is_empty());
    }

    /// Local candidates discovered before the offer went out are held and
    /// drained once, in discovery order.
    #[test]
    fn test_pending_local_candidates_held_until_offer() {
        let mut call = make_outgoing_call();
        assert!(matches!(call.state, CallState::Idle));

        call.pending_local_candidates
            .push(IceCandidate::new("candidate:1"));
        call.pending_local_candidates
            .push(IceCandidate::new("candidate:2"));

        call.apply_transition(CallTransition::OfferSent).unwrap();
        let flushed = call.take_pending_local_candidates();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0].candidate, "candidate:1");
        assert!(call.take_pending_local_candidates().is_empty());
    }

    #[test]
    fn test_remote_description_set_at_most_once() {
        let mut call = make_outgoing_call();
        assert!(call.record_remote_description(SessionDescription::answer("a1")));
        assert!(!call.record_remote_description(SessionDescription::answer("a2")));

        let desc = call.remote_description.as_ref().unwrap();
        assert_eq!(desc.sdp, "a1");
    }
}
