//! Call orchestrator: drives offer/answer/ICE exchange over the push channel.
//!
//! One orchestrator instance owns at most one call attempt at a time. All
//! inbound stimuli (push payloads, media-engine events, user actions) funnel
//! through the session mutex, so callbacks never interleave for the same
//! call even though their arrival order is completely unconstrained.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};

use crate::error::CallError;
use crate::media::{
    IceServer, MediaConstraints, MediaEngine, MediaStream, RtcSession, SessionEvent,
};
use crate::message::{
    CallId, CallerInfo, IceCandidate, PeerToken, SdpKind, SessionDescription, SignalMessage,
};
use crate::state::{CallEvent, CallSession, CallState, CallTransition, InvalidTransition};
use crate::transport::{MessageDeduper, SignalingTransport};

const SESSION_EVENT_CAPACITY: usize = 32;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Connectivity-assist servers handed to the media engine.
    pub ice_servers: Vec<IceServer>,
    /// Local media to acquire for calls.
    pub constraints: MediaConstraints,
    /// Extra delivery attempts for offer/answer messages. Candidate loss is
    /// tolerated; negotiation messages are not.
    pub critical_send_retries: u32,
    /// Window of recently seen payload digests used to drop duplicate pushes.
    pub dedup_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::new("stun:stun.l.google.com:19302")],
            constraints: MediaConstraints::default(),
            critical_send_retries: 1,
            dedup_window: 64,
        }
    }
}

/// Read-only view published to the presentation layer on every change.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CallSnapshot {
    pub state: CallState,
    pub local_stream: Option<MediaStream>,
    pub remote_stream: Option<MediaStream>,
    pub caller_info: Option<CallerInfo>,
}

/// The current call attempt plus its live RTC session.
struct ActiveCall {
    session: CallSession,
    rtc: Arc<dyn RtcSession>,
    /// Session-event receiver, pending pickup via `take_session_events`.
    events: Option<mpsc::Receiver<SessionEvent>>,
}

/// Orchestrates one call at a time over an unreliable push channel.
///
/// The push transport gives no ordering or delivery guarantee, so the
/// orchestrator buffers candidates that outrun their description, treats
/// duplicate descriptions as logged no-ops, and drops messages for calls it
/// is not tracking.
pub struct CallOrchestrator {
    our_token: PeerToken,
    config: OrchestratorConfig,
    transport: Arc<dyn SignalingTransport>,
    engine: Arc<dyn MediaEngine>,
    active: Mutex<Option<ActiveCall>>,
    deduper: Mutex<MessageDeduper>,
    snapshot_tx: watch::Sender<CallSnapshot>,
}

impl CallOrchestrator {
    pub fn new(
        our_token: PeerToken,
        config: OrchestratorConfig,
        transport: Arc<dyn SignalingTransport>,
        engine: Arc<dyn MediaEngine>,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(CallSnapshot::default());
        let deduper = MessageDeduper::new(config.dedup_window);
        Arc::new(Self {
            our_token,
            config,
            transport,
            engine,
            active: Mutex::new(None),
            deduper: Mutex::new(deduper),
            snapshot_tx,
        })
    }

    /// Subscribe to `{state, streams, caller info}` snapshots.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Start an outgoing call to `target`.
    ///
    /// Fails with [`CallError::CallInUse`] — without touching the existing
    /// session — if a call is still in progress.
    pub async fn start_call(
        &self,
        target: PeerToken,
        metadata: CallerInfo,
    ) -> Result<CallId, CallError> {
        let mut active = self.active.lock().await;
        if let Some(call) = active.as_ref()
            && !call.session.state.is_terminal()
        {
            return Err(CallError::CallInUse(call.session.call_id.to_string()));
        }

        let call_id = CallId::generate();
        info!("Starting call {} to {}", call_id, target);

        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let rtc = self
            .engine
            .create_session(&self.config.ice_servers, events_tx)
            .await?;

        let mut session = CallSession::new_outgoing(call_id.clone(), target);
        session.caller_info = Some(metadata.clone());
        let mut call = ActiveCall {
            session,
            rtc,
            events: Some(events_rx),
        };

        let result = self.setup_outgoing(&mut call, &metadata).await;
        if let Err(e) = &result {
            warn!("Call {} failed during setup: {}", call_id, e);
            self.fail_call(&mut call, e).await;
        }
        self.publish_call(&call);
        *active = Some(call);
        result.map(|_| call_id)
    }

    /// Accept the currently ringing incoming call.
    pub async fn accept_call(&self) -> Result<(), CallError> {
        let mut active = self.active.lock().await;
        let result = {
            let Some(call) = active.as_mut() else {
                return Err(CallError::NoActiveCall);
            };
            if !call.session.state.can_accept() {
                return Err(CallError::InvalidTransition(InvalidTransition {
                    current_state: call.session.state.name().to_string(),
                    attempted: "accept".to_string(),
                }));
            }

            info!("Accepting call {}", call.session.call_id);
            match self.setup_answer(call).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    warn!("Call {} failed during accept: {}", call.session.call_id, e);
                    self.fail_call(call, &e).await;
                    Err(e)
                }
            }
        };
        self.publish(&active);
        result
    }

    /// Decline the currently ringing incoming call.
    pub async fn decline_call(&self) -> Result<(), CallError> {
        let mut active = self.active.lock().await;
        {
            let Some(call) = active.as_mut() else {
                return Err(CallError::NoActiveCall);
            };
            if !call.session.state.can_decline() {
                return Err(CallError::InvalidTransition(InvalidTransition {
                    current_state: call.session.state.name().to_string(),
                    attempted: "decline".to_string(),
                }));
            }

            info!("Declining call {}", call.session.call_id);
            let message = SignalMessage::Decline {
                call_id: call.session.call_id.clone(),
            };
            if let Err(e) = self.transport.send(&call.session.peer_token, &message).await {
                warn!(
                    "Decline for call {} was not delivered: {}",
                    call.session.call_id, e
                );
            }

            call.session
                .apply_transition(CallTransition::DeclinedLocally)?;
            call.rtc.close().await;
        }
        self.publish(&active);
        Ok(())
    }

    /// Hard cancellation of the current call. Safe to call at any time,
    /// repeatedly; terminal sessions are left untouched.
    pub async fn end_call(&self) {
        let mut active = self.active.lock().await;
        {
            let Some(call) = active.as_mut() else {
                return;
            };
            if call.session.state.is_terminal() {
                return;
            }

            info!("Ending call {}", call.session.call_id);
            if !call.session.hangup_sent {
                call.session.hangup_sent = true;
                let message = SignalMessage::Hangup {
                    call_id: call.session.call_id.clone(),
                };
                // Best-effort only; the peer must detect a dead session on
                // its own if this never arrives.
                if let Err(e) = self.transport.send(&call.session.peer_token, &message).await {
                    warn!(
                        "Hangup for call {} was not delivered: {}",
                        call.session.call_id, e
                    );
                }
            }

            if let Err(e) = call.session.apply_transition(CallTransition::Terminated) {
                warn!("Teardown of call {}: {}", call.session.call_id, e);
            }
            call.rtc.close().await;
        }
        self.publish(&active);
    }

    /// Entry point for raw push payloads received by the application.
    ///
    /// Malformed or duplicate payloads are logged and dropped; they never
    /// affect the active call.
    pub async fn handle_push(&self, sender: PeerToken, payload: &[u8]) {
        if self.deduper.lock().await.check_and_record(payload) {
            debug!("Dropping duplicate push delivery from {}", sender);
            return;
        }

        let message = match SignalMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed push payload from {}: {}", sender, e);
                return;
            }
        };

        debug!(
            "Received {} for call {} from {}",
            message.kind(),
            message.call_id(),
            sender
        );
        self.dispatch(CallEvent::from_message(message)).await;
    }

    /// Single dispatch path for every inbound stimulus.
    pub async fn dispatch(&self, event: CallEvent) {
        match event {
            CallEvent::IncomingCall {
                call_id,
                peer_token,
                caller,
                offer,
            } => self.on_incoming_call(call_id, peer_token, caller, offer).await,
            CallEvent::AnswerReceived { call_id, answer } => {
                self.on_answer(call_id, answer).await
            }
            CallEvent::CandidateReceived { call_id, candidate } => {
                self.on_candidate(call_id, candidate).await
            }
            CallEvent::DeclineReceived { call_id } => self.on_decline(call_id).await,
            CallEvent::HangupReceived { call_id } => self.on_hangup(call_id).await,
            CallEvent::LocalCandidateDiscovered(candidate) => {
                self.on_local_candidate(candidate).await
            }
            CallEvent::RemoteTrackReceived(stream) => self.on_remote_track(stream).await,
        }
    }

    /// Hands out the session-event receiver for the current call, if one has
    /// not been claimed yet. The caller is expected to pump it through
    /// [`run_session_events`](Self::run_session_events).
    pub async fn take_session_events(
        &self,
    ) -> Option<(CallId, mpsc::Receiver<SessionEvent>)> {
        let mut active = self.active.lock().await;
        let call = active.as_mut()?;
        let events = call.events.take()?;
        Some((call.session.call_id.clone(), events))
    }

    /// Pump media-engine events into the dispatcher until the channel closes
    /// or the call is replaced.
    pub async fn run_session_events(
        self: Arc<Self>,
        call_id: CallId,
        mut events: mpsc::Receiver<SessionEvent>,
    ) {
        while let Some(event) = events.recv().await {
            if !self.is_current_call(&call_id).await {
                debug!("Stopping event pump for superseded call {}", call_id);
                break;
            }
            self.dispatch(CallEvent::from_session_event(event)).await;
        }
    }

    // -- inbound message handling --

    async fn on_incoming_call(
        &self,
        call_id: CallId,
        peer_token: PeerToken,
        caller: CallerInfo,
        offer: Option<SessionDescription>,
    ) {
        let mut active = self.active.lock().await;
        if let Some(call) = active.as_ref()
            && !call.session.state.is_terminal()
        {
            warn!(
                "Busy: dropping incoming call {} while call {} is in progress",
                call_id, call.session.call_id
            );
            return;
        }

        let Some(offer) = offer else {
            warn!("Dropping incoming call {} without an embedded offer", call_id);
            return;
        };
        if offer.kind != SdpKind::Offer {
            warn!(
                "Dropping incoming call {}: embedded description is not an offer",
                call_id
            );
            return;
        }

        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let rtc = match self
            .engine
            .create_session(&self.config.ice_servers, events_tx)
            .await
        {
            Ok(rtc) => rtc,
            Err(e) => {
                warn!(
                    "Media session setup failed for incoming call {}: {}",
                    call_id, e
                );
                self.snapshot_tx.send_replace(CallSnapshot {
                    state: CallState::Failed {
                        reason: e.to_string(),
                    },
                    caller_info: Some(caller),
                    ..Default::default()
                });
                return;
            }
        };

        info!("Incoming call {} from {} ({})", call_id, caller.name, peer_token);
        let session = CallSession::new_incoming(call_id, peer_token, caller, offer);
        *active = Some(ActiveCall {
            session,
            rtc,
            events: Some(events_rx),
        });
        self.publish(&active);
    }

    async fn on_answer(&self, call_id: CallId, answer: SessionDescription) {
        let mut active = self.active.lock().await;
        {
            let Some(call) = Self::current_call(&mut active, &call_id) else {
                return;
            };
            if call.session.remote_description.is_some() {
                // Negotiation is single-shot per call.
                warn!("Ignoring duplicate answer for call {}", call_id);
                return;
            }
            if !matches!(call.session.state, CallState::Calling { .. }) {
                warn!(
                    "Ignoring answer for call {} in state {}",
                    call_id,
                    call.session.state.name()
                );
                return;
            }

            if let Err(e) = self.apply_remote_description(call, answer).await {
                warn!("Applying answer for call {} failed: {}", call_id, e);
                self.fail_call(call, &e).await;
            } else if let Err(e) = call.session.apply_transition(CallTransition::AnswerApplied) {
                warn!("Answer for call {}: {}", call_id, e);
            }
        }
        self.publish(&active);
    }

    /// Candidate handling is independent of the formal call state: if the
    /// remote description is already set the candidate is applied right away,
    /// otherwise it is queued for the flush that follows the description.
    async fn on_candidate(&self, call_id: CallId, candidate: IceCandidate) {
        let mut active = self.active.lock().await;
        let Some(call) = Self::current_call(&mut active, &call_id) else {
            return;
        };

        if call.session.remote_description.is_some() {
            if let Err(e) = call.rtc.add_remote_candidate(&candidate).await {
                warn!("Discarding candidate for call {}: {}", call_id, e);
            }
        } else {
            call.session.pending_remote_candidates.push(candidate);
            debug!(
                "Queued early candidate for call {} ({} pending)",
                call_id,
                call.session.pending_remote_candidates.len()
            );
        }
    }

    async fn on_decline(&self, call_id: CallId) {
        let mut active = self.active.lock().await;
        {
            let Some(call) = Self::current_call(&mut active, &call_id) else {
                return;
            };
            match call.session.apply_transition(CallTransition::DeclinedRemotely) {
                Ok(()) => {
                    info!("Call {} was declined by the peer", call_id);
                    call.rtc.close().await;
                }
                Err(e) => {
                    warn!("Ignoring decline for call {}: {}", call_id, e);
                    return;
                }
            }
        }
        self.publish(&active);
    }

    async fn on_hangup(&self, call_id: CallId) {
        let mut active = self.active.lock().await;
        {
            let Some(call) = Self::current_call(&mut active, &call_id) else {
                return;
            };
            if let Err(e) = call.session.apply_transition(CallTransition::Terminated) {
                warn!("Ignoring hangup for call {}: {}", call_id, e);
                return;
            }
            info!("Call {} was hung up by the peer", call_id);
            call.rtc.close().await;
        }
        self.publish(&active);
    }

    // -- media engine events --

    async fn on_local_candidate(&self, candidate: IceCandidate) {
        let mut active = self.active.lock().await;
        let Some(call) = active.as_mut() else {
            debug!("Discarding local candidate: no active call");
            return;
        };
        if call.session.state.is_terminal() {
            // Discovery may keep firing after the call is torn down.
            debug!(
                "Discarding local candidate for finished call {}",
                call.session.call_id
            );
            return;
        }
        if matches!(call.session.state, CallState::Idle) {
            // The peer has no session to route this to until the initial
            // offer goes out; hold it for the post-offer flush.
            call.session.pending_local_candidates.push(candidate);
            return;
        }

        self.send_candidate(&call.session, candidate).await;
    }

    async fn on_remote_track(&self, stream: MediaStream) {
        let mut active = self.active.lock().await;
        {
            let Some(call) = active.as_mut() else {
                debug!("Discarding remote track: no active call");
                return;
            };
            if call.session.state.is_terminal() {
                debug!(
                    "Discarding remote track for finished call {}",
                    call.session.call_id
                );
                return;
            }

            call.session.remote_stream = Some(stream);
            match call.session.apply_transition(CallTransition::RemoteTrack) {
                Ok(()) => info!("Call {} connected", call.session.call_id),
                Err(e) => debug!("Remote track for call {}: {}", call.session.call_id, e),
            }
        }
        self.publish(&active);
    }

    // -- internals --

    async fn setup_outgoing(
        &self,
        call: &mut ActiveCall,
        metadata: &CallerInfo,
    ) -> Result<(), CallError> {
        let local_stream = self
            .engine
            .attach_local_media(&call.rtc, &self.config.constraints)
            .await?;
        call.session.local_stream = Some(local_stream);

        let offer = call.rtc.create_offer().await?;
        call.rtc.set_local_description(&offer).await?;
        call.session.local_description = Some(offer.clone());

        let message = SignalMessage::IncomingCall {
            call_id: call.session.call_id.clone(),
            caller_name: metadata.name.clone(),
            handle: metadata.handle.clone(),
            peer_token: self.our_token.clone(),
            rtc_message: Some(offer),
        };
        self.send_critical(&call.session.peer_token, &message).await?;
        call.session.apply_transition(CallTransition::OfferSent)?;

        self.flush_local_candidates(call).await;
        Ok(())
    }

    async fn setup_answer(&self, call: &mut ActiveCall) -> Result<(), CallError> {
        let offer = call
            .session
            .held_offer
            .take()
            .ok_or_else(|| CallError::Negotiation("incoming call carried no offer".to_string()))?;

        let local_stream = self
            .engine
            .attach_local_media(&call.rtc, &self.config.constraints)
            .await?;
        call.session.local_stream = Some(local_stream);

        self.apply_remote_description(call, offer).await?;

        let answer = call.rtc.create_answer().await?;
        call.rtc.set_local_description(&answer).await?;
        call.session.local_description = Some(answer.clone());

        let message = SignalMessage::Answer {
            call_id: call.session.call_id.clone(),
            sdp: answer.sdp,
        };
        self.send_critical(&call.session.peer_token, &message).await?;
        call.session.apply_transition(CallTransition::AnswerSent)?;

        self.flush_local_candidates(call).await;
        Ok(())
    }

    /// Applies the remote description, then flushes candidates queued ahead
    /// of it in arrival order. The queue is consumed exactly once.
    async fn apply_remote_description(
        &self,
        call: &mut ActiveCall,
        desc: SessionDescription,
    ) -> Result<(), CallError> {
        call.rtc.set_remote_description(&desc).await?;
        if !call.session.record_remote_description(desc) {
            warn!(
                "Remote description for call {} was already set",
                call.session.call_id
            );
        }

        for candidate in call.session.take_pending_remote_candidates() {
            if let Err(e) = call.rtc.add_remote_candidate(&candidate).await {
                warn!(
                    "Discarding queued candidate for call {}: {}",
                    call.session.call_id, e
                );
            }
        }
        Ok(())
    }

    async fn flush_local_candidates(&self, call: &mut ActiveCall) {
        for candidate in call.session.take_pending_local_candidates() {
            self.send_candidate(&call.session, candidate).await;
        }
    }

    async fn send_candidate(&self, session: &CallSession, candidate: IceCandidate) {
        let message = SignalMessage::Candidate {
            call_id: session.call_id.clone(),
            candidate,
        };
        // Candidate loss is tolerated; gathering yields several.
        if let Err(e) = self.transport.send(&session.peer_token, &message).await {
            warn!("Dropping candidate for call {}: {}", session.call_id, e);
        }
    }

    /// Delivery with a bounded retry for messages negotiation cannot proceed
    /// without.
    async fn send_critical(
        &self,
        to: &PeerToken,
        message: &SignalMessage,
    ) -> Result<(), CallError> {
        let mut attempts = 0;
        loop {
            match self.transport.send(to, message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts < self.config.critical_send_retries => {
                    attempts += 1;
                    warn!(
                        "Retrying {} delivery ({}/{}): {}",
                        message.kind(),
                        attempts,
                        self.config.critical_send_retries,
                        e
                    );
                }
                Err(e) => return Err(CallError::Transport(e)),
            }
        }
    }

    /// Resources are released before the failure becomes visible.
    async fn fail_call(&self, call: &mut ActiveCall, error: &CallError) {
        call.rtc.close().await;
        if let Err(e) = call.session.apply_transition(CallTransition::Failure {
            reason: error.to_string(),
        }) {
            debug!("Failure transition for call {}: {}", call.session.call_id, e);
        }
    }

    /// The active call if it matches `call_id` and is still live; logs and
    /// returns `None` for unknown or finished calls.
    fn current_call<'a>(
        active: &'a mut Option<ActiveCall>,
        call_id: &CallId,
    ) -> Option<&'a mut ActiveCall> {
        match active.as_mut() {
            Some(call) if call.session.call_id == *call_id => {
                if call.session.state.is_terminal() {
                    debug!(
                        "Dropping message for finished call {} (state {})",
                        call_id,
                        call.session.state.name()
                    );
                    None
                } else {
                    Some(call)
                }
            }
            Some(call) => {
                debug!(
                    "Dropping message for call {} (tracking {})",
                    call_id, call.session.call_id
                );
                None
            }
            None => {
                debug!("Dropping message for call {}: no active call", call_id);
                None
            }
        }
    }

    async fn is_current_call(&self, call_id: &CallId) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|call| call.session.call_id == *call_id)
            .unwrap_or(false)
    }

    fn publish(&self, active: &Option<ActiveCall>) {
        let snapshot = match active {
            Some(call) => Self::snapshot_of(call),
            None => CallSnapshot::default(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }

    fn publish_call(&self, call: &ActiveCall) {
        self.snapshot_tx.send_replace(Self::snapshot_of(call));
    }

    fn snapshot_of(call: &ActiveCall) -> CallSnapshot {
        CallSnapshot {
            state: call.session.state.clone(),
            local_stream: call.session.local_stream.clone(),
            remote_stream: call.session.remote_stream.clone(),
            caller_info: call.session.caller_info.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: StdMutex<Vec<SignalMessage>>,
    }

    #[async_trait]
    impl SignalingTransport for RecordingTransport {
        async fn send(
            &self,
            _to: &PeerToken,
            message: &SignalMessage,
        ) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct NullRtc;

    #[async_trait]
    impl RtcSession for NullRtc {
        async fn create_offer(&self) -> Result<SessionDescription, CallError> {
            Ok(SessionDescription::offer("v=0"))
        }
        async fn create_answer(&self) -> Result<SessionDescription, CallError> {
            Ok(SessionDescription::answer("v=0"))
        }
        async fn set_local_description(&self, _: &SessionDescription) -> Result<(), CallError> {
            Ok(())
        }
        async fn set_remote_description(&self, _: &SessionDescription) -> Result<(), CallError> {
            Ok(())
        }
        async fn add_remote_candidate(&self, _: &IceCandidate) -> Result<(), CallError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    struct NullEngine;

    #[async_trait]
    impl MediaEngine for NullEngine {
        async fn create_session(
            &self,
            _ice_servers: &[IceServer],
            _events: mpsc::Sender<SessionEvent>,
        ) -> Result<Arc<dyn RtcSession>, CallError> {
            Ok(Arc::new(NullRtc))
        }
        async fn attach_local_media(
            &self,
            _session: &Arc<dyn RtcSession>,
            _constraints: &MediaConstraints,
        ) -> Result<MediaStream, CallError> {
            Ok(MediaStream::new("local"))
        }
    }

    /// Local candidates discovered before the offer goes out have nowhere to
    /// be delivered yet; they must be held on the session and sent to the
    /// peer once the offer is on the wire.
    #[tokio::test]
    async fn test_local_candidates_discovered_before_offer_are_sent_after_it() {
        let transport = Arc::new(RecordingTransport::default());
        let orchestrator = CallOrchestrator::new(
            PeerToken::new("token-a"),
            OrchestratorConfig::default(),
            transport.clone(),
            Arc::new(NullEngine),
        );

        // A freshly created outgoing session, offer not yet sent.
        let (_events_tx, events_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let call_id = CallId::new("AC90CFD09DF712D981142B172706F9F2");
        let session = CallSession::new_outgoing(call_id, PeerToken::new("token-b"));
        *orchestrator.active.lock().await = Some(ActiveCall {
            session,
            rtc: Arc::new(NullRtc),
            events: Some(events_rx),
        });

        orchestrator
            .dispatch(CallEvent::LocalCandidateDiscovered(IceCandidate::new(
                "candidate:1",
            )))
            .await;
        orchestrator
            .dispatch(CallEvent::LocalCandidateDiscovered(IceCandidate::new(
                "candidate:2",
            )))
            .await;
        assert!(
            transport.sent.lock().unwrap().is_empty(),
            "nothing may go out before the offer"
        );

        let mut active = orchestrator.active.lock().await;
        let call = active.as_mut().unwrap();
        assert_eq!(call.session.pending_local_candidates.len(), 2);

        call.session
            .apply_transition(CallTransition::OfferSent)
            .unwrap();
        orchestrator.flush_local_candidates(call).await;
        assert!(call.session.pending_local_candidates.is_empty());

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        for (message, expected) in sent.iter().zip(["candidate:1", "candidate:2"]) {
            match message {
                SignalMessage::Candidate { candidate, .. } => {
                    assert_eq!(candidate.candidate, expected)
                }
                other => panic!("expected candidate message, got {}", other.kind()),
            }
        }
    }
}
