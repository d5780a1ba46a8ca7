//! Thin facade for the presentation layer.
//!
//! Pure pass-through to [`CallOrchestrator`]; no negotiation logic lives
//! here. The controller also spawns the event pump that carries media-engine
//! events (candidate discovery, remote tracks) back into the dispatcher.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::CallError;
use crate::message::{CallId, CallerInfo, PeerToken};
use crate::orchestrator::{CallOrchestrator, CallSnapshot};

#[derive(Clone)]
pub struct CallController {
    inner: Arc<CallOrchestrator>,
}

impl CallController {
    pub fn new(inner: Arc<CallOrchestrator>) -> Self {
        Self { inner }
    }

    pub async fn start_call(
        &self,
        target: PeerToken,
        metadata: CallerInfo,
    ) -> Result<CallId, CallError> {
        let call_id = self.inner.start_call(target, metadata).await?;
        self.pump_session_events().await;
        Ok(call_id)
    }

    pub async fn accept_call(&self) -> Result<(), CallError> {
        self.inner.accept_call().await
    }

    pub async fn decline_call(&self) -> Result<(), CallError> {
        self.inner.decline_call().await
    }

    pub async fn end_call(&self) {
        self.inner.end_call().await
    }

    /// Feed a raw push payload received by the application.
    pub async fn handle_push(&self, sender: PeerToken, payload: &[u8]) {
        self.inner.handle_push(sender, payload).await;
        self.pump_session_events().await;
    }

    /// Subscribe to `{state, localStream, remoteStream, callerInfo}` changes.
    pub fn subscribe(&self) -> watch::Receiver<CallSnapshot> {
        self.inner.subscribe()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.inner.snapshot()
    }

    async fn pump_session_events(&self) {
        if let Some((call_id, events)) = self.inner.take_session_events().await {
            let inner = self.inner.clone();
            tokio::spawn(inner.run_session_events(call_id, events));
        }
    }
}
