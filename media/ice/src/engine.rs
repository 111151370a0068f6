use crate::{
    MediaType,
    candidate::{Candidate, ComponentId, pair_priority},
    session::{IceCredentials, NegotiationState, SelectedPair, Session},
};
use std::{
    net::{SocketAddr, UdpSocket},
    sync::Arc,
};

#[derive(Debug, thiserror::Error)]
#[error("connectivity checks failed: {reason}")]
pub struct EngineError {
    pub reason: String,
}

impl EngineError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// The connectivity check engine (STUN/TURN) driven by the [`TransportNegotiator`](crate::TransportNegotiator)
///
/// The engine reads candidates from the [`Checklist`] and reports selected pairs back into it while it runs.
#[async_trait::async_trait]
pub trait NegotiationEngine: Send + Sync + 'static {
    /// Run connectivity checks for all streams.
    ///
    /// Returning `Ok` moves the session into `COMPLETED`, returning an error into `FAILED`.
    async fn establish(&self, checklist: Checklist) -> Result<(), EngineError>;

    /// Release all resources held by the engine. Called once when the negotiator is disposed.
    fn free(&self) {}
}

/// Candidate pair of a component, as formed from the local and remote candidates
#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub media_type: MediaType,
    pub component: ComponentId,
    pub local: Candidate,
    pub remote: Candidate,
    pub priority: u64,
}

/// Engine side view of the negotiation session
#[derive(Clone)]
pub struct Checklist {
    pub(crate) session: Arc<Session>,
}

impl Checklist {
    pub fn state(&self) -> NegotiationState {
        self.session.state()
    }

    pub fn is_controlling(&self) -> bool {
        self.session.controlling
    }

    pub fn local_credentials(&self) -> &IceCredentials {
        &self.session.credentials
    }

    pub fn remote_credentials(&self, media_type: MediaType) -> Option<IceCredentials> {
        self.session
            .with_stream(media_type, |stream| stream.remote_credentials.clone())
            .flatten()
    }

    /// All reachable candidate pairs of the media stream, highest priority first
    pub fn pairs(&self, media_type: MediaType) -> Vec<CandidatePair> {
        let controlling = self.session.controlling;

        let mut pairs = self
            .session
            .with_stream(media_type, |stream| {
                let mut pairs = vec![];

                for component in &stream.components {
                    for local in &component.local_candidates {
                        for (remote, _) in component.remote_candidates.values() {
                            if !local.can_reach(remote) {
                                continue;
                            }

                            pairs.push(CandidatePair {
                                media_type,
                                component: component.id,
                                local: local.clone(),
                                remote: remote.clone(),
                                priority: pair_priority(
                                    local.priority,
                                    remote.priority,
                                    controlling,
                                ),
                            });
                        }
                    }
                }

                pairs
            })
            .unwrap_or_default();

        pairs.sort_by(|a, b| b.priority.cmp(&a.priority));
        pairs
    }

    /// Socket of the local candidate with the address `local`
    pub fn socket(
        &self,
        media_type: MediaType,
        component: ComponentId,
        local: SocketAddr,
    ) -> Option<Arc<UdpSocket>> {
        self.session
            .with_stream(media_type, |stream| {
                stream.component(component).socket_for(local).cloned()
            })
            .flatten()
    }

    /// Report the pair that passed the connectivity checks for a component.
    ///
    /// Returns false if either candidate is unknown or the session is no longer running.
    pub fn select_pair(
        &self,
        media_type: MediaType,
        component: ComponentId,
        local: SocketAddr,
        remote: SocketAddr,
    ) -> bool {
        if self.session.state() != NegotiationState::Running {
            return false;
        }

        let selected = self.session.with_stream(media_type, |stream| {
            let component = stream.component_mut(component);

            let local = component
                .local_candidates
                .iter()
                .find(|c| c.address.addr == local)?
                .clone();

            let (remote, _) = component
                .remote_candidates
                .values()
                .find(|(c, _)| c.address.addr == remote)?;
            let remote = remote.clone();

            log::debug!(
                "[{}] selected pair {media_type}/{:?}: {local} <-> {remote}",
                self.session.task_id,
                component.id,
            );

            component.selected_pair = Some(SelectedPair { local, remote });

            Some(())
        });

        matches!(selected, Some(Some(())))
    }
}
