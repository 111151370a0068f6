use crate::{
    MediaType, PerMedia,
    candidate::{Candidate, ComponentId, TransportAddress},
};
use parking_lot::Mutex;
use rand::distr::{Alphanumeric, SampleString};
use slotmap::{SlotMap, new_key_type};
use std::{
    fmt,
    net::{SocketAddr, UdpSocket},
    sync::Arc,
};
use tokio::sync::watch;

/// State of the negotiation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    /// Candidates may be gathered and applied, checks have not started
    Idle,
    /// Connectivity checks are running
    Running,
    /// Connectivity checks finished successfully
    Completed,
    /// Connectivity checks failed
    Failed,
    /// The session was disposed
    Terminated,
}

impl NegotiationState {
    /// No candidates may be added once a terminal state has been entered
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NegotiationState::Completed | NegotiationState::Failed | NegotiationState::Terminated
        )
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NegotiationState::Idle => "IDLE",
            NegotiationState::Running => "RUNNING",
            NegotiationState::Completed => "COMPLETED",
            NegotiationState::Failed => "FAILED",
            NegotiationState::Terminated => "TERMINATED",
        };

        f.write_str(s)
    }
}

/// Credentials of an ICE agent
///
/// These must be exchanged using the signaling protocol
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IceCredentials {
    pub ufrag: String,
    pub pwd: String,
}

impl IceCredentials {
    pub fn random() -> Self {
        let mut rng = rand::rng();

        Self {
            ufrag: Alphanumeric.sample_string(&mut rng, 8),
            pwd: Alphanumeric.sample_string(&mut rng, 32),
        }
    }
}

new_key_type!(
    pub(crate) struct RemoteCandidateId;
);

/// A remote candidate accepted into a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCandidate {
    pub candidate: Candidate,
    /// The related candidate, if it was registered before this one
    pub related: Option<Candidate>,
}

/// Local and remote candidate which passed the connectivity checks for a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPair {
    pub local: Candidate,
    pub remote: Candidate,
}

pub(crate) struct Component {
    pub(crate) id: ComponentId,
    /// One socket per IP family of the local candidates
    pub(crate) sockets: Vec<Arc<UdpSocket>>,
    pub(crate) local_candidates: Vec<Candidate>,
    /// Remote candidates with the id of their related candidate
    pub(crate) remote_candidates:
        SlotMap<RemoteCandidateId, (Candidate, Option<RemoteCandidateId>)>,
    pub(crate) selected_pair: Option<SelectedPair>,
}

impl Component {
    pub(crate) fn new(id: ComponentId) -> Self {
        Self {
            id,
            sockets: vec![],
            local_candidates: vec![],
            remote_candidates: SlotMap::with_key(),
            selected_pair: None,
        }
    }

    pub(crate) fn find_remote_candidate(
        &self,
        address: &TransportAddress,
    ) -> Option<RemoteCandidateId> {
        self.remote_candidates
            .iter()
            .find(|(_, (c, _))| c.address == *address)
            .map(|(id, _)| id)
    }

    pub(crate) fn socket_for(&self, local: SocketAddr) -> Option<&Arc<UdpSocket>> {
        self.sockets.iter().find(|socket| {
            socket.local_addr().is_ok_and(|addr| {
                addr.port() == local.port() && addr.is_ipv4() == local.is_ipv4()
            })
        })
    }

    pub(crate) fn remote_candidates(&self) -> Vec<RemoteCandidate> {
        self.remote_candidates
            .values()
            .map(|(candidate, related)| RemoteCandidate {
                candidate: candidate.clone(),
                related: related
                    .and_then(|id| self.remote_candidates.get(id))
                    .map(|(related, _)| related.clone()),
            })
            .collect()
    }
}

pub(crate) struct Stream {
    pub(crate) remote_credentials: Option<IceCredentials>,
    /// Data & control component, indexed by [`ComponentId::index`]
    pub(crate) components: [Component; 2],
}

impl Stream {
    pub(crate) fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.index()]
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.index()]
    }

    /// Selected pairs of the data and control component, once both are available
    pub(crate) fn selected_pairs(&self) -> Option<(SelectedPair, SelectedPair)> {
        let [rtp, rtcp] = &self.components;

        Some((rtp.selected_pair.clone()?, rtcp.selected_pair.clone()?))
    }
}

/// State shared between the negotiator and the negotiation engine
pub(crate) struct Session {
    pub(crate) task_id: String,
    pub(crate) generation: u32,
    pub(crate) controlling: bool,
    pub(crate) credentials: IceCredentials,
    pub(crate) streams: Mutex<PerMedia<Option<Stream>>>,
    state: watch::Sender<NegotiationState>,
}

impl Session {
    pub(crate) fn new(task_id: String, generation: u32, controlling: bool) -> Self {
        Self {
            task_id,
            generation,
            controlling,
            credentials: IceCredentials::random(),
            streams: Mutex::new(PerMedia::default()),
            state: watch::Sender::new(NegotiationState::Idle),
        }
    }

    pub(crate) fn state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.state.subscribe()
    }

    /// Enter `new` if `predicate` holds for the current state. Returns the previous state on success.
    pub(crate) fn transition(
        &self,
        new: NegotiationState,
        predicate: impl FnOnce(NegotiationState) -> bool,
    ) -> Result<NegotiationState, NegotiationState> {
        let mut result = Err(new);

        self.state.send_if_modified(|state| {
            if predicate(*state) {
                result = Ok(*state);
                *state = new;
                true
            } else {
                result = Err(*state);
                false
            }
        });

        if let Ok(old) = result {
            log::debug!("[{}] negotiation state {old} -> {new}", self.task_id);
        }

        result
    }

    pub(crate) fn with_stream<R>(
        &self,
        media_type: MediaType,
        f: impl FnOnce(&mut Stream) -> R,
    ) -> Option<R> {
        self.streams.lock()[media_type].as_mut().map(f)
    }
}
