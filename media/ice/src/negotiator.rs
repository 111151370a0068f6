use crate::{
    Error, MediaType, PerMedia,
    candidate::{Candidate, ComponentId, TransportAddress, TransportProtocol, application_order},
    config::NegotiatorConfig,
    description::{CandidateDescription, LocalDescription, RemoteDescription},
    engine::{Checklist, NegotiationEngine},
    harvest,
    session::{
        IceCredentials, NegotiationState, RemoteCandidate, SelectedPair, Session, Stream,
    },
};
use parking_lot::Mutex;
use std::{
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle, time::sleep};

/// Local data & control socket of a negotiated media stream
#[derive(Debug, Clone)]
pub struct Connector {
    data: Arc<UdpSocket>,
    control: Arc<UdpSocket>,
}

impl Connector {
    pub fn new(data: Arc<UdpSocket>, control: Arc<UdpSocket>) -> Self {
        Self { data, control }
    }

    /// Socket of the data (RTP) component
    pub fn data_socket(&self) -> &Arc<UdpSocket> {
        &self.data
    }

    /// Socket of the control (RTCP) component
    pub fn control_socket(&self) -> &Arc<UdpSocket> {
        &self.control
    }

    /// Returns true if both connectors use the same sockets
    pub fn same_sockets(&self, other: &Connector) -> bool {
        Arc::ptr_eq(&self.data, &other.data) && Arc::ptr_eq(&self.control, &other.control)
    }
}

/// Remote data & control address of a negotiated media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    pub data: SocketAddr,
    pub control: SocketAddr,
}

/// Drives ICE for all media types of a single capture task
pub struct TransportNegotiator {
    config: NegotiatorConfig,
    session: Arc<Session>,
    engine: Arc<dyn NegotiationEngine>,

    establishment: Mutex<Option<JoinHandle<()>>>,

    connectors: Mutex<PerMedia<Option<Connector>>>,
    targets: Mutex<PerMedia<Option<RemoteTarget>>>,

    disposed: AtomicBool,
}

impl Drop for TransportNegotiator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl TransportNegotiator {
    pub fn new(config: NegotiatorConfig, engine: Arc<dyn NegotiationEngine>) -> Self {
        let session = Arc::new(Session::new(
            config.task_id.clone(),
            config.generation,
            config.controlling,
        ));

        log::info!("[{}] created transport negotiator", config.task_id);

        Self {
            config,
            session,
            engine,
            establishment: Mutex::new(None),
            connectors: Mutex::new(PerMedia::default()),
            targets: Mutex::new(PerMedia::default()),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> NegotiationState {
        self.session.state()
    }

    /// Subscribe to changes of the negotiation state
    pub fn subscribe(&self) -> watch::Receiver<NegotiationState> {
        self.session.subscribe()
    }

    pub fn local_credentials(&self) -> &IceCredentials {
        &self.session.credentials
    }

    fn ensure_mutable(&self) -> Result<(), Error> {
        let state = self.session.state();

        if state.is_terminal() {
            Err(Error::InvalidState(state))
        } else {
            Ok(())
        }
    }

    /// Create the data & control components of every media type and gather their host candidates.
    ///
    /// Media types which already have components are left untouched.
    pub fn harvest_local_candidates(&self) -> Result<(), Error> {
        log::info!("[{}] harvesting local candidates", self.config.task_id);

        self.ensure_mutable()?;

        let ips = harvest::local_ips(&self.config)?;

        if ips.is_empty() {
            return Err(Error::NoLocalAddress);
        }

        let range = self.config.port_range();

        for media_type in MediaType::ALL {
            if self.session.streams.lock()[media_type].is_some() {
                continue;
            }

            let rtp = harvest::harvest_component(
                ComponentId::Rtp,
                &ips,
                &range,
                self.session.generation,
            )?;
            let rtcp = harvest::harvest_component(
                ComponentId::Rtcp,
                &ips,
                &range,
                self.session.generation,
            )?;

            let mut streams = self.session.streams.lock();

            streams[media_type].get_or_insert(Stream {
                remote_credentials: None,
                components: [rtp, rtcp],
            });
        }

        Ok(())
    }

    /// Apply remote credentials and candidates for every media type present in `remote`.
    ///
    /// Candidates are applied host first, then reflexive, then relayed candidates, so that the related candidate of
    /// every reflexive or relayed candidate is already registered when it is added. Returns the number of accepted
    /// candidates.
    pub fn apply_remote_description(
        &self,
        remote: &PerMedia<Option<RemoteDescription>>,
    ) -> Result<usize, Error> {
        log::info!("[{}] applying remote description", self.config.task_id);

        self.ensure_mutable()?;

        let mut streams = self.session.streams.lock();
        let mut accepted = 0;

        for (media_type, description) in remote.iter() {
            let Some(description) = description else {
                continue;
            };

            let stream = streams[media_type]
                .as_mut()
                .ok_or(Error::NotHarvested(media_type))?;

            if description.ufrag.is_some() || description.password.is_some() {
                let credentials = stream.remote_credentials.get_or_insert_default();

                if let Some(ufrag) = &description.ufrag {
                    credentials.ufrag.clone_from(ufrag);
                }

                if let Some(pwd) = &description.password {
                    credentials.pwd.clone_from(pwd);
                }
            }

            let mut candidates: Vec<&CandidateDescription> =
                description.candidates.iter().collect();
            candidates.sort_by(|a, b| application_order(a.kind, b.kind));

            for candidate in candidates {
                if self.add_remote_candidate(media_type, stream, candidate) {
                    accepted += 1;
                }
            }
        }

        Ok(accepted)
    }

    fn add_remote_candidate(
        &self,
        media_type: MediaType,
        stream: &mut Stream,
        description: &CandidateDescription,
    ) -> bool {
        let task_id = &self.config.task_id;

        if description.generation != self.session.generation {
            log::debug!(
                "[{task_id}] discard {media_type} candidate {} of generation {}",
                description.id,
                description.generation
            );
            return false;
        }

        let Some(component_id) = ComponentId::from_u32(description.component) else {
            log::debug!(
                "[{task_id}] discard {media_type} candidate with unsupported component {}",
                description.component
            );
            return false;
        };

        let Ok(protocol) = description.protocol.parse::<TransportProtocol>() else {
            log::debug!(
                "[{task_id}] discard {media_type} candidate with unsupported protocol {}",
                description.protocol
            );
            return false;
        };

        let Ok(priority) = u32::try_from(description.priority) else {
            log::warn!("[{task_id}] candidate has priority larger than u32::MAX");
            return false;
        };

        let related_address = match (description.rel_addr, description.rel_port) {
            (Some(ip), Some(port)) if description.kind.has_related() => Some(TransportAddress {
                addr: SocketAddr::new(ip, port),
                protocol,
            }),
            _ => None,
        };

        let candidate = Candidate {
            address: TransportAddress {
                addr: SocketAddr::new(description.ip, description.port),
                protocol,
            },
            foundation: description.foundation.clone(),
            kind: description.kind,
            priority,
            generation: description.generation,
            component: component_id,
            related_address,
        };

        let component = stream.component_mut(component_id);

        if component.find_remote_candidate(&candidate.address).is_some() {
            log::debug!("[{task_id}] ignore duplicate {media_type} candidate {candidate}");
            return false;
        }

        if !component
            .local_candidates
            .iter()
            .any(|local| local.can_reach(&candidate))
        {
            log::debug!("[{task_id}] discard unreachable {media_type} candidate {candidate}");
            return false;
        }

        let related = related_address.and_then(|addr| component.find_remote_candidate(&addr));

        if related_address.is_some() && related.is_none() {
            log::debug!("[{task_id}] related candidate of {candidate} is unknown");
        }

        log::debug!("[{task_id}] add remote {media_type} candidate {candidate}");

        component.remote_candidates.insert((candidate, related));

        true
    }

    /// Remote candidates accepted for a component, in the order they were added
    pub fn remote_candidates(
        &self,
        media_type: MediaType,
        component: ComponentId,
    ) -> Vec<RemoteCandidate> {
        self.session
            .with_stream(media_type, |stream| {
                stream.component(component).remote_candidates()
            })
            .unwrap_or_default()
    }

    /// Start the connectivity checks in the background.
    ///
    /// Returns immediately, the outcome is observed with [`await_established`](Self::await_established) or
    /// [`subscribe`](Self::subscribe). Must be called from within a tokio runtime.
    pub fn start_establishment(&self) -> Result<(), Error> {
        log::info!("[{}] starting connectivity establishment", self.config.task_id);

        self.session
            .transition(NegotiationState::Running, |state| {
                state == NegotiationState::Idle
            })
            .map_err(Error::InvalidState)?;

        let engine = self.engine.clone();
        let session = self.session.clone();

        let handle = tokio::spawn(async move {
            let checklist = Checklist {
                session: session.clone(),
            };

            let outcome = match engine.establish(checklist).await {
                Ok(()) => NegotiationState::Completed,
                Err(e) => {
                    log::warn!("[{}] {e}", session.task_id);
                    NegotiationState::Failed
                }
            };

            // dispose may have terminated the session in the meantime
            let _ = session.transition(outcome, |state| state == NegotiationState::Running);
        });

        *self.establishment.lock() = Some(handle);

        Ok(())
    }

    /// Wait until the session leaves the `RUNNING` state.
    ///
    /// Returns the state that was entered, fails if it is `FAILED` or if `timeout` elapses first.
    pub async fn await_established(&self, timeout: Duration) -> Result<NegotiationState, Error> {
        // The receiver is the state listener, it is dropped on every return path
        let mut listener = self.session.subscribe();

        let wait = listener.wait_for(|state| *state != NegotiationState::Running);

        let state = match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(state)) => *state,
            // The sender lives as long as the session, take whatever state it holds
            Ok(Err(_)) => self.session.state(),
            Err(_) => return Err(Error::Timeout(timeout)),
        };

        log::debug!("[{}] ICE {state}", self.config.task_id);

        if state == NegotiationState::Failed {
            return Err(Error::NegotiationFailed);
        }

        Ok(state)
    }

    /// Local credentials and all local candidates of all media types.
    ///
    /// Candidates are numbered starting at 1 on every call.
    pub fn local_description(&self) -> LocalDescription {
        let streams = self.session.streams.lock();
        let mut candidates = vec![];
        let mut id = 1;

        for (_, stream) in streams.iter() {
            let Some(stream) = stream else {
                continue;
            };

            for component in &stream.components {
                for candidate in &component.local_candidates {
                    candidates.push(CandidateDescription {
                        id: id.to_string(),
                        component: component.id as u32,
                        foundation: candidate.foundation.clone(),
                        generation: self.session.generation,
                        network: 1,
                        ip: candidate.address.addr.ip(),
                        port: candidate.address.addr.port(),
                        priority: candidate.priority.into(),
                        protocol: candidate.address.protocol.as_str().into(),
                        kind: candidate.kind,
                        rel_addr: candidate.related_address.map(|a| a.addr.ip()),
                        rel_port: candidate.related_address.map(|a| a.addr.port()),
                    });

                    id += 1;
                }
            }
        }

        LocalDescription {
            ufrag: self.session.credentials.ufrag.clone(),
            password: self.session.credentials.pwd.clone(),
            candidates,
        }
    }

    /// Returns the local sockets of the selected pairs of `media_type`.
    ///
    /// Waits until both the data and control component have a selected pair, polling at the configured interval.
    /// The connector is cached, every later call returns the same sockets.
    pub async fn connector(
        &self,
        media_type: MediaType,
        timeout: Duration,
    ) -> Result<Connector, Error> {
        let cached = self.connectors.lock()[media_type].clone();

        if let Some(connector) = cached {
            return Ok(connector);
        }

        let connector = self
            .wait_for_selected_pairs(media_type, timeout, |stream, rtp, rtcp| {
                let data = stream
                    .component(ComponentId::Rtp)
                    .socket_for(rtp.local.address.addr)?
                    .clone();
                let control = stream
                    .component(ComponentId::Rtcp)
                    .socket_for(rtcp.local.address.addr)?
                    .clone();

                Some(Connector { data, control })
            })
            .await?;

        Ok(self.connectors.lock()[media_type]
            .get_or_insert(connector)
            .clone())
    }

    /// Returns the remote addresses of the selected pairs of `media_type`.
    ///
    /// Same waiting and caching behavior as [`connector`](Self::connector).
    pub async fn remote_target(
        &self,
        media_type: MediaType,
        timeout: Duration,
    ) -> Result<RemoteTarget, Error> {
        let cached = self.targets.lock()[media_type];

        if let Some(target) = cached {
            return Ok(target);
        }

        let target = self
            .wait_for_selected_pairs(media_type, timeout, |_, rtp, rtcp| {
                Some(RemoteTarget {
                    data: rtp.remote.address.addr,
                    control: rtcp.remote.address.addr,
                })
            })
            .await?;

        Ok(*self.targets.lock()[media_type].get_or_insert(target))
    }

    async fn wait_for_selected_pairs<T>(
        &self,
        media_type: MediaType,
        timeout: Duration,
        mut materialize: impl FnMut(&Stream, &SelectedPair, &SelectedPair) -> Option<T>,
    ) -> Result<T, Error> {
        let poll = async {
            loop {
                let ready = self.session.with_stream(media_type, |stream| {
                    let (rtp, rtcp) = stream.selected_pairs()?;
                    materialize(stream, &rtp, &rtcp)
                });

                match (ready, self.session.state()) {
                    (Some(Some(value)), _) => return Ok(value),
                    (_, NegotiationState::Failed) => return Err(Error::NegotiationFailed),
                    (_, NegotiationState::Terminated) => {
                        return Err(Error::InvalidState(NegotiationState::Terminated));
                    }
                    (None, _) => return Err(Error::NotHarvested(media_type)),
                    (Some(None), _) => {}
                }

                log::trace!(
                    "[{}] no selected pairs for {media_type} yet",
                    self.config.task_id
                );

                sleep(self.config.pair_poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    /// Stop the connectivity checks and release the engine and all sockets not handed out in a [`Connector`].
    ///
    /// Calling this more than once has no effect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        log::info!("[{}] disposing transport negotiator", self.config.task_id);

        if let Some(handle) = self.establishment.lock().take() {
            handle.abort();
        }

        let _ = self
            .session
            .transition(NegotiationState::Terminated, |state| {
                state != NegotiationState::Terminated
            });

        self.engine.free();

        *self.session.streams.lock() = PerMedia::default();
    }
}
