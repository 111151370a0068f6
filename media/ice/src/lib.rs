#![deny(unreachable_pub, unsafe_code)]

//! ICE transport negotiation for a receive-only conference participant.
//!
//! The [`TransportNegotiator`] owns one negotiation session per capture task. It harvests local host candidates,
//! applies the remote candidates received over signaling, drives a [`NegotiationEngine`] and finally hands out
//! the negotiated local sockets ([`Connector`]) and remote addresses ([`RemoteTarget`]) for every [`MediaType`].
//!
//! The connectivity checks themselves are performed by the engine, which is provided by the user.

use std::{io, time::Duration};

mod candidate;
mod config;
mod description;
mod engine;
mod harvest;
mod media;
mod negotiator;
mod session;

pub use candidate::{
    Candidate, CandidateKind, ComponentId, TransportAddress, TransportProtocol,
    UnknownTransportProtocol, application_order,
};
pub use config::{NegotiatorConfig, PortRange};
pub use description::{CandidateDescription, LocalDescription, RemoteDescription};
pub use engine::{CandidatePair, Checklist, EngineError, NegotiationEngine};
pub use media::{MediaType, PerMedia, UnsupportedMediaType};
pub use negotiator::{Connector, RemoteTarget, TransportNegotiator};
pub use session::{IceCredentials, NegotiationState, RemoteCandidate, SelectedPair};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind a local socket in port range {range}")]
    Bind {
        range: PortRange,
        #[source]
        source: io::Error,
    },
    #[error("no usable local address to harvest candidates from")]
    NoLocalAddress,
    #[error("failed to list local network interfaces")]
    Interfaces(#[from] local_ip_address::Error),
    #[error("could not establish connection (ICE failed)")]
    NegotiationFailed,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("operation not permitted in negotiation state {0}")]
    InvalidState(NegotiationState),
    #[error("no candidates have been harvested for {0}")]
    NotHarvested(MediaType),
    #[error(transparent)]
    Io(#[from] io::Error),
}
