use serde::{Deserialize, Serialize};
use std::{
    cmp::{max, min},
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

/// Component of a media stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ComponentId {
    /// The data (RTP) component
    Rtp = 1,
    /// The control (RTCP) component
    Rtcp = 2,
}

impl ComponentId {
    pub const ALL: [ComponentId; 2] = [ComponentId::Rtp, ComponentId::Rtcp];

    pub fn from_u32(id: u32) -> Option<Self> {
        match id {
            1 => Some(ComponentId::Rtp),
            2 => Some(ComponentId::Rtcp),
            _ => None,
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportProtocol::Udp => "udp",
            TransportProtocol::Tcp => "tcp",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown transport protocol {0:?}")]
pub struct UnknownTransportProtocol(pub String);

impl FromStr for TransportProtocol {
    type Err = UnknownTransportProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("udp") {
            Ok(TransportProtocol::Udp)
        } else if s.eq_ignore_ascii_case("tcp") {
            Ok(TransportProtocol::Tcp)
        } else {
            Err(UnknownTransportProtocol(s.into()))
        }
    }
}

/// Socket address combined with the transport protocol used on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportAddress {
    pub addr: SocketAddr,
    pub protocol: TransportProtocol,
}

impl TransportAddress {
    pub fn udp(addr: SocketAddr) -> Self {
        Self {
            addr,
            protocol: TransportProtocol::Udp,
        }
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.protocol.as_str())
    }
}

/// Candidate type, the discriminant is the RFC 8445 type preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateKind {
    #[serde(rename = "host")]
    Host = 126,
    #[serde(rename = "prflx")]
    PeerReflexive = 110,
    #[serde(rename = "srflx")]
    ServerReflexive = 100,
    #[serde(rename = "relay")]
    Relayed = 0,
}

impl CandidateKind {
    /// Rank used when applying remote candidates.
    ///
    /// Lower ranks are applied first, so the base candidate referenced by a reflexive or relayed
    /// candidate is always known by the time the referencing candidate is added.
    pub fn precedence(self) -> u8 {
        match self {
            CandidateKind::Host => 0,
            CandidateKind::ServerReflexive | CandidateKind::PeerReflexive => 1,
            CandidateKind::Relayed => 2,
        }
    }

    /// Only reflexive and relayed candidates reference a related candidate
    pub fn has_related(self) -> bool {
        self != CandidateKind::Host
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CandidateKind::Host => "host",
            CandidateKind::PeerReflexive => "prflx",
            CandidateKind::ServerReflexive => "srflx",
            CandidateKind::Relayed => "relay",
        }
    }

    fn local_preference_offset(self) -> u32 {
        match self {
            CandidateKind::Host => (65535 / 4) * 3,
            CandidateKind::PeerReflexive => (65535 / 4) * 2,
            CandidateKind::ServerReflexive => 65535 / 4,
            CandidateKind::Relayed => 0,
        }
    }
}

/// A local or remote transport candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: TransportAddress,
    pub foundation: String,
    pub kind: CandidateKind,
    /// Higher wins
    pub priority: u32,
    pub generation: u32,
    pub component: ComponentId,
    /// Address of the related (base) candidate. Only set for reflexive and relayed candidates.
    pub related_address: Option<TransportAddress>,
}

impl Candidate {
    /// Create a local host candidate.
    ///
    /// `same_kind_count` is the number of host candidates already present in the component, it is used to give
    /// every candidate of the same kind a unique priority.
    pub(crate) fn host(
        component: ComponentId,
        addr: SocketAddr,
        generation: u32,
        same_kind_count: usize,
    ) -> Self {
        let kind = CandidateKind::Host;

        Self {
            address: TransportAddress::udp(addr),
            foundation: compute_foundation(kind, addr.ip(), None, TransportProtocol::Udp)
                .to_string(),
            kind,
            priority: compute_priority(kind, component, same_kind_count),
            generation,
            component,
            related_address: None,
        }
    }

    /// Connector-level reachability test of a local candidate towards a remote one.
    ///
    /// Candidates only reach each other when they use the same transport protocol and IP family,
    /// and either both or neither are link-local addresses.
    pub fn can_reach(&self, remote: &Candidate) -> bool {
        if self.address.protocol != remote.address.protocol {
            return false;
        }

        match (self.address.addr.ip(), remote.address.addr.ip()) {
            (IpAddr::V4(l), IpAddr::V4(r)) => l.is_link_local() == r.is_link_local(),
            (IpAddr::V6(l), IpAddr::V6(r)) => {
                l.is_unicast_link_local() == r.is_unicast_link_local()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.related_address {
            Some(related) => write!(
                f,
                "{}({}, related:{})",
                self.kind.as_str(),
                self.address,
                related.addr
            ),
            None => write!(f, "{}({})", self.kind.as_str(), self.address),
        }
    }
}

/// Compare two candidates by the order in which they must be applied
pub fn application_order(a: CandidateKind, b: CandidateKind) -> std::cmp::Ordering {
    a.precedence().cmp(&b.precedence())
}

/// Calculate the candidate priority using offsets + count of candidates of the same type
pub(crate) fn compute_priority(
    kind: CandidateKind,
    component: ComponentId,
    same_kind_count: usize,
) -> u32 {
    let local_preference =
        (same_kind_count as u32).min(65535 / 4 - 1) + kind.local_preference_offset();

    let kind_preference = (kind as u32) << 24;
    let local_preference = local_preference << 8;

    kind_preference + local_preference + (256 - component as u32)
}

/// pair priority = 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
pub(crate) fn pair_priority(local: u32, remote: u32, is_controlling: bool) -> u64 {
    let (g, d) = if is_controlling {
        (u64::from(local), u64::from(remote))
    } else {
        (u64::from(remote), u64::from(local))
    };

    2u64.pow(32) * min(g, d) + 2 * max(g, d) + if g > d { 1 } else { 0 }
}

fn compute_foundation(
    kind: CandidateKind,
    base: IpAddr,
    rel_addr: Option<IpAddr>,
    proto: TransportProtocol,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    (kind, base, rel_addr, proto).hash(&mut hasher);
    hasher.finish()
}
