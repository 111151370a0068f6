//! Transport descriptions exchanged with the signaling layer

use crate::candidate::CandidateKind;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Local credentials and candidates of all media types, handed to the signaling layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDescription {
    pub ufrag: String,
    pub password: String,
    pub candidates: Vec<CandidateDescription>,
}

/// Remote transport information of a single media type as received from the signaling layer
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDescription {
    #[serde(default)]
    pub ufrag: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub candidates: Vec<CandidateDescription>,
}

/// Signaling representation of a single candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    #[serde(default)]
    pub id: String,
    pub component: u32,
    pub foundation: String,
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub network: u32,
    pub ip: IpAddr,
    pub port: u16,
    pub priority: u64,
    pub protocol: String,
    #[serde(rename = "type")]
    pub kind: CandidateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_addr: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_port: Option<u16>,
}
