//! Media collaborators driven by the [`RecordingController`](crate::RecordingController)
//!
//! RTP depacketization, the RTP translator and writing containers to disk are not implemented here. They are
//! provided by a [`MediaEngine`] which creates the per media type resources.

use crate::event::EventHandler;
use ice::{Connector, MediaType, RemoteTarget};
use std::{fmt, path::Path, sync::Arc};

/// Error reported by a media collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct MediaError {
    pub message: String,
}

impl MediaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Media direction of a pipeline, from the local point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    SendRecv,
    RecvOnly,
    SendOnly,
    Inactive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::SendRecv => "sendrecv",
            Direction::RecvOnly => "recvonly",
            Direction::SendOnly => "sendonly",
            Direction::Inactive => "inactive",
        };

        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaFormat {
    pub media_type: MediaType,
    /// Encoding name, e.g. `opus` or `VP8`
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: Option<u32>,
}

/// Dynamic RTP payload type negotiated by the signaling layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicPayloadType {
    pub pt: u8,
    pub format: MediaFormat,
}

/// Payload types a pipeline accepts
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormatTable {
    pub dynamic: Vec<DynamicPayloadType>,
    /// Format used when no mapping applies, the first mapping of the pipeline's media type
    pub default: Option<MediaFormat>,
}

impl FormatTable {
    /// Collect the mappings of `media_type`, in the given order
    pub fn for_media(media_type: MediaType, mappings: &[DynamicPayloadType]) -> Self {
        let mut table = FormatTable::default();

        for mapping in mappings
            .iter()
            .filter(|m| m.format.media_type == media_type)
        {
            table.dynamic.push(mapping.clone());

            if table.default.is_none() {
                table.default = Some(mapping.format.clone());
            }
        }

        table
    }

    pub fn format(&self, pt: u8) -> Option<&MediaFormat> {
        self.dynamic
            .iter()
            .find(|m| m.pt == pt)
            .map(|m| &m.format)
    }
}

/// Transport and formats a pipeline is bound to before it starts receiving
#[derive(Debug, Clone)]
pub struct PipelineBinding {
    pub connector: Connector,
    pub target: RemoteTarget,
    pub formats: FormatTable,
}

/// SRTP key exchange of a single pipeline
pub trait KeyExchange: Send {
    fn start(&mut self, media_type: MediaType) -> Result<(), MediaError>;
}

/// Receive-only media stream of one media type
pub trait ReceivePipeline: Send {
    /// SSRC this pipeline uses in its RTCP reports
    fn local_ssrc(&self) -> u32;

    fn bind(&mut self, binding: PipelineBinding) -> Result<(), MediaError>;

    /// Forward everything received to `relay`
    fn attach_relay(&mut self, relay: Arc<dyn Relay>) -> Result<(), MediaError>;

    fn start_key_exchange(&mut self) -> Result<(), MediaError>;

    fn start(&mut self) -> Result<(), MediaError>;

    fn is_started(&self) -> bool;

    /// Release the connector
    fn close(&mut self) -> Result<(), MediaError>;

    fn stop(&mut self) -> Result<(), MediaError>;
}

/// RTP translator shared by the pipeline and the recorder of a media type
pub trait Relay: Send + Sync {
    fn dispose(&self) -> Result<(), MediaError>;
}

/// Writes the media of one relay to disk and emits session events
pub trait Recorder: Send {
    fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>);

    /// Start writing into `directory`, naming the output `name`
    fn start(&mut self, name: &str, directory: &Path) -> Result<(), MediaError>;

    fn stop(&mut self) -> Result<(), MediaError>;
}

pub trait MediaEngine: Send + Sync {
    fn create_pipeline(
        &self,
        media_type: MediaType,
        name: &str,
        direction: Direction,
        key_exchange: Box<dyn KeyExchange>,
    ) -> Result<Box<dyn ReceivePipeline>, MediaError>;

    fn create_relay(&self, media_type: MediaType) -> Result<Arc<dyn Relay>, MediaError>;

    fn create_recorder(
        &self,
        media_type: MediaType,
        relay: Arc<dyn Relay>,
    ) -> Result<Box<dyn Recorder>, MediaError>;
}
