#![deny(unreachable_pub, unsafe_code)]

//! Receive-only capture of the audio and video of a conference.
//!
//! The [`RecordingController`] binds a receive pipeline per [`MediaType`](ice::MediaType) to the transports
//! negotiated by an [`ice::TransportNegotiator`], starts reception and then recording. Events emitted by the
//! recorders pass through the [`SpeakerCorrelator`] into a [`JsonEventLog`].
//!
//! [`CaptureTask`] drives both the negotiator and the controller for a single recording task.

mod controller;
mod correlator;
mod event;
mod event_log;
mod media;
mod registry;
mod task;

pub use controller::{
    ControllerState, RecorderConfig, RecordingController, Resource, TeardownError, TeardownReport,
};
pub use correlator::SpeakerCorrelator;
pub use event::{EventHandler, EventType, RecorderEvent};
pub use event_log::{JsonEventLog, available_path};
pub use media::{
    Direction, DynamicPayloadType, FormatTable, KeyExchange, MediaEngine, MediaError, MediaFormat,
    PipelineBinding, ReceivePipeline, Recorder, Relay,
};
pub use registry::{ParticipantRegistry, SsrcRegistry};
pub use task::{CaptureTask, CaptureTaskConfig};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not start receiving streams, {started} of {expected} started")]
    PartialStart { started: usize, expected: usize },
    #[error("{0} already started")]
    DoubleStart(&'static str),
    #[error("a previous start was aborted, the controller must be stopped first")]
    Aborted,
    #[error("could not start recording, reception is not active")]
    NotReceiving,
    #[error("recording controller was stopped")]
    Stopped,
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Negotiation(#[from] ice::Error),
    #[error("failed to create event log")]
    EventLog(#[source] std::io::Error),
}
