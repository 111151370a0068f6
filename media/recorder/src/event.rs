use ice::MediaType;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RecordingStarted,
    RecordingEnded,
    /// The active speaker changed, carries the speaker's audio SSRC
    SpeakerChanged,
    NewEndpoint,
    Other,
}

/// Session event emitted by a [`Recorder`](crate::Recorder)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    /// Milliseconds since the UNIX epoch
    pub instant: u64,
    pub ssrc: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ssrc: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtp_timestamp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

impl RecorderEvent {
    /// Create an event of the given type which happened now
    pub fn new(kind: EventType, ssrc: u32) -> Self {
        let instant = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();

        Self {
            kind,
            instant,
            ssrc,
            audio_ssrc: None,
            rtp_timestamp: None,
            media_type: None,
            filename: None,
            endpoint_id: None,
            participant_name: None,
            aspect_ratio: None,
        }
    }

    /// Active speaker change, the `ssrc` is filled in once the speaker's video SSRC is known
    pub fn speaker_changed(audio_ssrc: u32) -> Self {
        Self {
            audio_ssrc: Some(audio_ssrc),
            media_type: Some(MediaType::Video),
            ..Self::new(EventType::SpeakerChanged, 0)
        }
    }
}

/// Receives the events of one or more recorders
pub trait EventHandler: Send + Sync {
    /// Returns whether the event was persisted
    fn handle_event(&self, event: RecorderEvent) -> bool;

    fn close(&self);
}
