use crate::{
    event::{EventHandler, EventType, RecorderEvent},
    registry::SsrcRegistry,
};
use ice::MediaType;
use parking_lot::Mutex;
use std::sync::Arc;

/// Event handler shared by all recorders of a task
///
/// Active speaker events carry the audio SSRC of the speaker, they are rewritten to the speaker's video SSRC before
/// they are forwarded to the event log. Events are handled one at a time.
pub struct SpeakerCorrelator {
    task_id: String,
    registry: Arc<dyn SsrcRegistry>,
    sink: Mutex<Option<Box<dyn EventHandler>>>,
}

impl SpeakerCorrelator {
    /// Create a correlator forwarding into `sink`, which may be absent if the event log could not be created
    pub fn new(
        task_id: String,
        registry: Arc<dyn SsrcRegistry>,
        sink: Option<Box<dyn EventHandler>>,
    ) -> Self {
        Self {
            task_id,
            registry,
            sink: Mutex::new(sink),
        }
    }

    fn correlate(&self, event: &mut RecorderEvent) -> bool {
        let Some(audio_ssrc) = event.audio_ssrc else {
            log::error!(
                "[{}] speaker change without audio SSRC, dropping it",
                self.task_id
            );
            return false;
        };

        match self
            .registry
            .associated_ssrc(audio_ssrc, MediaType::Audio, MediaType::Video)
        {
            Some(video_ssrc) => {
                log::debug!(
                    "[{}] speaker changed, audio SSRC {audio_ssrc} -> video SSRC {video_ssrc}",
                    self.task_id
                );

                event.ssrc = video_ssrc;
                true
            }
            None => {
                log::error!(
                    "[{}] no video SSRC associated with audio SSRC {audio_ssrc}, dropping speaker change",
                    self.task_id
                );
                false
            }
        }
    }
}

impl EventHandler for SpeakerCorrelator {
    fn handle_event(&self, mut event: RecorderEvent) -> bool {
        let sink = self.sink.lock();

        if event.kind == EventType::SpeakerChanged && !self.correlate(&mut event) {
            return false;
        }

        match &*sink {
            Some(sink) => sink.handle_event(event),
            None => {
                log::warn!(
                    "[{}] no event log, {:?} event is lost",
                    self.task_id,
                    event.kind
                );
                false
            }
        }
    }

    fn close(&self) {
        if let Some(sink) = &*self.sink.lock() {
            sink.close();
        }
    }
}
