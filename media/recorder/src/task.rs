use crate::{
    Error,
    controller::{RecordingController, TeardownReport},
    media::DynamicPayloadType,
};
use ice::{
    Connector, LocalDescription, MediaType, PerMedia, RemoteDescription, RemoteTarget,
    TransportNegotiator,
};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CaptureTaskConfig {
    /// How long to wait for the connectivity checks to finish
    pub establish_timeout: Duration,
    /// How long to wait for the selected pairs of a media type once establishment finished or timed out
    pub selected_pair_timeout: Duration,
}

impl Default for CaptureTaskConfig {
    fn default() -> Self {
        Self {
            establish_timeout: Duration::from_secs(30),
            selected_pair_timeout: Duration::from_secs(30),
        }
    }
}

/// A single recording task, from transport negotiation to the recorded files
pub struct CaptureTask {
    config: CaptureTaskConfig,
    negotiator: TransportNegotiator,
    controller: RecordingController,
}

impl CaptureTask {
    pub fn new(
        config: CaptureTaskConfig,
        negotiator: TransportNegotiator,
        controller: RecordingController,
    ) -> Self {
        Self {
            config,
            negotiator,
            controller,
        }
    }

    pub fn negotiator(&self) -> &TransportNegotiator {
        &self.negotiator
    }

    pub fn controller(&self) -> &RecordingController {
        &self.controller
    }

    fn task_id(&self) -> &str {
        &self.controller.config().task_id
    }

    /// Harvest local candidates and return the description to send to the conference
    pub fn prepare(&self) -> Result<LocalDescription, Error> {
        self.negotiator.harvest_local_candidates()?;

        Ok(self.negotiator.local_description())
    }

    /// Apply the remote description, negotiate the transports and start recording on them
    pub async fn start(
        &self,
        remote: &PerMedia<Option<RemoteDescription>>,
        formats: &[DynamicPayloadType],
    ) -> Result<(), Error> {
        let accepted = self.negotiator.apply_remote_description(remote)?;

        log::info!("[{}] accepted {accepted} remote candidates", self.task_id());

        self.negotiator.start_establishment()?;

        match self
            .negotiator
            .await_established(self.config.establish_timeout)
            .await
        {
            Ok(state) => log::info!("[{}] transport negotiation {state}", self.task_id()),
            // Pairs may already be selected while checks are still running
            Err(ice::Error::Timeout(timeout)) => log::warn!(
                "[{}] transport negotiation still running after {timeout:?}",
                self.task_id()
            ),
            Err(e) => return Err(e.into()),
        }

        let (audio_connector, audio_target) = self.transport(MediaType::Audio).await?;
        let (video_connector, video_target) = self.transport(MediaType::Video).await?;

        self.controller.start(
            formats,
            PerMedia::new(audio_connector, video_connector),
            PerMedia::new(audio_target, video_target),
        )
    }

    async fn transport(&self, media_type: MediaType) -> Result<(Connector, RemoteTarget), Error> {
        let timeout = self.config.selected_pair_timeout;

        let connector = self.negotiator.connector(media_type, timeout).await?;
        let target = self.negotiator.remote_target(media_type, timeout).await?;

        log::debug!(
            "[{}] {media_type} transport to {} / {}",
            self.task_id(),
            target.data,
            target.control
        );

        Ok((connector, target))
    }

    /// Stop recording and reception, then release the transports
    pub fn stop(&self) -> TeardownReport {
        let report = self.controller.stop();

        self.negotiator.dispose();

        report
    }
}
