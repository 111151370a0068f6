use crate::{
    Error,
    correlator::SpeakerCorrelator,
    event::EventHandler,
    event_log::{JsonEventLog, available_path},
    media::{
        Direction, DynamicPayloadType, FormatTable, KeyExchange, MediaEngine, MediaError,
        PipelineBinding, ReceivePipeline, Recorder, Relay,
    },
    registry::SsrcRegistry,
};
use ice::{Connector, MediaType, PerMedia, RemoteTarget};
use parking_lot::Mutex;
use std::{fmt, path::PathBuf, sync::Arc};

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Name of the capture task, included in every log line
    pub task_id: String,
    /// Directory all capture artifacts of the task are written to
    pub storage_root: PathBuf,
    /// Name of the event log inside the storage root
    pub metadata_filename: String,
    /// Fail [`RecordingController::start`] if the event log cannot be created.
    ///
    /// When unset recording continues without persisting any events.
    pub require_event_log: bool,
}

impl RecorderConfig {
    pub fn new(task_id: impl Into<String>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            task_id: task_id.into(),
            storage_root: storage_root.into(),
            metadata_filename: "metadata.json".into(),
            require_event_log: false,
        }
    }
}

/// Lifecycle of a [`RecordingController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    New,
    /// Pipelines are being bound and attached to their relays, or start failed before reception was active
    Prepared,
    Receiving,
    Recording,
    Stopped,
}

/// Resource released during teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Recorder,
    Pipeline,
    Relay,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Recorder => "recorder",
            Resource::Pipeline => "pipeline",
            Resource::Relay => "relay",
        };

        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownError {
    pub media_type: MediaType,
    pub resource: Resource,
    pub error: MediaError,
}

/// Errors encountered by [`RecordingController::stop`], which never aborts on them
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub errors: Vec<TeardownError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(
        &mut self,
        task_id: &str,
        media_type: MediaType,
        resource: Resource,
        result: Result<(), MediaError>,
    ) {
        if let Err(error) = result {
            log::warn!("[{task_id}] failed to stop {media_type} {resource}: {error}");

            self.errors.push(TeardownError {
                media_type,
                resource,
                error,
            });
        }
    }
}

struct RecorderSlot {
    inner: Box<dyn Recorder>,
    recording: bool,
}

struct Inner {
    state: ControllerState,
    receiving: bool,
    recording: bool,

    pipelines: PerMedia<Option<Box<dyn ReceivePipeline>>>,
    relays: PerMedia<Option<Arc<dyn Relay>>>,
    recorders: PerMedia<Option<RecorderSlot>>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

/// Sequences reception and recording of all media types of a capture task
///
/// Every resource that is created is tracked per media type until [`stop`](Self::stop) releases it, no matter
/// where [`start`](Self::start) failed. Start and stop are serialized.
pub struct RecordingController {
    config: RecorderConfig,
    engine: Arc<dyn MediaEngine>,
    registry: Arc<dyn SsrcRegistry>,
    local_ssrcs: PerMedia<u32>,
    inner: Mutex<Inner>,
}

impl RecordingController {
    /// Create the receive-only pipeline of every media type, using the given key exchanges
    pub fn new(
        config: RecorderConfig,
        engine: Arc<dyn MediaEngine>,
        registry: Arc<dyn SsrcRegistry>,
        key_exchanges: PerMedia<Box<dyn KeyExchange>>,
    ) -> Result<Self, Error> {
        let mut pipelines = PerMedia::<Option<Box<dyn ReceivePipeline>>>::default();
        let mut local_ssrcs = PerMedia::default();

        let PerMedia { audio, video } = key_exchanges;

        for (media_type, key_exchange) in [(MediaType::Audio, audio), (MediaType::Video, video)] {
            let pipeline = engine.create_pipeline(
                media_type,
                media_type.as_str(),
                Direction::RecvOnly,
                key_exchange,
            )?;

            local_ssrcs[media_type] = pipeline.local_ssrc();

            log::debug!(
                "[{}] created {media_type} pipeline with local SSRC {}",
                config.task_id,
                local_ssrcs[media_type]
            );

            pipelines[media_type] = Some(pipeline);
        }

        Ok(Self {
            config,
            engine,
            registry,
            local_ssrcs,
            inner: Mutex::new(Inner {
                state: ControllerState::New,
                receiving: false,
                recording: false,
                pipelines,
                relays: PerMedia::default(),
                recorders: PerMedia::default(),
                event_handler: None,
            }),
        })
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// SSRCs the pipelines use locally, to be announced over signaling
    pub fn local_ssrcs(&self) -> PerMedia<u32> {
        self.local_ssrcs
    }

    pub fn state(&self) -> ControllerState {
        self.inner.lock().state
    }

    pub fn is_receiving(&self) -> bool {
        self.inner.lock().receiving
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().recording
    }

    /// Bind the pipelines to the negotiated transports, start receiving and start recording.
    ///
    /// If reception does not start for every media type this fails with [`Error::PartialStart`] and the already
    /// started pipelines keep running until [`stop`](Self::stop) is called.
    ///
    /// Once a start has failed before reception was active, every further start fails with [`Error::Aborted`].
    /// Such a controller can only be stopped.
    pub fn start(
        &self,
        formats: &[DynamicPayloadType],
        connectors: PerMedia<Connector>,
        targets: PerMedia<RemoteTarget>,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        match inner.state {
            ControllerState::New => {}
            ControllerState::Prepared => return Err(Error::Aborted),
            ControllerState::Receiving => return Err(Error::DoubleStart("reception")),
            ControllerState::Recording => return Err(Error::DoubleStart("recording")),
            ControllerState::Stopped => return Err(Error::Stopped),
        }

        self.prepare(&mut inner, formats, connectors, targets)?;
        self.start_receiving(&mut inner)?;
        self.prepare_recorders(&mut inner)?;
        self.start_recording(&mut inner)?;

        Ok(())
    }

    fn prepare(
        &self,
        inner: &mut Inner,
        formats: &[DynamicPayloadType],
        connectors: PerMedia<Connector>,
        targets: PerMedia<RemoteTarget>,
    ) -> Result<(), Error> {
        log::info!("[{}] preparing receive pipelines", self.config.task_id);

        inner.state = ControllerState::Prepared;

        for (media_type, pipeline) in inner.pipelines.iter_mut() {
            let Some(pipeline) = pipeline else {
                continue;
            };

            pipeline.bind(PipelineBinding {
                connector: connectors[media_type].clone(),
                target: targets[media_type],
                formats: FormatTable::for_media(media_type, formats),
            })?;
        }

        for (media_type, pipeline) in inner.pipelines.iter_mut() {
            let Some(pipeline) = pipeline else {
                continue;
            };

            let relay = self.relay(&mut inner.relays, media_type)?;
            pipeline.attach_relay(relay)?;
        }

        Ok(())
    }

    /// Returns the relay of `media_type`, creating it on first use
    fn relay(
        &self,
        relays: &mut PerMedia<Option<Arc<dyn Relay>>>,
        media_type: MediaType,
    ) -> Result<Arc<dyn Relay>, Error> {
        if let Some(relay) = &relays[media_type] {
            return Ok(relay.clone());
        }

        let relay = self.engine.create_relay(media_type)?;
        relays[media_type] = Some(relay.clone());

        Ok(relay)
    }

    fn start_receiving(&self, inner: &mut Inner) -> Result<(), Error> {
        let task_id = &self.config.task_id;

        log::info!("[{task_id}] starting reception");

        let expected = MediaType::ALL.len();
        let mut started = 0;

        for (media_type, pipeline) in inner.pipelines.iter_mut() {
            let Some(pipeline) = pipeline else {
                continue;
            };

            if let Err(e) = pipeline.start_key_exchange() {
                log::warn!("[{task_id}] failed to start {media_type} key exchange: {e}");
                continue;
            }

            if let Err(e) = pipeline.start() {
                log::warn!("[{task_id}] failed to start {media_type} pipeline: {e}");
                continue;
            }

            if pipeline.is_started() {
                started += 1;
            }
        }

        if started != expected {
            return Err(Error::PartialStart { started, expected });
        }

        inner.receiving = true;
        inner.state = ControllerState::Receiving;

        Ok(())
    }

    fn prepare_recorders(&self, inner: &mut Inner) -> Result<(), Error> {
        log::info!("[{}] preparing recorders", self.config.task_id);

        for (media_type, relay) in inner.relays.iter() {
            let Some(relay) = relay else {
                continue;
            };

            let recorder = self.engine.create_recorder(media_type, relay.clone())?;

            inner.recorders[media_type] = Some(RecorderSlot {
                inner: recorder,
                recording: false,
            });
        }

        Ok(())
    }

    fn start_recording(&self, inner: &mut Inner) -> Result<(), Error> {
        log::info!("[{}] starting recording", self.config.task_id);

        if !inner.receiving {
            return Err(Error::NotReceiving);
        }

        if inner.recording {
            return Err(Error::DoubleStart("recording"));
        }

        let handler: Arc<dyn EventHandler> = Arc::new(SpeakerCorrelator::new(
            self.config.task_id.clone(),
            self.registry.clone(),
            self.open_event_log()?,
        ));

        inner.event_handler = Some(handler.clone());

        for (media_type, slot) in inner.recorders.iter_mut() {
            let Some(slot) = slot else {
                continue;
            };

            slot.inner.set_event_handler(handler.clone());
            slot.inner
                .start(media_type.as_str(), &self.config.storage_root)?;
            slot.recording = true;
        }

        inner.recording = true;
        inner.state = ControllerState::Recording;

        Ok(())
    }

    fn open_event_log(&self) -> Result<Option<Box<dyn EventHandler>>, Error> {
        let path = available_path(&self.config.storage_root, &self.config.metadata_filename);

        match JsonEventLog::create(path.clone()) {
            Ok(log) => {
                log::info!(
                    "[{}] writing events to {}",
                    self.config.task_id,
                    path.display()
                );
                Ok(Some(Box::new(log)))
            }
            Err(e) if self.config.require_event_log => Err(Error::EventLog(e)),
            Err(e) => {
                log::error!(
                    "[{}] failed to create event log {}, events will not be persisted: {e}",
                    self.config.task_id,
                    path.display()
                );
                Ok(None)
            }
        }
    }

    /// Stop all recorders, then all pipelines, then dispose all relays.
    ///
    /// Errors of individual resources are logged and collected, teardown always visits every resource. Calling
    /// this before [`start`](Self::start) or more than once has no effect.
    pub fn stop(&self) -> TeardownReport {
        let task_id = &self.config.task_id;

        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let mut report = TeardownReport::default();
        let mut released = false;

        if inner.recorders.iter().any(|(_, slot)| slot.is_some()) {
            log::info!("[{task_id}] stopping recorders");

            for (media_type, slot) in inner.recorders.iter_mut() {
                let Some(mut slot) = slot.take() else {
                    continue;
                };

                if slot.recording {
                    report.record(task_id, media_type, Resource::Recorder, slot.inner.stop());
                }
            }

            released = true;
        }

        if let Some(handler) = inner.event_handler.take() {
            handler.close();
        }

        inner.recording = false;

        // Pipelines exist from construction but are only touched by start
        if inner.state != ControllerState::New
            && inner.pipelines.iter().any(|(_, p)| p.is_some())
        {
            log::info!("[{task_id}] stopping reception");

            for (media_type, pipeline) in inner.pipelines.iter_mut() {
                let Some(mut pipeline) = pipeline.take() else {
                    continue;
                };

                report.record(task_id, media_type, Resource::Pipeline, pipeline.close());
                report.record(task_id, media_type, Resource::Pipeline, pipeline.stop());
            }

            released = true;
        }

        inner.receiving = false;

        if inner.relays.iter().any(|(_, relay)| relay.is_some()) {
            log::info!("[{task_id}] disposing relays");

            for (media_type, relay) in inner.relays.iter_mut() {
                if let Some(relay) = relay.take() {
                    report.record(task_id, media_type, Resource::Relay, relay.dispose());
                }
            }

            released = true;
        }

        if released {
            inner.state = ControllerState::Stopped;
            log::info!("[{task_id}] stopped with {} errors", report.errors.len());
        }

        report
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        let report = self.stop();

        if !report.is_clean() {
            log::warn!(
                "[{}] dropped recording controller with {} teardown errors",
                self.config.task_id,
                report.errors.len()
            );
        }
    }
}
