#![allow(dead_code)]

use confrec_recorder::{
    Direction, EventHandler, KeyExchange, MediaEngine, MediaError, PipelineBinding,
    ReceivePipeline, Recorder, RecorderConfig, RecordingController, Relay, SsrcRegistry,
};
use ice::{
    Checklist, ComponentId, Connector, EngineError, MediaType, NegotiationEngine, PerMedia,
    RemoteTarget,
};
use parking_lot::Mutex;
use std::{
    net::UdpSocket,
    path::{Path, PathBuf},
    sync::Arc,
};

pub(crate) fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Everything the fake media engine was asked to do, in order
#[derive(Debug, Default, Clone)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, media_type: MediaType, entry: &str) {
        self.0.lock().push(format!("{media_type} {entry}"));
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub(crate) fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry:?} not in journal"))
    }

    pub(crate) fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// Media type of the resource which fails the named step
#[derive(Debug, Default, Clone)]
pub(crate) struct Failures {
    pub(crate) bind: Option<MediaType>,
    pub(crate) attach: Option<MediaType>,
    pub(crate) create_recorder: Option<MediaType>,
    pub(crate) key_exchange: Option<MediaType>,
    pub(crate) pipeline_start: Option<MediaType>,
    pub(crate) pipeline_close: Option<MediaType>,
    pub(crate) recorder_stop: Option<MediaType>,
    pub(crate) relay_dispose: Option<MediaType>,
}

fn fail(on: Option<MediaType>, media_type: MediaType, what: &str) -> Result<(), MediaError> {
    if on == Some(media_type) {
        Err(MediaError::new(format!("{media_type} {what} failed")))
    } else {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeMediaEngine {
    pub(crate) journal: Journal,
    pub(crate) failures: Failures,
    pub(crate) handlers: Arc<Mutex<Vec<Arc<dyn EventHandler>>>>,
    pub(crate) bindings: Arc<Mutex<Vec<(MediaType, PipelineBinding)>>>,
    pub(crate) recorder_dirs: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl FakeMediaEngine {
    pub(crate) fn failing(failures: Failures) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }
}

struct FakeKeyExchange {
    journal: Journal,
    fail_on: Option<MediaType>,
}

impl KeyExchange for FakeKeyExchange {
    fn start(&mut self, media_type: MediaType) -> Result<(), MediaError> {
        self.journal.push(media_type, "key exchange");
        fail(self.fail_on, media_type, "key exchange")
    }
}

pub(crate) fn key_exchanges(engine: &FakeMediaEngine) -> PerMedia<Box<dyn KeyExchange>> {
    PerMedia::from_fn(|_| {
        Box::new(FakeKeyExchange {
            journal: engine.journal.clone(),
            fail_on: engine.failures.key_exchange,
        }) as Box<dyn KeyExchange>
    })
}

struct FakePipeline {
    media_type: MediaType,
    journal: Journal,
    failures: Failures,
    key_exchange: Box<dyn KeyExchange>,
    bindings: Arc<Mutex<Vec<(MediaType, PipelineBinding)>>>,
    started: bool,
}

impl ReceivePipeline for FakePipeline {
    fn local_ssrc(&self) -> u32 {
        match self.media_type {
            MediaType::Audio => 1000,
            MediaType::Video => 2000,
        }
    }

    fn bind(&mut self, binding: PipelineBinding) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "pipeline bind");
        fail(self.failures.bind, self.media_type, "bind")?;
        self.bindings.lock().push((self.media_type, binding));
        Ok(())
    }

    fn attach_relay(&mut self, _relay: Arc<dyn Relay>) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "pipeline attach");
        fail(self.failures.attach, self.media_type, "attach")
    }

    fn start_key_exchange(&mut self) -> Result<(), MediaError> {
        self.key_exchange.start(self.media_type)
    }

    fn start(&mut self) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "pipeline start");
        fail(self.failures.pipeline_start, self.media_type, "start")?;
        self.started = true;
        Ok(())
    }

    fn is_started(&self) -> bool {
        self.started
    }

    fn close(&mut self) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "pipeline close");
        fail(self.failures.pipeline_close, self.media_type, "close")
    }

    fn stop(&mut self) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "pipeline stop");
        self.started = false;
        Ok(())
    }
}

struct FakeRelay {
    media_type: MediaType,
    journal: Journal,
    fail_on: Option<MediaType>,
}

impl Relay for FakeRelay {
    fn dispose(&self) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "relay dispose");
        fail(self.fail_on, self.media_type, "dispose")
    }
}

struct FakeRecorder {
    media_type: MediaType,
    journal: Journal,
    fail_on: Option<MediaType>,
    handlers: Arc<Mutex<Vec<Arc<dyn EventHandler>>>>,
    recorder_dirs: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl Recorder for FakeRecorder {
    fn set_event_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.lock().push(handler);
    }

    fn start(&mut self, name: &str, directory: &Path) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "recorder start");
        self.recorder_dirs
            .lock()
            .push((name.into(), directory.to_path_buf()));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MediaError> {
        self.journal.push(self.media_type, "recorder stop");
        fail(self.fail_on, self.media_type, "recorder stop")
    }
}

impl MediaEngine for FakeMediaEngine {
    fn create_pipeline(
        &self,
        media_type: MediaType,
        name: &str,
        direction: Direction,
        key_exchange: Box<dyn KeyExchange>,
    ) -> Result<Box<dyn ReceivePipeline>, MediaError> {
        self.journal
            .push(media_type, &format!("pipeline create {name} {direction}"));

        Ok(Box::new(FakePipeline {
            media_type,
            journal: self.journal.clone(),
            failures: self.failures.clone(),
            key_exchange,
            bindings: self.bindings.clone(),
            started: false,
        }))
    }

    fn create_relay(&self, media_type: MediaType) -> Result<Arc<dyn Relay>, MediaError> {
        self.journal.push(media_type, "relay create");

        Ok(Arc::new(FakeRelay {
            media_type,
            journal: self.journal.clone(),
            fail_on: self.failures.relay_dispose,
        }))
    }

    fn create_recorder(
        &self,
        media_type: MediaType,
        _relay: Arc<dyn Relay>,
    ) -> Result<Box<dyn Recorder>, MediaError> {
        self.journal.push(media_type, "recorder create");
        fail(self.failures.create_recorder, media_type, "recorder create")?;

        Ok(Box::new(FakeRecorder {
            media_type,
            journal: self.journal.clone(),
            fail_on: self.failures.recorder_stop,
            handlers: self.handlers.clone(),
            recorder_dirs: self.recorder_dirs.clone(),
        }))
    }
}

pub(crate) fn controller(
    storage_root: &Path,
    engine: &Arc<FakeMediaEngine>,
    registry: Arc<dyn SsrcRegistry>,
) -> RecordingController {
    init_log();

    RecordingController::new(
        RecorderConfig::new("test", storage_root),
        engine.clone(),
        registry,
        key_exchanges(engine),
    )
    .unwrap()
}

pub(crate) fn connectors() -> PerMedia<Connector> {
    PerMedia::from_fn(|_| {
        let data = UdpSocket::bind("127.0.0.1:0").unwrap();
        let control = UdpSocket::bind("127.0.0.1:0").unwrap();

        Connector::new(Arc::new(data), Arc::new(control))
    })
}

pub(crate) fn targets() -> PerMedia<RemoteTarget> {
    PerMedia::new(
        RemoteTarget {
            data: "127.0.0.1:4000".parse().unwrap(),
            control: "127.0.0.1:4001".parse().unwrap(),
        },
        RemoteTarget {
            data: "127.0.0.1:4010".parse().unwrap(),
            control: "127.0.0.1:4011".parse().unwrap(),
        },
    )
}

/// Negotiation engine which selects the best pair of every component and completes
pub(crate) struct SelectingEngine;

#[async_trait::async_trait]
impl NegotiationEngine for SelectingEngine {
    async fn establish(&self, checklist: Checklist) -> Result<(), EngineError> {
        for media_type in MediaType::ALL {
            let pairs = checklist.pairs(media_type);

            for component in ComponentId::ALL {
                let Some(pair) = pairs.iter().find(|p| p.component == component) else {
                    return Err(EngineError::new(format!(
                        "no {media_type} pair for component {component:?}"
                    )));
                };

                checklist.select_pair(
                    media_type,
                    component,
                    pair.local.address.addr,
                    pair.remote.address.addr,
                );
            }
        }

        Ok(())
    }
}
