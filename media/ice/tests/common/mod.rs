#![allow(dead_code)]

use confrec_ice::{
    CandidateDescription, CandidateKind, Checklist, ComponentId, EngineError, MediaType,
    NegotiationEngine, NegotiatorConfig, PerMedia, RemoteDescription,
};
use std::{
    net::{IpAddr, Ipv4Addr},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

pub(crate) fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn config() -> NegotiatorConfig {
    NegotiatorConfig {
        task_id: "test".into(),
        local_ips: Some(vec![Ipv4Addr::LOCALHOST.into()]),
        pair_poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Outcome {
    Complete,
    Fail,
    Hang,
}

/// Engine which selects the highest priority pair of every component without sending a single packet
pub(crate) struct ScriptedEngine {
    select: &'static [ComponentId],
    outcome: Outcome,
    pub(crate) freed: AtomicUsize,
}

impl ScriptedEngine {
    pub(crate) fn new(select: bool, outcome: Outcome) -> Self {
        let components: &'static [ComponentId] = if select { &ComponentId::ALL } else { &[] };

        Self::selecting(components, outcome)
    }

    /// Only select pairs for the given components
    pub(crate) fn selecting(components: &'static [ComponentId], outcome: Outcome) -> Self {
        Self {
            select: components,
            outcome,
            freed: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl NegotiationEngine for ScriptedEngine {
    async fn establish(&self, checklist: Checklist) -> Result<(), EngineError> {
        if !self.select.is_empty() {
            for media_type in MediaType::ALL {
                if checklist.remote_credentials(media_type).is_none() {
                    return Err(EngineError::new("remote credentials missing"));
                }

                let pairs = checklist.pairs(media_type);

                for &component in self.select {
                    let usable = pairs.iter().find(|p| {
                        p.component == component
                            && checklist
                                .socket(media_type, component, p.local.address.addr)
                                .is_some()
                    });

                    if let Some(pair) = usable {
                        checklist.select_pair(
                            media_type,
                            component,
                            pair.local.address.addr,
                            pair.remote.address.addr,
                        );
                    }
                }
            }
        }

        match self.outcome {
            Outcome::Complete => Ok(()),
            Outcome::Fail => Err(EngineError::new("all candidate pairs failed")),
            Outcome::Hang => std::future::pending().await,
        }
    }

    fn free(&self) {
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) fn candidate(
    component: u32,
    kind: CandidateKind,
    ip: &str,
    port: u16,
    related: Option<(&str, u16)>,
) -> CandidateDescription {
    CandidateDescription {
        id: format!("{ip}:{port}"),
        component,
        foundation: "1".into(),
        generation: 0,
        network: 1,
        ip: ip.parse::<IpAddr>().unwrap(),
        port,
        priority: 1000,
        protocol: "udp".into(),
        kind,
        rel_addr: related.map(|(ip, _)| ip.parse().unwrap()),
        rel_port: related.map(|(_, port)| port),
    }
}

/// Host candidates on localhost for both components of both media types
pub(crate) fn remote_hosts(base_port: u16) -> PerMedia<Option<RemoteDescription>> {
    PerMedia::from_fn(|media_type| {
        let port = match media_type {
            MediaType::Audio => base_port,
            MediaType::Video => base_port + 10,
        };

        Some(RemoteDescription {
            ufrag: Some("remote".into()),
            password: Some("remotepassword".into()),
            candidates: vec![
                candidate(1, CandidateKind::Host, "127.0.0.1", port, None),
                candidate(2, CandidateKind::Host, "127.0.0.1", port + 1, None),
            ],
        })
    })
}
