use ice::{MediaType, PerMedia};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// Read access to the SSRCs conference participants send with
pub trait SsrcRegistry: Send + Sync {
    /// SSRC of `target` sent by the participant which uses `ssrc` for `source`
    fn associated_ssrc(&self, ssrc: u32, source: MediaType, target: MediaType) -> Option<u32>;
}

/// Participant id to SSRC per media type, shared with the signaling layer which keeps it up to date
#[derive(Debug, Default, Clone)]
pub struct ParticipantRegistry {
    participants: Arc<RwLock<HashMap<String, PerMedia<Option<u32>>>>>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ssrc(&self, participant: &str, media_type: MediaType, ssrc: u32) {
        let mut participants = self.participants.write();

        match participants.get_mut(participant) {
            Some(ssrcs) => ssrcs[media_type] = Some(ssrc),
            None => {
                let mut ssrcs = PerMedia::default();
                ssrcs[media_type] = Some(ssrc);
                participants.insert(participant.into(), ssrcs);
            }
        }
    }

    pub fn remove(&self, participant: &str) -> Option<PerMedia<Option<u32>>> {
        self.participants.write().remove(participant)
    }

    pub fn ssrcs(&self, participant: &str) -> Option<PerMedia<Option<u32>>> {
        self.participants.read().get(participant).copied()
    }

    pub fn len(&self) -> usize {
        self.participants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.read().is_empty()
    }
}

impl SsrcRegistry for ParticipantRegistry {
    fn associated_ssrc(&self, ssrc: u32, source: MediaType, target: MediaType) -> Option<u32> {
        self.participants
            .read()
            .values()
            .find(|ssrcs| ssrcs[source] == Some(ssrc))
            .and_then(|ssrcs| ssrcs[target])
    }
}
