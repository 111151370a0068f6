use serde::{Deserialize, Serialize};
use std::{
    fmt,
    ops::{Index, IndexMut},
    str::FromStr,
};

/// Kind of media captured by a task. Only audio and video are ever negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
}

impl MediaType {
    /// All media types in the order they are processed
    pub const ALL: [MediaType; 2] = [MediaType::Audio, MediaType::Video];

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unsupported media type {0:?}")]
pub struct UnsupportedMediaType(pub String);

impl FromStr for MediaType {
    type Err = UnsupportedMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("audio") {
            Ok(MediaType::Audio)
        } else if s.eq_ignore_ascii_case("video") {
            Ok(MediaType::Video)
        } else {
            Err(UnsupportedMediaType(s.into()))
        }
    }
}

/// One value per [`MediaType`]
///
/// Replaces `MediaType` keyed maps, there is always exactly one slot for audio and one for video.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PerMedia<T> {
    pub audio: T,
    pub video: T,
}

impl<T> PerMedia<T> {
    pub fn new(audio: T, video: T) -> Self {
        Self { audio, video }
    }

    pub fn from_fn(mut f: impl FnMut(MediaType) -> T) -> Self {
        Self {
            audio: f(MediaType::Audio),
            video: f(MediaType::Video),
        }
    }

    pub fn map<U>(self, mut f: impl FnMut(MediaType, T) -> U) -> PerMedia<U> {
        PerMedia {
            audio: f(MediaType::Audio, self.audio),
            video: f(MediaType::Video, self.video),
        }
    }

    pub fn as_ref(&self) -> PerMedia<&T> {
        PerMedia {
            audio: &self.audio,
            video: &self.video,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MediaType, &T)> {
        [(MediaType::Audio, &self.audio), (MediaType::Video, &self.video)].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MediaType, &mut T)> {
        [
            (MediaType::Audio, &mut self.audio),
            (MediaType::Video, &mut self.video),
        ]
        .into_iter()
    }
}

impl<T> PerMedia<Option<T>> {
    /// Returns `Some` only if both media types have a value
    pub fn transpose(self) -> Option<PerMedia<T>> {
        Some(PerMedia {
            audio: self.audio?,
            video: self.video?,
        })
    }
}

impl<T> Index<MediaType> for PerMedia<T> {
    type Output = T;

    fn index(&self, media_type: MediaType) -> &T {
        match media_type {
            MediaType::Audio => &self.audio,
            MediaType::Video => &self.video,
        }
    }
}

impl<T> IndexMut<MediaType> for PerMedia<T> {
    fn index_mut(&mut self, media_type: MediaType) -> &mut T {
        match media_type {
            MediaType::Audio => &mut self.audio,
            MediaType::Video => &mut self.video,
        }
    }
}
