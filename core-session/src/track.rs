//! # Track Registry Types
//!
//! Identity, user flags and decoded metadata of the tracks in a session.

use bridge_traits::PcmBuffer;
use core_playback::TrackError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque track identity.
///
/// Generated when the track is created and never derived from the source, so
/// two tracks may share a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackKey(Uuid);

impl TrackKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TrackKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything needed to register a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub key: TrackKey,
    /// Locator of the encoded audio; `None` for recorded tracks.
    pub source: Option<String>,
}

impl TrackDescriptor {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            key: TrackKey::new(),
            source: Some(source.into()),
        }
    }

    /// A track whose audio is supplied later by a recorder.
    pub fn recording() -> Self {
        Self {
            key: TrackKey::new(),
            source: None,
        }
    }
}

/// A registered track and its user-facing flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub key: TrackKey,
    pub source: Option<String>,
    pub mute: bool,
    pub solo: bool,
    /// Reached its natural end during the current run.
    pub complete: bool,
}

impl From<TrackDescriptor> for Track {
    fn from(descriptor: TrackDescriptor) -> Self {
        Self {
            key: descriptor.key,
            source: descriptor.source,
            mute: false,
            solo: false,
            complete: false,
        }
    }
}

/// Decoded audio and derived facts for one track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackMeta {
    /// Shared read-only with the waveform reducer and the playback node.
    pub buffer: Option<Arc<PcmBuffer>>,
    /// Frames per channel.
    pub length: usize,
    /// Seconds.
    pub duration: f64,
    pub sample_rate: u32,
    pub number_of_channels: usize,
    /// Normalized display envelope.
    pub rms: Vec<f32>,
    /// Reference length `rms` was computed against.
    pub rms_reference: Option<usize>,
    pub fetching: bool,
    pub error: Option<TrackError>,
}

impl TrackMeta {
    /// Fetch/decode in flight.
    pub fn loading() -> Self {
        Self {
            fetching: true,
            ..Self::default()
        }
    }

    /// Registered but without audio yet (recording tracks).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_buffer(buffer: Arc<PcmBuffer>) -> Self {
        Self {
            length: buffer.length(),
            duration: buffer.duration_secs(),
            sample_rate: buffer.sample_rate(),
            number_of_channels: buffer.number_of_channels(),
            buffer: Some(buffer),
            ..Self::default()
        }
    }

    pub fn failed(error: TrackError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: TrackError) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach an envelope computed against `reference` frames.
    pub fn with_rms(mut self, rms: Vec<f32>, reference: usize) -> Self {
        self.rms = rms;
        self.rms_reference = Some(reference);
        self
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn needs_waveform(&self, reference: usize) -> bool {
        self.has_buffer() && self.rms_reference != Some(reference)
    }
}

/// Error shown to the user, optionally scoped to a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionErrorInfo {
    pub track: Option<TrackKey>,
    pub error: TrackError,
}

impl SessionErrorInfo {
    pub fn for_track(track: TrackKey, error: TrackError) -> Self {
        Self {
            track: Some(track),
            error,
        }
    }
}

impl fmt::Display for SessionErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.track {
            Some(track) => write!(f, "track {}: {}", track, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_playback::ErrorKind;

    #[test]
    fn keys_are_unique_per_track() {
        let a = TrackDescriptor::from_source("drums.wav");
        let b = TrackDescriptor::from_source("drums.wav");
        assert_eq!(a.source, b.source);
        assert_ne!(a.key, b.key);
    }

    #[test]
    fn meta_constructors() {
        let loading = TrackMeta::loading();
        assert!(loading.fetching);
        assert!(!loading.has_buffer());

        let buffer = Arc::new(PcmBuffer::silent(2, 44100 * 2, 44100));
        let meta = TrackMeta::from_buffer(buffer);
        assert!(!meta.fetching);
        assert_eq!(meta.length, 88200);
        assert_eq!(meta.number_of_channels, 2);
        assert!((meta.duration - 2.0).abs() < 1e-9);
        assert!(meta.rms.is_empty());
        assert!(meta.needs_waveform(88200));

        let meta = meta.with_rms(vec![0.0; 4], 88200);
        assert!(!meta.needs_waveform(88200));
        assert!(meta.needs_waveform(100000));

        let failed = TrackMeta::failed(TrackError::new(ErrorKind::Fetch, "404"));
        assert!(!failed.fetching);
        assert!(!failed.needs_waveform(1));
    }

    #[test]
    fn key_serializes_as_plain_uuid() {
        let key = TrackKey::new();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key));
    }

    #[test]
    fn error_info_display() {
        let key = TrackKey::new();
        let info = SessionErrorInfo::for_track(key, TrackError::new(ErrorKind::Decode, "bad header"));
        assert_eq!(info.to_string(), format!("track {}: decode error: bad header", key));
    }
}
