//! Playback bridge traits and supporting audio types.
//!
//! These abstractions let the engine drive a platform audio pipeline without
//! knowing how it renders. The host opens one [`AudioOutput`] per decoded
//! track buffer; the engine then issues transport commands and gain ramps
//! and listens for the device's `TimeUpdate` / `Ended` callbacks.

use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Decoded PCM audio, planar `f32` samples normalized to `[-1.0, 1.0]`.
///
/// Every channel holds exactly [`length`](Self::length) frames. The buffer is
/// immutable once built and is shared read-only (`Arc<PcmBuffer>`) between
/// the waveform reducer and the playback output.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// Channels shorter than the longest one are padded with silence so all
    /// planes share one frame count.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for plane in channels.iter_mut() {
            plane.resize(frames, 0.0);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// A buffer of `frames` zero samples on each of `channels` planes.
    pub fn silent(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            sample_rate,
        }
    }

    /// Number of frames (samples per channel).
    pub fn length(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Playback duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.length() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }
}

/// Notifications raised by an output device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    /// Periodic playback position report while playing.
    TimeUpdate(Duration),
    /// Playback reached the natural end of the buffer.
    Ended,
}

/// Callback registered on an [`AudioOutput`].
///
/// Outputs must never invoke listeners while holding their own internal
/// locks, since listeners call back into engine state.
pub type OutputListener = Box<dyn Fn(OutputEvent) + Send + Sync>;

/// One decoded buffer bound to the platform output.
///
/// Control methods are expected to be fast and non-blocking; they are called
/// synchronously while the engine fans a transport command out to every
/// track.
pub trait AudioOutput: Send + Sync {
    /// Start or resume output from the current position.
    fn play(&self) -> Result<()>;

    /// Halt output, keeping the current position.
    fn pause(&self) -> Result<()>;

    /// Move the playback position. Does not change play/pause state.
    fn seek(&self, position: Duration) -> Result<()>;

    /// Current playback position.
    fn position(&self) -> Duration;

    fn is_playing(&self) -> bool;

    /// Linearly ramp the output gain from its current value to `target`
    /// over `over`. Implementations must not step the gain discontinuously.
    fn ramp_gain(&self, target: f32, over: Duration) -> Result<()>;

    /// Current (possibly mid-ramp) gain.
    fn gain(&self) -> f32;

    /// Register a device callback for [`OutputEvent`]s.
    fn subscribe(&self, listener: OutputListener);
}

/// Factory for [`AudioOutput`]s, owned by the host.
///
/// # Errors
///
/// `open` fails with [`BridgeError::Device`](crate::BridgeError::Device) or
/// [`BridgeError::PermissionDenied`](crate::BridgeError::PermissionDenied)
/// when the device cannot be used. The engine treats those as a degraded
/// track, never as a fatal session error.
pub trait AudioDevice: Send + Sync {
    fn open(&self, buffer: Arc<PcmBuffer>) -> Result<Box<dyn AudioOutput>>;
}
