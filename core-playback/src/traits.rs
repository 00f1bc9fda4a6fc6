//! # Core Playback Traits
//!
//! Abstractions the session engine uses to turn encoded bytes into PCM.
//! Unlike the bridge traits, these are implemented inside the core; the
//! host never sees them.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use core_playback::{AudioDecoder, SymphoniaDecoder};
//! use bytes::Bytes;
//!
//! # async fn example(data: Bytes) -> core_playback::Result<()> {
//! let decoder = SymphoniaDecoder::new();
//! let decoded = decoder.decode(data, Some("stems/drums.flac")).await?;
//! println!(
//!     "{:?}: {} frames, {:.2}s",
//!     decoded.format.codec,
//!     decoded.buffer.length(),
//!     decoded.buffer.duration_secs()
//! );
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use async_trait::async_trait;
use bridge_traits::PcmBuffer;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// Audio Format Types
// ============================================================================

/// Audio codecs the decoder can recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// MPEG-1 Audio Layer 3
    Mp3,
    /// Advanced Audio Coding (AAC/M4A)
    Aac,
    Flac,
    /// Ogg Vorbis
    Vorbis,
    Opus,
    /// Uncompressed PCM (WAV/AIFF)
    Wav,
    /// Apple Lossless Audio Codec
    Alac,
    Unknown,
}

impl AudioCodec {
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioCodec::Flac | AudioCodec::Wav | AudioCodec::Alac)
    }
}

/// Source-side description of a decoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub codec: AudioCodec,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
    /// Bits per sample in the encoded stream, when the container reports it
    pub bits_per_sample: Option<u16>,
}

impl AudioFormat {
    pub fn new(
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
        bits_per_sample: Option<u16>,
    ) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
            bits_per_sample,
        }
    }
}

/// A fully decoded track.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Planar `f32` samples, one plane per channel
    pub buffer: PcmBuffer,
    pub format: AudioFormat,
}

// ============================================================================
// Core Traits
// ============================================================================

/// Converts a complete encoded payload into PCM.
///
/// Implementations must not block the async executor; CPU-heavy work belongs
/// on the blocking pool. One decoder instance is shared by every concurrent
/// track load.
///
/// ## Errors
///
/// - `UnsupportedFormat` / `UnsupportedCodec` when the data cannot be probed
///   or the codec is not enabled
/// - `CorruptedStream` / `DecoderError` when too many packets fail
/// - `EmptyStream` when decoding succeeds but yields no frames
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decode every frame of `data`.
    ///
    /// `hint` is the track locator (path or URL); its extension guides format
    /// probing but is never required.
    async fn decode(&self, data: Bytes, hint: Option<&str>) -> Result<DecodedAudio>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_losslessness() {
        assert!(AudioCodec::Flac.is_lossless());
        assert!(AudioCodec::Wav.is_lossless());
        assert!(!AudioCodec::Mp3.is_lossless());
        assert!(!AudioCodec::Unknown.is_lossless());
    }

    #[test]
    fn audio_format_new() {
        let format = AudioFormat::new(AudioCodec::Wav, 48000, 2, Some(24));
        assert_eq!(format.sample_rate, 48000);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bits_per_sample, Some(24));
    }
}
