//! # Audio Decoder Module
//!
//! Whole-track decoding using the Symphonia pure-Rust audio library.
//!
//! ## Supported Formats
//!
//! | Format | Codec | Feature Flag | License |
//! |--------|-------|--------------|---------|
//! | MP3 | MPEG-1/2 Audio Layer III | `decoder-mp3` | Patents expired |
//! | FLAC | Free Lossless Audio Codec | `decoder-flac` | BSD-3 |
//! | Vorbis | Ogg Vorbis | `decoder-vorbis` | BSD-3 |
//! | Opus | Opus in Ogg | `decoder-opus` | BSD-3 |
//! | AAC | Advanced Audio Coding | `decoder-aac` | Patent-encumbered |
//! | WAV | Waveform Audio | `decoder-wav` | Public domain |
//! | ALAC | Apple Lossless | `decoder-alac` | Apache 2.0 |
//!
//! ## Pipeline
//!
//! ```text
//! Bytes → MediaSourceStream → FormatReader → Decoder → planar f32 → PcmBuffer
//! ```
//!
//! Corrupt packets are skipped; after `MAX_CONSECUTIVE_ERRORS` in a row the
//! stream is rejected as `CorruptedStream`.

#[cfg(feature = "core-decoder")]
mod format_detector;

#[cfg(feature = "core-decoder")]
mod sample_converter;

#[cfg(feature = "core-decoder")]
mod symphonia;

#[cfg(feature = "core-decoder")]
pub use self::symphonia::{SymphoniaDecoder, MAX_CONSECUTIVE_ERRORS};

#[cfg(feature = "core-decoder")]
pub use format_detector::FormatDetector;

#[cfg(feature = "core-decoder")]
pub use sample_converter::SampleConverter;

#[cfg(not(feature = "core-decoder"))]
compile_error!(
    "Audio decoder feature is not enabled. Enable one of: \
     'decoder-mp3', 'decoder-flac', 'decoder-vorbis', 'decoder-opus', \
     'decoder-aac', 'decoder-wav', 'decoder-alac', or 'decoder-all'"
);
