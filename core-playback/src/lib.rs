//! # Playback Core
//!
//! Decoding, waveform reduction and the per-track playback graph.
//!
//! ## Overview
//!
//! This crate handles:
//! - Whole-track decoding into planar PCM using symphonia (feature-gated per codec)
//! - RMS waveform envelopes for track visualization
//! - The per-track playback node (output, gain ramp, transport state machine)
//! - A clock-driven virtual output device for headless sessions and tests
//!
//! Session-level concerns (track registry, mute/solo, transport fan-out) live
//! in `core-session`.

pub mod config;
pub mod decoder;
pub mod error;
pub mod node;
pub mod output;
pub mod traits;
pub mod waveform;

pub use config::PlaybackConfig;
pub use decoder::{FormatDetector, SampleConverter, SymphoniaDecoder, MAX_CONSECUTIVE_ERRORS};
pub use error::{ErrorKind, PlaybackError, Result, TrackError};
pub use node::{NodeCommand, NodeSignal, NodeState, PlaybackNode, SignalHandler, Transition};
pub use output::{DeviceFault, GainRamp, ManualClock, VirtualDevice, VirtualOutput};
pub use traits::{AudioCodec, AudioDecoder, AudioFormat, DecodedAudio};
