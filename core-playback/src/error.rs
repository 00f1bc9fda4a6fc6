//! # Playback Error Types
//!
//! Error types for fetching, decoding and playing track audio.

use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while turning a track locator into audible output.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Raw bytes could not be fetched from the byte source.
    #[error("Failed to fetch audio source: {0}")]
    Fetch(String),

    // ========================================================================
    // Format/Codec Errors
    // ========================================================================
    /// Container format is not recognized or cannot be parsed.
    #[error("Unsupported or invalid audio format: {0}")]
    UnsupportedFormat(String),

    /// Codec is recognized but not enabled or not supported.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Too many consecutive packets failed to decode.
    #[error("Corrupted audio stream: {0}")]
    CorruptedStream(String),

    #[error("Decoder internal error: {0}")]
    DecoderError(String),

    /// The stream decoded cleanly but produced no frames.
    #[error("Audio stream contains no samples")]
    EmptyStream,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlaybackError {
    /// Coarse classification used for per-track error reporting.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::Fetch(_) | PlaybackError::Io(_) => ErrorKind::Fetch,
            PlaybackError::DeviceUnavailable(_) | PlaybackError::PermissionDenied(_) => {
                ErrorKind::Device
            }
            _ => ErrorKind::Decode,
        }
    }

    /// Returns `true` if this error is related to audio format/codec issues.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::UnsupportedFormat(_) | PlaybackError::UnsupportedCodec(_)
        )
    }

    /// Convert a byte-source failure.
    pub fn from_source(err: BridgeError) -> Self {
        PlaybackError::Fetch(err.to_string())
    }

    /// Convert an output-device failure.
    pub fn from_device(err: BridgeError) -> Self {
        match err {
            BridgeError::PermissionDenied(msg) => PlaybackError::PermissionDenied(msg),
            other => PlaybackError::DeviceUnavailable(other.to_string()),
        }
    }

    /// Cloneable summary stored in track metadata.
    pub fn to_track_error(&self) -> TrackError {
        TrackError::new(self.kind(), self.to_string())
    }
}

/// Failure category of a single track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Byte source could not deliver the encoded audio.
    Fetch,
    /// Audio data is malformed or unsupported.
    Decode,
    /// Output device unavailable or permission denied.
    Device,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Decode => "decode",
            ErrorKind::Device => "device",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A track-scoped error that can be cloned into session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TrackError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TrackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl From<&PlaybackError> for TrackError {
    fn from(err: &PlaybackError) -> Self {
        err.to_track_error()
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
