//! # Session Error Types

use crate::track::TrackKey;
use bridge_traits::BridgeError;
use core_playback::PlaybackError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error("Invalid playback configuration: {0}")]
    Config(String),

    /// Loading audio requires an activated session.
    #[error("Session is not activated")]
    NotActivated,

    #[error("Unknown track: {0}")]
    UnknownTrack(TrackKey),

    /// The source set changed while the operation was in flight.
    #[error("Superseded by source generation {0}")]
    Superseded(u64),
}

pub type Result<T> = std::result::Result<T, SessionError>;
