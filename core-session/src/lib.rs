//! # Session Core
//!
//! Synchronized multitrack playback: the track registry, mute/solo
//! resolution, the transport state machine and the coordinator that drives
//! one [`PlaybackNode`](core_playback::PlaybackNode) per track.
//!
//! ## Overview
//!
//! - [`state`], [`track`]: the session value and its track types
//! - [`reducer`]: pure `transition(&SessionState, &Command) -> SessionState`
//! - [`transport`], [`mixer`]: transport rules, node fan-out and audibility
//! - [`loader`]: bounded concurrent fetch and decode
//! - [`coordinator`]: [`Session`], the single mutation path
//!
//! ## Example
//!
//! ```rust,ignore
//! use core_session::Session;
//!
//! let session = Session::new(core_config, PlaybackConfig::default())?;
//! session.activate();
//! session.load_sources(["drums.wav", "bass.wav"]).await?;
//! session.play();
//! ```

pub mod command;
pub mod coordinator;
pub mod error;
pub mod loader;
pub mod mixer;
pub mod reducer;
pub mod state;
pub mod track;
pub mod transport;

pub use command::Command;
pub use coordinator::Session;
pub use error::{Result, SessionError};
pub use loader::{LoadOutcome, LoadRequest, TrackLoader};
pub use reducer::{replay, transition};
pub use state::{LongestTrack, PlayState, SessionState};
pub use track::{SessionErrorInfo, Track, TrackDescriptor, TrackKey, TrackMeta};
pub use transport::FanOut;
