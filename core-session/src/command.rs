//! # Session Commands
//!
//! Every mutation of [`SessionState`](crate::state::SessionState) is one of
//! these values passed through the coordinator's `dispatch`.

use crate::track::{SessionErrorInfo, TrackDescriptor, TrackKey, TrackMeta};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Transport
    Activate,
    Play,
    Pause,
    Stop,
    /// Move every track to this position (seconds).
    Seek(f64),
    /// Reference-track position report (seconds).
    SetTime(f64),
    /// Global completion.
    End,

    // Track flags
    Mute(TrackKey),
    Unmute(TrackKey),
    Solo(TrackKey),
    Unsolo(TrackKey),
    Complete(TrackKey),
    /// A completed track was sought back before its end.
    Rewind(TrackKey),

    // Registry
    AddTrack(TrackDescriptor),
    SetTrackMeta(TrackKey, TrackMeta),
    /// Drop every track and return to an unstarted, unready session.
    /// Activation is kept.
    ResetTracks,

    // Readiness and errors
    ResetReady,
    ConfirmReady,
    PresentError(Option<SessionErrorInfo>),
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Activate => "activate",
            Command::Play => "play",
            Command::Pause => "pause",
            Command::Stop => "stop",
            Command::Seek(_) => "seek",
            Command::SetTime(_) => "set_time",
            Command::End => "end",
            Command::Mute(_) => "mute",
            Command::Unmute(_) => "unmute",
            Command::Solo(_) => "solo",
            Command::Unsolo(_) => "unsolo",
            Command::Complete(_) => "complete",
            Command::Rewind(_) => "rewind",
            Command::AddTrack(_) => "add_track",
            Command::SetTrackMeta(_, _) => "set_track_meta",
            Command::ResetTracks => "reset_tracks",
            Command::ResetReady => "reset_ready",
            Command::ConfirmReady => "confirm_ready",
            Command::PresentError(_) => "present_error",
        }
    }

    /// Track the command targets, if any.
    pub fn track_key(&self) -> Option<TrackKey> {
        match self {
            Command::Mute(key)
            | Command::Unmute(key)
            | Command::Solo(key)
            | Command::Unsolo(key)
            | Command::Complete(key)
            | Command::Rewind(key)
            | Command::SetTrackMeta(key, _) => Some(*key),
            Command::AddTrack(descriptor) => Some(descriptor.key),
            _ => None,
        }
    }

    /// High-frequency commands logged at trace level.
    pub fn is_noisy(&self) -> bool {
        matches!(self, Command::SetTime(_))
    }
}
