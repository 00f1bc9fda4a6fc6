//! # Transport State Machine
//!
//! ```text
//!             play               pause
//! Unstarted ───────► Playing ◄──────────► Paused
//!     ▲   ▲            │ all tracks         │
//!     │   │            ▼ complete           │
//!     │   └─ stop ── Ended ◄─── stop ───────┘
//!     └──────────────── stop ───────────────┘
//! ```
//!
//! The functions here edit a working copy of the state inside the reducer
//! and return whether the command took effect. [`fan_out`] derives the
//! command each playback node receives from a before/after pair.

use crate::command::Command;
use crate::state::{PlayState, SessionState};
use crate::track::TrackKey;
use core_playback::NodeCommand;

/// A node command and the tracks it goes to, in track order.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOut {
    pub command: NodeCommand,
    pub targets: Vec<TrackKey>,
}

/// Open the activation gate. Irreversible.
pub fn activate(state: &mut SessionState) -> bool {
    let changed = !state.activated;
    state.activated = true;
    changed
}

pub fn play(state: &mut SessionState) -> bool {
    if !state.activated || state.play_state == PlayState::Playing {
        return false;
    }
    enter(state, PlayState::Playing);
    true
}

pub fn pause(state: &mut SessionState) -> bool {
    if !state.activated || state.play_state != PlayState::Playing {
        return false;
    }
    enter(state, PlayState::Paused);
    true
}

/// Back to the start. Always applies so nodes can be reset from any state.
pub fn stop(state: &mut SessionState) -> bool {
    enter(state, PlayState::Unstarted);
    true
}

pub fn end(state: &mut SessionState) -> bool {
    if !state.activated || state.play_state == PlayState::Ended {
        return false;
    }
    enter(state, PlayState::Ended);
    true
}

/// Clamp `position` to `[0, max_track_duration]` (upper bound only once the
/// longest track is known) and store it.
pub fn seek(state: &mut SessionState, position: f64) -> bool {
    if !accepts_seek(state, position) {
        return false;
    }
    let upper = state.max_track_duration();
    let mut target = position.max(0.0);
    if upper > 0.0 {
        target = target.min(upper);
    }
    state.seek_position = target;
    true
}

pub fn set_time(state: &mut SessionState, position: f64) -> bool {
    if !position.is_finite() {
        return false;
    }
    state.current_time = position.max(0.0);
    true
}

fn accepts_seek(state: &SessionState, position: f64) -> bool {
    state.activated && position.is_finite()
}

fn enter(state: &mut SessionState, next: PlayState) {
    if next.resets_run() {
        for track in state.tracks.iter_mut() {
            track.complete = false;
        }
        state.current_time = 0.0;
        state.seek_position = 0.0;
    }
    state.play_state = next;
}

/// Node commands implied by applying `command` to `before`, yielding `after`.
pub fn fan_out(command: &Command, before: &SessionState, after: &SessionState) -> Option<FanOut> {
    let all = || after.tracks.iter().map(|t| t.key).collect::<Vec<_>>();

    let (node_command, targets) = match command {
        Command::Play
            if before.play_state != PlayState::Playing
                && after.play_state == PlayState::Playing =>
        {
            let pending = after
                .tracks
                .iter()
                .filter(|t| !t.complete)
                .map(|t| t.key)
                .collect();
            (NodeCommand::Play, pending)
        }
        Command::Pause
            if before.play_state == PlayState::Playing
                && after.play_state == PlayState::Paused =>
        {
            (NodeCommand::Pause, all())
        }
        Command::Stop => (NodeCommand::Stop, all()),
        Command::End
            if before.play_state != PlayState::Ended && after.play_state == PlayState::Ended =>
        {
            (NodeCommand::Ended, all())
        }
        Command::Seek(position) if accepts_seek(before, *position) => (
            NodeCommand::Seek {
                position: after.seek_position,
                transport_playing: after.play_state == PlayState::Playing,
            },
            all(),
        ),
        _ => return None,
    };

    Some(FanOut {
        command: node_command,
        targets,
    })
}
