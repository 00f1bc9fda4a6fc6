//! # Session Reducer
//!
//! Pure state transitions. Each command yields a new [`SessionState`]; the
//! input is never modified, so snapshots handed out earlier stay valid and
//! a recorded command history can be replayed to the same result.
//!
//! Commands naming an unknown track are silent no-ops.

use crate::command::Command;
use crate::state::{PlayState, SessionState};
use crate::track::{Track, TrackKey};
use crate::transport;

/// Apply one command.
pub fn transition(state: &SessionState, command: &Command) -> SessionState {
    let mut next = state.clone();

    match command {
        Command::Activate => {
            transport::activate(&mut next);
        }
        Command::Play => {
            transport::play(&mut next);
        }
        Command::Pause => {
            transport::pause(&mut next);
        }
        Command::Stop => {
            transport::stop(&mut next);
        }
        Command::End => {
            transport::end(&mut next);
        }
        Command::Seek(position) => {
            transport::seek(&mut next, *position);
        }
        Command::SetTime(position) => {
            transport::set_time(&mut next, *position);
        }

        Command::Mute(key) => set_flag(&mut next, key, |t| t.mute = true),
        Command::Unmute(key) => set_flag(&mut next, key, |t| t.mute = false),
        Command::Solo(key) => set_flag(&mut next, key, |t| t.solo = true),
        Command::Unsolo(key) => set_flag(&mut next, key, |t| t.solo = false),
        Command::Complete(key) => set_flag(&mut next, key, |t| t.complete = true),
        Command::Rewind(key) => set_flag(&mut next, key, |t| t.complete = false),

        Command::AddTrack(descriptor) => {
            if !next.contains(&descriptor.key) {
                next.tracks.push(Track::from(descriptor.clone()));
            }
        }
        Command::SetTrackMeta(key, meta) => {
            if next.contains(key) {
                if meta.fetching {
                    next.is_ready = false;
                }
                next.meta.insert(*key, meta.clone());
            }
        }
        Command::ResetTracks => {
            next = SessionState {
                activated: next.activated,
                play_state: PlayState::Unstarted,
                ..SessionState::default()
            };
        }

        Command::ResetReady => next.is_ready = false,
        Command::ConfirmReady => {
            if next.are_tracks_ready() {
                next.is_ready = true;
            }
        }
        Command::PresentError(error) => next.error = error.clone(),
    }

    next
}

/// Fold `commands` over `initial`.
pub fn replay<'a, I>(initial: &SessionState, commands: I) -> SessionState
where
    I: IntoIterator<Item = &'a Command>,
{
    commands
        .into_iter()
        .fold(initial.clone(), |state, command| transition(&state, command))
}

fn set_flag(state: &mut SessionState, key: &TrackKey, apply: impl FnOnce(&mut Track)) {
    if let Some(track) = state.track_mut(key) {
        apply(track);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{SessionErrorInfo, TrackDescriptor, TrackMeta};
    use bridge_traits::PcmBuffer;
    use core_playback::{ErrorKind, TrackError};
    use std::sync::Arc;

    fn session(tracks: usize) -> (SessionState, Vec<TrackKey>) {
        let mut state = transition(&SessionState::new(), &Command::Activate);
        let mut keys = Vec::new();
        for _ in 0..tracks {
            let descriptor = TrackDescriptor::from_source("stem.wav");
            keys.push(descriptor.key);
            state = transition(&state, &Command::AddTrack(descriptor));
        }
        (state, keys)
    }

    fn loaded(seconds: usize) -> TrackMeta {
        TrackMeta::from_buffer(Arc::new(PcmBuffer::silent(1, seconds * 100, 100)))
    }

    #[test]
    fn transition_does_not_touch_input() {
        let (state, keys) = session(1);
        let before = state.clone();

        let next = transition(&state, &Command::Mute(keys[0]));
        assert_eq!(state, before);
        assert!(next.tracks[0].mute);
    }

    #[test]
    fn unknown_keys_are_no_ops() {
        let (state, _) = session(2);
        let stranger = TrackKey::new();

        for command in [
            Command::Mute(stranger),
            Command::Solo(stranger),
            Command::Complete(stranger),
            Command::Rewind(stranger),
            Command::SetTrackMeta(stranger, TrackMeta::loading()),
        ] {
            assert_eq!(transition(&state, &command), state);
        }
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let descriptor = TrackDescriptor::from_source("a.wav");
        let state = transition(&SessionState::new(), &Command::AddTrack(descriptor.clone()));
        let state = transition(&state, &Command::AddTrack(descriptor));
        assert_eq!(state.tracks.len(), 1);
    }

    #[test]
    fn mute_solo_flags() {
        let (state, keys) = session(2);
        let state = transition(&state, &Command::Solo(keys[0]));
        let state = transition(&state, &Command::Mute(keys[0]));

        assert!(state.is_solo_on());
        assert_eq!(state.is_audible(&keys[0]), Some(true));
        assert_eq!(state.is_audible(&keys[1]), Some(false));

        let state = transition(&state, &Command::Unsolo(keys[0]));
        assert_eq!(state.is_audible(&keys[0]), Some(false));
        assert_eq!(state.is_audible(&keys[1]), Some(true));

        let state = transition(&state, &Command::Unmute(keys[0]));
        assert_eq!(state.is_audible(&keys[0]), Some(true));
    }

    #[test]
    fn stop_and_end_always_clear_completion() {
        let (state, keys) = session(3);
        let playing = transition(&state, &Command::Play);
        let mostly_done = keys
            .iter()
            .take(2)
            .fold(playing, |s, k| transition(&s, &Command::Complete(*k)));
        assert!(!mostly_done.is_complete());

        for command in [Command::Stop, Command::End] {
            let next = transition(&mostly_done, &command);
            assert!(next.tracks.iter().all(|t| !t.complete));
            assert!(next.play_state.resets_run());
        }
    }

    #[test]
    fn rewind_clears_one_track() {
        let (state, keys) = session(2);
        let state = transition(&state, &Command::Complete(keys[0]));
        let state = transition(&state, &Command::Complete(keys[1]));
        assert!(state.is_complete());

        let state = transition(&state, &Command::Rewind(keys[1]));
        assert!(state.tracks[0].complete);
        assert!(!state.tracks[1].complete);
    }

    #[test]
    fn readiness_never_true_while_fetching() {
        let (state, keys) = session(2);
        let state = transition(&state, &Command::SetTrackMeta(keys[0], loaded(3)));
        let state = transition(&state, &Command::SetTrackMeta(keys[1], TrackMeta::loading()));

        let state = transition(&state, &Command::ConfirmReady);
        assert!(!state.is_ready);

        let state = transition(&state, &Command::SetTrackMeta(keys[1], loaded(2)));
        let state = transition(&state, &Command::ConfirmReady);
        assert!(state.is_ready);

        // A new fetch drops readiness again
        let state = transition(&state, &Command::SetTrackMeta(keys[1], TrackMeta::loading()));
        assert!(!state.is_ready);
    }

    #[test]
    fn seek_clamps_to_longest_track() {
        let (state, keys) = session(2);
        let state = transition(&state, &Command::SetTrackMeta(keys[0], loaded(10)));
        let state = transition(&state, &Command::SetTrackMeta(keys[1], loaded(7)));

        let state = transition(&state, &Command::Seek(30.0));
        assert_eq!(state.seek_position, 10.0);
    }

    #[test]
    fn present_and_clear_error() {
        let (state, keys) = session(1);
        let info = SessionErrorInfo::for_track(keys[0], TrackError::new(ErrorKind::Fetch, "timeout"));

        let state = transition(&state, &Command::PresentError(Some(info.clone())));
        assert_eq!(state.error, Some(info));
        let state = transition(&state, &Command::PresentError(None));
        assert_eq!(state.error, None);
    }

    #[test]
    fn reset_tracks_keeps_activation() {
        let (state, keys) = session(2);
        let state = transition(&state, &Command::SetTrackMeta(keys[0], loaded(1)));
        let state = transition(&state, &Command::Play);

        let state = transition(&state, &Command::ResetTracks);
        assert!(state.activated);
        assert!(state.tracks.is_empty());
        assert!(state.meta.is_empty());
        assert_eq!(state.play_state, PlayState::Unstarted);
    }

    #[test]
    fn replay_reproduces_state() {
        let a = TrackDescriptor::from_source("a.wav");
        let b = TrackDescriptor::from_source("b.wav");
        let history = vec![
            Command::Activate,
            Command::AddTrack(a.clone()),
            Command::AddTrack(b.clone()),
            Command::SetTrackMeta(a.key, loaded(4)),
            Command::SetTrackMeta(b.key, loaded(2)),
            Command::ConfirmReady,
            Command::Solo(b.key),
            Command::Play,
            Command::SetTime(1.5),
            Command::Pause,
            Command::Seek(3.0),
        ];

        let stepped = history
            .iter()
            .fold(SessionState::new(), |s, c| transition(&s, c));
        let replayed = replay(&SessionState::new(), &history);

        assert_eq!(stepped, replayed);
        assert_eq!(replayed.play_state, PlayState::Paused);
        assert_eq!(replayed.current_time, 1.5);
        assert_eq!(replayed.seek_position, 3.0);
        assert!(replayed.is_ready);
    }
}
