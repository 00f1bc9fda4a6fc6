//! # Mute/Solo Resolver
//!
//! A track is audible unless muted; once any track is soloed only soloed
//! tracks are audible, and solo overrides mute.

use crate::state::SessionState;
use crate::track::{Track, TrackKey};

/// Gain of an audible track.
pub const UNITY_GAIN: f32 = 1.0;

/// `(!mute && !solo_on) || solo`, using the track's live `solo` flag.
pub fn should_be_audible(track: &Track, is_solo_on: bool) -> bool {
    (!track.mute && !is_solo_on) || track.solo
}

/// Ramp target for a resolved audibility. Inaudible tracks sit at `floor`,
/// never at zero.
pub fn target_gain(audible: bool, floor: f32) -> f32 {
    if audible {
        UNITY_GAIN
    } else {
        floor
    }
}

/// Audibility of every track, in registration order.
pub fn resolve(state: &SessionState) -> Vec<(TrackKey, bool)> {
    let solo_on = state.is_solo_on();
    state
        .tracks
        .iter()
        .map(|track| (track.key, should_be_audible(track, solo_on)))
        .collect()
}
