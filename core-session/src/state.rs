//! # Session State
//!
//! The single value describing a session. It is never mutated in place by
//! callers; [`crate::reducer::transition`] produces each successor.

use crate::mixer;
use crate::track::{SessionErrorInfo, Track, TrackKey, TrackMeta};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Global transport state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    #[default]
    Unstarted,
    Playing,
    Paused,
    Ended,
}

impl PlayState {
    /// States that begin a fresh run (every `complete` flag cleared).
    pub fn resets_run(&self) -> bool {
        matches!(self, PlayState::Unstarted | PlayState::Ended)
    }
}

/// The longest loaded track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LongestTrack {
    pub key: TrackKey,
    /// Frames per channel.
    pub length: usize,
    /// Seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub play_state: PlayState,
    /// Registration order.
    pub tracks: Vec<Track>,
    pub meta: HashMap<TrackKey, TrackMeta>,
    /// One-way gate opened by `Activate`.
    pub activated: bool,
    pub is_ready: bool,
    /// Seconds, as last reported by the reference track.
    pub current_time: f64,
    /// Seconds, last requested seek target.
    pub seek_position: f64,
    pub error: Option<SessionErrorInfo>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, key: &TrackKey) -> Option<&Track> {
        self.tracks.iter().find(|t| t.key == *key)
    }

    pub(crate) fn track_mut(&mut self, key: &TrackKey) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.key == *key)
    }

    pub fn meta(&self, key: &TrackKey) -> Option<&TrackMeta> {
        self.meta.get(key)
    }

    pub fn contains(&self, key: &TrackKey) -> bool {
        self.track(key).is_some()
    }

    /// Any track soloed.
    pub fn is_solo_on(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    /// Every track complete. Vacuously true for an empty registry.
    pub fn is_complete(&self) -> bool {
        self.tracks.iter().all(|t| t.complete)
    }

    /// No track is still fetching.
    pub fn are_tracks_ready(&self) -> bool {
        self.meta.values().all(|m| !m.fetching)
    }

    /// Maximal-duration track holding a buffer, in registration order on
    /// ties. `None` while any track is fetching.
    pub fn longest_track(&self) -> Option<LongestTrack> {
        if !self.are_tracks_ready() {
            return None;
        }

        let mut longest: Option<LongestTrack> = None;
        for track in &self.tracks {
            let Some(meta) = self.meta.get(&track.key).filter(|m| m.has_buffer()) else {
                continue;
            };
            if longest.map_or(true, |l| meta.duration > l.duration) {
                longest = Some(LongestTrack {
                    key: track.key,
                    length: meta.length,
                    duration: meta.duration,
                });
            }
        }
        longest
    }

    /// Frame count of the longest track, 0 when unknown.
    pub fn max_track_length(&self) -> usize {
        self.longest_track().map(|l| l.length).unwrap_or(0)
    }

    /// Duration of the longest track in seconds, 0 when unknown.
    pub fn max_track_duration(&self) -> f64 {
        self.longest_track().map(|l| l.duration).unwrap_or(0.0)
    }

    /// Resolved audibility of one track. `None` for unknown keys.
    pub fn is_audible(&self, key: &TrackKey) -> Option<bool> {
        let solo_on = self.is_solo_on();
        self.track(key)
            .map(|track| mixer::should_be_audible(track, solo_on))
    }

    /// Tracks whose load ended in an error.
    pub fn failed_tracks(&self) -> impl Iterator<Item = &TrackKey> {
        self.tracks
            .iter()
            .map(|t| &t.key)
            .filter(|k| self.meta.get(k).is_some_and(|m| m.error.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackDescriptor;
    use bridge_traits::PcmBuffer;
    use std::sync::Arc;

    fn with_tracks(durations: &[Option<f64>]) -> (SessionState, Vec<TrackKey>) {
        let mut state = SessionState::new();
        let mut keys = Vec::new();
        for duration in durations {
            let track: Track = TrackDescriptor::from_source("t.wav").into();
            keys.push(track.key);
            let meta = match duration {
                Some(secs) => {
                    let frames = (*secs * 100.0) as usize;
                    TrackMeta::from_buffer(Arc::new(PcmBuffer::silent(1, frames, 100)))
                }
                None => TrackMeta::loading(),
            };
            state.meta.insert(track.key, meta);
            state.tracks.push(track);
        }
        (state, keys)
    }

    #[test]
    fn empty_registry_selectors() {
        let state = SessionState::new();
        assert!(state.is_complete());
        assert!(!state.is_solo_on());
        assert!(state.are_tracks_ready());
        assert_eq!(state.longest_track(), None);
        assert_eq!(state.max_track_length(), 0);
    }

    #[test]
    fn longest_track_picks_maximal_duration() {
        let (state, keys) = with_tracks(&[Some(7.0), Some(10.0), Some(3.0)]);
        let longest = state.longest_track().unwrap();

        assert_eq!(longest.key, keys[1]);
        assert_eq!(longest.length, 1000);
        assert!((state.max_track_duration() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn longest_track_ties_go_to_first_registered() {
        let (state, keys) = with_tracks(&[Some(5.0), Some(5.0)]);
        assert_eq!(state.longest_track().unwrap().key, keys[0]);
    }

    #[test]
    fn longest_track_unknown_while_fetching() {
        let (state, _) = with_tracks(&[Some(5.0), None]);
        assert!(!state.are_tracks_ready());
        assert_eq!(state.longest_track(), None);
        assert_eq!(state.max_track_duration(), 0.0);
    }

    #[test]
    fn audibility_for_unknown_track() {
        let (state, keys) = with_tracks(&[Some(1.0)]);
        assert_eq!(state.is_audible(&keys[0]), Some(true));
        assert_eq!(state.is_audible(&TrackKey::new()), None);
    }
}
