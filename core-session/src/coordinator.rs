//! # Session Coordinator
//!
//! Owns a session's state, its playback nodes and its event bus. Every
//! mutation goes through [`Session::dispatch`]:
//!
//! ```text
//! dispatch(cmd) ─► reducer::transition ─► node lifecycle ─► transport fan-out
//!                                            │
//!        follow-up commands ◄── readiness ◄── reference ◄── mixer gains
//! ```
//!
//! Follow-up commands (`Rewind`, `Complete`, `End`, `ConfirmReady`, device errors) are
//! queued and applied by the same drain loop, so a dispatch issued from a
//! device callback or from inside another dispatch never interleaves with it.
//!
//! Loading is the only async path: [`Session::load_sources`] fetches and
//! decodes concurrently, then [`Session::refresh_waveforms`] reduces every
//! buffer against the reference length on the blocking pool.

use crate::command::Command;
use crate::error::{Result, SessionError};
use crate::loader::{LoadRequest, TrackLoader};
use crate::mixer;
use crate::reducer;
use crate::state::{LongestTrack, PlayState, SessionState};
use crate::track::{SessionErrorInfo, TrackDescriptor, TrackKey, TrackMeta};
use crate::transport;
use bridge_traits::{AudioDevice, PcmBuffer};
use core_playback::waveform::{normalize, reduce_to_envelope};
use core_playback::{
    AudioDecoder, NodeCommand, NodeSignal, NodeState, PlaybackConfig, PlaybackError, PlaybackNode,
    SignalHandler, SymphoniaDecoder, TrackError,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{
    CoreEvent, EventBus, EventStream, SessionEvent, TrackEvent, TransportEvent,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, info, instrument, trace, warn};

/// A node and the buffer its output was opened with.
struct NodeSlot {
    node: PlaybackNode,
    buffer: Arc<PcmBuffer>,
}

#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<Command>,
    draining: bool,
}

/// Clears the draining flag when a drain loop exits, including by unwinding.
struct DrainGuard<'a>(&'a RefCell<DispatchQueue>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut queue) = self.0.try_borrow_mut() {
            queue.draining = false;
            if std::thread::panicking() {
                queue.pending.clear();
            }
        }
    }
}

/// Queue `command` and, unless a drain is already running on this thread,
/// apply queued commands until none are left.
fn drain(
    queue: &ReentrantMutex<RefCell<DispatchQueue>>,
    command: Command,
    mut apply: impl FnMut(&Command) -> Vec<Command>,
) {
    let guard = queue.lock();
    guard.borrow_mut().pending.push_back(command);
    if guard.borrow().draining {
        return;
    }

    guard.borrow_mut().draining = true;
    let _reset = DrainGuard(&guard);
    loop {
        let next = guard.borrow_mut().pending.pop_front();
        let Some(command) = next else {
            break;
        };
        let follow_ups = apply(&command);
        guard.borrow_mut().pending.extend(follow_ups);
    }
}

/// Bounded command log plus the state it starts from.
///
/// Evicted commands are folded into `base`, so replaying `commands` over
/// `base` always yields the live state. Consecutive time reports collapse
/// into the latest one.
#[derive(Debug, Default)]
struct History {
    base: SessionState,
    commands: VecDeque<Command>,
}

impl History {
    fn record(&mut self, command: &Command, limit: usize) {
        if limit == 0 {
            return;
        }
        if let (Command::SetTime(position), Some(Command::SetTime(_))) =
            (command, self.commands.back())
        {
            if position.is_finite() {
                self.commands.pop_back();
            }
        }
        while self.commands.len() >= limit {
            let Some(evicted) = self.commands.pop_front() else {
                break;
            };
            self.base = reducer::transition(&self.base, &evicted);
        }
        self.commands.push_back(command.clone());
    }
}

struct SessionInner {
    config: PlaybackConfig,
    audio_device: Arc<dyn AudioDevice>,
    loader: TrackLoader,
    event_bus: EventBus,

    state: Mutex<SessionState>,
    nodes: Mutex<HashMap<TrackKey, NodeSlot>>,

    /// Last resolved audibility per track, used to detect changes.
    audibility: Mutex<HashMap<TrackKey, bool>>,
    reference: Mutex<Option<TrackKey>>,
    history: Mutex<History>,

    /// Bumped whenever the source set is replaced.
    generation: AtomicU64,

    dispatch: ReentrantMutex<RefCell<DispatchQueue>>,
}

/// A multitrack session. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Session")
            .field("play_state", &state.play_state)
            .field("tracks", &state.tracks.len())
            .field("activated", &state.activated)
            .field("is_ready", &state.is_ready)
            .field("generation", &self.generation())
            .finish()
    }
}

impl Session {
    /// Create a session decoding with [`SymphoniaDecoder`].
    pub fn new(core: CoreConfig, config: PlaybackConfig) -> Result<Self> {
        Self::with_decoder(core, config, Arc::new(SymphoniaDecoder::new()))
    }

    /// Create a session with an explicit decoder.
    pub fn with_decoder(
        core: CoreConfig,
        config: PlaybackConfig,
        decoder: Arc<dyn AudioDecoder>,
    ) -> Result<Self> {
        core.validate()?;
        config.validate().map_err(SessionError::Config)?;

        let loader = TrackLoader::new(
            Arc::clone(&core.byte_source),
            decoder,
            config.max_concurrent_loads,
        );

        info!(
            waveform_bins = config.waveform_bins,
            max_concurrent_loads = config.max_concurrent_loads,
            "Session created"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                audio_device: Arc::clone(&core.audio_device),
                event_bus: EventBus::new(core.event_buffer_size),
                loader,
                config,
                state: Mutex::new(SessionState::new()),
                nodes: Mutex::new(HashMap::new()),
                audibility: Mutex::new(HashMap::new()),
                reference: Mutex::new(None),
                history: Mutex::new(History::default()),
                generation: AtomicU64::new(0),
                dispatch: ReentrantMutex::new(RefCell::new(DispatchQueue::default())),
            }),
        })
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Apply `command` and every follow-up it causes.
    pub fn dispatch(&self, command: Command) {
        self.inner.dispatch(command);
    }

    pub fn activate(&self) {
        self.dispatch(Command::Activate);
    }

    pub fn play(&self) {
        self.dispatch(Command::Play);
    }

    pub fn pause(&self) {
        self.dispatch(Command::Pause);
    }

    pub fn stop(&self) {
        self.dispatch(Command::Stop);
    }

    /// Move every track to `position` seconds.
    pub fn seek(&self, position: f64) {
        self.dispatch(Command::Seek(position));
    }

    pub fn set_mute(&self, key: TrackKey, mute: bool) {
        self.dispatch(if mute {
            Command::Mute(key)
        } else {
            Command::Unmute(key)
        });
    }

    pub fn set_solo(&self, key: TrackKey, solo: bool) {
        self.dispatch(if solo {
            Command::Solo(key)
        } else {
            Command::Unsolo(key)
        });
    }

    pub fn present_error(&self, error: SessionErrorInfo) {
        self.dispatch(Command::PresentError(Some(error)));
    }

    pub fn clear_error(&self) {
        self.dispatch(Command::PresentError(None));
    }

    // ========================================================================
    // Sources
    // ========================================================================

    /// Register one track per locator, then fetch and decode them all.
    ///
    /// Per-track failures are recorded in that track's metadata and
    /// presented; they never fail the call. Returns the new keys in locator
    /// order, or [`SessionError::Superseded`] when the source set was
    /// replaced while loading.
    #[instrument(skip(self, sources))]
    pub async fn load_sources<I, S>(&self, sources: I) -> Result<Vec<TrackKey>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let activated = self.inner.state.lock().activated;
        if !activated {
            return Err(SessionError::NotActivated);
        }

        let generation = self.generation();
        let mut requests = Vec::new();
        for source in sources {
            let descriptor = TrackDescriptor::from_source(source);
            let locator = descriptor.source.clone().unwrap_or_default();
            let key = descriptor.key;
            self.dispatch(Command::AddTrack(descriptor));
            self.dispatch(Command::SetTrackMeta(key, TrackMeta::loading()));
            requests.push(LoadRequest {
                key,
                locator,
                generation,
            });
        }
        let keys: Vec<TrackKey> = requests.iter().map(|r| r.key).collect();
        info!(count = keys.len(), generation, "Loading tracks");

        let outcomes = self.inner.loader.load_all(requests).await;

        for outcome in outcomes {
            if outcome.generation != self.generation() {
                debug!(
                    track = %outcome.key,
                    generation = outcome.generation,
                    "Discarding stale load result"
                );
                continue;
            }
            match outcome.result {
                Ok(decoded) => {
                    let meta = TrackMeta::from_buffer(Arc::new(decoded.buffer));
                    self.dispatch(Command::SetTrackMeta(outcome.key, meta));
                }
                Err(e) => {
                    let error = e.to_track_error();
                    self.dispatch(Command::SetTrackMeta(
                        outcome.key,
                        TrackMeta::failed(error.clone()),
                    ));
                    self.dispatch(Command::PresentError(Some(SessionErrorInfo::for_track(
                        outcome.key,
                        error,
                    ))));
                }
            }
        }

        let current = self.generation();
        if current != generation {
            return Err(SessionError::Superseded(current));
        }

        self.refresh_waveforms().await?;
        Ok(keys)
    }

    /// Drop every track and load a new source set. Loads still in flight
    /// for the previous set are discarded when they finish.
    pub async fn replace_sources<I, S>(&self, sources: I) -> Result<Vec<TrackKey>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;

        self.dispatch(Command::ResetTracks);
        info!(generation, count = sources.len(), "Replacing sources");
        self.inner.emit(CoreEvent::Session(SessionEvent::SourcesReplaced {
            generation,
            track_count: sources.len(),
        }));

        self.load_sources(sources).await
    }

    /// Register a track whose audio arrives later from a recorder.
    pub fn add_recording_track(&self) -> TrackKey {
        let descriptor = TrackDescriptor::recording();
        let key = descriptor.key;
        self.dispatch(Command::AddTrack(descriptor));
        self.dispatch(Command::SetTrackMeta(key, TrackMeta::empty()));
        key
    }

    /// Hand a finished recording to its track.
    pub async fn attach_recording(&self, key: TrackKey, buffer: PcmBuffer) -> Result<()> {
        let known = self.inner.state.lock().contains(&key);
        if !known {
            return Err(SessionError::UnknownTrack(key));
        }

        debug!(track = %key, frames = buffer.length(), "Attaching recording");
        self.dispatch(Command::SetTrackMeta(
            key,
            TrackMeta::from_buffer(Arc::new(buffer)),
        ));
        self.refresh_waveforms().await?;
        Ok(())
    }

    /// Compute envelopes for every buffered track whose envelope is missing
    /// or was computed against another reference length. Returns how many
    /// tracks were updated.
    pub async fn refresh_waveforms(&self) -> Result<usize> {
        let generation = self.generation();
        let (reference, pending) = {
            let state = self.inner.state.lock();
            let Some(longest) = state.longest_track() else {
                return Ok(0);
            };
            let pending: Vec<(TrackKey, Arc<PcmBuffer>)> = state
                .tracks
                .iter()
                .filter_map(|track| {
                    let meta = state.meta(&track.key)?;
                    if !meta.needs_waveform(longest.length) {
                        return None;
                    }
                    meta.buffer.clone().map(|buffer| (track.key, buffer))
                })
                .collect();
            (longest.length, pending)
        };

        if pending.is_empty() {
            return Ok(0);
        }

        let bins = self.inner.config.waveform_bins;
        let envelopes = tokio::task::spawn_blocking(move || {
            pending
                .into_iter()
                .map(|(key, buffer)| {
                    let envelope = reduce_to_envelope(&buffer, bins, Some(reference))
                        .map(|raw| normalize(&raw));
                    (key, buffer, envelope)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| PlaybackError::Internal(format!("Waveform task failed: {}", e)))?;

        let current = self.generation();
        if current != generation {
            return Err(SessionError::Superseded(current));
        }

        let mut updated = 0;
        for (key, buffer, envelope) in envelopes {
            let envelope = envelope?;
            let meta = {
                let state = self.inner.state.lock();
                if state.max_track_length() != reference {
                    debug!("Reference changed during waveform reduction");
                    break;
                }
                match state.meta(&key) {
                    Some(meta)
                        if meta
                            .buffer
                            .as_ref()
                            .is_some_and(|current| Arc::ptr_eq(current, &buffer)) =>
                    {
                        meta.clone()
                    }
                    _ => continue,
                }
            };
            self.dispatch(Command::SetTrackMeta(key, meta.with_rms(envelope, reference)));
            updated += 1;
        }

        debug!(updated, reference, "Waveforms refreshed");
        Ok(updated)
    }

    // ========================================================================
    // Read surface
    // ========================================================================

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.inner.state.lock().clone()
    }

    pub fn play_state(&self) -> PlayState {
        self.inner.state.lock().play_state
    }

    pub fn is_solo_on(&self) -> bool {
        self.inner.state.lock().is_solo_on()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.state.lock().is_complete()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.lock().is_ready
    }

    pub fn longest_track(&self) -> Option<LongestTrack> {
        self.inner.state.lock().longest_track()
    }

    pub fn max_track_length(&self) -> usize {
        self.inner.state.lock().max_track_length()
    }

    pub fn max_track_duration(&self) -> f64 {
        self.inner.state.lock().max_track_duration()
    }

    pub fn are_tracks_ready(&self) -> bool {
        self.inner.state.lock().are_tracks_ready()
    }

    pub fn is_audible(&self, key: &TrackKey) -> Option<bool> {
        self.inner.state.lock().is_audible(key)
    }

    pub fn node_state(&self, key: &TrackKey) -> Option<NodeState> {
        self.inner.nodes.lock().get(key).map(|slot| slot.node.state())
    }

    /// Output position of a track's node (zero when its device is unavailable).
    pub fn node_position(&self, key: &TrackKey) -> Option<Duration> {
        self.inner
            .nodes
            .lock()
            .get(key)
            .map(|slot| slot.node.position())
    }

    /// Current output gain of a track's node.
    pub fn node_gain(&self, key: &TrackKey) -> Option<f32> {
        self.inner
            .nodes
            .lock()
            .get(key)
            .and_then(|slot| slot.node.gain())
    }

    /// Track whose node reports session time.
    pub fn reference_track(&self) -> Option<TrackKey> {
        *self.inner.reference.lock()
    }

    /// Applied commands, oldest first, bounded by `history_limit`.
    /// Replaying them over [`history_base`](Self::history_base) reproduces
    /// [`snapshot`](Self::snapshot).
    pub fn history(&self) -> Vec<Command> {
        self.inner.history.lock().commands.iter().cloned().collect()
    }

    /// State before the oldest command still in [`history`](Self::history).
    pub fn history_base(&self) -> SessionState {
        self.inner.history.lock().base.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.inner.event_bus.subscribe()
    }

    pub fn events(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }
}

// ============================================================================
// Command application
// ============================================================================

impl SessionInner {
    fn dispatch(self: &Arc<Self>, command: Command) {
        drain(&self.dispatch, command, |command| self.apply(command));
    }

    /// Apply one command and return the commands it implies.
    fn apply(self: &Arc<Self>, command: &Command) -> Vec<Command> {
        if command.is_noisy() {
            trace!(command = command.name(), "Dispatch");
        } else {
            debug!(command = command.name(), track = ?command.track_key(), "Dispatch");
        }

        let (before, after) = {
            let mut state = self.state.lock();
            let before = state.clone();
            let after = reducer::transition(&before, command);
            *state = after.clone();
            (before, after)
        };
        self.record(command);

        let mut follow_ups = Vec::new();

        if matches!(command, Command::ResetTracks) {
            self.teardown_nodes();
        }
        if let Command::SetTrackMeta(key, _) = command {
            self.sync_node(*key, &after, &mut follow_ups);
        }

        self.fan_out(command, &before, &after, &mut follow_ups);
        if !command.is_noisy() {
            self.sync_mixer(&after);
            self.elect_reference(&after);
        }
        self.publish(command, &before, &after);
        self.check_readiness(&after, &mut follow_ups);
        self.check_completion(command, &before, &after, &mut follow_ups);

        follow_ups
    }

    fn record(&self, command: &Command) {
        self.history
            .lock()
            .record(command, self.config.history_limit);
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    /// Open an output for a track whose buffer is new or replaced.
    fn sync_node(
        self: &Arc<Self>,
        key: TrackKey,
        state: &SessionState,
        follow_ups: &mut Vec<Command>,
    ) {
        let Some(meta) = state.meta(&key) else {
            return;
        };
        let Some(buffer) = meta.buffer.clone() else {
            self.nodes.lock().remove(&key);
            return;
        };
        if self
            .nodes
            .lock()
            .get(&key)
            .is_some_and(|slot| Arc::ptr_eq(&slot.buffer, &buffer))
        {
            return;
        }

        let duration = buffer.duration();
        let node = match self.audio_device.open(Arc::clone(&buffer)) {
            Ok(output) => {
                let node = PlaybackNode::attach(
                    output,
                    duration,
                    self.config.gain_ramp,
                    self.signal_handler(key),
                );
                let audible = state.is_audible(&key).unwrap_or(true);
                let gain = mixer::target_gain(audible, self.config.silence_floor);
                if let Err(e) = node.ramp_to(gain) {
                    warn!(track = %key, "Initial gain failed: {}", e);
                }
                self.audibility.lock().insert(key, audible);
                debug!(track = %key, ?duration, "Playback node attached");
                node
            }
            Err(e) => {
                let error = PlaybackError::from_device(e).to_track_error();
                warn!(track = %key, "Audio output unavailable: {}", error);
                follow_ups.push(Command::SetTrackMeta(
                    key,
                    meta.clone().with_error(error.clone()),
                ));
                follow_ups.push(Command::PresentError(Some(SessionErrorInfo::for_track(
                    key, error,
                ))));
                PlaybackNode::unavailable(duration)
            }
        };

        node.set_reference(*self.reference.lock() == Some(key));
        let position = self.transport_position(key, state);
        let replaced = self.nodes.lock().insert(
            key,
            NodeSlot {
                node: node.clone(),
                buffer,
            },
        );
        if let Some(old) = replaced {
            if let Err(e) = old.node.apply(NodeCommand::Stop) {
                warn!(track = %key, "Failed to stop replaced node: {}", e);
            }
        }

        let playing = state.play_state == PlayState::Playing;
        if node.is_available() && (playing || position > 0.0) {
            debug!(track = %key, position, playing, "Catching up late node");
            let command = NodeCommand::Seek {
                position,
                transport_playing: playing,
            };
            let complete = state.track(&key).is_some_and(|track| track.complete);
            match node.apply(command) {
                Ok(transition) if transition.completed() && !complete => {
                    follow_ups.push(Command::Complete(key));
                }
                Ok(transition) if transition.to != NodeState::Completed && complete => {
                    follow_ups.push(Command::Rewind(key));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(track = %key, "Failed to position late node: {}", e);
                    follow_ups.push(Command::PresentError(Some(SessionErrorInfo::for_track(
                        key,
                        e.to_track_error(),
                    ))));
                }
            }
        }
    }

    /// Where the transport is, read from the reference node when another
    /// track holds that role.
    fn transport_position(&self, key: TrackKey, state: &SessionState) -> f64 {
        let reference = *self.reference.lock();
        reference
            .filter(|reference| *reference != key)
            .and_then(|reference| self.node(&reference))
            .filter(|node| node.is_available())
            .map(|node| node.position().as_secs_f64())
            .unwrap_or(match state.play_state {
                PlayState::Playing | PlayState::Paused => state.current_time,
                PlayState::Unstarted | PlayState::Ended => state.seek_position,
            })
    }

    fn signal_handler(self: &Arc<Self>, key: TrackKey) -> SignalHandler {
        let session: Weak<SessionInner> = Arc::downgrade(self);
        Arc::new(move |signal| {
            let Some(session) = session.upgrade() else {
                return;
            };
            match signal {
                NodeSignal::Completed => session.dispatch(Command::Complete(key)),
                NodeSignal::Time(position) => session.dispatch(Command::SetTime(position)),
            }
        })
    }

    fn teardown_nodes(&self) {
        let nodes: Vec<NodeSlot> = self.nodes.lock().drain().map(|(_, slot)| slot).collect();
        for slot in nodes {
            if let Err(e) = slot.node.apply(NodeCommand::Stop) {
                warn!("Failed to stop node during reset: {}", e);
            }
        }
        self.audibility.lock().clear();
        *self.reference.lock() = None;
    }

    fn node(&self, key: &TrackKey) -> Option<PlaybackNode> {
        self.nodes.lock().get(key).map(|slot| slot.node.clone())
    }

    fn fan_out(
        &self,
        command: &Command,
        before: &SessionState,
        after: &SessionState,
        follow_ups: &mut Vec<Command>,
    ) {
        let Some(fan) = transport::fan_out(command, before, after) else {
            return;
        };

        for key in fan.targets {
            let Some(node) = self.node(&key) else {
                continue;
            };
            match node.apply(fan.command) {
                Ok(transition) if transition.revived() => {
                    follow_ups.push(Command::Rewind(key));
                }
                Ok(transition) if transition.completed() => {
                    follow_ups.push(Command::Complete(key));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(track = %key, command = ?fan.command, "Node command failed: {}", e);
                    follow_ups.push(Command::PresentError(Some(SessionErrorInfo::for_track(
                        key,
                        e.to_track_error(),
                    ))));
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Mixer and reference
    // ------------------------------------------------------------------------

    fn sync_mixer(&self, state: &SessionState) {
        let floor = self.config.silence_floor;
        for (key, audible) in mixer::resolve(state) {
            let previous = self.audibility.lock().insert(key, audible);
            if previous == Some(audible) {
                continue;
            }
            if let Some(node) = self.node(&key) {
                if let Err(e) = node.ramp_to(mixer::target_gain(audible, floor)) {
                    warn!(track = %key, "Gain ramp failed: {}", e);
                }
            }
            if previous.is_some() {
                debug!(track = %key, audible, "Audibility changed");
                self.emit(CoreEvent::Track(TrackEvent::AudibilityChanged {
                    track_id: key.to_string(),
                    audible,
                }));
            }
        }
    }

    fn elect_reference(&self, state: &SessionState) {
        let elected = state.longest_track().map(|longest| longest.key);
        let previous = {
            let mut reference = self.reference.lock();
            if *reference == elected {
                return;
            }
            std::mem::replace(&mut *reference, elected)
        };

        if let Some(node) = previous.and_then(|key| self.node(&key)) {
            node.set_reference(false);
        }
        if let Some(node) = elected.and_then(|key| self.node(&key)) {
            node.set_reference(true);
        }

        debug!(reference = ?elected, "Reference track elected");
        self.emit(CoreEvent::Session(SessionEvent::ReferenceChanged {
            track_id: elected.map(|key| key.to_string()),
        }));
    }

    // ------------------------------------------------------------------------
    // Derived commands
    // ------------------------------------------------------------------------

    /// Ready once activated with at least one track and nothing fetching.
    fn check_readiness(&self, state: &SessionState, follow_ups: &mut Vec<Command>) {
        let ready = state.activated && !state.tracks.is_empty() && state.are_tracks_ready();
        if ready && !state.is_ready {
            follow_ups.push(Command::ConfirmReady);
        } else if !ready && state.is_ready {
            follow_ups.push(Command::ResetReady);
        }
    }

    /// Tracks able to play (an attached output) are all complete.
    fn playable_complete(&self, state: &SessionState) -> bool {
        let nodes = self.nodes.lock();
        let mut playable = state
            .tracks
            .iter()
            .filter(|track| nodes.get(&track.key).is_some_and(|s| s.node.is_available()))
            .peekable();
        playable.peek().is_some() && playable.all(|track| track.complete)
    }

    fn check_completion(
        &self,
        command: &Command,
        before: &SessionState,
        after: &SessionState,
        follow_ups: &mut Vec<Command>,
    ) {
        if after.play_state != PlayState::Playing {
            return;
        }
        let finished = match command {
            Command::Complete(_) => {
                !self.playable_complete(before) && self.playable_complete(after)
            }
            Command::Play => before.play_state != PlayState::Playing && self.playable_complete(after),
            _ => false,
        };
        if finished {
            info!("All tracks complete");
            follow_ups.push(Command::End);
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    fn publish(&self, command: &Command, before: &SessionState, after: &SessionState) {
        let mut events = Vec::new();

        match command {
            Command::Activate if !before.activated => {
                info!("Session activated");
                events.push(CoreEvent::Transport(TransportEvent::Activated));
            }
            Command::Play if before.play_state != after.play_state => {
                events.push(CoreEvent::Transport(TransportEvent::Started {
                    position_secs: after.seek_position,
                }));
            }
            Command::Pause if before.play_state != after.play_state => {
                events.push(CoreEvent::Transport(TransportEvent::Paused {
                    position_secs: after.current_time,
                }));
            }
            Command::Stop => events.push(CoreEvent::Transport(TransportEvent::Stopped)),
            Command::End if before.play_state != after.play_state => {
                events.push(CoreEvent::Transport(TransportEvent::Ended));
            }
            Command::Seek(position) if after.activated && position.is_finite() => {
                events.push(CoreEvent::Transport(TransportEvent::Seeked {
                    position_secs: after.seek_position,
                }));
            }
            Command::SetTime(_) if before.current_time != after.current_time => {
                events.push(CoreEvent::Transport(TransportEvent::TimeUpdated {
                    current_secs: after.current_time,
                    duration_secs: after.max_track_duration(),
                }));
            }
            Command::Mute(key) | Command::Unmute(key) => {
                if let (Some(old), Some(new)) = (before.track(key), after.track(key)) {
                    if old.mute != new.mute {
                        events.push(CoreEvent::Track(TrackEvent::MuteChanged {
                            track_id: key.to_string(),
                            muted: new.mute,
                        }));
                    }
                }
            }
            Command::Solo(key) | Command::Unsolo(key) => {
                if let (Some(old), Some(new)) = (before.track(key), after.track(key)) {
                    if old.solo != new.solo {
                        events.push(CoreEvent::Track(TrackEvent::SoloChanged {
                            track_id: key.to_string(),
                            soloed: new.solo,
                        }));
                    }
                }
            }
            Command::Complete(key) | Command::Rewind(key) => {
                if let (Some(old), Some(new)) = (before.track(key), after.track(key)) {
                    if old.complete != new.complete {
                        let track_id = key.to_string();
                        events.push(CoreEvent::Track(if new.complete {
                            TrackEvent::Completed { track_id }
                        } else {
                            TrackEvent::Rewound { track_id }
                        }));
                    }
                }
            }
            Command::AddTrack(descriptor) if !before.contains(&descriptor.key) => {
                events.push(CoreEvent::Track(TrackEvent::Added {
                    track_id: descriptor.key.to_string(),
                    source: descriptor.source.clone(),
                }));
            }
            Command::SetTrackMeta(key, _) => {
                meta_events(key, before.meta(key), after.meta(key), &mut events);
            }
            Command::PresentError(error) if before.error != after.error => {
                if let Some(error) = error {
                    warn!(error = %error, "Error presented");
                }
                events.push(CoreEvent::Session(SessionEvent::ErrorPresented {
                    message: error.as_ref().map(|e| e.to_string()),
                }));
            }
            _ => {}
        }

        if before.is_ready != after.is_ready {
            events.push(CoreEvent::Session(SessionEvent::ReadyChanged {
                ready: after.is_ready,
            }));
        }

        for event in events {
            self.emit(event);
        }
    }
}

fn meta_events(
    key: &TrackKey,
    before: Option<&TrackMeta>,
    after: Option<&TrackMeta>,
    events: &mut Vec<CoreEvent>,
) {
    let Some(after) = after else {
        return;
    };
    let track_id = key.to_string();

    let same_buffer = match (before.and_then(|m| m.buffer.as_ref()), after.buffer.as_ref()) {
        (Some(old), Some(new)) => Arc::ptr_eq(old, new),
        (None, None) => true,
        _ => false,
    };
    if !same_buffer && after.has_buffer() {
        events.push(CoreEvent::Track(TrackEvent::Loaded {
            track_id: track_id.clone(),
            duration_secs: after.duration,
            sample_rate: after.sample_rate,
            channels: after.number_of_channels,
        }));
    }

    if let Some(error) = &after.error {
        if before.and_then(|m| m.error.as_ref()) != Some(error) {
            events.push(CoreEvent::Track(failed_event(&track_id, error)));
        }
    }

    if after.rms_reference.is_some() && before.and_then(|m| m.rms_reference) != after.rms_reference
    {
        events.push(CoreEvent::Track(TrackEvent::WaveformReady {
            track_id,
            bins: after.rms.len(),
        }));
    }
}

fn failed_event(track_id: &str, error: &TrackError) -> TrackEvent {
    TrackEvent::Failed {
        track_id: track_id.to_string(),
        kind: error.kind.as_str().to_string(),
        message: error.message.clone(),
    }
}
