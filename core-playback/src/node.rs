//! # Per-Track Playback Node
//!
//! Wraps one [`AudioOutput`] with the track-level state machine:
//!
//! ```text
//! Idle ──attach──► Ready ──Play──► Playing ◄──Play── Paused
//!                    ▲               │  │               ▲
//!                    │               │  └────Pause──────┘
//!                    │          device Ended
//!              Stop / Ended          ▼
//!                    └──────────  Completed ──Seek before end──► Paused / Playing
//!                                    ▲
//!                     Seek to end ───┘ (from Ready, Playing or Paused)
//! ```
//!
//! A node without an output (the device refused to open) stays `Idle` and
//! ignores every command. Device callbacks are handled synchronously: the
//! `Ended` callback flips the node to `Completed` before the
//! [`NodeSignal::Completed`] is relayed, and only the reference node relays
//! `TimeUpdate` reports. A seek to or past the end completes the node
//! directly; the caller learns about it from [`Transition::completed`].

use crate::error::{PlaybackError, Result};
use bridge_traits::{AudioOutput, OutputEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Track playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// No output bound (not loaded yet, or the device is unavailable).
    Idle,
    /// Output bound, positioned at the start, not playing.
    Ready,
    Playing,
    Paused,
    /// Reached the end of its buffer during the current run.
    Completed,
}

impl NodeState {
    pub fn is_active(&self) -> bool {
        matches!(self, NodeState::Playing | NodeState::Paused)
    }
}

/// Transport command fanned out to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeCommand {
    Play,
    Pause,
    Stop,
    Ended,
    /// Move to `position` seconds. `transport_playing` tells the node whether
    /// the session is currently playing.
    Seek {
        position: f64,
        transport_playing: bool,
    },
}

/// Report relayed from a node's device callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeSignal {
    /// The output reached the end of the buffer.
    Completed,
    /// Playback position in seconds (reference node only).
    Time(f64),
}

/// Receiver for [`NodeSignal`]s.
pub type SignalHandler = Arc<dyn Fn(NodeSignal) + Send + Sync>;

/// State change produced by [`PlaybackNode::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: NodeState,
    pub to: NodeState,
}

impl Transition {
    fn unchanged(state: NodeState) -> Self {
        Self {
            from: state,
            to: state,
        }
    }

    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// A seek moved a completed node back before its end.
    pub fn revived(&self) -> bool {
        self.from == NodeState::Completed && self.to != NodeState::Completed
    }

    /// The command itself left the node at its end (seek past the end, or
    /// play with the output already parked there). No device signal follows.
    pub fn completed(&self) -> bool {
        self.from != NodeState::Completed && self.to == NodeState::Completed
    }
}

struct NodeShared {
    output: Option<Box<dyn AudioOutput>>,
    duration: Duration,
    gain_ramp: Duration,
    state: Mutex<NodeState>,
    reference: AtomicBool,
    handler: SignalHandler,
}

impl NodeShared {
    fn on_output_event(&self, event: OutputEvent) {
        match event {
            OutputEvent::Ended => {
                let completed = {
                    let mut state = self.state.lock();
                    if matches!(*state, NodeState::Idle | NodeState::Completed) {
                        false
                    } else {
                        *state = NodeState::Completed;
                        true
                    }
                };
                if completed {
                    debug!("Node completed");
                    (self.handler)(NodeSignal::Completed);
                }
            }
            OutputEvent::TimeUpdate(position) => {
                if self.reference.load(Ordering::Acquire) {
                    trace!(position = position.as_secs_f64(), "Reference time update");
                    (self.handler)(NodeSignal::Time(position.as_secs_f64()));
                }
            }
        }
    }
}

/// Playback graph for one track: output, gain stage and state machine.
#[derive(Clone)]
pub struct PlaybackNode {
    shared: Arc<NodeShared>,
}

impl std::fmt::Debug for PlaybackNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackNode")
            .field("state", &self.state())
            .field("duration", &self.shared.duration)
            .field("reference", &self.is_reference())
            .finish()
    }
}

impl PlaybackNode {
    /// Bind an opened output and register the node's device callbacks.
    pub fn attach(
        output: Box<dyn AudioOutput>,
        duration: Duration,
        gain_ramp: Duration,
        handler: SignalHandler,
    ) -> Self {
        let node = Self {
            shared: Arc::new(NodeShared {
                output: Some(output),
                duration,
                gain_ramp,
                state: Mutex::new(NodeState::Ready),
                reference: AtomicBool::new(false),
                handler,
            }),
        };

        let weak: Weak<NodeShared> = Arc::downgrade(&node.shared);
        if let Some(output) = node.shared.output.as_ref() {
            output.subscribe(Box::new(move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_output_event(event);
                }
            }));
        }

        node
    }

    /// A node whose output could not be opened. It stays `Idle`.
    pub fn unavailable(duration: Duration) -> Self {
        Self {
            shared: Arc::new(NodeShared {
                output: None,
                duration,
                gain_ramp: Duration::ZERO,
                state: Mutex::new(NodeState::Idle),
                reference: AtomicBool::new(false),
                handler: Arc::new(|_| {}),
            }),
        }
    }

    pub fn state(&self) -> NodeState {
        *self.shared.state.lock()
    }

    pub fn duration(&self) -> Duration {
        self.shared.duration
    }

    pub fn is_available(&self) -> bool {
        self.shared.output.is_some()
    }

    /// Playback position of the output (zero when unavailable).
    pub fn position(&self) -> Duration {
        self.shared
            .output
            .as_ref()
            .map(|output| output.position())
            .unwrap_or(Duration::ZERO)
    }

    pub fn gain(&self) -> Option<f32> {
        self.shared.output.as_ref().map(|output| output.gain())
    }

    pub fn is_reference(&self) -> bool {
        self.shared.reference.load(Ordering::Acquire)
    }

    /// Mark this node as the session's time source.
    pub fn set_reference(&self, reference: bool) {
        self.shared.reference.store(reference, Ordering::Release);
    }

    /// Ramp the gain linearly to `target` over the node's ramp duration.
    pub fn ramp_to(&self, target: f32) -> Result<()> {
        match self.shared.output.as_ref() {
            Some(output) => output
                .ramp_gain(target, self.shared.gain_ramp)
                .map_err(PlaybackError::from_device),
            None => Ok(()),
        }
    }

    /// Apply a transport command.
    pub fn apply(&self, command: NodeCommand) -> Result<Transition> {
        let Some(output) = self.shared.output.as_ref() else {
            return Ok(Transition::unchanged(NodeState::Idle));
        };

        let mut state = self.shared.state.lock();
        let from = *state;

        let to = match (command, from) {
            (_, NodeState::Idle) => NodeState::Idle,

            (NodeCommand::Play, NodeState::Ready | NodeState::Paused) => {
                if output.position() >= self.shared.duration {
                    NodeState::Completed
                } else {
                    output.play().map_err(PlaybackError::from_device)?;
                    NodeState::Playing
                }
            }
            (NodeCommand::Play, state) => state,

            (NodeCommand::Pause, NodeState::Playing) => {
                output.pause().map_err(PlaybackError::from_device)?;
                NodeState::Paused
            }
            (NodeCommand::Pause, state) => state,

            (NodeCommand::Stop | NodeCommand::Ended, _) => {
                output.pause().map_err(PlaybackError::from_device)?;
                output
                    .seek(Duration::ZERO)
                    .map_err(PlaybackError::from_device)?;
                NodeState::Ready
            }

            (
                NodeCommand::Seek {
                    position,
                    transport_playing,
                },
                state,
            ) => {
                if !position.is_finite() {
                    return Ok(Transition::unchanged(from));
                }
                let target = Duration::from_secs_f64(
                    position.clamp(0.0, self.shared.duration.as_secs_f64()),
                );
                output.seek(target).map_err(PlaybackError::from_device)?;

                let at_end = target >= self.shared.duration;
                match state {
                    NodeState::Completed if at_end => NodeState::Completed,
                    _ if at_end => {
                        output.pause().map_err(PlaybackError::from_device)?;
                        NodeState::Completed
                    }
                    _ if transport_playing => {
                        output.play().map_err(PlaybackError::from_device)?;
                        NodeState::Playing
                    }
                    NodeState::Completed => NodeState::Paused,
                    other => other,
                }
            }
        };

        *state = to;
        let transition = Transition { from, to };
        if transition.changed() {
            trace!(?command, ?from, ?to, "Node transition");
        }
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ManualClock, VirtualOutput};
    use bridge_traits::PcmBuffer;

    struct Harness {
        clock: Arc<ManualClock>,
        output: VirtualOutput,
        node: PlaybackNode,
        signals: Arc<Mutex<Vec<NodeSignal>>>,
    }

    fn harness(seconds: usize) -> Harness {
        let clock = Arc::new(ManualClock::default());
        let buffer = PcmBuffer::silent(1, 100 * seconds, 100);
        let output = VirtualOutput::new(&buffer, clock.clone(), Duration::from_millis(250));
        let signals = Arc::new(Mutex::new(Vec::new()));
        let sink = signals.clone();
        let node = PlaybackNode::attach(
            Box::new(output.clone()),
            buffer.duration(),
            Duration::from_millis(100),
            Arc::new(move |signal| sink.lock().push(signal)),
        );
        Harness {
            clock,
            output,
            node,
            signals,
        }
    }

    fn seek(position: f64, transport_playing: bool) -> NodeCommand {
        NodeCommand::Seek {
            position,
            transport_playing,
        }
    }

    #[test]
    fn test_play_pause_resume() {
        let h = harness(10);
        assert_eq!(h.node.state(), NodeState::Ready);

        h.node.apply(NodeCommand::Play).unwrap();
        assert_eq!(h.node.state(), NodeState::Playing);
        assert!(h.output.is_playing());

        h.clock.advance(Duration::from_secs(2));
        h.node.apply(NodeCommand::Pause).unwrap();
        assert_eq!(h.node.state(), NodeState::Paused);
        assert_eq!(h.node.position(), Duration::from_secs(2));

        h.node.apply(NodeCommand::Play).unwrap();
        h.clock.advance(Duration::from_secs(1));
        assert_eq!(h.node.position(), Duration::from_secs(3));
    }

    #[test]
    fn test_stop_rewinds_to_ready() {
        let h = harness(10);
        h.node.apply(NodeCommand::Play).unwrap();
        h.clock.advance(Duration::from_secs(4));

        let transition = h.node.apply(NodeCommand::Stop).unwrap();
        assert_eq!(transition.to, NodeState::Ready);
        assert_eq!(h.node.position(), Duration::ZERO);
        assert!(!h.output.is_playing());
    }

    #[test]
    fn test_device_end_completes_and_signals() {
        let h = harness(2);
        h.node.apply(NodeCommand::Play).unwrap();
        h.clock.advance(Duration::from_secs(3));
        h.output.tick();

        assert_eq!(h.node.state(), NodeState::Completed);
        assert_eq!(*h.signals.lock(), vec![NodeSignal::Completed]);

        // Completed nodes ignore Play until the run resets
        h.node.apply(NodeCommand::Play).unwrap();
        assert_eq!(h.node.state(), NodeState::Completed);
        assert!(!h.output.is_playing());

        h.node.apply(NodeCommand::Ended).unwrap();
        assert_eq!(h.node.state(), NodeState::Ready);
    }

    #[test]
    fn test_only_reference_relays_time() {
        let h = harness(10);
        h.node.apply(NodeCommand::Play).unwrap();
        h.output.tick();
        assert!(h.signals.lock().is_empty());

        h.node.set_reference(true);
        h.clock.advance(Duration::from_millis(500));
        h.output.tick();
        assert_eq!(*h.signals.lock(), vec![NodeSignal::Time(0.5)]);
    }

    #[test]
    fn test_seek_clamps_and_keeps_playing() {
        let h = harness(10);
        h.node.apply(NodeCommand::Play).unwrap();

        let transition = h.node.apply(seek(25.0, true)).unwrap();
        assert!(transition.completed());
        assert_eq!(h.node.position(), Duration::from_secs(10));

        let transition = h.node.apply(seek(-3.0, true)).unwrap();
        assert!(transition.revived());
        assert_eq!(h.node.position(), Duration::ZERO);
        assert_eq!(h.node.state(), NodeState::Playing);

        let unchanged = h.node.apply(seek(f64::NAN, true)).unwrap();
        assert!(!unchanged.changed());
    }

    #[test]
    fn test_seek_while_transport_playing_starts_ready_node() {
        let h = harness(10);
        h.node.apply(seek(3.0, true)).unwrap();
        assert_eq!(h.node.state(), NodeState::Playing);

        let paused = harness(10);
        paused.node.apply(seek(3.0, false)).unwrap();
        assert_eq!(paused.node.state(), NodeState::Ready);
        assert_eq!(paused.node.position(), Duration::from_secs(3));
    }

    #[test]
    fn test_seek_revives_completed_node() {
        let h = harness(2);
        h.node.apply(NodeCommand::Play).unwrap();
        h.clock.advance(Duration::from_secs(3));
        h.output.tick();
        assert_eq!(h.node.state(), NodeState::Completed);

        let transition = h.node.apply(seek(1.0, true)).unwrap();
        assert!(transition.revived());
        assert_eq!(h.node.state(), NodeState::Playing);
        assert!(h.output.is_playing());

        h.clock.advance(Duration::from_secs(2));
        h.output.tick();
        let transition = h.node.apply(seek(1.0, false)).unwrap();
        assert!(transition.revived());
        assert_eq!(transition.to, NodeState::Paused);

        // Seeking to the very end leaves it completed
        h.node.apply(NodeCommand::Play).unwrap();
        h.clock.advance(Duration::from_secs(2));
        h.output.tick();
        let transition = h.node.apply(seek(2.0, true)).unwrap();
        assert!(!transition.revived());
        assert_eq!(h.node.state(), NodeState::Completed);
    }

    #[test]
    fn test_seek_past_end_completes_without_playing() {
        for from_paused in [true, false] {
            let h = harness(3);
            if from_paused {
                h.node.apply(NodeCommand::Play).unwrap();
                h.clock.advance(Duration::from_secs(1));
                h.node.apply(NodeCommand::Pause).unwrap();
            }

            let transition = h.node.apply(seek(5.0, false)).unwrap();
            assert!(transition.completed());
            assert_eq!(h.node.position(), Duration::from_secs(3));

            // Resuming the transport must not restart the track from zero
            let transition = h.node.apply(NodeCommand::Play).unwrap();
            assert!(!transition.changed());
            assert!(!h.output.is_playing());
            h.clock.advance(Duration::from_millis(100));
            assert_eq!(h.node.position(), Duration::from_secs(3));
            assert_eq!(h.node.state(), NodeState::Completed);
        }
    }

    #[test]
    fn test_play_at_end_completes() {
        let h = harness(2);
        h.output.seek(Duration::from_secs(2)).unwrap();

        let transition = h.node.apply(NodeCommand::Play).unwrap();
        assert!(transition.completed());
        assert!(!h.output.is_playing());
        assert_eq!(h.node.position(), Duration::from_secs(2));
        assert!(h.signals.lock().is_empty());
    }

    #[test]
    fn test_ramp_uses_node_duration() {
        let h = harness(10);
        h.node.ramp_to(0.00001).unwrap();
        h.clock.advance(Duration::from_millis(50));
        let mid = h.node.gain().unwrap();
        assert!(mid < 1.0 && mid > 0.4);

        h.clock.advance(Duration::from_millis(50));
        assert!((h.node.gain().unwrap() - 0.00001).abs() < 1e-7);
    }

    #[test]
    fn test_unavailable_node_is_inert() {
        let node = PlaybackNode::unavailable(Duration::from_secs(5));
        assert_eq!(node.state(), NodeState::Idle);
        assert!(!node.is_available());

        let transition = node.apply(NodeCommand::Play).unwrap();
        assert_eq!(transition.to, NodeState::Idle);
        assert!(node.ramp_to(1.0).is_ok());
        assert_eq!(node.gain(), None);
        assert_eq!(node.position(), Duration::ZERO);
    }

    mockall::mock! {
        Output {}

        impl AudioOutput for Output {
            fn play(&self) -> bridge_traits::error::Result<()>;
            fn pause(&self) -> bridge_traits::error::Result<()>;
            fn seek(&self, position: Duration) -> bridge_traits::error::Result<()>;
            fn position(&self) -> Duration;
            fn is_playing(&self) -> bool;
            fn ramp_gain(&self, target: f32, over: Duration) -> bridge_traits::error::Result<()>;
            fn gain(&self) -> f32;
            fn subscribe(&self, listener: bridge_traits::OutputListener);
        }
    }

    #[test]
    fn test_device_failure_keeps_state() {
        let mut output = MockOutput::new();
        output.expect_subscribe().times(1).return_const(());
        output.expect_position().return_const(Duration::ZERO);
        output.expect_play().returning(|| {
            Err(bridge_traits::BridgeError::Device("device lost".to_string()))
        });
        output
            .expect_ramp_gain()
            .withf(|target, over| *target == 1.0 && *over == Duration::from_millis(100))
            .returning(|_, _| {
                Err(bridge_traits::BridgeError::PermissionDenied(
                    "output".to_string(),
                ))
            });

        let node = PlaybackNode::attach(
            Box::new(output),
            Duration::from_secs(1),
            Duration::from_millis(100),
            Arc::new(|_| {}),
        );

        let err = node.apply(NodeCommand::Play).unwrap_err();
        assert!(matches!(err, PlaybackError::DeviceUnavailable(_)));
        assert_eq!(node.state(), NodeState::Ready);

        let err = node.ramp_to(1.0).unwrap_err();
        assert!(matches!(err, PlaybackError::PermissionDenied(_)));
    }

    #[test]
    fn test_dropped_node_ignores_late_callbacks() {
        let h = harness(1);
        h.node.apply(NodeCommand::Play).unwrap();
        let Harness {
            clock,
            output,
            node,
            signals,
        } = h;
        drop(node);

        clock.advance(Duration::from_secs(2));
        output.tick();
        assert!(signals.lock().is_empty());
    }
}
