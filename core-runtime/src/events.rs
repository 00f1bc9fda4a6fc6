//! # Event Bus System
//!
//! Broadcasts engine notifications to any number of observers using
//! `tokio::sync::broadcast`. The session coordinator is the only producer in
//! the workspace; UIs, loggers and tests subscribe.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌────────────┐
//! │ Coordinator  ├────────────>│ EventBus  ├──────────────>│ UI / host  │
//! │  (dispatch)  │             │ (broadcast│               └────────────┘
//! └──────────────┘             │  channel) ├──────────────>┌────────────┐
//!                              └───────────┘               │ Test probe │
//!                                                          └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, TransportEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Transport(TransportEvent::Started { position_secs: 0.0 })).ok();
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Transport(_))));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind. Non-fatal;
//!   time updates are the usual cause and the next one supersedes them.
//! - **`RecvError::Closed`**: every sender was dropped (session torn down).
//!
//! `emit` fails only when nobody is subscribed, which producers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Global play/pause/stop/seek control plane
    Transport(TransportEvent),
    /// Per-track registration, loading and mixer changes
    Track(TrackEvent),
    /// Session-wide readiness, reference election and errors
    Session(SessionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Transport(e) => e.description(),
            CoreEvent::Track(e) => e.description(),
            CoreEvent::Session(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Track(TrackEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Session(SessionEvent::ErrorPresented { message: Some(_) }) => {
                EventSeverity::Warning
            }
            CoreEvent::Transport(TransportEvent::TimeUpdated { .. }) => EventSeverity::Debug,
            CoreEvent::Transport(_) => EventSeverity::Info,
            CoreEvent::Track(TrackEvent::Loaded { .. }) => EventSeverity::Info,
            CoreEvent::Session(SessionEvent::ReadyChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Track id carried by the event, if any.
    pub fn track_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Track(e) => Some(e.track_id()),
            CoreEvent::Session(SessionEvent::ReferenceChanged { track_id }) => track_id.as_deref(),
            _ => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Transport Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum TransportEvent {
    /// Audio output was unlocked for this session.
    Activated,
    /// Playback started or resumed.
    Started {
        /// Seek position playback resumed from (seconds).
        position_secs: f64,
    },
    Paused {
        /// Last reported reference time (seconds).
        position_secs: f64,
    },
    /// Transport returned to the unstarted state.
    Stopped,
    Seeked {
        /// Clamped target position (seconds).
        position_secs: f64,
    },
    /// Every track reached its natural end.
    Ended,
    /// Reference track reported its playback position.
    TimeUpdated {
        current_secs: f64,
        /// Duration of the reference track (seconds).
        duration_secs: f64,
    },
}

impl TransportEvent {
    fn description(&self) -> &str {
        match self {
            TransportEvent::Activated => "Audio activated",
            TransportEvent::Started { .. } => "Playback started",
            TransportEvent::Paused { .. } => "Playback paused",
            TransportEvent::Stopped => "Playback stopped",
            TransportEvent::Seeked { .. } => "Playback position moved",
            TransportEvent::Ended => "Playback ended",
            TransportEvent::TimeUpdated { .. } => "Playback time updated",
        }
    }
}

// ============================================================================
// Track Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum TrackEvent {
    /// A track was registered.
    Added {
        track_id: String,
        /// Locator, absent for recorded tracks.
        source: Option<String>,
    },
    /// Fetch/decode finished.
    Loaded {
        track_id: String,
        duration_secs: f64,
        sample_rate: u32,
        channels: usize,
    },
    /// Fetch, decode or device failure for one track.
    Failed {
        track_id: String,
        /// `fetch`, `decode` or `device`
        kind: String,
        message: String,
    },
    /// Display envelope computed against the current reference length.
    WaveformReady { track_id: String, bins: usize },
    MuteChanged { track_id: String, muted: bool },
    SoloChanged { track_id: String, soloed: bool },
    /// Resolved audibility changed; the node is ramping to the new gain.
    AudibilityChanged { track_id: String, audible: bool },
    /// The track reached its natural end.
    Completed { track_id: String },
    /// A seek moved a completed track back before its end.
    Rewound { track_id: String },
}

impl TrackEvent {
    fn description(&self) -> &str {
        match self {
            TrackEvent::Added { .. } => "Track added",
            TrackEvent::Loaded { .. } => "Track loaded",
            TrackEvent::Failed { .. } => "Track failed",
            TrackEvent::WaveformReady { .. } => "Waveform ready",
            TrackEvent::MuteChanged { .. } => "Track mute changed",
            TrackEvent::SoloChanged { .. } => "Track solo changed",
            TrackEvent::AudibilityChanged { .. } => "Track audibility changed",
            TrackEvent::Completed { .. } => "Track completed",
            TrackEvent::Rewound { .. } => "Track rewound",
        }
    }

    pub fn track_id(&self) -> &str {
        match self {
            TrackEvent::Added { track_id, .. }
            | TrackEvent::Loaded { track_id, .. }
            | TrackEvent::Failed { track_id, .. }
            | TrackEvent::WaveformReady { track_id, .. }
            | TrackEvent::MuteChanged { track_id, .. }
            | TrackEvent::SoloChanged { track_id, .. }
            | TrackEvent::AudibilityChanged { track_id, .. }
            | TrackEvent::Completed { track_id }
            | TrackEvent::Rewound { track_id } => track_id,
        }
    }
}

// ============================================================================
// Session Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    ReadyChanged { ready: bool },
    /// The longest track changed (or became unknown).
    ReferenceChanged { track_id: Option<String> },
    /// An error was shown to, or cleared from, the user.
    ErrorPresented { message: Option<String> },
    /// The source set was swapped; in-flight loads of older generations are dropped.
    SourcesReplaced { generation: u64, track_count: usize },
}

impl SessionEvent {
    fn description(&self) -> &str {
        match self {
            SessionEvent::ReadyChanged { .. } => "Session readiness changed",
            SessionEvent::ReferenceChanged { .. } => "Reference track changed",
            SessionEvent::ErrorPresented { .. } => "Session error presented",
            SessionEvent::SourcesReplaced { .. } => "Session sources replaced",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Clone it to share a producer handle; every [`subscribe`](Self::subscribe)
/// creates an independent receiver that sees all future events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let transport_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Transport(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once all senders are dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(id: &str) -> CoreEvent {
        CoreEvent::Track(TrackEvent::Completed {
            track_id: id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Transport(TransportEvent::Stopped)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Transport(TransportEvent::Seeked { position_secs: 5.0 });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter_skips_non_matching() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Track(_)));

        bus.emit(CoreEvent::Transport(TransportEvent::Ended)).ok();
        bus.emit(completed("a")).ok();

        assert_eq!(stream.recv().await.unwrap(), completed("a"));
    }

    #[tokio::test]
    async fn test_event_stream_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(completed("b")).ok();
        assert!(matches!(stream.try_recv(), Some(Ok(_))));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut stream = EventStream::new(bus.subscribe());

        for i in 0..5 {
            bus.emit(CoreEvent::Transport(TransportEvent::TimeUpdated {
                current_secs: i as f64,
                duration_secs: 10.0,
            }))
            .ok();
        }

        assert!(matches!(stream.try_recv(), Some(Err(RecvError::Lagged(_)))));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = CoreEvent::Track(TrackEvent::MuteChanged {
            track_id: "t1".to_string(),
            muted: true,
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Track");
        assert_eq!(json["payload"]["event"], "MuteChanged");
        assert_eq!(json["payload"]["muted"], true);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Track(TrackEvent::Failed {
            track_id: "t".to_string(),
            kind: "decode".to_string(),
            message: "bad header".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(
            CoreEvent::Transport(TransportEvent::Ended).severity(),
            EventSeverity::Info
        );
        assert_eq!(
            CoreEvent::Transport(TransportEvent::TimeUpdated {
                current_secs: 1.0,
                duration_secs: 2.0
            })
            .severity(),
            EventSeverity::Debug
        );
        assert_eq!(
            CoreEvent::Session(SessionEvent::ErrorPresented { message: None }).severity(),
            EventSeverity::Debug
        );
        assert!(EventSeverity::Error > EventSeverity::Warning);
    }

    #[test]
    fn test_track_id_accessor() {
        assert_eq!(completed("k").track_id(), Some("k"));
        assert_eq!(CoreEvent::Transport(TransportEvent::Stopped).track_id(), None);
        assert_eq!(
            CoreEvent::Session(SessionEvent::ReferenceChanged {
                track_id: Some("r".to_string())
            })
            .track_id(),
            Some("r")
        );
    }

    #[test]
    fn test_event_serialization_is_tagged_drums() {
        let event = CoreEvent::Track(TrackEvent::MuteChanged {
            track_id: "drums".to_string(),
            muted: true,
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "Track");
        assert_eq!(json["payload"]["event"], "MuteChanged");
        assert_eq!(json["payload"]["muted"], true);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(completed("x").description(), "Track completed");
        assert_eq!(
            CoreEvent::Session(SessionEvent::ReadyChanged { ready: true }).description(),
            "Session readiness changed"
        );
    }
}
