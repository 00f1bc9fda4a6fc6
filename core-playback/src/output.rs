//! # Virtual Output Device
//!
//! A headless [`AudioDevice`] whose outputs derive their playback position
//! from an injected [`Clock`] instead of a sound card. It honours the full
//! output contract (linear gain ramps, position tracking, `TimeUpdate` and
//! `Ended` callbacks) so sessions can run without audio hardware and tests
//! can step time deterministically with [`ManualClock`].
//!
//! Outputs do not advance on their own. Call [`VirtualDevice::tick_all`]
//! (or [`VirtualOutput::tick`]) after moving the clock, or start
//! [`VirtualDevice::spawn_ticker`] to poll on the Tokio runtime.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AudioDevice, AudioOutput, BridgeError, Clock, OutputEvent, OutputListener, PcmBuffer,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Default cadence of `TimeUpdate` reports.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

// ============================================================================
// Manual Clock
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        *self.now.lock() += step;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ============================================================================
// Gain Ramp
// ============================================================================

/// Linear gain automation between two values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    pub from: f32,
    pub to: f32,
    pub start: DateTime<Utc>,
    pub over: Duration,
}

impl GainRamp {
    /// A ramp that has already settled at `value`.
    pub fn settled(value: f32, at: DateTime<Utc>) -> Self {
        Self {
            from: value,
            to: value,
            start: at,
            over: Duration::ZERO,
        }
    }

    /// Gain at `now`. Before `start` the ramp holds `from`; after
    /// `start + over` it holds `to`.
    pub fn value_at(&self, now: DateTime<Utc>) -> f32 {
        if self.over.is_zero() {
            return self.to;
        }
        let elapsed = match (now - self.start).to_std() {
            Ok(elapsed) => elapsed,
            Err(_) => return self.from,
        };
        if elapsed >= self.over {
            return self.to;
        }
        let progress = elapsed.as_secs_f32() / self.over.as_secs_f32();
        self.from + (self.to - self.from) * progress
    }

    pub fn is_settled(&self, now: DateTime<Utc>) -> bool {
        self.value_at(now) == self.to
    }
}

// ============================================================================
// Virtual Output
// ============================================================================

#[derive(Debug)]
struct OutputState {
    /// Position at `anchor`, or the frozen position while paused.
    position: Duration,
    /// Wall-clock instant playback last (re)started; `None` while halted.
    anchor: Option<DateTime<Utc>>,
    /// Position of the last `TimeUpdate` report.
    last_report: Option<Duration>,
    gain: GainRamp,
}

struct OutputShared {
    duration: Duration,
    clock: Arc<dyn Clock>,
    update_interval: Duration,
    state: Mutex<OutputState>,
    listeners: RwLock<Vec<OutputListener>>,
}

impl OutputShared {
    fn position_at(&self, state: &OutputState, now: DateTime<Utc>) -> Duration {
        let position = match state.anchor {
            Some(anchor) => state.position + self.clock_since(anchor, now),
            None => state.position,
        };
        position.min(self.duration)
    }

    fn clock_since(&self, anchor: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        (now - anchor).to_std().unwrap_or(Duration::ZERO)
    }

    fn notify(&self, events: &[OutputEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read();
        for event in events {
            for listener in listeners.iter() {
                listener(*event);
            }
        }
    }
}

/// Output created by [`VirtualDevice`]. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct VirtualOutput {
    shared: Arc<OutputShared>,
}

impl std::fmt::Debug for VirtualOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualOutput")
            .field("duration", &self.shared.duration)
            .field("state", &*self.shared.state.lock())
            .finish()
    }
}

impl VirtualOutput {
    pub fn new(buffer: &PcmBuffer, clock: Arc<dyn Clock>, update_interval: Duration) -> Self {
        let now = clock.now();
        Self {
            shared: Arc::new(OutputShared {
                duration: buffer.duration(),
                clock,
                update_interval,
                state: Mutex::new(OutputState {
                    position: Duration::ZERO,
                    anchor: None,
                    last_report: None,
                    gain: GainRamp::settled(1.0, now),
                }),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn duration(&self) -> Duration {
        self.shared.duration
    }

    /// Advance to the clock's current time and dispatch any due events.
    ///
    /// Reaching the end of the buffer halts the output at its duration and
    /// emits a final `TimeUpdate` followed by `Ended`. Listeners run after
    /// the output's lock is released, so they may call back into it.
    pub fn tick(&self) {
        let shared = &self.shared;
        let now = shared.clock.now();
        let mut events = Vec::new();

        {
            let mut state = shared.state.lock();
            if state.anchor.is_none() {
                return;
            }
            let position = shared.position_at(&state, now);

            if position >= shared.duration {
                state.position = shared.duration;
                state.anchor = None;
                state.last_report = Some(shared.duration);
                events.push(OutputEvent::TimeUpdate(shared.duration));
                events.push(OutputEvent::Ended);
            } else {
                let due = match state.last_report {
                    Some(last) => position.saturating_sub(last) >= shared.update_interval,
                    None => true,
                };
                if due {
                    state.last_report = Some(position);
                    events.push(OutputEvent::TimeUpdate(position));
                }
            }
        }

        trace!(count = events.len(), "Virtual output tick");
        shared.notify(&events);
    }
}

impl AudioOutput for VirtualOutput {
    fn play(&self) -> BridgeResult<()> {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        if state.anchor.is_some() {
            return Ok(());
        }
        if state.position >= self.shared.duration {
            state.position = Duration::ZERO;
        }
        state.anchor = Some(now);
        state.last_report = None;
        Ok(())
    }

    fn pause(&self) -> BridgeResult<()> {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        state.position = self.shared.position_at(&state, now);
        state.anchor = None;
        Ok(())
    }

    fn seek(&self, position: Duration) -> BridgeResult<()> {
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        state.position = position.min(self.shared.duration);
        state.last_report = None;
        if state.anchor.is_some() {
            state.anchor = Some(now);
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        let now = self.shared.clock.now();
        let state = self.shared.state.lock();
        self.shared.position_at(&state, now)
    }

    fn is_playing(&self) -> bool {
        self.shared.state.lock().anchor.is_some()
    }

    fn ramp_gain(&self, target: f32, over: Duration) -> BridgeResult<()> {
        if !target.is_finite() || target < 0.0 {
            return Err(BridgeError::OperationFailed(format!(
                "Invalid gain target: {}",
                target
            )));
        }
        let now = self.shared.clock.now();
        let mut state = self.shared.state.lock();
        let from = state.gain.value_at(now);
        state.gain = GainRamp {
            from,
            to: target,
            start: now,
            over,
        };
        Ok(())
    }

    fn gain(&self) -> f32 {
        let now = self.shared.clock.now();
        self.shared.state.lock().gain.value_at(now)
    }

    fn subscribe(&self, listener: OutputListener) {
        self.shared.listeners.write().push(listener);
    }
}

// ============================================================================
// Virtual Device
// ============================================================================

/// Failure mode injected into [`VirtualDevice::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    Unavailable,
    PermissionDenied,
}

/// Headless device handing out clock-driven [`VirtualOutput`]s.
pub struct VirtualDevice {
    clock: Arc<dyn Clock>,
    update_interval: Duration,
    outputs: Mutex<Vec<Weak<OutputShared>>>,
    fault: Mutex<Option<DeviceFault>>,
}

impl std::fmt::Debug for VirtualDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDevice")
            .field("update_interval", &self.update_interval)
            .field("outputs", &self.outputs.lock().len())
            .field("fault", &*self.fault.lock())
            .finish()
    }
}

impl VirtualDevice {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            outputs: Mutex::new(Vec::new()),
            fault: Mutex::new(None),
        }
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Make subsequent `open` calls fail, or clear the fault with `None`.
    pub fn set_fault(&self, fault: Option<DeviceFault>) {
        *self.fault.lock() = fault;
    }

    /// Outputs still held by someone.
    pub fn outputs(&self) -> Vec<VirtualOutput> {
        let mut outputs = self.outputs.lock();
        outputs.retain(|weak| weak.strong_count() > 0);
        outputs
            .iter()
            .filter_map(Weak::upgrade)
            .map(|shared| VirtualOutput { shared })
            .collect()
    }

    /// Tick every live output.
    pub fn tick_all(&self) {
        for output in self.outputs() {
            output.tick();
        }
    }

    /// Poll [`tick_all`](Self::tick_all) on the Tokio runtime at the update
    /// interval until the device is dropped.
    pub fn spawn_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let device = Arc::downgrade(self);
        let period = self.update_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match device.upgrade() {
                    Some(device) => device.tick_all(),
                    None => break,
                }
            }
            debug!("Virtual device ticker stopped");
        })
    }
}

impl AudioDevice for VirtualDevice {
    fn open(&self, buffer: Arc<PcmBuffer>) -> BridgeResult<Box<dyn AudioOutput>> {
        match *self.fault.lock() {
            Some(DeviceFault::Unavailable) => {
                return Err(BridgeError::Device("Virtual device unavailable".to_string()))
            }
            Some(DeviceFault::PermissionDenied) => {
                return Err(BridgeError::PermissionDenied(
                    "Audio output not permitted".to_string(),
                ))
            }
            None => {}
        }

        let output = VirtualOutput::new(&buffer, Arc::clone(&self.clock), self.update_interval);
        self.outputs.lock().push(Arc::downgrade(&output.shared));
        debug!(duration = ?output.duration(), "Opened virtual output");
        Ok(Box::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(seconds: usize) -> (Arc<ManualClock>, VirtualOutput) {
        let clock = Arc::new(ManualClock::default());
        let buffer = PcmBuffer::silent(1, 1000 * seconds, 1000);
        let output = VirtualOutput::new(&buffer, clock.clone(), Duration::from_millis(250));
        (clock, output)
    }

    fn record(output: &VirtualOutput) -> Arc<Mutex<Vec<OutputEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        output.subscribe(Box::new(move |event| sink.lock().push(event)));
        events
    }

    #[test]
    fn test_gain_ramp_is_linear() {
        let start = Utc::now();
        let ramp = GainRamp {
            from: 1.0,
            to: 0.0,
            start,
            over: Duration::from_millis(100),
        };

        assert_eq!(ramp.value_at(start), 1.0);
        let mid = ramp.value_at(start + chrono::Duration::milliseconds(50));
        assert!((mid - 0.5).abs() < 1e-4);
        assert_eq!(ramp.value_at(start + chrono::Duration::milliseconds(100)), 0.0);
        assert_eq!(ramp.value_at(start - chrono::Duration::milliseconds(1)), 1.0);
        assert!(ramp.is_settled(start + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_position_follows_clock() {
        let (clock, output) = setup(10);

        output.play().unwrap();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(output.position(), Duration::from_millis(1500));

        output.pause().unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(output.position(), Duration::from_millis(1500));
        assert!(!output.is_playing());

        output.play().unwrap();
        clock.advance(Duration::from_millis(500));
        assert_eq!(output.position(), Duration::from_secs(2));
    }

    #[test]
    fn test_seek_keeps_play_state() {
        let (clock, output) = setup(10);

        output.play().unwrap();
        output.seek(Duration::from_secs(4)).unwrap();
        clock.advance(Duration::from_secs(1));
        assert!(output.is_playing());
        assert_eq!(output.position(), Duration::from_secs(5));

        output.seek(Duration::from_secs(60)).unwrap();
        assert_eq!(output.position(), Duration::from_secs(10));
    }

    #[test]
    fn test_tick_reports_time_at_interval() {
        let (clock, output) = setup(10);
        let events = record(&output);

        output.play().unwrap();
        output.tick();
        clock.advance(Duration::from_millis(100));
        output.tick();
        clock.advance(Duration::from_millis(200));
        output.tick();

        assert_eq!(
            *events.lock(),
            vec![
                OutputEvent::TimeUpdate(Duration::ZERO),
                OutputEvent::TimeUpdate(Duration::from_millis(300)),
            ]
        );
    }

    #[test]
    fn test_end_of_buffer_emits_ended_once() {
        let (clock, output) = setup(2);
        let events = record(&output);

        output.play().unwrap();
        clock.advance(Duration::from_secs(3));
        output.tick();
        output.tick();

        assert_eq!(
            *events.lock(),
            vec![
                OutputEvent::TimeUpdate(Duration::from_secs(2)),
                OutputEvent::Ended
            ]
        );
        assert!(!output.is_playing());
        assert_eq!(output.position(), Duration::from_secs(2));
    }

    #[test]
    fn test_listener_can_call_back_into_output() {
        let (clock, output) = setup(1);
        let inner = output.clone();
        output.subscribe(Box::new(move |event| {
            if event == OutputEvent::Ended {
                inner.seek(Duration::ZERO).unwrap();
            }
        }));

        output.play().unwrap();
        clock.advance(Duration::from_secs(2));
        output.tick();
        assert_eq!(output.position(), Duration::ZERO);
    }

    #[test]
    fn test_ramp_gain_starts_from_current_value() {
        let (clock, output) = setup(10);

        output.ramp_gain(0.0, Duration::from_millis(100)).unwrap();
        clock.advance(Duration::from_millis(50));
        output.ramp_gain(1.0, Duration::from_millis(100)).unwrap();
        assert!((output.gain() - 0.5).abs() < 1e-4);

        clock.advance(Duration::from_millis(100));
        assert_eq!(output.gain(), 1.0);

        assert!(output.ramp_gain(f32::NAN, Duration::ZERO).is_err());
    }

    #[test]
    fn test_play_after_end_restarts() {
        let (clock, output) = setup(1);
        output.play().unwrap();
        clock.advance(Duration::from_secs(2));
        output.tick();

        output.play().unwrap();
        assert_eq!(output.position(), Duration::ZERO);
    }

    #[test]
    fn test_device_fault_injection() {
        let device = VirtualDevice::new(Arc::new(ManualClock::default()));
        let buffer = Arc::new(PcmBuffer::silent(1, 10, 10));

        device.set_fault(Some(DeviceFault::PermissionDenied));
        assert!(matches!(
            device.open(buffer.clone()),
            Err(BridgeError::PermissionDenied(_))
        ));

        device.set_fault(Some(DeviceFault::Unavailable));
        let err = device.open(buffer.clone()).err().unwrap();
        assert!(err.is_device_error());

        device.set_fault(None);
        assert!(device.open(buffer).is_ok());
    }

    #[test]
    fn test_device_tracks_live_outputs() {
        let clock = Arc::new(ManualClock::default());
        let device = VirtualDevice::new(clock.clone());
        let buffer = Arc::new(PcmBuffer::silent(1, 1000, 1000));

        let first = device.open(buffer.clone()).unwrap();
        let second = device.open(buffer).unwrap();
        assert_eq!(device.outputs().len(), 2);

        drop(second);
        assert_eq!(device.outputs().len(), 1);

        let ended = Arc::new(Mutex::new(false));
        let flag = ended.clone();
        first.subscribe(Box::new(move |event| {
            if event == OutputEvent::Ended {
                *flag.lock() = true;
            }
        }));
        first.play().unwrap();
        clock.advance(Duration::from_secs(2));
        device.tick_all();
        assert!(*ended.lock());
    }
}
