//! # Host Bridge Traits
//!
//! Capabilities the multitrack engine needs from its host but cannot provide
//! itself.
//!
//! ## Overview
//!
//! This crate defines the contract between the engine and platform-specific
//! implementations. Each trait is a capability that must be implemented
//! differently per host (desktop, embedded player, browser shell).
//!
//! ## Traits
//!
//! ### Sources
//! - [`ByteSource`](source::ByteSource) - Fetch the raw, still-encoded bytes behind a track locator
//!
//! ### Audio output
//! - [`AudioDevice`](playback::AudioDevice) - Opens one output per decoded track buffer
//! - [`AudioOutput`](playback::AudioOutput) - Transport control, gain ramps and device callbacks
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The engine refuses to build a session when a required capability is
//! missing, rather than failing later on first playback:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .audio_device(Arc::new(MyDevice::default()))
//!     .build()?; // CapabilityMissing if no ByteSource and no desktop shims
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the message actionable
//! (include the locator, the HTTP status, the device name).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so one implementation can be shared
//! across the loader tasks of every track in a session.

pub mod error;
pub mod playback;
pub mod source;
pub mod time;

pub use error::BridgeError;

pub use playback::{AudioDevice, AudioOutput, OutputEvent, OutputListener, PcmBuffer};
pub use source::ByteSource;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
