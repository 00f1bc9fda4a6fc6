//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the engine crates:
//! - Logging and tracing setup ([`logging`])
//! - Bridge injection and validation ([`config`])
//! - The session event bus ([`events`])
//!
//! ## Overview
//!
//! Nothing in this crate knows about tracks or transports. It establishes
//! the logging conventions and event broadcasting that `core-playback` and
//! `core-session` build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
