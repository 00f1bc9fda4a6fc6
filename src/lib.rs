//! Workspace facade crate.
//!
//! Exposes feature flags that map onto the individual workspace crates
//! (`core-session`, `core-playback`, `core-runtime`) so host applications can
//! depend on `multitrek-workspace` and enable what they need without wiring
//! each crate by hand.

#[cfg(any(feature = "desktop-shims", feature = "http-sources"))]
pub use core_session as session;

#[cfg(feature = "playback")]
pub use core_playback as playback;

#[cfg(feature = "runtime")]
pub use core_runtime as runtime;
