//! # Core Configuration Module
//!
//! Dependency injection for the session engine.
//!
//! ## Overview
//!
//! A [`CoreConfig`] carries every host bridge the engine talks to. It is
//! built with [`CoreConfigBuilder`], which fails fast with an actionable
//! [`Error::CapabilityMissing`] when a required bridge is absent.
//!
//! ## Required Dependencies
//!
//! - `AudioDevice` - opens one output per decoded track buffer
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `ByteSource` - fetches encoded audio (desktop default: `DesktopByteSource`,
//!   files via tokio fs and URLs via reqwest)
//! - `Clock` - time source (default: `SystemClock`)
//! - `LoggerSink` - host log mirror (default: none)
//!
//! When the `desktop-shims` feature is enabled the desktop byte source is
//! injected automatically if none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .audio_device(Arc::new(my_device))
//!     .source_root("/home/ana/sessions/demo")
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{AudioDevice, ByteSource, Clock, LoggerSink, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Largest accepted event buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Bridges and runtime settings for one engine instance.
#[derive(Clone)]
pub struct CoreConfig {
    /// Fetches encoded track bytes
    pub byte_source: Arc<dyn ByteSource>,

    /// Opens playback outputs (required)
    pub audio_device: Arc<dyn AudioDevice>,

    pub clock: Arc<dyn Clock>,

    /// Optional host log mirror, passed to `LoggingConfig` by the host
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Directory relative file locators resolve against
    pub source_root: Option<PathBuf>,

    /// Per-subscriber buffer of the session event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("byte_source", &"<dyn ByteSource>")
            .field("audio_device", &"<dyn AudioDevice>")
            .field("logger_sink", &self.logger_sink.is_some())
            .field("source_root", &self.source_root)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates settings that do not depend on bridges.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        if let Some(root) = &self.source_root {
            if root.as_os_str().is_empty() {
                return Err(Error::Config("Source root cannot be empty".to_string()));
            }
        }

        Ok(())
    }
}

fn audio_device_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AudioDevice".to_string(),
        message: "AudioDevice implementation is required to play tracks. \
                 Desktop: inject a native output device. \
                 Headless/tests: inject core_playback::output::VirtualDevice."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn byte_source_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "ByteSource".to_string(),
        message: "ByteSource implementation is required to load track audio. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default DesktopByteSource. \
                 Other hosts: inject a source backed by the platform's file and network APIs."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_byte_source(root: Option<&PathBuf>) -> Result<Arc<dyn ByteSource>> {
    use bridge_desktop::DesktopByteSource;

    let source = match root {
        Some(root) => DesktopByteSource::with_root(root.clone()),
        None => DesktopByteSource::new(),
    }
    .map_err(|e| Error::Internal(format!("Failed to initialize default ByteSource: {}", e)))?;

    let source: Arc<dyn ByteSource> = Arc::new(source);
    Ok(source)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_byte_source(_root: Option<&PathBuf>) -> Result<Arc<dyn ByteSource>> {
    Err(byte_source_missing_error())
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    byte_source: Option<Arc<dyn ByteSource>>,
    audio_device: Option<Arc<dyn AudioDevice>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    source_root: Option<PathBuf>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn byte_source(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.byte_source = Some(source);
        self
    }

    /// Sets the audio device implementation (required).
    pub fn audio_device(mut self, device: Arc<dyn AudioDevice>) -> Self {
        self.audio_device = Some(device);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Directory relative file locators resolve against. Only consulted when
    /// the default desktop byte source is injected.
    pub fn source_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.source_root = Some(root.into());
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] if no `AudioDevice` was provided, or no
    ///   `ByteSource` was provided and `desktop-shims` is disabled
    /// - [`Error::Config`] if a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let audio_device = self.audio_device.ok_or_else(audio_device_missing_error)?;

        let byte_source = match self.byte_source {
            Some(source) => source,
            None => provide_default_byte_source(self.source_root.as_ref())?,
        };

        let config = CoreConfig {
            byte_source,
            audio_device,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            source_root: self.source_root,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{AudioOutput, BridgeError, PcmBuffer};
    use bytes::Bytes;

    struct NullDevice;

    impl AudioDevice for NullDevice {
        fn open(
            &self,
            _buffer: Arc<PcmBuffer>,
        ) -> std::result::Result<Box<dyn AudioOutput>, BridgeError> {
            Err(BridgeError::NotAvailable("null device".to_string()))
        }
    }

    struct EmptySource;

    #[async_trait]
    impl ByteSource for EmptySource {
        async fn fetch(&self, _locator: &str) -> std::result::Result<Bytes, BridgeError> {
            Ok(Bytes::new())
        }
    }

    #[test]
    fn test_builder_requires_audio_device() {
        let result = CoreConfig::builder()
            .byte_source(Arc::new(EmptySource))
            .build();

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityMissing { ref capability, .. } if capability == "AudioDevice"
        ));
        assert!(err.to_string().contains("VirtualDevice"));
    }

    #[test]
    fn test_build_with_explicit_bridges() {
        let config = CoreConfig::builder()
            .byte_source(Arc::new(EmptySource))
            .audio_device(Arc::new(NullDevice))
            .event_buffer_size(32)
            .build()
            .unwrap();

        assert_eq!(config.event_buffer_size, 32);
        assert!(config.logger_sink.is_none());
        assert!(config.source_root.is_none());
    }

    #[test]
    fn test_default_event_buffer_size() {
        let config = CoreConfig::builder()
            .byte_source(Arc::new(EmptySource))
            .audio_device(Arc::new(NullDevice))
            .build()
            .unwrap();

        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_rejects_zero_event_buffer() {
        let result = CoreConfig::builder()
            .byte_source(Arc::new(EmptySource))
            .audio_device(Arc::new(NullDevice))
            .event_buffer_size(0)
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_oversized_event_buffer() {
        let result = CoreConfig::builder()
            .byte_source(Arc::new(EmptySource))
            .audio_device(Arc::new(NullDevice))
            .event_buffer_size(MAX_EVENT_BUFFER_SIZE + 1)
            .build();

        assert!(result.unwrap_err().to_string().contains("maximum"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_byte_source_without_shims() {
        let result = CoreConfig::builder()
            .audio_device(Arc::new(NullDevice))
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("ByteSource"));
        assert!(err_msg.contains("desktop-shims"));
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_build_with_desktop_byte_source() {
        let root = std::env::temp_dir().join(format!("core-runtime-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("click.raw"), [1u8, 2, 3]).unwrap();

        let config = CoreConfig::builder()
            .audio_device(Arc::new(NullDevice))
            .source_root(&root)
            .build()
            .unwrap();

        let bytes = config.byte_source.fetch("click.raw").await.unwrap();
        assert_eq!(bytes.len(), 3);
    }
}
