//! # Desktop Bridge Implementations
//!
//! Default byte sources for desktop platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - [`FileByteSource`] reads local paths and `file://` URLs with `tokio::fs`
//! - [`HttpByteSource`] fetches `http(s)://` locators with `reqwest`, retrying
//!   transient failures with exponential backoff
//! - [`DesktopByteSource`] routes each locator to whichever of the two
//!   handles it
//!
//! ## Feature Flags
//!
//! - `http`: Enable the reqwest-backed remote source (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::DesktopByteSource;
//! use bridge_traits::ByteSource;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = DesktopByteSource::new().unwrap();
//!     let bytes = source.fetch("stems/drums.wav").await.unwrap();
//! }
//! ```

mod filesystem;
#[cfg(feature = "http")]
mod http;

pub use filesystem::FileByteSource;
#[cfg(feature = "http")]
pub use http::{HttpByteSource, RetryPolicy};

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    source::ByteSource,
};
use bytes::Bytes;
use std::path::PathBuf;

/// Routes locators to the file or HTTP source.
pub struct DesktopByteSource {
    file: FileByteSource,
    #[cfg(feature = "http")]
    http: HttpByteSource,
}

impl DesktopByteSource {
    pub fn new() -> Result<Self> {
        Self::build(FileByteSource::new())
    }

    /// Resolve relative file locators against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Result<Self> {
        Self::build(FileByteSource::with_root(root))
    }

    fn build(file: FileByteSource) -> Result<Self> {
        Ok(Self {
            file,
            #[cfg(feature = "http")]
            http: HttpByteSource::new()?,
        })
    }
}

#[async_trait]
impl ByteSource for DesktopByteSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        #[cfg(feature = "http")]
        if self.http.handles(locator) {
            return self.http.fetch(locator).await;
        }

        if self.file.handles(locator) {
            return self.file.fetch(locator).await;
        }

        Err(BridgeError::NotAvailable(format!(
            "no byte source for locator: {}",
            locator
        )))
    }

    fn handles(&self, locator: &str) -> bool {
        #[cfg(feature = "http")]
        if self.http.handles(locator) {
            return true;
        }
        self.file.handles(locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_scheme_is_rejected() {
        let source = DesktopByteSource::new().unwrap();
        assert!(!source.handles("s3://bucket/stem.wav"));

        let err = source.fetch("s3://bucket/stem.wav").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotAvailable(_)));
    }

    #[tokio::test]
    async fn test_routes_paths_to_file_source() {
        let source = DesktopByteSource::new().unwrap();
        let err = source.fetch("/missing/stem.wav").await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }
}
