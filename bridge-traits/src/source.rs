//! Byte Source Abstraction
//!
//! Fetches the encoded bytes behind a track locator (file path, URL, ...).
//! Decoding is not the source's concern; it hands back the whole payload.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Fetch raw, still-encoded audio bytes for a locator.
///
/// Implementations must read the payload fully into memory. Callers run one
/// fetch per track concurrently, so implementations must not serialize
/// requests behind a single lock.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::source::ByteSource;
///
/// async fn load(source: &dyn ByteSource) -> bridge_traits::error::Result<usize> {
///     let bytes = source.fetch("stems/drums.wav").await?;
///     Ok(bytes.len())
/// }
/// ```
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read every byte behind `locator`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::NotFound`](crate::BridgeError::NotFound) when nothing exists at the locator
    /// - [`BridgeError::OperationFailed`](crate::BridgeError::OperationFailed) for transport failures
    /// - [`BridgeError::Io`](crate::BridgeError::Io) for local I/O failures
    async fn fetch(&self, locator: &str) -> Result<Bytes>;

    /// Whether this source knows how to resolve `locator` at all.
    ///
    /// Routing sources use this to pick a delegate; the default accepts
    /// everything.
    fn handles(&self, _locator: &str) -> bool {
        true
    }
}
