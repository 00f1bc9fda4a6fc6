//! Byte source backed by the local file system (Tokio).

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    source::ByteSource,
};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const FILE_SCHEME: &str = "file://";

/// Tokio-based file byte source
///
/// Locators are plain paths or `file://` URLs. Relative paths resolve against
/// an optional root directory (typically the session's project folder).
#[derive(Debug, Clone, Default)]
pub struct FileByteSource {
    root: Option<PathBuf>,
}

impl FileByteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative locators against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        let raw = locator.strip_prefix(FILE_SCHEME).unwrap_or(locator);
        let path = Path::new(raw);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn map_io_error(path: &Path, e: std::io::Error) -> BridgeError {
        match e.kind() {
            ErrorKind::NotFound => BridgeError::NotFound(path.display().to_string()),
            ErrorKind::PermissionDenied => {
                BridgeError::PermissionDenied(path.display().to_string())
            }
            _ => BridgeError::Io(e),
        }
    }
}

#[async_trait]
impl ByteSource for FileByteSource {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        let path = self.resolve(locator);
        let data = fs::read(&path)
            .await
            .map_err(|e| Self::map_io_error(&path, e))?;
        debug!(path = ?path, bytes = data.len(), "Read audio source from disk");
        Ok(Bytes::from(data))
    }

    fn handles(&self, locator: &str) -> bool {
        !locator.contains("://") || locator.starts_with(FILE_SCHEME)
    }
}
