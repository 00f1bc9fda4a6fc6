//! # Track Loader
//!
//! Fetches and decodes track audio. Loads run concurrently, bounded by a
//! semaphore, and every request carries the source generation it was issued
//! under so the coordinator can drop results that arrive after the source
//! set changed.

use bridge_traits::ByteSource;
use core_playback::{AudioDecoder, DecodedAudio, PlaybackError};
use core_runtime::logging::redact_locator;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::track::TrackKey;

/// One track to fetch and decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub key: TrackKey,
    pub locator: String,
    pub generation: u64,
}

/// Result of a [`LoadRequest`].
#[derive(Debug)]
pub struct LoadOutcome {
    pub key: TrackKey,
    pub generation: u64,
    pub result: Result<DecodedAudio, PlaybackError>,
}

pub struct TrackLoader {
    source: Arc<dyn ByteSource>,
    decoder: Arc<dyn AudioDecoder>,
    permits: Arc<Semaphore>,
}

impl TrackLoader {
    pub fn new(
        source: Arc<dyn ByteSource>,
        decoder: Arc<dyn AudioDecoder>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            source,
            decoder,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Fetch and decode one locator.
    ///
    /// Byte-source failures map to `PlaybackError::Fetch`; everything the
    /// decoder rejects keeps its decode classification.
    #[instrument(skip(self), fields(locator = %redact_locator(locator)))]
    pub async fn load(&self, locator: &str) -> Result<DecodedAudio, PlaybackError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| PlaybackError::Internal(format!("Load queue closed: {}", e)))?;

        let bytes = self
            .source
            .fetch(locator)
            .await
            .map_err(PlaybackError::from_source)?;
        debug!(bytes = bytes.len(), "Fetched track bytes");

        let decoded = self.decoder.decode(bytes, Some(locator)).await?;
        debug!(
            frames = decoded.buffer.length(),
            sample_rate = decoded.format.sample_rate,
            "Decoded track"
        );
        Ok(decoded)
    }

    /// Load every request concurrently. Outcomes keep request order; one
    /// failure never affects the others.
    pub async fn load_all(&self, requests: Vec<LoadRequest>) -> Vec<LoadOutcome> {
        let loads = requests.into_iter().map(|request| async move {
            let result = self.load(&request.locator).await;
            if let Err(e) = &result {
                warn!(
                    track = %request.key,
                    locator = %redact_locator(&request.locator),
                    "Track failed to load: {}",
                    e
                );
            }
            LoadOutcome {
                key: request.key,
                generation: request.generation,
                result,
            }
        });

        join_all(loads).await
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
