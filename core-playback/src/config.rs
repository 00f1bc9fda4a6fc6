//! # Playback Configuration
//!
//! Tunables for the per-track playback graph, waveform resolution and the
//! session loader.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::waveform::DEFAULT_BIN_COUNT;

/// Engine tunables.
///
/// All fields have serde defaults so a partial document (or `{}`) produces a
/// usable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Number of bins in every track's RMS envelope.
    ///
    /// Default: 512.
    #[serde(default = "default_waveform_bins")]
    pub waveform_bins: usize,

    /// Duration of the linear gain ramp applied on mute/solo changes.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_gain_ramp")]
    pub gain_ramp: Duration,

    /// Gain used for inaudible tracks. Kept above zero so the ramp never
    /// targets an exact zero.
    ///
    /// Default: 0.00001.
    #[serde(default = "default_silence_floor")]
    pub silence_floor: f32,

    /// How often a clock-driven output reports its position while playing.
    ///
    /// Default: 250 ms.
    #[serde(default = "default_time_update_interval")]
    pub time_update_interval: Duration,

    /// Upper bound on tracks fetched and decoded at the same time.
    ///
    /// Default: 4.
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Number of applied commands retained for replay.
    ///
    /// Default: 256.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            waveform_bins: default_waveform_bins(),
            gain_ramp: default_gain_ramp(),
            silence_floor: default_silence_floor(),
            time_update_interval: default_time_update_interval(),
            max_concurrent_loads: default_max_concurrent_loads(),
            history_limit: default_history_limit(),
        }
    }
}

impl PlaybackConfig {
    pub fn with_waveform_bins(mut self, bins: usize) -> Self {
        self.waveform_bins = bins;
        self
    }

    pub fn with_gain_ramp(mut self, ramp: Duration) -> Self {
        self.gain_ramp = ramp;
        self
    }

    pub fn with_max_concurrent_loads(mut self, loads: usize) -> Self {
        self.max_concurrent_loads = loads;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.waveform_bins == 0 {
            return Err("waveform_bins must be > 0".to_string());
        }

        if !(self.silence_floor > 0.0 && self.silence_floor < 1.0) {
            return Err("silence_floor must be between 0.0 and 1.0 (exclusive)".to_string());
        }

        if self.time_update_interval.is_zero() {
            return Err("time_update_interval must be > 0".to_string());
        }

        if self.max_concurrent_loads == 0 {
            return Err("max_concurrent_loads must be > 0".to_string());
        }

        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_waveform_bins() -> usize {
    DEFAULT_BIN_COUNT
}

fn default_gain_ramp() -> Duration {
    Duration::from_millis(100)
}

fn default_silence_floor() -> f32 {
    0.00001
}

fn default_time_update_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_max_concurrent_loads() -> usize {
    4
}

fn default_history_limit() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.waveform_bins, 512);
        assert_eq!(config.gain_ramp, Duration::from_millis(100));
        assert_eq!(config.silence_floor, 0.00001);
        assert_eq!(config.max_concurrent_loads, 4);
        assert_eq!(config.history_limit, 256);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: PlaybackConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PlaybackConfig::default());

        let config: PlaybackConfig = serde_json::from_str(r#"{"waveform_bins": 64}"#).unwrap();
        assert_eq!(config.waveform_bins, 64);
        assert_eq!(config.time_update_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PlaybackConfig::default();

        config.waveform_bins = 0;
        assert!(config.validate().is_err());
        config.waveform_bins = 512;

        config.silence_floor = 0.0;
        assert!(config.validate().is_err());
        config.silence_floor = 1.0;
        assert!(config.validate().is_err());
        config.silence_floor = 0.00001;

        config.time_update_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.time_update_interval = Duration::from_millis(250);

        config.max_concurrent_loads = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_loads = 1;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = PlaybackConfig::default()
            .with_waveform_bins(128)
            .with_gain_ramp(Duration::from_millis(20))
            .with_max_concurrent_loads(2)
            .with_history_limit(0);

        assert_eq!(config.waveform_bins, 128);
        assert_eq!(config.gain_ramp, Duration::from_millis(20));
        assert_eq!(config.max_concurrent_loads, 2);
        assert_eq!(config.history_limit, 0);
        assert!(config.validate().is_ok());
    }
}
