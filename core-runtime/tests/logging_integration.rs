//! Integration tests for the global logging setup

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, redact_locator, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

// The global subscriber can only be installed once per process, so every
// global assertion lives in this one test.
#[test]
fn test_init_logging_mirrors_to_sink_once() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).expect("first initialization succeeds");

    let locator = "https://cdn.example.com/stems/bass.wav?token=secret";
    tracing::info!(
        target: "core_session",
        locator = %redact_locator(locator),
        "track loaded"
    );
    tracing::debug!(target: "symphonia", "probe details");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1, "symphonia is held at warn");
        let entry = &entries[0];
        assert_eq!(entry.message, "track loaded");
        assert_eq!(
            entry.fields.get("locator").map(String::as_str),
            Some("https://cdn.example.com/stems/bass.wav?[REDACTED]")
        );
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_invalid_filter_is_rejected_before_install() {
    let config = LoggingConfig::default().with_filter("core_session=loud");
    assert!(matches!(init_logging(config), Err(Error::Config(_))));
}
