//! Forwards `log` records to the client as DAP `output` events instead
//! of (or in addition to) stderr, so an attached IDE's debug console
//! shows adapter-side diagnostics without the user needing a second
//! terminal.
//!
//! Grounded on `src/ui/dap/logger.rs`'s `DapLogger`, which redirects
//! the teacher's own `log` records into its DAP output channel the
//! same way; the warn/error-always-stderr rule below is this core's
//! addition (spec's ambient-stack expansion), since a client debug
//! console conventionally colors `stderr`-category output differently
//! and warnings/errors should stand out regardless of the configured
//! log level.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::{Level, Log, Metadata, Record};

use crate::message::Event;

pub struct DapLogger {
    level: Level,
    queue: Mutex<VecDeque<Event>>,
}

impl DapLogger {
    pub fn new(level: Level) -> Self {
        DapLogger {
            level,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Installs this logger as the global `log` backend, returning a
    /// shared handle the protocol engine drains alongside backend
    /// events.
    pub fn install(level: Level) -> Result<&'static DapLogger, log::SetLoggerError> {
        let logger: &'static DapLogger = Box::leak(Box::new(DapLogger::new(level)));
        log::set_logger(logger)?;
        log::set_max_level(level.to_level_filter());
        Ok(logger)
    }

    pub fn drain(&self) -> Vec<Event> {
        self.queue.lock().unwrap().drain(..).collect()
    }
}

impl Log for DapLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level || metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // warn/error always surface as stderr output, regardless of
        // the configured level, so they aren't lost in a quiet console.
        let category = if record.level() <= Level::Warn { "stderr" } else { "console" };
        let text = format!("[{}] {}\n", record.target(), record.args());
        let event = Event::new("output", Some(serde_json::json!({"category": category, "output": text})));
        self.queue.lock().unwrap().push_back(event);
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_is_forwarded_even_at_error_level() {
        let logger = DapLogger::new(Level::Error);
        assert!(logger.enabled(&Metadata::builder().level(Level::Warn).target("t").build()));
    }

    #[test]
    fn info_is_suppressed_below_configured_level() {
        let logger = DapLogger::new(Level::Error);
        assert!(!logger.enabled(&Metadata::builder().level(Level::Info).target("t").build()));
    }

    #[test]
    fn drain_empties_the_queue() {
        let logger = DapLogger::new(Level::Info);
        logger.log(
            &Record::builder()
                .level(Level::Error)
                .target("t")
                .args(format_args!("boom"))
                .build(),
        );
        let events = logger.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].body.as_ref().unwrap()["category"], "stderr");
        assert!(logger.drain().is_empty());
    }
}
