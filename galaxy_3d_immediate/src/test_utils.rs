//! Shared helpers for unit tests

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};
use crate::log::{LogEntry, Logger, LogSeverity};

/// Logger that stores every entry for later inspection
///
/// Only entries emitted from the thread that created the logger are kept, so
/// tests running in parallel cannot pollute each other's captures.
#[derive(Clone)]
pub struct CaptureLogger {
    owner: ThreadId,
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CaptureLogger {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn count(&self, severity: LogSeverity) -> usize {
        self.entries.lock().unwrap().iter().filter(|e| e.severity == severity).count()
    }
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        if thread::current().id() != self.owner {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
    }
}
