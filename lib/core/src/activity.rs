//! Activity log seam.
//!
//! The authentication flow records what it did to an [`ActivityLog`]
//! (user created, user re-bound, login, error redirect, ...). Production
//! wiring emits these as `tracing` events; tests capture them in memory.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Receives activity records from the authentication flow.
pub trait ActivityLog: Send + Sync {
    /// Records one activity of the given kind.
    fn record(&self, kind: &str, message: &str);
}

/// Emits activity records as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, kind: &str, message: &str) {
        tracing::info!(target: "stan_easy_connect::activity", kind, "{message}");
    }
}

/// One captured activity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub kind: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Keeps activity records in memory.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
}

impl MemoryActivityLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every record so far.
    #[must_use]
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Returns true if a record of `kind` was captured.
    #[must_use]
    pub fn contains_kind(&self, kind: &str) -> bool {
        self.entries().iter().any(|entry| entry.kind == kind)
    }
}

impl ActivityLog for MemoryActivityLog {
    fn record(&self, kind: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(ActivityEntry {
                kind: kind.to_string(),
                message: message.to_string(),
                recorded_at: Utc::now(),
            });
        }
    }
}
