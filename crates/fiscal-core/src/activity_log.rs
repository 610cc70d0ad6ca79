use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

pub const ACTIVITY_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator-visible event. Fields are read-only once the entry exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    id: u64,
    occurred_at: DateTime<Utc>,
    severity: Severity,
    message: String,
}

impl LogEntry {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Bounded newest-first log. Appending past capacity evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    last_id: u64,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(ACTIVITY_LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            last_id: 0,
        }
    }

    pub fn append(&mut self, severity: Severity, message: impl Into<String>) -> u64 {
        self.append_at(severity, message, Utc::now())
    }

    /// Ids come from the creation time in milliseconds, bumped when two entries
    /// land in the same millisecond so they stay strictly increasing.
    pub fn append_at(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> u64 {
        let millis = u64::try_from(occurred_at.timestamp_millis()).unwrap_or(0);
        let id = millis.max(self.last_id.saturating_add(1));
        self.last_id = id;
        self.entries.push_front(LogEntry {
            id,
            occurred_at,
            severity,
            message: message.into(),
        });
        self.entries.truncate(self.capacity);
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}
