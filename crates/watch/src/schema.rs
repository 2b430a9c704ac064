use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Local wall-clock format used for `last_updated`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One detected change.  Serialized with the historical key names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    #[serde(rename = "headlines", default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub last_updated: String,
}

impl UpdateRecord {
    pub fn new(labels: Vec<String>, at: DateTime<Local>) -> Self {
        Self {
            labels,
            last_updated: at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// The whole durable state: the last fingerprint seen plus the change history
/// in chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogState {
    #[serde(rename = "last_hash", default)]
    pub last_fingerprint: String,
    #[serde(default)]
    pub updates: Vec<UpdateRecord>,
}

impl LogState {
    pub fn latest(&self) -> Option<&UpdateRecord> {
        self.updates.last()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fingerprint.is_empty() && self.updates.is_empty()
    }

    /// Push `record` and move `last_fingerprint` forward.  With a non-zero
    /// `max_updates` the oldest records are dropped so at most that many
    /// remain.
    pub fn push(&mut self, fingerprint: String, record: UpdateRecord, max_updates: usize) {
        self.updates.push(record);
        self.last_fingerprint = fingerprint;

        if max_updates > 0 && self.updates.len() > max_updates {
            let excess = self.updates.len() - max_updates;
            self.updates.drain(..excess);
        }
    }
}
