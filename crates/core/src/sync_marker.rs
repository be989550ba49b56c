//! The loop-prevention marker carried by derived writes.
//!
//! A write produced by the block/task synchronizer is tagged with the side
//! it writes *to*. When that write's own event comes back over the bus the
//! synchronizer sees the tag and drops the event.

use std::fmt;

use serde::{Deserialize, Serialize};

/// JSON key under which the marker travels, both in entity metadata and at
/// the top level of event payloads.
pub const SYNC_SOURCE_KEY: &str = "_sync_source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    Block,
    Task,
}

impl SyncSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncSource::Block => "block",
            SyncSource::Task => "task",
        }
    }
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
