//! Persisted message log.
//!
//! Records are free text and never reference accounts. The log only grows;
//! nothing mutates or deletes a record once written.

pub mod log;

pub use log::{MessageLog, StorageError};

use serde::{Deserialize, Serialize};

/// One submitted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub from: String,
    pub to: String,
    pub message: String,
}

/// Result of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub count: u64,
    /// Most recent record; `None` for an empty log.
    pub last: Option<MessageRecord>,
}
