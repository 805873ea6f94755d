//! Bulk ingestion: sender/date policy, deduplication against the store and
//! listener notification.

pub mod import;
pub mod listeners;
pub mod merge;
pub mod policy;
pub mod stats;

pub use import::{Completion, ImportListener, ImportOptions, Importer, ListenerFactory, MalformedPolicy};
pub use merge::DedupEngine;
pub use policy::SenderPolicy;
pub use stats::ImportStats;

use serde::Serialize;

/// What the dedup engine did with one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    /// First time this Message-ID was seen.
    Inserted,
    /// Stored content was swapped for a copy with fewer relay hops.
    Replaced,
    /// Already stored with no fewer hops; only the pids were merged.
    Retained,
    /// Rejected by the sender/date policy. Nothing was written.
    Ignored,
}

impl ImportOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Retained => "retained",
            Self::Ignored => "ignored",
        }
    }

    /// Whether listeners hear about this outcome.
    pub fn notifies_listeners(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

impl std::fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
