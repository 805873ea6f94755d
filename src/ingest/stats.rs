//! Per-outcome import counters.

use serde::Serialize;

use crate::ingest::ImportOutcome;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub inserted: u64,
    pub replaced: u64,
    pub retained: u64,
    pub ignored: u64,
    /// Malformed messages skipped under `on_malformed = "skip"`.
    pub failed: u64,
}

impl ImportStats {
    pub fn record(&mut self, outcome: ImportOutcome) {
        *self.counter_mut(outcome) += 1;
    }

    pub fn get(&self, outcome: ImportOutcome) -> u64 {
        match outcome {
            ImportOutcome::Inserted => self.inserted,
            ImportOutcome::Replaced => self.replaced,
            ImportOutcome::Retained => self.retained,
            ImportOutcome::Ignored => self.ignored,
        }
    }

    /// Messages seen, including failed ones.
    pub fn total(&self) -> u64 {
        self.inserted + self.replaced + self.retained + self.ignored + self.failed
    }

    /// Sum another batch into this one.
    pub fn merge(&mut self, other: ImportStats) {
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.retained += other.retained;
        self.ignored += other.ignored;
        self.failed += other.failed;
    }

    fn counter_mut(&mut self, outcome: ImportOutcome) -> &mut u64 {
        match outcome {
            ImportOutcome::Inserted => &mut self.inserted,
            ImportOutcome::Replaced => &mut self.replaced,
            ImportOutcome::Retained => &mut self.retained,
            ImportOutcome::Ignored => &mut self.ignored,
        }
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "inserted: {}, replaced: {}, retained: {}, ignored: {}",
            self.inserted, self.replaced, self.retained, self.ignored
        )?;
        if self.failed > 0 {
            write!(f, ", failed: {}", self.failed)?;
        }
        Ok(())
    }
}
