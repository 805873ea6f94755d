//! Built-in import listeners.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::classify::Catalog;
use crate::ingest::import::{Completion, ImportListener, ListenerFactory};
use crate::ingest::ImportOutcome;
use crate::model::email::Email;

/// Logs every accepted message at `info` level.
#[derive(Debug, Default)]
pub struct LogListener {
    seen: u64,
}

impl LogListener {
    pub fn factory() -> ListenerFactory {
        Box::new(|| Box::new(LogListener::default()) as Box<dyn ImportListener>)
    }
}

impl ImportListener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    fn on_email(&mut self, email: &Email, outcome: ImportOutcome) -> anyhow::Result<()> {
        self.seen += 1;
        info!(
            %outcome,
            id = email.message_id().unwrap_or_default(),
            subject = email.subject(),
            "Accepted message"
        );
        Ok(())
    }

    fn on_end(&mut self) -> Completion {
        info!(messages = self.seen, "Log listener done");
        Completion::Finished
    }
}

/// Label used for messages no template could classify.
pub const UNCLASSIFIED: &str = "(unclassified)";

/// Counts accepted messages per classification type, shared with the
/// caller through a [`TallyHandle`].
pub type TallyHandle = Arc<Mutex<BTreeMap<String, u64>>>;

/// Classifies every accepted message and tallies the results.
pub struct ClassificationTally {
    catalog: Arc<Catalog>,
    counts: BTreeMap<String, u64>,
    shared: TallyHandle,
}

impl ClassificationTally {
    /// A factory plus the handle the totals are published to when each batch
    /// ends.
    pub fn factory(catalog: Arc<Catalog>) -> (ListenerFactory, TallyHandle) {
        let shared = TallyHandle::default();
        let handle = Arc::clone(&shared);
        let factory: ListenerFactory = Box::new(move || {
            Box::new(ClassificationTally {
                catalog: Arc::clone(&catalog),
                counts: BTreeMap::new(),
                shared: Arc::clone(&shared),
            }) as Box<dyn ImportListener>
        });
        (factory, handle)
    }
}

impl ImportListener for ClassificationTally {
    fn name(&self) -> &str {
        "classification-tally"
    }

    fn on_email(&mut self, email: &Email, _outcome: ImportOutcome) -> anyhow::Result<()> {
        let label = match email.classify(&self.catalog) {
            Ok(classification) => classification.kind,
            Err(_) => UNCLASSIFIED.to_string(),
        };
        *self.counts.entry(label).or_default() += 1;
        Ok(())
    }

    fn on_end(&mut self) -> Completion {
        let Ok(mut shared) = self.shared.lock() else {
            return Completion::Pending;
        };
        for (label, count) in std::mem::take(&mut self.counts) {
            *shared.entry(label).or_default() += count;
        }
        Completion::Finished
    }
}
