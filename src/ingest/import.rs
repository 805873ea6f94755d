//! Batch import with listener notification.
//!
//! A batch runs in three strict phases:
//!
//! 1. every registered [`ListenerFactory`] builds a fresh listener, which is
//!    primed with [`ImportListener::on_begin`];
//! 2. messages are consumed in order, each one parsed and run through the
//!    [`DedupEngine`]; inserted and replaced messages are handed to every
//!    primed listener, one after the other;
//! 3. after the last message each listener is finalized once with
//!    [`ImportListener::on_end`].
//!
//! The store is opened for writing once for the whole batch. A listener
//! that fails is logged and skipped; it never stops the batch.

use tracing::{debug, error, info, warn};

use crate::config::{ImportConfig, OnMalformed};
use crate::error::Result;
use crate::ingest::merge::DedupEngine;
use crate::ingest::stats::ImportStats;
use crate::ingest::ImportOutcome;
use crate::model::email::Email;
use crate::source::IncomingMessage;
use crate::store::EmailStore;

/// Whether a listener wrapped up its work when the batch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Finished,
    /// Still expecting messages. Reported as misbehaving.
    Pending,
}

/// An observer of accepted messages during one batch.
pub trait ImportListener {
    fn name(&self) -> &str;

    /// Called once before the first message.
    fn on_begin(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for every inserted or replaced message.
    fn on_email(&mut self, email: &Email, outcome: ImportOutcome) -> anyhow::Result<()>;

    /// Called once after the last message.
    fn on_end(&mut self) -> Completion {
        Completion::Finished
    }
}

/// Builds one listener per batch.
pub type ListenerFactory = Box<dyn Fn() -> Box<dyn ImportListener>>;

/// Handling of messages that fail to parse or cannot be keyed.
pub type MalformedPolicy = OnMalformed;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    pub on_malformed: MalformedPolicy,
}

impl From<&ImportConfig> for ImportOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            on_malformed: config.on_malformed,
        }
    }
}

pub struct Importer {
    engine: DedupEngine,
    listeners: Vec<ListenerFactory>,
    options: ImportOptions,
}

impl Importer {
    pub fn new(engine: DedupEngine) -> Self {
        Self {
            engine,
            listeners: Vec::new(),
            options: ImportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a listener factory for subsequent batches.
    pub fn register<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn ImportListener> + 'static,
    {
        self.listeners.push(Box::new(factory));
        self
    }

    pub fn engine(&self) -> &DedupEngine {
        &self.engine
    }

    /// Import `messages` into `store`.
    ///
    /// `progress` receives the number of messages handled so far. Under
    /// [`OnMalformed::Abort`] the first malformed message ends the batch
    /// with an error naming its source; what was written before it is kept.
    /// Other errors (I/O on the store) always end the batch.
    pub fn import<I>(
        &self,
        store: &mut EmailStore,
        messages: I,
        progress: Option<&dyn Fn(u64)>,
    ) -> Result<ImportStats>
    where
        I: IntoIterator<Item = IncomingMessage>,
    {
        self.import_stream(store, messages.into_iter().map(Ok), progress)
    }

    /// Like [`Importer::import`], for sources that read lazily and can fail.
    ///
    /// Messages are pulled one at a time. A source error ends the batch like
    /// a store error does, whatever the malformed-message policy.
    pub fn import_stream<I>(
        &self,
        store: &mut EmailStore,
        messages: I,
        progress: Option<&dyn Fn(u64)>,
    ) -> Result<ImportStats>
    where
        I: IntoIterator<Item = Result<IncomingMessage>>,
    {
        let mut active = self.prime_listeners();
        let mut writer = store.write();
        let mut stats = ImportStats::default();
        let mut processed: u64 = 0;

        for message in messages {
            let message = message?;
            let ts = chrono::Utc::now().timestamp_millis();
            let result = Email::parse(&message.contents).and_then(|email| {
                let outcome = self.engine.ingest(
                    &mut writer,
                    &email,
                    &message.filename,
                    message.processing_id.as_deref(),
                    ts,
                )?;
                Ok((email, outcome))
            });

            match result {
                Ok((email, outcome)) => {
                    stats.record(outcome);
                    if outcome.notifies_listeners() {
                        dispatch(&mut active, &email, outcome);
                    }
                }
                Err(e)
                    if e.is_malformed() && self.options.on_malformed == OnMalformed::Skip =>
                {
                    warn!(filename = %message.filename, error = %e, "Skipping malformed message");
                    stats.failed += 1;
                }
                Err(e) => return Err(e.in_message(message.filename)),
            }

            processed += 1;
            if let Some(cb) = progress {
                cb(processed);
            }
        }

        finalize_listeners(active);
        writer.finish()?;
        info!(%stats, "Import complete");
        Ok(stats)
    }

    fn prime_listeners(&self) -> Vec<Box<dyn ImportListener>> {
        let mut active = Vec::with_capacity(self.listeners.len());
        for factory in &self.listeners {
            let mut listener = factory();
            match listener.on_begin() {
                Ok(()) => {
                    debug!(listener = listener.name(), "Listener primed");
                    active.push(listener);
                }
                Err(e) => {
                    error!(listener = listener.name(), error = %e, "Listener failed to start");
                }
            }
        }
        active
    }
}

fn dispatch(active: &mut [Box<dyn ImportListener>], email: &Email, outcome: ImportOutcome) {
    for listener in active.iter_mut() {
        if let Err(e) = listener.on_email(email, outcome) {
            error!(
                listener = listener.name(),
                id = email.message_id().unwrap_or_default(),
                error = %e,
                "Listener failed"
            );
        }
    }
}

fn finalize_listeners(active: Vec<Box<dyn ImportListener>>) {
    for mut listener in active {
        if listener.on_end() == Completion::Pending {
            warn!(listener = listener.name(), "Listener did not finish at end of import");
        }
    }
}
