//! `mailsift`: email ingestion, deduplication and template classification.
//!
//! This crate parses raw RFC 5322/MIME messages (header folding, RFC 2047
//! encoded words, quoted-printable and base64 bodies, `multipart/alternative`
//! splitting), stores them keyed by `Message-ID` while keeping the copy that
//! crossed the fewest relays, and classifies stored messages against an
//! ordered catalog of subject templates.

pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod source;
pub mod store;

pub use classify::{Catalog, Classification};
pub use error::{ClassifyError, MailError, Result};
pub use ingest::{ImportOutcome, ImportStats, Importer};
pub use model::{Email, Header, StoredEmail};
pub use source::IncomingMessage;
pub use store::EmailStore;
