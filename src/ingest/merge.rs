//! Deduplication of incoming messages against the record store.
//!
//! Copies of one message that reached us through different relays share a
//! `Message-ID` but differ in their `Received` trail. The copy with the
//! fewest hops is kept; every copy contributes its processing IDs.

use tracing::debug;

use crate::error::Result;
use crate::ingest::policy::SenderPolicy;
use crate::ingest::ImportOutcome;
use crate::model::email::Email;
use crate::model::stored::StoredEmail;
use crate::store::StoreWriter;

#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    policy: SenderPolicy,
}

impl DedupEngine {
    pub fn new(policy: SenderPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SenderPolicy {
        &self.policy
    }

    /// Decide what to do with `email` and apply it through `writer`.
    ///
    /// Fails with `MissingMessageId` before any policy check when the
    /// message cannot be keyed. Nothing is written for
    /// [`ImportOutcome::Ignored`].
    pub fn ingest(
        &self,
        writer: &mut StoreWriter<'_>,
        email: &Email,
        filename: &str,
        processing_id: Option<&str>,
        ts: i64,
    ) -> Result<ImportOutcome> {
        let candidate = StoredEmail::from_email(email, filename, processing_id, ts)?;

        if let Some(reason) = self.policy.ignore_reason(email) {
            debug!(id = %candidate.id, filename, %reason, "Ignoring message");
            return Ok(ImportOutcome::Ignored);
        }

        let Some(existing) = writer.get(&candidate.id) else {
            debug!(id = %candidate.id, filename, "Inserting new message");
            writer.put(candidate)?;
            return Ok(ImportOutcome::Inserted);
        };

        let candidate_hops = candidate.hop_count();
        let existing_hops = existing.hop_count();

        if candidate_hops < existing_hops {
            // filename and ts stay with the first import
            let mut replacement = existing.clone();
            replacement.headers = candidate.headers;
            replacement.body = candidate.body;
            replacement.merge_pids(&candidate.pids);
            debug!(
                id = %replacement.id,
                candidate_hops,
                existing_hops,
                "Replacing stored copy with fewer hops"
            );
            writer.put(replacement)?;
            Ok(ImportOutcome::Replaced)
        } else {
            let mut retained = existing.clone();
            retained.merge_pids(&candidate.pids);
            debug!(
                id = %retained.id,
                candidate_hops,
                existing_hops,
                "Keeping stored copy, merging pids"
            );
            writer.put(retained)?;
            Ok(ImportOutcome::Retained)
        }
    }
}
