//! The persisted form of an imported message.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};
use crate::model::email::Email;
use crate::model::header::{self, Header};

/// One stored message, keyed by its `Message-ID`.
///
/// Created on the first import of a Message-ID, then either replaced or
/// pid-merged by later imports of the same ID. Never deleted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEmail {
    /// `Message-ID` header value, verbatim. Never empty.
    pub id: String,
    /// Processing IDs this message has been imported under.
    pub pids: BTreeSet<String>,
    /// Name of the source the message was imported from.
    pub filename: String,
    /// Import time, milliseconds since the Unix epoch.
    pub ts: i64,
    pub headers: Vec<Header>,
    pub body: String,
}

impl StoredEmail {
    /// Build a candidate record from a freshly parsed message.
    ///
    /// Fails with [`MailError::MissingMessageId`] when the message has no
    /// non-empty `Message-ID`.
    pub fn from_email(
        email: &Email,
        filename: impl Into<String>,
        processing_id: Option<&str>,
        ts: i64,
    ) -> Result<Self> {
        let id = email.message_id().ok_or(MailError::MissingMessageId)?;
        Ok(Self {
            id: id.to_string(),
            pids: processing_id.map(str::to_string).into_iter().collect(),
            filename: filename.into(),
            ts,
            headers: email.headers().to_vec(),
            body: email.body().to_string(),
        })
    }

    /// A fresh [`Email`] view over the stored headers and body.
    pub fn email(&self) -> Email {
        Email::new(self.headers.clone(), self.body.clone())
    }

    /// Number of `Received` headers.
    pub fn hop_count(&self) -> usize {
        header::hop_count(&self.headers)
    }

    /// Add every pid of `other` to this record.
    pub fn merge_pids(&mut self, other: &BTreeSet<String>) {
        self.pids.extend(other.iter().cloned());
    }

    /// Decoded `Subject`, empty when absent.
    pub fn subject(&self) -> &str {
        header::values(&self.headers, "subject").next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(id: Option<&str>) -> Email {
        let mut headers = vec![Header::new("Subject", "Hi")];
        if let Some(id) = id {
            headers.push(Header::new("Message-ID", id));
        }
        Email::new(headers, "body")
    }

    #[test]
    fn test_from_email_seeds_pid() {
        let rec = StoredEmail::from_email(&email(Some("<1@x>")), "a.eml", Some("p1"), 42).unwrap();
        assert_eq!(rec.id, "<1@x>");
        assert_eq!(rec.pids.iter().collect::<Vec<_>>(), vec!["p1"]);
        assert_eq!(rec.ts, 42);
        assert_eq!(rec.subject(), "Hi");
        assert_eq!(rec.email().body(), "body");
    }

    #[test]
    fn test_from_email_without_pid() {
        let rec = StoredEmail::from_email(&email(Some("<1@x>")), "a.eml", None, 0).unwrap();
        assert!(rec.pids.is_empty());
    }

    #[test]
    fn test_from_email_requires_message_id() {
        assert!(matches!(
            StoredEmail::from_email(&email(None), "a.eml", None, 0),
            Err(MailError::MissingMessageId)
        ));
        assert!(matches!(
            StoredEmail::from_email(&email(Some("")), "a.eml", None, 0),
            Err(MailError::MissingMessageId)
        ));
    }

    #[test]
    fn test_merge_pids_is_union() {
        let mut rec = StoredEmail::from_email(&email(Some("<1@x>")), "a", Some("p1"), 0).unwrap();
        let other: BTreeSet<String> = ["p1", "p2"].iter().map(|s| s.to_string()).collect();
        rec.merge_pids(&other);
        assert_eq!(rec.pids.len(), 2);
    }
}
