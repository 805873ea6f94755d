//! The structured view of a parsed message.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};

use crate::classify::{Catalog, Classification};
use crate::error::{ClassifyError, MailError, Result};
use crate::model::address::EmailAddress;
use crate::model::document::Document;
use crate::model::header::{self, Header};
use crate::parser::header::parse_date;
use crate::parser::mime;

/// A parsed message: ordered headers plus the raw (still transfer-encoded)
/// body.
///
/// Headers and body never change after construction. Derived views are
/// computed on first use and memoized:
///
/// - the HTML [`Document`], stored as `OnceLock<Option<_>>` so "not built
///   yet", "built" and "built, but there is no HTML part" are three distinct
///   states;
/// - the classification result, including a failed one, so a message that
///   cannot be classified reports the same error on every request.
///
/// A failure while *building* the document (for instance an undecodable
/// part) is returned without being cached.
#[derive(Debug, Clone)]
pub struct Email {
    headers: Vec<Header>,
    body: String,
    document: OnceLock<Option<Document>>,
    classification: OnceLock<std::result::Result<Classification, ClassifyError>>,
}

impl Email {
    pub fn new(headers: Vec<Header>, body: impl Into<String>) -> Self {
        Self {
            headers,
            body: body.into(),
            document: OnceLock::new(),
            classification: OnceLock::new(),
        }
    }

    /// Parse a raw RFC 5322 message. See [`mime::parse_mime`].
    pub fn parse(raw: &str) -> Result<Self> {
        mime::parse_mime(raw)
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// The body exactly as it followed the header/body boundary.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// First value of header `name` (case-insensitive), or
    /// [`MailError::HeaderNotFound`].
    pub fn first_header_value(&self, name: &str) -> Result<&str> {
        header::values(&self.headers, name)
            .next()
            .ok_or_else(|| MailError::HeaderNotFound(name.to_string()))
    }

    /// First value of header `name`, or `default` when absent.
    pub fn first_header_value_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        header::values(&self.headers, name).next().unwrap_or(default)
    }

    /// Every value of header `name`, in order of occurrence.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        header::values(&self.headers, name)
    }

    /// Decoded `Subject`, empty when absent.
    pub fn subject(&self) -> &str {
        self.first_header_value_or("subject", "")
    }

    pub fn message_id(&self) -> Option<&str> {
        self.header_values("message-id")
            .next()
            .filter(|id| !id.is_empty())
    }

    /// Sender mailbox from the `From` header.
    pub fn sender(&self) -> Option<EmailAddress> {
        self.header_values("from").next().and_then(EmailAddress::parse)
    }

    /// Parsed `Date` header, if present and understandable.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.header_values("date").next().and_then(parse_date)
    }

    /// Number of `Received` headers.
    pub fn hop_count(&self) -> usize {
        header::hop_count(&self.headers)
    }

    /// Decoded renderings keyed by content type. See
    /// [`mime::multipart_alternatives`].
    pub fn multipart_alternatives(&self) -> Result<HashMap<String, String>> {
        mime::multipart_alternatives(self)
    }

    /// The decoded rendering for one content type, if the message has it.
    pub fn body_for(&self, content_type: &str) -> Result<Option<String>> {
        let mut alternatives = self.multipart_alternatives()?;
        Ok(alternatives.remove(&content_type.to_ascii_lowercase()))
    }

    /// The parsed `text/html` alternative, built once.
    pub fn document(&self) -> Result<Option<&Document>> {
        if let Some(doc) = self.document.get() {
            return Ok(doc.as_ref());
        }
        let built = self.body_for("text/html")?.map(|html| Document::parse(&html));
        Ok(self.document.get_or_init(|| built).as_ref())
    }

    /// Classify against `catalog`, memoizing the outcome.
    ///
    /// The first call decides; later calls return the cached result even if
    /// a different catalog is passed. Disambiguation callbacks must not call
    /// this method on the email they are inspecting.
    pub fn classify(
        &self,
        catalog: &Catalog,
    ) -> std::result::Result<Classification, ClassifyError> {
        self.classification
            .get_or_init(|| catalog.classify(self))
            .clone()
    }

    /// `true` once a classification attempt has been made.
    pub fn is_classified(&self) -> bool {
        self.classification.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Email {
        Email::new(
            vec![
                Header::new("Received", "from relay1"),
                Header::new("From", "Notices <notices@portal.example.com>"),
                Header::new("subject", "Hello"),
                Header::new("Received", "from relay2"),
                Header::new("Date", "Thu, 04 Jan 2024 10:00:00 +0000"),
                Header::new("Message-ID", "<abc@portal.example.com>"),
            ],
            "body",
        )
    }

    #[test]
    fn test_first_header_value_case_insensitive() {
        let email = sample();
        assert_eq!(email.first_header_value("SUBJECT").unwrap(), "Hello");
        assert_eq!(email.first_header_value("received").unwrap(), "from relay1");
    }

    #[test]
    fn test_header_value_outlives_name() {
        let email = sample();
        let subject = {
            let name = "subject".to_string();
            email.first_header_value_or(&name, "")
        };
        assert_eq!(subject, "Hello");
    }

    #[test]
    fn test_first_header_value_missing() {
        let email = sample();
        assert!(matches!(
            email.first_header_value("X-Missing"),
            Err(MailError::HeaderNotFound(ref n)) if n == "X-Missing"
        ));
        assert_eq!(email.first_header_value_or("X-Missing", "none"), "none");
    }

    #[test]
    fn test_derived_accessors() {
        let email = sample();
        assert_eq!(email.hop_count(), 2);
        assert_eq!(email.message_id(), Some("<abc@portal.example.com>"));
        assert_eq!(
            email.sender().map(|s| s.normalized()),
            Some("notices@portal.example.com".to_string())
        );
        assert_eq!(
            email.date().map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2024-01-04".to_string())
        );
    }

    #[test]
    fn test_document_absent_is_memoized() {
        let email = Email::new(vec![Header::new("Content-Type", "text/plain")], "hi");
        assert!(email.document().unwrap().is_none());
        assert!(email.document.get().is_some());
        assert!(email.document().unwrap().is_none());
    }

    #[test]
    fn test_document_built_from_html_body() {
        let email = Email::new(
            vec![Header::new("Content-Type", "text/html; charset=utf-8")],
            "<p>Hi <b>there</b></p>",
        );
        let doc = email.document().unwrap().expect("html document");
        assert_eq!(doc.text(), "Hi there");
    }

    #[test]
    fn test_document_error_is_not_cached() {
        let email = Email::new(
            vec![
                Header::new("Content-Type", "text/html"),
                Header::new("Content-Transfer-Encoding", "x-unknown"),
            ],
            "<p>x</p>",
        );
        assert!(email.document().is_err());
        assert!(email.document.get().is_none());
    }
}
