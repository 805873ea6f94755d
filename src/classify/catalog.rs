//! Ordered catalog of known message templates.
//!
//! Templates are tried in declaration order against the decoded `Subject`;
//! the first whose pattern matches decides the outcome. A template either
//! carries its classification directly, delegates to a disambiguation
//! callback, or abstains.
//!
//! Flat templates can be loaded from TOML:
//!
//! ```toml
//! [[template]]
//! subject = "^Your nomination was (accepted|rejected)"
//! type = "nomination-decision"
//! style = "2019"
//! language = "en"
//! ```

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::classify::Classification;
use crate::error::{ClassifyError, MailError, Result};
use crate::model::email::Email;

/// Callback that inspects a message to choose among classifications that
/// share a subject pattern. Returning `None` abstains.
pub type Disambiguator = Box<dyn Fn(&Email) -> Option<Classification> + Send + Sync>;

/// What a template does once its subject pattern matches.
pub enum TemplateRule {
    Direct(Classification),
    Disambiguate(Disambiguator),
    /// Matches, but never classifies.
    Abstain,
}

impl std::fmt::Debug for TemplateRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct(c) => f.debug_tuple("Direct").field(c).finish(),
            Self::Disambiguate(_) => f.write_str("Disambiguate(..)"),
            Self::Abstain => f.write_str("Abstain"),
        }
    }
}

#[derive(Debug)]
pub struct EmailTemplate {
    pub subject: Regex,
    pub rule: TemplateRule,
}

impl EmailTemplate {
    /// Outcome of this template for an email whose subject it matched.
    fn decide(&self, email: &Email) -> Option<Classification> {
        match &self.rule {
            TemplateRule::Direct(classification) => Some(classification.clone()),
            TemplateRule::Disambiguate(disambiguate) => disambiguate(email),
            TemplateRule::Abstain => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    templates: Vec<EmailTemplate>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    template: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    subject: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    style: String,
    #[serde(default)]
    language: String,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML catalog of flat templates.
    ///
    /// Entries without a `type` become abstaining templates.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| MailError::Config(format!("catalog: {e}")))?;

        let mut catalog = Self::new();
        for entry in file.template {
            let rule = match entry.kind {
                Some(kind) => {
                    TemplateRule::Direct(Classification::new(kind, entry.style, entry.language))
                }
                None => TemplateRule::Abstain,
            };
            catalog.push(&entry.subject, rule)?;
        }
        Ok(catalog)
    }

    /// Load a TOML catalog from disk.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MailError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| MailError::io(path, e))?;
        let catalog = Self::from_toml_str(&text)?;
        info!(path = %path.display(), templates = catalog.len(), "Loaded template catalog");
        Ok(catalog)
    }

    /// Append a template. Fails with [`MailError::Config`] on a bad pattern.
    pub fn push(&mut self, pattern: &str, rule: TemplateRule) -> Result<&mut Self> {
        let subject = Regex::new(pattern)
            .map_err(|e| MailError::Config(format!("invalid subject pattern '{pattern}': {e}")))?;
        self.templates.push(EmailTemplate { subject, rule });
        Ok(self)
    }

    pub fn push_direct(
        &mut self,
        pattern: &str,
        classification: Classification,
    ) -> Result<&mut Self> {
        self.push(pattern, TemplateRule::Direct(classification))
    }

    pub fn push_disambiguating<F>(&mut self, pattern: &str, disambiguate: F) -> Result<&mut Self>
    where
        F: Fn(&Email) -> Option<Classification> + Send + Sync + 'static,
    {
        self.push(pattern, TemplateRule::Disambiguate(Box::new(disambiguate)))
    }

    pub fn templates(&self) -> &[EmailTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Classify `email` by the first template whose pattern matches its
    /// subject (an absent subject matches as the empty string).
    ///
    /// This does not memoize; use [`Email::classify`] for the cached form.
    pub fn classify(&self, email: &Email) -> std::result::Result<Classification, ClassifyError> {
        let subject = email.subject();
        let Some(template) = self.templates.iter().find(|t| t.subject.is_match(subject)) else {
            debug!(subject, "No template matched");
            return Err(ClassifyError::NoMatchingTemplate {
                subject: subject.to_string(),
            });
        };

        template
            .decide(email)
            .ok_or_else(|| ClassifyError::Ambiguous {
                pattern: template.subject.as_str().to_string(),
                subject: subject.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::header::Header;

    fn email(subject: &str, body: &str) -> Email {
        Email::new(
            vec![
                Header::new("Subject", subject),
                Header::new("Content-Type", "text/html"),
            ],
            body,
        )
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .push_direct(
                "^Thanks for your submission",
                Classification::new("submission-receipt", "2019", "en"),
            )
            .unwrap()
            .push_disambiguating("^Decision on your nomination", |email| {
                let doc = email.document().ok().flatten()?;
                if doc.contains("accepted") {
                    Some(Classification::new("nomination-accepted", "2019", "en"))
                } else if doc.contains("rejected") {
                    Some(Classification::new("nomination-rejected", "2019", "en"))
                } else {
                    None
                }
            })
            .unwrap();
        catalog
    }

    #[test]
    fn test_direct_template() {
        let c = catalog()
            .classify(&email("Thanks for your submission!", ""))
            .unwrap();
        assert_eq!(c.kind, "submission-receipt");
        assert_eq!(c.language, "en");
    }

    #[test]
    fn test_disambiguating_template_decides() {
        let c = catalog()
            .classify(&email("Decision on your nomination", "<p>It was <b>accepted</b></p>"))
            .unwrap();
        assert_eq!(c.kind, "nomination-accepted");
    }

    #[test]
    fn test_abstaining_disambiguation_is_ambiguous() {
        let err = catalog()
            .classify(&email("Decision on your nomination", "<p>pending</p>"))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Ambiguous { ref pattern, .. } if pattern.contains("nomination")));
    }

    #[test]
    fn test_no_match_is_distinct() {
        let err = catalog().classify(&email("Weekly digest", "")).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::NoMatchingTemplate {
                subject: "Weekly digest".into()
            }
        );
    }

    #[test]
    fn test_first_match_wins() {
        let mut catalog = Catalog::new();
        catalog
            .push_direct("digest", Classification::new("first", "", ""))
            .unwrap()
            .push_direct("Weekly", Classification::new("second", "", ""))
            .unwrap();
        let c = catalog.classify(&email("Weekly digest", "")).unwrap();
        assert_eq!(c.kind, "first");
    }

    #[test]
    fn test_missing_subject_matches_empty() {
        let mut catalog = Catalog::new();
        catalog
            .push_direct("^$", Classification::new("blank", "", ""))
            .unwrap();
        let c = catalog.classify(&Email::new(Vec::new(), "")).unwrap();
        assert_eq!(c.kind, "blank");
    }

    #[test]
    fn test_from_toml() {
        let catalog = Catalog::from_toml_str(
            r#"
[[template]]
subject = "^Welcome"
type = "welcome"
language = "en"

[[template]]
subject = "^Maybe"
"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.classify(&email("Welcome aboard", "")).unwrap(),
            Classification::new("welcome", "", "en")
        );
        assert!(matches!(
            catalog.classify(&email("Maybe later", "")),
            Err(ClassifyError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Catalog::from_toml_str("[[template]]\nsubject = \"(unclosed\"\ntype = \"x\"\n"),
            Err(MailError::Config(_))
        ));
    }

    #[test]
    fn test_email_classification_is_memoized() {
        let catalog = catalog();
        let email = email("Decision on your nomination", "<p>pending</p>");
        assert!(!email.is_classified());
        let first = email.classify(&catalog).unwrap_err();
        assert!(email.is_classified());
        // A catalog that would now succeed does not change the cached failure.
        let mut other = Catalog::new();
        other
            .push_direct(".*", Classification::new("any", "", ""))
            .unwrap();
        assert_eq!(email.classify(&other).unwrap_err(), first);
    }
}
