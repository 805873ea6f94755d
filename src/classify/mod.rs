//! Template classification of parsed messages.

pub mod catalog;

pub use catalog::{Catalog, EmailTemplate, TemplateRule};

use serde::{Deserialize, Serialize};

/// A flat descriptor of what kind of message an email is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub language: String,
}

impl Classification {
    pub fn new(
        kind: impl Into<String>,
        style: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            style: style.into(),
            language: language.into(),
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.style.is_empty() {
            write!(f, " ({})", self.style)?;
        }
        if !self.language.is_empty() {
            write!(f, " [{}]", self.language)?;
        }
        Ok(())
    }
}
