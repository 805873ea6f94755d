//! Centralized error types for mailsift.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsift library.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The raw message is structurally malformed.
    #[error("Malformed message: {0}")]
    Format(String),

    /// The leading `type/subtype` token of a `Content-Type` could not be found.
    #[error("Invalid content type: '{0}'")]
    InvalidContentType(String),

    /// The message carries no usable `Message-ID` and cannot be stored.
    #[error("Message has no Message-ID")]
    MissingMessageId,

    /// A content-transfer-encoding this crate does not decode.
    #[error("Not implemented: content-transfer-encoding '{0}'")]
    NotImplemented(String),

    /// A requested header is absent and no default was supplied.
    #[error("Header not found: {0}")]
    HeaderNotFound(String),

    /// No stored record exists for the requested Message-ID.
    #[error("No stored email with Message-ID {0}")]
    RecordNotFound(String),

    /// The message could not be classified.
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// A per-message failure during a batch, tagged with its source file.
    #[error("{filename}: {source}")]
    Message {
        filename: String,
        source: Box<MailError>,
    },

    /// The record store file is corrupt or from an incompatible version.
    #[error("Corrupt or incompatible store '{path}': {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// An input file that is neither `.eml` nor MBOX.
    #[error("Unsupported input file: {0}")]
    UnsupportedSource(PathBuf),

    /// Configuration or catalog data is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Why a message could not be classified.
///
/// Kept separate from [`MailError`] and `Clone` so a memoized failure can be
/// returned on every request without recomputing it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// No template's subject pattern matched.
    #[error("No matching template for subject '{subject}'")]
    NoMatchingTemplate { subject: String },

    /// A template matched but could not decide on a classification.
    #[error("Template '{pattern}' matched subject '{subject}' but could not disambiguate")]
    Ambiguous { pattern: String, subject: String },
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the name of the message source to an error.
    pub fn in_message(self, filename: impl Into<String>) -> Self {
        Self::Message {
            filename: filename.into(),
            source: Box::new(self),
        }
    }

    /// `true` for errors caused by the message text itself.
    ///
    /// These are the errors that `on_malformed = "skip"` turns into a
    /// skipped message instead of an aborted batch.
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::Format(_)
            | Self::InvalidContentType(_)
            | Self::MissingMessageId
            | Self::NotImplemented(_) => true,
            Self::Message { source, .. } => source.is_malformed(),
            _ => false,
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MailError::io`).
impl From<std::io::Error> for MailError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_context_in_display() {
        let err = MailError::Format("cannot find header/body boundary".into()).in_message("a.eml");
        assert_eq!(
            err.to_string(),
            "a.eml: Malformed message: cannot find header/body boundary"
        );
        assert!(err.is_malformed());
    }

    #[test]
    fn test_lookup_errors_are_not_malformed() {
        assert!(!MailError::RecordNotFound("<x@y>".into()).is_malformed());
        assert!(!MailError::Config("bad".into()).is_malformed());
        assert!(!MailError::UnsupportedSource(PathBuf::from("notes.txt")).is_malformed());
    }

    #[test]
    fn test_classify_error_converts() {
        let err: MailError = ClassifyError::NoMatchingTemplate {
            subject: "Hi".into(),
        }
        .into();
        assert!(matches!(err, MailError::Classify(_)));
    }
}
