//! A single decoded header field.

use serde::{Deserialize, Serialize};

/// One header field. Names keep their original case but are compared
/// case-insensitively everywhere; values have RFC 2047 encoded-words decoded
/// and surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Values of every header called `name`, in order of occurrence.
pub fn values<'h: 'n, 'n>(
    headers: &'h [Header],
    name: &'n str,
) -> impl Iterator<Item = &'h str> + 'n {
    headers
        .iter()
        .filter(move |h| h.is(name))
        .map(|h| h.value.as_str())
}

/// Number of `Received` headers: how many relays a copy passed through.
pub fn hop_count(headers: &[Header]) -> usize {
    values(headers, "received").count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_case_insensitive_in_order() {
        let headers = vec![
            Header::new("Received", "first"),
            Header::new("Subject", "hi"),
            Header::new("RECEIVED", "second"),
        ];
        let got: Vec<&str> = values(&headers, "received").collect();
        assert_eq!(got, vec!["first", "second"]);
        assert_eq!(hop_count(&headers), 2);
    }

    #[test]
    fn test_value_outlives_lookup_name() {
        let headers = vec![Header::new("Subject", "kept")];
        let found = {
            let name = String::from("SUBJECT");
            let found = values(&headers, &name).next();
            found
        };
        assert_eq!(found, Some("kept"));
    }

    #[test]
    fn test_hop_count_empty() {
        assert_eq!(hop_count(&[]), 0);
    }
}
