//! Sender address extraction from `From`-style header values (RFC 5322 §3.4).

/// A parsed mailbox.
///
/// `Portal Notices <notices@portal.example.com>` parses to the display name
/// `Portal Notices` and the address `notices@portal.example.com`; a bare
/// address leaves the display name empty.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EmailAddress {
    pub display_name: String,
    pub address: String,
}

impl EmailAddress {
    /// Parse the first mailbox of a header value.
    ///
    /// The angle-bracket form wins when present; otherwise the first token
    /// containing `@` is taken as a bare address. Returns `None` when neither
    /// form yields a non-empty address.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();

        if let Some(open) = trimmed.find('<') {
            if let Some(len) = trimmed[open..].find('>') {
                let address = trimmed[open + 1..open + len].trim();
                if address.is_empty() {
                    return None;
                }
                return Some(Self {
                    display_name: strip_quotes(&trimmed[..open]),
                    address: address.to_string(),
                });
            }
        }

        trimmed
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .find(|token| token.contains('@'))
            .map(|token| Self {
                display_name: String::new(),
                address: token.trim_matches(|c| c == '"' || c == '\'').to_string(),
            })
    }

    /// The address lower-cased, for comparisons against allow-lists.
    pub fn normalized(&self) -> String {
        self.address.to_ascii_lowercase()
    }
}

fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_address() {
        let addr = EmailAddress::parse("user@example.com").unwrap();
        assert_eq!(addr.address, "user@example.com");
        assert_eq!(addr.display_name, "");
    }

    #[test]
    fn test_parse_name_and_address() {
        let addr = EmailAddress::parse("Portal Notices <Notices@Portal.Example.com>").unwrap();
        assert_eq!(addr.address, "Notices@Portal.Example.com");
        assert_eq!(addr.display_name, "Portal Notices");
        assert_eq!(addr.normalized(), "notices@portal.example.com");
    }

    #[test]
    fn test_parse_quoted_name() {
        let addr = EmailAddress::parse("\"Last, First\" <user@example.com>").unwrap();
        assert_eq!(addr.display_name, "Last, First");
        assert_eq!(addr.to_string(), "Last, First <user@example.com>");
    }

    #[test]
    fn test_parse_bare_with_comment() {
        let addr = EmailAddress::parse("user@example.com (Some User)").unwrap();
        assert_eq!(addr.address, "user@example.com");
    }

    #[test]
    fn test_parse_nothing() {
        assert!(EmailAddress::parse("").is_none());
        assert!(EmailAddress::parse("undisclosed recipients").is_none());
        assert!(EmailAddress::parse("Nobody <>").is_none());
    }
}
