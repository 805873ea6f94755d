//! Sender allow-list and per-sender date exclusion rules.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Utc};

use crate::config::PolicyConfig;
use crate::model::email::Email;

/// Why the policy rejected a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No sender, or a sender not on the allow-list.
    UnknownSender,
    /// Dated after the sender's trust cutover.
    AfterCutover,
    /// Dated in or before the sender's newsletter year.
    Newsletter,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::UnknownSender => "sender not allowed",
            Self::AfterCutover => "dated after sender cutover",
            Self::Newsletter => "newsletter",
        })
    }
}

/// Decides which incoming messages are worth storing at all.
///
/// Addresses are compared lower-cased. A message whose `Date` cannot be
/// parsed is never excluded by a date rule.
#[derive(Debug, Clone, Default)]
pub struct SenderPolicy {
    allowed: HashSet<String>,
    cutovers: HashMap<String, DateTime<Utc>>,
    newsletter_years: HashMap<String, i32>,
}

impl SenderPolicy {
    /// A policy that accepts nothing until senders are allowed.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        let mut policy = Self::new();
        for sender in &config.allowed_senders {
            policy.allow(sender);
        }
        for rule in &config.trusted_until {
            policy.trust_until(&rule.sender, rule.cutover);
        }
        for rule in &config.newsletter {
            policy.newsletter_through(&rule.sender, rule.through_year);
        }
        policy
    }

    pub fn allow(&mut self, sender: &str) -> &mut Self {
        self.allowed.insert(sender.to_ascii_lowercase());
        self
    }

    pub fn trust_until(&mut self, sender: &str, cutover: DateTime<Utc>) -> &mut Self {
        self.cutovers.insert(sender.to_ascii_lowercase(), cutover);
        self
    }

    pub fn newsletter_through(&mut self, sender: &str, year: i32) -> &mut Self {
        self.newsletter_years.insert(sender.to_ascii_lowercase(), year);
        self
    }

    /// `None` when the message should be stored, otherwise why not.
    pub fn ignore_reason(&self, email: &Email) -> Option<IgnoreReason> {
        let Some(sender) = email.sender().map(|s| s.normalized()) else {
            return Some(IgnoreReason::UnknownSender);
        };
        if !self.allowed.contains(&sender) {
            return Some(IgnoreReason::UnknownSender);
        }

        let date = email.date()?;
        if let Some(cutover) = self.cutovers.get(&sender) {
            if date > *cutover {
                return Some(IgnoreReason::AfterCutover);
            }
        }
        if let Some(year) = self.newsletter_years.get(&sender) {
            if date.year() <= *year {
                return Some(IgnoreReason::Newsletter);
            }
        }
        None
    }
}
