//! `mailsift` settings.
//!
//! The first of these wins: the file named by `$MAILSIFT_CONFIG`, then
//! `mailsift/config.toml` under the platform config directory, then the
//! built-in defaults. Missing keys fall back to their defaults.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Every section of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging and directory overrides.
    pub general: GeneralConfig,
    /// Batch import behavior.
    pub import: ImportConfig,
    /// Which senders are accepted, and when.
    pub policy: PolicyConfig,
    /// Template classification.
    pub classifier: ClassifierConfig,
}

/// The `[general]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default `tracing` filter when neither `RUST_LOG` nor `-v` is given.
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Override data directory holding the record store.
    pub data_dir: Option<PathBuf>,
}

/// What to do when a message in a batch cannot be parsed or stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMalformed {
    /// Stop the batch and report the offending message.
    #[default]
    Abort,
    /// Log, count as failed and continue.
    Skip,
}

/// Batch import behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub on_malformed: OnMalformed,
    /// Turn bare LF line endings into CRLF before parsing.
    pub normalize_newlines: bool,
    /// Processing ID attached to imports that do not name one.
    pub default_pid: Option<String>,
}

/// Sender allow-list and date exclusion rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Senders whose messages are imported at all (case-insensitive).
    pub allowed_senders: Vec<String>,
    /// Senders trusted only up to a cutover instant.
    pub trusted_until: Vec<TrustedUntil>,
    /// Senders whose older messages are newsletter noise.
    pub newsletter: Vec<NewsletterRule>,
}

/// Messages from `sender` dated after `cutover` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedUntil {
    pub sender: String,
    /// RFC 3339 instant, written as a quoted TOML string.
    pub cutover: DateTime<Utc>,
}

/// Messages from `sender` dated in or before `through_year` are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterRule {
    pub sender: String,
    pub through_year: i32,
}

/// Template classification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// TOML template catalog used by `classify`.
    pub catalog: Option<PathBuf>,
}

// ── Defaults ────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            data_dir: None,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            on_malformed: OnMalformed::Abort,
            normalize_newlines: true,
            default_pid: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            allowed_senders: vec![
                "notices@portal.example.com".to_string(),
                "nominations@portal.example.com".to_string(),
                "hello@legacy.example.com".to_string(),
                "news@legacy.example.com".to_string(),
            ],
            trusted_until: vec![TrustedUntil {
                sender: "hello@legacy.example.com".to_string(),
                cutover: Utc
                    .with_ymd_and_hms(2019, 12, 31, 0, 0, 0)
                    .single()
                    .unwrap_or_default(),
            }],
            newsletter: vec![NewsletterRule {
                sender: "news@legacy.example.com".to_string(),
                through_year: 2018,
            }],
        }
    }
}

// ── File locations ──────────────────────────────────────────────

/// Read `config.toml`, falling back to defaults when it is absent or
/// unreadable.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Read the config file at `path`, falling back to defaults on any error.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring malformed config file"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Ignoring unreadable config file"
            );
            Config::default()
        }
    }
}

/// Write `config` as pretty TOML to [`config_file_path`], returning the
/// path written.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("no config directory on this platform"))?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Write `config` as pretty TOML to `path`, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// `$MAILSIFT_CONFIG`, else `<config dir>/mailsift/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILSIFT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailsift").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}

/// Return the data directory holding the record store.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsift")
}

/// Default record store file.
pub fn store_path(config: &Config) -> PathBuf {
    data_dir(config).join("emails.store")
}

/// `mailsift.log` inside the cache directory.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailsift.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.import.on_malformed, OnMalformed::Abort);
        assert!(cfg.import.normalize_newlines);
        assert_eq!(cfg.policy.allowed_senders.len(), 4);
        assert_eq!(cfg.policy.newsletter[0].through_year, 2018);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.general.log_level, cfg.general.log_level);
        assert_eq!(parsed.policy.trusted_until, cfg.policy.trusted_until);
        assert_eq!(parsed.policy.newsletter, cfg.policy.newsletter);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[import]
on_malformed = "skip"

[[policy.trusted_until]]
sender = "alerts@example.org"
cutover = "2021-06-01T12:00:00Z"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.import.on_malformed, OnMalformed::Skip);
        assert!(cfg.import.normalize_newlines);
        assert_eq!(cfg.policy.trusted_until.len(), 1);
        assert_eq!(cfg.policy.trusted_until[0].sender, "alerts@example.org");
        // Unset lists inside a present table keep their defaults
        assert_eq!(cfg.policy.allowed_senders.len(), 4);
        assert_eq!(cfg.general.log_level, "warn");
    }

    #[test]
    fn test_save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.import.on_malformed = OnMalformed::Skip;
        cfg.import.default_pid = Some("nightly".into());
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path);
        assert_eq!(loaded.import.on_malformed, OnMalformed::Skip);
        assert_eq!(loaded.import.default_pid.as_deref(), Some("nightly"));
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[import]\non_malformed = 42\n").unwrap();
        assert_eq!(load_config_from(&path).import.on_malformed, OnMalformed::Abort);
    }

    #[test]
    fn test_log_file_in_cache_dir() {
        let mut cfg = Config::default();
        cfg.general.cache_dir = Some(PathBuf::from("/tmp/mailsift-cache"));
        assert_eq!(
            log_file_path(&cfg),
            PathBuf::from("/tmp/mailsift-cache/mailsift.log")
        );
    }

    #[test]
    fn test_store_path_follows_data_dir() {
        let mut cfg = Config::default();
        cfg.general.data_dir = Some(PathBuf::from("/tmp/mailsift-data"));
        assert_eq!(
            store_path(&cfg),
            PathBuf::from("/tmp/mailsift-data/emails.store")
        );
    }
}
