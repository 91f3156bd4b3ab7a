//! Configuration file parser for ~/.config/feedwalk/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::feed::ClassifierRules;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Feed opened by `browse` when no URL is given.
    pub root_feed: String,

    /// Breadcrumb title of the root level.
    pub root_title: String,

    /// Socket address the acquisition endpoint binds to.
    pub listen: String,

    /// Accept localhost and private-network URLs from callers.
    pub allow_private_hosts: bool,

    /// Request disguises, relay and limits for the fetch pipeline.
    pub fetch: FetchConfig,

    /// Folder markers for item classification.
    pub classifier: ClassifierRules,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_feed: "https://rss.app/feeds/8O3ywpMHwZGfCIYy.xml".to_string(),
            root_title: "Asian Channel".to_string(),
            listen: "127.0.0.1:3000".to_string(),
            allow_private_hosts: false,
            fetch: FetchConfig::default(),
            classifier: ClassifierRules::default(),
        }
    }
}

/// Settings for the ordered fetch strategies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Referer sent by the primary strategy when the caller supplies none.
    pub default_referer: String,

    /// Referer tried second against blocking providers.
    pub alternate_referer: String,

    /// Plain-HTTP referer tried for plain-HTTP targets.
    pub insecure_referer: String,

    /// Hosts known to answer 204 to clients they don't like.
    /// Subdomains match too.
    pub blocked_hosts: Vec<String>,

    pub desktop_user_agent: String,
    pub desktop_accept: String,
    pub accept_language: String,
    pub mobile_user_agent: String,
    pub mobile_accept: String,

    /// Read-through relay; the target goes in its `url` query parameter.
    pub relay_url: String,

    /// Relay bodies must be longer than this many characters to be trusted.
    pub relay_min_body_len: usize,

    /// Per-attempt timeout covering request and body. Clamped to 1..=30000.
    pub attempt_timeout_ms: u64,

    /// Largest response body accepted from any attempt.
    pub max_body_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_referer: "https://allrss.se/".to_string(),
            alternate_referer: "https://allrss.se/dramas/".to_string(),
            insecure_referer: "http://allrss.se/".to_string(),
            blocked_hosts: vec!["allrss.se".to_string()],
            desktop_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36".to_string(),
            desktop_accept: "application/rss+xml, application/xml, text/xml, */*".to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            mobile_user_agent: "vChannel/2.4 (iPhone; iOS 15.0; Scale/3.00)".to_string(),
            mobile_accept: "*/*, application/xml".to_string(),
            relay_url: "https://api.allorigins.win/raw".to_string(),
            relay_min_body_len: 50,
            attempt_timeout_ms: Self::MAX_ATTEMPT_TIMEOUT_MS,
            max_body_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl FetchConfig {
    /// Upper bound for a single attempt.
    pub const MAX_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(
            self.attempt_timeout_ms
                .clamp(1, Self::MAX_ATTEMPT_TIMEOUT_MS),
        )
    }

    /// True when the URL's host is, or is a subdomain of, a blocking provider.
    pub fn is_blocked_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.blocked_hosts.iter().any(|blocked| {
            let blocked = blocked.to_ascii_lowercase();
            host == blocked || host.ends_with(&format!(".{}", blocked))
        })
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text. Empty text yields defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "root_feed",
                "root_title",
                "listen",
                "allow_private_hosts",
                "fetch",
                "classifier",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        if config.fetch.attempt_timeout_ms == 0
            || config.fetch.attempt_timeout_ms > FetchConfig::MAX_ATTEMPT_TIMEOUT_MS
        {
            tracing::warn!(
                attempt_timeout_ms = config.fetch.attempt_timeout_ms,
                max = FetchConfig::MAX_ATTEMPT_TIMEOUT_MS,
                "attempt_timeout_ms out of range, clamping"
            );
        }
        tracing::info!(root_feed = %config.root_feed, "Loaded configuration");
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================
