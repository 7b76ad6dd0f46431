//! YAML configuration for the digest run.
//!
//! ```yaml
//! feeds:
//!   - https://feeds.bbci.co.uk/news/rss.xml
//!   - https://www.theverge.com/rss/index.xml
//! email:
//!   smtp_server: smtp.gmail.com
//!   smtp_port: 587
//!   sender_email: digest@example.com
//!   sender_name: News Digest
//!   recipients: [me@example.com]
//! fetch:
//!   blocked: [https://www.reuters.com/rssFeed/worldNews]
//!   known_empty: [https://feeds.npr.org/1001/rss.xml]
//!   concurrency: 8
//! summarizer:
//!   template: news_digest
//!   language: English
//! ```
//!
//! Secrets and recipient lists can also come from the environment
//! (`SMTP_PASSWORD`, `RECIPIENT_EMAIL`, `NEWS_DIGEST_FEEDS`) through the CLI;
//! see [`Overrides`]. The LLM endpoint itself is configured in `awful_aj`'s
//! own `config.yaml`.

use crate::feeds::FetchConfig;
use crate::retry::RetryPolicy;
use crate::utils::split_list;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u32,
    pub sender_email: String,
    pub sender_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub recipients: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender_email: String::new(),
            sender_name: "News Digest".to_string(),
            password: String::new(),
            recipients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Feeds known to reject every request.
    pub blocked: Vec<String>,
    /// Feeds that are often empty; fetched, but logged.
    pub known_empty: Vec<String>,
    pub timeout_secs: u64,
    pub retry_attempts: usize,
    pub base_delay_ms: u64,
    /// Feeds fetched at the same time.
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            blocked: Vec::new(),
            known_empty: Vec::new(),
            timeout_secs: 10,
            retry_attempts: 3,
            base_delay_ms: 1000,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerSettings {
    /// `awful_aj` template name.
    pub template: String,
    pub language: String,
    pub concurrency: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            template: "news_digest".to_string(),
            language: "English".to_string(),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feeds: Vec<String>,
    pub email: EmailConfig,
    pub fetch: FetchSettings,
    pub summarizer: SummarizerSettings,
}

/// Values that take precedence over the file, usually from env or flags.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub smtp_password: Option<String>,
    /// Comma or semicolon separated.
    pub recipients: Option<String>,
    /// Comma or semicolon separated.
    pub feeds: Option<String>,
}

impl AppConfig {
    /// Read and parse a YAML file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info!(feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }

    /// Apply overrides; empty values are ignored.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(password) = overrides.smtp_password.as_deref().filter(|p| !p.is_empty()) {
            self.email.password = password.to_string();
        }
        if let Some(raw) = &overrides.recipients {
            let recipients = split_list(raw);
            if !recipients.is_empty() {
                debug!(count = recipients.len(), "Recipients overridden");
                self.email.recipients = recipients;
            }
        }
        if let Some(raw) = &overrides.feeds {
            let feeds = split_list(raw);
            if !feeds.is_empty() {
                debug!(count = feeds.len(), "Feeds overridden");
                self.feeds = feeds;
            }
        }
    }

    /// Check the configuration, collecting every problem.
    ///
    /// Email settings are only checked when `require_email` is set.
    pub fn validate(&self, require_email: bool) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.feeds.is_empty() {
            problems.push("no feeds configured".to_string());
        }
        for feed in &self.feeds {
            match url::Url::parse(feed) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => problems.push(format!("feed is not an http(s) URL: {feed}")),
            }
        }
        if self.fetch.concurrency == 0 {
            problems.push("fetch.concurrency must be at least 1".to_string());
        }

        if require_email {
            let email = &self.email;
            if !(1..=65535).contains(&email.smtp_port) {
                problems.push(format!("smtp_port out of range: {}", email.smtp_port));
            }
            if email.smtp_server.trim().is_empty() {
                problems.push("smtp_server is missing".to_string());
            }
            if email.sender_email.trim().is_empty() {
                problems.push("sender_email is missing".to_string());
            }
            if email.password.is_empty() {
                problems.push("SMTP password is missing (set SMTP_PASSWORD)".to_string());
            }
            if email.recipients.is_empty() {
                problems.push("no recipients configured (set RECIPIENT_EMAIL)".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Fetcher settings derived from the `fetch` section.
    pub fn to_fetch_config(&self) -> FetchConfig {
        let fetch = &self.fetch;
        FetchConfig {
            blocked: fetch.blocked.iter().cloned().collect::<HashSet<_>>(),
            known_empty: fetch.known_empty.iter().cloned().collect::<HashSet<_>>(),
            timeout: Duration::from_secs(fetch.timeout_secs.max(1)),
            retry: RetryPolicy::new(fetch.retry_attempts, Duration::from_millis(fetch.base_delay_ms)),
            ..FetchConfig::default()
        }
    }
}
