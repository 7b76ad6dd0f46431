//! HTTP retrieval of raw feed documents.
//!
//! Every attempt first uses a browser-like header profile and, if that fails
//! for any reason (403 being the usual one), immediately repeats the request
//! with a minimal generic profile. Attempts are retried with exponential
//! backoff through [`crate::retry`]. URLs on the blocked list never touch the
//! network.

use crate::retry::{RetryPolicy, Sleep, TokioSleep, random_jitter, retry};
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HOST, HeaderMap, HeaderName, HeaderValue, REFERER,
    USER_AGENT,
};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Errors returned by [`FeedFetcher::fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed is on the blocked list: {0}")]
    Blocked(String),
    #[error("invalid feed URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// One set of request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub cache_control: Option<String>,
}

impl HeaderProfile {
    /// Desktop browser headers, tried first.
    pub fn browser() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
            accept: "application/rss+xml, application/xml, text/xml, application/atom+xml, */*"
                .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            cache_control: Some("no-cache".to_string()),
        }
    }

    /// Minimal generic headers, used when the browser profile is rejected.
    pub fn generic() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; ProductReader/1.0)".to_string(),
            accept: "*/*".to_string(),
            accept_language: "en".to_string(),
            cache_control: None,
        }
    }
}

/// Everything the fetcher needs to know, supplied at construction time.
///
/// The default has empty `blocked` and `known_empty` sets. In a real run both
/// come from the `fetch.blocked` and `fetch.known_empty` lists of the YAML
/// configuration, see [`AppConfig::to_fetch_config`](crate::config::AppConfig::to_fetch_config).
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub primary: HeaderProfile,
    pub fallback: HeaderProfile,
    /// Feeds that reject every request; fetching them fails without I/O.
    pub blocked: HashSet<String>,
    /// Feeds that are often empty or flaky; logged, then fetched anyway.
    pub known_empty: HashSet<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Upper bound of the random pause before each attempt.
    pub pre_request_jitter: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            primary: HeaderProfile::browser(),
            fallback: HeaderProfile::generic(),
            blocked: HashSet::new(),
            known_empty: HashSet::new(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            pre_request_jitter: Duration::from_millis(500),
        }
    }
}

/// Downloads feed documents.
#[derive(Debug)]
pub struct FeedFetcher<S = TokioSleep> {
    client: reqwest::Client,
    config: FetchConfig,
    sleeper: S,
}

impl FeedFetcher<TokioSleep> {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        Self::with_sleeper(config, TokioSleep)
    }
}

impl<S: Sleep> FeedFetcher<S> {
    pub fn with_sleeper(config: FetchConfig, sleeper: S) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            config,
            sleeper,
        })
    }

    /// Fetch the raw bytes of one feed.
    ///
    /// Blocked URLs fail at once without any network I/O. Every other URL gets
    /// up to `retry.max_attempts` attempts. Each attempt waits a random
    /// pre-request pause, then tries the primary header profile and, on any
    /// failure, the fallback profile.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute feed URL
    ///
    /// # Returns
    ///
    /// The response body of the first `200 OK`, or the [`FetchError`] of the
    /// last attempt.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let fetcher = FeedFetcher::new(FetchConfig::default())?;
    /// let bytes = fetcher.fetch("https://feeds.bbci.co.uk/news/rss.xml").await?;
    /// ```
    #[instrument(level = "info", skip(self), fields(%url))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if self.config.blocked.contains(url) {
            warn!("Skipping blocked feed");
            return Err(FetchError::Blocked(url.to_string()));
        }
        if self.config.known_empty.contains(url) {
            warn!("Feed is known to be empty or flaky; fetching anyway");
        }

        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        let target = &parsed;

        let body = retry(&self.config.retry, &self.sleeper, url, |attempt| async move {
            let pause = random_jitter(self.config.pre_request_jitter);
            if !pause.is_zero() {
                self.sleeper.sleep(pause).await;
            }
            debug!(attempt, "Requesting feed");
            self.attempt(target).await
        })
        .await?;

        info!(bytes = body.len(), "Fetched feed");
        Ok(body)
    }

    /// One attempt: primary profile, then the fallback profile right away.
    async fn attempt(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        match self.request(url, &self.config.primary).await {
            Ok(body) => Ok(body),
            Err(e) => {
                debug!(error = %e, "Primary headers failed; retrying with fallback headers");
                self.request(url, &self.config.fallback).await
            }
        }
    }

    async fn request(&self, url: &Url, profile: &HeaderProfile) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .headers(request_headers(url, profile))
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|e| transport_error(url, e))?;
        Ok(body.to_vec())
    }
}

fn transport_error(url: &Url, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            source,
        }
    }
}

/// `host[:port]` of the URL, as sent in `Host`.
fn authority(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Profile headers plus `Referer` (scheme and authority) and `Host`.
fn request_headers(url: &Url, profile: &HeaderProfile) -> HeaderMap {
    let authority = authority(url);
    let referer = format!("{}://{}", url.scheme(), authority);

    let pairs: [(HeaderName, Option<&str>); 6] = [
        (USER_AGENT, Some(profile.user_agent.as_str())),
        (ACCEPT, Some(profile.accept.as_str())),
        (ACCEPT_LANGUAGE, Some(profile.accept_language.as_str())),
        (CACHE_CONTROL, profile.cache_control.as_deref()),
        (REFERER, Some(referer.as_str())),
        (HOST, Some(authority.as_str())),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(e) => warn!(header = %name, error = %e, "Skipping invalid header value"),
        }
    }
    headers
}
