//! LLM API interaction with exponential backoff retry logic.
//!
//! The summarizer talks to an OpenAI-compatible backend through `awful_aj`.
//!
//! - [`AskAsync`]: core trait for sending a prompt and receiving text
//! - [`AskFnWrapper`]: adapts `awful_aj::api::ask` to [`AskAsync`]
//! - [`RetryAsk`]: decorator adding retries to any [`AskAsync`]
//!
//! # Retry Strategy
//!
//! - 5 attempts in total
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) on top of every delay

use crate::retry::{RetryPolicy, Sleep, TokioSleep, retry};
use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Trait for async LLM interaction.
///
/// Implementors send text to an LLM and return its response. Decorators such
/// as [`RetryAsk`] implement it as well, so they can be stacked.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send `text` to the LLM and wait for the response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay = min(base_delay * 2^(attempt-1), 30s) + random_jitter(0..=250ms)
/// ```
pub struct RetryAsk<T, S = TokioSleep> {
    inner: T,
    policy: RetryPolicy,
    sleeper: S,
}

impl<T: AskAsync> RetryAsk<T> {
    /// Wrap `inner`, trying at most `max_attempts` times.
    ///
    /// ```ignore
    /// let client = AskFnWrapper { config: &config, template: &template };
    /// let retry_client = RetryAsk::new(client, 5, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_attempts: usize, base_delay: Duration) -> Self {
        let policy = RetryPolicy::new(max_attempts, base_delay)
            .with_max_delay(Duration::from_secs(30))
            .with_jitter(Duration::from_millis(250));
        Self::with_sleeper(inner, policy, TokioSleep)
    }
}

impl<T: AskAsync, S: Sleep> RetryAsk<T, S> {
    pub fn with_sleeper(inner: T, policy: RetryPolicy, sleeper: S) -> Self {
        Self {
            inner,
            policy,
            sleeper,
        }
    }
}

impl<T, S> fmt::Debug for RetryAsk<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T, S> AskAsync for RetryAsk<T, S>
where
    T: AskAsync,
    S: Sleep,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = retry(&self.policy, &self.sleeper, "llm ask", |_| self.inner.ask(text)).await;
        let dt = t0.elapsed();

        match &res {
            Ok(_) => info!(elapsed_ms_total = dt.as_millis() as u64, "ask() succeeded"),
            Err(e) => warn!(elapsed_ms_total = dt.as_millis() as u64, error = %e, "ask() gave up"),
        }
        res
    }
}

/// Wrapper around `awful_aj::api::ask` that implements [`AskAsync`].
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    /// LLM configuration (endpoint, key, model settings).
    pub config: &'a AwfulJadeConfig,
    /// Chat template defining the system prompt and conversation structure.
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        let dt = t0.elapsed();

        if let Err(e) = &res {
            warn!(elapsed_ms = dt.as_millis() as u64, error = %e, "API call failed");
        }
        res
    }
}

/// The production client: `awful_aj` behind five retried attempts.
pub fn llm_client<'a>(
    config: &'a AwfulJadeConfig,
    template: &'a ChatTemplate,
) -> RetryAsk<AskFnWrapper<'a>> {
    RetryAsk::new(AskFnWrapper { config, template }, 5, Duration::from_secs(1))
}
