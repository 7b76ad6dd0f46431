//! Drives fetch, parse and date filtering across every configured feed.
//!
//! Feeds are processed by a bounded pool (`buffered`), and outcomes are folded
//! in input order, so counters and the order of equal timestamps do not depend
//! on network timing. A feed that fails never affects another one.

use super::fetcher::FeedFetcher;
use super::parser::parse_feed;
use crate::models::{Article, RunStats};
use crate::retry::{Sleep, TokioSleep};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use tracing::{info, instrument, warn};

/// Inclusive `[start, end]` range of accepted publication times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// The `days` days up to and including `now`.
    pub fn trailing(days: i64, now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(days),
            end: now,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// What happened to one feed.
#[derive(Debug)]
enum FeedOutcome {
    /// Fetch failed or nothing could be parsed.
    Failed,
    /// Parsed, but nothing fell inside the window.
    Skipped { undated: usize },
    Fresh { articles: Vec<Article>, undated: usize },
}

/// Articles of a run plus the counters describing it.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Sorted newest first.
    pub articles: Vec<Article>,
    pub stats: RunStats,
}

pub struct Aggregator<S = TokioSleep> {
    fetcher: FeedFetcher<S>,
    concurrency: usize,
}

impl<S: Sleep> Aggregator<S> {
    pub fn new(fetcher: FeedFetcher<S>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Collect articles published in the last `days` days from every feed.
    ///
    /// Feeds are fetched and parsed at most `concurrency` at a time. A feed
    /// that fails to download or parse is counted and skipped, never fatal.
    ///
    /// # Arguments
    ///
    /// * `urls` - Feed URLs, in the order their outcomes are counted
    /// * `days` - Size of the window ending now; both ends are inclusive
    ///
    /// # Returns
    ///
    /// An [`Aggregation`] with the in-range articles, de-duplicated by link
    /// and sorted newest first (ties keep feed order), plus the [`RunStats`].
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let aggregator = Aggregator::new(FeedFetcher::new(config.to_fetch_config())?, 8);
    /// let run = aggregator.fetch_all(&config.feeds, 3).await;
    /// info!(articles = run.articles.len(), failed = run.stats.failed_feeds, "done");
    /// ```
    pub async fn fetch_all(&self, urls: &[String], days: i64) -> Aggregation {
        self.fetch_all_at(urls, days, Utc::now()).await
    }

    /// Same as [`Aggregator::fetch_all`] with an explicit "now".
    #[instrument(level = "info", skip(self, urls), fields(feeds = urls.len()))]
    pub async fn fetch_all_at(&self, urls: &[String], days: i64, now: DateTime<Utc>) -> Aggregation {
        let window = DateWindow::trailing(days, now);
        info!(start = %window.start, end = %window.end, "Fetching feeds");

        let outcomes: Vec<FeedOutcome> = stream::iter(urls)
            .map(|url| self.process(url, window))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut stats = RunStats {
            total_feeds: urls.len(),
            ..RunStats::default()
        };
        let mut collected = Vec::new();

        for outcome in outcomes {
            match outcome {
                FeedOutcome::Failed => stats.failed_feeds += 1,
                FeedOutcome::Skipped { undated } => {
                    stats.skipped_feeds += 1;
                    stats.undated_items += undated;
                }
                FeedOutcome::Fresh { articles, undated } => {
                    stats.successful_feeds += 1;
                    stats.undated_items += undated;
                    stats.valid_items += articles.len();
                    collected.extend(articles);
                }
            }
        }

        let before = collected.len();
        let mut articles: Vec<Article> = collected
            .into_iter()
            .unique_by(|a| a.link.clone())
            .collect();
        stats.duplicates = before - articles.len();

        articles.sort_by(|a, b| b.published_date.cmp(&a.published_date));

        info!(
            total = stats.total_feeds,
            successful = stats.successful_feeds,
            skipped = stats.skipped_feeds,
            failed = stats.failed_feeds,
            valid_items = stats.valid_items,
            undated_items = stats.undated_items,
            duplicates = stats.duplicates,
            "Feed processing summary"
        );
        if articles.is_empty() {
            warn!("No articles found in the requested date range");
        }

        Aggregation { articles, stats }
    }

    async fn process(&self, url: &str, window: DateWindow) -> FeedOutcome {
        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%url, error = %e, "Feed fetch failed");
                return FeedOutcome::Failed;
            }
        };

        let report = parse_feed(&bytes, url);
        if report.articles.is_empty() {
            warn!(%url, "Feed yielded no articles");
            return FeedOutcome::Failed;
        }

        let total = report.articles.len();
        let (dated, undated): (Vec<Article>, Vec<Article>) = report
            .articles
            .into_iter()
            .partition(|a| a.published_date.is_some());
        if !undated.is_empty() {
            warn!(%url, count = undated.len(), "Dropping articles without a parseable date");
        }

        let fresh: Vec<Article> = dated
            .into_iter()
            .filter(|a| a.published_date.is_some_and(|d| window.contains(d)))
            .collect();

        if fresh.is_empty() {
            info!(%url, total, "No articles in date range; skipping feed");
            return FeedOutcome::Skipped {
                undated: undated.len(),
            };
        }

        info!(%url, total, in_range = fresh.len(), "Feed processed");
        FeedOutcome::Fresh {
            articles: fresh,
            undated: undated.len(),
        }
    }
}
