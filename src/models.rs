//! Data models shared by the ingestion pipeline and the digest outputs.
//!
//! - [`Article`]: one normalized feed item, independent of RSS or Atom dialect
//! - [`FeedFormat`]: which dialect a feed document was detected as
//! - [`RunStats`]: per-run feed outcome counters, used only for logging
//! - [`Digest`] / [`DigestDay`]: summarized articles grouped by calendar date

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Title used when a feed item carries no usable title text.
pub const UNTITLED: &str = "Untitled";

/// A normalized news article extracted from a feed.
///
/// Records are built once by the parser and never mutated afterwards.
/// Adding a summary produces a new value through [`Article::with_summary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Headline of the article.
    pub title: String,
    /// Plain-text description with HTML markup stripped.
    pub description: String,
    /// Canonical article URL.
    pub link: String,
    /// Publication timestamp, always UTC. `None` when the feed date was unparseable.
    pub published_date: Option<DateTime<Utc>>,
    /// URL of the feed the article came from.
    pub source: String,
    /// LLM summary, filled in by the summarizer.
    pub summary: Option<String>,
}

impl Article {
    /// Return a copy of this article carrying `summary`.
    pub fn with_summary(&self, summary: String) -> Article {
        Article {
            summary: Some(summary),
            ..self.clone()
        }
    }

    /// Host of the originating feed, e.g. `"feeds.bbci.co.uk"`.
    pub fn source_host(&self) -> String {
        url::Url::parse(&self.source)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| self.source.clone())
    }
}

/// Feed dialect detected from the document root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeedFormat {
    Rss,
    Atom,
    Unknown,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedFormat::Rss => write!(f, "RSS"),
            FeedFormat::Atom => write!(f, "Atom"),
            FeedFormat::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Outcome counters for one aggregation run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Feeds attempted.
    pub total_feeds: usize,
    /// Feeds that contributed at least one in-range article.
    pub successful_feeds: usize,
    /// Feeds that parsed but had nothing inside the date window.
    pub skipped_feeds: usize,
    /// Feeds that could not be fetched or yielded no articles at all.
    pub failed_feeds: usize,
    /// In-range articles kept before de-duplication.
    pub valid_items: usize,
    /// Articles dropped because their date was missing or unparseable.
    pub undated_items: usize,
    /// Articles collapsed because another feed already supplied the same link.
    pub duplicates: usize,
}

/// Articles published on one calendar day (UTC).
#[derive(Debug, Clone, Serialize)]
pub struct DigestDay {
    pub date: NaiveDate,
    pub articles: Vec<Article>,
}

/// Aggregate numbers shown at the top of the digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestStats {
    pub total_articles: usize,
    pub total_days: usize,
    pub total_sources: usize,
    pub sources: Vec<String>,
}

/// The summarized, date-grouped result handed to the renderers.
#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    /// Days in descending order, newest first.
    pub days: Vec<DigestDay>,
    /// Aggregate social-media post generated from all articles.
    pub social_post: Option<String>,
    pub stats: DigestStats,
}

impl Digest {
    /// Group dated articles by calendar day. Undated articles are ignored.
    ///
    /// Within a day the incoming order is preserved.
    pub fn from_articles(articles: Vec<Article>, social_post: Option<String>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Vec<Article>> = BTreeMap::new();
        let mut sources = BTreeSet::new();

        for article in articles {
            let Some(published) = article.published_date else {
                continue;
            };
            sources.insert(article.source.clone());
            by_date
                .entry(published.date_naive())
                .or_default()
                .push(article);
        }

        let days: Vec<DigestDay> = by_date
            .into_iter()
            .rev()
            .map(|(date, articles)| DigestDay { date, articles })
            .collect();

        let stats = DigestStats {
            total_articles: days.iter().map(|d| d.articles.len()).sum(),
            total_days: days.len(),
            total_sources: sources.len(),
            sources: sources.into_iter().collect(),
        };

        Digest {
            days,
            social_post,
            stats,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Email subject line for the digest.
    ///
    /// One day: `Daily News Summary - 2025-05-23`.
    /// Several days: `News Summary 2025-05-21 to 2025-05-23`.
    pub fn subject(&self) -> String {
        let first = self.days.last().map(|d| d.date);
        let last = self.days.first().map(|d| d.date);
        match (first, last) {
            (Some(first), Some(last)) if first == last => {
                format!("Daily News Summary - {}", first.format("%Y-%m-%d"))
            }
            (Some(first), Some(last)) => format!(
                "News Summary {} to {}",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            ),
            _ => "Daily News Summary".to_string(),
        }
    }
}
