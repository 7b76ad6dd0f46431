//! Per-feed health report used by the `diagnose` command.
//!
//! Each feed is fetched and parsed exactly like a normal run, then described:
//! reachable or not, detected format, matching strategy, item count, a few
//! sample titles and the shapes of the dates it publishes.

use super::fetcher::FeedFetcher;
use super::parser::{SAMPLE_SIZE, parse_feed};
use crate::models::FeedFormat;
use crate::retry::Sleep;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, instrument, warn};

/// Rough shape of a feed date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum DateShape {
    #[serde(rename = "RFC822")]
    Rfc822,
    #[serde(rename = "ISO8601_UTC")]
    Iso8601Utc,
    #[serde(rename = "ISO8601_TZ")]
    Iso8601Tz,
    #[serde(rename = "Date_Only")]
    DateOnly,
    Unknown,
}

impl fmt::Display for DateShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DateShape::Rfc822 => "RFC822",
            DateShape::Iso8601Utc => "ISO8601_UTC",
            DateShape::Iso8601Tz => "ISO8601_TZ",
            DateShape::DateOnly => "Date_Only",
            DateShape::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

static DATE_SHAPES: Lazy<Vec<(Regex, DateShape)>> = Lazy::new(|| {
    [
        (r"^\w{3}, \d{1,2} \w{3} \d{4} \d{2}:\d{2}:\d{2}", DateShape::Rfc822),
        (r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z", DateShape::Iso8601Utc),
        (r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}[+-]\d{2}:\d{2}", DateShape::Iso8601Tz),
        (r"^\d{4}-\d{2}-\d{2}", DateShape::DateOnly),
    ]
    .into_iter()
    .filter_map(|(pattern, shape)| Regex::new(pattern).ok().map(|re| (re, shape)))
    .collect()
});

/// Classify a raw date string. The first matching shape wins.
pub fn classify_date(text: &str) -> DateShape {
    let text = text.trim();
    DATE_SHAPES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, shape)| *shape)
        .unwrap_or(DateShape::Unknown)
}

/// Diagnosis of one feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedDiagnosis {
    pub url: String,
    pub accessible: bool,
    pub error: Option<String>,
    pub format: FeedFormat,
    pub strategy: &'static str,
    pub items_found: usize,
    pub sample_titles: Vec<String>,
    pub date_shapes: BTreeSet<DateShape>,
}

/// Totals over all diagnosed feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosisSummary {
    pub total_feeds: usize,
    pub working: Vec<String>,
    pub blocked: Vec<String>,
    pub empty: Vec<String>,
}

impl DiagnosisSummary {
    pub fn from_results(results: &[FeedDiagnosis]) -> Self {
        let mut summary = DiagnosisSummary {
            total_feeds: results.len(),
            ..Default::default()
        };
        for r in results {
            let bucket = if !r.accessible {
                &mut summary.blocked
            } else if r.items_found == 0 {
                &mut summary.empty
            } else {
                &mut summary.working
            };
            bucket.push(r.url.clone());
        }
        summary
    }

    /// Share of working feeds, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_feeds == 0 {
            return 0.0;
        }
        self.working.len() as f64 * 100.0 / self.total_feeds as f64
    }
}

/// Fetch, parse and describe one feed.
#[instrument(level = "info", skip(fetcher))]
pub async fn diagnose_feed<S: Sleep>(fetcher: &FeedFetcher<S>, url: &str) -> FeedDiagnosis {
    let bytes = match fetcher.fetch(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Feed not accessible");
            return FeedDiagnosis {
                url: url.to_string(),
                accessible: false,
                error: Some(e.to_string()),
                format: FeedFormat::Unknown,
                strategy: "none",
                items_found: 0,
                sample_titles: Vec::new(),
                date_shapes: BTreeSet::new(),
            };
        }
    };

    let report = parse_feed(&bytes, url);
    let diagnosis = FeedDiagnosis {
        url: url.to_string(),
        accessible: true,
        error: None,
        format: report.format,
        strategy: report.strategy,
        items_found: report.articles.len(),
        sample_titles: report
            .articles
            .iter()
            .take(SAMPLE_SIZE)
            .map(|a| a.title.clone())
            .collect(),
        date_shapes: report.sample_dates.iter().map(|d| classify_date(d)).collect(),
    };

    info!(
        format = %diagnosis.format,
        strategy = diagnosis.strategy,
        items = diagnosis.items_found,
        "Feed diagnosed"
    );
    diagnosis
}

/// Diagnose every feed, at most `concurrency` at a time, keeping input order.
pub async fn diagnose_all<S: Sleep>(
    fetcher: &FeedFetcher<S>,
    urls: &[String],
    concurrency: usize,
) -> (Vec<FeedDiagnosis>, DiagnosisSummary) {
    let results: Vec<FeedDiagnosis> = stream::iter(urls)
        .map(|url| diagnose_feed(fetcher, url))
        .buffered(concurrency.max(1))
        .collect()
        .await;
    let summary = DiagnosisSummary::from_results(&results);
    (results, summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::fetcher::FetchConfig;
    use crate::retry::RetryPolicy;
    use crate::retry::tests::RecordingSleep;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_classify_date() {
        assert_eq!(classify_date("Thu, 22 May 2025 10:00:00 GMT"), DateShape::Rfc822);
        assert_eq!(classify_date("2025-05-22T10:00:00Z"), DateShape::Iso8601Utc);
        assert_eq!(classify_date("2025-05-22T10:00:00+02:00"), DateShape::Iso8601Tz);
        assert_eq!(classify_date("2025-05-22"), DateShape::DateOnly);
        assert_eq!(classify_date("2025-05-22T10:00:00.123Z"), DateShape::DateOnly);
        assert_eq!(classify_date("last tuesday"), DateShape::Unknown);
        assert_eq!(DateShape::Iso8601Tz.to_string(), "ISO8601_TZ");
    }

    #[test]
    fn test_summary_buckets() {
        let make = |url: &str, accessible: bool, items_found: usize| FeedDiagnosis {
            url: url.to_string(),
            accessible,
            error: None,
            format: FeedFormat::Rss,
            strategy: "//item",
            items_found,
            sample_titles: Vec::new(),
            date_shapes: BTreeSet::new(),
        };
        let summary = DiagnosisSummary::from_results(&[
            make("a", true, 3),
            make("b", false, 0),
            make("c", true, 0),
            make("d", true, 1),
        ]);

        assert_eq!(summary.working, vec!["a", "d"]);
        assert_eq!(summary.blocked, vec!["b"]);
        assert_eq!(summary.empty, vec!["c"]);
        assert_eq!(summary.success_rate(), 50.0);
    }

    #[tokio::test]
    async fn test_diagnose_all_reports_each_feed() {
        let server = MockServer::start().await;
        let body = r#"<rss><channel>
<item><title>One</title><link>https://e.com/1</link><pubDate>Thu, 22 May 2025 10:00:00 GMT</pubDate></item>
<item><title>Two</title><link>https://e.com/2</link><pubDate>2025-05-22T09:00:00Z</pubDate></item>
</channel></rss>"#;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let config = FetchConfig {
            retry: RetryPolicy::new(1, Duration::from_millis(1)).with_jitter(Duration::ZERO),
            pre_request_jitter: Duration::ZERO,
            ..FetchConfig::default()
        };
        let fetcher = FeedFetcher::with_sleeper(config, RecordingSleep::default()).unwrap();
        let urls = vec![
            format!("{}/ok", server.uri()),
            format!("{}/forbidden", server.uri()),
        ];

        let (results, summary) = diagnose_all(&fetcher, &urls, 2).await;

        assert_eq!(results[0].items_found, 2);
        assert_eq!(results[0].strategy, "//item");
        assert_eq!(results[0].sample_titles, vec!["One", "Two"]);
        assert_eq!(
            results[0].date_shapes,
            BTreeSet::from([DateShape::Rfc822, DateShape::Iso8601Utc])
        );
        assert!(!results[1].accessible);
        assert!(results[1].error.is_some());
        assert_eq!(summary.working, vec![urls[0].clone()]);
        assert_eq!(summary.blocked, vec![urls[1].clone()]);
    }
}
