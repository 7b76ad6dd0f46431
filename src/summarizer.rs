//! Article summaries and the aggregate social post.
//!
//! Every article gets its own prompt; summaries run with bounded concurrency
//! and keep the input order. A failed summary never drops the article, it
//! gets [`SUMMARY_UNAVAILABLE`] instead. The social post is optional.

use crate::api::AskAsync;
use crate::models::{Article, Digest};
use crate::utils::truncate_for_log;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

/// Text stored when the LLM could not summarize an article.
pub const SUMMARY_UNAVAILABLE: &str = "Summary unavailable for this article.";

const ARTICLE_PROMPT: &str = "\
Summarize the news article below.
1. Capture the main point and one important detail or implication.
2. Keep it short: a single paragraph, no lists, no line breaks.
3. Do not add information, opinions, sources or authors that are not in the article.
4. Keep proper names and technical terms unchanged.
5. Write in {language}.

Answer in the format
Summary: <summary>

Title: {title}
Description: {description}
Source: {source}
";

const SOCIAL_PROMPT: &str = "\
Write one short social media post (at most 1300 characters) highlighting the
most relevant stories below. Use a professional tone, no hashtag spam, and
write in {language}.

Answer in the format
Post: <post>

{articles}
";

/// Text after the first occurrence of `label`, or the whole text when absent.
fn strip_label(text: &str, label: &str) -> String {
    let body = match text.find(label) {
        Some(idx) => &text[idx + label.len()..],
        None => text,
    };
    body.trim().to_string()
}

#[derive(Debug)]
pub struct Summarizer<A> {
    client: A,
    language: String,
    concurrency: usize,
}

impl<A> Summarizer<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(client: A, language: impl Into<String>, concurrency: usize) -> Self {
        Self {
            client,
            language: language.into(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn article_prompt(&self, article: &Article) -> String {
        ARTICLE_PROMPT
            .replace("{language}", &self.language)
            .replace("{title}", &article.title)
            .replace("{description}", &article.description)
            .replace("{source}", &article.source)
    }

    pub fn social_prompt(&self, articles: &[Article]) -> String {
        let listing = articles
            .iter()
            .map(|a| {
                format!(
                    "Title: {}\nSummary: {}\nSource: {}",
                    a.title,
                    a.summary.as_deref().unwrap_or(&a.description),
                    a.source
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        SOCIAL_PROMPT
            .replace("{language}", &self.language)
            .replace("{articles}", &listing)
    }

    /// Summarize one article, returning a new value that carries the summary.
    #[instrument(level = "info", skip_all, fields(title = %article.title))]
    pub async fn summarize_article(&self, article: &Article) -> Article {
        let summary = match self.client.ask(&self.article_prompt(article)).await {
            Ok(raw) => {
                debug!(response = %truncate_for_log(&raw, 300), "LLM response");
                let cleaned = strip_label(&raw, "Summary:");
                if cleaned.is_empty() {
                    warn!("Empty summary from LLM");
                    SUMMARY_UNAVAILABLE.to_string()
                } else {
                    cleaned
                }
            }
            Err(e) => {
                error!(error = %e, "Summary generation failed");
                SUMMARY_UNAVAILABLE.to_string()
            }
        };
        article.with_summary(summary)
    }

    /// Summarize every article, at most `concurrency` at a time, keeping order.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn summarize_all(&self, articles: &[Article]) -> Vec<Article> {
        let summarized: Vec<Article> = stream::iter(articles)
            .map(|article| self.summarize_article(article))
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = summarized
            .iter()
            .filter(|a| a.summary.as_deref() == Some(SUMMARY_UNAVAILABLE))
            .count();
        info!(total = summarized.len(), failed, "Summaries finished");
        summarized
    }

    /// One post covering all articles; `None` when generation fails.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn social_post(&self, articles: &[Article]) -> Option<String> {
        if articles.is_empty() {
            return None;
        }
        match self.client.ask(&self.social_prompt(articles)).await {
            Ok(raw) => {
                let post = strip_label(&raw, "Post:");
                if post.is_empty() {
                    warn!("Empty social post from LLM");
                    None
                } else {
                    info!(chars = post.chars().count(), "Social post generated");
                    Some(post)
                }
            }
            Err(e) => {
                error!(error = %e, "Social post generation failed");
                None
            }
        }
    }

    /// Summaries, social post and date grouping in one go.
    pub async fn build_digest(&self, articles: &[Article]) -> Digest {
        let summarized = self.summarize_all(articles).await;
        let post = self.social_post(&summarized).await;
        Digest::from_articles(summarized, post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::ScriptedAsk;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn article(title: &str, day: u32) -> Article {
        Article {
            title: title.to_string(),
            description: format!("{title} description"),
            link: format!("https://example.com/{title}"),
            published_date: Some(Utc.with_ymd_and_hms(2025, 5, day, 9, 0, 0).unwrap()),
            source: "https://feeds.example.com/rss".to_string(),
            summary: None,
        }
    }

    #[test]
    fn test_strip_label() {
        assert_eq!(strip_label("Summary: short text ", "Summary:"), "short text");
        assert_eq!(strip_label("Here you go\nPost: hello", "Post:"), "hello");
        assert_eq!(strip_label("  no label ", "Post:"), "no label");
    }

    #[test]
    fn test_article_prompt_contains_fields() {
        let s = Summarizer::new(ScriptedAsk::new(|_: &str| Ok(String::new())), "English", 2);
        let prompt = s.article_prompt(&article("Alpha", 22));
        assert!(prompt.contains("Title: Alpha"));
        assert!(prompt.contains("Description: Alpha description"));
        assert!(prompt.contains("Source: https://feeds.example.com/rss"));
        assert!(prompt.contains("Write in English."));
    }

    #[tokio::test]
    async fn test_summaries_keep_order_and_tolerate_failures() {
        let client = ScriptedAsk::new(|prompt: &str| {
            if prompt.contains("Title: Broken") {
                Err("backend down".to_string())
            } else if prompt.contains("Title: Alpha") {
                Ok("Summary: Alpha in brief".to_string())
            } else {
                Ok("Beta in brief".to_string())
            }
        });
        let s = Summarizer::new(client, "English", 3);
        let input = vec![article("Alpha", 22), article("Broken", 22), article("Beta", 21)];

        let out = s.summarize_all(&input).await;

        let summaries: Vec<Option<&str>> = out.iter().map(|a| a.summary.as_deref()).collect();
        assert_eq!(
            summaries,
            vec![Some("Alpha in brief"), Some(SUMMARY_UNAVAILABLE), Some("Beta in brief")]
        );
        assert!(input.iter().all(|a| a.summary.is_none()));
        assert_eq!(out[1].title, "Broken");
    }

    #[tokio::test]
    async fn test_social_post_uses_summaries_and_strips_label() {
        let client = ScriptedAsk::new(|_: &str| Ok("Sure!\nPost: Big news today".to_string()));
        let s = Summarizer::new(client, "English", 1);
        let articles = vec![article("Alpha", 22).with_summary("Alpha short".to_string())];

        let post = s.social_post(&articles).await;

        assert_eq!(post.as_deref(), Some("Big news today"));
        let prompts = s.client.prompts.lock().unwrap();
        assert!(prompts[0].contains("Summary: Alpha short"));
    }

    #[tokio::test]
    async fn test_social_post_failure_is_none() {
        let s = Summarizer::new(ScriptedAsk::new(|_: &str| Err("nope".to_string())), "English", 1);
        assert_eq!(s.social_post(&[article("Alpha", 22)]).await, None);
        assert_eq!(s.social_post(&[]).await, None);
    }

    #[tokio::test]
    async fn test_build_digest_groups_summarized_articles() {
        let client = ScriptedAsk::new(|prompt: &str| {
            if prompt.contains("social media post") {
                Ok("Post: weekly roundup".to_string())
            } else {
                Ok("Summary: done".to_string())
            }
        });
        let s = Summarizer::new(client, "English", 2);

        let digest = s
            .build_digest(&[article("Alpha", 22), article("Beta", 21), article("Gamma", 22)])
            .await;

        assert_eq!(digest.days.len(), 2);
        assert_eq!(digest.days[0].articles.len(), 2);
        assert_eq!(digest.social_post.as_deref(), Some("weekly roundup"));
        assert!(
            digest
                .days
                .iter()
                .flat_map(|d| &d.articles)
                .all(|a| a.summary.as_deref() == Some("done"))
        );
    }
}
