//! Tag-soup fallback for feeds that are not well-formed XML.
//!
//! The document is handed to the `scraper` HTML parser, which never fails, and
//! items are located with CSS selectors. HTML parsing treats `<link>` as a void
//! element, so an RSS link usually ends up as the text node right after it.

use super::dates::parse_date;
use super::parser::{ItemError, ParseReport, SAMPLE_SIZE};
use crate::models::{Article, FeedFormat, UNTITLED};
use crate::utils::{collapse_whitespace, strip_html, truncate_for_log};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

const STRATEGIES: &[(&str, &str)] = &[
    ("lenient:item", "item"),
    ("lenient:entry", "entry"),
    ("lenient:channel>item", "channel > item"),
    ("lenient:feed>entry", "feed > entry"),
];

const RSS_DATES: &[&str] = &["pubdate", "published", "date", "dc:date"];
const RSS_BODIES: &[&str] = &["description", "content:encoded"];
const ATOM_DATES: &[&str] = &["published", "updated"];
const ATOM_BODIES: &[&str] = &["content", "summary"];

/// Extract items from a document the strict parser rejected.
pub fn parse(text: &str, source: &str) -> ParseReport {
    let document = Html::parse_document(&unwrap_cdata(text));

    for (strategy, css) in STRATEGIES {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        let elements: Vec<ElementRef> = document.select(&selector).collect();
        let Some(first) = elements.first() else {
            continue;
        };

        let format = if first.value().name() == "entry" {
            FeedFormat::Atom
        } else {
            FeedFormat::Rss
        };

        let mut articles = Vec::with_capacity(elements.len());
        let mut sample_dates = Vec::new();
        for element in &elements {
            match extract(*element, format, source) {
                Ok((article, raw_date)) => {
                    if let Some(raw) = raw_date.filter(|_| sample_dates.len() < SAMPLE_SIZE) {
                        sample_dates.push(raw);
                    }
                    articles.push(article);
                }
                Err(e) => debug!(%source, error = %e, "Skipping item"),
            }
        }

        info!(%source, %format, strategy, count = articles.len(), "Parsed feed leniently");
        return ParseReport {
            format,
            strategy,
            articles,
            sample_dates,
        };
    }

    ParseReport::empty(FeedFormat::Unknown)
}

/// Truncated markup of the first `channel` or `feed` element, or of the raw text.
pub fn visible_structure(text: &str) -> String {
    let document = Html::parse_document(text);
    let outline = Selector::parse("channel, feed")
        .ok()
        .and_then(|sel| document.select(&sel).next().map(|el| el.html()))
        .unwrap_or_else(|| text.to_string());
    truncate_for_log(&collapse_whitespace(&outline), 500)
}

/// CDATA sections are comments to an HTML parser; keep their content instead.
fn unwrap_cdata(text: &str) -> String {
    text.replace("<![CDATA[", "").replace("]]>", "")
}

/// The article plus the raw date text it was built from.
fn extract(
    item: ElementRef,
    format: FeedFormat,
    source: &str,
) -> Result<(Article, Option<String>), ItemError> {
    let (date_tags, body_tags) = match format {
        FeedFormat::Atom => (ATOM_DATES, ATOM_BODIES),
        _ => (RSS_DATES, RSS_BODIES),
    };

    let title_el = first_tag(item, &["title"]).ok_or(ItemError::MissingTitle)?;
    let title = Some(strip_html(&text_of(title_el)))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let link = find_link(item).ok_or(ItemError::MissingLink)?;

    let raw_date = first_tag(item, date_tags)
        .map(text_of)
        .filter(|t| !t.is_empty());
    let published_date = raw_date.as_deref().and_then(parse_date);

    let description = body_tags
        .iter()
        .filter_map(|tag| first_tag(item, &[*tag]))
        .map(text_of)
        .find(|text| !text.is_empty())
        .map(|html| strip_html(&html))
        .unwrap_or_else(|| title.clone());

    let article = Article {
        title,
        description,
        link,
        published_date,
        source: source.to_string(),
        summary: None,
    };
    Ok((article, raw_date))
}

/// First descendant whose tag matches one of `names`, tried in order of `names`.
fn first_tag<'a>(item: ElementRef<'a>, names: &[&str]) -> Option<ElementRef<'a>> {
    names.iter().find_map(|name| {
        item.descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == *name)
    })
}

fn text_of(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn find_link(item: ElementRef) -> Option<String> {
    let links: Vec<ElementRef> = item
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "link")
        .collect();

    let preferred = links
        .iter()
        .filter(|l| matches!(l.value().attr("rel"), None | Some("alternate")))
        .find_map(|l| link_value(*l));
    preferred.or_else(|| links.iter().find_map(|l| link_value(*l)))
}

/// Link text, else `href`, else the text node following a void `<link>`.
fn link_value(link: ElementRef) -> Option<String> {
    let text = text_of(link);
    if !text.is_empty() {
        return Some(text);
    }
    if let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) {
        return Some(href.to_string());
    }
    link.next_sibling()
        .and_then(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
}
