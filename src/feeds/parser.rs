//! Feed parsing: raw bytes in, normalized [`Article`]s out.
//!
//! The strict path builds a namespace-aware tree and tries an ordered list of
//! extraction strategies until one of them finds items. When the document is
//! not well-formed XML the lenient HTML-based parser in [`super::lenient`]
//! takes over. Nothing here returns an error: a broken feed yields an empty
//! [`ParseReport`].

use super::dates::parse_date;
use super::lenient;
use super::xml::{self, ATOM_NS, CONTENT_NS, DC_NS, Element, RSS1_NS};
use crate::models::{Article, FeedFormat, UNTITLED};
use crate::utils::{strip_html, truncate_for_log};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Outcome of parsing one feed document.
#[derive(Debug, Clone)]
pub struct ParseReport {
    pub format: FeedFormat,
    /// Name of the extraction strategy that produced the items, `"none"` when nothing matched.
    pub strategy: &'static str,
    pub articles: Vec<Article>,
    /// Raw date text of the first few articles, as written in the feed.
    pub sample_dates: Vec<String>,
}

impl ParseReport {
    pub(crate) fn empty(format: FeedFormat) -> Self {
        Self {
            format,
            strategy: "none",
            articles: Vec::new(),
            sample_dates: Vec::new(),
        }
    }
}

/// How many raw dates a report keeps.
pub(crate) const SAMPLE_SIZE: usize = 3;

/// Why a single item was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ItemError {
    #[error("item has no title element")]
    MissingTitle,
    #[error("item has no usable link")]
    MissingLink,
}

/// A named way of locating item elements in a parsed document.
type Strategy = (&'static str, fn(&Element) -> Vec<&Element>);

const ATOM_STRATEGIES: &[Strategy] = &[
    ("atom:entry", atom_namespaced_entries),
    ("entry", unqualified_entries),
    ("//entry", any_entries),
    ("//atom:entry", atom_entries_anywhere),
];

const RSS_STRATEGIES: &[Strategy] = &[
    ("//item", any_items),
    ("channel/item", channel_items),
    ("//channel/item", nested_channel_items),
    ("item", top_level_items),
    ("rss1:item", rss1_items),
];

fn atom_namespaced_entries(root: &Element) -> Vec<&Element> {
    root.children_named(Some(ATOM_NS), "entry").collect()
}

fn unqualified_entries(root: &Element) -> Vec<&Element> {
    root.children_named(None, "entry").collect()
}

fn any_entries(root: &Element) -> Vec<&Element> {
    root.descendants_where(|e| e.local_name == "entry")
}

fn atom_entries_anywhere(root: &Element) -> Vec<&Element> {
    root.descendants_where(|e| e.is(Some(ATOM_NS), "entry"))
}

fn any_items(root: &Element) -> Vec<&Element> {
    root.descendants_where(|e| e.is(None, "item"))
}

fn channel_items(root: &Element) -> Vec<&Element> {
    root.children_named(None, "channel")
        .flat_map(|channel| channel.children_named(None, "item"))
        .collect()
}

fn nested_channel_items(root: &Element) -> Vec<&Element> {
    root.descendants_where(|e| e.is(None, "channel"))
        .into_iter()
        .flat_map(|channel| channel.children_named(None, "item"))
        .collect()
}

fn top_level_items(root: &Element) -> Vec<&Element> {
    root.children_named(None, "item").collect()
}

fn rss1_items(root: &Element) -> Vec<&Element> {
    root.descendants_where(|e| e.is(Some(RSS1_NS), "item"))
}

/// Parse a feed document fetched from `source`.
///
/// The strict XML strategies run first. A document that is not well-formed
/// XML goes to the lenient HTML parser instead. Nothing is ever returned as
/// an error: a broken feed yields a report with no articles.
///
/// # Arguments
///
/// * `bytes` - Raw feed body as downloaded
/// * `source` - Feed URL, stored on every article and used in logs
///
/// # Returns
///
/// A [`ParseReport`] with the detected format, the name of the strategy that
/// matched (`"none"` if nothing did) and the extracted articles in document
/// order. Undated items are kept with `published_date: None`.
///
/// # Examples
///
/// ```ignore
/// let report = parse_feed(&bytes, "https://example.com/rss.xml");
/// info!(strategy = report.strategy, count = report.articles.len(), "parsed");
/// ```
#[instrument(level = "debug", skip(bytes), fields(bytes = bytes.len()))]
pub fn parse_feed(bytes: &[u8], source: &str) -> ParseReport {
    match xml::parse_document(bytes) {
        Ok(root) => parse_tree(&root, source),
        Err(e) => {
            warn!(%source, error = %e, "Strict XML parsing failed; trying lenient parser");
            let text = String::from_utf8_lossy(bytes);
            let report = lenient::parse(&text, source);
            if report.articles.is_empty() {
                warn!(
                    %source,
                    structure = %lenient::visible_structure(&text),
                    "Lenient parser found no items"
                );
            }
            report
        }
    }
}

fn parse_tree(root: &Element, source: &str) -> ParseReport {
    let (format, strategies) = if root.local_name.ends_with("feed") {
        (FeedFormat::Atom, ATOM_STRATEGIES)
    } else {
        (FeedFormat::Rss, RSS_STRATEGIES)
    };

    let Some((strategy, elements)) = strategies
        .iter()
        .map(|(name, find)| (*name, find(root)))
        .find(|(_, found)| !found.is_empty())
    else {
        warn!(
            %source,
            %format,
            root = %root.qualified_name,
            structure = %describe(root),
            "No items found in feed"
        );
        return ParseReport::empty(format);
    };

    debug!(%source, strategy, count = elements.len(), "Matched item elements");

    let mut articles = Vec::with_capacity(elements.len());
    let mut sample_dates = Vec::new();
    for element in elements {
        let (extracted, date_el) = match format {
            FeedFormat::Atom => (atom_article(element, source), atom_date(element)),
            _ => (rss_article(element, source), rss_date(element)),
        };
        match extracted {
            Ok(article) => {
                if let Some(raw) = date_el.map(Element::text).filter(|t| !t.is_empty()) {
                    if sample_dates.len() < SAMPLE_SIZE {
                        sample_dates.push(raw.to_string());
                    }
                }
                articles.push(article);
            }
            Err(e) => debug!(%source, error = %e, "Skipping item"),
        }
    }

    info!(%source, %format, strategy, count = articles.len(), "Parsed feed");
    ParseReport {
        format,
        strategy,
        articles,
        sample_dates,
    }
}

/// Child of an RSS item that is unqualified or shares the item's namespace (RSS 1.0).
fn rss_child<'a>(item: &'a Element, local_name: &str) -> Option<&'a Element> {
    item.children_local(local_name)
        .find(|c| c.namespace.is_none() || c.namespace == item.namespace)
}

/// Child bound to `namespace`, or written with the conventional `prefix`.
fn prefixed_child<'a>(
    item: &'a Element,
    namespace: &str,
    prefix: &str,
    local_name: &str,
) -> Option<&'a Element> {
    let qualified = format!("{prefix}:{local_name}");
    item.children_local(local_name).find(|c| {
        c.namespace.as_deref() == Some(namespace) || c.qualified_name == qualified
    })
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn rss_date(item: &Element) -> Option<&Element> {
    ["pubDate", "published", "date"]
        .iter()
        .find_map(|name| rss_child(item, name))
        .or_else(|| prefixed_child(item, DC_NS, "dc", "date"))
}

pub(crate) fn rss_article(item: &Element, source: &str) -> Result<Article, ItemError> {
    let title_el = rss_child(item, "title").ok_or(ItemError::MissingTitle)?;
    let title = non_empty(strip_html(&title_el.deep_text())).unwrap_or_else(|| UNTITLED.to_string());

    let link_el = rss_child(item, "link").ok_or(ItemError::MissingLink)?;
    let link = non_empty(link_el.text().to_string())
        .or_else(|| link_el.attr("href").map(|h| h.trim().to_string()))
        .filter(|l| !l.is_empty())
        .ok_or(ItemError::MissingLink)?;

    let published_date = rss_date(item).and_then(|e| parse_date(e.text()));

    let description = rss_child(item, "description")
        .map(Element::deep_text)
        .and_then(non_empty)
        .or_else(|| {
            prefixed_child(item, CONTENT_NS, "content", "encoded")
                .map(Element::deep_text)
                .and_then(non_empty)
        })
        .map(|html| strip_html(&html))
        .unwrap_or_else(|| title.clone());

    Ok(Article {
        title,
        description,
        link,
        published_date,
        source: source.to_string(),
        summary: None,
    })
}

/// Namespaced Atom child, falling back to an unqualified one of the same name.
fn atom_child<'a>(entry: &'a Element, local_name: &str) -> Option<&'a Element> {
    entry
        .child(Some(ATOM_NS), local_name)
        .or_else(|| entry.child(None, local_name))
}

fn atom_link(entry: &Element) -> Option<String> {
    let links: Vec<&Element> = entry
        .children_named(Some(ATOM_NS), "link")
        .chain(entry.children_named(None, "link"))
        .filter(|l| l.attr("href").is_some_and(|h| !h.trim().is_empty()))
        .collect();

    links
        .iter()
        .find(|l| matches!(l.attr("rel"), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| l.attr("href"))
        .map(|h| h.trim().to_string())
}

fn atom_date(entry: &Element) -> Option<&Element> {
    ["published", "updated"]
        .iter()
        .find_map(|name| atom_child(entry, name))
}

pub(crate) fn atom_article(entry: &Element, source: &str) -> Result<Article, ItemError> {
    let title_el = atom_child(entry, "title").ok_or(ItemError::MissingTitle)?;
    let title = non_empty(strip_html(&title_el.deep_text())).unwrap_or_else(|| UNTITLED.to_string());

    let link = atom_link(entry).ok_or(ItemError::MissingLink)?;

    let published_date = atom_date(entry).and_then(|e| parse_date(e.text()));

    let description = ["content", "summary"]
        .iter()
        .filter_map(|name| atom_child(entry, name))
        .map(Element::deep_text)
        .find(|text| !text.is_empty())
        .map(|html| strip_html(&html))
        .unwrap_or_else(|| title.clone());

    Ok(Article {
        title,
        description,
        link,
        published_date,
        source: source.to_string(),
        summary: None,
    })
}

/// One-line outline of the root and its children, for "nothing found" logs.
fn describe(root: &Element) -> String {
    let children: Vec<String> = root
        .children
        .iter()
        .map(|c| {
            let grandchildren: Vec<&str> = c.children.iter().map(|g| g.qualified_name.as_str()).collect();
            format!("{}[{}]", c.qualified_name, grandchildren.join(","))
        })
        .collect();
    truncate_for_log(&format!("<{}> {}", root.qualified_name, children.join(" ")), 500)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "https://feeds.example.com/rss";

    #[test]
    fn test_rss_items_are_extracted() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/"
     xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example</title>
    <item>
      <title>First story</title>
      <link>https://example.com/first</link>
      <pubDate>Thu, 22 May 2025 10:00:00 GMT</pubDate>
      <description><![CDATA[<p>Markets <b>rally</b> again</p>]]></description>
    </item>
    <item>
      <title>Second story</title>
      <link>https://example.com/second</link>
      <dc:date>2025-05-21T08:30:00Z</dc:date>
      <content:encoded>&lt;p&gt;Encoded body&lt;/p&gt;</content:encoded>
    </item>
    <item>
      <title>Third story</title>
      <link>https://example.com/third</link>
    </item>
  </channel>
</rss>"#;

        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.format, FeedFormat::Rss);
        assert_eq!(report.strategy, "//item");
        assert_eq!(report.articles.len(), 3);

        let first = &report.articles[0];
        assert_eq!(first.title, "First story");
        assert_eq!(first.link, "https://example.com/first");
        assert_eq!(first.description, "Markets rally again");
        assert_eq!(
            first.published_date,
            Some(Utc.with_ymd_and_hms(2025, 5, 22, 10, 0, 0).unwrap())
        );
        assert_eq!(first.source, SOURCE);
        assert_eq!(first.summary, None);

        let second = &report.articles[1];
        assert_eq!(second.description, "Encoded body");
        assert_eq!(
            second.published_date,
            Some(Utc.with_ymd_and_hms(2025, 5, 21, 8, 30, 0).unwrap())
        );

        let third = &report.articles[2];
        assert_eq!(third.description, "Third story");
        assert_eq!(third.published_date, None);

        assert_eq!(
            report.sample_dates,
            vec!["Thu, 22 May 2025 10:00:00 GMT", "2025-05-21T08:30:00Z"]
        );
    }

    #[test]
    fn test_rss_items_without_title_or_link_are_excluded() {
        let xml = br#"<rss><channel>
  <item><link>https://example.com/no-title</link><description>x</description></item>
  <item><title>No link</title><description>x</description></item>
  <item><title>Empty link</title><link>   </link></item>
  <item><title></title><link>https://example.com/blank-title</link></item>
  <item><title>Kept</title><link>https://example.com/kept</link></item>
</channel></rss>"#;

        let report = parse_feed(xml, SOURCE);
        let titles: Vec<&str> = report.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec![UNTITLED, "Kept"]);
    }

    #[test]
    fn test_rss_title_markup_is_stripped() {
        let xml = br#"<rss><channel><item>
  <title><![CDATA[Tom &amp; <b>Jerry</b>
    return]]></title>
  <link>https://example.com/tj</link>
</item></channel></rss>"#;

        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.articles[0].title, "Tom & Jerry return");
    }

    #[test]
    fn test_rss_link_from_href_attribute() {
        let xml = br#"<rss><channel><item><title>T</title><link href="https://example.com/h"/></item></channel></rss>"#;
        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.articles[0].link, "https://example.com/h");
    }

    #[test]
    fn test_atom_namespaced_entries() {
        let xml = br#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <entry>
    <title type="html">Atom &lt;em&gt;one&lt;/em&gt;</title>
    <link rel="self" href="https://example.com/self"/>
    <link rel="alternate" href="https://example.com/one"/>
    <published>2025-05-22T10:00:00Z</published>
    <updated>2025-05-23T10:00:00Z</updated>
    <summary>Short summary</summary>
    <content type="html">&lt;p&gt;Full content&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Atom two</title>
    <link href="https://example.com/two"/>
    <updated>2025-05-20T06:00:00+02:00</updated>
    <summary>Only summary</summary>
  </entry>
  <entry>
    <title>Undated</title>
    <link href="https://example.com/three"/>
  </entry>
</feed>"#;

        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.format, FeedFormat::Atom);
        assert_eq!(report.strategy, "atom:entry");
        assert_eq!(report.articles.len(), 3);

        let one = &report.articles[0];
        assert_eq!(one.title, "Atom one");
        assert_eq!(one.link, "https://example.com/one");
        assert_eq!(one.description, "Full content");
        assert_eq!(
            one.published_date,
            Some(Utc.with_ymd_and_hms(2025, 5, 22, 10, 0, 0).unwrap())
        );

        let two = &report.articles[1];
        assert_eq!(two.description, "Only summary");
        assert_eq!(
            two.published_date,
            Some(Utc.with_ymd_and_hms(2025, 5, 20, 4, 0, 0).unwrap())
        );

        let three = &report.articles[2];
        assert_eq!(three.description, "Undated");
        assert_eq!(three.published_date, None);
    }

    #[test]
    fn test_atom_without_namespace_declaration() {
        let xml = br#"<feed><entry><title>Plain</title><link href="https://example.com/p"/><updated>2025-05-22</updated></entry></feed>"#;
        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.format, FeedFormat::Atom);
        assert_eq!(report.strategy, "entry");
        assert_eq!(report.articles[0].link, "https://example.com/p");
    }

    #[test]
    fn test_atom_entries_nested_below_root() {
        let xml = br#"<feed xmlns="http://www.w3.org/2005/Atom"><group><entry><title>Deep</title><link href="https://example.com/d"/></entry></group></feed>"#;
        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.strategy, "//entry");
        assert_eq!(report.articles.len(), 1);
    }

    #[test]
    fn test_rss1_rdf_items() {
        let xml = br#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://example.com/"><title>RDF</title></channel>
  <item rdf:about="https://example.com/rdf-1">
    <title>RDF story</title>
    <link>https://example.com/rdf-1</link>
    <dc:date>2025-05-22T10:00:00+00:00</dc:date>
    <description>RDF description</description>
  </item>
</rdf:RDF>"#;

        let report = parse_feed(xml, SOURCE);
        assert_eq!(report.format, FeedFormat::Rss);
        assert_eq!(report.strategy, "rss1:item");
        assert_eq!(report.articles.len(), 1);
        assert_eq!(report.articles[0].title, "RDF story");
        assert_eq!(report.articles[0].description, "RDF description");
        assert!(report.articles[0].published_date.is_some());
    }

    #[test]
    fn test_malformed_xml_uses_lenient_parser() {
        let body = b"<rss><channel><item><title>Broken &nbsp; feed</title>\
<link>https://example.com/broken</link>\
<pubDate>Thu, 22 May 2025 10:00:00 GMT</pubDate>\
<description>Still <b>readable</b></description></item></channel>";

        let report = parse_feed(body, SOURCE);
        assert_eq!(report.strategy, "lenient:item");
        assert_eq!(report.format, FeedFormat::Rss);
        assert_eq!(report.articles.len(), 1);
        assert_eq!(report.articles[0].title, "Broken feed");
        assert_eq!(report.articles[0].link, "https://example.com/broken");
        assert_eq!(report.articles[0].description, "Still readable");
        assert!(report.articles[0].published_date.is_some());
    }

    #[test]
    fn test_garbage_yields_empty_report() {
        let report = parse_feed(b"this is definitely not a feed", SOURCE);
        assert!(report.articles.is_empty());
        assert_eq!(report.strategy, "none");
        assert_eq!(report.format, FeedFormat::Unknown);
    }

    #[test]
    fn test_well_formed_document_without_items() {
        let report = parse_feed(b"<rss><channel><title>Empty</title></channel></rss>", SOURCE);
        assert!(report.articles.is_empty());
        assert_eq!(report.strategy, "none");
        assert_eq!(report.format, FeedFormat::Rss);
    }
}
