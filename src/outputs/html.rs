//! HTML rendering of the digest email.
//!
//! The layout is fixed: a header with the run statistics, the optional social
//! post, then one section per day (newest first) listing each article with its
//! summary. All feed-provided text is escaped.

use crate::models::{Article, Digest};
use quick_xml::escape::escape;
use std::fmt::{self, Write};

const STYLE: &str = "\
body{font-family:Helvetica,Arial,sans-serif;max-width:720px;margin:0 auto;color:#222;line-height:1.5}\
h1{font-size:22px;border-bottom:2px solid #333;padding-bottom:6px}\
h2{font-size:18px;margin-top:28px;color:#444}\
.stats{color:#666;font-size:13px}\
.social{background:#f3f6fa;border-left:4px solid #0a66c2;padding:10px 14px}\
.article{margin:14px 0;padding-bottom:10px;border-bottom:1px solid #eee}\
.article h3{font-size:16px;margin:0 0 4px}\
.meta{color:#888;font-size:12px;margin:0 0 6px}";

/// Render the full HTML document for `digest`.
pub fn render_digest(digest: &Digest) -> Result<String, fmt::Error> {
    let subject = digest.subject();
    let mut html = String::new();

    writeln!(html, "<!DOCTYPE html>")?;
    writeln!(html, "<html><head><meta charset=\"utf-8\">")?;
    writeln!(html, "<title>{}</title>", escape(subject.as_str()))?;
    writeln!(html, "<style>{STYLE}</style></head><body>")?;
    writeln!(html, "<h1>{}</h1>", escape(subject.as_str()))?;
    writeln!(
        html,
        "<p class=\"stats\">{} articles from {} sources across {} day(s)</p>",
        digest.stats.total_articles, digest.stats.total_sources, digest.stats.total_days
    )?;

    if let Some(post) = &digest.social_post {
        let body = escape(post.as_str()).replace('\n', "<br>\n");
        writeln!(html, "<div class=\"social\"><h2>Social post</h2><p>{body}</p></div>")?;
    }

    for day in &digest.days {
        writeln!(html, "<h2>{}</h2>", day.date.format("%A, %B %-d, %Y"))?;
        for article in &day.articles {
            render_article(&mut html, article)?;
        }
    }

    writeln!(html, "</body></html>")?;
    Ok(html)
}

fn render_article(html: &mut String, article: &Article) -> fmt::Result {
    let time = article
        .published_date
        .map(|d| d.format("%H:%M UTC").to_string())
        .unwrap_or_default();
    let text = article.summary.as_deref().unwrap_or(&article.description);

    writeln!(html, "<div class=\"article\">")?;
    writeln!(
        html,
        "<h3><a href=\"{}\">{}</a></h3>",
        escape(article.link.as_str()),
        escape(article.title.as_str())
    )?;
    writeln!(
        html,
        "<p class=\"meta\">{} &middot; {}</p>",
        escape(article.source_host().as_str()),
        time
    )?;
    writeln!(html, "<p>{}</p>", escape(text))?;
    writeln!(html, "</div>")
}

/// Plain-text alternative part, same content as the HTML body.
pub fn render_text(digest: &Digest) -> String {
    let mut out = format!("{}\n\n", digest.subject());
    if let Some(post) = &digest.social_post {
        out.push_str(post);
        out.push_str("\n\n");
    }
    for day in &digest.days {
        out.push_str(&format!("== {} ==\n\n", day.date.format("%Y-%m-%d")));
        for a in &day.articles {
            let text = a.summary.as_deref().unwrap_or(&a.description);
            out.push_str(&format!("* {}\n  {}\n  {}\n\n", a.title, text, a.link));
        }
    }
    out
}
