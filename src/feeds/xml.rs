//! Strict, namespace-aware XML tree built on `quick_xml::NsReader`.
//!
//! Feed extraction needs to walk paths such as `channel/item` or look for
//! `{http://www.w3.org/2005/Atom}entry` at any depth, so the event stream is
//! folded into a small owned element tree. Any well-formedness problem is an
//! error; the caller then switches to the lenient HTML-based parser.

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use thiserror::Error;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
pub const RSS1_NS: &str = "http://purl.org/rss/1.0/";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";

/// Reasons a document is not well-formed enough for the strict parser.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),
    #[error("invalid attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("undefined entity &{0};")]
    UnknownEntity(String),
    #[error("text outside of the root element")]
    TextOutsideRoot,
    #[error("more than one root element")]
    MultipleRoots,
    #[error("closing tag without matching opening tag")]
    UnexpectedEnd,
    #[error("unclosed element <{0}>")]
    Unclosed(String),
    #[error("document has no root element")]
    NoRoot,
}

/// One XML element with its resolved namespace.
#[derive(Debug, Clone, Default)]
pub struct Element {
    /// Namespace URI the element name resolved to, if any.
    pub namespace: Option<String>,
    /// Name without prefix, e.g. `entry`.
    pub local_name: String,
    /// Name as written, e.g. `atom:entry` or `dc:date`.
    pub qualified_name: String,
    /// Attributes keyed by local name.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Direct text and CDATA content, in document order.
    text: String,
}

impl Element {
    /// `true` when the element has this local name and namespace (`None` = unqualified).
    pub fn is(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == namespace
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct text content, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// Text of this element and all of its descendants, trimmed.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(&self.text);
        for child in &self.children {
            out.push(' ');
            child.collect_text(out);
        }
    }

    /// First direct child matching namespace and local name.
    pub fn child(&self, namespace: Option<&str>, local_name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, local_name))
    }

    /// Direct children matching namespace and local name.
    pub fn children_named<'a>(
        &'a self,
        namespace: Option<&str>,
        local_name: &str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children
            .iter()
            .filter(move |c| c.is(namespace, local_name))
    }

    /// Direct children with this local name, in any namespace.
    pub fn children_local<'a>(&'a self, local_name: &str) -> impl Iterator<Item = &'a Element> {
        self.children
            .iter()
            .filter(move |c| c.local_name == local_name)
    }

    /// All descendants (depth first, document order) accepted by `pred`.
    pub fn descendants_where<'a, P>(&'a self, pred: P) -> Vec<&'a Element>
    where
        P: Fn(&Element) -> bool,
    {
        let mut found = Vec::new();
        self.walk(&pred, &mut found);
        found
    }

    fn walk<'a, P>(&'a self, pred: &P, found: &mut Vec<&'a Element>)
    where
        P: Fn(&Element) -> bool,
    {
        for child in &self.children {
            if pred(child) {
                found.push(child);
            }
            child.walk(pred, found);
        }
    }
}

/// Parse a complete document into its root element.
pub fn parse_document(bytes: &[u8]) -> Result<Element, XmlError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (ns, event) = reader.read_resolved_event_into(&mut buf)?;
        let namespace = owned_namespace(&ns);

        match event {
            Event::Start(e) => stack.push(open_element(namespace, &e)?),
            Event::Empty(e) => {
                let element = open_element(namespace, &e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(XmlError::UnexpectedEnd)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                let raw = String::from_utf8_lossy(&t);
                let text = unescape(&raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.into_owned());
                push_text(&mut stack, &text)?;
            }
            Event::CData(c) => push_text(&mut stack, &String::from_utf8_lossy(&c))?,
            Event::GeneralRef(r) => {
                let name = String::from_utf8_lossy(&r).into_owned();
                let resolved = resolve_reference(&name).ok_or(XmlError::UnknownEntity(name))?;
                push_text(&mut stack, &resolved)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.qualified_name));
    }
    root.ok_or(XmlError::NoRoot)
}

fn owned_namespace(ns: &ResolveResult) -> Option<String> {
    match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    }
}

fn open_element(namespace: Option<String>, start: &BytesStart) -> Result<Element, XmlError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw).map(|c| c.into_owned()).unwrap_or_else(|_| raw.into_owned());
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        local_name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        qualified_name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(XmlError::MultipleRoots),
    }
}

fn push_text(stack: &mut [Element], text: &str) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(current) => {
            current.text.push_str(text);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(XmlError::TextOutsideRoot),
    }
}

/// Resolve `amp`, `lt`, ... and numeric `#123` / `#x7B` references.
fn resolve_reference(name: &str) -> Option<String> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_predefined_entity(name).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_tree_with_namespaces() {
        let xml = br#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <entry>
    <title>One &amp; two</title>
    <link href="https://example.com/1" rel="alternate"/>
    <dc:date>2025-05-22</dc:date>
  </entry>
</feed>"#;

        let root = parse_document(xml).unwrap();
        assert!(root.is(Some(ATOM_NS), "feed"));

        let entry = root.child(Some(ATOM_NS), "entry").unwrap();
        assert_eq!(entry.child(Some(ATOM_NS), "title").unwrap().text(), "One & two");

        let link = entry.child(Some(ATOM_NS), "link").unwrap();
        assert_eq!(link.attr("href"), Some("https://example.com/1"));
        assert_eq!(link.attr("rel"), Some("alternate"));

        let date = entry.child(Some(DC_NS), "date").unwrap();
        assert_eq!(date.qualified_name, "dc:date");
        assert_eq!(date.text(), "2025-05-22");
    }

    #[test]
    fn test_cdata_and_character_references() {
        let xml = b"<rss><channel><item><description><![CDATA[<p>Hi</p>]]></description><title>caf&#233; &#x41;</title></item></channel></rss>";
        let root = parse_document(xml).unwrap();
        let item = &root.children[0].children[0];
        assert_eq!(item.child(None, "description").unwrap().text(), "<p>Hi</p>");
        assert_eq!(item.child(None, "title").unwrap().text(), "café A");
    }

    #[test]
    fn test_unbound_prefix_keeps_qualified_name() {
        let xml = b"<rss><item><dc:date>2025-05-22</dc:date></item></rss>";
        let root = parse_document(xml).unwrap();
        let date = &root.children[0].children[0];
        assert_eq!(date.namespace, None);
        assert_eq!(date.local_name, "date");
        assert_eq!(date.qualified_name, "dc:date");
    }

    #[test]
    fn test_descendants_and_deep_text() {
        let xml = b"<a><b><c>x</c></b><c>y<d>z</d></c></a>";
        let root = parse_document(xml).unwrap();
        let cs = root.descendants_where(|e| e.local_name == "c");
        assert_eq!(cs.len(), 2);
        assert_eq!(cs[0].text(), "x");
        assert_eq!(cs[1].deep_text(), "y z");
    }

    fn first_named<'a>(el: &'a Element, name: &str) -> Option<&'a Element> {
        el.children_local(name).next()
    }

    #[test]
    fn test_child_lookups_outlive_the_name() {
        let root = parse_document(b"<item><title>T</title><dc:date>d</dc:date></item>").unwrap();

        let found = {
            let name = String::from("date");
            first_named(&root, &name)
        };
        let titles: Vec<&Element> = {
            let name = "title".to_string();
            root.children_named(None, &name).collect()
        };

        assert_eq!(found.map(Element::text), Some("d"));
        assert_eq!(titles.len(), 1);
    }

    #[test]
    fn test_utf8_bom_is_skipped() {
        let xml = b"\xEF\xBB\xBF<rss><channel/></rss>";
        assert!(parse_document(xml).is_ok());
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(parse_document(b"this is not xml at all").is_err());
        assert!(parse_document(b"<rss><channel></rss>").is_err());
        assert!(parse_document(b"<rss><channel>").is_err());
        assert!(parse_document(b"<a/><b/>").is_err());
        assert!(parse_document(b"<rss><title>AT&T</title></rss>").is_err());
        assert!(parse_document(b"<rss><title>&nbsp;</title></rss>").is_err());
        assert!(parse_document(b"").is_err());
    }
}
