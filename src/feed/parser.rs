use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;

use super::node::{text_of, XmlNode};

/// SEC-003: Maximum element nesting depth accepted before the parse degrades.
const MAX_DEPTH: usize = 256;

/// Why a parse produced no usable tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseDiagnostic {
    /// The XML reader rejected the document.
    MalformedXml(String),
    /// The input held no element at all (empty or plain text).
    NoRootElement,
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseDiagnostic::MalformedXml(reason) => write!(f, "malformed XML: {}", reason),
            ParseDiagnostic::NoRootElement => write!(f, "no root element"),
        }
    }
}

/// Result of parsing a feed document.
///
/// Parsing never fails outright. A clean document with no items has an empty
/// `items` and no `diagnostic`; a document that could not be read has an
/// empty `items` and a `diagnostic` saying why.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    /// Channel (RSS) or feed (Atom) title, when present.
    pub title: Option<String>,
    /// Raw item/entry records in document order.
    pub items: Vec<XmlNode>,
    pub diagnostic: Option<ParseDiagnostic>,
}

impl ParsedFeed {
    fn degraded(diagnostic: ParseDiagnostic) -> Self {
        Self {
            title: None,
            items: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }

    /// True when the document could not be read.
    pub fn is_degraded(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// Parses RSS 2.0 or Atom text into raw item records.
///
/// Locates the channel by trying `rss.channel`, `feed`, `channel`, then the
/// document itself; then the items by trying `item` and `entry` on the
/// channel and on the document, falling back to an `items` container.
/// A lone item comes back as a one-element list.
pub fn parse_feed(xml: &str) -> ParsedFeed {
    let document = match read_tree(xml) {
        Ok(document) => document,
        Err(diagnostic) => {
            tracing::warn!(
                length = xml.len(),
                error = %diagnostic,
                "Feed document could not be parsed, returning no items"
            );
            return ParsedFeed::degraded(diagnostic);
        }
    };

    let channel = document
        .path("rss.channel")
        .or_else(|| document.get_present("feed"))
        .or_else(|| document.get_present("channel"))
        .unwrap_or(&document);

    let title = Some(text_of(channel.get("title"))).filter(|t| !t.is_empty());

    let items = match locate_items(channel, &document) {
        Some(found) => found.iter_members().cloned().collect(),
        None => {
            tracing::debug!("No items or entries found in feed");
            Vec::new()
        }
    };

    tracing::debug!(items = items.len(), "Parsed feed document");

    ParsedFeed {
        title,
        items,
        diagnostic: None,
    }
}

fn locate_items<'a>(channel: &'a XmlNode, document: &'a XmlNode) -> Option<&'a XmlNode> {
    let direct = channel
        .get_present("item")
        .or_else(|| channel.get_present("entry"))
        .or_else(|| document.get_present("item"))
        .or_else(|| document.get_present("entry"));
    if direct.is_some() {
        return direct;
    }

    // One level under an `items` container, then the container itself
    let container = channel
        .get_present("items")
        .or_else(|| document.get_present("items"))?;
    tracing::debug!("Falling back to items container lookup");
    container
        .get_present("item")
        .or_else(|| container.get_present("entry"))
        .or(Some(container))
}

/// An element still open on the reader stack.
struct OpenElement {
    name: String,
    text: String,
    attrs: BTreeMap<String, XmlNode>,
}

impl OpenElement {
    fn new(start: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Self {
        let mut attrs = BTreeMap::new();
        for attr_result in start.attributes() {
            let attr = match attr_result {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::trace!(error = %e, "Skipping malformed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.decode_and_unescape_value(reader.decoder()) {
                Ok(v) => v.into_owned(),
                Err(_) => unescape_lenient(&String::from_utf8_lossy(&attr.value)),
            };
            XmlNode::insert(&mut attrs, key, XmlNode::Scalar(value.trim().to_string()));
        }

        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            text: String::new(),
            attrs,
        }
    }

    fn finish(self) -> (String, XmlNode) {
        let text = self.text.trim().to_string();
        let node = if self.attrs.is_empty() {
            XmlNode::Scalar(text)
        } else {
            XmlNode::Attributed {
                text: Some(text).filter(|t| !t.is_empty()),
                attrs: self.attrs,
            }
        };
        (self.name, node)
    }
}

/// Reads the whole document into a tree rooted at a synthetic node whose
/// single key is the root element's name.
fn read_tree(xml: &str) -> Result<XmlNode, ParseDiagnostic> {
    // SEC-002: quick-xml never expands <!ENTITY> declarations; only the five
    // predefined entities are resolved. Unknown entities keep their raw text.
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut roots: BTreeMap<String, XmlNode> = BTreeMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(ParseDiagnostic::MalformedXml(format!(
                        "nesting depth exceeds {} levels",
                        MAX_DEPTH
                    )));
                }
                let open = OpenElement::new(&e, &reader);
                stack.push(open);
            }
            Ok(Event::Empty(e)) => {
                let (name, node) = OpenElement::new(&e, &reader).finish();
                attach(&mut stack, &mut roots, name, node);
            }
            Ok(Event::End(_)) => {
                if let Some(open) = stack.pop() {
                    let (name, node) = open.finish();
                    attach(&mut stack, &mut roots, name, node);
                }
            }
            Ok(Event::Text(e)) => {
                let text = match e.unescape() {
                    Ok(t) => t.into_owned(),
                    Err(_) => unescape_lenient(&String::from_utf8_lossy(&e)),
                };
                match stack.last_mut() {
                    Some(open) => open.text.push_str(&text),
                    None if !text.trim().is_empty() => {
                        return Err(ParseDiagnostic::MalformedXml(
                            "text outside of root element".to_string(),
                        ));
                    }
                    None => {}
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ParseDiagnostic::MalformedXml(e.to_string())),
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ParseDiagnostic::MalformedXml(format!(
            "unexpected end of document inside <{}>",
            stack.last().map(|open| open.name.as_str()).unwrap_or_default()
        )));
    }
    if roots.is_empty() {
        return Err(ParseDiagnostic::NoRootElement);
    }

    Ok(XmlNode::Attributed {
        text: None,
        attrs: roots,
    })
}

fn attach(
    stack: &mut [OpenElement],
    roots: &mut BTreeMap<String, XmlNode>,
    name: String,
    node: XmlNode,
) {
    match stack.last_mut() {
        Some(parent) => XmlNode::insert(&mut parent.attrs, name, node),
        None => XmlNode::insert(roots, name, node),
    }
}

/// Resolves entity references one at a time.
///
/// Predefined and numeric references are decoded; an unknown `&name;` or a
/// bare `&` is kept as written.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let end = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .map(|i| i + 1);

        match end {
            Some(semi) if tail.as_bytes()[semi] == b';' => {
                let reference = &tail[..=semi];
                match unescape(reference) {
                    Ok(decoded) => out.push_str(&decoded),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[semi + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::node::attribute_of;
    use pretty_assertions::assert_eq;

    const RSS_TWO_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Channel Title</title>
    <item>
      <title>First</title>
      <enclosure url="https://example.com/sub.xml" type="application/rss+xml"/>
    </item>
    <item>
      <title><![CDATA[Second & more]]></title>
      <link>https://example.com/video.mp4</link>
      <media:thumbnail url="https://example.com/thumb.jpg"/>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_items_in_order() {
        let parsed = parse_feed(RSS_TWO_ITEMS);
        assert!(parsed.diagnostic.is_none());
        assert_eq!(parsed.title.as_deref(), Some("Channel Title"));
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(text_of(parsed.items[0].get("title")), "First");
        assert_eq!(
            attribute_of(parsed.items[0].get("enclosure"), "type"),
            "application/rss+xml"
        );
        assert_eq!(text_of(parsed.items[1].get("title")), "Second & more");
        assert_eq!(
            attribute_of(parsed.items[1].get("media:thumbnail"), "url"),
            "https://example.com/thumb.jpg"
        );
    }

    #[test]
    fn test_single_item_wrapped_as_list() {
        let xml = r#"<rss><channel><item><title>Only</title><link>https://e.com/a</link></item></channel></rss>"#;
        let parsed = parse_feed(xml);
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(text_of(parsed.items[0].get("title")), "Only");
    }

    #[test]
    fn test_parse_atom_entries() {
        let xml = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Atom Feed</title>
  <entry><title>One</title><link href="https://example.com/one"/></entry>
  <entry><title>Two</title><link rel="alternate" href="https://example.com/two"/></entry>
</feed>"#;
        let parsed = parse_feed(xml);
        assert_eq!(parsed.title.as_deref(), Some("Atom Feed"));
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(
            attribute_of(parsed.items[0].get("link"), "href"),
            "https://example.com/one"
        );
    }

    #[test]
    fn test_bare_channel_root() {
        let xml = r#"<channel><item><link>https://e.com/x</link></item></channel>"#;
        assert_eq!(parse_feed(xml).items.len(), 1);
    }

    #[test]
    fn test_items_container_fallback() {
        let xml = r#"<rss><channel><items><item><link>https://e.com/1</link></item><item><link>https://e.com/2</link></item></items></channel></rss>"#;
        assert_eq!(parse_feed(xml).items.len(), 2);
    }

    #[test]
    fn test_empty_channel_is_clean_and_empty() {
        let parsed = parse_feed(
            r#"<rss version="2.0"><channel><title>Empty Content (Blocked)</title></channel></rss>"#,
        );
        assert!(parsed.items.is_empty());
        assert!(!parsed.is_degraded());
        assert_eq!(parsed.title.as_deref(), Some("Empty Content (Blocked)"));
    }

    #[test]
    fn test_empty_input_degrades() {
        let parsed = parse_feed("");
        assert!(parsed.items.is_empty());
        assert_eq!(parsed.diagnostic, Some(ParseDiagnostic::NoRootElement));
    }

    #[test]
    fn test_non_xml_input_degrades() {
        let parsed = parse_feed("this is not a feed");
        assert!(parsed.items.is_empty());
        assert!(matches!(
            parsed.diagnostic,
            Some(ParseDiagnostic::MalformedXml(_))
        ));
    }

    #[test]
    fn test_mismatched_tags_degrade() {
        let parsed = parse_feed("<rss><channel><item></channel></rss>");
        assert!(parsed.items.is_empty());
        assert!(parsed.is_degraded());
    }

    #[test]
    fn test_truncated_document_degrades() {
        let parsed = parse_feed("<rss><channel><item><title>Cut");
        assert!(parsed.items.is_empty());
        assert!(parsed.is_degraded());
    }

    #[test]
    fn test_excessive_nesting_degrades() {
        let xml = format!("{}{}", "<a>".repeat(MAX_DEPTH + 1), "</a>".repeat(MAX_DEPTH + 1));
        let parsed = parse_feed(&xml);
        assert!(parsed.is_degraded());
    }

    #[test]
    fn test_attribute_and_text_on_same_element() {
        let xml = r#"<rss><channel><item><link rel="self">https://e.com/t</link></item></channel></rss>"#;
        let parsed = parse_feed(xml);
        let link = parsed.items[0].get("link");
        assert_eq!(text_of(link), "https://e.com/t");
        assert_eq!(attribute_of(link, "rel"), "self");
    }

    #[test]
    fn test_unknown_entity_keeps_others_decoded() {
        let xml = r#"<rss><channel><item>
            <title>A&nbsp;B &amp; C</title>
            <enclosure url="https://e.com/v?a=1&amp;b=&bogus;" type="video/mp4"/>
        </item></channel></rss>"#;
        let parsed = parse_feed(xml);
        assert!(parsed.diagnostic.is_none());
        assert_eq!(text_of(parsed.items[0].get("title")), "A&nbsp;B & C");
        assert_eq!(
            attribute_of(parsed.items[0].get("enclosure"), "url"),
            "https://e.com/v?a=1&b=&bogus;"
        );
    }

    #[test]
    fn test_unescape_lenient_references() {
        assert_eq!(unescape_lenient("&lt;b&gt; &#65;&#x42;"), "<b> AB");
        assert_eq!(unescape_lenient("Tom & Jerry &amp;"), "Tom & Jerry &");
        assert_eq!(unescape_lenient("&copy;&amp;&#xZZ;"), "&copy;&&#xZZ;");
        assert_eq!(unescape_lenient("trailing &"), "trailing &");
        assert_eq!(unescape_lenient("&&amp;"), "&&");
        assert_eq!(unescape_lenient("no refs"), "no refs");
    }
}
