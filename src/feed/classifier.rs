//! Turns raw item records into navigable [`Item`]s.
//!
//! Each item resolves to a URL (enclosure first, link second), a title,
//! thumbnail and description, and a folder-or-leaf tag decided by
//! [`ClassifierRules`].

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::node::{attribute_of, text_of, XmlNode};

/// Title used when an item carries none.
pub const UNTITLED: &str = "Untitled";

/// A classified feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique within one parse call.
    pub id: String,
    pub title: String,
    /// Never empty.
    pub url: String,
    pub thumbnail: String,
    pub description: String,
    /// Enclosure MIME type as declared by the feed, or empty.
    pub mime_type_hint: String,
    /// True when the item is another feed to navigate into.
    pub is_folder: bool,
}

/// Substring markers that tag an item as a folder.
///
/// Matching is case-insensitive. An item is a folder when its enclosure MIME
/// type contains any `mime_markers` entry or its URL contains any
/// `url_markers` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClassifierRules {
    pub mime_markers: Vec<String>,
    pub url_markers: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            mime_markers: vec!["xml".to_string(), "rss".to_string()],
            url_markers: [
                ".xml",
                "/rss",
                "?channel=",
                "?subchannel=",
                "?film=",
                "?show=",
                "?ep=",
                "?mirror=",
                "?xml=",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

impl ClassifierRules {
    /// Decides folder vs. leaf from an enclosure MIME type and a resolved URL.
    pub fn is_folder(&self, mime_type: &str, url: &str) -> bool {
        let mime = mime_type.to_lowercase();
        let url = url.to_lowercase();
        self.mime_markers
            .iter()
            .any(|m| mime.contains(&m.to_lowercase()))
            || self
                .url_markers
                .iter()
                .any(|m| url.contains(&m.to_lowercase()))
    }

    /// Classifies one raw item, or `None` when no URL can be resolved.
    ///
    /// `position` is the item's index in the raw sequence and feeds the id.
    pub fn classify(&self, raw: &XmlNode, position: usize) -> Option<Item> {
        let enclosure = raw.get("enclosure").map(XmlNode::first);
        let (enclosure_url, mime_type) = match enclosure {
            Some(enc) => (
                attribute_of(Some(enc), "url"),
                attribute_of(Some(enc), "type"),
            ),
            None => (String::new(), String::new()),
        };

        let url = if enclosure_url.is_empty() {
            resolve_link(raw.get("link"))
        } else {
            enclosure_url
        };
        if url.is_empty() {
            tracing::trace!(position = position, "Skipping item without a resolvable URL");
            return None;
        }

        let title = Some(text_of(raw.get("title")))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let thumbnail = if let Some(thumb) = raw.get_present("media:thumbnail") {
            attribute_of(Some(thumb), "url")
        } else if let Some(image) = raw.get_present("itunes:image") {
            attribute_of(Some(image), "href")
        } else {
            String::new()
        };

        let description = Some(text_of(raw.get("description")))
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| text_of(raw.get("summary")));

        let is_folder = self.is_folder(&mime_type, &url);
        tracing::trace!(
            position = position,
            title = %title,
            mime = %mime_type,
            folder = is_folder,
            "Classified item"
        );

        Some(Item {
            id: item_id(position),
            title,
            url,
            thumbnail,
            description,
            mime_type_hint: mime_type,
            is_folder,
        })
    }

    /// Classifies a whole item sequence, dropping unresolvable items and
    /// preserving order.
    pub fn classify_all(&self, raw_items: &[XmlNode]) -> Vec<Item> {
        let items: Vec<Item> = raw_items
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| self.classify(raw, i))
            .collect();

        let skipped = raw_items.len() - items.len();
        if skipped > 0 {
            tracing::debug!(skipped = skipped, "Items without URLs skipped");
        }
        items
    }
}

/// Resolves an item's `link` field.
///
/// A plain string is the URL. An Atom link object yields its `href`, else its
/// inner text. Among several links, the first `rel="alternate"` (or rel-less)
/// one wins, else the first.
fn resolve_link(link: Option<&XmlNode>) -> String {
    match link {
        None => String::new(),
        Some(XmlNode::Scalar(s)) => s.clone(),
        Some(XmlNode::Sequence(links)) => {
            let preferred = links.iter().find(|l| {
                let rel = text_of(l.get("rel"));
                matches!(l, XmlNode::Scalar(_)) || rel.is_empty() || rel == "alternate"
            });
            resolve_link(preferred.or_else(|| links.first()))
        }
        Some(node) => {
            let href = attribute_of(Some(node), "href");
            if href.is_empty() {
                text_of(Some(node))
            } else {
                href
            }
        }
    }
}

/// Builds `item-<position>-<unix millis>-<9 random base36 chars>`.
fn item_id(position: usize) -> String {
    let entropy: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!(
        "item-{}-{}-{}",
        position,
        chrono::Utc::now().timestamp_millis(),
        entropy
    )
}
