//! Folder-tree navigation over nested feeds.
//!
//! A [`NavigationStack`] is a caller-owned value: every operation takes it
//! and hands back the new stack. The [`Navigator`] only produces levels; it
//! never holds one.

use std::iter;
use thiserror::Error;

use crate::feed::{
    parse_feed, ClassifierRules, FeedFetcher, FeedRequest, FetchError, Item, ParseDiagnostic,
};

/// One fetched and classified feed.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationLevel {
    source_url: String,
    title: String,
    items: Vec<Item>,
    raw_xml: String,
    diagnostic: Option<ParseDiagnostic>,
}

impl NavigationLevel {
    pub fn new(
        source_url: impl Into<String>,
        title: impl Into<String>,
        items: Vec<Item>,
        raw_xml: impl Into<String>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            title: title.into(),
            items,
            raw_xml: raw_xml.into(),
            diagnostic: None,
        }
    }

    /// Parses and classifies `raw_xml` into a level.
    pub fn from_document(
        source_url: impl Into<String>,
        title: impl Into<String>,
        raw_xml: String,
        rules: &ClassifierRules,
    ) -> Self {
        let parsed = parse_feed(&raw_xml);
        let items = rules.classify_all(&parsed.items);
        Self {
            source_url: source_url.into(),
            title: title.into(),
            items,
            raw_xml,
            diagnostic: parsed.diagnostic,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn raw_xml(&self) -> &str {
        &self.raw_xml
    }

    /// Set when the document could not be parsed and `items` is empty for
    /// that reason rather than because the feed is empty.
    pub fn diagnostic(&self) -> Option<&ParseDiagnostic> {
        self.diagnostic.as_ref()
    }
}

/// Levels from the root to the one on display. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationStack {
    root: NavigationLevel,
    above: Vec<NavigationLevel>,
}

impl NavigationStack {
    pub fn new(root: NavigationLevel) -> Self {
        Self {
            root,
            above: Vec::new(),
        }
    }

    /// Replaces the whole stack with a single level.
    #[must_use]
    pub fn reset(self, level: NavigationLevel) -> Self {
        Self::new(level)
    }

    #[must_use]
    pub fn push(mut self, level: NavigationLevel) -> Self {
        self.above.push(level);
        self
    }

    /// Removes the top level. A single-level stack is returned unchanged.
    #[must_use]
    pub fn pop(mut self) -> Self {
        self.above.pop();
        self
    }

    /// Keeps levels `0..=index` (breadcrumb jump). Out-of-range is a no-op.
    #[must_use]
    pub fn truncate_to(mut self, index: usize) -> Self {
        self.above.truncate(index);
        self
    }

    /// The level on display.
    pub fn current(&self) -> &NavigationLevel {
        self.above.last().unwrap_or(&self.root)
    }

    pub fn get(&self, index: usize) -> Option<&NavigationLevel> {
        match index {
            0 => Some(&self.root),
            i => self.above.get(i - 1),
        }
    }

    pub fn len(&self) -> usize {
        1 + self.above.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn levels(&self) -> impl Iterator<Item = &NavigationLevel> {
        iter::once(&self.root).chain(self.above.iter())
    }

    pub fn breadcrumbs(&self) -> Vec<&str> {
        self.levels().map(NavigationLevel::title).collect()
    }
}

#[derive(Debug, Error)]
pub enum NavigateError {
    #[error("No item at index {index} (level has {len} items)")]
    NoSuchItem { index: usize, len: usize },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// What selecting an item produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Opened {
    /// A folder was fetched; push it onto the stack.
    Folder(NavigationLevel),
    /// A leaf: hand it to the player.
    Leaf(Item),
}

/// Fetch + parse + classify, producing navigation levels.
#[derive(Debug, Clone)]
pub struct Navigator {
    fetcher: FeedFetcher,
    rules: ClassifierRules,
}

impl Navigator {
    pub fn new(fetcher: FeedFetcher, rules: ClassifierRules) -> Self {
        Self { fetcher, rules }
    }

    pub async fn load_level(
        &self,
        url: &str,
        title: &str,
        referer: Option<&str>,
    ) -> Result<NavigationLevel, FetchError> {
        let request = FeedRequest::new(url, referer)?;
        let fetched = self.fetcher.fetch(&request).await?;
        let level = NavigationLevel::from_document(url, title, fetched.body, &self.rules);

        tracing::info!(
            url = %url,
            title = %title,
            items = level.items().len(),
            source = ?fetched.source,
            "Loaded navigation level"
        );
        if let Some(diagnostic) = level.diagnostic() {
            tracing::warn!(url = %url, error = %diagnostic, "Level shown empty after parse failure");
        }
        Ok(level)
    }

    /// Loads `url` as the root of a fresh stack.
    pub async fn open_root(&self, url: &str, title: &str) -> Result<NavigationStack, FetchError> {
        Ok(NavigationStack::new(self.load_level(url, title, None).await?))
    }

    /// Selects item `index` of the current level.
    ///
    /// Folders are fetched with the current level's URL as the referer hint.
    /// The stack is not modified; push an [`Opened::Folder`] to descend.
    pub async fn open(&self, stack: &NavigationStack, index: usize) -> Result<Opened, NavigateError> {
        let current = stack.current();
        let item = current
            .items()
            .get(index)
            .ok_or(NavigateError::NoSuchItem {
                index,
                len: current.items().len(),
            })?;

        if !item.is_folder {
            tracing::debug!(title = %item.title, url = %item.url, "Leaf item selected");
            return Ok(Opened::Leaf(item.clone()));
        }

        let level = self
            .load_level(&item.url, &item.title, Some(current.source_url()))
            .await?;
        Ok(Opened::Folder(level))
    }
}
