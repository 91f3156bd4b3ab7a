//! Feed acquisition, parsing and classification.
//!
//! - **Fetching**: ordered request disguises with a relay and placeholder fallback
//! - **Parsing**: tolerant RSS 2.0 / Atom reading into a generic node tree
//! - **Classification**: folder-or-leaf items with resolved URLs
//!
//! # Architecture
//!
//! - [`strategy`] - Strategy descriptors and their trigger predicates
//! - [`fetcher`] - The sequential strategy runner over `reqwest`
//! - [`node`] - Parsed-XML node variants and scalar extractors
//! - [`parser`] - Channel and item location over the node tree
//! - [`classifier`] - URL, title, thumbnail and folder resolution
//!
//! # Example
//!
//! ```ignore
//! use crate::feed::{parse_feed, ClassifierRules, FeedFetcher, FeedRequest};
//!
//! let fetched = fetcher.fetch(&FeedRequest::new(url, Some(parent))?).await?;
//! let items = ClassifierRules::default().classify_all(&parse_feed(&fetched.body).items);
//! ```

pub mod classifier;
pub mod fetcher;
pub mod node;
pub mod parser;
pub mod strategy;

pub use classifier::{ClassifierRules, Item, UNTITLED};
pub use fetcher::{
    build_http_client, AttemptRecord, FeedFetcher, FetchError, FetchOutcome, FetchSource,
    Fetched, BLOCKED_PLACEHOLDER,
};
pub use node::{attribute_of, text_of, XmlNode};
pub use parser::{parse_feed, ParseDiagnostic, ParsedFeed};
pub use strategy::{AttemptStatus, FeedRequest, StrategyAttempt, StrategyId, STRATEGIES};
