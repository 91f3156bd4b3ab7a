//! Browse nested RSS/Atom feeds as a folder tree.
//!
//! Feeds are acquired through an ordered chain of request disguises with a
//! relay and placeholder fallback ([`feed::FeedFetcher`]), parsed tolerantly
//! ([`feed::parse_feed`]) and classified into folder or leaf items
//! ([`feed::ClassifierRules`]). [`nav`] stacks the fetched levels; [`server`]
//! exposes acquisition over HTTP.

pub mod config;
pub mod feed;
pub mod nav;
pub mod server;
pub mod util;
