//! Helpers shared by the server and the CLI.
//!
//! - **URL validation**: which feed URLs the fetcher may be pointed at
//! - **Terminal text**: feed titles made safe and narrow enough for a listing

mod text;
mod url_validator;

pub use text::{display_width, fit_width, terminal_line};
pub use url_validator::{validate_feed_url, UrlValidationError};
