//! Ordered request disguises tried by the fetcher.
//!
//! Each [`Strategy`] pairs an identifier with a trigger predicate over the
//! previous attempt's status and the request. The fetcher walks
//! [`STRATEGIES`] in order and runs only those whose trigger holds.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::config::FetchConfig;

/// One request to acquire a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    pub url: Url,
    /// Referer hint, usually the parent level's feed URL.
    pub referer: Option<String>,
}

impl FeedRequest {
    /// Builds a request from an absolute URL. An empty referer counts as none.
    pub fn new(url: &str, referer: Option<&str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(url)?,
            referer: referer
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyId {
    /// Desktop browser headers with the caller's or the default referer.
    Primary,
    /// Another referer path on the blocking provider.
    AlternateReferer,
    /// Desktop headers without any referer.
    NoReferer,
    /// Plain-HTTP referer for plain-HTTP targets.
    InsecureReferer,
    /// Mobile-app client identity.
    MobileClient,
    /// Public read-through relay.
    Relay,
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyId::Primary => "primary",
            StrategyId::AlternateReferer => "alternate-referer",
            StrategyId::NoReferer => "no-referer",
            StrategyId::InsecureReferer => "insecure-referer",
            StrategyId::MobileClient => "mobile-client",
            StrategyId::Relay => "relay",
        };
        f.write_str(name)
    }
}

/// What an attempt observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// The origin answered with this HTTP status.
    Http(u16),
    /// Timeout, connection, TLS or body-read failure.
    Failed(String),
}

impl AttemptStatus {
    /// 204: the provider's "blank" answer to clients it blocks.
    pub fn is_blank(&self) -> bool {
        matches!(self, AttemptStatus::Http(204))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, AttemptStatus::Http(403))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AttemptStatus::Failed(_))
    }

    /// 2xx with content (204 excluded).
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptStatus::Http(code) if (200..300).contains(code) && *code != 204)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptStatus::Http(code) => write!(f, "{}", code),
            AttemptStatus::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// A fully specified request: target, headers, referer and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub strategy: StrategyId,
    pub target: Url,
    /// Header name to value, Referer excluded.
    pub headers: BTreeMap<&'static str, String>,
    pub referer: Option<String>,
    pub timeout: Duration,
}

/// Inputs to a strategy's trigger predicate.
pub struct TriggerContext<'a> {
    /// Status of the last direct attempt that got an HTTP answer, or the
    /// transport failure if none has yet. `None` before the first attempt.
    pub previous: Option<&'a AttemptStatus>,
    pub request: &'a FeedRequest,
    /// Whether the target host is a known blocking provider.
    pub blocked_host: bool,
}

pub struct Strategy {
    pub id: StrategyId,
    trigger: fn(&TriggerContext<'_>) -> bool,
}

/// The fixed strategy order. At most one attempt per entry.
pub static STRATEGIES: [Strategy; 6] = [
    Strategy {
        id: StrategyId::Primary,
        trigger: first_attempt,
    },
    Strategy {
        id: StrategyId::AlternateReferer,
        trigger: blank_from_blocking_host,
    },
    Strategy {
        id: StrategyId::NoReferer,
        trigger: blank_from_blocking_host,
    },
    Strategy {
        id: StrategyId::InsecureReferer,
        trigger: blank_over_plain_http,
    },
    Strategy {
        id: StrategyId::MobileClient,
        trigger: blank,
    },
    Strategy {
        id: StrategyId::Relay,
        trigger: blank_forbidden_or_failed,
    },
];

fn first_attempt(ctx: &TriggerContext<'_>) -> bool {
    ctx.previous.is_none()
}

fn blank(ctx: &TriggerContext<'_>) -> bool {
    ctx.previous.is_some_and(AttemptStatus::is_blank)
}

fn blank_from_blocking_host(ctx: &TriggerContext<'_>) -> bool {
    blank(ctx) && ctx.blocked_host
}

fn blank_over_plain_http(ctx: &TriggerContext<'_>) -> bool {
    blank(ctx) && ctx.request.url.scheme() == "http"
}

fn blank_forbidden_or_failed(ctx: &TriggerContext<'_>) -> bool {
    ctx.previous
        .is_some_and(|s| s.is_blank() || s.is_forbidden() || s.is_failed())
}

impl Strategy {
    pub fn applies(&self, ctx: &TriggerContext<'_>) -> bool {
        (self.trigger)(ctx)
    }

    /// Builds this strategy's request for `request`.
    ///
    /// Fails only when the configured relay URL is not a valid URL.
    pub fn plan(
        &self,
        config: &FetchConfig,
        request: &FeedRequest,
    ) -> Result<StrategyAttempt, url::ParseError> {
        let (target, headers, referer) = match self.id {
            StrategyId::Primary => (
                request.url.clone(),
                desktop_headers(config),
                Some(
                    request
                        .referer
                        .clone()
                        .unwrap_or_else(|| config.default_referer.clone()),
                ),
            ),
            StrategyId::AlternateReferer => (
                request.url.clone(),
                desktop_headers(config),
                Some(config.alternate_referer.clone()),
            ),
            StrategyId::NoReferer => (request.url.clone(), desktop_headers(config), None),
            StrategyId::InsecureReferer => (
                request.url.clone(),
                desktop_headers(config),
                Some(config.insecure_referer.clone()),
            ),
            StrategyId::MobileClient => {
                let mut headers = BTreeMap::new();
                headers.insert("User-Agent", config.mobile_user_agent.clone());
                headers.insert("Accept", config.mobile_accept.clone());
                (request.url.clone(), headers, request.referer.clone())
            }
            StrategyId::Relay => (
                Url::parse_with_params(&config.relay_url, [("url", request.url.as_str())])?,
                BTreeMap::new(),
                None,
            ),
        };

        Ok(StrategyAttempt {
            strategy: self.id,
            target,
            headers,
            referer,
            timeout: config.attempt_timeout(),
        })
    }
}

fn desktop_headers(config: &FetchConfig) -> BTreeMap<&'static str, String> {
    let mut headers = BTreeMap::new();
    headers.insert("User-Agent", config.desktop_user_agent.clone());
    headers.insert("Accept", config.desktop_accept.clone());
    headers.insert("Accept-Language", config.accept_language.clone());
    headers.insert("Cache-Control", "no-cache".to_string());
    headers.insert("Pragma", "no-cache".to_string());
    headers
}
