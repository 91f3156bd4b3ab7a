use crate::config::FetchConfig;
use crate::feed::strategy::{
    AttemptStatus, FeedRequest, StrategyAttempt, StrategyId, TriggerContext, STRATEGIES,
};
use futures::StreamExt;
use reqwest::header::REFERER;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Feed served in place of content a provider keeps blanking (204).
pub const BLOCKED_PLACEHOLDER: &str =
    r#"<rss version="2.0"><channel><title>Empty Content (Blocked)</title></channel></rss>"#;

/// Errors surfaced once every applicable strategy has run.
///
/// Blank (204) responses never surface here; they degrade to
/// [`BLOCKED_PLACEHOLDER`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target was not an absolute URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Non-success HTTP status left after all strategies
    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },
    /// The last direct attempt failed in transport and the relay did not help
    #[error("Request failed: {0}")]
    Transport(String),
}

/// Failures inside a single attempt. Folded into [`AttemptStatus::Failed`].
#[derive(Debug, Error)]
enum AttemptError {
    #[error("{0}")]
    Network(#[from] reqwest::Error),
    #[error("response too large")]
    ResponseTooLarge,
    #[error("incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Result of a single attempt. Produced whole, never partially filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub strategy: StrategyId,
    pub status: AttemptStatus,
    /// Body text, read only for 2xx responses other than 204.
    pub body: Option<String>,
}

/// One line of the attempt log kept in [`Fetched`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub strategy: StrategyId,
    pub status: AttemptStatus,
}

/// Where the returned body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Direct(StrategyId),
    Relay,
    Placeholder,
}

/// Successful acquisition with its attempt history.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    pub source: FetchSource,
    /// Attempts in the order they ran.
    pub attempts: Vec<AttemptRecord>,
}

/// Redirect hops followed before an attempt fails.
const MAX_REDIRECTS: usize = 5;

/// Builds the shared client handed to [`FeedFetcher::new`].
///
/// Timeouts are applied per attempt, so the client sets none of its own.
/// Automatic Referer is off: redirects keep the referer each strategy chose.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .referer(false)
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .tcp_keepalive(std::time::Duration::from_secs(60))
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {})", MAX_REDIRECTS));
        }
        if attempt.previous().iter().any(|prev| prev == attempt.url()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(
            to = %attempt.url(),
            hop = attempt.previous().len(),
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Runs the ordered strategies against the network.
///
/// Holds only the shared HTTP client and an immutable config, so clones are
/// cheap and concurrent fetches are independent.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    config: Arc<FetchConfig>,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, config: FetchConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Acquires a feed body, escalating through the strategy list.
    ///
    /// # Behavior
    ///
    /// - Strategies run strictly in order; each runs only if its trigger
    ///   holds for the last direct attempt's status
    /// - Stops at the first direct 2xx (other than 204)
    /// - A transport failure after an HTTP answer does not replace that answer
    /// - The relay's body is used only if its status is 2xx and it is longer
    ///   than `relay_min_body_len` characters; a rejected relay leaves the
    ///   last direct status in place
    /// - A final 204 degrades to [`BLOCKED_PLACEHOLDER`]
    ///
    /// # Errors
    ///
    /// - [`FetchError::HttpStatus`] - any other non-success status remained
    /// - [`FetchError::Transport`] - no direct attempt got an HTTP response
    pub async fn fetch(&self, request: &FeedRequest) -> Result<Fetched, FetchError> {
        let blocked_host = self.config.is_blocked_host(&request.url);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut last_direct: Option<FetchOutcome> = None;

        for strategy in STRATEGIES.iter() {
            let ctx = TriggerContext {
                previous: last_direct.as_ref().map(|o| &o.status),
                request,
                blocked_host,
            };
            if !strategy.applies(&ctx) {
                tracing::debug!(strategy = %strategy.id, url = %request.url, "Strategy not triggered, skipping");
                continue;
            }

            let outcome = match strategy.plan(&self.config, request) {
                Ok(attempt) => self.run_attempt(&attempt).await,
                Err(e) => FetchOutcome {
                    strategy: strategy.id,
                    status: AttemptStatus::Failed(format!("invalid request target: {}", e)),
                    body: None,
                },
            };

            tracing::info!(
                strategy = %outcome.strategy,
                url = %request.url,
                status = %outcome.status,
                "Fetch attempt finished"
            );
            attempts.push(AttemptRecord {
                strategy: outcome.strategy,
                status: outcome.status.clone(),
            });

            if outcome.strategy == StrategyId::Relay {
                match self.accept_relay(outcome) {
                    Some(body) => {
                        return Ok(Fetched {
                            body,
                            source: FetchSource::Relay,
                            attempts,
                        });
                    }
                    None => continue,
                }
            }

            if outcome.status.is_success() {
                return Ok(Fetched {
                    body: outcome.body.unwrap_or_default(),
                    source: FetchSource::Direct(outcome.strategy),
                    attempts,
                });
            }
            // Transport failures never replace an earlier HTTP answer
            let keep_previous = outcome.status.is_failed()
                && last_direct.as_ref().is_some_and(|o| !o.status.is_failed());
            if keep_previous {
                tracing::debug!(
                    strategy = %outcome.strategy,
                    "Transport failure, keeping previous HTTP status for triggers"
                );
            } else {
                last_direct = Some(outcome);
            }
        }

        let Some(last) = last_direct else {
            // Primary triggers whenever nothing ran before it
            return Err(FetchError::Transport("no strategy ran".to_string()));
        };

        match last.status {
            AttemptStatus::Http(204) => {
                tracing::warn!(url = %request.url, attempts = attempts.len(), "Persistent 204, returning empty placeholder feed");
                Ok(Fetched {
                    body: BLOCKED_PLACEHOLDER.to_string(),
                    source: FetchSource::Placeholder,
                    attempts,
                })
            }
            AttemptStatus::Http(status) => Err(FetchError::HttpStatus {
                status,
                reason: reason_phrase(status),
            }),
            AttemptStatus::Failed(reason) => Err(FetchError::Transport(reason)),
        }
    }

    /// Same chain as [`FeedFetcher::fetch`], returning only the body.
    pub async fn fetch_text(&self, url: &str, referer: Option<&str>) -> Result<String, FetchError> {
        let request = FeedRequest::new(url, referer)?;
        Ok(self.fetch(&request).await?.body)
    }

    /// One undisguised attempt: desktop headers, no referer, no fallbacks.
    pub async fn fetch_direct(&self, url: &str) -> Result<String, FetchError> {
        let request = FeedRequest::new(url, None)?;
        let attempt = STRATEGIES
            .iter()
            .find(|s| s.id == StrategyId::NoReferer)
            .ok_or_else(|| FetchError::Transport("no direct strategy".to_string()))?
            .plan(&self.config, &request)?;

        let outcome = self.run_attempt(&attempt).await;
        tracing::info!(url = %request.url, status = %outcome.status, "Direct fetch finished");
        match outcome.status {
            AttemptStatus::Http(status) if (200..300).contains(&status) => {
                Ok(outcome.body.unwrap_or_default())
            }
            AttemptStatus::Http(status) => Err(FetchError::HttpStatus {
                status,
                reason: reason_phrase(status),
            }),
            AttemptStatus::Failed(reason) => Err(FetchError::Transport(reason)),
        }
    }

    fn accept_relay(&self, outcome: FetchOutcome) -> Option<String> {
        let body = outcome.body.filter(|_| outcome.status.is_success())?;
        let length = body.chars().count();
        if length > self.config.relay_min_body_len {
            tracing::info!(length = length, "Relay returned plausible content");
            Some(body)
        } else {
            tracing::warn!(
                length = length,
                min = self.config.relay_min_body_len,
                "Relay body too short, ignoring"
            );
            None
        }
    }

    /// Runs one attempt under its timeout. Never fails: transport problems
    /// become [`AttemptStatus::Failed`].
    async fn run_attempt(&self, attempt: &StrategyAttempt) -> FetchOutcome {
        let mut builder = self.client.get(attempt.target.clone());
        for (name, value) in &attempt.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(referer) = &attempt.referer {
            builder = builder.header(REFERER, referer.as_str());
        }

        let max_body = self.config.max_body_bytes;
        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status();
            let body = if status.is_success() && status != StatusCode::NO_CONTENT {
                let bytes = read_limited_bytes(response, max_body).await?;
                Some(String::from_utf8_lossy(&bytes).into_owned())
            } else {
                None
            };
            Ok::<_, AttemptError>((status.as_u16(), body))
        };

        let (status, body) = match tokio::time::timeout(attempt.timeout, exchange).await {
            Ok(Ok((code, body))) => (AttemptStatus::Http(code), body),
            Ok(Err(e)) => (AttemptStatus::Failed(e.to_string()), None),
            Err(_) => (
                AttemptStatus::Failed(format!(
                    "timed out after {}ms",
                    attempt.timeout.as_millis()
                )),
                None,
            ),
        };

        FetchOutcome {
            strategy: attempt.strategy,
            status,
            body,
        }
    }
}

fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Reads the body, failing once it passes `limit` bytes or arrives short.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, AttemptError> {
    let expected_length = response.content_length();
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(AttemptError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(AttemptError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(AttemptError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(AttemptError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
