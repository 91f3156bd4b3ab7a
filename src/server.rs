//! HTTP endpoint exposing feed acquisition to browser clients.
//!
//! - `GET /api/rss?url=&referer=` runs the full strategy chain
//! - `GET /api/fetch-rss?url=` makes one undisguised attempt
//!
//! Both answer CORS preflights for `GET, OPTIONS` from any origin.

use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

use crate::feed::{FeedFetcher, FeedRequest, FetchSource};
use crate::util::validate_feed_url;

const XML_UTF8: &str = "application/xml; charset=utf-8";
const DIRECT_CACHE_CONTROL: &str = "public, s-maxage=3600, stale-while-revalidate=86400";

/// Handler state. Cloned per request; the fetcher clone shares its pool.
#[derive(Debug, Clone)]
pub struct AppState {
    pub fetcher: FeedFetcher,
    /// Lets `localhost` and private addresses through URL validation.
    pub allow_private_hosts: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    url: Option<String>,
    referer: Option<String>,
}

impl FeedQuery {
    /// The `url` parameter, if present and not blank.
    fn target(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Build the router with both feed endpoints.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/api/rss", get(handle_rss))
        .route("/api/fetch-rss", get(handle_fetch_rss))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn start(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Feed endpoint listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_rss(State(state): State<AppState>, Query(query): Query<FeedQuery>) -> Response {
    let Some(raw) = query.target() else {
        return json_error(StatusCode::BAD_REQUEST, "No URL provided");
    };
    let url = match validate_feed_url(raw, state.allow_private_hosts) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(url = %raw, error = %e, "Rejected feed URL");
            return json_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };
    let request = FeedRequest {
        url,
        referer: query
            .referer
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    };

    match state.fetcher.fetch(&request).await {
        Ok(fetched) if fetched.source == FetchSource::Placeholder => {
            ([(CONTENT_TYPE, "application/xml")], fetched.body).into_response()
        }
        Ok(fetched) => xml_response(fetched.body, "no-cache"),
        Err(e) => {
            tracing::error!(url = %request.url, error = %e, "Feed acquisition failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

async fn handle_fetch_rss(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Response {
    let Some(raw) = query.target() else {
        return json_error(StatusCode::BAD_REQUEST, "Feed URL is required");
    };
    if let Err(e) = validate_feed_url(raw, state.allow_private_hosts) {
        tracing::warn!(url = %raw, error = %e, "Rejected feed URL");
        return json_error(StatusCode::BAD_REQUEST, &e.to_string());
    }

    match state.fetcher.fetch_direct(raw).await {
        Ok(body) => {
            tracing::info!(url = %raw, size = body.len(), "Direct fetch succeeded");
            xml_response(body, DIRECT_CACHE_CONTROL)
        }
        Err(e) => {
            tracing::error!(url = %raw, error = %e, "Direct fetch failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn xml_response(body: String, cache_control: &'static str) -> Response {
    (
        [
            (CONTENT_TYPE, HeaderValue::from_static(XML_UTF8)),
            (CACHE_CONTROL, HeaderValue::from_static(cache_control)),
        ],
        body,
    )
        .into_response()
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
