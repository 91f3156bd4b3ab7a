//! Integration tests for the HTTP feed endpoint.
//!
//! Each test serves the router on an ephemeral port and points it at a
//! wiremock upstream.

use feedwalk::config::FetchConfig;
use feedwalk::feed::{FeedFetcher, BLOCKED_PLACEHOLDER};
use feedwalk::server::{router, AppState};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = r#"<rss version="2.0"><channel><title>T</title><item><title>A</title><link>https://e.com/a.mp4</link></item></channel></rss>"#;

async fn spawn_endpoint(upstream: &MockServer, allow_private_hosts: bool) -> String {
    let config = FetchConfig {
        relay_url: format!("{}/raw", upstream.uri()),
        attempt_timeout_ms: 5_000,
        ..FetchConfig::default()
    };
    let state = AppState {
        fetcher: FeedFetcher::new(reqwest::Client::new(), config),
        allow_private_hosts,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

fn endpoint(base: &str, path: &str, params: &[(&str, &str)]) -> url::Url {
    url::Url::parse_with_params(&format!("{}{}", base, path), params).unwrap()
}

async fn json_body(response: reqwest::Response) -> serde_json::Value {
    serde_json::from_str(&response.text().await.unwrap()).unwrap()
}

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn test_rss_success_headers() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .and(header("Referer", "https://allrss.se/parent.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .expect(1)
        .mount(&upstream)
        .await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(endpoint(
            &base,
            "/api/rss",
            &[
                ("url", format!("{}/feed.xml", upstream.uri()).as_str()),
                ("referer", "https://allrss.se/parent.xml"),
            ],
        ))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/xml; charset=utf-8");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(response.text().await.unwrap(), FEED);
}

#[tokio::test]
async fn test_rss_missing_url() {
    let upstream = MockServer::start().await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(format!("{}/api/rss", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = json_body(response).await;
    assert_eq!(body, serde_json::json!({ "error": "No URL provided" }));
}

#[tokio::test]
async fn test_rss_rejects_private_url_by_default() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .expect(0)
        .mount(&upstream)
        .await;
    let base = spawn_endpoint(&upstream, false).await;

    let response = client()
        .get(endpoint(
            &base,
            "/api/rss",
            &[("url", format!("{}/feed.xml", upstream.uri()).as_str())],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("Localhost"));
}

#[tokio::test]
async fn test_rss_blocked_feed_returns_placeholder() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&upstream)
        .await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(endpoint(
            &base,
            "/api/rss",
            &[("url", format!("{}/feed.xml", upstream.uri()).as_str())],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/xml");
    assert_eq!(response.text().await.unwrap(), BLOCKED_PLACEHOLDER);
}

#[tokio::test]
async fn test_rss_upstream_error_is_500_json() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&upstream)
        .await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(endpoint(
            &base,
            "/api/rss",
            &[("url", format!("{}/feed.xml", upstream.uri()).as_str())],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body = json_body(response).await;
    assert_eq!(body["error"], "HTTP 404: Not Found");
}

#[tokio::test]
async fn test_rss_preflight() {
    let upstream = MockServer::start().await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .request(reqwest::Method::OPTIONS, format!("{}/api/rss", base))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    let methods = headers["access-control-allow-methods"].to_str().unwrap();
    assert!(methods.contains("GET") && methods.contains("OPTIONS"));
    assert_eq!(headers["access-control-allow-headers"], "content-type");
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fetch_rss_direct_single_attempt() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .expect(1)
        .mount(&upstream)
        .await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(endpoint(
            &base,
            "/api/fetch-rss",
            &[("url", format!("{}/feed.xml", upstream.uri()).as_str())],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["cache-control"],
        "public, s-maxage=3600, stale-while-revalidate=86400"
    );
    assert_eq!(response.text().await.unwrap(), FEED);
}

#[tokio::test]
async fn test_fetch_rss_forbidden_is_not_escalated() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
        .expect(0)
        .mount(&upstream)
        .await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(endpoint(
            &base,
            "/api/fetch-rss",
            &[("url", format!("{}/feed.xml", upstream.uri()).as_str())],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body = json_body(response).await;
    assert_eq!(body["error"], "HTTP 403: Forbidden");
}

#[tokio::test]
async fn test_fetch_rss_missing_url() {
    let upstream = MockServer::start().await;
    let base = spawn_endpoint(&upstream, true).await;

    let response = client()
        .get(format!("{}/api/fetch-rss?url=", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Feed URL is required");
}
