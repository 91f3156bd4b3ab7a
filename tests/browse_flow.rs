//! End-to-end navigation: fetch, parse, classify and stack levels.

use feedwalk::config::FetchConfig;
use feedwalk::feed::{ClassifierRules, FeedFetcher};
use feedwalk::nav::{NavigateError, Navigator, Opened};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn root_feed(base: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Channels</title>
    <item>
      <title>Dramas</title>
      <enclosure url="{base}/sub.xml" type="application/xml"/>
      <media:thumbnail url="https://img.example.com/dramas.jpg"/>
    </item>
    <item>
      <title>Trailer</title>
      <enclosure url="https://cdn.example.com/trailer.mp4" type="video/mp4"/>
      <description>Short teaser</description>
    </item>
  </channel>
</rss>"#
    )
}

const SUB_FEED: &str = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Dramas</title>
  <entry><title>Episode 1</title><link href="https://cdn.example.com/ep1.m3u8"/></entry>
  <entry><title>Episode 2</title><link href="https://cdn.example.com/ep2.m3u8"/></entry>
</feed>"#;

fn navigator() -> Navigator {
    let config = FetchConfig {
        blocked_hosts: Vec::new(),
        attempt_timeout_ms: 5_000,
        ..FetchConfig::default()
    };
    Navigator::new(
        FeedFetcher::new(reqwest::Client::new(), config),
        ClassifierRules::default(),
    )
}

async fn mount_feeds(server: &MockServer) -> String {
    let root_url = format!("{}/root.xml", server.uri());
    Mock::given(method("GET"))
        .and(path("/root.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(root_feed(&server.uri())))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sub.xml"))
        .and(header("Referer", root_url.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUB_FEED))
        .expect(1)
        .mount(server)
        .await;
    root_url
}

#[tokio::test]
async fn test_folder_then_leaf() {
    let server = MockServer::start().await;
    let root_url = mount_feeds(&server).await;
    let navigator = navigator();

    let stack = navigator.open_root(&root_url, "Home").await.unwrap();
    let root = stack.current();
    assert_eq!(root.items().len(), 2);
    assert_eq!(root.items()[0].title, "Dramas");
    assert!(root.items()[0].is_folder);
    assert_eq!(root.items()[0].thumbnail, "https://img.example.com/dramas.jpg");
    assert_eq!(root.items()[1].title, "Trailer");
    assert!(!root.items()[1].is_folder);
    assert_eq!(root.items()[1].mime_type_hint, "video/mp4");

    let stack = match navigator.open(&stack, 0).await.unwrap() {
        Opened::Folder(level) => stack.push(level),
        Opened::Leaf(item) => panic!("Expected folder, got leaf {:?}", item),
    };
    assert_eq!(stack.breadcrumbs(), vec!["Home", "Dramas"]);
    let titles: Vec<_> = stack
        .current()
        .items()
        .iter()
        .map(|i| i.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Episode 1", "Episode 2"]);
    assert_eq!(stack.current().items()[0].url, "https://cdn.example.com/ep1.m3u8");

    // Back at the root, the leaf is a playable selection
    let stack = stack.pop();
    match navigator.open(&stack, 1).await.unwrap() {
        Opened::Leaf(item) => assert_eq!(item.url, "https://cdn.example.com/trailer.mp4"),
        Opened::Folder(level) => panic!("Expected leaf, got folder {}", level.title()),
    }
    assert_eq!(stack.len(), 1);
}

#[tokio::test]
async fn test_open_out_of_range() {
    let server = MockServer::start().await;
    let root_url = mount_feeds(&server).await;
    let navigator = navigator();

    let stack = navigator.open_root(&root_url, "Home").await.unwrap();
    let err = navigator.open(&stack, 7).await.unwrap_err();
    assert!(matches!(err, NavigateError::NoSuchItem { index: 7, len: 2 }));
}

#[tokio::test]
async fn test_failed_folder_leaves_stack_untouched() {
    let server = MockServer::start().await;
    let root = r#"<rss><channel><item><title>Gone</title>
        <link>REPLACE/gone.xml</link></item></channel></rss>"#
        .replace("REPLACE", &server.uri());
    Mock::given(method("GET"))
        .and(path("/root.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(root))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let navigator = navigator();
    let stack = navigator
        .open_root(&format!("{}/root.xml", server.uri()), "Home")
        .await
        .unwrap();
    let before = stack.clone();

    let err = navigator.open(&stack, 0).await.unwrap_err();
    assert!(matches!(err, NavigateError::Fetch(_)));
    assert_eq!(stack, before);
}

#[tokio::test]
async fn test_blocked_feed_shows_as_empty_level() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/blocked.xml"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/raw"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = FetchConfig {
        relay_url: format!("{}/raw", server.uri()),
        ..FetchConfig::default()
    };
    let navigator = Navigator::new(
        FeedFetcher::new(reqwest::Client::new(), config),
        ClassifierRules::default(),
    );
    let level = navigator
        .load_level(&format!("{}/blocked.xml", server.uri()), "Blocked", None)
        .await
        .unwrap();
    assert!(level.items().is_empty());
    assert!(level.diagnostic().is_none());
    assert!(level.raw_xml().contains("Empty Content (Blocked)"));
}
