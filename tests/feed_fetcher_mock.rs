use labsync::components::event_sync::ics::parse_calendar;
use labsync::components::event_sync::{FeedFetcher, HttpFeedFetcher};
use labsync::error::Error;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:meetup@example.com\r\n\
DTSTART:20240110T020000Z\r\n\
DTEND:20240110T040000Z\r\n\
SUMMARY:Monthly Meetup\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

#[tokio::test]
async fn test_fetch_returns_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/basic.ics"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/calendar")
                .set_body_string(FEED),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFeedFetcher::new(Duration::from_secs(5)).unwrap();
    let body = fetcher
        .fetch(&format!("{}/calendar/basic.ics", server.uri()))
        .await
        .unwrap();

    let defs = parse_calendar("test", &body).unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].summary.as_deref(), Some("Monthly Meetup"));
}

#[tokio::test]
async fn test_http_error_is_feed_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = HttpFeedFetcher::new(Duration::from_secs(5)).unwrap();
    let err = fetcher
        .fetch(&format!("{}/private-secret/basic.ics", server.uri()))
        .await
        .unwrap_err();

    match err {
        Error::FeedUnavailable { url, reason } => {
            assert!(reason.contains("404"));
            // The private path never reaches the error
            assert!(!url.contains("private-secret"));
            assert!(url.ends_with("basic.ics"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_is_feed_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(FEED)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFeedFetcher::new(Duration::from_millis(200)).unwrap();
    let result = fetcher
        .fetch(&format!("{}/basic.ics", server.uri()))
        .await;

    assert!(matches!(result, Err(Error::FeedUnavailable { .. })));
}

#[tokio::test]
async fn test_unreachable_host_is_feed_unavailable() {
    // Bind and drop a server so the port is closed
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let fetcher = HttpFeedFetcher::new(Duration::from_secs(2)).unwrap();
    let result = fetcher.fetch(&format!("{}/basic.ics", uri)).await;

    assert!(matches!(result, Err(Error::FeedUnavailable { .. })));
}
