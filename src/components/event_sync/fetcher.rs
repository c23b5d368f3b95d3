use crate::error::{config_error, feed_unavailable, BotResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Source of raw calendar documents
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> BotResult<String>;
}

/// Downloads feeds over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("labsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| config_error(&format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> BotResult<String> {
        let label = feed_label(url);
        debug!("Fetching feed {}", label);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| feed_unavailable(&label, e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(feed_unavailable(&label, format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| feed_unavailable(&label, e.without_url()))
    }
}

/// Host and file name of a feed URL.
///
/// Private calendar URLs embed their access key in the path, so logs and
/// errors only ever carry this shortened form.
pub fn feed_label(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("feed");
            match parsed.path_segments().and_then(|s| s.last()) {
                Some(file) if !file.is_empty() => format!("{}/…/{}", host, file),
                _ => host.to_string(),
            }
        }
        Err(_) => "invalid feed url".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_label_hides_secret_path() {
        let url = "https://calendar.google.com/calendar/ical/lab%40group.calendar.google.com/private-0123abcd/basic.ics";
        assert_eq!(feed_label(url), "calendar.google.com/…/basic.ics");
    }

    #[test]
    fn test_feed_label_fallbacks() {
        assert_eq!(feed_label("https://example.com/"), "example.com");
        assert_eq!(feed_label("not a url"), "invalid feed url");
    }
}
