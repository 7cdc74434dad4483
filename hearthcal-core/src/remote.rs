//! Fetching feed text from subscription URLs.
//!
//! Requests go through a CORS relay: the target URL is passed percent-encoded
//! in the relay's `url` query parameter and the relay returns the raw body.

use std::future::Future;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Public relay used when no `proxy_url` is configured.
pub const DEFAULT_PROXY_URL: &str = "https://api.allorigins.win/raw";

/// Upper bound on a single fetch.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves the raw text of a feed.
///
/// Implementations return text that has passed [`validate_calendar_text`].
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = SyncResult<String>> + Send;
}

/// [`Fetcher`] backed by reqwest, routed through a CORS relay.
#[derive(Debug, Clone)]
pub struct ProxyFetcher {
    client: reqwest::Client,
    proxy_url: Url,
}

impl ProxyFetcher {
    pub fn new(proxy_url: &str, timeout: Duration) -> SyncResult<Self> {
        let proxy_url = Url::parse(proxy_url).map_err(|e| {
            SyncError::Configuration(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(format!("hearthcal/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Configuration(e.to_string()))?;

        Ok(ProxyFetcher { client, proxy_url })
    }

    /// Relay URL that will return the body of `target`.
    pub fn relay_url(&self, target: &str) -> Url {
        let mut url = self.proxy_url.clone();
        url.query_pairs_mut()
            .append_pair("url", &normalize_feed_url(target));
        url
    }
}

impl Fetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> SyncResult<String> {
        let relay_url = self.relay_url(url);
        debug!(url, relay = %relay_url, "Fetching iCal feed");

        let response = self
            .client
            .get(relay_url)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::HttpStatus(status.as_u16()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        validate_calendar_text(&text)?;
        Ok(text)
    }
}

/// Subscription schemes and the transport they stand for.
const FEED_SCHEMES: [(&str, &str); 2] = [
    ("webcals://", "https://"),
    ("webcal://", "http://"),
];

/// Rewrite `webcal://` to `http://` and `webcals://` to `https://`.
fn normalize_feed_url(url: &str) -> String {
    let trimmed = url.trim();
    for (scheme, replacement) in FEED_SCHEMES {
        if let Some(prefix) = trimmed.get(..scheme.len())
            && prefix.eq_ignore_ascii_case(scheme)
        {
            return format!("{}{}", replacement, &trimmed[scheme.len()..]);
        }
    }
    trimmed.to_string()
}

/// Reject bodies that are obviously not iCalendar before parsing.
///
/// HTML gets its own error since it usually means a login or error page.
pub fn validate_calendar_text(text: &str) -> SyncResult<()> {
    if text.contains("BEGIN:VCALENDAR") {
        return Ok(());
    }

    let head = text.trim_start().to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return Err(SyncError::ErrorPage);
    }

    Err(SyncError::NotCalendar)
}
