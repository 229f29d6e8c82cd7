mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::error::FeedError;

/// Downloads a feed body, failing on any non-success status.
#[instrument(skip(client))]
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FeedError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FeedError::Status {
            url: url.to_string(),
            status,
        });
    }
    let body = resp.bytes().await?;
    debug!(bytes = body.len(), "Feed downloaded");
    Ok(body)
}

/// Reads a feed from `file://` URLs or plain paths, otherwise over HTTP.
pub async fn fetch_source<C: HttpClient + ?Sized>(client: &C, source: &str) -> Result<Bytes, FeedError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return fetch_bytes(client, source).await;
    }
    let path = source.strip_prefix("file://").unwrap_or(source);
    Ok(Bytes::from(tokio::fs::read(path).await?))
}
