//! Metadata-only freshness probe against a tool's download URL.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{header::LAST_MODIFIED, Client};
use tracing::debug;

use crate::error::UpdateError;

/// Last-Modified time of `url`, fetched with a HEAD request that must finish
/// within `timeout`.
///
/// `Ok(None)` means "unknown": a non-success status or no Last-Modified
/// header. Transport failures come back as `NetworkUnavailable`/`Timeout`, a
/// header that is present but malformed as `MetadataParse`.
pub async fn probe_last_modified(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<Option<DateTime<Utc>>, UpdateError> {
    let resp = client
        .head(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| UpdateError::from_reqwest(e, timeout))?;

    if !resp.status().is_success() {
        debug!("HEAD {} returned {}", url, resp.status());
        return Ok(None);
    }

    let Some(value) = resp.headers().get(LAST_MODIFIED) else {
        debug!("HEAD {} carried no Last-Modified header", url);
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| UpdateError::MetadataParse {
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })?;
    parse_http_date(value).map(Some)
}

/// Parses an RFC 1123 HTTP-date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>, UpdateError> {
    DateTime::parse_from_rfc2822(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| UpdateError::MetadataParse {
            value: value.to_string(),
        })
}
