//! Paginated REST client for the source content API.
//!
//! Pages are requested as `GET {base}/{collection}?page=N&per_page=M`. The
//! totals come from `X-WP-TotalPages`/`X-Total-Pages` and `X-WP-Total`/`X-Total`
//! headers, or from a JSON envelope when the body is an object.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::http_client::HttpClient;
use super::{ContentSource, FetchError, FetchedPage};
use crate::models::EntityType;

/// Largest page size the source API accepts.
pub const MAX_PER_PAGE: u32 = 100;

const TOTAL_PAGES_HEADERS: &[&str] = &["x-wp-totalpages", "x-total-pages"];
const TOTAL_ITEMS_HEADERS: &[&str] = &["x-wp-total", "x-total"];
const ENVELOPE_RECORD_KEYS: &[&str] = &["items", "data", "results"];
const ENVELOPE_PAGES_KEYS: &[&str] = &["total_pages", "totalPages"];
const ENVELOPE_TOTAL_KEYS: &[&str] = &["total", "total_items", "totalItems"];

/// [`ContentSource`] backed by an HTTP JSON API.
#[derive(Clone)]
pub struct RestContentSource {
    client: HttpClient,
    base_url: Url,
    max_retries: u32,
    retry_delay: Duration,
    embed: bool,
}

impl RestContentSource {
    pub fn new(client: HttpClient, base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| FetchError::InvalidRequest(format!("bad source URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidRequest(format!(
                "source URL '{base_url}' cannot have a path"
            )));
        }
        Ok(Self {
            client,
            base_url,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            embed: true,
        })
    }

    /// Retry transient failures up to `max_retries` times per page.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// First retry waits `delay`; each further retry doubles it.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Ask for embedded author and featured media on posts and pages.
    pub fn with_embed(mut self, embed: bool) -> Self {
        self.embed = embed;
        self
    }

    /// Build the URL for one page of a collection.
    pub fn page_url(&self, collection: EntityType, page: u32, per_page: u32) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidRequest(format!("source URL '{}' cannot have a path", self.base_url)))?
            .pop_if_empty()
            .push(collection.collection());
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        if self.embed && matches!(collection, EntityType::Posts | EntityType::Pages) {
            url.query_pairs_mut().append_pair("_embed", "1");
        }
        Ok(url)
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status.as_u16(),
                url: url.to_string(),
            });
        }
        let headers = response.headers.clone();
        let body = response.text().await?;
        parse_page(&body, &headers)
    }
}

#[async_trait]
impl ContentSource for RestContentSource {
    async fn fetch_page(
        &self,
        collection: EntityType,
        page: u32,
        per_page: u32,
    ) -> Result<FetchedPage, FetchError> {
        if page == 0 {
            return Err(FetchError::InvalidRequest("pages are numbered from 1".into()));
        }
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let url = self.page_url(collection, page, per_page)?.to_string();

        let mut attempt = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(fetched) => {
                    debug!(
                        "Fetched {} page {}/{} ({} records)",
                        collection,
                        page,
                        fetched.total_pages,
                        fetched.records.len()
                    );
                    return Ok(fetched);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = self.retry_delay.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    warn!(
                        "Fetching {} page {} failed ({}), retry {}/{} in {:?}",
                        collection, page, e, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parse a page body and its headers into records and totals.
pub(crate) fn parse_page(
    body: &str,
    headers: &HashMap<String, String>,
) -> Result<FetchedPage, FetchError> {
    let total_pages = header_number(headers, TOTAL_PAGES_HEADERS)
        .map(|n| n.min(u32::MAX as u64) as u32)
        .unwrap_or(1);
    let total_items = header_number(headers, TOTAL_ITEMS_HEADERS).unwrap_or(0);

    let value: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(format!("not JSON: {e}")))?;

    match value {
        Value::Array(records) => Ok(FetchedPage {
            records,
            total_pages,
            total_items,
        }),
        Value::Object(mut envelope) => {
            let records = ENVELOPE_RECORD_KEYS
                .iter()
                .find_map(|key| match envelope.remove(*key) {
                    Some(Value::Array(records)) => Some(records),
                    _ => None,
                })
                .ok_or_else(|| {
                    FetchError::Decode("object body has no items/data/results array".into())
                })?;

            let total_pages = envelope_number(&envelope, ENVELOPE_PAGES_KEYS)
                .map(|n| n.min(u32::MAX as u64) as u32)
                .unwrap_or(total_pages);
            let total_items = envelope_number(&envelope, ENVELOPE_TOTAL_KEYS).unwrap_or(total_items);

            Ok(FetchedPage {
                records,
                total_pages,
                total_items,
            })
        }
        _ => Err(FetchError::Decode(
            "expected a JSON array or envelope object".into(),
        )),
    }
}

fn header_number(headers: &HashMap<String, String>, names: &[&str]) -> Option<u64> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .find_map(|v| v.trim().parse().ok())
}

fn envelope_number(envelope: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().filter_map(|k| envelope.get(*k)).find_map(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}
