//! Access to the source content API.
//!
//! The migration only sees [`ContentSource`]: one page of one collection at a
//! time, with the totals the source reports.

mod http_client;
mod pagination;
mod rate_limiter;

pub use http_client::{resolve_user_agent, HttpClient, HttpResponse, USER_AGENT};
pub use pagination::{RestContentSource, MAX_PER_PAGE};
pub use rate_limiter::{DomainStats, RateLimitConfig, RateLimiter};

use async_trait::async_trait;
use serde_json::Value;

use crate::models::EntityType;

/// Errors fetching a page from the source API.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid page request: {0}")]
    InvalidRequest(String),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// One page of raw records plus the pagination totals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub records: Vec<Value>,
    /// Total pages reported by the source, 1 when it says nothing.
    pub total_pages: u32,
    /// Total records reported by the source, 0 when it says nothing.
    pub total_items: u64,
}

/// A paginated, read-only content source.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch page `page` (1-based) of `collection`.
    async fn fetch_page(
        &self,
        collection: EntityType,
        page: u32,
        per_page: u32,
    ) -> Result<FetchedPage, FetchError>;
}
