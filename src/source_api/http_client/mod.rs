//! HTTP client with adaptive per-domain rate limiting.

mod response;

pub use response::HttpResponse;
use response::collect_headers;

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::rate_limiter::RateLimiter;

pub const USER_AGENT: &str = concat!("contentmigrate/", env!("CARGO_PKG_VERSION"));

/// Resolve user agent from config value, falling back to the crate default.
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim) {
        Some(custom) if !custom.is_empty() => custom.to_string(),
        _ => USER_AGENT.to_string(),
    }
}

/// HTTP client shared by the page fetcher and the asset downloader.
///
/// Consecutive requests to one host are spaced by `request_delay`; the
/// limiter widens that gap on 429/503 and 5xx responses.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(timeout: Duration, request_delay: Duration) -> Self {
        Self::with_user_agent(timeout, request_delay, None)
    }

    /// Create a new HTTP client with a custom user agent.
    pub fn with_user_agent(
        timeout: Duration,
        request_delay: Duration,
        user_agent_config: Option<&str>,
    ) -> Self {
        Self::with_rate_limiter(
            timeout,
            RateLimiter::new(request_delay),
            user_agent_config,
        )
    }

    /// Create a new HTTP client with an explicit rate limiter.
    pub fn with_rate_limiter(
        timeout: Duration,
        rate_limiter: RateLimiter,
        user_agent_config: Option<&str>,
    ) -> Self {
        let user_agent = resolve_user_agent(user_agent_config);
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            rate_limiter,
        }
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Make a GET request, waiting on the rate limiter first.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let domain = self.rate_limiter.acquire(url).await;

        debug!("GET {}", url);
        let result = self.client.get(url).send().await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if let (Some(domain), true) = (&domain, e.is_timeout() || e.is_connect()) {
                    self.rate_limiter.report_server_error(domain).await;
                }
                return Err(e);
            }
        };

        if let Some(ref domain) = domain {
            self.rate_limiter
                .report_status(domain, response.status().as_u16())
                .await;
        }

        Ok(HttpResponse {
            status: response.status(),
            headers: collect_headers(&response),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent() {
        assert!(resolve_user_agent(None).starts_with("contentmigrate/"));
        assert!(resolve_user_agent(Some("  ")).starts_with("contentmigrate/"));
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }
}
