//! Adaptive per-domain rate limiter.
//!
//! Spaces consecutive requests to the same host by a base delay, backs off
//! on 429/503, and gradually recovers on success.

mod domain_state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use domain_state::DomainState;

/// Rate limiter tuning.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Pause between consecutive requests to one domain.
    pub base_delay: Duration,
    /// Smallest delay used once backing off, so a zero base delay still grows.
    pub backoff_floor: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub server_error_multiplier: f64,
    pub recovery_multiplier: f64,
    /// Consecutive successes before the delay is reduced.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            backoff_floor: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            server_error_multiplier: 1.5,
            recovery_multiplier: 0.5,
            recovery_threshold: 5,
        }
    }
}

/// Snapshot of one domain's limiter state.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

/// Adaptive rate limiter that tracks per-domain request timing.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    domains: Arc<RwLock<HashMap<String, DomainState>>>,
}

impl RateLimiter {
    pub fn new(base_delay: Duration) -> Self {
        Self::with_config(RateLimitConfig {
            base_delay,
            ..Default::default()
        })
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            domains: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    /// Wait until the domain is ready, then mark request as started.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        let wait_time = {
            let domains = self.domains.read().await;
            domains
                .get(&domain)
                .map(|s| s.time_until_ready())
                .unwrap_or(Duration::ZERO)
        };

        if wait_time > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        {
            let mut domains = self.domains.write().await;
            let state = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainState::new(self.config.base_delay));
            state.last_request = Some(Instant::now());
            state.total_requests += 1;
        }

        Some(domain)
    }

    /// Feed a response status back into the limiter.
    pub async fn report_status(&self, domain: &str, status_code: u16) {
        match status_code {
            429 | 503 => self.report_rate_limit(domain, status_code).await,
            500..=599 => self.report_server_error(domain).await,
            200..=399 => self.report_success(domain).await,
            _ => {}
        }
    }

    /// Report a successful request - may decrease delay.
    pub async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes += 1;

            if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
                state.scale_delay(self.config.recovery_multiplier, self.config.max_delay);

                if state.current_delay <= self.config.base_delay.max(self.config.backoff_floor) {
                    state.in_backoff = false;
                    state.current_delay = self.config.base_delay;
                    info!("Domain {} recovered from rate limit backoff", domain);
                } else {
                    debug!("Domain {} delay reduced to {:?}", domain, state.current_delay);
                }

                state.consecutive_successes = 0;
            }
        }
    }

    /// Report a definite rate limit hit (429 or 503) - increases delay.
    pub async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.rate_limit_hits += 1;
            state.consecutive_successes = 0;
            state.in_backoff = true;
            state.current_delay = state.current_delay.max(self.config.backoff_floor);
            state.scale_delay(self.config.backoff_multiplier, self.config.max_delay);

            warn!(
                "Rate limited by {} (HTTP {}), backing off to {:?}",
                domain, status_code, state.current_delay
            );
        }
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self, domain: &str) {
        let mut domains = self.domains.write().await;
        if let Some(state) = domains.get_mut(domain) {
            state.consecutive_successes = 0;
            state.in_backoff = true;
            state.current_delay = state.current_delay.max(self.config.backoff_floor);
            state.scale_delay(self.config.server_error_multiplier, self.config.max_delay);
            debug!(
                "Server error for {}, delay increased to {:?}",
                domain, state.current_delay
            );
        }
    }

    /// Get statistics for all domains.
    pub async fn get_stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.read().await;
        domains
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    DomainStats {
                        current_delay: v.current_delay,
                        in_backoff: v.in_backoff,
                        total_requests: v.total_requests,
                        rate_limit_hits: v.rate_limit_hits,
                    },
                )
            })
            .collect()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::with_config(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            RateLimiter::extract_domain("https://old.example.com/wp-json/wp/v2/posts"),
            Some("old.example.com".to_string())
        );
        assert_eq!(RateLimiter::extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn test_backoff_on_rate_limit() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_millis(0),
            backoff_floor: Duration::from_millis(100),
            ..Default::default()
        });

        limiter.acquire("https://example.com/1").await;
        limiter.report_status("example.com", 429).await;

        let stats = limiter.get_stats().await;
        let domain_stats = stats.get("example.com").unwrap();
        assert_eq!(domain_stats.current_delay, Duration::from_millis(200));
        assert!(domain_stats.in_backoff);
        assert_eq!(domain_stats.rate_limit_hits, 1);
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::from_secs(40),
            ..Default::default()
        });
        limiter.acquire("https://example.com/1").await;
        limiter.report_rate_limit("example.com", 503).await;
        limiter.report_rate_limit("example.com", 503).await;

        let stats = limiter.get_stats().await;
        assert_eq!(stats["example.com"].current_delay, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_recovers_after_successes() {
        let limiter = RateLimiter::with_config(RateLimitConfig {
            base_delay: Duration::ZERO,
            backoff_floor: Duration::from_millis(10),
            recovery_threshold: 2,
            ..Default::default()
        });
        limiter.acquire("https://example.com/1").await;
        limiter.report_rate_limit("example.com", 429).await;
        assert!(limiter.get_stats().await["example.com"].in_backoff);

        for _ in 0..2 {
            limiter.report_status("example.com", 200).await;
        }
        let stats = limiter.get_stats().await;
        assert!(!stats["example.com"].in_backoff);
        assert_eq!(stats["example.com"].current_delay, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_client_errors_do_not_change_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(5));
        limiter.acquire("https://example.com/1").await;
        limiter.report_status("example.com", 404).await;
        let stats = limiter.get_stats().await;
        assert_eq!(stats["example.com"].current_delay, Duration::from_millis(5));
        assert!(!stats["example.com"].in_backoff);
    }
}
