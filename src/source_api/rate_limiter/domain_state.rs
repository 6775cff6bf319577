//! Per-domain rate limiting state.

use std::time::{Duration, Instant};

/// State for a single domain.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Current delay for this domain.
    pub current_delay: Duration,
    /// Last request time.
    pub last_request: Option<Instant>,
    /// Consecutive successes since last backoff step.
    pub consecutive_successes: u32,
    /// Whether currently in backoff.
    pub in_backoff: bool,
    /// Total requests made.
    pub total_requests: u64,
    /// Total rate limit hits.
    pub rate_limit_hits: u64,
}

impl DomainState {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            last_request: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    /// Multiply the current delay, capped at `max`.
    pub fn scale_delay(&mut self, factor: f64, max: Duration) {
        let scaled = Duration::from_secs_f64(self.current_delay.as_secs_f64() * factor);
        self.current_delay = scaled.min(max);
    }

    /// Time until this domain is ready for another request.
    pub fn time_until_ready(&self) -> Duration {
        match self.last_request {
            Some(last) => self.current_delay.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_domain_needs_no_wait() {
        let state = DomainState::new(Duration::from_millis(500));
        assert_eq!(state.time_until_ready(), Duration::ZERO);
    }

    #[test]
    fn test_scale_delay_is_capped() {
        let mut state = DomainState::new(Duration::from_secs(40));
        state.scale_delay(2.0, Duration::from_secs(60));
        assert_eq!(state.current_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_recent_request_waits() {
        let mut state = DomainState::new(Duration::from_secs(10));
        state.last_request = Some(Instant::now());
        let wait = state.time_until_ready();
        assert!(wait > Duration::ZERO && wait <= Duration::from_secs(10));
    }
}
