//! Per-client request budgets for the unauthenticated auth routes.

use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

/// Past this many tracked windows, expired ones are swept on the next check.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Register,
    Login,
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// `client` is `None` when the peer address is unknown. Such requests
    /// share one budget.
    fn check(&self, client: Option<IpAddr>, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _client: Option<IpAddr>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// At most `requests` hits per client and action within each `window`.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    requests: u32,
    window: Duration,
    windows: DashMap<(Option<IpAddr>, RateLimitAction), Window>,
}

impl FixedWindowLimiter {
    pub fn new(requests: u32, window: Duration) -> Self {
        FixedWindowLimiter {
            requests,
            window,
            windows: DashMap::new(),
        }
    }

    fn sweep(&self, now: Instant) {
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, client: Option<IpAddr>, action: RateLimitAction) -> RateLimitDecision {
        let now = Instant::now();
        if self.windows.len() > SWEEP_THRESHOLD {
            self.sweep(now);
        }

        let mut entry = self.windows.entry((client, action)).or_insert(Window {
            started: now,
            hits: 0,
        });
        let window = entry.value_mut();
        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                hits: 0,
            };
        }
        if window.hits >= self.requests {
            return RateLimitDecision::Limited;
        }
        window.hits += 1;
        RateLimitDecision::Allowed
    }
}

/// The address a request is charged to. The first `X-Forwarded-For` entry
/// wins only when the proxy in front is trusted to set it.
pub fn client_ip(
    remote: Option<SocketAddr>,
    forwarded_for: Option<&str>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    let forwarded = forwarded_for
        .filter(|_| trust_forwarded_for)
        .and_then(|header| header.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    forwarded.or(remote.map(|addr| addr.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert_eq!(
                limiter.check(None, RateLimitAction::Login),
                RateLimitDecision::Allowed
            );
        }
    }

    #[test]
    fn budget_is_per_client_and_action() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
        let client = ip("192.0.2.1");

        assert_eq!(limiter.check(client, RateLimitAction::Login), RateLimitDecision::Allowed);
        assert_eq!(limiter.check(client, RateLimitAction::Login), RateLimitDecision::Allowed);
        assert_eq!(limiter.check(client, RateLimitAction::Login), RateLimitDecision::Limited);

        assert_eq!(limiter.check(client, RateLimitAction::Refresh), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.check(ip("192.0.2.2"), RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn budget_resets_with_the_window() {
        let limiter = FixedWindowLimiter::new(1, Duration::from_millis(20));
        let client = ip("192.0.2.1");

        assert_eq!(limiter.check(client, RateLimitAction::Register), RateLimitDecision::Allowed);
        assert_eq!(limiter.check(client, RateLimitAction::Register), RateLimitDecision::Limited);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(limiter.check(client, RateLimitAction::Register), RateLimitDecision::Allowed);
    }

    #[test]
    fn forwarded_for_needs_trust() {
        let remote = Some("10.0.0.1:5000".parse().unwrap());
        let header = Some("203.0.113.7, 10.0.0.1");

        assert_eq!(client_ip(remote, header, false), ip("10.0.0.1"));
        assert_eq!(client_ip(remote, header, true), ip("203.0.113.7"));
        assert_eq!(client_ip(remote, Some("garbage"), true), ip("10.0.0.1"));
        assert_eq!(client_ip(None, None, true), None);
    }
}
