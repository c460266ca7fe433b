//! Per-client sliding-window rate limiter.
//!
//! Each client owns a window of admission timestamps. On every check the
//! window is pruned to the trailing period, then the request is either
//! admitted (and recorded) or rejected (and not recorded). Only admitted
//! requests count against the window.
//!
//! The limiter guards the request boundary (HTTP requests and WebSocket
//! upgrades), not individual frames inside an open session.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::security::ClientIdentity;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Window length and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Admitted requests allowed per window.
    pub capacity: usize,
    /// Length of the sliding window.
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            capacity: 60,
            window: Duration::from_secs(60),
        }
    }
}

/// Sliding-window limiter keyed by [`ClientIdentity`].
pub struct RateLimiter {
    policy: RateLimitPolicy,
    windows: DashMap<ClientIdentity, VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("clients", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Creates a limiter on the system clock.
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Creates a limiter on a custom clock.
    #[must_use]
    pub fn with_clock(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
            clock,
        }
    }

    /// The active policy.
    #[must_use]
    pub const fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Returns true if `client` is over the limit.
    ///
    /// When the client is under the limit the current instant is recorded.
    #[must_use]
    pub fn is_limited(&self, client: &ClientIdentity) -> bool {
        let now = self.clock.now();
        let window = self.policy.window;

        let mut stamps = self.windows.entry(client.clone()).or_default();
        while stamps
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            stamps.pop_front();
        }

        if stamps.len() >= self.policy.capacity {
            return true;
        }
        stamps.push_back(now);
        false
    }

    /// Admitted requests currently inside `client`'s window.
    #[must_use]
    pub fn in_window(&self, client: &ClientIdentity) -> usize {
        let now = self.clock.now();
        self.windows.get(client).map_or(0, |stamps| {
            stamps
                .iter()
                .filter(|t| now.saturating_duration_since(**t) < self.policy.window)
                .count()
        })
    }

    /// Drops clients whose windows have fully expired. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.policy.window;
        let before = self.windows.len();
        self.windows.retain(|_, stamps| {
            stamps
                .back()
                .is_some_and(|t| now.saturating_duration_since(*t) < window)
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients with a tracked window.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
