//! Connection-boundary security: credential checks, client identity and
//! rate limiting.
//!
//! Both the [`AccessGuard`] and the [`RateLimiter`] are owned by the
//! application state and shared by reference; neither keeps process-global
//! state. Each is scoped to a single process, so running several instances
//! behind a load balancer multiplies the effective rate limit.

pub mod access;
pub mod client;
pub mod rate_limit;

pub use access::{presented_credential, random_token, AccessGuard, Credential, API_KEY_HEADER};
pub use client::ClientIdentity;
pub use rate_limit::{Clock, RateLimitPolicy, RateLimiter, SystemClock};
