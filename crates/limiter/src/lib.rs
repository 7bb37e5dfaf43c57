//! `catequesis-limiter` — per-identity sliding-window-log rate limiting.
//!
//! One limiter instance per concern (general traffic, login attempts);
//! per-key state across instances is independent.

pub mod window;

pub use window::{LimiterSettings, RetryAfter, SlidingWindowLimiter};
