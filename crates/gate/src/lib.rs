//! `catequesis-gate` — the request-gating pipeline.
//!
//! Composes credential verification, principal resolution, rate limiting,
//! and the per-route gates into an ordered, short-circuiting chain that
//! invokes the downstream handler on full admission and records activity on
//! success.

pub mod activity;
pub mod chain;
pub mod context;

pub use activity::{
    ActivityRecord, ActivitySink, ChannelActivitySink, MemoryActivitySink, TracingActivitySink,
};
pub use chain::{AdmissionChain, Limiters, Outcome};
pub use context::RequestContext;
