use chrono::{DateTime, Utc};

use catequesis_core::ParishId;

/// Per-request input to the admission chain, built by the boundary.
///
/// `resource_parish` is the target resource's parish for parish-scoped
/// routes, resolved by the routing layer's preliminary fetch before the
/// chain runs; the chain itself performs no storage I/O.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    /// Network origin; keys the limiter for anonymous requests.
    pub origin: String,
    pub bearer: Option<String>,
    pub resource_parish: Option<ParishId>,
    pub now: DateTime<Utc>,
}
