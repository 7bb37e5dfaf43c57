use crate::Role;

/// Which limiter instance a route draws from.
///
/// Each concern has its own quota, window, and per-key state; exhausting one
/// never affects the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitConcern {
    /// General API traffic (larger quota, short window).
    General,
    /// Credential attempts (small quota, long window).
    Login,
}

/// Static, per-route gating configuration.
///
/// Supplied by the routing layer per endpoint, immutable once built. This is
/// the single source for both the role gate's allowed set and the
/// credential-change allow-list, so the two cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    /// Roles admitted by the role gate. Empty means any authenticated role.
    pub allowed_roles: &'static [Role],

    /// Whether the parish-scope gate applies to this route.
    pub parish_scoped: bool,

    /// Whether principals flagged for a credential change may still use
    /// this route (profile view, credential change, logout).
    pub credential_change_exempt: bool,

    /// Limiter instance consulted for this route.
    pub limit: LimitConcern,

    /// Action tag recorded by the activity logger on success.
    pub action: &'static str,
}
