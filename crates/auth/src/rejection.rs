use thiserror::Error;

use catequesis_core::ParishId;

use crate::Role;

/// Terminal, typed outcome of a gating stage.
///
/// A rejection always terminates only the current request; nothing here is
/// fatal to the process. Stages return their rejection as-is up the chain;
/// the orchestrator never rewraps or reclassifies a kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("missing bearer credential")]
    MissingCredential,

    #[error("malformed or improperly signed credential")]
    InvalidCredential,

    #[error("credential has expired")]
    ExpiredCredential,

    #[error("credential subject is not a known principal")]
    UnknownPrincipal,

    #[error("principal is inactive")]
    InactivePrincipal,

    #[error("principal directory is unavailable")]
    DirectoryUnavailable,

    #[error("rate limit exceeded; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("role '{role}' is not allowed on this route")]
    InsufficientRole { role: Role },

    #[error("resource belongs to another parish")]
    TenantMismatch { resource_parish: ParishId },

    #[error("principal has no parish assignment")]
    NoTenantAssigned,

    #[error("credential change required before using this route")]
    CredentialChangeRequired,
}

impl Rejection {
    /// Stable machine-readable code, used in the response envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::MissingCredential => "missing_credential",
            Rejection::InvalidCredential => "invalid_credential",
            Rejection::ExpiredCredential => "expired_credential",
            Rejection::UnknownPrincipal => "unknown_principal",
            Rejection::InactivePrincipal => "inactive_principal",
            Rejection::DirectoryUnavailable => "directory_unavailable",
            Rejection::RateLimited { .. } => "rate_limited",
            Rejection::InsufficientRole { .. } => "insufficient_role",
            Rejection::TenantMismatch { .. } => "tenant_mismatch",
            Rejection::NoTenantAssigned => "no_tenant_assigned",
            Rejection::CredentialChangeRequired => "credential_change_required",
        }
    }
}
