//! `catequesis-auth` — pure authentication/authorization boundary (zero-trust).
//!
//! This crate is intentionally decoupled from HTTP and storage: credential
//! verification, principal resolution, and the per-route gates all work on
//! plain values with an injected clock.

pub mod claims;
pub mod directory;
pub mod gates;
pub mod policy;
pub mod principal;
pub mod rejection;
pub mod roles;
pub mod verifier;

pub use claims::{BearerClaims, ClaimsError, validate_claims};
pub use directory::{DirectoryError, DirectoryRecord, PrincipalDirectory, resolve_principal};
pub use gates::{credential_change_gate, parish_scope_gate, role_gate};
pub use policy::{LimitConcern, RoutePolicy};
pub use principal::{Principal, PrincipalId};
pub use rejection::Rejection;
pub use roles::Role;
pub use verifier::CredentialVerifier;
