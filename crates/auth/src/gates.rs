//! Pure per-route gates.
//!
//! Each gate is a function from (principal, route configuration) to
//! (continue | rejection): no I/O, no panics, no hidden state.

use catequesis_core::ParishId;

use crate::{Principal, Rejection, RoutePolicy};

/// Check the principal's role against the route's allowed set.
///
/// An empty allowed set means "any authenticated role".
pub fn role_gate(principal: &Principal, policy: &RoutePolicy) -> Result<(), Rejection> {
    if policy.allowed_roles.is_empty() || policy.allowed_roles.contains(&principal.role) {
        Ok(())
    } else {
        Err(Rejection::InsufficientRole { role: principal.role })
    }
}

/// Confine non-privileged roles to their own parish.
///
/// `resource_parish` is the target resource's parish, resolved by the
/// routing layer's preliminary fetch; `None` means the route is scoped to
/// the principal's own parish with no specific resource to compare against.
/// A principal with no parish assignment is rejected regardless of resource.
pub fn parish_scope_gate(
    principal: &Principal,
    resource_parish: Option<ParishId>,
) -> Result<(), Rejection> {
    if principal.role.is_privileged() {
        return Ok(());
    }

    let own = principal.parish.ok_or(Rejection::NoTenantAssigned)?;

    match resource_parish {
        Some(target) if target != own => Err(Rejection::TenantMismatch { resource_parish: target }),
        _ => Ok(()),
    }
}

/// Restrict principals flagged for a credential change to exempt routes.
///
/// Two states (normal, must-change); the transition back to normal happens
/// only through the external change-credential operation. This gate reads
/// the flag, never clears it.
pub fn credential_change_gate(principal: &Principal, policy: &RoutePolicy) -> Result<(), Rejection> {
    if principal.credential_change_required && !policy.credential_change_exempt {
        return Err(Rejection::CredentialChangeRequired);
    }
    Ok(())
}
