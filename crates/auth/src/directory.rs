use async_trait::async_trait;
use thiserror::Error;

use catequesis_core::ParishId;

use crate::{Principal, PrincipalId, Rejection, Role};

/// A principal as stored by the directory backend.
///
/// Unlike [`Principal`], this record may carry secret material
/// (`credential_hash`). It must not travel past [`resolve_principal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub id: PrincipalId,
    pub display_name: String,
    pub role: Role,
    pub parish: Option<ParishId>,
    pub active: bool,
    pub credential_change_required: bool,
    pub credential_hash: Option<String>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory backend failed: {0}")]
    Backend(String),
}

/// External principal directory contract.
///
/// This is the pipeline's only suspension point that may block on I/O. It
/// carries no timeout of its own; callers impose one externally.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Look up a principal by id. `Ok(None)` means the subject is unknown.
    async fn resolve(&self, id: PrincipalId) -> Result<Option<DirectoryRecord>, DirectoryError>;
}

/// Resolve a verified subject into a request-scoped [`Principal`].
///
/// Directory failure maps to `DirectoryUnavailable` and nothing else.
/// Secret fields never leave this function: `Principal` has nowhere to put
/// them.
pub async fn resolve_principal(
    directory: &dyn PrincipalDirectory,
    subject: PrincipalId,
) -> Result<Principal, Rejection> {
    let record = directory.resolve(subject).await.map_err(|e| {
        tracing::warn!(principal = %subject, error = %e, "principal directory lookup failed");
        Rejection::DirectoryUnavailable
    })?;

    let record = record.ok_or(Rejection::UnknownPrincipal)?;
    if !record.active {
        return Err(Rejection::InactivePrincipal);
    }

    Ok(Principal {
        id: record.id,
        display_name: record.display_name,
        role: record.role,
        parish: record.parish,
        active: true,
        credential_change_required: record.credential_change_required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    struct StubDirectory {
        records: RwLock<HashMap<PrincipalId, DirectoryRecord>>,
        unavailable: bool,
    }

    impl StubDirectory {
        fn with(records: Vec<DirectoryRecord>) -> Self {
            Self {
                records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
                unavailable: false,
            }
        }

        fn down() -> Self {
            Self {
                records: RwLock::new(HashMap::new()),
                unavailable: true,
            }
        }
    }

    #[async_trait]
    impl PrincipalDirectory for StubDirectory {
        async fn resolve(&self, id: PrincipalId) -> Result<Option<DirectoryRecord>, DirectoryError> {
            if self.unavailable {
                return Err(DirectoryError::Backend("connection refused".into()));
            }
            Ok(self.records.read().unwrap().get(&id).cloned())
        }
    }

    fn record(id: PrincipalId) -> DirectoryRecord {
        DirectoryRecord {
            id,
            display_name: "Marta Ruiz".to_string(),
            role: Role::Catequista,
            parish: Some(ParishId::new()),
            active: true,
            credential_change_required: false,
            credential_hash: Some("$argon2id$stored-hash".to_string()),
        }
    }

    #[tokio::test]
    async fn unknown_subject_is_rejected() {
        let directory = StubDirectory::with(vec![]);
        let result = resolve_principal(&directory, PrincipalId::new()).await;
        assert_eq!(result, Err(Rejection::UnknownPrincipal));
    }

    #[tokio::test]
    async fn inactive_principal_is_rejected() {
        let id = PrincipalId::new();
        let directory = StubDirectory::with(vec![DirectoryRecord {
            active: false,
            ..record(id)
        }]);

        let result = resolve_principal(&directory, id).await;
        assert_eq!(result, Err(Rejection::InactivePrincipal));
    }

    #[tokio::test]
    async fn backend_failure_maps_to_directory_unavailable() {
        let directory = StubDirectory::down();
        let result = resolve_principal(&directory, PrincipalId::new()).await;
        assert_eq!(result, Err(Rejection::DirectoryUnavailable));
    }

    #[tokio::test]
    async fn active_record_resolves_with_directory_fields() {
        let id = PrincipalId::new();
        let stored = record(id);
        let directory = StubDirectory::with(vec![stored.clone()]);

        let principal = resolve_principal(&directory, id).await.unwrap();
        assert_eq!(principal.id, id);
        assert_eq!(principal.display_name, stored.display_name);
        assert_eq!(principal.role, stored.role);
        assert_eq!(principal.parish, stored.parish);
        assert!(principal.active);
        assert!(!principal.credential_change_required);
    }
}
