//! In-memory collaborators for dev and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use catequesis_auth::{DirectoryError, DirectoryRecord, PrincipalDirectory, PrincipalId};
use catequesis_core::{CatechumenId, ParishId};

/// In-memory principal directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<PrincipalId, DirectoryRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, record: DirectoryRecord) {
        if let Ok(mut records) = self.records.write() {
            records.insert(record.id, record);
        }
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryDirectory {
    async fn resolve(&self, id: PrincipalId) -> Result<Option<DirectoryRecord>, DirectoryError> {
        let records = self
            .records
            .read()
            .map_err(|_| DirectoryError::Backend("directory lock poisoned".to_string()))?;
        Ok(records.get(&id).cloned())
    }
}

/// Catechumen-to-parish lookup.
///
/// Stands in for the resource store's preliminary fetch: the routing layer
/// resolves the target's parish here before running the admission chain.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    parishes: RwLock<HashMap<CatechumenId, ParishId>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: CatechumenId, parish: ParishId) {
        if let Ok(mut parishes) = self.parishes.write() {
            parishes.insert(id, parish);
        }
    }

    pub fn parish_of(&self, id: &CatechumenId) -> Option<ParishId> {
        self.parishes.read().ok()?.get(id).copied()
    }
}
