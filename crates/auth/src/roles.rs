use serde::{Deserialize, Serialize};

/// Role held by a principal.
///
/// The set is closed: route policies and the parish-scope gate reason over
/// these four roles and nothing else.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Program administrator. The only role that crosses parish boundaries.
    Admin,
    Parroco,
    Secretaria,
    Catequista,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Admin, Role::Parroco, Role::Secretaria, Role::Catequista];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Parroco => "parroco",
            Role::Secretaria => "secretaria",
            Role::Catequista => "catequista",
        }
    }

    /// Privileged roles bypass the parish-scope gate unconditionally.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
