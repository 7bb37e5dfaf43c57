use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::claims::{BearerClaims, ClaimsError, validate_claims};
use crate::{PrincipalId, Rejection};

/// HS256 bearer credential verifier.
///
/// Pure with respect to the injected clock: no I/O, no side effects, the
/// same input always yields the same decision for a given verification key.
pub struct CredentialVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl CredentialVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged by `validate_claims` against the caller's clock,
        // not by the decoder against the system clock.
        validation.validate_exp = false;
        validation.required_spec_claims = Default::default();

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Verify a raw bearer string and extract the subject identifier.
    ///
    /// Absent credential → `MissingCredential`. Structurally invalid or
    /// signature mismatch → `InvalidCredential`. Valid signature past its
    /// expiry → `ExpiredCredential`.
    pub fn verify(&self, bearer: Option<&str>, now: DateTime<Utc>) -> Result<PrincipalId, Rejection> {
        let raw = bearer.ok_or(Rejection::MissingCredential)?;

        let data = decode::<BearerClaims>(raw, &self.key, &self.validation)
            .map_err(|_| Rejection::InvalidCredential)?;

        validate_claims(&data.claims, now).map_err(|e| match e {
            ClaimsError::Expired => Rejection::ExpiredCredential,
            ClaimsError::NotYetValid | ClaimsError::InvalidTimeWindow => Rejection::InvalidCredential,
        })?;

        Ok(data.claims.sub)
    }
}
