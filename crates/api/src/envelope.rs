//! Uniform response envelope and the fixed rejection → status mapping.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde_json::json;

use catequesis_auth::Rejection;

/// Status mapping is fixed by contract: 401 for credential/identity
/// failures, 403 for authorization failures, 429 for throughput, 503 for a
/// transient directory outage.
fn status_of(rejection: &Rejection) -> StatusCode {
    match rejection {
        Rejection::MissingCredential
        | Rejection::InvalidCredential
        | Rejection::ExpiredCredential
        | Rejection::UnknownPrincipal
        | Rejection::InactivePrincipal => StatusCode::UNAUTHORIZED,

        Rejection::InsufficientRole { .. }
        | Rejection::TenantMismatch { .. }
        | Rejection::NoTenantAssigned
        | Rejection::CredentialChangeRequired => StatusCode::FORBIDDEN,

        Rejection::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

        Rejection::DirectoryUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Render a rejection as the uniform failure envelope.
pub fn rejection_response(rejection: &Rejection) -> Response {
    let mut body = json!({
        "success": false,
        "error": rejection.kind(),
        "message": rejection.to_string(),
        "timestamp": Utc::now(),
    });

    match rejection {
        Rejection::RateLimited { retry_after_secs } => {
            body["retry_after"] = json!(retry_after_secs);
        }
        Rejection::TenantMismatch { resource_parish } => {
            body["resource_parish"] = json!(resource_parish.to_string());
        }
        Rejection::InsufficientRole { role } => {
            body["role"] = json!(role.as_str());
        }
        _ => {}
    }

    let mut response = (status_of(rejection), Json(body)).into_response();
    if let Rejection::RateLimited { retry_after_secs } = rejection {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
    }
    response
}

/// Render a success envelope around handler data.
pub fn json_ok(data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "timestamp": Utc::now(),
            "data": data,
        })),
    )
        .into_response()
}

/// Render a non-gating failure (bad path id, missing resource).
pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catequesis_auth::Role;
    use catequesis_core::ParishId;

    #[test]
    fn statuses_follow_the_fixed_mapping() {
        assert_eq!(status_of(&Rejection::MissingCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(&Rejection::InvalidCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(&Rejection::ExpiredCredential), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(&Rejection::UnknownPrincipal), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(&Rejection::InactivePrincipal), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(&Rejection::InsufficientRole { role: Role::Catequista }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(&Rejection::TenantMismatch { resource_parish: ParishId::new() }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(&Rejection::NoTenantAssigned), StatusCode::FORBIDDEN);
        assert_eq!(status_of(&Rejection::CredentialChangeRequired), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(&Rejection::RateLimited { retry_after_secs: 30 }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(&Rejection::DirectoryUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn rate_limited_response_carries_retry_after_header() {
        let response = rejection_response(&Rejection::RateLimited { retry_after_secs: 42 });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER),
            Some(&HeaderValue::from(42u64))
        );
    }
}
