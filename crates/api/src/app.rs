//! Router + service wiring.
//!
//! Every route below runs the admission chain and hands it a thin handler
//! closure; the real resource CRUD lives behind these closures and is not
//! this crate's concern.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post, put};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceBuilder;

use catequesis_auth::{
    CredentialVerifier, LimitConcern, PrincipalDirectory, Rejection, Role, RoutePolicy,
};
use catequesis_gate::{ActivitySink, AdmissionChain, Limiters, Outcome, RequestContext};
use catequesis_limiter::LimiterSettings;

use crate::directory::ScopeRegistry;
use crate::envelope::{json_error, json_ok, rejection_response};
use crate::extract::bearer_token;

/// Boundary configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub general_limit: LimiterSettings,
    pub login_limit: LimiterSettings,
}

impl AppConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            general_limit: LimiterSettings::new(100, Duration::seconds(60)),
            login_limit: LimiterSettings::new(10, Duration::seconds(900)),
        }
    }
}

/// External collaborators behind the chain.
pub struct Services {
    pub directory: Arc<dyn PrincipalDirectory>,
    pub scopes: Arc<ScopeRegistry>,
    pub activity: Arc<dyn ActivitySink>,
}

#[derive(Clone)]
struct AppState {
    chain: Arc<AdmissionChain>,
    scopes: Arc<ScopeRegistry>,
}

/// Response wrapper reporting its outcome to the activity logger.
struct Handled(Response);

impl Outcome for Handled {
    fn succeeded(&self) -> bool {
        self.0.status().is_success()
    }
}

// Route policies: the single source for allowed roles, parish scoping, and
// the credential-change allow-list.

const LOGIN: RoutePolicy = RoutePolicy {
    allowed_roles: &[],
    parish_scoped: false,
    credential_change_exempt: true,
    limit: LimitConcern::Login,
    action: "sessions.login",
};

const PROFILE_READ: RoutePolicy = RoutePolicy {
    allowed_roles: &[],
    parish_scoped: false,
    credential_change_exempt: true,
    limit: LimitConcern::General,
    action: "profile.read",
};

const CREDENTIALS_CHANGE: RoutePolicy = RoutePolicy {
    allowed_roles: &[],
    parish_scoped: false,
    credential_change_exempt: true,
    limit: LimitConcern::General,
    action: "credentials.change",
};

const LOGOUT: RoutePolicy = RoutePolicy {
    allowed_roles: &[],
    parish_scoped: false,
    credential_change_exempt: true,
    limit: LimitConcern::General,
    action: "sessions.logout",
};

const CATECHUMEN_READ: RoutePolicy = RoutePolicy {
    allowed_roles: &[Role::Admin, Role::Parroco, Role::Secretaria, Role::Catequista],
    parish_scoped: true,
    credential_change_exempt: false,
    limit: LimitConcern::General,
    action: "catechumens.read",
};

const PARISH_LIST: RoutePolicy = RoutePolicy {
    allowed_roles: &[Role::Admin],
    parish_scoped: false,
    credential_change_exempt: false,
    limit: LimitConcern::General,
    action: "parishes.list",
};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig, services: Services) -> Router {
    let chain = Arc::new(AdmissionChain::new(
        CredentialVerifier::new(config.jwt_secret.as_bytes()),
        services.directory,
        Limiters::new(config.general_limit, config.login_limit),
        services.activity,
    ));

    // Background GC for long-idle limiter records.
    {
        let chain = chain.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                ticker.tick().await;
                let removed = chain.limiters().prune_idle(Utc::now(), Duration::minutes(30));
                if removed > 0 {
                    tracing::debug!(removed, "pruned idle limiter records");
                }
            }
        });
    }

    let state = AppState {
        chain,
        scopes: services.scopes,
    };

    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/profile", get(profile))
        .route("/credentials", put(change_credentials))
        .route("/logout", post(logout))
        .route("/catechumens/:id", get(get_catechumen))
        .route("/parishes", get(list_parishes))
        .with_state(state)
        .layer(ServiceBuilder::new())
}

fn request_context(
    method: &str,
    path: String,
    headers: &HeaderMap,
    addr: SocketAddr,
    resource_parish: Option<catequesis_core::ParishId>,
) -> RequestContext {
    RequestContext {
        method: method.to_string(),
        path,
        // IP only: reconnects from the same client share a window.
        origin: addr.ip().to_string(),
        bearer: bearer_token(headers).map(str::to_string),
        resource_parish,
        now: Utc::now(),
    }
}

fn unwrap_gate(result: Result<Handled, Rejection>) -> Response {
    match result {
        Ok(handled) => handled.0,
        Err(rejection) => rejection_response(&rejection),
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Optional-auth entry: anonymous attempts are rate-limited by origin.
/// Credential checking and issuance live in the identity service; this
/// boundary's job ends at admission.
async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context("POST", "/login".to_string(), &headers, addr, None);
    let result = state
        .chain
        .run_optional(&ctx, &LOGIN, |_principal| async move {
            Handled(json_ok(json!({ "status": "accepted" })))
        })
        .await;
    unwrap_gate(result)
}

async fn profile(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context("GET", "/profile".to_string(), &headers, addr, None);
    let result = state
        .chain
        .run(&ctx, &PROFILE_READ, |principal| async move {
            Handled(json_ok(json!({
                "id": principal.id.to_string(),
                "display_name": principal.display_name,
                "role": principal.role.as_str(),
                "parish": principal.parish.map(|p| p.to_string()),
                "credential_change_required": principal.credential_change_required,
            })))
        })
        .await;
    unwrap_gate(result)
}

async fn change_credentials(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context("PUT", "/credentials".to_string(), &headers, addr, None);
    let result = state
        .chain
        .run(&ctx, &CREDENTIALS_CHANGE, |_principal| async move {
            Handled(json_ok(json!({ "status": "credential change recorded" })))
        })
        .await;
    unwrap_gate(result)
}

async fn logout(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context("POST", "/logout".to_string(), &headers, addr, None);
    let result = state
        .chain
        .run(&ctx, &LOGOUT, |_principal| async move {
            Handled(json_ok(json!({ "status": "logged out" })))
        })
        .await;
    unwrap_gate(result)
}

async fn get_catechumen(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let catechumen_id: catequesis_core::CatechumenId = match id.parse() {
        Ok(v) => v,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid catechumen id"),
    };

    // Preliminary fetch: the parish-scope gate compares against the
    // resource's parish.
    let resource_parish = state.scopes.parish_of(&catechumen_id);

    let ctx = request_context(
        "GET",
        format!("/catechumens/{id}"),
        &headers,
        addr,
        resource_parish,
    );
    let result = state
        .chain
        .run(&ctx, &CATECHUMEN_READ, |_principal| async move {
            match resource_parish {
                Some(parish) => Handled(json_ok(json!({
                    "id": catechumen_id.to_string(),
                    "parish": parish.to_string(),
                }))),
                None => Handled(json_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    "catechumen not found",
                )),
            }
        })
        .await;
    unwrap_gate(result)
}

async fn list_parishes(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context("GET", "/parishes".to_string(), &headers, addr, None);
    let result = state
        .chain
        .run(&ctx, &PARISH_LIST, |_principal| async move {
            Handled(json_ok(json!({ "parishes": [] })))
        })
        .await;
    unwrap_gate(result)
}
