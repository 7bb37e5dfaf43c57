//! The pipeline orchestrator.
//!
//! An explicit ordered chain with short-circuit-on-reject semantics: the
//! first stage to produce a [`Rejection`] terminates the chain, and no later
//! stage (nor the downstream handler) runs.

use core::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use catequesis_auth::{
    CredentialVerifier, LimitConcern, Principal, PrincipalDirectory, Rejection, RoutePolicy,
    credential_change_gate, parish_scope_gate, resolve_principal, role_gate,
};
use catequesis_limiter::{LimiterSettings, SlidingWindowLimiter};

use crate::activity::{ActivityRecord, ActivitySink};
use crate::context::RequestContext;

/// Outcome a downstream handler reports back to the chain.
///
/// The chain observes it without altering it: success triggers one activity
/// record, failure triggers nothing (failures are already captured by error
/// handling).
pub trait Outcome {
    fn succeeded(&self) -> bool;
}

/// Per-concern limiter instances with independent per-key state.
pub struct Limiters {
    general: SlidingWindowLimiter,
    login: SlidingWindowLimiter,
}

impl Limiters {
    pub fn new(general: LimiterSettings, login: LimiterSettings) -> Self {
        Self {
            general: SlidingWindowLimiter::new(general),
            login: SlidingWindowLimiter::new(login),
        }
    }

    fn for_concern(&self, concern: LimitConcern) -> &SlidingWindowLimiter {
        match concern {
            LimitConcern::General => &self.general,
            LimitConcern::Login => &self.login,
        }
    }

    /// Garbage-collect long-idle identity records across both concerns.
    pub fn prune_idle(&self, now: DateTime<Utc>, max_idle: Duration) -> usize {
        self.general.prune_idle(now, max_idle) + self.login.prune_idle(now, max_idle)
    }
}

/// A pure gating stage: (request context, principal) → continue or reject.
type Stage<'a> = &'a dyn Fn(&RequestContext, &Principal) -> Result<(), Rejection>;

/// The admission chain: credential verifier, principal resolver, limiter,
/// role gate, parish-scope gate, credential-change gate, then the downstream
/// handler, with the activity logger observing the handler's outcome.
pub struct AdmissionChain {
    verifier: CredentialVerifier,
    directory: Arc<dyn PrincipalDirectory>,
    limiters: Limiters,
    activity: Arc<dyn ActivitySink>,
}

impl AdmissionChain {
    pub fn new(
        verifier: CredentialVerifier,
        directory: Arc<dyn PrincipalDirectory>,
        limiters: Limiters,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            verifier,
            directory,
            limiters,
            activity,
        }
    }

    pub fn limiters(&self) -> &Limiters {
        &self.limiters
    }

    /// Entry point for routes that require authentication.
    ///
    /// Invokes `handler` exactly once on full admission; any rejection is
    /// terminal for the request and the handler never runs.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        policy: &RoutePolicy,
        handler: F,
    ) -> Result<T, Rejection>
    where
        T: Outcome,
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = T>,
    {
        let principal = match self.admit(ctx, policy).await {
            Ok(principal) => principal,
            Err(rejection) => return Err(self.reject(ctx, rejection)),
        };

        let response = handler(principal.clone()).await;
        self.observe(ctx, policy, Some(&principal), &response);
        Ok(response)
    }

    /// Entry point for optional-auth routes.
    ///
    /// A missing credential proceeds with an anonymous principal (`None`)
    /// rate-limited by network origin; a present credential runs the full
    /// authenticated chain. This is a distinct entry point, not a flag on
    /// [`AdmissionChain::run`].
    pub async fn run_optional<T, F, Fut>(
        &self,
        ctx: &RequestContext,
        policy: &RoutePolicy,
        handler: F,
    ) -> Result<T, Rejection>
    where
        T: Outcome,
        F: FnOnce(Option<Principal>) -> Fut,
        Fut: Future<Output = T>,
    {
        let principal = match ctx.bearer {
            None => {
                let key = format!("anon:{}", ctx.origin);
                if let Err(rejection) = self.check_limit(policy, &key, ctx.now) {
                    return Err(self.reject(ctx, rejection));
                }
                None
            }
            Some(_) => match self.admit(ctx, policy).await {
                Ok(principal) => Some(principal),
                Err(rejection) => return Err(self.reject(ctx, rejection)),
            },
        };

        let response = handler(principal.clone()).await;
        self.observe(ctx, policy, principal.as_ref(), &response);
        Ok(response)
    }

    /// Ordered authenticated stages; the first rejection wins.
    async fn admit(&self, ctx: &RequestContext, policy: &RoutePolicy) -> Result<Principal, Rejection> {
        let subject = self.verifier.verify(ctx.bearer.as_deref(), ctx.now)?;
        let principal = resolve_principal(self.directory.as_ref(), subject).await?;

        self.check_limit(policy, &format!("principal:{}", principal.id), ctx.now)?;

        let stages: [Stage<'_>; 3] = [
            &|_ctx, principal| role_gate(principal, policy),
            &|ctx, principal| {
                if policy.parish_scoped {
                    parish_scope_gate(principal, ctx.resource_parish)
                } else {
                    Ok(())
                }
            },
            &|_ctx, principal| credential_change_gate(principal, policy),
        ];
        for stage in stages {
            stage(ctx, &principal)?;
        }

        Ok(principal)
    }

    fn check_limit(&self, policy: &RoutePolicy, key: &str, now: DateTime<Utc>) -> Result<(), Rejection> {
        self.limiters
            .for_concern(policy.limit)
            .check(key, now)
            .map_err(|retry| Rejection::RateLimited {
                retry_after_secs: retry.as_secs_ceil(),
            })
    }

    /// Attach request context to a rejection on its way out. The kind is
    /// never rewrapped or reclassified here.
    fn reject(&self, ctx: &RequestContext, rejection: Rejection) -> Rejection {
        tracing::debug!(
            method = %ctx.method,
            path = %ctx.path,
            kind = rejection.kind(),
            "request rejected",
        );
        rejection
    }

    fn observe<T: Outcome>(
        &self,
        ctx: &RequestContext,
        policy: &RoutePolicy,
        principal: Option<&Principal>,
        response: &T,
    ) {
        if !response.succeeded() {
            return;
        }
        let Some(principal) = principal else {
            return;
        };

        self.activity.emit(ActivityRecord {
            principal: principal.id,
            role: principal.role,
            action: policy.action.to_string(),
            path: ctx.path.clone(),
            at: ctx.now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};

    use catequesis_auth::{BearerClaims, DirectoryError, DirectoryRecord, PrincipalId, Role};
    use catequesis_core::ParishId;

    use crate::activity::MemoryActivitySink;

    const SECRET: &[u8] = b"test-secret";

    struct StubDirectory {
        records: RwLock<HashMap<PrincipalId, DirectoryRecord>>,
        lookups: AtomicU32,
    }

    impl StubDirectory {
        fn with(records: Vec<DirectoryRecord>) -> Self {
            Self {
                records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
                lookups: AtomicU32::new(0),
            }
        }

        fn lookups(&self) -> u32 {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PrincipalDirectory for StubDirectory {
        async fn resolve(&self, id: PrincipalId) -> Result<Option<DirectoryRecord>, DirectoryError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.read().unwrap().get(&id).cloned())
        }
    }

    struct TestResponse {
        ok: bool,
    }

    impl Outcome for TestResponse {
        fn succeeded(&self) -> bool {
            self.ok
        }
    }

    fn record(id: PrincipalId, role: Role, parish: Option<ParishId>) -> DirectoryRecord {
        DirectoryRecord {
            id,
            display_name: "Teresa Molina".to_string(),
            role,
            parish,
            active: true,
            credential_change_required: false,
            credential_hash: Some("$argon2id$stored-hash".to_string()),
        }
    }

    fn mint(sub: PrincipalId, now: DateTime<Utc>) -> String {
        let claims = BearerClaims {
            sub,
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::minutes(10),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .expect("failed to encode token")
    }

    fn chain_with(
        directory: Arc<StubDirectory>,
        sink: Arc<MemoryActivitySink>,
        general: LimiterSettings,
    ) -> AdmissionChain {
        AdmissionChain::new(
            CredentialVerifier::new(SECRET),
            directory,
            Limiters::new(general, LimiterSettings::new(10, Duration::seconds(900))),
            sink,
        )
    }

    fn ctx(bearer: Option<String>, resource_parish: Option<ParishId>, now: DateTime<Utc>) -> RequestContext {
        RequestContext {
            method: "GET".to_string(),
            path: "/catechumens/1".to_string(),
            origin: "203.0.113.9".to_string(),
            bearer,
            resource_parish,
            now,
        }
    }

    const CATECHUMEN_READ: RoutePolicy = RoutePolicy {
        allowed_roles: &[Role::Admin, Role::Parroco, Role::Secretaria, Role::Catequista],
        parish_scoped: true,
        credential_change_exempt: false,
        limit: LimitConcern::General,
        action: "catechumens.read",
    };

    const LOGIN: RoutePolicy = RoutePolicy {
        allowed_roles: &[],
        parish_scoped: false,
        credential_change_exempt: true,
        limit: LimitConcern::Login,
        action: "sessions.login",
    };

    #[tokio::test]
    async fn full_admission_invokes_handler_once_and_logs_once() {
        let now = Utc::now();
        let parish = ParishId::new();
        let id = PrincipalId::new();

        let directory = Arc::new(StubDirectory::with(vec![record(id, Role::Catequista, Some(parish))]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink.clone(), LimiterSettings::new(100, Duration::seconds(60)));

        let invocations = AtomicU32::new(0);
        let result = chain
            .run(&ctx(Some(mint(id, now)), Some(parish), now), &CATECHUMEN_READ, |principal| {
                invocations.fetch_add(1, Ordering::SeqCst);
                assert_eq!(principal.id, id);
                async { TestResponse { ok: true } }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].principal, id);
        assert_eq!(records[0].role, Role::Catequista);
        assert_eq!(records[0].action, "catechumens.read");
        assert_eq!(records[0].path, "/catechumens/1");
    }

    #[tokio::test]
    async fn cross_parish_request_is_rejected_before_the_handler() {
        let now = Utc::now();
        let id = PrincipalId::new();

        let directory = Arc::new(StubDirectory::with(vec![record(
            id,
            Role::Catequista,
            Some(ParishId::new()),
        )]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink.clone(), LimiterSettings::new(100, Duration::seconds(60)));

        let other_parish = ParishId::new();
        let invocations = AtomicU32::new(0);
        let result = chain
            .run(
                &ctx(Some(mint(id, now)), Some(other_parish), now),
                &CATECHUMEN_READ,
                |_principal| {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    async { TestResponse { ok: true } }
                },
            )
            .await;

        assert_eq!(
            result.err(),
            Some(Rejection::TenantMismatch { resource_parish: other_parish })
        );
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn invalid_credential_short_circuits_before_the_directory() {
        let now = Utc::now();
        let directory = Arc::new(StubDirectory::with(vec![]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory.clone(), sink, LimiterSettings::new(100, Duration::seconds(60)));

        let result = chain
            .run(
                &ctx(Some("garbage".to_string()), None, now),
                &CATECHUMEN_READ,
                |_principal| async { TestResponse { ok: true } },
            )
            .await;

        assert_eq!(result.err(), Some(Rejection::InvalidCredential));
        assert_eq!(directory.lookups(), 0);
    }

    #[tokio::test]
    async fn over_quota_principal_is_rate_limited() {
        let now = Utc::now();
        let parish = ParishId::new();
        let id = PrincipalId::new();

        let directory = Arc::new(StubDirectory::with(vec![record(id, Role::Secretaria, Some(parish))]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink, LimiterSettings::new(1, Duration::seconds(60)));

        let token = mint(id, now);
        let first = chain
            .run(&ctx(Some(token.clone()), Some(parish), now), &CATECHUMEN_READ, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        assert!(first.is_ok());

        let second = chain
            .run(&ctx(Some(token), Some(parish), now), &CATECHUMEN_READ, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        match second.err() {
            Some(Rejection::RateLimited { retry_after_secs }) => assert!(retry_after_secs > 0),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn flagged_principal_is_confined_to_exempt_routes() {
        let now = Utc::now();
        let parish = ParishId::new();
        let id = PrincipalId::new();

        let directory = Arc::new(StubDirectory::with(vec![DirectoryRecord {
            credential_change_required: true,
            ..record(id, Role::Parroco, Some(parish))
        }]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink, LimiterSettings::new(100, Duration::seconds(60)));

        let token = mint(id, now);
        let blocked = chain
            .run(&ctx(Some(token.clone()), Some(parish), now), &CATECHUMEN_READ, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        assert_eq!(blocked.err(), Some(Rejection::CredentialChangeRequired));

        const PROFILE: RoutePolicy = RoutePolicy {
            allowed_roles: &[],
            parish_scoped: false,
            credential_change_exempt: true,
            limit: LimitConcern::General,
            action: "profile.read",
        };
        let allowed = chain
            .run(&ctx(Some(token), None, now), &PROFILE, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn disallowed_role_is_rejected() {
        let now = Utc::now();
        let parish = ParishId::new();
        let id = PrincipalId::new();

        let directory = Arc::new(StubDirectory::with(vec![record(id, Role::Catequista, Some(parish))]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink, LimiterSettings::new(100, Duration::seconds(60)));

        const PARISH_ADMIN_ONLY: RoutePolicy = RoutePolicy {
            allowed_roles: &[Role::Admin, Role::Parroco],
            parish_scoped: false,
            credential_change_exempt: false,
            limit: LimitConcern::General,
            action: "parishes.update",
        };

        let result = chain
            .run(&ctx(Some(mint(id, now)), None, now), &PARISH_ADMIN_ONLY, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        assert_eq!(result.err(), Some(Rejection::InsufficientRole { role: Role::Catequista }));
    }

    #[tokio::test]
    async fn optional_entry_admits_anonymous_until_login_quota() {
        let now = Utc::now();
        let directory = Arc::new(StubDirectory::with(vec![]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink.clone(), LimiterSettings::new(100, Duration::seconds(60)));

        for i in 0..10 {
            let at = now + Duration::seconds(i);
            let result = chain
                .run_optional(&ctx(None, None, at), &LOGIN, |principal| async move {
                    assert!(principal.is_none());
                    TestResponse { ok: true }
                })
                .await;
            assert!(result.is_ok(), "attempt {i}");
        }

        let eleventh = chain
            .run_optional(&ctx(None, None, now + Duration::seconds(10)), &LOGIN, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        match eleventh.err() {
            Some(Rejection::RateLimited { retry_after_secs }) => assert!(retry_after_secs > 0),
            other => panic!("expected RateLimited, got {other:?}"),
        }

        // Anonymous successes carry no identity; nothing is logged.
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn optional_entry_still_authenticates_a_present_credential() {
        let now = Utc::now();
        let id = PrincipalId::new();
        let directory = Arc::new(StubDirectory::with(vec![record(id, Role::Admin, None)]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink, LimiterSettings::new(100, Duration::seconds(60)));

        let result = chain
            .run_optional(&ctx(Some(mint(id, now)), None, now), &LOGIN, |principal| async move {
                assert_eq!(principal.map(|p| p.id), Some(id));
                TestResponse { ok: true }
            })
            .await;
        assert!(result.is_ok());

        let bad = chain
            .run_optional(&ctx(Some("garbage".to_string()), None, now), &LOGIN, |_p| async {
                TestResponse { ok: true }
            })
            .await;
        assert_eq!(bad.err(), Some(Rejection::InvalidCredential));
    }

    #[tokio::test]
    async fn failed_outcomes_are_not_logged() {
        let now = Utc::now();
        let parish = ParishId::new();
        let id = PrincipalId::new();

        let directory = Arc::new(StubDirectory::with(vec![record(id, Role::Parroco, Some(parish))]));
        let sink = Arc::new(MemoryActivitySink::new());
        let chain = chain_with(directory, sink.clone(), LimiterSettings::new(100, Duration::seconds(60)));

        let result = chain
            .run(&ctx(Some(mint(id, now)), Some(parish), now), &CATECHUMEN_READ, |_p| async {
                TestResponse { ok: false }
            })
            .await;

        assert!(result.is_ok());
        assert!(sink.records().is_empty());
    }
}
