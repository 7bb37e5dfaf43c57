use std::net::SocketAddr;
use std::sync::Arc;

use catequesis_api::app::{AppConfig, Services, build_app};
use catequesis_api::directory::{InMemoryDirectory, ScopeRegistry};
use catequesis_gate::TracingActivitySink;

#[tokio::main]
async fn main() {
    catequesis_observability::init();

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let services = Services {
        directory: Arc::new(InMemoryDirectory::new()),
        scopes: Arc::new(ScopeRegistry::new()),
        activity: Arc::new(TracingActivitySink),
    };

    let app = build_app(AppConfig::new(jwt_secret), services).await;

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080")
        .await
        .expect("failed to bind 0.0.0.0:8080");

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}
