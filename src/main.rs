use std::sync::Arc;

use anyhow::Context;
use axum::http::{Method, header};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use chatbot_onboarding::config::{IdentityConfig, OnboardingConfig, ServerConfig};
use chatbot_onboarding::identity::InMemoryIdentity;
use chatbot_onboarding::onboarding::registry::spawn_expiry_task;
use chatbot_onboarding::onboarding::{
    OnboardingRouteState, SessionDeps, SessionRegistry, onboarding_routes,
};

/// Stdout always; a non-blocking daily file too when a log dir is configured.
fn init_tracing(log_dir: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = tracing_subscriber::fmt::layer().with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "onboarding.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let server = ServerConfig::from_env().context("invalid server configuration")?;
    let _log_guard = init_tracing(server.log_dir.as_deref());

    let config = OnboardingConfig::from_env().context("invalid onboarding configuration")?;
    let identity_config = IdentityConfig::from_env().context("invalid identity configuration")?;
    let addr = server.socket_addr()?;

    eprintln!("🤖 Chatbot Onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://{addr}/api/sessions");
    eprintln!("   Session WS: ws://{addr}/ws/sessions/{{id}}");
    eprintln!(
        "   Time unit: {:?}, detection success: {:.0}%, aggregation: {:?}",
        config.page_delay,
        config.detection_success_probability * 100.0,
        config.aggregation
    );
    eprintln!(
        "   Session TTL: {:?}, auto-verify: {}, Google account: {}",
        config.session_ttl,
        identity_config.auto_verify,
        identity_config.google_email.as_deref().unwrap_or("none")
    );

    let identity = Arc::new(InMemoryIdentity::from_config(&identity_config));
    let deps = SessionDeps::simulated(&config, identity);
    let registry = SessionRegistry::new(config, deps);

    // Spawn session expiry sweep task
    let _expiry_handle = spawn_expiry_task(Arc::clone(&registry));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE]);

    let app = onboarding_routes(OnboardingRouteState { registry }).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Onboarding server started");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
