//! Membership API server
//! Mission: Register members, authenticate them, and gate endpoints by role

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use membership_backend::{
    auth::{AuthService, AuthState, BcryptHasher, JwtHandler, UserStore},
    clock::SystemClock,
    config::{Args, Config},
    create_router,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_args(Args::parse()).context("Invalid configuration")?;

    info!("Membership API starting");

    let clock = Arc::new(SystemClock);
    let user_store = Arc::new(
        UserStore::with_clock(&config.db_path, clock.clone())
            .with_context(|| format!("Failed to open user store at {}", config.db_path))?,
    );
    let hasher = Arc::new(BcryptHasher::from_config(&config.auth));
    let jwt_handler = Arc::new(JwtHandler::new(&config.auth));

    info!(
        "Auth configured: token TTL {}h, issuer {}, bcrypt cost {}",
        config.auth.token_ttl_hours,
        config.auth.issuer,
        hasher.cost()
    );

    let service = Arc::new(
        AuthService::new(user_store, hasher, jwt_handler, clock)
            .context("Failed to initialise auth service")?,
    );

    if let Some(seed) = &config.admin {
        service
            .ensure_admin(seed)
            .context("Failed to create bootstrap admin")?;
    }

    info!("User store ready at: {}", config.db_path);

    let app = create_router(AuthState::new(service));

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("API server listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}

/// Initialize tracing with env-filter support
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "membership_backend=debug,membership=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate directory (when run with --manifest-path from elsewhere)
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
