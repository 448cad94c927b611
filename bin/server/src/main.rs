use clerk_authz::AuthorizationGate;
use clerk_platform_access::{
    ClaimExtractor, MemorySessionStore, SessionStore, TokenLifecycle,
};
use clerk_server::{
    app,
    auth::{AppState, OidcClient, PgSessionStore},
    config::ServerConfig,
    error::StartupError,
    handler::InMemoryHandler,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> clerk_core::Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        details: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let store = session_store(&config).await?;

    let idle_timeout = chrono::Duration::minutes(config.session.idle_timeout_minutes);
    purge_idle_sessions(store.as_ref(), idle_timeout, "startup").await;

    let cleanup_store = store.clone();
    let cleanup_interval = Duration::from_secs(config.session.cleanup_interval_seconds);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            purge_idle_sessions(cleanup_store.as_ref(), idle_timeout, "periodic").await;
        }
    });

    tracing::info!("Discovering OIDC provider...");
    let oidc_client = OidcClient::discover(config.oidc.clone(), &config.provider)
        .await
        .map_err(StartupError::Provider)?;

    let lifecycle = TokenLifecycle::new(
        Arc::new(oidc_client),
        store,
        ClaimExtractor::from_config(&config.oidc),
    )
    .with_retry_policy(config.provider.clone())
    .with_default_token_lifetime(chrono::Duration::seconds(
        config.session.default_token_lifetime_seconds,
    ));

    let state = Arc::new(AppState::new(
        lifecycle,
        AuthorizationGate::new(config.authz.clone()),
        Arc::new(InMemoryHandler::default()),
        config.session.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| StartupError::Io {
            details: format!("failed to bind to {}: {e}", config.listen_addr),
        })?;

    tracing::info!("listening on http://{}", config.listen_addr);

    axum::serve(listener, app::router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Io {
            details: format!("server error: {e}"),
        })?;

    Ok(())
}

/// Selects Postgres when a database URL is configured, memory otherwise.
async fn session_store(
    config: &ServerConfig,
) -> clerk_core::Result<Arc<dyn SessionStore>, StartupError> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("No database configured, sessions are kept in memory");
        return Ok(Arc::new(MemorySessionStore::new()));
    };

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|e| StartupError::Database {
            details: format!("failed to connect: {e}"),
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .map_err(|e| StartupError::Database {
            details: format!("failed to run migrations: {e}"),
        })?;

    Ok(Arc::new(PgSessionStore::new(db_pool)))
}

async fn purge_idle_sessions(
    store: &dyn SessionStore,
    idle_timeout: chrono::Duration,
    trigger: &'static str,
) {
    let cutoff = chrono::Utc::now() - idle_timeout;
    match store.purge_idle(cutoff).await {
        Ok(count) if count > 0 => {
            tracing::info!(deleted_sessions = count, trigger, "Cleaned up idle sessions");
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, trigger, "Failed to cleanup idle sessions");
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
