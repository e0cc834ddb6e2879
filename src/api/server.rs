//! HTTP server lifecycle: wire up the real external-service clients, bind,
//! and serve until shutdown.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::router::build_router;
use crate::api::types::ApiContext;
use crate::assistant::GeminiClient;
use crate::config::Config;
use crate::identity::HttpIdentityVerifier;
use crate::inference::HttpInferenceGateway;

/// Interval between conversation-cache eviction sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("Database initialization failed: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

/// Build the production `ApiContext` from configuration.
pub fn production_context(config: Config) -> ApiContext {
    let identity = Arc::new(HttpIdentityVerifier::new(
        config.identity_url.clone(),
        config.identity_api_key.clone(),
    ));
    let inference = Arc::new(HttpInferenceGateway::new(config.inference_url.clone()));
    let model = Arc::new(GeminiClient::new(
        config.gemini_url.clone(),
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    ));
    ApiContext::new(config, identity, inference, model)
}

/// Run the server until ctrl-c.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let addr = config.bind_addr;
    let ctx = production_context(config);

    // Fail fast if the database cannot be opened or migrated.
    if let Some(parent) = ctx.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    crate::db::open_database(&ctx.db_path)?;

    spawn_cache_sweeper(&ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    tracing::info!(%addr, "Anevia server listening");

    let app = build_router(ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}

fn spawn_cache_sweeper(ctx: &ApiContext) {
    let conversations = ctx.conversations.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = conversations.sweep_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "Evicted idle conversations");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
