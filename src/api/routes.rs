//! Router assembly and server lifecycle.

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::mappings::{MappingStore, SharedMappingStore};
use crate::usage::UsageClient;

use super::mappings as mappings_api;
use super::usage as usage_api;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Usage client; `None` when no admin key is configured, in which case
    /// the usage endpoint reports the misconfiguration instead of the whole
    /// server refusing to start.
    pub usage: Option<UsageClient>,
    /// API key mapping store
    pub mappings: SharedMappingStore,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let fetcher = Fetcher::new();

    let usage = config
        .admin_key
        .as_ref()
        .map(|key| match &config.usage_api_url {
            Some(base) => UsageClient::with_base_url(fetcher.clone(), key, base)
                .with_context(|| format!("invalid USAGE_API_URL: {}", base)),
            None => Ok(UsageClient::new(fetcher.clone(), key)),
        })
        .transpose()?;
    if usage.is_none() {
        tracing::warn!("OPENAI_ADMIN_KEY not configured, usage endpoint will report an error");
    }

    let mappings = Arc::new(MappingStore::new(config.mappings_path.clone()));

    let state = Arc::new(AppState {
        config: config.clone(),
        usage,
        mappings,
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/debug", get(debug))
        .route("/api/usage", get(usage_api::get_usage))
        .route(
            "/api/mappings",
            get(mappings_api::list_mappings)
                .post(mappings_api::upsert_mapping)
                .delete(mappings_api::delete_mapping),
        )
        .route("/api/migrate-mappings", get(mappings_api::migrate_mappings))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

/// Response for the health endpoint.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    admin_key_configured: bool,
}

/// GET /api/health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        admin_key_configured: state.usage.is_some(),
    })
}

/// GET /api/debug
/// Configuration diagnostics. Reports presence and shape of the admin key,
/// never the key itself.
async fn debug(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let admin_key = state.config.admin_key.as_deref();
    let prefix = admin_key.map(|k| {
        let head: String = k.chars().take(7).collect();
        format!("{}...", head)
    });

    Json(serde_json::json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "admin_key": {
            "configured": admin_key.is_some(),
            "prefix": prefix.unwrap_or_else(|| "missing".to_string()),
            "length": admin_key.map(str::len).unwrap_or(0),
        },
        "usage_api_url": state.config.usage_api_url,
        "mappings": {
            "storage_path": state.mappings.storage_path().display().to_string(),
            "seed_configured": state.config.seed_mappings_path.is_some(),
        },
        "hint": if admin_key.is_some() {
            "Configuration looks good!"
        } else {
            "OPENAI_ADMIN_KEY is not configured. Set it in the server environment."
        },
    }))
}
