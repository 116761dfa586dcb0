//! API key mapping endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::mappings::{is_valid_key_id, MigrationReport};

use super::routes::AppState;

/// Request to add or update a mapping.
#[derive(Debug, Deserialize)]
pub struct UpsertMappingRequest {
    pub api_key_id: Option<String>,
    pub user_name: Option<String>,
}

/// Request to remove a mapping.
#[derive(Debug, Deserialize)]
pub struct DeleteMappingRequest {
    pub api_key_id: Option<String>,
}

/// Response after a successful mutation.
#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mappings: Option<HashMap<String, String>>,
}

/// Response after running the seed migration.
#[derive(Debug, Serialize)]
pub struct MigrationResponse {
    pub success: bool,
    pub message: String,
    pub details: MigrationReport,
    pub mappings: HashMap<String, String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// GET /api/mappings
/// The whole dictionary as a JSON object.
pub async fn list_mappings(State(state): State<Arc<AppState>>) -> Json<HashMap<String, String>> {
    Json(state.mappings.all().await)
}

/// POST /api/mappings
/// Add or update one mapping.
pub async fn upsert_mapping(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertMappingRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let (api_key_id, user_name) = match (req.api_key_id, req.user_name) {
        (Some(id), Some(name)) if !id.is_empty() && !name.is_empty() => (id, name),
        _ => {
            return Err(error(
                StatusCode::BAD_REQUEST,
                "api_key_id and user_name are required",
            ))
        }
    };

    if !is_valid_key_id(&api_key_id) {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "api_key_id must start with 'key_'",
        ));
    }

    state
        .mappings
        .upsert(&api_key_id, &user_name)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(MutationResponse {
        success: true,
        message: format!("Mapping added: {} -> {}", api_key_id, user_name),
        mappings: Some(state.mappings.all().await),
    }))
}

/// DELETE /api/mappings
/// Remove one mapping.
pub async fn delete_mapping(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteMappingRequest>,
) -> Result<Json<MutationResponse>, ApiError> {
    let api_key_id = req
        .api_key_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "api_key_id is required"))?;

    let existed = state
        .mappings
        .delete(&api_key_id)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if !existed {
        return Err(error(StatusCode::NOT_FOUND, "Mapping not found"));
    }

    Ok(Json(MutationResponse {
        success: true,
        message: format!("Mapping removed: {}", api_key_id),
        mappings: None,
    }))
}

/// GET /api/migrate-mappings
/// Merge the configured seed file into the store. Existing entries win; the
/// merge is idempotent and safe to re-run.
pub async fn migrate_mappings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MigrationResponse>, ApiError> {
    let seed_path = state.config.seed_mappings_path.as_ref().ok_or_else(|| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "SEED_MAPPINGS_PATH not configured",
        )
    })?;

    let contents = tokio::fs::read_to_string(seed_path).await.map_err(|e| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to read seed file {}: {}", seed_path.display(), e),
        )
    })?;

    let seed: HashMap<String, String> = serde_json::from_str(&contents).map_err(|e| {
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("seed file is not a string map: {}", e),
        )
    })?;

    let report = state
        .mappings
        .migrate(seed)
        .await
        .map_err(|e| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!(
        from_seed = report.from_seed,
        after_merge = report.after_merge,
        "seed mappings migrated"
    );

    Ok(Json(MigrationResponse {
        success: true,
        message: "Migration completed successfully".to_string(),
        details: report,
        mappings: state.mappings.all().await,
    }))
}
