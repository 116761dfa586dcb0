//! GET /api/usage — aggregated usage report for a time range.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::usage::{AggregatedUsage, BucketWidth, UsageError, UsageQuery};

use super::routes::AppState;

/// Query parameters accepted by the usage endpoint.
#[derive(Debug, Deserialize)]
pub struct UsageParams {
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub bucket_width: Option<BucketWidth>,
    pub group_by: Option<String>,
    pub limit: Option<u32>,
}

/// Usage report as served to the dashboard.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub object: &'static str,
    pub data: Vec<serde_json::Value>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
}

impl From<AggregatedUsage> for UsageResponse {
    fn from(aggregated: AggregatedUsage) -> Self {
        Self {
            object: "page",
            data: aggregated.data,
            has_more: aggregated.has_more,
            next_page: aggregated.next_page,
        }
    }
}

/// GET /api/usage
///
/// Serves the merged usage pages for the requested window. A late-page
/// failure still yields a 200 with partial data and `has_more = true`; only
/// losing page 1 fails the request.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageParams>,
) -> Result<Json<UsageResponse>, (StatusCode, Json<serde_json::Value>)> {
    let client = state.usage.as_ref().ok_or_else(|| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "OPENAI_ADMIN_KEY not configured",
            None,
        )
    })?;

    let start_time = params.start_time.ok_or_else(|| {
        error_response(
            StatusCode::BAD_REQUEST,
            "start_time parameter is required",
            None,
        )
    })?;

    let query = UsageQuery {
        start_time,
        end_time: params.end_time,
        bucket_width: params.bucket_width.unwrap_or_default(),
        group_by: params.group_by,
        limit: params.limit,
    };

    match client.fetch_usage(&query).await {
        Ok(aggregated) => Ok(Json(aggregated.into())),
        Err(UsageError::Upstream { status, body }) => {
            tracing::error!(status, "upstream usage API error");
            Err(error_response(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "Failed to fetch usage data from upstream",
                Some(body),
            ))
        }
        Err(e) => {
            tracing::error!(error = %e, "usage aggregation failed");
            Err(error_response(
                StatusCode::BAD_GATEWAY,
                "Failed to fetch usage data from upstream",
                Some(e.to_string()),
            ))
        }
    }
}

fn error_response(
    status: StatusCode,
    error: &str,
    details: Option<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut body = serde_json::json!({ "error": error });
    if let Some(details) = details {
        body["details"] = serde_json::json!(details);
    }
    (status, Json(body))
}
