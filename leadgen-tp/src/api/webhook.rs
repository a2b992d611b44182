//! Engagement webhook and progression query
//!
//! Both live on `/api/moengage/webhook`: POST ingests a delivery, GET reads
//! the progression log back newest-first.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use leadgen_common::Tier;
use serde::{Deserialize, Serialize};

use crate::engine::{FailedEvent, SkippedEvent};
use crate::error::{ApiError, ApiResult};
use crate::ingest::parse_delivery;
use crate::store::ProgressionRecord;
use crate::AppState;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 500;

/// POST response summarising one delivery
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub events_received: usize,
    pub events_processed: usize,
    pub events_skipped: usize,
    pub events_ignored: usize,
    pub events_failed: usize,
    /// Number of tier changes
    pub progressions: usize,
    pub progression_details: Vec<ProgressionRecord>,
    pub skipped: Vec<SkippedEvent>,
    pub failed: Vec<FailedEvent>,
}

/// POST /api/moengage/webhook
///
/// Accepts one event object or an array. Per-event problems never fail the
/// request; only a body that is not an object/array of JSON is rejected.
/// The batch runs on its own task and finishes even if the sender hangs up.
pub async fn receive_webhook(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let events = parse_delivery(&body).map_err(|e| {
        tracing::warn!("Rejected webhook body: {}", e);
        ApiError::BadRequest(e.to_string())
    })?;

    let summary = state
        .engine
        .clone()
        .process_batch_detached(events)
        .await
        .map_err(|e| ApiError::Internal(format!("Webhook batch task failed: {}", e)))?;

    Ok(Json(WebhookResponse {
        success: true,
        events_received: summary.events_received,
        events_processed: summary.events_processed,
        events_skipped: summary.events_skipped,
        events_ignored: summary.events_ignored,
        events_failed: summary.events_failed,
        progressions: summary.progressions.len(),
        progression_details: summary.progressions,
        skipped: summary.skipped,
        failed: summary.failed,
    }))
}

/// Query parameters, kept as text so bad values produce a JSON 400
#[derive(Debug, Default, Deserialize)]
pub struct ProgressionQuery {
    pub limit: Option<String>,
    pub tier: Option<String>,
}

impl ProgressionQuery {
    fn limit(&self) -> ApiResult<u32> {
        match self.limit.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_LIMIT),
            Some(raw) => raw
                .parse::<i64>()
                .map(|n| n.clamp(0, MAX_LIMIT as i64) as u32)
                .map_err(|_| ApiError::BadRequest(format!("Invalid limit: {}", raw))),
        }
    }

    fn tier(&self) -> ApiResult<Option<Tier>> {
        match self.tier.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse::<Tier>()
                .map(Some)
                .map_err(|_| ApiError::BadRequest(format!("Invalid tier: {} (expected cold, warm or hot)", raw))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressionListResponse {
    pub success: bool,
    pub progressions: Vec<ProgressionRecord>,
    /// Records matching the filter, ignoring `limit`
    pub total: u64,
}

/// GET /api/moengage/webhook?limit=N&tier=T
pub async fn list_progressions(
    State(state): State<AppState>,
    Query(query): Query<ProgressionQuery>,
) -> ApiResult<Json<ProgressionListResponse>> {
    let limit = query.limit()?;
    let tier = query.tier()?;

    let page = state.progressions.recent(limit, tier).await?;

    Ok(Json(ProgressionListResponse {
        success: true,
        progressions: page.records,
        total: page.total,
    }))
}
