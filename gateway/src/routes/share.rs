//! Share tokens and the public (unauthenticated) report surface that resolves them.
//! Grounded in the reduced, share-safe projections a report viewer is allowed to see:
//! no prompt template, no model config, no internal ids beyond the run and result rows.

use axum::extract::{Path, Query};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use prompt_eval_core::entities::EvalRun;
use prompt_eval_core::repo;

use crate::error::Error;
use crate::gateway_util::AppState;
use crate::pagination::PageQuery;

#[derive(Debug, Deserialize)]
pub struct IssueSharePayload {
    #[serde(default = "default_expires_in_days")]
    pub expires_in_days: i64,
}

fn default_expires_in_days() -> i64 {
    30
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub share_token: String,
    pub share_expires_at: Option<DateTime<Utc>>,
}

#[instrument(skip_all, fields(run_id = %id))]
pub async fn issue(
    state: AppState,
    Path(id): Path<Uuid>,
    body: Option<Json<IssueSharePayload>>,
) -> Result<Json<ShareResponse>, Error> {
    let expires_in_days = body.map_or(default_expires_in_days(), |Json(payload)| payload.expires_in_days);
    let run = repo::issue_share(&state.pool, id, expires_in_days).await?;
    Ok(Json(ShareResponse {
        share_token: run.share_token.unwrap_or_default(),
        share_expires_at: run.share_expires_at,
    }))
}

#[instrument(skip_all, fields(run_id = %id))]
pub async fn revoke(state: AppState, Path(id): Path<Uuid>) -> Result<(), Error> {
    repo::revoke_share(&state.pool, id).await
}

#[derive(Debug, Serialize)]
pub struct EvalRunPublicResponse {
    pub id: Uuid,
    pub name: Option<String>,
    pub status: prompt_eval_core::entities::EvalRunStatus,
    pub summary: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub models: Value,
}

impl From<EvalRun> for EvalRunPublicResponse {
    fn from(run: EvalRun) -> Self {
        Self {
            id: run.id,
            name: run.name,
            status: run.status,
            summary: run.summary,
            created_at: run.created_at,
            completed_at: run.completed_at,
            models: run.models,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EvalResultPublicResponse {
    pub id: Uuid,
    pub model_id: String,
    pub input: Value,
    pub expected_output: Option<Value>,
    pub output: Option<String>,
    pub grading: Value,
    pub metrics: Value,
}

#[derive(Debug, Serialize)]
pub struct PaginatedPublicResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

#[instrument(skip_all)]
pub async fn get_report(
    state: AppState,
    Path(token): Path<String>,
) -> Result<Json<EvalRunPublicResponse>, Error> {
    let run = repo::get_run_by_token(&state.pool, &token).await?;
    Ok(Json(run.into()))
}

#[instrument(skip_all)]
pub async fn get_report_results(
    state: AppState,
    Path(token): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedPublicResponse<EvalResultPublicResponse>>, Error> {
    let run = repo::get_run_by_token(&state.pool, &token).await?;
    let (page, limit) = query.normalized();
    let page_result = repo::list_eval_results(&state.pool, run.id, page, limit, None, None).await?;

    let mut items = Vec::with_capacity(page_result.items.len());
    for result in page_result.items {
        let item = repo::get_dataset_item(&state.pool, result.dataset_item_id).await?;
        items.push(EvalResultPublicResponse {
            id: result.id,
            model_id: result.model_id,
            input: item.input,
            expected_output: item.expected_output,
            output: result.output,
            grading: result.grading,
            metrics: result.metrics,
        });
    }

    Ok(Json(PaginatedPublicResponse {
        items,
        total: page_result.total,
        page: page_result.page,
        limit: page_result.limit,
        pages: page_result.pages(),
    }))
}
