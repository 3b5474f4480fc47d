//! Eval run lifecycle: create (enqueues a `pending` row the worker will dequeue), list,
//! get, cancel, and paginated results.

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::Json;
use metrics::counter;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use prompt_eval_core::entities::{EvalRun, ModelConfig};
use prompt_eval_core::repo;

use crate::error::Error;
use crate::gateway_util::{AppState, StructuredJson};
use crate::pagination::{PageQuery, PageResponse};

#[derive(Debug, Deserialize)]
pub struct CreateEvalRunPayload {
    pub name: Option<String>,
    pub prompt_version_id: Uuid,
    pub dataset_id: Uuid,
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub assertions: Value,
}

#[instrument(skip_all, fields(prompt_version_id = %payload.prompt_version_id, dataset_id = %payload.dataset_id))]
pub async fn create(
    state: AppState,
    StructuredJson(payload): StructuredJson<CreateEvalRunPayload>,
) -> Result<(StatusCode, Json<EvalRun>), Error> {
    if payload.models.is_empty() {
        return Err(Error::InvalidRequest {
            message: "models must not be empty".to_string(),
        });
    }
    // Fail fast with a clear 404 instead of a foreign-key-violation 500.
    repo::get_prompt_version(&state.pool, payload.prompt_version_id).await?;
    repo::get_dataset(&state.pool, payload.dataset_id).await?;

    let run = repo::create_eval_run(
        &state.pool,
        payload.name,
        payload.prompt_version_id,
        payload.dataset_id,
        payload.models,
        payload.assertions,
    )
    .await?;
    counter!("request_count", "endpoint" => "eval_runs_create").increment(1);
    Ok((StatusCode::CREATED, Json(run)))
}

#[instrument(skip_all, fields(page = query.page, limit = query.limit))]
pub async fn list(
    state: AppState,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<EvalRun>>, Error> {
    let (page, limit) = query.normalized();
    let page_result = repo::list_eval_runs(&state.pool, page, limit).await?;
    Ok(Json(page_result.into()))
}

#[instrument(skip_all, fields(run_id = %id))]
pub async fn get(state: AppState, Path(id): Path<Uuid>) -> Result<Json<EvalRun>, Error> {
    let run = repo::get_eval_run(&state.pool, id).await?;
    Ok(Json(run))
}

#[instrument(skip_all, fields(run_id = %id))]
pub async fn cancel(state: AppState, Path(id): Path<Uuid>) -> Result<Json<EvalRun>, Error> {
    let run = repo::cancel_eval_run(&state.pool, id).await?;
    Ok(Json(run))
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub model_id: Option<String>,
    pub passed: Option<bool>,
}

#[instrument(skip_all, fields(run_id = %id, model_id = query.model_id.as_deref()))]
pub async fn results(
    state: AppState,
    Path(id): Path<Uuid>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<PageResponse<prompt_eval_core::entities::EvalResult>>, Error> {
    let (page, limit) = query.page.normalized();
    let page_result = repo::list_eval_results(
        &state.pool,
        id,
        page,
        limit,
        query.model_id.as_deref(),
        query.passed,
    )
    .await?;
    Ok(Json(page_result.into()))
}
