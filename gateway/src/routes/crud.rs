//! Minimal CRUD surface (§10.1): create/list/get handlers for the project hierarchy.
//! No update or delete — prompt versions are immutable once created, and labels move
//! between them instead of editing in place.

use axum::extract::Path;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use prompt_eval_core::entities::{
    Dataset, DatasetItem, Project, Prompt, PromptVersion, PromptVersionType, UseCase,
};
use prompt_eval_core::repo;

use crate::error::Error;
use crate::gateway_util::{AppState, StructuredJson};

#[derive(Debug, Deserialize)]
pub struct CreateProjectPayload {
    pub name: String,
}

#[instrument(skip_all, fields(name = %payload.name))]
pub async fn create_project(
    state: AppState,
    StructuredJson(payload): StructuredJson<CreateProjectPayload>,
) -> Result<Json<Project>, Error> {
    let project = repo::create_project(&state.pool, &payload.name).await?;
    Ok(Json(project))
}

#[instrument(skip_all)]
pub async fn list_projects(state: AppState) -> Result<Json<Vec<Project>>, Error> {
    let projects = repo::list_projects(&state.pool).await?;
    Ok(Json(projects))
}

#[instrument(skip_all, fields(project_id = %id))]
pub async fn get_project(state: AppState, Path(id): Path<Uuid>) -> Result<Json<Project>, Error> {
    let project = repo::get_project(&state.pool, id).await?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize)]
pub struct CreateUseCasePayload {
    pub project_id: Uuid,
    pub name: String,
}

#[instrument(skip_all, fields(project_id = %payload.project_id, name = %payload.name))]
pub async fn create_use_case(
    state: AppState,
    StructuredJson(payload): StructuredJson<CreateUseCasePayload>,
) -> Result<Json<UseCase>, Error> {
    let use_case = repo::create_use_case(&state.pool, payload.project_id, &payload.name).await?;
    Ok(Json(use_case))
}

#[derive(Debug, Deserialize)]
pub struct ListUseCasesQuery {
    pub project_id: Uuid,
}

#[instrument(skip_all, fields(project_id = %query.project_id))]
pub async fn list_use_cases(
    state: AppState,
    axum::extract::Query(query): axum::extract::Query<ListUseCasesQuery>,
) -> Result<Json<Vec<UseCase>>, Error> {
    let use_cases = repo::list_use_cases(&state.pool, query.project_id).await?;
    Ok(Json(use_cases))
}

#[instrument(skip_all, fields(use_case_id = %id))]
pub async fn get_use_case(state: AppState, Path(id): Path<Uuid>) -> Result<Json<UseCase>, Error> {
    let use_case = repo::get_use_case(&state.pool, id).await?;
    Ok(Json(use_case))
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptPayload {
    pub use_case_id: Uuid,
    pub name: String,
}

#[instrument(skip_all, fields(use_case_id = %payload.use_case_id, name = %payload.name))]
pub async fn create_prompt(
    state: AppState,
    StructuredJson(payload): StructuredJson<CreatePromptPayload>,
) -> Result<Json<Prompt>, Error> {
    let prompt = repo::create_prompt(&state.pool, payload.use_case_id, &payload.name).await?;
    Ok(Json(prompt))
}

#[derive(Debug, Deserialize)]
pub struct ListPromptsQuery {
    pub use_case_id: Uuid,
}

#[instrument(skip_all, fields(use_case_id = %query.use_case_id))]
pub async fn list_prompts(
    state: AppState,
    axum::extract::Query(query): axum::extract::Query<ListPromptsQuery>,
) -> Result<Json<Vec<Prompt>>, Error> {
    let prompts = repo::list_prompts(&state.pool, query.use_case_id).await?;
    Ok(Json(prompts))
}

#[instrument(skip_all, fields(prompt_id = %id))]
pub async fn get_prompt(state: AppState, Path(id): Path<Uuid>) -> Result<Json<Prompt>, Error> {
    let prompt = repo::get_prompt(&state.pool, id).await?;
    Ok(Json(prompt))
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptVersionPayload {
    #[serde(rename = "type")]
    pub kind: PromptVersionType,
    pub template_text: Option<String>,
    pub template_messages: Option<Value>,
    pub model_defaults: Option<Value>,
}

#[instrument(skip_all, fields(prompt_id = %prompt_id))]
pub async fn create_prompt_version(
    state: AppState,
    Path(prompt_id): Path<Uuid>,
    StructuredJson(payload): StructuredJson<CreatePromptVersionPayload>,
) -> Result<Json<PromptVersion>, Error> {
    let version = repo::create_prompt_version(
        &state.pool,
        prompt_id,
        payload.kind,
        payload.template_text,
        payload.template_messages,
        payload.model_defaults,
    )
    .await?;
    Ok(Json(version))
}

#[instrument(skip_all, fields(prompt_id = %prompt_id))]
pub async fn list_prompt_versions(
    state: AppState,
    Path(prompt_id): Path<Uuid>,
) -> Result<Json<Vec<PromptVersion>>, Error> {
    let versions = repo::list_prompt_versions(&state.pool, prompt_id).await?;
    Ok(Json(versions))
}

#[instrument(skip_all, fields(version_id = %id))]
pub async fn get_prompt_version(
    state: AppState,
    Path(id): Path<Uuid>,
) -> Result<Json<PromptVersion>, Error> {
    let version = repo::get_prompt_version(&state.pool, id).await?;
    Ok(Json(version))
}

#[derive(Debug, Deserialize)]
pub struct PromoteLabelPayload {
    pub label: String,
}

#[instrument(skip_all, fields(version_id = %id, label = %payload.label))]
pub async fn promote_label(
    state: AppState,
    Path(id): Path<Uuid>,
    StructuredJson(payload): StructuredJson<PromoteLabelPayload>,
) -> Result<Json<PromptVersion>, Error> {
    let version = repo::promote_label(&state.pool, id, &payload.label).await?;
    Ok(Json(version))
}

#[derive(Debug, Deserialize)]
pub struct CreateDatasetPayload {
    pub use_case_id: Uuid,
    pub name: String,
}

#[instrument(skip_all, fields(use_case_id = %payload.use_case_id, name = %payload.name))]
pub async fn create_dataset(
    state: AppState,
    StructuredJson(payload): StructuredJson<CreateDatasetPayload>,
) -> Result<Json<Dataset>, Error> {
    let dataset = repo::create_dataset(&state.pool, payload.use_case_id, &payload.name).await?;
    Ok(Json(dataset))
}

#[derive(Debug, Deserialize)]
pub struct ListDatasetsQuery {
    pub use_case_id: Uuid,
}

#[instrument(skip_all, fields(use_case_id = %query.use_case_id))]
pub async fn list_datasets(
    state: AppState,
    axum::extract::Query(query): axum::extract::Query<ListDatasetsQuery>,
) -> Result<Json<Vec<Dataset>>, Error> {
    let datasets = repo::list_datasets(&state.pool, query.use_case_id).await?;
    Ok(Json(datasets))
}

#[instrument(skip_all, fields(dataset_id = %id))]
pub async fn get_dataset(state: AppState, Path(id): Path<Uuid>) -> Result<Json<Dataset>, Error> {
    let dataset = repo::get_dataset(&state.pool, id).await?;
    Ok(Json(dataset))
}

#[derive(Debug, Deserialize)]
pub struct CreateDatasetItemPayload {
    pub input: Value,
    pub expected_output: Option<Value>,
    pub metadata: Option<Value>,
}

#[instrument(skip_all, fields(dataset_id = %dataset_id))]
pub async fn create_dataset_item(
    state: AppState,
    Path(dataset_id): Path<Uuid>,
    StructuredJson(payload): StructuredJson<CreateDatasetItemPayload>,
) -> Result<Json<DatasetItem>, Error> {
    let item = repo::create_dataset_item(
        &state.pool,
        dataset_id,
        payload.input,
        payload.expected_output,
        payload.metadata,
    )
    .await?;
    Ok(Json(item))
}

#[instrument(skip_all, fields(dataset_id = %dataset_id))]
pub async fn list_dataset_items(
    state: AppState,
    Path(dataset_id): Path<Uuid>,
) -> Result<Json<Vec<DatasetItem>>, Error> {
    let items = repo::list_dataset_items(&state.pool, dataset_id).await?;
    Ok(Json(items))
}
