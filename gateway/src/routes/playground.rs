//! The playground: synchronous, no-commitment previews that reuse the template compiler
//! and Model Invoker without touching the durable eval-run queue (§4.6). Every call here
//! always returns HTTP 200 — a provider fault becomes a sub-result's `error`, never a
//! failed response, and playground history persistence is fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{instrument, warn};
use uuid::Uuid;

use prompt_eval_core::entities::{ChatMessage, ModelConfig, PlaygroundSubResult, PromptVersionType};
use prompt_eval_core::model_invoker::ModelInvoker;
use prompt_eval_core::repo;
use prompt_eval_core::template;

use crate::error::Error;
use crate::gateway_util::{AppState, StructuredJson};

const PLAYGROUND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
pub struct CompilePayload {
    #[serde(rename = "type")]
    pub kind: PromptVersionType,
    pub template_text: Option<String>,
    pub template_messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

#[instrument(skip_all)]
pub async fn compile(StructuredJson(payload): StructuredJson<CompilePayload>) -> Json<template::DryRunResult> {
    let result = template::dry_run(
        payload.kind,
        payload.template_text.as_deref(),
        payload.template_messages.as_deref(),
        &payload.variables,
    );
    Json(result)
}

#[derive(Debug, Deserialize)]
pub struct RunPayload {
    pub prompt_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PromptVersionType,
    pub template_text: Option<String>,
    pub template_messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub model: ModelConfig,
}

#[instrument(skip_all, fields(prompt_id = %payload.prompt_id, model_id = %payload.model.id))]
pub async fn run(
    state: AppState,
    StructuredJson(payload): StructuredJson<RunPayload>,
) -> Result<Json<PlaygroundSubResult>, Error> {
    let invoker = ModelInvoker::new();
    let result = invoke_one(
        &invoker,
        payload.kind,
        payload.template_text.as_deref(),
        payload.template_messages.as_deref(),
        &payload.variables,
        &payload.model,
    )
    .await;

    let config = json!({
        "template_type": payload.kind,
        "template_text": payload.template_text,
        "template_messages": payload.template_messages,
        "variables": payload.variables,
        "models": [&payload.model],
    });
    persist_history(&state, payload.prompt_id, None, &config, &json!([&result])).await;
    counter!("request_count", "endpoint" => "playground_run").increment(1);

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct RunMultiPayload {
    pub prompt_id: Uuid,
    #[serde(rename = "type")]
    pub kind: PromptVersionType,
    pub template_text: Option<String>,
    pub template_messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub models: Vec<ModelConfig>,
}

#[instrument(skip_all, fields(prompt_id = %payload.prompt_id, model_count = payload.models.len()))]
pub async fn run_multi(
    state: AppState,
    StructuredJson(payload): StructuredJson<RunMultiPayload>,
) -> Result<Json<Vec<PlaygroundSubResult>>, Error> {
    if payload.models.is_empty() {
        return Err(Error::InvalidRequest {
            message: "models must not be empty".to_string(),
        });
    }
    let invoker = Arc::new(ModelInvoker::new());
    let futures = payload.models.iter().cloned().map(|model| {
        let invoker = Arc::clone(&invoker);
        let kind = payload.kind;
        let template_text = payload.template_text.clone();
        let template_messages = payload.template_messages.clone();
        let variables = payload.variables.clone();
        async move {
            invoke_one(
                &invoker,
                kind,
                template_text.as_deref(),
                template_messages.as_deref(),
                &variables,
                &model,
            )
            .await
        }
    });
    let results = futures::future::join_all(futures).await;

    let config = json!({
        "template_type": payload.kind,
        "template_text": payload.template_text,
        "template_messages": payload.template_messages,
        "variables": payload.variables,
        "models": payload.models,
    });
    persist_history(&state, payload.prompt_id, None, &config, &json!(results)).await;
    counter!("request_count", "endpoint" => "playground_run_multi").increment(1);

    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct RunVersionPayload {
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub model: ModelConfig,
}

#[instrument(skip_all, fields(version_id = %version_id, model_id = %payload.model.id))]
pub async fn run_version(
    state: AppState,
    Path(version_id): Path<Uuid>,
    StructuredJson(payload): StructuredJson<RunVersionPayload>,
) -> Result<Json<PlaygroundSubResult>, Error> {
    let version = repo::get_prompt_version(&state.pool, version_id).await?;
    let template_messages = parse_template_messages(&version);

    let invoker = ModelInvoker::new();
    let result = invoke_one(
        &invoker,
        version.kind,
        version.template_text.as_deref(),
        Some(&template_messages),
        &payload.variables,
        &payload.model,
    )
    .await;

    let config = json!({
        "variables": payload.variables,
        "models": [&payload.model],
    });
    persist_history(&state, version.prompt_id, Some(version_id), &config, &json!([&result])).await;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct VersionEntry {
    pub version_id: Uuid,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct RunVersionsPayload {
    pub entries: Vec<VersionEntry>,
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Serialize)]
pub struct VersionPlaygroundResult {
    pub version_id: Uuid,
    pub results: Vec<PlaygroundSubResult>,
}

/// Fetches every referenced version sequentially (a persistence session is not safe for
/// concurrent reads), then fans the model calls for all of them out in parallel together.
#[instrument(skip_all, fields(version_count = payload.entries.len(), model_count = payload.models.len()))]
pub async fn run_versions(
    state: AppState,
    StructuredJson(payload): StructuredJson<RunVersionsPayload>,
) -> Result<Json<Vec<VersionPlaygroundResult>>, Error> {
    if payload.entries.is_empty() || payload.models.is_empty() {
        return Err(Error::InvalidRequest {
            message: "entries and models must not be empty".to_string(),
        });
    }

    let mut versions = Vec::with_capacity(payload.entries.len());
    for entry in &payload.entries {
        let version = repo::get_prompt_version(&state.pool, entry.version_id).await?;
        versions.push((entry, version));
    }

    let invoker = Arc::new(ModelInvoker::new());
    let futures = versions.iter().map(|(entry, version)| {
        let template_messages = parse_template_messages(version);
        let version_id = entry.version_id;
        let variables = entry.variables.clone();
        let kind = version.kind;
        let template_text = version.template_text.clone();
        let models = payload.models.clone();
        let invoker = Arc::clone(&invoker);
        async move {
            let subfutures = models.into_iter().map(|model| {
                let invoker = Arc::clone(&invoker);
                let variables = variables.clone();
                let template_text = template_text.clone();
                let template_messages = template_messages.clone();
                async move {
                    invoke_one(
                        &invoker,
                        kind,
                        template_text.as_deref(),
                        Some(&template_messages),
                        &variables,
                        &model,
                    )
                    .await
                }
            });
            let results = futures::future::join_all(subfutures).await;
            VersionPlaygroundResult { version_id, results }
        }
    });
    let grouped = futures::future::join_all(futures).await;

    let config = json!({
        "entries": payload.entries.iter().map(|e| json!({"version_id": e.version_id, "variables": e.variables})).collect::<Vec<_>>(),
        "models": payload.models,
    });
    if let Some((_, first_version)) = versions.first() {
        persist_history(&state, first_version.prompt_id, None, &config, &json!(grouped)).await;
    }

    Ok(Json(grouped))
}

#[instrument(skip_all, fields(model_id = %model.id))]
async fn invoke_one(
    invoker: &ModelInvoker,
    kind: PromptVersionType,
    template_text: Option<&str>,
    template_messages: Option<&[ChatMessage]>,
    variables: &HashMap<String, Value>,
    model: &ModelConfig,
) -> PlaygroundSubResult {
    let required = match kind {
        PromptVersionType::Text => template::extract_variables(template_text.unwrap_or_default()),
        PromptVersionType::Chat => template_messages
            .unwrap_or_default()
            .iter()
            .flat_map(|m| template::extract_variables(&m.content))
            .collect(),
    };
    let (is_valid, missing) = template::validate(&required, variables);
    if !is_valid {
        return PlaygroundSubResult {
            model_id: model.id.clone(),
            output: None,
            metrics: json!({}),
            error: Some(format!("Missing variables: {}", missing.join(", "))),
        };
    }

    let messages = template::build_messages(kind, template_text, template_messages, variables);
    let response = invoker.invoke(&messages, model, PLAYGROUND_TIMEOUT).await;

    PlaygroundSubResult {
        model_id: model.id.clone(),
        output: if response.error.is_some() {
            None
        } else {
            Some(response.output)
        },
        metrics: json!({
            "latency_ms": response.latency_ms,
            "prompt_tokens": response.tokens.prompt,
            "completion_tokens": response.tokens.completion,
            "total_tokens": response.tokens.total,
            "cost_usd": response.cost_usd,
        }),
        error: response.error,
    }
}

fn parse_template_messages(version: &prompt_eval_core::entities::PromptVersion) -> Vec<ChatMessage> {
    version
        .template_messages
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

async fn persist_history(
    state: &AppState,
    prompt_id: Uuid,
    version_id: Option<Uuid>,
    config: &Value,
    results: &Value,
) {
    if let Err(err) = repo::insert_playground_run(&state.pool, prompt_id, version_id, config, results).await {
        warn!(error = %err, "failed to persist playground run history");
    }
}
