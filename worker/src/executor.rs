//! The Fan-out Executor: Cartesian expansion over `items × models`, bounded concurrency,
//! retry-with-backoff, result persistence, and summary computation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use prompt_eval_core::assertions::run_assertions;
use prompt_eval_core::config::Settings;
use prompt_eval_core::entities::{
    Assertion, ChatMessage, CompiledRequest, DatasetItem, EvalRun, Grading, Metrics, ModelConfig,
    Progress, PromptVersion, PromptVersionType, Summary, Tokens,
};
use prompt_eval_core::model_invoker::ModelInvoker;
use prompt_eval_core::repo;
use prompt_eval_core::template;

struct RecordedResult {
    dataset_item_id: Uuid,
    model_id: String,
    model_config: Value,
    request: Value,
    output: Option<String>,
    grading: Value,
    metrics: Value,
    grading_pass: bool,
    grading_score: f64,
    latency_ms: i64,
    cost_usd: Option<f64>,
}

/// Drives one promoted run from materialisation through to a terminal status. The run
/// is assumed to already be in `status = 'running'` (the scheduler promoted it).
#[instrument(skip_all, fields(run_id = %run.id))]
pub async fn process_run(pool: &PgPool, invoker: &Arc<ModelInvoker>, settings: &Settings, run: EvalRun) {
    match materialise(pool, &run).await {
        Ok((version, items, models, assertions)) => {
            run_fan_out(pool, invoker, settings, &run, &version, &items, &models, &assertions).await;
        }
        Err(err) => {
            warn!(error = %err, "run setup failed");
            if let Err(db_err) = repo::finish_run_failed(pool, run.id, &err.to_string()).await {
                warn!(error = %db_err, "failed to persist run failure");
            }
        }
    }
}

async fn materialise(
    pool: &PgPool,
    run: &EvalRun,
) -> Result<(PromptVersion, Vec<DatasetItem>, Vec<ModelConfig>, Vec<Assertion>)> {
    let version = repo::get_prompt_version(pool, run.prompt_version_id)
        .await
        .context("loading prompt version")?;
    let items = repo::list_dataset_items(pool, run.dataset_id)
        .await
        .context("loading dataset items")?;
    if items.is_empty() {
        anyhow::bail!("dataset has zero items");
    }
    let models = run.models_typed().context("parsing run.models")?;
    if models.is_empty() {
        anyhow::bail!("run has zero models");
    }
    let assertions = run.assertions_typed().context("parsing run.assertions")?;
    Ok((version, items, models, assertions))
}

#[allow(clippy::too_many_arguments)]
async fn run_fan_out(
    pool: &PgPool,
    invoker: &Arc<ModelInvoker>,
    settings: &Settings,
    run: &EvalRun,
    version: &PromptVersion,
    items: &[DatasetItem],
    models: &[ModelConfig],
    assertions: &[Assertion],
) {
    let total = (items.len() * models.len()) as i64;
    let mut progress = Progress::new(total);
    if let Err(err) = repo::update_run_progress(pool, run.id, &progress).await {
        warn!(error = %err, "failed to persist initial progress");
    }

    let semaphore = Arc::new(Semaphore::new(settings.eval_concurrency_limit));
    let mut tasks: JoinSet<RecordedResult> = JoinSet::new();
    let run_id_label = run.id.to_string();

    for item in items {
        for model in models {
            let semaphore = Arc::clone(&semaphore);
            let item = item.clone();
            let model = model.clone();
            let assertions = assertions.to_vec();
            let version = version.clone();
            let invoker = Arc::clone(invoker);
            let max_retries = settings.eval_max_retries;
            let timeout = settings.eval_timeout();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return failed_outcome(&item, &model, "Concurrency limiter closed unexpectedly");
                };
                run_one_task(&invoker, &version, &item, &model, &assertions, max_retries, timeout).await
            });
        }
    }

    gauge!("fan_out_in_flight_tasks", "run_id" => run_id_label.clone()).set(total as f64);

    let mut summary_acc = SummaryAccumulator::default();

    while let Some(joined) = tasks.join_next().await {
        gauge!("fan_out_in_flight_tasks", "run_id" => run_id_label.clone()).decrement(1.0);
        match joined {
            Ok(result) => {
                counter!("fan_out_tasks_completed").increment(1);
                match repo::insert_eval_result(
                    pool,
                    run.id,
                    result.dataset_item_id,
                    &result.model_id,
                    &result.model_config,
                    &result.request,
                    result.output.as_deref(),
                    &result.grading,
                    &result.metrics,
                )
                .await
                {
                    Ok(_) => {
                        progress.completed += 1;
                        summary_acc.record(&result);
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to persist eval result");
                        progress.failed += 1;
                    }
                }
            }
            Err(join_err) => {
                warn!(error = %join_err, "task panicked");
                progress.failed += 1;
            }
        }
        progress.recompute_percent();
        if let Err(err) = repo::update_run_progress(pool, run.id, &progress).await {
            warn!(error = %err, "failed to persist progress");
        }
    }

    gauge!("fan_out_in_flight_tasks", "run_id" => run_id_label).set(0.0);

    let summary = summary_acc.finish();
    let summary_json = match serde_json::to_value(&summary) {
        Ok(v) => v,
        Err(err) => {
            warn!(error = %err, "failed to serialize summary");
            serde_json::json!({})
        }
    };
    if let Err(err) = repo::finish_run_completed(pool, run.id, &summary_json).await {
        warn!(error = %err, "failed to persist run completion");
    }
    info!(total = total, passed = summary.passed, failed = summary.failed, "run completed");
}

#[derive(Default)]
struct SummaryAccumulator {
    total: i64,
    passed: i64,
    failed: i64,
    score_sum: f64,
    latency_sum: i64,
    cost_sum: f64,
}

impl SummaryAccumulator {
    fn record(&mut self, result: &RecordedResult) {
        self.total += 1;
        if result.grading_pass {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.score_sum += result.grading_score;
        self.latency_sum += result.latency_ms;
        self.cost_sum += result.cost_usd.unwrap_or(0.0);
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Summary {
        let total = self.total.max(0);
        if total == 0 {
            return Summary::default();
        }
        Summary {
            total,
            passed: self.passed,
            failed: self.failed,
            pass_rate: self.passed as f64 / total as f64,
            avg_score: self.score_sum / total as f64,
            total_latency_ms: self.latency_sum,
            avg_latency_ms: self.latency_sum as f64 / total as f64,
            total_cost_usd: self.cost_sum,
        }
    }
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(item_id = %item.id, model_id = %model.id))]
async fn run_one_task(
    invoker: &ModelInvoker,
    version: &PromptVersion,
    item: &DatasetItem,
    model: &ModelConfig,
    assertions: &[Assertion],
    max_retries: u32,
    timeout: Duration,
) -> RecordedResult {
    let model_config_json = serde_json::to_value(model).unwrap_or(Value::Null);
    let vars: HashMap<String, Value> = item
        .input
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let parsed_chat_messages = parse_template_messages(version);

    let required = match version.kind {
        PromptVersionType::Text => {
            template::extract_variables(version.template_text.as_deref().unwrap_or_default())
        }
        PromptVersionType::Chat => parsed_chat_messages
            .iter()
            .flat_map(|m| template::extract_variables(&m.content))
            .collect(),
    };
    let (ok, _missing) = template::validate(&required, &vars);

    if !ok {
        let request = serde_json::json!({ "variables": vars });
        let metrics = Metrics {
            latency_ms: 0,
            tokens: Tokens {
                prompt: 0,
                completion: 0,
                total: 0,
            },
            cost_usd: None,
            retries: 0,
            error: Some("Missing variables".to_string()),
        };
        let grading = Grading {
            pass: false,
            score: 0.0,
            reason: "Missing variables".to_string(),
            assertions: Vec::new(),
        };
        return RecordedResult {
            dataset_item_id: item.id,
            model_id: model.id.clone(),
            model_config: model_config_json,
            request,
            output: None,
            grading_pass: grading.pass,
            grading_score: grading.score,
            grading: serde_json::to_value(&grading).unwrap_or(Value::Null),
            metrics: serde_json::to_value(&metrics).unwrap_or(Value::Null),
            latency_ms: 0,
            cost_usd: None,
        };
    }

    let messages = match version.kind {
        PromptVersionType::Text => {
            template::build_messages(version.kind, version.template_text.as_deref(), None, &vars)
        }
        PromptVersionType::Chat => {
            template::build_messages(version.kind, None, Some(parsed_chat_messages.as_slice()), &vars)
        }
    };

    let mut attempt = 0u32;
    let mut response = invoker.invoke(&messages, model, timeout).await;
    while response.error.is_some() && attempt < max_retries {
        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt + 1))).await;
        attempt += 1;
        response = invoker.invoke(&messages, model, timeout).await;
    }

    let expected_output = item.expected_output.as_ref();
    let grading = run_assertions(&response.output, expected_output, assertions);

    let request = serde_json::to_value(CompiledRequest {
        messages,
        variables: item.input.clone(),
    })
    .unwrap_or(Value::Null);

    let metrics = Metrics {
        latency_ms: response.latency_ms,
        tokens: response.tokens.clone(),
        cost_usd: response.cost_usd,
        retries: attempt as i32,
        error: response.error.clone(),
    };

    RecordedResult {
        dataset_item_id: item.id,
        model_id: model.id.clone(),
        model_config: model_config_json,
        request,
        output: Some(response.output.clone()),
        grading_pass: grading.pass,
        grading_score: grading.score,
        grading: serde_json::to_value(&grading).unwrap_or(Value::Null),
        metrics: serde_json::to_value(&metrics).unwrap_or(Value::Null),
        latency_ms: response.latency_ms,
        cost_usd: response.cost_usd,
    }
}

fn failed_outcome(item: &DatasetItem, model: &ModelConfig, reason: &str) -> RecordedResult {
    let metrics = Metrics {
        latency_ms: 0,
        tokens: Tokens {
            prompt: 0,
            completion: 0,
            total: 0,
        },
        cost_usd: None,
        retries: 0,
        error: Some(reason.to_string()),
    };
    let grading = Grading {
        pass: false,
        score: 0.0,
        reason: reason.to_string(),
        assertions: Vec::new(),
    };
    RecordedResult {
        dataset_item_id: item.id,
        model_id: model.id.clone(),
        model_config: serde_json::to_value(model).unwrap_or(Value::Null),
        request: Value::Null,
        output: None,
        grading_pass: grading.pass,
        grading_score: grading.score,
        grading: serde_json::to_value(&grading).unwrap_or(Value::Null),
        metrics: serde_json::to_value(&metrics).unwrap_or(Value::Null),
        latency_ms: 0,
        cost_usd: None,
    }
}

fn parse_template_messages(version: &PromptVersion) -> Vec<ChatMessage> {
    version
        .template_messages
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}
