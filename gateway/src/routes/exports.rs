//! Rendered exports of a completed (or in-flight) run: a structured JSON dump and a
//! human-readable Markdown report. Shapes mirror the original export endpoints closely —
//! same sections, same truncation limits — since this is a reporting surface users screenshot
//! and share, not an API contract that benefits from redesign.

use axum::extract::Path;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use prompt_eval_core::entities::{Dataset, EvalResult, EvalRun, PromptVersion};
use prompt_eval_core::repo;

use crate::error::Error;
use crate::gateway_util::AppState;

const OUTPUT_TRUNCATE: usize = 500;
const FIELD_TRUNCATE: usize = 200;

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(max).collect();
        truncated.push_str("...");
        truncated
    }
}

async fn load_export_data(
    pool: &sqlx::PgPool,
    run_id: Uuid,
) -> Result<(EvalRun, PromptVersion, Dataset, Vec<EvalResult>), Error> {
    let run = repo::get_eval_run(pool, run_id).await?;
    let version = repo::get_prompt_version(pool, run.prompt_version_id).await?;
    let dataset = repo::get_dataset(pool, run.dataset_id).await?;
    let mut results = Vec::new();
    let mut page = 1;
    loop {
        let page_result = repo::list_eval_results(pool, run_id, page, 200, None, None).await?;
        let done = page_result.items.len() < 200 || results.len() as i64 + page_result.items.len() as i64 >= page_result.total;
        results.extend(page_result.items);
        if done {
            break;
        }
        page += 1;
    }
    Ok((run, version, dataset, results))
}

#[derive(Debug, Serialize)]
struct ExportResultRow {
    id: Uuid,
    model_id: String,
    input: Value,
    expected_output: Option<Value>,
    output: Option<String>,
    grading: Value,
    metrics: Value,
}

#[instrument(skip_all, fields(run_id = %id))]
pub async fn export_json(state: AppState, Path(id): Path<Uuid>) -> Result<Response, Error> {
    let (run, version, _dataset, results) = load_export_data(&state.pool, id).await?;

    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        let item = repo::get_dataset_item(&state.pool, result.dataset_item_id).await?;
        rows.push(ExportResultRow {
            id: result.id,
            model_id: result.model_id,
            input: item.input,
            expected_output: item.expected_output,
            output: result.output,
            grading: result.grading,
            metrics: result.metrics,
        });
    }

    let body = json!({
        "eval_run": {
            "id": run.id,
            "name": run.name,
            "status": run.status,
            "created_at": run.created_at,
            "completed_at": run.completed_at,
            "summary": run.summary,
        },
        "prompt": {
            "id": version.id,
            "version": version.version_number,
            "type": version.kind,
            "template_text": version.template_text,
            "template_messages": version.template_messages,
        },
        "models": run.models,
        "assertions": run.assertions,
        "results": rows,
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=eval-run-{}.json", run.id),
            ),
        ],
        serde_json::to_string_pretty(&body).map_err(|e| Error::Serialization { message: e.to_string() })?,
    )
        .into_response())
}

#[instrument(skip_all, fields(run_id = %id))]
pub async fn export_markdown(state: AppState, Path(id): Path<Uuid>) -> Result<Response, Error> {
    let (run, version, dataset, results) = load_export_data(&state.pool, id).await?;
    let items = repo::list_dataset_items(&state.pool, dataset.id).await?;
    let items_by_id: std::collections::HashMap<Uuid, &prompt_eval_core::entities::DatasetItem> =
        items.iter().map(|item| (item.id, item)).collect();

    let mut lines = Vec::new();
    lines.push(format!("# Evaluation Report: {}", run.name.as_deref().unwrap_or("Untitled")));
    lines.push(String::new());
    lines.push(format!("- **Run ID**: {}", run.id));
    lines.push(format!("- **Status**: {:?}", run.status));
    lines.push(format!("- **Created**: {}", run.created_at.to_rfc3339()));
    if let Some(completed) = run.completed_at {
        lines.push(format!("- **Completed**: {}", completed.to_rfc3339()));
    }
    lines.push(String::new());

    lines.push("## Prompt".to_string());
    lines.push(format!("- **Version**: {}", version.version_number));
    lines.push(format!("- **Type**: {:?}", version.kind));
    if let Some(template_text) = &version.template_text {
        lines.push(String::new());
        lines.push("```".to_string());
        lines.push(template_text.clone());
        lines.push("```".to_string());
    }
    lines.push(String::new());

    if let Some(summary) = &run.summary {
        lines.push("## Summary".to_string());
        lines.push("| Metric | Value |".to_string());
        lines.push("|---|---|".to_string());
        lines.push(format!("| Total | {} |", summary.get("total").cloned().unwrap_or(json!(0))));
        lines.push(format!("| Passed | {} |", summary.get("passed").cloned().unwrap_or(json!(0))));
        lines.push(format!("| Failed | {} |", summary.get("failed").cloned().unwrap_or(json!(0))));
        let pass_rate = summary.get("pass_rate").and_then(Value::as_f64).unwrap_or(0.0);
        lines.push(format!("| Pass Rate | {:.1}% |", pass_rate * 100.0));
        lines.push(format!(
            "| Avg Score | {:.2} |",
            summary.get("avg_score").and_then(Value::as_f64).unwrap_or(0.0)
        ));
        lines.push(format!(
            "| Avg Latency | {:.0}ms |",
            summary.get("avg_latency_ms").and_then(Value::as_f64).unwrap_or(0.0)
        ));
        lines.push(format!(
            "| Total Cost | ${:.4} |",
            summary.get("total_cost_usd").and_then(Value::as_f64).unwrap_or(0.0)
        ));
        lines.push(String::new());
    }

    lines.push("## Models".to_string());
    if let Some(models) = run.models.as_array() {
        for model in models {
            let id = model.get("id").and_then(Value::as_str).unwrap_or("?");
            let name = model.get("model").and_then(Value::as_str).unwrap_or("?");
            let temperature = model.get("temperature").and_then(Value::as_f64);
            match temperature {
                Some(t) => lines.push(format!("- **{id}**: {name} (temp={t})")),
                None => lines.push(format!("- **{id}**: {name}")),
            }
        }
    }
    lines.push(String::new());

    lines.push("## Results".to_string());
    let mut by_item: std::collections::BTreeMap<Uuid, Vec<&EvalResult>> = std::collections::BTreeMap::new();
    for result in &results {
        by_item.entry(result.dataset_item_id).or_default().push(result);
    }
    for (item_id, item_results) in &by_item {
        lines.push(format!("### Item: {}...", &item_id.to_string()[..8]));
        if let Some(item) = items_by_id.get(item_id) {
            lines.push(format!("- Input: {}", truncate(&item.input.to_string(), FIELD_TRUNCATE)));
            if let Some(expected) = &item.expected_output {
                lines.push(format!("- Expected: {}", truncate(&expected.to_string(), FIELD_TRUNCATE)));
            }
        }
        for result in item_results {
            let passed = result.grading.get("pass").and_then(Value::as_bool).unwrap_or(false);
            let icon = if passed { "\u{2705}" } else { "\u{274c}" };
            lines.push(format!("#### {icon} {}", result.model_id));
            let score = result.grading.get("score").and_then(Value::as_f64).unwrap_or(0.0);
            let latency = result.metrics.get("latency_ms").and_then(Value::as_i64).unwrap_or(0);
            lines.push(format!("- Score: {score:.2}"));
            lines.push(format!("- Latency: {latency}ms"));
            if let Some(output) = &result.output {
                lines.push("```".to_string());
                lines.push(truncate(output, OUTPUT_TRUNCATE));
                lines.push("```".to_string());
            }
        }
    }

    let markdown = lines.join("\n");

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=eval-run-{}.md", run.id),
            ),
        ],
        markdown,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_strings_untouched() {
        assert_eq!(truncate("short", 500), "short");
    }

    #[test]
    fn truncate_appends_ellipsis_past_the_limit() {
        let long = "a".repeat(510);
        let truncated = truncate(&long, OUTPUT_TRUNCATE);
        assert_eq!(truncated.chars().count(), OUTPUT_TRUNCATE + 3);
        assert!(truncated.ends_with("..."));
    }
}
