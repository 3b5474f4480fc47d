//! Query layer shared by the gateway (reads, CRUD) and worker (dequeue, result writes).

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::entities::{
    Dataset, DatasetItem, EvalResult, EvalRun, EvalRunStatus, ModelConfig, PlaygroundRun, Progress,
    Project, Prompt, PromptVersion, PromptVersionType, UseCase,
};
use crate::error::Error;

pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn pages(&self) -> i64 {
        if self.limit <= 0 {
            0
        } else {
            (self.total + self.limit - 1) / self.limit
        }
    }
}

fn offset(page: i64, limit: i64) -> i64 {
    (page.max(1) - 1) * limit
}

// ---------------------------------------------------------------------------
// Minimal CRUD surface (§10.1) — exists only so the core has real rows to act on.
// ---------------------------------------------------------------------------

pub async fn create_project(pool: &PgPool, name: &str) -> Result<Project, Error> {
    sqlx::query_as::<_, Project>(
        "INSERT INTO projects (id, name, created_at) VALUES ($1, $2, now()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn create_use_case(pool: &PgPool, project_id: Uuid, name: &str) -> Result<UseCase, Error> {
    sqlx::query_as::<_, UseCase>(
        "INSERT INTO use_cases (id, project_id, name, created_at) VALUES ($1, $2, $3, now()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(project_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn create_prompt(pool: &PgPool, use_case_id: Uuid, name: &str) -> Result<Prompt, Error> {
    sqlx::query_as::<_, Prompt>(
        "INSERT INTO prompts (id, use_case_id, name, created_at) VALUES ($1, $2, $3, now()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(use_case_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn create_dataset(pool: &PgPool, use_case_id: Uuid, name: &str) -> Result<Dataset, Error> {
    sqlx::query_as::<_, Dataset>(
        "INSERT INTO datasets (id, use_case_id, name, created_at) VALUES ($1, $2, $3, now()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(use_case_id)
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn create_dataset_item(
    pool: &PgPool,
    dataset_id: Uuid,
    input: Value,
    expected_output: Option<Value>,
    metadata: Option<Value>,
) -> Result<DatasetItem, Error> {
    sqlx::query_as::<_, DatasetItem>(
        "INSERT INTO dataset_items (id, dataset_id, input, expected_output, metadata, created_at)
         VALUES ($1, $2, $3, $4, $5, now()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(dataset_id)
    .bind(input)
    .bind(expected_output)
    .bind(metadata)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn list_dataset_items(pool: &PgPool, dataset_id: Uuid) -> Result<Vec<DatasetItem>, Error> {
    sqlx::query_as::<_, DatasetItem>(
        "SELECT * FROM dataset_items WHERE dataset_id = $1 ORDER BY created_at ASC",
    )
    .bind(dataset_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn get_dataset_item(pool: &PgPool, id: Uuid) -> Result<DatasetItem, Error> {
    sqlx::query_as::<_, DatasetItem>("SELECT * FROM dataset_items WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "dataset item",
            id: id.to_string(),
        })
}

pub async fn get_project(pool: &PgPool, id: Uuid) -> Result<Project, Error> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "project",
            id: id.to_string(),
        })
}

pub async fn list_projects(pool: &PgPool) -> Result<Vec<Project>, Error> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .map_err(Into::into)
}

pub async fn get_use_case(pool: &PgPool, id: Uuid) -> Result<UseCase, Error> {
    sqlx::query_as::<_, UseCase>("SELECT * FROM use_cases WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "use case",
            id: id.to_string(),
        })
}

pub async fn list_use_cases(pool: &PgPool, project_id: Uuid) -> Result<Vec<UseCase>, Error> {
    sqlx::query_as::<_, UseCase>(
        "SELECT * FROM use_cases WHERE project_id = $1 ORDER BY created_at ASC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn get_prompt(pool: &PgPool, id: Uuid) -> Result<Prompt, Error> {
    sqlx::query_as::<_, Prompt>("SELECT * FROM prompts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "prompt",
            id: id.to_string(),
        })
}

pub async fn list_prompts(pool: &PgPool, use_case_id: Uuid) -> Result<Vec<Prompt>, Error> {
    sqlx::query_as::<_, Prompt>(
        "SELECT * FROM prompts WHERE use_case_id = $1 ORDER BY created_at ASC",
    )
    .bind(use_case_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn list_prompt_versions(pool: &PgPool, prompt_id: Uuid) -> Result<Vec<PromptVersion>, Error> {
    sqlx::query_as::<_, PromptVersion>(
        "SELECT * FROM prompt_versions WHERE prompt_id = $1 ORDER BY version_number ASC",
    )
    .bind(prompt_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

pub async fn list_datasets(pool: &PgPool, use_case_id: Uuid) -> Result<Vec<Dataset>, Error> {
    sqlx::query_as::<_, Dataset>(
        "SELECT * FROM datasets WHERE use_case_id = $1 ORDER BY created_at ASC",
    )
    .bind(use_case_id)
    .fetch_all(pool)
    .await
    .map_err(Into::into)
}

// ---------------------------------------------------------------------------
// Prompt versions: monotonic version numbers, at-most-one-per-label uniqueness.
// ---------------------------------------------------------------------------

pub async fn create_prompt_version(
    pool: &PgPool,
    prompt_id: Uuid,
    kind: PromptVersionType,
    template_text: Option<String>,
    template_messages: Option<Value>,
    model_defaults: Option<Value>,
) -> Result<PromptVersion, Error> {
    // Serialize concurrent creators on a prompt with an advisory-free row lock: select
    // the current max under `FOR UPDATE` inside the same transaction as the insert.
    let mut tx = pool.begin().await?;
    let next_version: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version_number), 0) + 1 FROM prompt_versions WHERE prompt_id = $1 FOR UPDATE",
    )
    .bind(prompt_id)
    .fetch_one(&mut *tx)
    .await?;

    let version = sqlx::query_as::<_, PromptVersion>(
        "INSERT INTO prompt_versions
            (id, prompt_id, version_number, type, template_text, template_messages, model_defaults, labels, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, '{}', now())
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(prompt_id)
    .bind(next_version)
    .bind(kind)
    .bind(template_text)
    .bind(template_messages)
    .bind(model_defaults)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(version)
}

/// Promotes `version_id` to `label`, atomically revoking the label from whichever other
/// version of the same prompt currently holds it. Enforces label exclusivity.
pub async fn promote_label(pool: &PgPool, version_id: Uuid, label: &str) -> Result<PromptVersion, Error> {
    let mut tx = pool.begin().await?;

    let prompt_id: Uuid = sqlx::query_scalar(
        "SELECT prompt_id FROM prompt_versions WHERE id = $1 FOR UPDATE",
    )
    .bind(version_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| Error::NotFound {
        resource: "prompt version",
        id: version_id.to_string(),
    })?;

    sqlx::query(
        "UPDATE prompt_versions SET labels = array_remove(labels, $1)
         WHERE prompt_id = $2 AND $1 = ANY(labels)",
    )
    .bind(label)
    .bind(prompt_id)
    .execute(&mut *tx)
    .await?;

    let version = sqlx::query_as::<_, PromptVersion>(
        "UPDATE prompt_versions SET labels = array_append(labels, $1)
         WHERE id = $2 RETURNING *",
    )
    .bind(label)
    .bind(version_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(version)
}

pub async fn get_prompt_version(pool: &PgPool, id: Uuid) -> Result<PromptVersion, Error> {
    sqlx::query_as::<_, PromptVersion>("SELECT * FROM prompt_versions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "prompt version",
            id: id.to_string(),
        })
}

pub async fn get_version_by_label(
    pool: &PgPool,
    prompt_id: Uuid,
    label: &str,
) -> Result<PromptVersion, Error> {
    sqlx::query_as::<_, PromptVersion>(
        "SELECT * FROM prompt_versions WHERE prompt_id = $1 AND $2 = ANY(labels)",
    )
    .bind(prompt_id)
    .bind(label)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound {
        resource: "prompt version with label",
        id: format!("{prompt_id}/{label}"),
    })
}

// ---------------------------------------------------------------------------
// Eval runs
// ---------------------------------------------------------------------------

/// Assigns `model_{index}` to any model config whose caller-supplied `id` is empty.
pub fn assign_model_ids(mut models: Vec<ModelConfig>) -> Vec<ModelConfig> {
    for (index, model) in models.iter_mut().enumerate() {
        if model.id.trim().is_empty() {
            model.id = format!("model_{index}");
        }
    }
    models
}

pub async fn create_eval_run(
    pool: &PgPool,
    name: Option<String>,
    prompt_version_id: Uuid,
    dataset_id: Uuid,
    models: Vec<ModelConfig>,
    assertions: Value,
) -> Result<EvalRun, Error> {
    let models = assign_model_ids(models);
    let models_json = serde_json::to_value(models).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })?;
    let progress = serde_json::to_value(Progress::default()).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })?;

    sqlx::query_as::<_, EvalRun>(
        "INSERT INTO eval_runs
            (id, name, prompt_version_id, dataset_id, models, assertions, status, progress, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, now())
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .bind(prompt_version_id)
    .bind(dataset_id)
    .bind(models_json)
    .bind(assertions)
    .bind(progress)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn get_eval_run(pool: &PgPool, id: Uuid) -> Result<EvalRun, Error> {
    sqlx::query_as::<_, EvalRun>("SELECT * FROM eval_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "eval run",
            id: id.to_string(),
        })
}

pub async fn list_eval_runs(pool: &PgPool, page: i64, limit: i64) -> Result<Page<EvalRun>, Error> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM eval_runs")
        .fetch_one(pool)
        .await?;
    let items = sqlx::query_as::<_, EvalRun>(
        "SELECT * FROM eval_runs ORDER BY created_at DESC OFFSET $1 LIMIT $2",
    )
    .bind(offset(page, limit))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

/// Allowed only from `pending|running`; a terminal run returns a Conflict error.
pub async fn cancel_eval_run(pool: &PgPool, id: Uuid) -> Result<EvalRun, Error> {
    let run = get_eval_run(pool, id).await?;
    if run.status.is_terminal() {
        return Err(Error::Conflict {
            message: format!("Cannot cancel a run in terminal state {:?}", run.status),
        });
    }
    sqlx::query_as::<_, EvalRun>(
        "UPDATE eval_runs SET status = 'canceled', completed_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

/// The skip-locked dequeue: the only coordination primitive across worker processes.
/// Also reclaims `running` rows whose `started_at` is older than `stale_threshold` —
/// additive crash recovery, not a substitute for the happy-path dequeue.
pub async fn dequeue_pending_run(
    pool: &PgPool,
    stale_threshold: ChronoDuration,
) -> Result<Option<EvalRun>, Error> {
    let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

    let stale_cutoff: DateTime<Utc> = Utc::now() - stale_threshold;
    sqlx::query(
        "UPDATE eval_runs SET status = 'pending', started_at = NULL
         WHERE status = 'running' AND started_at < $1",
    )
    .bind(stale_cutoff)
    .execute(&mut *tx)
    .await?;

    let run = sqlx::query_as::<_, EvalRun>(
        "SELECT * FROM eval_runs WHERE status = 'pending'
         ORDER BY created_at ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let Some(run) = run else {
        tx.commit().await?;
        return Ok(None);
    };

    let promoted = sqlx::query_as::<_, EvalRun>(
        "UPDATE eval_runs SET status = 'running', started_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(run.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(promoted))
}

pub async fn update_run_progress(pool: &PgPool, id: Uuid, progress: &Progress) -> Result<(), Error> {
    let progress_json = serde_json::to_value(progress).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })?;
    sqlx::query("UPDATE eval_runs SET progress = $1 WHERE id = $2 AND status != 'canceled'")
        .bind(progress_json)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Never overwrites a terminal `canceled` with `completed` (terminal monotonicity).
pub async fn finish_run_completed(pool: &PgPool, id: Uuid, summary: &Value) -> Result<(), Error> {
    sqlx::query(
        "UPDATE eval_runs SET status = 'completed', summary = $1, completed_at = now()
         WHERE id = $2 AND status != 'canceled'",
    )
    .bind(summary)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn finish_run_failed(pool: &PgPool, id: Uuid, error_message: &str) -> Result<(), Error> {
    sqlx::query(
        "UPDATE eval_runs SET status = 'failed', error_message = $1, completed_at = now()
         WHERE id = $2 AND status != 'canceled'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Eval results
// ---------------------------------------------------------------------------

pub async fn insert_eval_result(
    pool: &PgPool,
    eval_run_id: Uuid,
    dataset_item_id: Uuid,
    model_id: &str,
    model_config: &Value,
    request: &Value,
    output: Option<&str>,
    grading: &Value,
    metrics: &Value,
) -> Result<EvalResult, Error> {
    sqlx::query_as::<_, EvalResult>(
        "INSERT INTO eval_results
            (id, eval_run_id, dataset_item_id, model_id, model_config, request, output, grading, metrics, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
         ON CONFLICT (eval_run_id, dataset_item_id, model_id) DO NOTHING
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(eval_run_id)
    .bind(dataset_item_id)
    .bind(model_id)
    .bind(model_config)
    .bind(request)
    .bind(output)
    .bind(grading)
    .bind(metrics)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

pub async fn list_eval_results(
    pool: &PgPool,
    eval_run_id: Uuid,
    page: i64,
    limit: i64,
    model_id: Option<&str>,
    passed: Option<bool>,
) -> Result<Page<EvalResult>, Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM eval_results
         WHERE eval_run_id = $1
           AND ($2::text IS NULL OR model_id = $2)
           AND ($3::bool IS NULL OR (grading->>'pass')::bool = $3)",
    )
    .bind(eval_run_id)
    .bind(model_id)
    .bind(passed)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, EvalResult>(
        "SELECT * FROM eval_results
         WHERE eval_run_id = $1
           AND ($2::text IS NULL OR model_id = $2)
           AND ($3::bool IS NULL OR (grading->>'pass')::bool = $3)
         ORDER BY created_at ASC OFFSET $4 LIMIT $5",
    )
    .bind(eval_run_id)
    .bind(model_id)
    .bind(passed)
    .bind(offset(page, limit))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(Page {
        items,
        total,
        page,
        limit,
    })
}

pub async fn get_dataset(pool: &PgPool, id: Uuid) -> Result<Dataset, Error> {
    sqlx::query_as::<_, Dataset>("SELECT * FROM datasets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "dataset",
            id: id.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Share tokens
// ---------------------------------------------------------------------------

pub async fn issue_share(pool: &PgPool, run_id: Uuid, expires_in_days: i64) -> Result<EvalRun, Error> {
    let token = nanoid::nanoid!(22);
    let expires_at = Utc::now() + ChronoDuration::days(expires_in_days);
    sqlx::query_as::<_, EvalRun>(
        "UPDATE eval_runs SET share_token = $1, share_expires_at = $2 WHERE id = $3 RETURNING *",
    )
    .bind(token)
    .bind(expires_at)
    .bind(run_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::NotFound {
        resource: "eval run",
        id: run_id.to_string(),
    })
}

pub async fn revoke_share(pool: &PgPool, run_id: Uuid) -> Result<(), Error> {
    sqlx::query("UPDATE eval_runs SET share_token = NULL, share_expires_at = NULL WHERE id = $1")
        .bind(run_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_run_by_token(pool: &PgPool, token: &str) -> Result<EvalRun, Error> {
    let run = sqlx::query_as::<_, EvalRun>("SELECT * FROM eval_runs WHERE share_token = $1")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "report",
            id: token.to_string(),
        })?;

    if let Some(expires_at) = run.share_expires_at {
        if Utc::now() > expires_at {
            return Err(Error::Gone {
                message: "Share link has expired".to_string(),
            });
        }
    }
    Ok(run)
}

// ---------------------------------------------------------------------------
// Playground run history (§4.6) — fire-and-forget persistence.
// ---------------------------------------------------------------------------

pub async fn insert_playground_run(
    pool: &PgPool,
    prompt_id: Uuid,
    version_id: Option<Uuid>,
    config: &Value,
    results: &Value,
) -> Result<PlaygroundRun, Error> {
    sqlx::query_as::<_, PlaygroundRun>(
        "INSERT INTO playground_runs (id, prompt_id, version_id, config, results, created_at)
         VALUES ($1, $2, $3, $4, $5, now()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(prompt_id)
    .bind(version_id)
    .bind(config)
    .bind(results)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}
