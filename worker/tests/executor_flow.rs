//! Exercises the fan-out executor against a real Postgres database: dequeue, run, and
//! persist. No network access is available in this environment, so the model call itself
//! fails — the point here is that the executor still reaches a terminal status and records
//! the failure per dataset item/model pair rather than losing the run.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use prompt_eval_core::config::Settings;
use prompt_eval_core::db;
use prompt_eval_core::entities::{ModelConfig, PromptVersionType};
use prompt_eval_core::model_invoker::ModelInvoker;
use prompt_eval_core::repo;

use worker::executor::process_run;

async fn connect(pool_opts: PgPoolOptions, conn_opts: PgConnectOptions) -> PgPool {
    let pool = pool_opts.connect_with(conn_opts).await.expect("connect to test database");
    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

fn test_settings() -> Settings {
    Settings {
        database_url: String::new(),
        default_model: "gpt-4o-mini".to_string(),
        eval_concurrency_limit: 4,
        eval_max_retries: 0,
        eval_timeout_seconds: 5,
        eval_poll_interval_seconds: 1,
        stale_run_threshold_seconds: 3600,
        gateway_bind_address: "127.0.0.1:0".parse().unwrap(),
        prometheus_bind_address: "127.0.0.1:0".parse().unwrap(),
    }
}

#[sqlx::test(migrations = false)]
async fn dequeued_run_reaches_terminal_status(pool_opts: PgPoolOptions, conn_opts: PgConnectOptions) {
    let pool = connect(pool_opts, conn_opts).await;

    let project = repo::create_project(&pool, "executor-flow-project").await.unwrap();
    let use_case = repo::create_use_case(&pool, project.id, "executor-flow-use-case").await.unwrap();
    let prompt = repo::create_prompt(&pool, use_case.id, "executor-flow-prompt").await.unwrap();
    let version = repo::create_prompt_version(
        &pool,
        prompt.id,
        PromptVersionType::Text,
        Some("Say hi to {{name}}.".to_string()),
        None,
        None,
    )
    .await
    .unwrap();

    let dataset = repo::create_dataset(&pool, use_case.id, "executor-flow-dataset").await.unwrap();
    repo::create_dataset_item(&pool, dataset.id, json!({"name": "Ada"}), Some(json!("Hi Ada.")), None)
        .await
        .unwrap();
    repo::create_dataset_item(&pool, dataset.id, json!({"name": "Grace"}), Some(json!("Hi Grace.")), None)
        .await
        .unwrap();

    let model = ModelConfig {
        id: String::new(),
        provider: Some("openai".to_string()),
        model: "gpt-4o-mini".to_string(),
        temperature: None,
        max_tokens: None,
        top_p: None,
        reasoning_effort: None,
    };
    let created = repo::create_eval_run(
        &pool,
        None,
        version.id,
        dataset.id,
        vec![model],
        json!([{"type": "exact_match", "config": {}}]),
    )
    .await
    .unwrap();

    let dequeued = repo::dequeue_pending_run(&pool, ChronoDuration::seconds(3600))
        .await
        .unwrap()
        .expect("run should be dequeueable immediately after creation");
    assert_eq!(dequeued.id, created.id);
    assert_eq!(dequeued.status, prompt_eval_core::entities::EvalRunStatus::Running);

    let invoker = Arc::new(ModelInvoker::new());
    let settings = test_settings();
    process_run(&pool, &invoker, &settings, dequeued).await;

    let finished = repo::get_eval_run(&pool, created.id).await.unwrap();
    assert_eq!(finished.status, prompt_eval_core::entities::EvalRunStatus::Completed);
    assert!(finished.completed_at.is_some());

    let results = repo::list_eval_results(&pool, created.id, 1, 50, None, None).await.unwrap();
    assert_eq!(results.total, 2, "one result per dataset item for the single model");
    for result in &results.items {
        let grading = &result.grading;
        assert_eq!(grading["pass"], false, "model call is expected to fail without network access");
    }
}

#[sqlx::test(migrations = false)]
async fn dequeue_skips_locked_rows(pool_opts: PgPoolOptions, conn_opts: PgConnectOptions) {
    let pool = connect(pool_opts, conn_opts).await;

    let project = repo::create_project(&pool, "executor-flow-lock-project").await.unwrap();
    let use_case = repo::create_use_case(&pool, project.id, "executor-flow-lock-use-case").await.unwrap();
    let prompt = repo::create_prompt(&pool, use_case.id, "executor-flow-lock-prompt").await.unwrap();
    let version = repo::create_prompt_version(
        &pool,
        prompt.id,
        PromptVersionType::Text,
        Some("{{x}}".to_string()),
        None,
        None,
    )
    .await
    .unwrap();
    let dataset = repo::create_dataset(&pool, use_case.id, "executor-flow-lock-dataset").await.unwrap();
    repo::create_dataset_item(&pool, dataset.id, json!({"x": "1"}), None, None).await.unwrap();

    let model = ModelConfig {
        id: String::new(),
        provider: Some("openai".to_string()),
        model: "gpt-4o-mini".to_string(),
        temperature: None,
        max_tokens: None,
        top_p: None,
        reasoning_effort: None,
    };
    repo::create_eval_run(
        &pool,
        None,
        version.id,
        dataset.id,
        vec![model],
        serde_json::Value::Array(Vec::new()),
    )
    .await
    .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let locked: Option<(uuid::Uuid,)> = sqlx::query_as(
        "SELECT id FROM eval_runs WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1 FOR UPDATE SKIP LOCKED",
    )
    .fetch_optional(&mut *tx)
    .await
    .unwrap();
    assert!(locked.is_some());

    let dequeued_while_locked = repo::dequeue_pending_run(&pool, ChronoDuration::seconds(3600)).await.unwrap();
    assert!(dequeued_while_locked.is_none(), "a row locked by another transaction must not be dequeued");

    tx.rollback().await.unwrap();
}
