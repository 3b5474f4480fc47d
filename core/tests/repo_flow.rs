//! Integration tests for invariants that only show up against a real Postgres instance:
//! label exclusivity and the stale-run reclaim in the dequeue query.

use chrono::Duration as ChronoDuration;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use prompt_eval_core::db;
use prompt_eval_core::entities::{EvalRunStatus, PromptVersionType};
use prompt_eval_core::repo;

async fn connect(pool_opts: PgPoolOptions, conn_opts: PgConnectOptions) -> PgPool {
    let pool = pool_opts.connect_with(conn_opts).await.expect("connect to test database");
    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

#[sqlx::test(migrations = false)]
async fn promoting_a_label_revokes_it_from_the_previous_holder(
    pool_opts: PgPoolOptions,
    conn_opts: PgConnectOptions,
) {
    let pool = connect(pool_opts, conn_opts).await;

    let project = repo::create_project(&pool, "label-project").await.unwrap();
    let use_case = repo::create_use_case(&pool, project.id, "label-use-case").await.unwrap();
    let prompt = repo::create_prompt(&pool, use_case.id, "label-prompt").await.unwrap();

    let v1 = repo::create_prompt_version(
        &pool,
        prompt.id,
        PromptVersionType::Text,
        Some("v1 {{x}}".to_string()),
        None,
        None,
    )
    .await
    .unwrap();
    let v2 = repo::create_prompt_version(
        &pool,
        prompt.id,
        PromptVersionType::Text,
        Some("v2 {{x}}".to_string()),
        None,
        None,
    )
    .await
    .unwrap();

    let v1 = repo::promote_label(&pool, v1.id, "production").await.unwrap();
    assert!(v1.labels.contains(&"production".to_string()));

    let v2 = repo::promote_label(&pool, v2.id, "production").await.unwrap();
    assert!(v2.labels.contains(&"production".to_string()));

    let v1_after = repo::get_prompt_version(&pool, v1.id).await.unwrap();
    assert!(
        !v1_after.labels.contains(&"production".to_string()),
        "promoting v2 to production must revoke it from v1"
    );
}

#[sqlx::test(migrations = false)]
async fn dequeue_reclaims_a_run_stuck_past_the_stale_threshold(
    pool_opts: PgPoolOptions,
    conn_opts: PgConnectOptions,
) {
    let pool = connect(pool_opts, conn_opts).await;

    let project = repo::create_project(&pool, "stale-project").await.unwrap();
    let use_case = repo::create_use_case(&pool, project.id, "stale-use-case").await.unwrap();
    let prompt = repo::create_prompt(&pool, use_case.id, "stale-prompt").await.unwrap();
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
    let dataset = repo::create_dataset(&pool, use_case.id, "stale-dataset").await.unwrap();
    repo::create_dataset_item(&pool, dataset.id, serde_json::json!({"x": "1"}), None, None)
        .await
        .unwrap();

    let model = prompt_eval_core::entities::ModelConfig {
        id: String::new(),
        provider: Some("openai".to_string()),
        model: "gpt-4o-mini".to_string(),
        temperature: None,
        max_tokens: None,
        top_p: None,
        reasoning_effort: None,
    };
    let run = repo::create_eval_run(
        &pool,
        None,
        version.id,
        dataset.id,
        vec![model],
        serde_json::Value::Array(Vec::new()),
    )
    .await
    .unwrap();

    // Simulate a worker that claimed the run and then vanished: mark it running with a
    // started_at far enough in the past to clear the stale threshold.
    sqlx::query("UPDATE eval_runs SET status = 'running', started_at = now() - interval '1 hour' WHERE id = $1")
        .bind(run.id)
        .execute(&pool)
        .await
        .unwrap();

    let reclaimed = repo::dequeue_pending_run(&pool, ChronoDuration::seconds(60))
        .await
        .unwrap()
        .expect("stale running run should be reclaimed as pending and redequeued");
    assert_eq!(reclaimed.id, run.id);
    assert_eq!(reclaimed.status, EvalRunStatus::Running);
}
