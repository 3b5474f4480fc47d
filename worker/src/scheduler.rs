//! The Run Scheduler: dequeue, process, sleep. The only coordination across worker
//! processes is the skip-locked dequeue in `prompt_eval_core::repo`; everything else here
//! is a single-process polling loop.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use prompt_eval_core::config::Settings;
use prompt_eval_core::model_invoker::ModelInvoker;
use prompt_eval_core::repo;

use crate::executor::process_run;

/// Runs until `shutdown` is triggered. Each iteration dequeues at most one run; an empty
/// queue sleeps for `settings.eval_poll_interval_seconds` before polling again.
#[instrument(skip_all, fields(poll_interval_seconds = settings.eval_poll_interval_seconds))]
pub async fn run_loop(pool: PgPool, settings: Settings, shutdown: CancellationToken) {
    let invoker = Arc::new(ModelInvoker::new());
    let stale_threshold = ChronoDuration::seconds(settings.stale_run_threshold_seconds);

    info!("worker polling loop started");
    loop {
        if shutdown.is_cancelled() {
            break;
        }

        match repo::dequeue_pending_run(&pool, stale_threshold).await {
            Ok(Some(run)) => {
                info!(run_id = %run.id, "dequeued run");
                process_run(&pool, &invoker, &settings, run).await;
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "dequeue failed");
            }
        }

        tokio::select! {
            () = tokio::time::sleep(settings.poll_interval()) => {}
            () = shutdown.cancelled() => break,
        }
    }
    info!("worker polling loop stopped");
}
