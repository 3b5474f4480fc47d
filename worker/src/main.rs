use std::fmt::Display;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use prompt_eval_core::config::Settings;
use prompt_eval_core::db;
use worker::cli::WorkerArgs;
use worker::scheduler;

fn setup_logs() {
    let log_level = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "worker=debug,warn".into());

    tracing_subscriber::registry()
        .with(log_level)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    setup_logs();

    let args = WorkerArgs::parse();
    let settings = Settings::from_env();

    let pool = db::connect(&settings.database_url)
        .await
        .expect_pretty("Failed to connect to the database");

    db::run_migrations(&pool)
        .await
        .expect_pretty("Failed to run migrations");

    if args.early_exit_commands.run_migrations_only {
        tracing::info!("Migrations applied, exiting (--run-migrations-only)");
        return;
    }

    tracing::info!(
        concurrency_limit = settings.eval_concurrency_limit,
        poll_interval_seconds = settings.eval_poll_interval_seconds,
        "Starting evaluation worker"
    );

    let shutdown = CancellationToken::new();
    let shutdown_for_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_for_signal.cancel();
    });

    scheduler::run_loop(pool, settings, shutdown).await;
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect_pretty("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect_pretty("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}

/// Mirrors the gateway binary's own escape hatch: fatal startup errors log and exit
/// with status 1 rather than unwind, everywhere else errors propagate normally.
trait ExpectPretty<T> {
    fn expect_pretty(self, msg: &str) -> T;
}

impl<T, E: Display> ExpectPretty<T> for Result<T, E> {
    fn expect_pretty(self, msg: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::error!("{msg}: {err}");
                std::process::exit(1);
            }
        }
    }
}
