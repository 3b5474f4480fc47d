use std::fmt::Display;

use clap::Parser;
use mimalloc::MiMalloc;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use prompt_eval_core::config::Settings;
use prompt_eval_core::db;

use gateway::cli::GatewayArgs;
use gateway::gateway_util::AppStateData;
use gateway::observability::{setup_logs, setup_metrics};
use gateway::routes;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    setup_logs();

    let args = GatewayArgs::parse();
    let settings = Settings::from_env();

    let state = AppStateData::new(&settings.database_url)
        .await
        .expect_pretty("Failed to initialize application state");

    db::run_migrations(&state.pool)
        .await
        .expect_pretty("Failed to run migrations");

    if args.early_exit_commands.run_migrations_only {
        tracing::info!("Migrations applied, exiting (--run-migrations-only)");
        return;
    }

    setup_metrics(Some(settings.prometheus_bind_address)).expect_pretty("Failed to set up Prometheus exporter");

    let bind_address = args.bind_address.unwrap_or(settings.gateway_bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .expect_pretty("Failed to bind to socket address");

    tracing::info!(%bind_address, "Starting gateway");

    let app = routes::router().with_state(state).layer(
        TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect_pretty("Gateway server error");
}

async fn shutdown_signal() {
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

/// Fatal startup errors log and exit with status 1 rather than unwind; everywhere else
/// errors propagate normally through the `Error` response type.
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
