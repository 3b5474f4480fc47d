use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Error;

/// Set up logs.
pub fn setup_logs() {
    let log_level = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gateway=debug,warn".into());

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

/// Set up the Prometheus metrics exporter, defaulting to `0.0.0.0:9090`.
pub fn setup_metrics(bind_address: Option<SocketAddr>) -> Result<(), Error> {
    let prometheus_listener_addr =
        bind_address.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 9090)));

    PrometheusBuilder::new()
        .with_http_listener(prometheus_listener_addr)
        .install()
        .map_err(|e| Error::Observability {
            message: format!("Failed to install Prometheus exporter: {e}"),
        })?;

    Ok(())
}
