//! Process bootstrap: tracing and metrics wiring for embedders.

use std::str::FromStr;

/// Install the global tracing subscriber, filtered by `KONDUCT_LOG`
/// (defaults to `info`).
pub fn init_tracing() {
    let env = std::env::var("KONDUCT_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Install a Prometheus exporter when `KONDUCT_METRICS_ADDR` names a
/// listen address; silently a no-op otherwise.
pub fn init_metrics() {
    if let Ok(addr) = std::env::var("KONDUCT_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KONDUCT_METRICS_ADDR; expected host:port");
        }
    }
}
