//! `mssql-exporter`: serves the metrics of a SQL Server instance to Prometheus.
//!
//! ```text
//! mssql-exporter --sqlserver db.local --sqlusername monitor --sqlpassword ...
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mssql_exporter::collector::SqlCollector;
use mssql_exporter::config::{Config, LogFormat};
use mssql_exporter::http::router;
use mssql_exporter::mssql::client::MssqlConnection;
use mssql_exporter::mssql::queries::default_table;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio::signal;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    debug!(?config, "configuration loaded");
    config.validate()?;

    info!(server = %config.server, port = config.port, "connecting to server");
    let connection = MssqlConnection::new(config.tds_config(), Handle::current())
        .with_connect_timeout(config.connect_timeout());
    let collector = SqlCollector::new(connection, default_table()?)
        .with_failure_policy(config.failure_policy);
    for descriptor in collector.describe() {
        debug!(
            metric = descriptor.name(),
            labels = ?descriptor.label_names(),
            "advertising metric"
        );
    }

    let mut registry = Registry::default();
    registry.register_collector(Box::new(collector));

    let app = router(Arc::new(registry));

    let listener = TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_address))?;
    info!(address = %config.listen_address, "serving metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("exporter stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mssql_exporter=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutting down");
}
