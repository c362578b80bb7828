//! NGINX Worker Metrics
//!
//! Standalone host for the worker process collector.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    ┌──────────┐
//! │    procfs    │───▶│   Reporter   │───▶│  Collector   │───▶│ /metrics │
//! │   (source)   │    │    (loop)    │    │   (gauge)    │    │ (server) │
//! └──────────────┘    └──────────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! SIGHUP marks a new configuration generation.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use prometheus::Registry;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nginx_worker_metrics::config::{parse_const_labels, MetricsConfig};
use nginx_worker_metrics::reporter::{
    ConfigVersion, ProcessReporter, ProcfsWorkerSource, ReporterConfig, DEFAULT_PROC_ROOT,
    DEFAULT_WORKER_CMDLINE_PREFIX,
};
use nginx_worker_metrics::server::{run_metrics_server, ServerConfig};
use nginx_worker_metrics::{process_collector, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NGINX worker process metrics collector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable metrics collection
    #[arg(long, env = "ENABLE_METRICS")]
    enable_metrics: bool,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:10254")]
    metrics_addr: String,

    /// Constant label as key=value; repeat the flag for more labels.
    /// The environment variable carries a single label.
    #[arg(long = "const-label", env = "CONST_LABEL")]
    const_labels: Vec<String>,

    /// Root of the proc filesystem
    #[arg(long, env = "PROC_ROOT", default_value = DEFAULT_PROC_ROOT)]
    proc_root: String,

    /// Command line prefix identifying worker processes
    #[arg(long, env = "WORKER_CMDLINE_PREFIX", default_value = DEFAULT_WORKER_CMDLINE_PREFIX)]
    worker_cmdline_prefix: String,

    /// Report interval in seconds
    #[arg(
        long,
        env = "REPORT_INTERVAL_SECONDS",
        default_value = "15",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    report_interval_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let metrics_config = MetricsConfig {
        enabled: args.enable_metrics,
        const_labels: parse_const_labels(&args.const_labels)?,
    };

    info!("Starting NGINX worker metrics");
    info!("  Metrics enabled: {}", metrics_config.enabled);
    info!("  Constant labels: {:?}", metrics_config.const_labels);
    info!("  Proc root: {}", args.proc_root);

    let registry = Registry::new();
    let collector = process_collector(metrics_config.enabled, metrics_config.const_labels)?;
    collector.register(&registry).map_err(|e| {
        error!("Failed to register process collector: {}", e);
        e
    })?;

    // The configuration running at startup is the first generation
    let version = ConfigVersion::new();
    info!("Initial configuration generation {}", version.bump());

    let reporter = ProcessReporter::new(
        ReporterConfig::new(Duration::from_secs(args.report_interval_seconds))?,
        collector,
        Box::new(ProcfsWorkerSource::new(
            &args.proc_root,
            args.worker_cmdline_prefix.as_str(),
        )),
        version.clone(),
    )?;

    if metrics_config.enabled {
        let server_config = ServerConfig {
            metrics_addr: args.metrics_addr.clone(),
        };
        let server_registry = registry.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(&server_config, server_registry).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    #[cfg(unix)]
    spawn_reload_listener(version)?;

    let reporter_handle = tokio::spawn(Arc::clone(&reporter).run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    reporter.shutdown();

    if let Err(e) = reporter_handle.await {
        error!("Process reporter task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Bump the configuration version on every SIGHUP
#[cfg(unix)]
fn spawn_reload_listener(version: ConfigVersion) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            let current = version.bump();
            info!("Configuration reloaded, generation {}", current);
        }
    });
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    if let Ok(directive) = "hyper=warn".parse() {
        filter = filter.add_directive(directive);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_report_interval_rejected() {
        let result = Args::try_parse_from(["nginx-worker-metrics", "--report-interval-seconds", "0"]);
        assert!(result.is_err());

        let args =
            Args::try_parse_from(["nginx-worker-metrics", "--report-interval-seconds", "1"]).unwrap();
        assert_eq!(args.report_interval_seconds, 1);
    }

    #[test]
    fn test_const_label_value_keeps_commas() {
        let args = Args::try_parse_from([
            "nginx-worker-metrics",
            "--const-label",
            "selector=a,b",
            "--const-label",
            "class=nginx",
        ])
        .unwrap();

        let labels = parse_const_labels(&args.const_labels).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["selector"], "a,b");
        assert_eq!(labels["class"], "nginx");
    }
}
