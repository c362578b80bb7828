//! Collectors module
//!
//! Prometheus collectors owned by the controller. Every collector comes in
//! two flavours behind one trait: a real one backed by a metric vector and a
//! no-op one used when metrics are disabled, so callers never branch on the
//! enabled flag.

mod process;

pub use process::{
    process_collector, NullWorkerProcessGauge, ProcessCollector, WorkerProcessGauge,
    INITIAL_CONFIG_VERSION, WORKER_PROCESSES_METRIC,
};

/// Namespace prefixed to every metric exported by the controller
pub const METRICS_NAMESPACE: &str = "nginx_ingress";
