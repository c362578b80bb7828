//! NGINX Process Collector
//!
//! Reports the number of NGINX worker processes as a gauge labelled with the
//! configuration generation transition that produced it.
//!
//! # Labels
//!
//! ```text
//! nginx_ingress_controller_nginx_worker_processes_total{oldGeneration="4",currentGeneration="5"} 8
//! ```
//!
//! Each update writes to the `(previous, current)` pair and then remembers
//! `current` as the previous generation for the next update. Pairs from older
//! generations stay in the vector; nothing here removes them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts, Registry};
use tracing::{debug, info};

use super::METRICS_NAMESPACE;
use crate::error::{Error, Result};

/// Metric name, without the namespace prefix
pub const WORKER_PROCESSES_METRIC: &str = "controller_nginx_worker_processes_total";

/// Generation reported as `oldGeneration` before the first update
pub const INITIAL_CONFIG_VERSION: &str = "0";

const WORKER_PROCESSES_HELP: &str = "Number of NGINX worker processes";
const LABEL_NAMES: [&str; 2] = ["oldGeneration", "currentGeneration"];

// =============================================================================
// Collector Trait
// =============================================================================

/// Metrics of the NGINX processes
pub trait ProcessCollector: Send + Sync {
    /// Record the worker process count for the transition from the previously
    /// seen configuration version to `current_config_version`.
    fn set_worker_process_count(&self, current_config_version: &str, worker_processes: i64);

    /// Register the collector with `registry`.
    fn register(&self, registry: &Registry) -> Result<()>;
}

/// Build the collector matching the metrics flag.
pub fn process_collector(
    enabled: bool,
    const_labels: HashMap<String, String>,
) -> Result<Arc<dyn ProcessCollector>> {
    if enabled {
        Ok(Arc::new(WorkerProcessGauge::new(const_labels)?))
    } else {
        debug!("Metrics disabled, using no-op process collector");
        Ok(Arc::new(NullWorkerProcessGauge::new()))
    }
}

// =============================================================================
// Worker Process Gauge
// =============================================================================

/// Gauge vector of NGINX worker processes keyed by generation transition.
///
/// Clones share the same gauge vector and previous-version state, which is
/// what lets a clone be handed to the registry while the original keeps
/// reporting.
#[derive(Clone)]
pub struct WorkerProcessGauge {
    previous_config_version: Arc<Mutex<String>>,
    process_total: GaugeVec,
}

impl WorkerProcessGauge {
    /// Create a new gauge with the given constant labels.
    pub fn new(const_labels: HashMap<String, String>) -> Result<Self> {
        let opts = Opts::new(WORKER_PROCESSES_METRIC, WORKER_PROCESSES_HELP)
            .namespace(METRICS_NAMESPACE)
            .const_labels(const_labels);

        let process_total = GaugeVec::new(opts, &LABEL_NAMES).map_err(Error::Metrics)?;

        Ok(Self {
            previous_config_version: Arc::new(Mutex::new(INITIAL_CONFIG_VERSION.to_string())),
            process_total,
        })
    }

    /// Configuration version used as `oldGeneration` on the next update
    pub fn previous_config_version(&self) -> String {
        self.previous_config_version.lock().clone()
    }
}

impl ProcessCollector for WorkerProcessGauge {
    fn set_worker_process_count(&self, current_config_version: &str, worker_processes: i64) {
        let mut previous = self.previous_config_version.lock();

        self.process_total
            .with_label_values(&[previous.as_str(), current_config_version])
            .set(worker_processes as f64);

        debug!(
            old_generation = %previous,
            current_generation = current_config_version,
            worker_processes,
            "Updated NGINX worker process count"
        );

        *previous = current_config_version.to_string();
    }

    fn register(&self, registry: &Registry) -> Result<()> {
        registry
            .register(Box::new(self.clone()))
            .map_err(Error::Registration)?;

        info!(
            "Registered {}_{} collector",
            METRICS_NAMESPACE, WORKER_PROCESSES_METRIC
        );
        Ok(())
    }
}

impl Collector for WorkerProcessGauge {
    fn desc(&self) -> Vec<&Desc> {
        self.process_total.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.process_total.collect()
    }
}

impl std::fmt::Debug for WorkerProcessGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerProcessGauge")
            .field("previous_config_version", &*self.previous_config_version.lock())
            .finish()
    }
}

// =============================================================================
// Null Worker Process Gauge
// =============================================================================

/// No-op collector used when metrics are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWorkerProcessGauge;

impl NullWorkerProcessGauge {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessCollector for NullWorkerProcessGauge {
    fn set_worker_process_count(&self, _current_config_version: &str, _worker_processes: i64) {}

    fn register(&self, _registry: &Registry) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
