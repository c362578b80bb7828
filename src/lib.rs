//! NGINX Worker Metrics
//!
//! Prometheus collector for the number of NGINX worker processes run by an
//! ingress controller, labelled by configuration generation transition.
//!
//! # Architecture
//!
//! ```text
//! Worker Source → Process Reporter → Process Collector → Registry → /metrics
//! ```
//!
//! # Modules
//!
//! - [`collectors`] - Real and no-op process collectors
//! - [`config`] - Collector configuration
//! - [`error`] - Error types
//! - [`reporter`] - Loop feeding worker counts into a collector
//! - [`server`] - HTTP exposition of a registry

pub mod collectors;
pub mod config;
pub mod error;
pub mod reporter;
pub mod server;

// Re-export commonly used types
pub use collectors::{process_collector, NullWorkerProcessGauge, ProcessCollector, WorkerProcessGauge};
pub use config::MetricsConfig;
pub use error::{Error, Result};
pub use reporter::{ConfigVersion, ProcessReporter, ReporterConfig};
