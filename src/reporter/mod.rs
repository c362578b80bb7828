//! Process Reporter
//!
//! Periodically pushes the current NGINX worker process count, tagged with
//! the active configuration version, into a [`ProcessCollector`].
//!
//! The reporter is the single writer of the collector: updates are driven
//! from one loop so the `(old, current)` generation pairs follow the order in
//! which configuration versions were applied.
//!
//! A tick whose version and count both match the last report is skipped.
//! When the count changes within one generation the update lands on the
//! `(v, v)` pair, since the collector has already moved its previous version
//! to `v`.

mod source;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, trace};

use crate::collectors::{ProcessCollector, INITIAL_CONFIG_VERSION};
use crate::error::{Error, Result};

pub use source::{
    ProcfsWorkerSource, StaticWorkerSource, WorkerProcessSource, DEFAULT_PROC_ROOT,
    DEFAULT_WORKER_CMDLINE_PREFIX,
};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the process reporter
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Interval between reports, must be non-zero
    pub interval: Duration,
}

impl ReporterConfig {
    /// Create a config, rejecting a zero interval
    pub fn new(interval: Duration) -> Result<Self> {
        let config = Self { interval };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config(
                "Report interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
        }
    }
}

// =============================================================================
// Configuration Version
// =============================================================================

/// Currently applied configuration version.
///
/// Shared between whatever applies configuration (which bumps or sets it)
/// and the reporter (which reads it).
#[derive(Debug, Clone)]
pub struct ConfigVersion {
    inner: Arc<RwLock<VersionState>>,
}

#[derive(Debug)]
struct VersionState {
    counter: u64,
    current: String,
}

impl ConfigVersion {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(VersionState {
                counter: 0,
                current: INITIAL_CONFIG_VERSION.to_string(),
            })),
        }
    }

    /// Advance to the next numeric version and return it
    pub fn bump(&self) -> String {
        let mut state = self.inner.write();
        state.counter += 1;
        state.current = state.counter.to_string();
        state.current.clone()
    }

    /// Record an externally assigned version.
    ///
    /// A numeric version also moves the counter, so the next [`bump`](Self::bump)
    /// continues from it. Non-numeric versions leave the counter alone.
    pub fn set(&self, version: impl Into<String>) {
        let version = version.into();
        let mut state = self.inner.write();
        if let Ok(counter) = version.parse::<u64>() {
            state.counter = counter;
        }
        state.current = version;
    }

    pub fn current(&self) -> String {
        self.inner.read().current.clone()
    }
}

impl Default for ConfigVersion {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Process Reporter
// =============================================================================

/// Feeds worker process counts into a collector
pub struct ProcessReporter {
    config: ReporterConfig,
    collector: Arc<dyn ProcessCollector>,
    source: Box<dyn WorkerProcessSource>,
    version: ConfigVersion,
    last_reported: Mutex<Option<(String, i64)>>,
    shutdown: AtomicBool,
}

impl ProcessReporter {
    pub fn new(
        config: ReporterConfig,
        collector: Arc<dyn ProcessCollector>,
        source: Box<dyn WorkerProcessSource>,
        version: ConfigVersion,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            config,
            collector,
            source,
            version,
            last_reported: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        }))
    }

    /// Read the source once and record the count under the current version.
    ///
    /// Nothing is recorded when the source fails or when neither the version
    /// nor the count changed since the last report.
    pub fn report_once(&self) -> Result<i64> {
        let workers = self.source.worker_processes()?;
        let version = self.version.current();

        let mut last = self.last_reported.lock();
        if last
            .as_ref()
            .is_some_and(|(v, w)| *v == version && *w == workers)
        {
            trace!(version = %version, workers, "Worker processes unchanged");
            return Ok(workers);
        }

        self.collector.set_worker_process_count(&version, workers);
        debug!(version = %version, workers, "Reported worker processes");
        *last = Some((version, workers));

        Ok(workers)
    }

    /// Run the report loop until [`shutdown`](Self::shutdown) is called
    #[instrument(skip(self))]
    pub async fn run(self: Arc<Self>) {
        info!("Starting process reporter with {:?}", self.config);

        let mut tick = interval(self.config.interval);

        loop {
            tick.tick().await;

            if self.shutdown.load(Ordering::Relaxed) {
                info!("Process reporter shutting down");
                break;
            }

            if let Err(e) = self.report_once() {
                error!("Failed to report worker processes: {}", e);
            }
        }
    }

    /// Signal shutdown; the loop exits on its next tick.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ProcessReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessReporter")
            .field("config", &self.config)
            .field("version", &self.version.current())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use prometheus::Registry;
    use std::sync::atomic::AtomicI64;

    /// Collector recording every call it receives
    #[derive(Default)]
    struct RecordingCollector {
        calls: Mutex<Vec<(String, i64)>>,
    }

    impl ProcessCollector for RecordingCollector {
        fn set_worker_process_count(&self, current_config_version: &str, worker_processes: i64) {
            self.calls
                .lock()
                .push((current_config_version.to_string(), worker_processes));
        }

        fn register(&self, _registry: &Registry) -> Result<()> {
            Ok(())
        }
    }

    struct FailingSource;

    impl WorkerProcessSource for FailingSource {
        fn worker_processes(&self) -> Result<i64> {
            Err(Error::Internal("source unavailable".to_string()))
        }
    }

    /// Source whose count can be changed between reports
    struct AdjustableSource(Arc<AtomicI64>);

    impl WorkerProcessSource for AdjustableSource {
        fn worker_processes(&self) -> Result<i64> {
            Ok(self.0.load(Ordering::Relaxed))
        }
    }

    fn reporter_with(
        collector: Arc<RecordingCollector>,
        source: Box<dyn WorkerProcessSource>,
        version: ConfigVersion,
        interval: Duration,
    ) -> Arc<ProcessReporter> {
        ProcessReporter::new(ReporterConfig { interval }, collector, source, version).unwrap()
    }

    #[test]
    fn test_config_version_bump_and_set() {
        let version = ConfigVersion::new();
        assert_eq!(version.current(), "0");

        assert_eq!(version.bump(), "1");
        assert_eq!(version.bump(), "2");

        version.set("abc123");
        assert_eq!(version.current(), "abc123");

        let shared = version.clone();
        assert_eq!(shared.bump(), "3");
        assert_eq!(version.current(), "3");
    }

    #[test]
    fn test_config_version_bump_continues_from_numeric_set() {
        let version = ConfigVersion::new();
        version.bump();

        version.set("7");
        assert_eq!(version.bump(), "8");

        version.set("deploy-a");
        assert_eq!(version.bump(), "9");
    }

    #[test]
    fn test_reporter_config_rejects_zero_interval() {
        assert_matches!(ReporterConfig::new(Duration::ZERO), Err(Error::Config(_)));
        assert!(ReporterConfig::new(Duration::from_millis(1)).is_ok());
        assert!(ReporterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_reporter_rejects_zero_interval() {
        let result = ProcessReporter::new(
            ReporterConfig {
                interval: Duration::ZERO,
            },
            Arc::new(RecordingCollector::default()),
            Box::new(StaticWorkerSource(1)),
            ConfigVersion::new(),
        );

        assert_matches!(result, Err(Error::Config(_)));
    }

    #[test]
    fn test_report_once_uses_current_version() {
        let collector = Arc::new(RecordingCollector::default());
        let version = ConfigVersion::new();
        let reporter = reporter_with(
            collector.clone(),
            Box::new(StaticWorkerSource(4)),
            version.clone(),
            Duration::from_secs(15),
        );

        version.bump();
        assert_eq!(reporter.report_once().unwrap(), 4);
        version.set("7");
        reporter.report_once().unwrap();

        let calls = collector.calls.lock().clone();
        assert_eq!(calls, vec![("1".to_string(), 4), ("7".to_string(), 4)]);
    }

    #[test]
    fn test_report_once_skips_unchanged_state() {
        let collector = Arc::new(RecordingCollector::default());
        let workers = Arc::new(AtomicI64::new(4));
        let version = ConfigVersion::new();
        let reporter = reporter_with(
            collector.clone(),
            Box::new(AdjustableSource(workers.clone())),
            version.clone(),
            Duration::from_secs(15),
        );

        version.bump();
        reporter.report_once().unwrap();
        reporter.report_once().unwrap();
        reporter.report_once().unwrap();

        workers.store(6, Ordering::Relaxed);
        assert_eq!(reporter.report_once().unwrap(), 6);
        reporter.report_once().unwrap();

        let calls = collector.calls.lock().clone();
        assert_eq!(calls, vec![("1".to_string(), 4), ("1".to_string(), 6)]);
    }

    #[test]
    fn test_report_once_source_error_records_nothing() {
        let collector = Arc::new(RecordingCollector::default());
        let reporter = reporter_with(
            collector.clone(),
            Box::new(FailingSource),
            ConfigVersion::new(),
            Duration::from_secs(15),
        );

        assert_matches!(reporter.report_once(), Err(Error::Internal(_)));
        assert!(collector.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_reports_until_shutdown() {
        let collector = Arc::new(RecordingCollector::default());
        let reporter = reporter_with(
            collector.clone(),
            Box::new(StaticWorkerSource(2)),
            ConfigVersion::new(),
            Duration::from_millis(10),
        );

        let handle = tokio::spawn(Arc::clone(&reporter).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        reporter.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(reporter.is_shutdown());
        assert_eq!(collector.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_run_survives_source_errors() {
        let collector = Arc::new(RecordingCollector::default());
        let reporter = reporter_with(
            collector.clone(),
            Box::new(FailingSource),
            ConfigVersion::new(),
            Duration::from_millis(5),
        );

        let handle = tokio::spawn(Arc::clone(&reporter).run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        reporter.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(collector.calls.lock().is_empty());
    }
}
