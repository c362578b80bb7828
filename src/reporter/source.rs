//! Worker Process Sources
//!
//! Where the reporter gets the current number of NGINX worker processes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{instrument, trace};

use crate::error::Result;

/// Default root of the proc filesystem
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Command line NGINX gives its worker processes
pub const DEFAULT_WORKER_CMDLINE_PREFIX: &str = "nginx: worker process";

/// Provides the current worker process count
pub trait WorkerProcessSource: Send + Sync {
    fn worker_processes(&self) -> Result<i64>;
}

// =============================================================================
// Procfs Source
// =============================================================================

/// Counts worker processes by scanning `<proc_root>/<pid>/cmdline`.
#[derive(Debug, Clone)]
pub struct ProcfsWorkerSource {
    proc_root: PathBuf,
    cmdline_prefix: String,
}

impl ProcfsWorkerSource {
    pub fn new(proc_root: impl Into<PathBuf>, cmdline_prefix: impl Into<String>) -> Self {
        Self {
            proc_root: proc_root.into(),
            cmdline_prefix: cmdline_prefix.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Whether the process at `pid_dir` is a worker. Processes that exit or
    /// hide their cmdline while we scan count as not matching.
    fn is_worker(&self, pid_dir: &Path) -> bool {
        let raw = match fs::read(pid_dir.join("cmdline")) {
            Ok(raw) => raw,
            Err(e) => {
                trace!(pid_dir = %pid_dir.display(), "Skipping process: {}", e);
                return false;
            }
        };

        // argv entries are NUL separated; NGINX rewrites argv[0] in place
        let cmdline = String::from_utf8_lossy(&raw);
        let argv0 = cmdline.split('\0').next().unwrap_or_default();
        argv0.starts_with(&self.cmdline_prefix)
    }
}

impl Default for ProcfsWorkerSource {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT, DEFAULT_WORKER_CMDLINE_PREFIX)
    }
}

impl WorkerProcessSource for ProcfsWorkerSource {
    #[instrument(skip(self), fields(proc_root = %self.proc_root.display()))]
    fn worker_processes(&self) -> Result<i64> {
        let mut count = 0;

        for entry in fs::read_dir(&self.proc_root)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_pid = name
                .to_str()
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
            if !is_pid {
                continue;
            }

            if self.is_worker(&entry.path()) {
                count += 1;
            }
        }

        trace!(count, "Scanned worker processes");
        Ok(count)
    }
}

// =============================================================================
// Static Source
// =============================================================================

/// Source reporting a fixed count
#[derive(Debug, Clone, Copy)]
pub struct StaticWorkerSource(pub i64);

impl WorkerProcessSource for StaticWorkerSource {
    fn worker_processes(&self) -> Result<i64> {
        Ok(self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
