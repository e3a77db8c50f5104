//! Runtime configuration

use std::path::PathBuf;

use crate::defaults::{
    DEFAULT_CALL_DATA_CAPACITY, DEFAULT_TABLES, DEFAULT_THREAD_SWEEP_INTERVAL, ENV_PROXY_DEBUG_DIR,
    ENV_TABLES, ENV_THREAD_SWEEP_INTERVAL,
};

/// Runtime creation options
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Canonical-table backing selection: colon-separated list of
    /// `weak`, `soft` or `pinned`, tried in order.
    pub tables: String,

    /// Directory receiving one `.wty` image per synthesized type
    pub proxy_debug_dir: Option<PathBuf>,

    /// Thread states created between two dead-thread sweeps
    pub thread_sweep_interval: u64,

    /// Initial slot count of reflected call-data buffers
    pub call_data_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            tables: DEFAULT_TABLES.to_string(),
            proxy_debug_dir: None,
            thread_sweep_interval: DEFAULT_THREAD_SWEEP_INTERVAL,
            call_data_capacity: DEFAULT_CALL_DATA_CAPACITY,
        }
    }
}

impl RuntimeOptions {
    /// Defaults overlaid with the `WEAVE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(tables) = lookup(ENV_TABLES).filter(|s| !s.trim().is_empty()) {
            options.tables = tables;
        }
        if let Some(dir) = lookup(ENV_PROXY_DEBUG_DIR).filter(|s| !s.is_empty()) {
            options.proxy_debug_dir = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup(ENV_THREAD_SWEEP_INTERVAL) {
            match raw.trim().parse::<u64>() {
                Ok(n) if n > 0 => options.thread_sweep_interval = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", ENV_THREAD_SWEEP_INTERVAL),
            }
        }
        options
    }

    /// Select the table backing
    pub fn with_tables(mut self, tables: impl Into<String>) -> Self {
        self.tables = tables.into();
        self
    }

    /// Dump synthesized type images into `dir`
    pub fn with_proxy_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.proxy_debug_dir = Some(dir.into());
        self
    }

    /// Set the dead-thread sweep interval
    pub fn with_thread_sweep_interval(mut self, interval: u64) -> Self {
        self.thread_sweep_interval = interval.max(1);
        self
    }
}
