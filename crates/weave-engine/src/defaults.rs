//! Default constants for runtime configuration.
//!
//! Centralizes values shared by `config.rs`, the thread registry, the
//! reflected call path and the proxy synthesizer.

/// Default canonical-table backing selection.
pub const DEFAULT_TABLES: &str = "weak";

/// Backings always tried after the configured ones, in this order.
pub const FALLBACK_TABLES: [&str; 2] = ["weak", "pinned"];

/// Thread states created between two dead-thread sweeps.
pub const DEFAULT_THREAD_SWEEP_INTERVAL: u64 = 100;

/// Initial slot count of a reflected call-data buffer.
pub const DEFAULT_CALL_DATA_CAPACITY: usize = 4;

/// Package prefix for synthesized proxy types.
pub const PROXY_PACKAGE: &str = "weave.proxies";

/// File extension for dumped type images.
pub const TYPE_IMAGE_EXTENSION: &str = "wty";

/// Environment variable selecting the table backing.
pub const ENV_TABLES: &str = "WEAVE_TABLES";

/// Environment variable naming the proxy dump directory.
pub const ENV_PROXY_DEBUG_DIR: &str = "WEAVE_PROXY_DEBUG_DIR";

/// Environment variable overriding the sweep interval.
pub const ENV_THREAD_SWEEP_INTERVAL: &str = "WEAVE_THREAD_SWEEP_INTERVAL";
