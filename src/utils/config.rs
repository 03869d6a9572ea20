//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived filenames: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    backup_dir_name: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache paths from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                backup_dir_name: format!(".{pkg}_backups"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    pub fn backup_dir_name(&self) -> &str {
        &self.backup_dir_name
    }

    /// Names excluded from the walk by default. The backup root is also excluded
    /// by canonical path in the walk filter.
    pub fn default_exclude_patterns(&self) -> Vec<String> {
        vec![
            self.config_filename().to_string(),
            self.backup_dir_name().to_string(),
        ]
    }
}

// ---- Adaptive tuning ----

/// Chunking, parallelism, and memory-threshold defaults.
pub struct TuningConsts;

impl TuningConsts {
    /// Files per chunk before adaptive shrinking.
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;
    /// Base concurrency; effective default is `min(4, cpus)`.
    pub const DEFAULT_MAX_PARALLEL_JOBS: usize = 4;
    /// Memory limit the pressure thresholds derive from (MB).
    pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 512;
    /// Chunk size multiplier once pressure reaches cleanup.
    pub const CHUNK_SHRINK_FACTOR: f64 = 0.8;
    /// Threshold fractions of the memory limit.
    pub const WARNING_FRACTION: f64 = 0.6;
    pub const CLEANUP_FRACTION: f64 = 0.8;
    pub const CRITICAL_FRACTION: f64 = 0.95;
    /// Memory monitor sampling interval (ms).
    pub const SAMPLE_INTERVAL_MS: u64 = 1000;
}

// ---- Content cache ----

pub struct CacheConsts;

impl CacheConsts {
    /// Upper bound on total cached content bytes. 64 MB.
    pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;
}

// ---- Worker pool ----

pub struct PoolConsts;

impl PoolConsts {
    /// Hard cap on pool size regardless of configuration or CPU count.
    pub const HARD_CAP: usize = 8;
    /// Files at or above this size go to the pool when worker threads are
    /// enabled; below it, dispatch overhead exceeds the work itself (bytes). 50 KB.
    pub const ENGAGE_THRESHOLD: u64 = 50 * 1024;
    /// Hard per-task timeout (seconds).
    pub const TASK_TIMEOUT_SECS: u64 = 30;
    /// Pending-task channel capacity. The orchestrator never has more than one
    /// chunk in flight, so this is an upper bound on chunk size, not a queue.
    pub const QUEUE_CAP: usize = 4096;
    /// A task that faulted a worker is retried this many times before it
    /// surfaces as a per-file error.
    pub const MAX_REQUEUES: u8 = 1;
}

// ---- Streaming transform ----

pub struct StreamingConsts;

impl StreamingConsts {
    /// Files above this size use the chunked streaming path when enabled (bytes). 1 MB.
    pub const STREAM_THRESHOLD: u64 = 1024 * 1024;
    /// Fixed read chunk for the streaming transform (bytes). 64 KB.
    pub const CHUNK_SIZE: usize = 64 * 1024;
}

// ---- Discovery ----

/// Bytes sniffed from uncategorized files to reject binary content.
pub const BINARY_SNIFF_LEN: usize = 512;
