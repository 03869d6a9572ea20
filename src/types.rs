//! Public and internal types for the retexer API and pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::utils::config::{CacheConsts, PoolConsts, TuningConsts};

/// Rough content class for a discovered file, derived from its extension.
/// Drives syntax validation only; the transform path treats all categories alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileCategory {
    Toml,
    Yaml,
    Json,
    Ini,
    Env,
    Other,
}

/// Immutable snapshot of one discovered file. Taken once at discovery time;
/// read-only for the duration of a run.
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    /// Path relative to the discovery root.
    pub relative_path: PathBuf,
    /// Absolute path used for all I/O.
    pub absolute_path: PathBuf,
    pub category: FileCategory,
    pub size_bytes: u64,
    /// Modification time in nanoseconds since epoch.
    pub mtime_ns: i64,
}

/// One failed file: path plus the underlying cause, with enough context to retry narrowly.
#[derive(Clone, Debug)]
pub struct FileError {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of processing a single file. Produced by exactly one execution path per run.
#[derive(Debug)]
pub struct ProcessingResult {
    pub path: PathBuf,
    /// True when the transform produced different content (written unless dry-run).
    pub changed: bool,
    pub backup_path: Option<PathBuf>,
    pub warning: Option<String>,
    /// Per-file failure; `None` means success.
    pub error: Option<String>,
    pub processing_ms: u64,
}

impl ProcessingResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Final classification of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Every file processed without error.
    Completed,
    /// Some files processed, some errored.
    PartialSuccess,
    /// No file processed successfully.
    Failed,
}

/// Run-scoped summary returned to the caller. Owned and mutated only by the
/// orchestrator; finalized once and never mutated after return.
#[derive(Debug)]
pub struct AggregateResult {
    pub status: RunStatus,
    pub files_processed: usize,
    pub files_changed: usize,
    pub errors: Vec<FileError>,
    pub warnings: Vec<String>,
    pub backup_paths: Vec<PathBuf>,
    pub duration_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    /// Peak process RSS observed by the memory monitor during the run (MB).
    pub peak_memory_mb: u64,
    /// Parallel jobs in effect for the last chunk (after adaptive tuning).
    pub parallel_jobs_used: usize,
    /// Number of chunk iterations run. `ceil(files / chunk_size)` absent pressure.
    pub chunks_run: usize,
}

impl AggregateResult {
    pub fn success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn partial_success(&self) -> bool {
        self.status == RunStatus::PartialSuccess
    }
}

/// Memory pressure thresholds in MB of process RSS. Immutable per run.
#[derive(Clone, Copy, Debug)]
pub struct MemoryThresholds {
    pub warning_mb: u64,
    pub cleanup_mb: u64,
    pub critical_mb: u64,
}

impl MemoryThresholds {
    /// Derive the three thresholds from a single memory limit:
    /// warning at 60%, cleanup at 80%, critical at 95%.
    pub fn from_limit_mb(limit_mb: u64) -> Self {
        // Round rather than truncate: 0.6 is not exact in binary and
        // 0.6 * 1000 would otherwise land on 599.
        Self {
            warning_mb: (limit_mb as f64 * TuningConsts::WARNING_FRACTION).round() as u64,
            cleanup_mb: (limit_mb as f64 * TuningConsts::CLEANUP_FRACTION).round() as u64,
            critical_mb: (limit_mb as f64 * TuningConsts::CRITICAL_FRACTION).round() as u64,
        }
    }
}

/// Cooperative cancellation flag, checked at chunk boundaries only.
/// Clones share the same flag. The default token is never cancelled.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options for [`process_files`](crate::process_files). All fields have defaults.
#[derive(Clone, Debug)]
pub struct ProcessingOptions {
    /// Serve repeat reads from the in-memory content cache (mtime-gated).
    pub enable_caching: bool,
    /// Base concurrency per chunk before adaptive tuning. Default `min(4, cpus)`.
    pub max_parallel_jobs: usize,
    /// Base files per chunk before adaptive tuning.
    pub chunk_size: usize,
    /// Memory limit the pressure thresholds are derived from.
    pub memory_limit_mb: u64,
    /// Route files above the streaming threshold through the chunked transform.
    pub use_streaming: bool,
    /// Dispatch large-file transforms to the worker pool instead of the I/O lane.
    pub enable_worker_threads: bool,
    /// Hard per-task timeout for pooled work.
    pub task_timeout: Duration,
    /// Transform and report without writing files or backups.
    pub dry_run: bool,
    /// Check post-transform content for category-appropriate well-formedness.
    pub validate: bool,
    /// Backup root. When `None`, a `.retexer_backups` directory next to the
    /// processed tree is used.
    pub backup_root: Option<PathBuf>,
    /// Upper bound on total cached content bytes.
    pub cache_max_bytes: u64,
    pub cancel: CancelToken,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            enable_caching: true,
            max_parallel_jobs: TuningConsts::DEFAULT_MAX_PARALLEL_JOBS
                .min(rayon::current_num_threads().max(1)),
            chunk_size: TuningConsts::DEFAULT_CHUNK_SIZE,
            memory_limit_mb: TuningConsts::DEFAULT_MEMORY_LIMIT_MB,
            use_streaming: false,
            enable_worker_threads: false,
            task_timeout: Duration::from_secs(PoolConsts::TASK_TIMEOUT_SECS),
            dry_run: false,
            validate: false,
            backup_root: None,
            cache_max_bytes: CacheConsts::DEFAULT_MAX_BYTES,
            cancel: CancelToken::new(),
        }
    }
}

/// Full options (CLI and config file). Use [`ProcessingOptions`] for the
/// library API; the consuming program injects config there directly.
#[derive(Clone, Debug, Default)]
pub struct RetexOpts {
    /// Rules file path. When `None`, `.retexer.toml` in the target directory.
    pub rules_path: Option<PathBuf>,
    /// Transform and report without writing files or backups.
    pub dry_run: bool,
    /// Progress bar and debug logging.
    pub verbose: bool,
    /// Exclude patterns (glob syntax).
    pub exclude: Vec<String>,
    /// Follow symbolic links during discovery.
    pub follow_links: bool,
    /// Fail on the first discovery error instead of skipping.
    pub strict: bool,
    /// Walk with jwalk's parallel traversal.
    pub parallel_walk: bool,
    /// Override base parallelism. When `None`, `min(4, cpus)`.
    pub jobs: Option<usize>,
    /// Override base chunk size.
    pub chunk_size: Option<usize>,
    /// Override the memory limit thresholds derive from.
    pub memory_limit_mb: Option<u64>,
    /// Stream files above the size threshold.
    pub streaming: bool,
    /// Dispatch large-file transforms to the worker pool.
    pub worker_threads: bool,
    /// Disable the content cache.
    pub no_cache: bool,
    /// Warn when transformed content no longer parses for its category.
    pub validate: bool,
    /// Backup root override.
    pub backup_dir: Option<PathBuf>,
}

impl From<&RetexOpts> for ProcessingOptions {
    fn from(o: &RetexOpts) -> Self {
        let defaults = ProcessingOptions::default();
        ProcessingOptions {
            enable_caching: !o.no_cache,
            max_parallel_jobs: o.jobs.unwrap_or(defaults.max_parallel_jobs),
            chunk_size: o.chunk_size.unwrap_or(defaults.chunk_size),
            memory_limit_mb: o.memory_limit_mb.unwrap_or(defaults.memory_limit_mb),
            use_streaming: o.streaming,
            enable_worker_threads: o.worker_threads,
            dry_run: o.dry_run,
            validate: o.validate,
            backup_root: o.backup_dir.clone(),
            ..defaults
        }
    }
}
