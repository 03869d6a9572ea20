//! Run-scoped shared state passed into the chunk lanes.

use std::sync::Arc;

use crate::cache::ContentCache;
use crate::monitor::MemoryMonitor;
use crate::pool::WorkerPool;
use crate::rules::RuleSet;
use crate::types::ProcessingOptions;

use super::backup::BackupWriter;

/// Everything a lane needs to process one file. Built once per run by the
/// orchestrator; cache and monitor are the only members mutated concurrently
/// (both tolerate races by construction).
pub struct RunContext {
    pub rules: Arc<RuleSet>,
    pub cache: Arc<ContentCache>,
    pub monitor: Arc<MemoryMonitor>,
    /// Present only when worker threads are enabled.
    pub pool: Option<Arc<WorkerPool>>,
    /// Absent in dry-run mode: no mutation, no backups.
    pub backup: Option<BackupWriter>,
    pub options: ProcessingOptions,
}
