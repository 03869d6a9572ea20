//! Pipeline orchestrator: chunked processing loop with adaptive tuning.
//!
//! Files are partitioned into chunks; each chunk is dispatched over a small
//! set of I/O lanes and fully resolved before the next chunk starts. Chunk
//! boundaries are the synchronization points where tuning is recomputed from
//! live memory telemetry, monitor events are drained, progress is reported,
//! and cancellation is checked.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};
use log::{debug, warn};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::ContentCache;
use crate::monitor::{MemoryEvent, MemoryMonitor, PressureLevel};
use crate::pool::{Task, TaskOutput, WorkerPool};
use crate::rules::{RuleSet, validate_syntax};
use crate::types::{
    AggregateResult, FileDescriptor, FileError, MemoryThresholds, ProcessingOptions,
    ProcessingResult, RunStatus,
};
use crate::utils::config::{PackagePaths, PoolConsts, StreamingConsts};
use crate::utils::fd_limit::max_lanes_by_fd_limit;
use crate::utils::tempfiles::write_atomic;

use super::backup::BackupWriter;
use super::context::RunContext;
use super::streaming::stage_transform;

/// Progress sink: fraction complete plus a human-readable message.
pub type ProgressFn<'a> = dyn Fn(f64, &str) + Sync + 'a;

/// Process every file in `files` through the rule set. Per-file failures are
/// recorded and isolated; the run always attempts every file. Only setup-level
/// failures return `Err`.
pub fn process_files(
    files: &[FileDescriptor],
    rules: &RuleSet,
    progress: Option<&ProgressFn>,
    options: &ProcessingOptions,
) -> Result<AggregateResult> {
    let started = Instant::now();
    debug!("state: Idle -> Processing ({} files)", files.len());

    let monitor = Arc::new(MemoryMonitor::with_defaults(MemoryThresholds::from_limit_mb(
        options.memory_limit_mb,
    )));
    let cache = Arc::new(ContentCache::new(options.cache_max_bytes));
    let pool = options
        .enable_worker_threads
        .then(|| Arc::new(WorkerPool::new(options.max_parallel_jobs)));
    let backup = if options.dry_run || files.is_empty() {
        None
    } else {
        Some(BackupWriter::new(resolve_backup_root(files, options)?))
    };

    monitor.start();
    let events = monitor.subscribe();
    let ctx = RunContext {
        rules: Arc::new(rules.clone()),
        cache,
        monitor,
        pool,
        backup,
        options: options.clone(),
    };

    let lane_cap = max_lanes_by_fd_limit();
    let total = files.len();
    let base_chunk = options.chunk_size.max(1);
    let base_jobs = options.max_parallel_jobs.max(1);

    let mut files_processed = 0usize;
    let mut files_changed = 0usize;
    let mut errors: Vec<FileError> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut backup_paths: Vec<PathBuf> = Vec::new();
    let mut chunks_run = 0usize;
    let mut jobs_used = 0usize;

    let mut next = 0usize;
    while next < total {
        if options.cancel.is_cancelled() {
            warn!("cancellation requested; stopping at chunk boundary");
            warnings.push(format!("run cancelled after {next} of {total} files"));
            break;
        }
        drain_memory_events(&events, &ctx.cache, &mut warnings);

        // Re-tune from the monitor's current reading for this chunk.
        let chunk_size = ctx.monitor.recommended_chunk_size(base_chunk).max(1);
        let mut jobs = ctx.monitor.recommended_parallel_jobs(base_jobs);
        if let Some(cap) = lane_cap {
            jobs = jobs.min(cap).max(1);
        }

        let end = (next + chunk_size).min(total);
        let chunk = &files[next..end];
        debug!(
            "chunk {chunks_run}: files {next}..{end}, {jobs} lanes, pressure {:?}",
            ctx.monitor.pressure()
        );

        for result in process_chunk(chunk, &ctx, jobs) {
            if let Some(w) = result.warning {
                warnings.push(format!("{}: {w}", result.path.display()));
            }
            match result.error {
                Some(message) => errors.push(FileError {
                    path: result.path,
                    message,
                }),
                None => {
                    files_processed += 1;
                    if result.changed {
                        files_changed += 1;
                    }
                    if let Some(b) = result.backup_path {
                        backup_paths.push(b);
                    }
                }
            }
        }
        chunks_run += 1;
        jobs_used = jobs;
        next = end;

        if let Some(progress) = progress {
            progress(
                next as f64 / total as f64,
                &format!("processed {next}/{total} files"),
            );
        }
    }

    debug!("state: Processing -> Finalizing");
    if let Some(pool) = &ctx.pool {
        pool.terminate();
    }
    ctx.monitor.stop();

    let status = if errors.is_empty() {
        RunStatus::Completed
    } else if files_processed > 0 {
        RunStatus::PartialSuccess
    } else {
        RunStatus::Failed
    };
    let result = AggregateResult {
        status,
        files_processed,
        files_changed,
        errors,
        warnings,
        backup_paths,
        duration_ms: started.elapsed().as_millis() as u64,
        cache_hits: ctx.cache.hits(),
        cache_misses: ctx.cache.misses(),
        cache_hit_rate: ctx.cache.hit_rate(),
        peak_memory_mb: ctx.monitor.peak_mb(),
        parallel_jobs_used: jobs_used,
        chunks_run,
    };
    debug!(
        "state: Finalizing -> {:?} ({} processed, {} changed, {} errors, {} ms)",
        result.status,
        result.files_processed,
        result.files_changed,
        result.errors.len(),
        result.duration_ms
    );
    Ok(result)
}

/// Backup root: explicit option, or `.retexer_backups` inside the tree the
/// descriptors were discovered from.
fn resolve_backup_root(files: &[FileDescriptor], options: &ProcessingOptions) -> Result<PathBuf> {
    if let Some(root) = &options.backup_root {
        return Ok(root.clone());
    }
    let fd = &files[0];
    let depth = fd.relative_path.components().count();
    let tree_root = fd
        .absolute_path
        .ancestors()
        .nth(depth)
        .with_context(|| {
            format!(
                "derive tree root from {} / {}",
                fd.absolute_path.display(),
                fd.relative_path.display()
            )
        })?;
    Ok(tree_root.join(PackagePaths::get().backup_dir_name()))
}

/// Apply pending monitor events. Cleanup clears the cache (the subscriber-side
/// side effect); critical is surfaced as a warning and the run continues.
fn drain_memory_events(
    events: &Receiver<MemoryEvent>,
    cache: &ContentCache,
    warnings: &mut Vec<String>,
) {
    while let Ok(event) = events.try_recv() {
        match event.level {
            PressureLevel::Cleanup => {
                debug!(
                    "cleanup pressure at {} MB; clearing content cache",
                    event.used_mb
                );
                cache.clear();
            }
            PressureLevel::Critical => {
                warn!(
                    "critical memory pressure at {} MB; continuing at reduced throughput",
                    event.used_mb
                );
                warnings.push(format!("critical memory pressure at {} MB", event.used_mb));
            }
            PressureLevel::Warning => {
                debug!("memory warning at {} MB", event.used_mb);
            }
            PressureLevel::None => {}
        }
    }
}

/// Dispatch one chunk over `lanes` concurrent lanes and collect every result.
/// One file's failure never cancels its siblings; the chunk resolves fully
/// before this returns.
fn process_chunk(chunk: &[FileDescriptor], ctx: &RunContext, lanes: usize) -> Vec<ProcessingResult> {
    let lanes = lanes.clamp(1, chunk.len().max(1));
    let (index_tx, index_rx) = bounded::<usize>(chunk.len());
    let (result_tx, result_rx) = bounded::<ProcessingResult>(chunk.len());
    for i in 0..chunk.len() {
        let _ = index_tx.send(i);
    }
    drop(index_tx);

    std::thread::scope(|s| {
        for _ in 0..lanes {
            let index_rx = index_rx.clone();
            let result_tx = result_tx.clone();
            s.spawn(move || {
                while let Ok(i) = index_rx.recv() {
                    let _ = result_tx.send(process_one(&chunk[i], ctx));
                }
            });
        }
        drop(result_tx);
        let mut results = Vec::with_capacity(chunk.len());
        while let Ok(result) = result_rx.recv() {
            results.push(result);
        }
        results
    })
}

/// Process a single file: cache-or-read, transform (inline, pooled, or
/// streamed), then backup and atomic write when content changed.
fn process_one(fd: &FileDescriptor, ctx: &RunContext) -> ProcessingResult {
    let started = Instant::now();
    let mut warning = None;
    let (changed, backup_path, error) = match process_inner(fd, ctx, &mut warning) {
        Ok((changed, backup_path)) => (changed, backup_path, None),
        Err(e) => (false, None, Some(format!("{e:#}"))),
    };
    ProcessingResult {
        path: fd.relative_path.clone(),
        changed,
        backup_path,
        warning,
        error,
        processing_ms: started.elapsed().as_millis() as u64,
    }
}

fn process_inner(
    fd: &FileDescriptor,
    ctx: &RunContext,
    warning: &mut Option<String>,
) -> Result<(bool, Option<PathBuf>)> {
    let opts = &ctx.options;

    // Oversized files stream chunk-by-chunk; the cache never sees them.
    if opts.use_streaming && fd.size_bytes > StreamingConsts::STREAM_THRESHOLD {
        return match stage_transform(&fd.absolute_path, &ctx.rules, StreamingConsts::CHUNK_SIZE)? {
            Some(staged) => match &ctx.backup {
                Some(backup) => {
                    let backup_path = backup.backup(fd)?;
                    staged.commit()?;
                    Ok((true, Some(backup_path)))
                }
                None => {
                    staged.abort();
                    Ok((true, None))
                }
            },
            None => Ok((false, None)),
        };
    }

    // Pooled read-and-transform: when neither the cache nor validation needs
    // the content on this side, the worker reads the file itself.
    if let Some(pool) = &ctx.pool
        && fd.size_bytes >= PoolConsts::ENGAGE_THRESHOLD
        && !opts.enable_caching
        && !opts.validate
    {
        let pending = pool.submit(Task::ProcessFile {
            path: fd.absolute_path.clone(),
            rules: Arc::clone(&ctx.rules),
        });
        let transformed = match pending.wait(opts.task_timeout) {
            Ok(TaskOutput::Transformed(t)) => t,
            Ok(_) => None,
            Err(failure) => anyhow::bail!("{failure}"),
        };
        return match transformed {
            Some(new_content) => commit_write(fd, ctx, new_content),
            None => Ok((false, None)),
        };
    }

    let meta = std::fs::metadata(&fd.absolute_path)
        .with_context(|| format!("stat {}", fd.absolute_path.display()))?;
    let live_mtime_ns = mtime_ns(&meta);

    let cached = opts
        .enable_caching
        .then(|| ctx.cache.get(&fd.absolute_path, live_mtime_ns))
        .flatten();
    let content: Arc<str> = match cached {
        Some(entry) => entry.content,
        None => {
            let s = std::fs::read_to_string(&fd.absolute_path)
                .with_context(|| format!("read {}", fd.absolute_path.display()))?;
            let arc: Arc<str> = s.into();
            if opts.enable_caching {
                ctx.cache.set(&fd.absolute_path, Arc::clone(&arc), live_mtime_ns);
            }
            arc
        }
    };

    let transformed: Option<String> = match &ctx.pool {
        Some(pool) if fd.size_bytes >= PoolConsts::ENGAGE_THRESHOLD => {
            let pending = pool.submit(Task::ApplyRules {
                path: fd.absolute_path.clone(),
                content: Arc::clone(&content),
                rules: Arc::clone(&ctx.rules),
            });
            match pending.wait(opts.task_timeout) {
                Ok(TaskOutput::Transformed(t)) => t,
                Ok(_) => None,
                Err(failure) => anyhow::bail!("{failure}"),
            }
        }
        _ => match ctx.rules.apply(&content) {
            Cow::Borrowed(_) => None,
            Cow::Owned(s) => Some(s),
        },
    };

    if opts.validate {
        *warning = validate_syntax(fd.category, transformed.as_deref().unwrap_or(&content));
    }

    match transformed {
        Some(new_content) => commit_write(fd, ctx, new_content),
        None => Ok((false, None)),
    }
}

/// Backup then atomically replace the file, refreshing the cache with the new
/// content. Skips both in dry-run (no backup writer).
fn commit_write(
    fd: &FileDescriptor,
    ctx: &RunContext,
    new_content: String,
) -> Result<(bool, Option<PathBuf>)> {
    let Some(backup) = &ctx.backup else {
        return Ok((true, None));
    };
    let backup_path = backup.backup(fd)?;
    write_atomic(&fd.absolute_path, new_content.as_bytes())?;
    if ctx.options.enable_caching
        && let Ok(meta) = std::fs::metadata(&fd.absolute_path)
    {
        ctx.cache
            .set(&fd.absolute_path, new_content.into(), mtime_ns(&meta));
    }
    Ok((true, Some(backup_path)))
}

fn mtime_ns(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
