//! Memory monitor: samples process RSS on an interval, classifies pressure,
//! and recommends chunk size and parallelism for the next chunk.

use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, get_current_pid};

use crate::types::MemoryThresholds;
use crate::utils::config::TuningConsts;

/// Memory pressure derived from comparing live usage to the thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PressureLevel {
    None,
    Warning,
    Cleanup,
    Critical,
}

/// Emitted on a threshold crossing. Edge-triggered: each level fires once per
/// crossing and re-arms only after usage drops back below it.
#[derive(Clone, Copy, Debug)]
pub struct MemoryEvent {
    pub level: PressureLevel,
    pub used_mb: u64,
}

/// Classify a reading against the thresholds.
pub fn classify(used_mb: u64, thresholds: &MemoryThresholds) -> PressureLevel {
    if used_mb >= thresholds.critical_mb {
        PressureLevel::Critical
    } else if used_mb >= thresholds.cleanup_mb {
        PressureLevel::Cleanup
    } else if used_mb >= thresholds.warning_mb {
        PressureLevel::Warning
    } else {
        PressureLevel::None
    }
}

/// Chunk size recommendation: unchanged until pressure reaches cleanup, then
/// shrunk by the configured factor (never below one file).
pub fn recommend_chunk_size(level: PressureLevel, base: usize) -> usize {
    if level >= PressureLevel::Cleanup {
        ((base as f64 * TuningConsts::CHUNK_SHRINK_FACTOR) as usize).max(1)
    } else {
        base
    }
}

/// Parallelism recommendation: scale down proportionally to pressure.
pub fn recommend_parallel_jobs(level: PressureLevel, base: usize) -> usize {
    match level {
        PressureLevel::None => base.max(1),
        PressureLevel::Warning => base.saturating_sub(1).max(1),
        PressureLevel::Cleanup | PressureLevel::Critical => (base / 2).max(1),
    }
}

/// Edge-trigger state for the three thresholds. Pure and driven by readings,
/// so the sampling thread stays trivial and this stays testable.
#[derive(Debug)]
pub struct ThresholdGate {
    armed: [bool; 3],
}

impl ThresholdGate {
    pub fn new() -> Self {
        Self { armed: [true; 3] }
    }

    /// Feed one reading; returns the events this reading fires. A threshold
    /// fires when crossed while armed, then stays quiet until the reading
    /// drops back below it.
    pub fn observe(&mut self, used_mb: u64, thresholds: &MemoryThresholds) -> Vec<MemoryEvent> {
        let levels = [
            (PressureLevel::Warning, thresholds.warning_mb),
            (PressureLevel::Cleanup, thresholds.cleanup_mb),
            (PressureLevel::Critical, thresholds.critical_mb),
        ];
        let mut fired = Vec::new();
        for (i, (level, threshold_mb)) in levels.into_iter().enumerate() {
            if used_mb >= threshold_mb {
                if self.armed[i] {
                    self.armed[i] = false;
                    fired.push(MemoryEvent { level, used_mb });
                }
            } else {
                self.armed[i] = true;
            }
        }
        fired
    }
}

impl Default for ThresholdGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Samples process RSS while a run is active and exposes advisory tuning
/// functions callable at any time. Constructed per run; `start()` spawns the
/// sampling thread, `stop()` joins it and is safe to call repeatedly.
pub struct MemoryMonitor {
    thresholds: MemoryThresholds,
    interval: Duration,
    used_mb: Arc<AtomicU64>,
    peak_mb: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    event_tx: Sender<MemoryEvent>,
    event_rx: Receiver<MemoryEvent>,
}

impl MemoryMonitor {
    pub fn new(thresholds: MemoryThresholds, interval: Duration) -> Self {
        // Events are edge-triggered and rare; a small buffer never fills
        // unless nobody is draining it, and try_send keeps the sampler from
        // ever blocking on a full buffer.
        let (event_tx, event_rx) = bounded::<MemoryEvent>(16);
        Self {
            thresholds,
            interval,
            used_mb: Arc::new(AtomicU64::new(0)),
            peak_mb: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            event_tx,
            event_rx,
        }
    }

    pub fn with_defaults(thresholds: MemoryThresholds) -> Self {
        Self::new(
            thresholds,
            Duration::from_millis(TuningConsts::SAMPLE_INTERVAL_MS),
        )
    }

    /// Threshold-crossing events. Subscribe once per run; the orchestrator
    /// drains this at chunk boundaries.
    pub fn subscribe(&self) -> Receiver<MemoryEvent> {
        self.event_rx.clone()
    }

    /// Begin sampling. No-op when already running.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = Arc::clone(&self.running);
        let used_mb = Arc::clone(&self.used_mb);
        let peak_mb = Arc::clone(&self.peak_mb);
        let thresholds = self.thresholds;
        let interval = self.interval;
        let tx = self.event_tx.clone();
        let handle = std::thread::spawn(move || {
            let mut sys = System::new();
            let pid = get_current_pid().ok();
            let mut gate = ThresholdGate::new();
            while running.load(Ordering::Relaxed) {
                if let Some(mb) = sample_rss_mb(&mut sys, pid) {
                    used_mb.store(mb, Ordering::Relaxed);
                    peak_mb.fetch_max(mb, Ordering::Relaxed);
                    for event in gate.observe(mb, &thresholds) {
                        debug!(
                            "memory pressure {:?} at {} MB (thresholds {:?})",
                            event.level, event.used_mb, thresholds
                        );
                        if tx.try_send(event).is_err() {
                            warn!("memory event buffer full; dropping {:?}", event.level);
                        }
                    }
                }
                // Sleep in short slices so stop() returns promptly.
                let mut remaining = interval;
                while !remaining.is_zero() && running.load(Ordering::Relaxed) {
                    let step = remaining.min(Duration::from_millis(50));
                    std::thread::sleep(step);
                    remaining = remaining.saturating_sub(step);
                }
            }
        });
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Halt sampling and release the thread. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn used_mb(&self) -> u64 {
        self.used_mb.load(Ordering::Relaxed)
    }

    pub fn peak_mb(&self) -> u64 {
        self.peak_mb.load(Ordering::Relaxed)
    }

    pub fn pressure(&self) -> PressureLevel {
        classify(self.used_mb(), &self.thresholds)
    }

    pub fn recommended_chunk_size(&self, base: usize) -> usize {
        recommend_chunk_size(self.pressure(), base)
    }

    pub fn recommended_parallel_jobs(&self, base: usize) -> usize {
        recommend_parallel_jobs(self.pressure(), base)
    }

    /// True once pressure reaches cleanup.
    pub fn should_reduce_parallelism(&self) -> bool {
        self.pressure() >= PressureLevel::Cleanup
    }

    /// True once pressure reaches warning.
    pub fn is_high_pressure(&self) -> bool {
        self.pressure() >= PressureLevel::Warning
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Current process RSS in MB, or `None` when the process can't be sampled.
fn sample_rss_mb(sys: &mut System, pid: Option<Pid>) -> Option<u64> {
    let pid = pid?;
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_memory(),
    );
    sys.process(pid).map(|p| p.memory() / (1024 * 1024))
}
