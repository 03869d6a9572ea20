//! Progress bar utilities for displaying processing status.

use kdam::{Animation, Bar, BarExt};
use std::sync::{Arc, Mutex};

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a progress bar with a known total.
pub fn create_progress_bar(total: usize, desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = total,
        desc = desc,
        animation = Animation::Classic
    )))
}

/// Move the bar to an absolute position.
/// Uses try_lock to avoid blocking if the mutex is contended; a skipped
/// update catches up on the next one.
pub fn update_bar_to(pb: &ProgressBar, position: usize) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.update_to(position);
    }
}

/// Adapt a bar into the pipeline's fraction-based progress sink.
pub fn progress_sink(pb: &ProgressBar, total: usize) -> impl Fn(f64, &str) + Sync + use<> {
    let bar = Arc::clone(pb);
    move |fraction: f64, _message: &str| {
        update_bar_to(&bar, (fraction * total as f64).round() as usize);
    }
}
