//! Retexer: adaptive parallel rewriter for text configuration files

pub mod cache;
pub mod engine;
pub mod monitor;
pub mod pipeline;
pub mod pool;
pub mod rules;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use rules::RuleSet;
pub use types::*;

use log::debug;
use std::path::Path;

use pipeline::{DiscoverOptions, discover_files};

/// Result alias used by public retexer API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use pipeline::{ProgressFn, process_files};

/// Single entry point: discover text files under `root`, run the processing
/// pipeline with `rules`, and return the aggregate result.
///
/// Discovery failures are fatal (`Err`); everything after that is isolated
/// per file and reported in [`AggregateResult`]. Paths skipped during
/// discovery are appended to the result's warnings.
pub fn retex_dir(
    root: &Path,
    rules: &RuleSet,
    discover: &DiscoverOptions,
    options: &ProcessingOptions,
    progress: Option<&ProgressFn>,
) -> Result<AggregateResult> {
    debug!("state: Idle -> Discovering ({})", root.display());
    let discovered = discover_files(root, discover)?;
    let mut result = process_files(&discovered.files, rules, progress, options)?;
    for (path, msg) in &discovered.skipped {
        result
            .warnings
            .push(format!("skipped during discovery: {} ({msg})", path.display()));
    }
    Ok(result)
}
