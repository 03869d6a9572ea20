//! CLI command handler: rewrite by default; --dry-run reports without writing.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use log::{debug, info, warn};

use crate::engine::arg_parser::Cli;
use crate::engine::progress::{create_progress_bar, progress_sink};
use crate::pipeline::{DiscoverOptions, ProgressFn, discover_files, process_files};
use crate::rules::RuleSet;
use crate::types::{AggregateResult, CancelToken, ProcessingOptions, RetexOpts, RunStatus};
use crate::utils::retexer_toml::{RetexerToml, load_retexer_toml, load_rules_file};
use crate::utils::setup_logging;

/// Build effective opts and the rule set: defaults, then config file, then
/// CLI flags. An explicit --rules path must load; the default file may be absent.
fn setup_opts(cli: &Cli) -> Result<(RetexOpts, RuleSet)> {
    let file: Option<RetexerToml> = match &cli.rules {
        Some(path) => Some(load_rules_file(path)?),
        None => load_retexer_toml(&cli.dir),
    };

    let mut opts = RetexOpts::default();
    if let Some(ref file) = file {
        file.apply_to_opts(&mut opts);
    }
    cli.apply_to_opts(&mut opts);
    opts.rules_path = Some(cli.rules_path());

    let rules = file
        .as_ref()
        .map(|f| f.rule_set())
        .transpose()?
        .with_context(|| {
            format!(
                "no substitution rules: create {} or pass --rules",
                cli.rules_path().display()
            )
        })?;
    Ok((opts, rules))
}

/// Run the full pipeline over `cli.dir`: discovery, chunked processing, summary.
pub fn handle_run(cli: &Cli) -> Result<()> {
    // Logging comes up before the config file loads so parse warnings are visible.
    setup_logging(cli.verbose.unwrap_or(false));
    let (opts, rules) = setup_opts(cli)?;

    if opts.dry_run {
        warn!("RUNNING IN DRY-RUN MODE. NO FILES WILL BE MODIFIED.");
    }
    if !rules.is_idempotent() {
        warn!("some rule targets are re-matchable by rule sources; repeated runs may keep rewriting");
    }

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel()).context("set Ctrl+C handler")?;

    debug!("state: Idle -> Discovering ({})", cli.dir.display());
    let discover_opts = DiscoverOptions {
        exclude: opts.exclude.clone(),
        follow_links: opts.follow_links,
        strict: opts.strict,
        parallel_walk: opts.parallel_walk,
        backup_root: opts.backup_dir.clone(),
    };
    let discovered = discover_files(&cli.dir, &discover_opts)?;
    if !discovered.skipped.is_empty() {
        warn!(
            "skipped {} inaccessible paths during discovery",
            discovered.skipped.len()
        );
    }
    if discovered.files.is_empty() {
        info!("no files to process under {}", cli.dir.display());
        return Ok(());
    }

    let mut options = ProcessingOptions::from(&opts);
    options.cancel = cancel;

    let total = discovered.files.len();
    let bar = opts.verbose.then(|| create_progress_bar(total, "Retexing"));
    let sink = bar.as_ref().map(|b| progress_sink(b, total));
    let result = process_files(
        &discovered.files,
        &rules,
        sink.as_ref().map(|s| s as &ProgressFn),
        &options,
    )?;

    print_summary(&result);
    if result.status == RunStatus::Failed {
        bail!("all {} files failed", result.errors.len());
    }
    Ok(())
}

/// Print the run summary with colored counts; list per-file errors.
fn print_summary(result: &AggregateResult) {
    info!(
        "{} | {} | {}",
        format!("Processed: {}", result.files_processed).green(),
        format!("Changed: {}", result.files_changed).cyan(),
        format!("Errors: {}", result.errors.len()).red()
    );
    debug!(
        "{} backups, {} chunks, {} jobs, cache hit rate {:.0}%, peak {} MB, {} ms",
        result.backup_paths.len(),
        result.chunks_run,
        result.parallel_jobs_used,
        result.cache_hit_rate * 100.0,
        result.peak_memory_mb,
        result.duration_ms
    );
    for warning in &result.warnings {
        warn!("{warning}");
    }
    for error in &result.errors {
        warn!("{}: {}", error.path.display(), error.message);
    }
}
