use clap::Parser;
use std::path::PathBuf;

use crate::types::RetexOpts;
use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
}

/// Adaptive parallel rewriter for text configuration files.
#[derive(Clone, Parser)]
#[command(name = "retexer")]
#[command(about = "Rewrite config files under a directory; use --dry-run to preview.")]
pub struct Cli {
    /// Directory to process. Default: current directory.
    #[arg(value_name = "DIR", default_value = DefaultArgs::DIR)]
    pub dir: PathBuf,

    /// Rules file. Default: `.retexer.toml` in DIR.
    #[arg(long, short)]
    pub rules: Option<PathBuf>,

    /// Transform and report; do not write files or backups.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub dry_run: Option<bool>,

    /// Verbose output with a progress bar.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2
    #[arg(long, short = 'e', num_args = 1..)]
    pub exclude: Vec<String>,

    /// Follow symbolic links.
    #[arg(long, short = 'f', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub follow_links: Option<bool>,

    /// Strict mode: fail on first discovery error instead of skipping.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict: Option<bool>,

    /// Walk directories in parallel.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub parallel_walk: Option<bool>,

    /// Base parallel jobs per chunk. Default: min(4, cpu count).
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Base files per chunk.
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Memory limit in MB that the pressure thresholds derive from.
    #[arg(long)]
    pub memory_limit_mb: Option<u64>,

    /// Stream files above the size threshold instead of loading them whole.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub streaming: Option<bool>,

    /// Run large-file transforms on the worker pool.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub worker_threads: Option<bool>,

    /// Disable the content cache.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub no_cache: Option<bool>,

    /// Warn when transformed content no longer parses for its category.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub validate: Option<bool>,

    /// Backup directory. Default: `.retexer_backups` in DIR.
    #[arg(long, short = 'b')]
    pub backup_dir: Option<PathBuf>,
}

macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $cli.$field {
            $opts.$field = v;
        }
    };
}

impl Cli {
    /// Get the rules file path, defaulting to `.retexer.toml` in the target directory.
    pub fn rules_path(&self) -> PathBuf {
        self.rules
            .clone()
            .unwrap_or_else(|| self.dir.join(PackagePaths::get().config_filename()))
    }

    /// Overlay flags given on the command line onto `opts`. Call after the
    /// config file so the command line wins.
    pub fn apply_to_opts(&self, opts: &mut RetexOpts) {
        apply_cli_opt!(self, opts, dry_run);
        apply_cli_opt!(self, opts, verbose);
        apply_cli_opt!(self, opts, follow_links);
        apply_cli_opt!(self, opts, strict);
        apply_cli_opt!(self, opts, parallel_walk);
        apply_cli_opt!(self, opts, streaming);
        apply_cli_opt!(self, opts, worker_threads);
        apply_cli_opt!(self, opts, no_cache);
        apply_cli_opt!(self, opts, validate);
        if !self.exclude.is_empty() {
            opts.exclude = self.exclude.clone();
        }
        if let Some(v) = self.jobs {
            opts.jobs = Some(v);
        }
        if let Some(v) = self.chunk_size {
            opts.chunk_size = Some(v);
        }
        if let Some(v) = self.memory_limit_mb {
            opts.memory_limit_mb = Some(v);
        }
        if let Some(ref p) = self.backup_dir {
            opts.backup_dir = Some(p.clone());
        }
    }
}
