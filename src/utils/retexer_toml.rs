//! Load `.retexer.toml` from a directory: `[settings]` overlays defaults and
//! `[[rules]]` supplies the substitution set. The library does not use this;
//! the consuming program injects config via `ProcessingOptions`.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::rules::RuleSet;
use crate::types::RetexOpts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub struct RetexerToml {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    dry_run: Option<bool>,
    verbose: Option<bool>,
    exclude: Option<Vec<String>>,
    follow_links: Option<bool>,
    strict: Option<bool>,
    parallel_walk: Option<bool>,
    jobs: Option<usize>,
    chunk_size: Option<usize>,
    memory_limit_mb: Option<u64>,
    streaming: Option<bool>,
    worker_threads: Option<bool>,
    cache: Option<bool>,
    validate: Option<bool>,
    backup_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    find: String,
    replace: String,
}

/// Load `<dir>/.retexer.toml` if present. Returns `None` when the file is
/// missing or unreadable (a parse error is logged, not fatal).
pub fn load_retexer_toml(dir: &Path) -> Option<RetexerToml> {
    load_rules_file(&dir.join(PackagePaths::get().config_filename()))
        .map_err(|e| log::warn!("{e:#}"))
        .ok()
}

/// Load a rules/settings file from an explicit path.
pub fn load_rules_file(path: &Path) -> Result<RetexerToml> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $section.$field {
            $opts.$field = v;
        }
    };
}

impl RetexerToml {
    /// Apply file settings to opts (only fields present in the file). Call
    /// before applying CLI flags so the command line wins.
    pub fn apply_to_opts(&self, opts: &mut RetexOpts) {
        let s = &self.settings;
        apply_file_opt!(s, opts, dry_run);
        apply_file_opt!(s, opts, verbose);
        if let Some(ref v) = s.exclude {
            opts.exclude = v.clone();
        }
        apply_file_opt!(s, opts, follow_links);
        apply_file_opt!(s, opts, strict);
        apply_file_opt!(s, opts, parallel_walk);
        apply_file_opt!(s, opts, streaming);
        apply_file_opt!(s, opts, worker_threads);
        apply_file_opt!(s, opts, validate);
        if let Some(v) = s.jobs {
            opts.jobs = Some(v);
        }
        if let Some(v) = s.chunk_size {
            opts.chunk_size = Some(v);
        }
        if let Some(v) = s.memory_limit_mb {
            opts.memory_limit_mb = Some(v);
        }
        if let Some(v) = s.cache {
            opts.no_cache = !v;
        }
        if let Some(ref p) = s.backup_dir {
            opts.backup_dir = Some(PathBuf::from(p));
        }
    }

    /// Build the rule set from `[[rules]]`. Errors when the file defines none.
    pub fn rule_set(&self) -> Result<RuleSet> {
        if self.rules.is_empty() {
            bail!("no [[rules]] entries defined");
        }
        RuleSet::from_pairs(
            self.rules
                .iter()
                .map(|r| (r.find.clone(), r.replace.clone())),
        )
    }

    pub fn has_rules(&self) -> bool {
        !self.rules.is_empty()
    }
}
