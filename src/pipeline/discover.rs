//! Default file discovery: walk a root, filter, and snapshot descriptors.
//!
//! Discovery is the run's only fatal phase in strict mode; otherwise unreadable
//! paths are recorded and skipped. The walk can be serial (walkdir) or parallel
//! (jwalk) depending on options.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::types::{FileCategory, FileDescriptor};
use crate::utils::config::{BINARY_SNIFF_LEN, PackagePaths};

/// Options for the default discovery collaborator.
#[derive(Clone, Debug, Default)]
pub struct DiscoverOptions {
    /// Exclude patterns (glob syntax, e.g. `node_modules`, `*.log`).
    pub exclude: Vec<String>,
    pub follow_links: bool,
    /// Fail on the first walk error instead of skipping the path.
    pub strict: bool,
    /// Walk with jwalk's parallel traversal instead of walkdir.
    pub parallel_walk: bool,
    /// Backup root to exclude from the walk (canonicalized internally).
    pub backup_root: Option<PathBuf>,
}

/// Result of a discovery pass: descriptors plus the paths skipped on error.
pub struct Discovered {
    pub files: Vec<FileDescriptor>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// One result from a directory walk: a path to consider or an error.
enum WalkOutcome {
    Ok(PathBuf),
    Err { msg: String, path: Option<PathBuf> },
}

fn jwalk_iter(root: &Path, follow_links: bool) -> Box<dyn Iterator<Item = WalkOutcome>> {
    use jwalk::Parallelism;
    use std::time::Duration;
    Box::new(
        jwalk::WalkDir::new(root)
            .follow_links(follow_links)
            .parallelism(Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_secs(60),
            })
            .into_iter()
            .map(|r| match r {
                Ok(entry) => WalkOutcome::Ok(entry.path().to_path_buf()),
                Err(err) => WalkOutcome::Err {
                    msg: format!("{}", err),
                    path: err.path().map(PathBuf::from),
                },
            }),
    )
}

fn walkdir_iter(root: &Path, follow_links: bool) -> Box<dyn Iterator<Item = WalkOutcome>> {
    Box::new(
        walkdir::WalkDir::new(root)
            .follow_links(follow_links)
            .into_iter()
            .map(|r| match r {
                Ok(entry) => WalkOutcome::Ok(entry.into_path()),
                Err(err) => WalkOutcome::Err {
                    msg: format!("{}", err),
                    path: err.path().map(PathBuf::from),
                },
            }),
    )
}

/// Walk `root` and return immutable descriptors for every text file that
/// passes the filters. Strict mode turns the first walk error into a failure
/// of the whole discovery.
pub fn discover_files(root: &Path, opts: &DiscoverOptions) -> Result<Discovered> {
    let root = root
        .canonicalize()
        .with_context(|| format!("canonicalize {}", root.display()))?;
    let backup_canonical = opts.backup_root.as_ref().and_then(|p| p.canonicalize().ok());

    let mut exclude = PackagePaths::get().default_exclude_patterns();
    exclude.extend(opts.exclude.iter().cloned());

    let iter = if opts.parallel_walk {
        jwalk_iter(&root, opts.follow_links)
    } else {
        walkdir_iter(&root, opts.follow_links)
    };

    let mut files = Vec::new();
    let mut skipped: Vec<(PathBuf, String)> = Vec::new();
    for outcome in iter {
        match outcome {
            WalkOutcome::Ok(path) => {
                if !should_include(&path, &root, &backup_canonical, &exclude) {
                    continue;
                }
                match describe(&path, &root) {
                    Ok(Some(fd)) => files.push(fd),
                    Ok(None) => {}
                    Err(e) => {
                        if opts.strict {
                            return Err(e.context(format!("describe {}", path.display())));
                        }
                        skipped.push((path, format!("{e:#}")));
                    }
                }
            }
            WalkOutcome::Err { msg, path } => {
                if opts.strict {
                    return Err(anyhow!("walk error: {msg}"));
                }
                warn!("skipping inaccessible path: {msg}");
                skipped.push((path.unwrap_or_else(|| PathBuf::from("<no path>")), msg));
            }
        }
    }
    debug!(
        "discovered {} files under {} ({} skipped)",
        files.len(),
        root.display(),
        skipped.len()
    );
    Ok(Discovered { files, skipped })
}

/// Stat one path into a descriptor. `Ok(None)` filters it out (directory,
/// or binary-looking content).
fn describe(path: &Path, root: &Path) -> Result<Option<FileDescriptor>> {
    let meta = std::fs::metadata(path)?;
    if !meta.is_file() {
        return Ok(None);
    }
    let category = category_for(path);
    // Known config extensions are trusted to be text; only sniff the rest.
    if category == FileCategory::Other && looks_binary(path)? {
        return Ok(None);
    }
    let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let relative_path = path
        .strip_prefix(root)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| path.to_path_buf());
    Ok(Some(FileDescriptor {
        relative_path,
        absolute_path: path.to_path_buf(),
        category,
        size_bytes: meta.len(),
        mtime_ns,
    }))
}

/// Extension-based category. Semantic classification is the caller's business;
/// this only picks the validator.
pub fn category_for(path: &Path) -> FileCategory {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name == ".env" || name.starts_with(".env.") {
        return FileCategory::Env;
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => FileCategory::Toml,
        Some("yaml") | Some("yml") => FileCategory::Yaml,
        Some("json") => FileCategory::Json,
        Some("ini") | Some("cfg") | Some("conf") => FileCategory::Ini,
        Some("env") => FileCategory::Env,
        _ => FileCategory::Other,
    }
}

/// A NUL byte in the leading bytes marks the file as binary.
fn looks_binary(path: &Path) -> Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; BINARY_SNIFF_LEN];
    let n = file.read(&mut buf)?;
    Ok(buf[..n].contains(&0))
}

/// Returns true if the path should be included in the walk (not excluded).
pub fn should_include(
    path: &Path,
    root: &Path,
    backup_canonical: &Option<PathBuf>,
    exclude_patterns: &[String],
) -> bool {
    if path == root {
        return false;
    }
    if let Some(backup) = backup_canonical
        && path.starts_with(backup)
    {
        return false;
    }
    if is_os_hidden_file(path) {
        return false;
    }
    if exclude_patterns.is_empty() {
        return true;
    }
    // Match patterns against the full path and every component, so a pattern
    // naming a directory also prunes the files inside it.
    let path_str = path.to_str().unwrap_or("");
    let relative = path.strip_prefix(root).unwrap_or(path);
    for pattern in exclude_patterns {
        if glob_match(pattern, path_str) {
            return false;
        }
        for component in relative.components() {
            if let std::path::Component::Normal(c) = component
                && let Some(c) = c.to_str()
                && glob_match(pattern, c)
            {
                return false;
            }
        }
    }
    true
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            // macOS resource fork files
            _ => name.starts_with("._"),
        }
    } else {
        false
    }
}

/// Simple glob pattern matching (supports * and ?)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let mut pattern_chars = pattern.chars().peekable();
    let mut text_chars = text.chars().peekable();

    while let Some(&p) = pattern_chars.peek() {
        match p {
            '*' => {
                pattern_chars.next();
                if pattern_chars.peek().is_none() {
                    return true; // trailing * matches everything
                }
                // Try to match rest of pattern
                while text_chars.peek().is_some() {
                    if glob_match(
                        &pattern_chars.clone().collect::<String>(),
                        &text_chars.clone().collect::<String>(),
                    ) {
                        return true;
                    }
                    text_chars.next();
                }
                return false;
            }
            '?' => {
                pattern_chars.next();
                if text_chars.next().is_none() {
                    return false;
                }
            }
            _ => {
                pattern_chars.next();
                if text_chars.next() != Some(p) {
                    return false;
                }
            }
        }
    }

    text_chars.peek().is_none()
}
