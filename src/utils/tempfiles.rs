//! Temp-file helpers: sibling temp paths and atomic in-place replacement.

use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sibling temp path for an in-place rewrite of `path` (`<name>.tmp` in the same
/// directory, so the final rename never crosses a filesystem).
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    path.parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

/// Replace `path` with `bytes` atomically: write a sibling temp file, then
/// rename over the original. The original is untouched on any failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temp_path_for(path);
    let write = (|| -> Result<()> {
        let mut f = fs::File::create(&temp)
            .with_context(|| format!("create temp file {}", temp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp file {}", temp.display()))?;
        f.flush()?;
        Ok(())
    })();
    if let Err(e) = write {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(e)
            .with_context(|| format!("atomic rename {} -> {}", temp.display(), path.display()));
    }
    Ok(())
}
