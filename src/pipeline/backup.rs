//! Backup writer: byte-for-byte copies under a shadow root before mutation.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::FileDescriptor;

/// Copies originals into `<root>/<relative_path>` before any in-place write.
/// A successful backup is a precondition for every mutation; its path is
/// recorded in the aggregate result.
#[derive(Debug)]
pub struct BackupWriter {
    root: PathBuf,
}

impl BackupWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy the original bytes of `fd` into the backup tree, creating parent
    /// directories as needed. Returns the backup path.
    pub fn backup(&self, fd: &FileDescriptor) -> Result<PathBuf> {
        let dst = self.root.join(&fd.relative_path);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create backup directory {}", parent.display()))?;
        }
        fs::copy(&fd.absolute_path, &dst).with_context(|| {
            format!(
                "backup {} -> {}",
                fd.absolute_path.display(),
                dst.display()
            )
        })?;
        Ok(dst)
    }
}
