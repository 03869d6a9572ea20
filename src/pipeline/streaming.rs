//! Chunked transform for oversized files.
//!
//! Content flows through fixed-size chunks from the source into a sibling temp
//! file, which replaces the original only after the full stream succeeds. Peak
//! memory stays at a small multiple of the chunk size regardless of file size.
//!
//! Known limitation: a pattern whose match straddles two chunks is not
//! rewritten. Only incomplete trailing UTF-8 sequences are carried across the
//! boundary, so a split code point never corrupts output.

use anyhow::{Context, Result, bail};
use log::debug;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::rules::RuleSet;
use crate::utils::config::StreamingConsts;
use crate::utils::tempfiles::temp_path_for;

/// A completed stream transform waiting to replace its source. Dropping
/// without [`commit`](StagedReplace::commit) removes the temp file and leaves
/// the original untouched.
#[derive(Debug)]
pub struct StagedReplace {
    temp: PathBuf,
    dst: PathBuf,
    committed: bool,
}

impl StagedReplace {
    /// Atomically rename the staged result over the original.
    pub fn commit(mut self) -> Result<()> {
        fs::rename(&self.temp, &self.dst).with_context(|| {
            format!(
                "atomic rename {} -> {}",
                self.temp.display(),
                self.dst.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }

    /// Discard the staged result (dry-run, or caller-side failure).
    pub fn abort(self) {}
}

impl Drop for StagedReplace {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp);
        }
    }
}

/// Stream `src` through the rule set in `chunk_bytes` chunks.
///
/// Returns `Ok(None)` when no rule matched anywhere (the temp file is removed
/// and the source untouched), or `Ok(Some(staged))` when the transform changed
/// content and is ready to commit.
pub fn stage_transform(
    src: &Path,
    rules: &RuleSet,
    chunk_bytes: usize,
) -> Result<Option<StagedReplace>> {
    let temp = temp_path_for(src);
    let outcome = stream_chunks(src, &temp, rules, chunk_bytes);
    match outcome {
        Ok(true) => {
            debug!("streamed transform changed {}", src.display());
            Ok(Some(StagedReplace {
                temp,
                dst: src.to_path_buf(),
                committed: false,
            }))
        }
        Ok(false) => {
            let _ = fs::remove_file(&temp);
            Ok(None)
        }
        Err(e) => {
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

/// Convenience wrapper using the default chunk size.
pub fn stage_transform_default(src: &Path, rules: &RuleSet) -> Result<Option<StagedReplace>> {
    stage_transform(src, rules, StreamingConsts::CHUNK_SIZE)
}

/// Pump chunks from `src` to `temp`, applying rules per chunk. Returns whether
/// any chunk changed.
fn stream_chunks(src: &Path, temp: &Path, rules: &RuleSet, chunk_bytes: usize) -> Result<bool> {
    let src_file = File::open(src).with_context(|| format!("open {}", src.display()))?;
    let temp_file =
        File::create(temp).with_context(|| format!("create temp file {}", temp.display()))?;
    let mut reader = BufReader::with_capacity(chunk_bytes, src_file);
    let mut writer = BufWriter::with_capacity(chunk_bytes, temp_file);

    let mut buf = vec![0u8; chunk_bytes];
    // Bytes held over from the previous read: at most one incomplete UTF-8
    // sequence (3 bytes), never a partial match.
    let mut pending: Vec<u8> = Vec::new();
    let mut changed = false;

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read {}", src.display()))?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
        let boundary = utf8_boundary(&pending, src)?;
        if boundary == 0 {
            continue;
        }
        let text = std::str::from_utf8(&pending[..boundary]).expect("boundary checked above");
        match rules.apply(text) {
            std::borrow::Cow::Borrowed(same) => writer.write_all(same.as_bytes()),
            std::borrow::Cow::Owned(rewritten) => {
                changed = true;
                writer.write_all(rewritten.as_bytes())
            }
        }
        .with_context(|| format!("write temp file {}", temp.display()))?;
        pending.drain(..boundary);
    }

    if !pending.is_empty() {
        bail!(
            "{}: truncated UTF-8 sequence at end of file",
            src.display()
        );
    }
    writer
        .flush()
        .with_context(|| format!("flush temp file {}", temp.display()))?;
    Ok(changed)
}

/// Largest prefix of `bytes` that ends on a UTF-8 character boundary. Errors
/// when the bytes are not valid UTF-8 at all (binary content).
fn utf8_boundary(bytes: &[u8], src: &Path) -> Result<usize> {
    match std::str::from_utf8(bytes) {
        Ok(_) => Ok(bytes.len()),
        // error_len() None means the failure is an incomplete sequence at the
        // end; everything before it is valid.
        Err(e) if e.error_len().is_none() => Ok(e.valid_up_to()),
        Err(_) => bail!("{}: not valid UTF-8; refusing to transform", src.display()),
    }
}
