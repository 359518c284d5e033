//! Resource limits and bounded readers for archive extraction.

use crate::error::{ErrorKind, LimitKind, PreflightError};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Resource limits applied while reading an archive and decoding its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLimits {
    pub max_archive_bytes: u64,
    pub max_decoded_bytes: u64,
    pub max_entry_bytes: u64,
    pub max_entries: usize,
    pub max_path_len: usize,
    pub max_manifest_depth: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 100 * 1024 * 1024,  // 100 MB as received
            max_decoded_bytes: 1024 * 1024 * 1024, // 1 GB streamed through a decoder
            max_entry_bytes: 10 * 1024 * 1024,    // 10 MB uncompressed
            max_entries: 100_000,
            max_path_len: 1024,
            max_manifest_depth: 64,
        }
    }
}

/// Partial overrides for `ArchiveLimits`. Used for config file parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveLimitsOverrides {
    pub max_archive_bytes: Option<u64>,
    pub max_decoded_bytes: Option<u64>,
    pub max_entry_bytes: Option<u64>,
    pub max_entries: Option<usize>,
    pub max_path_len: Option<usize>,
    pub max_manifest_depth: Option<usize>,
}

impl ArchiveLimits {
    /// Apply overrides onto these limits. Only `Some` values override.
    pub fn apply(self, overrides: &ArchiveLimitsOverrides) -> Self {
        Self {
            max_archive_bytes: overrides
                .max_archive_bytes
                .unwrap_or(self.max_archive_bytes),
            max_decoded_bytes: overrides
                .max_decoded_bytes
                .unwrap_or(self.max_decoded_bytes),
            max_entry_bytes: overrides.max_entry_bytes.unwrap_or(self.max_entry_bytes),
            max_entries: overrides.max_entries.unwrap_or(self.max_entries),
            max_path_len: overrides.max_path_len.unwrap_or(self.max_path_len),
            max_manifest_depth: overrides
                .max_manifest_depth
                .unwrap_or(self.max_manifest_depth),
        }
    }

    pub(crate) fn check_archive_size(&self, len: usize) -> Result<(), PreflightError> {
        if len as u64 > self.max_archive_bytes {
            return Err(PreflightError::limit_exceeded(
                LimitKind::ArchiveBytes,
                format!(
                    "archive is {} bytes, limit is {}",
                    len, self.max_archive_bytes
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_entry_count(&self, count: usize) -> Result<(), PreflightError> {
        if count > self.max_entries {
            return Err(PreflightError::limit_exceeded(
                LimitKind::EntryCount,
                format!("archive has more than {} entries", self.max_entries),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_path(&self, path: &str) -> Result<(), PreflightError> {
        if path.len() > self.max_path_len {
            return Err(PreflightError::limit_exceeded(
                LimitKind::PathLength,
                format!(
                    "entry path length {} exceeds limit {}",
                    path.len(),
                    self.max_path_len
                ),
            ));
        }
        Ok(())
    }

    pub(crate) fn check_declared_size(&self, path: &str, size: u64) -> Result<(), PreflightError> {
        if size > self.max_entry_bytes {
            return Err(PreflightError::limit_exceeded(
                LimitKind::EntryBytes,
                format!(
                    "entry '{}' declares {} bytes uncompressed, limit is {}",
                    path, size, self.max_entry_bytes
                ),
            ));
        }
        Ok(())
    }
}

/// A reader that limits the total number of bytes read and fails explicitly on overflow.
///
/// Reads one byte past the limit so that exactly-at-limit content succeeds and
/// anything larger fails instead of being silently truncated.
pub(crate) struct LimitReader<R> {
    inner: R,
    limit: u64,
    read: u64,
    kind: LimitKind,
    what: String,
}

impl<R: Read> LimitReader<R> {
    pub(crate) fn new(inner: R, limit: u64, kind: LimitKind, what: impl Into<String>) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            kind,
            what: what.into(),
        }
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let remaining = self.limit.saturating_add(1) - self.read;
        let max_to_read = remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_to_read])?;
        self.read += n as u64;

        if self.read > self.limit {
            return Err(std::io::Error::other(PreflightError::limit_exceeded(
                self.kind,
                format!(
                    "{} exceeded limit of {} bytes uncompressed",
                    self.what, self.limit
                ),
            )));
        }

        Ok(n)
    }
}

/// Recover a limit or cancellation error raised by one of our readers from an
/// io error chain; anything else is handed to `fallback`.
pub(crate) fn abort_or<F>(err: std::io::Error, fallback: F) -> PreflightError
where
    F: FnOnce(std::io::Error) -> PreflightError,
{
    match find_abort(&err) {
        Some(abort) => abort,
        None => fallback(err),
    }
}

fn find_abort(err: &(dyn std::error::Error + 'static)) -> Option<PreflightError> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(pe) = e.downcast_ref::<PreflightError>() {
            if matches!(
                pe.kind,
                ErrorKind::ResourceLimitExceeded | ErrorKind::Cancelled
            ) {
                return Some(PreflightError {
                    kind: pe.kind,
                    limit: pe.limit,
                    message: pe.message.clone(),
                    source: None,
                });
            }
        }
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if let Some(inner) = io.get_ref() {
                if let Some(found) = find_abort(inner) {
                    return Some(found);
                }
            }
        }
        current = e.source();
    }
    None
}
