//! Archive reading: enumerate named entries of a container and pull out one of them.
//!
//! Two container formats are understood, chosen by magic bytes:
//! - ZIP (`.ipa`, `.zip`): entries are listed from the central directory without
//!   decompressing anything.
//! - gzip-compressed tar (`.tar.gz`): entries are listed by streaming the headers.
//!
//! Every decompressing read is bounded by [`ArchiveLimits`] and observes the
//! [`RequestContext`] deadline and cancellation flag.

pub mod limits;
pub mod tar_gz;
pub mod zip_archive;

pub use limits::{ArchiveLimits, ArchiveLimitsOverrides};
pub use tar_gz::TarGzArchiveReader;
pub use zip_archive::ZipArchiveReader;

use crate::context::RequestContext;
use crate::error::{PreflightError, PreflightResult};
use serde::Serialize;

/// Container format of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Sniff the container format from leading magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
            Some(Self::Zip)
        } else if data.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::Zip => write!(f, "zip"),
            ArchiveFormat::TarGz => write!(f, "tar.gz"),
        }
    }
}

/// Metadata of one archive entry, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// Position in enumeration order.
    pub index: usize,
    pub path: String,
    /// Uncompressed size as declared by the container.
    pub size: u64,
    pub is_dir: bool,
}

/// A named-entry container.
pub trait ArchiveReader {
    fn format(&self) -> ArchiveFormat;

    /// List entries in enumeration order without reading their content.
    fn entries(&mut self, ctx: &RequestContext) -> PreflightResult<Vec<EntryInfo>>;

    /// Read one entry's full (decompressed) content.
    fn read_entry(&mut self, entry: &EntryInfo, ctx: &RequestContext) -> PreflightResult<Vec<u8>>;
}

/// Open an in-memory archive, detecting its format.
pub fn open_archive<'a>(
    data: &'a [u8],
    limits: ArchiveLimits,
) -> PreflightResult<Box<dyn ArchiveReader + 'a>> {
    limits.check_archive_size(data.len())?;

    match ArchiveFormat::detect(data) {
        Some(ArchiveFormat::Zip) => Ok(Box::new(ZipArchiveReader::new(data, limits)?)),
        Some(ArchiveFormat::TarGz) => Ok(Box::new(TarGzArchiveReader::new(data, limits))),
        None => Err(PreflightError::invalid_archive(
            "unrecognized container format (expected zip or tar.gz)",
        )),
    }
}

/// First non-directory entry whose path ends with `suffix` (case-sensitive).
///
/// Later matches are ignored; the first one in enumeration order wins.
pub fn find_by_suffix<'e>(entries: &'e [EntryInfo], suffix: &str) -> Option<&'e EntryInfo> {
    let mut matches = entries
        .iter()
        .filter(|e| !e.is_dir && e.path.ends_with(suffix));
    let first = matches.next()?;

    let others = matches.count();
    if others > 0 {
        tracing::warn!(
            suffix = %suffix,
            chosen = %first.path,
            ignored = others,
            "Multiple entries match manifest suffix; using the first"
        );
    }
    Some(first)
}

/// The located manifest entry and its raw bytes.
#[derive(Debug, Clone)]
pub struct ExtractedEntry {
    pub format: ArchiveFormat,
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Open `data`, locate the first entry ending with `suffix`, and read it.
///
/// The archive is released before returning.
pub fn extract_by_suffix(
    data: &[u8],
    suffix: &str,
    limits: ArchiveLimits,
    ctx: &RequestContext,
) -> PreflightResult<ExtractedEntry> {
    ctx.checkpoint("archive open")?;
    let mut reader = open_archive(data, limits)?;
    let format = reader.format();

    let entries = reader.entries(ctx)?;
    tracing::debug!(format = %format, entries = entries.len(), "Enumerated archive entries");

    let entry = find_by_suffix(&entries, suffix)
        .ok_or_else(|| PreflightError::manifest_not_found(suffix))?;

    ctx.checkpoint("manifest extraction")?;
    let bytes = reader.read_entry(entry, ctx)?;
    tracing::debug!(path = %entry.path, bytes = bytes.len(), "Extracted manifest entry");

    Ok(ExtractedEntry {
        format,
        path: entry.path.clone(),
        bytes,
    })
}
