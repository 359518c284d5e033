//! gzip-compressed tar reader.
//!
//! Tar has no central directory, so listing and reading both stream the archive
//! from the start. The decompressed stream as a whole is capped by
//! `max_decoded_bytes`, each entry by `max_entry_bytes`.

use super::limits::{abort_or, ArchiveLimits, LimitReader};
use super::{ArchiveFormat, ArchiveReader, EntryInfo};
use crate::context::{ContextReader, RequestContext};
use crate::error::{LimitKind, PreflightError, PreflightResult};
use flate2::read::GzDecoder;
use std::io::Read;

type TarStream<'a, 'c> = tar::Archive<ContextReader<'c, LimitReader<GzDecoder<&'a [u8]>>>>;

/// Reader over an in-memory `.tar.gz` archive.
pub struct TarGzArchiveReader<'a> {
    data: &'a [u8],
    limits: ArchiveLimits,
}

impl<'a> TarGzArchiveReader<'a> {
    pub fn new(data: &'a [u8], limits: ArchiveLimits) -> Self {
        Self { data, limits }
    }

    fn open_stream<'c>(&self, ctx: &'c RequestContext) -> TarStream<'a, 'c> {
        let decoder = GzDecoder::new(self.data);
        let limited = LimitReader::new(
            decoder,
            self.limits.max_decoded_bytes,
            LimitKind::DecodedBytes,
            "decompressed archive stream",
        );
        tar::Archive::new(ContextReader::new(limited, ctx))
    }
}

impl ArchiveReader for TarGzArchiveReader<'_> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::TarGz
    }

    fn entries(&mut self, ctx: &RequestContext) -> PreflightResult<Vec<EntryInfo>> {
        ctx.checkpoint("archive enumeration")?;

        let mut archive = self.open_stream(ctx);
        let iter = archive
            .entries()
            .map_err(|e| map_tar_error(e, "gzip/tar stream"))?;

        let mut entries = Vec::new();
        for (index, entry) in iter.enumerate() {
            self.limits.check_entry_count(index + 1)?;
            let entry = entry.map_err(|e| map_tar_error(e, &format!("entry #{}", index)))?;
            let path = entry
                .path()
                .map_err(|e| map_tar_error(e, &format!("entry #{} path", index)))?
                .to_string_lossy()
                .into_owned();
            self.limits.check_path(&path)?;
            entries.push(EntryInfo {
                index,
                size: entry.size(),
                is_dir: entry.header().entry_type().is_dir(),
                path,
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, entry: &EntryInfo, ctx: &RequestContext) -> PreflightResult<Vec<u8>> {
        ctx.checkpoint("entry decompression")?;
        self.limits.check_declared_size(&entry.path, entry.size)?;

        let mut archive = self.open_stream(ctx);
        let iter = archive
            .entries()
            .map_err(|e| map_tar_error(e, "gzip/tar stream"))?;

        for (index, candidate) in iter.enumerate() {
            let mut candidate =
                candidate.map_err(|e| map_tar_error(e, &format!("entry #{}", index)))?;
            if index != entry.index {
                continue;
            }

            let mut limited = LimitReader::new(
                &mut candidate,
                self.limits.max_entry_bytes,
                LimitKind::EntryBytes,
                format!("entry '{}'", entry.path),
            );
            let mut content = Vec::with_capacity(entry.size as usize);
            limited
                .read_to_end(&mut content)
                .map_err(|e| map_tar_error(e, &format!("entry '{}'", entry.path)))?;
            return Ok(content);
        }

        Err(PreflightError::internal(format!(
            "entry #{} disappeared while re-reading the archive",
            entry.index
        )))
    }
}

fn map_tar_error(err: std::io::Error, what: &str) -> PreflightError {
    abort_or(err, |e| {
        PreflightError::invalid_archive(format!("{}: {}", what, e)).with_source(e)
    })
}
