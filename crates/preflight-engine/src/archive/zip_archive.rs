//! ZIP container reader (`.ipa` bundles are ZIP files).

use super::limits::{abort_or, ArchiveLimits, LimitReader};
use super::{ArchiveFormat, ArchiveReader, EntryInfo};
use crate::context::{ContextReader, RequestContext};
use crate::error::{LimitKind, PreflightError, PreflightResult};
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

/// Reader over an in-memory ZIP archive.
///
/// Opening parses the central directory only; entry content is decompressed on
/// demand by [`ArchiveReader::read_entry`].
pub struct ZipArchiveReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    limits: ArchiveLimits,
}

impl<'a> ZipArchiveReader<'a> {
    pub fn new(data: &'a [u8], limits: ArchiveLimits) -> PreflightResult<Self> {
        let archive = ZipArchive::new(Cursor::new(data)).map_err(map_zip_error)?;
        limits.check_entry_count(archive.len())?;
        Ok(Self { archive, limits })
    }
}

impl ArchiveReader for ZipArchiveReader<'_> {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn entries(&mut self, ctx: &RequestContext) -> PreflightResult<Vec<EntryInfo>> {
        ctx.checkpoint("archive enumeration")?;

        let mut entries = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let file = self
                .archive
                .by_index_raw(index)
                .map_err(|e| map_zip_error(e).with_context(format!("entry #{}", index)))?;
            let path = file.name().to_string();
            self.limits.check_path(&path)?;
            entries.push(EntryInfo {
                index,
                size: file.size(),
                is_dir: file.is_dir(),
                path,
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, entry: &EntryInfo, ctx: &RequestContext) -> PreflightResult<Vec<u8>> {
        ctx.checkpoint("entry decompression")?;
        self.limits.check_declared_size(&entry.path, entry.size)?;

        let file = self
            .archive
            .by_index(entry.index)
            .map_err(|e| map_zip_error(e).with_context(format!("entry '{}'", entry.path)))?;
        if file.name() != entry.path {
            return Err(PreflightError::internal(format!(
                "entry #{} changed name while reading",
                entry.index
            )));
        }

        let limited = LimitReader::new(
            file,
            self.limits.max_entry_bytes,
            LimitKind::EntryBytes,
            format!("entry '{}'", entry.path),
        );
        let mut reader = ContextReader::new(limited, ctx);

        let mut content = Vec::with_capacity(entry.size.min(self.limits.max_entry_bytes) as usize);
        reader.read_to_end(&mut content).map_err(|e| {
            abort_or(e, |e| {
                PreflightError::invalid_archive(format!(
                    "failed to decompress '{}': {}",
                    entry.path, e
                ))
            })
        })?;
        Ok(content)
    }
}

fn map_zip_error(err: ZipError) -> PreflightError {
    match err {
        ZipError::Io(io) => abort_or(io, |io| {
            PreflightError::invalid_archive(format!("zip i/o error: {}", io))
        }),
        other => PreflightError::invalid_archive(format!("malformed zip: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn lists_entries_in_order() {
        let data = build_zip(&[("a.txt", b"a"), ("dir/b.txt", b"bb")]);
        let mut reader = ZipArchiveReader::new(&data, ArchiveLimits::default()).unwrap();
        let entries = reader.entries(&RequestContext::new()).unwrap();

        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "dir/b.txt"]);
        assert_eq!(entries[1].size, 2);
        assert_eq!(reader.format(), ArchiveFormat::Zip);
    }

    #[test]
    fn reads_entry_content() {
        let data = build_zip(&[("x/Info.plist", b"hello plist")]);
        let mut reader = ZipArchiveReader::new(&data, ArchiveLimits::default()).unwrap();
        let ctx = RequestContext::new();
        let entries = reader.entries(&ctx).unwrap();
        let content = reader.read_entry(&entries[0], &ctx).unwrap();
        assert_eq!(content, b"hello plist");
    }

    #[test]
    fn declared_size_over_limit_is_rejected() {
        let big = vec![b'a'; 4096];
        let data = build_zip(&[("Info.plist", &big)]);
        let limits = ArchiveLimits {
            max_entry_bytes: 1024,
            ..Default::default()
        };
        let mut reader = ZipArchiveReader::new(&data, limits).unwrap();
        let ctx = RequestContext::new();
        let entries = reader.entries(&ctx).unwrap();
        let err = reader.read_entry(&entries[0], &ctx).unwrap_err();
        assert!(err.is_limit(LimitKind::EntryBytes));
    }

    #[test]
    fn too_many_entries_is_rejected() {
        let data = build_zip(&[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let limits = ArchiveLimits {
            max_entries: 2,
            ..Default::default()
        };
        let err = ZipArchiveReader::new(&data, limits).err().unwrap();
        assert!(err.is_limit(LimitKind::EntryCount));
    }

    #[test]
    fn truncated_zip_is_invalid() {
        let data = build_zip(&[("Info.plist", b"content that will be cut")]);
        let truncated = &data[..data.len() / 2];
        let err = ZipArchiveReader::new(truncated, ArchiveLimits::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArchive);
    }

    #[test]
    fn long_paths_hit_path_limit() {
        let long = "d/".repeat(40) + "Info.plist";
        let data = build_zip(&[(long.as_str(), b"x")]);
        let limits = ArchiveLimits {
            max_path_len: 32,
            ..Default::default()
        };
        let mut reader = ZipArchiveReader::new(&data, limits).unwrap();
        let err = reader.entries(&RequestContext::new()).unwrap_err();
        assert!(err.is_limit(LimitKind::PathLength));
    }
}
