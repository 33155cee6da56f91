use super::errors::{ArchiveError, ArchiveResult};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Zip writer whose output depends only on the members written to it.
pub(crate) struct DeterministicZip {
    inner: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    names: HashSet<String>,
}

impl DeterministicZip {
    pub(crate) fn new() -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        Self {
            inner: ZipWriter::new(Cursor::new(Vec::new())),
            options,
            names: HashSet::new(),
        }
    }

    /// Add one member; a path already written is refused.
    pub(crate) fn write_entry(&mut self, path: &str, data: &[u8]) -> ArchiveResult<()> {
        if !self.names.insert(path.to_string()) {
            return Err(ArchiveError::DuplicateMember {
                path: path.to_string(),
            });
        }
        self.inner
            .start_file(path, self.options)
            .map_err(write_error)?;
        self.inner.write_all(data).map_err(write_error)?;
        Ok(())
    }

    pub(crate) fn finish(self) -> ArchiveResult<Vec<u8>> {
        Ok(self.inner.finish().map_err(write_error)?.into_inner())
    }
}

fn write_error(err: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Write {
        message: err.to_string(),
    }
}
