//! Resource limits and bounded readers for archive ingestion.

use super::errors::{ArchiveError, ErrorCode};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::io::Read;

/// Resource limits applied while indexing an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_archive_bytes: u64,
    pub max_decompressed_bytes: u64,
    pub max_manifest_bytes: u64,
    pub max_member_bytes: u64,
    pub max_members: usize,
    pub max_path_len: usize,
    pub max_xml_depth: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_archive_bytes: 256 * 1024 * 1024,       // 256 MB compressed
            max_decompressed_bytes: 1024 * 1024 * 1024, // 1 GB uncompressed
            max_manifest_bytes: 4 * 1024 * 1024,        // 4 MB
            max_member_bytes: 256 * 1024 * 1024,        // 256 MB
            max_members: 20_000,
            max_path_len: 512,
            max_xml_depth: 64,
        }
    }
}

/// Partial overrides for `ArchiveLimits`. Used for CLI/config YAML parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveLimitsOverrides {
    pub max_archive_bytes: Option<u64>,
    pub max_decompressed_bytes: Option<u64>,
    pub max_manifest_bytes: Option<u64>,
    pub max_member_bytes: Option<u64>,
    pub max_members: Option<usize>,
    pub max_path_len: Option<usize>,
    pub max_xml_depth: Option<usize>,
}

impl ArchiveLimits {
    /// Apply overrides onto these defaults. Only `Some` values override.
    pub fn apply(self, overrides: &ArchiveLimitsOverrides) -> Self {
        Self {
            max_archive_bytes: overrides.max_archive_bytes.unwrap_or(self.max_archive_bytes),
            max_decompressed_bytes: overrides
                .max_decompressed_bytes
                .unwrap_or(self.max_decompressed_bytes),
            max_manifest_bytes: overrides
                .max_manifest_bytes
                .unwrap_or(self.max_manifest_bytes),
            max_member_bytes: overrides.max_member_bytes.unwrap_or(self.max_member_bytes),
            max_members: overrides.max_members.unwrap_or(self.max_members),
            max_path_len: overrides.max_path_len.unwrap_or(self.max_path_len),
            max_xml_depth: overrides.max_xml_depth.unwrap_or(self.max_xml_depth),
        }
    }
}

/// Payload of the I/O error raised by [`LimitReader`].
#[derive(Debug, thiserror::Error)]
#[error("{code}: exceeded limit of {limit} bytes")]
pub(crate) struct LimitExceeded {
    pub(crate) code: ErrorCode,
    pub(crate) limit: u64,
}

impl LimitExceeded {
    /// Recover the limit violation from an I/O error, if that is what it is.
    pub(crate) fn from_io(err: &std::io::Error) -> Option<&Self> {
        err.get_ref().and_then(|inner| inner.downcast_ref::<Self>())
    }
}

/// A reader that yields at most `limit` bytes and fails explicitly when the
/// source has more.
pub(crate) struct LimitReader<R> {
    inner: R,
    limit: u64,
    read: u64,
    code: ErrorCode,
}

impl<R: Read> LimitReader<R> {
    pub(crate) fn new(inner: R, limit: u64, code: ErrorCode) -> Self {
        Self {
            inner,
            limit,
            read: 0,
            code,
        }
    }
}

impl<R: Read> Read for LimitReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read >= self.limit {
            // Exactly at the limit is fine as long as the source is exhausted.
            let mut extra = [0u8; 1];
            return match self.inner.read(&mut extra)? {
                0 => Ok(0),
                _ => Err(std::io::Error::other(LimitExceeded {
                    code: self.code,
                    limit: self.limit,
                })),
            };
        }

        let max_to_read = (self.limit - self.read).min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max_to_read])?;
        self.read += n as u64;

        Ok(n)
    }
}

/// Reject XML documents nested deeper than `max_depth`.
///
/// Syntax errors are left to the real parser.
pub(crate) fn check_xml_depth(bytes: &[u8], max_depth: usize, path: &str) -> Result<(), ArchiveError> {
    let mut reader = Reader::from_reader(bytes);
    let mut depth = 0usize;
    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                depth += 1;
                if depth > max_depth {
                    return Err(ArchiveError::limit(
                        ErrorCode::LimitXmlDepth,
                        format!("{path}: XML nesting exceeds depth limit {max_depth}"),
                    ));
                }
            }
            Ok(Event::End(_)) => depth = depth.saturating_sub(1),
            Ok(Event::Eof) | Err(_) => return Ok(()),
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn limit_reader_allows_exact_size() {
        let mut out = Vec::new();
        let mut reader = LimitReader::new(Cursor::new(vec![7u8; 16]), 16, ErrorCode::LimitMemberBytes);
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn limit_reader_fails_on_overflow() {
        let mut out = Vec::new();
        let mut reader = LimitReader::new(Cursor::new(vec![7u8; 17]), 16, ErrorCode::LimitMemberBytes);
        let err = reader.read_to_end(&mut out).unwrap_err();
        let exceeded = LimitExceeded::from_io(&err).unwrap();
        assert_eq!(exceeded.code, ErrorCode::LimitMemberBytes);
        assert_eq!(exceeded.limit, 16);
    }

    #[test]
    fn overrides_apply_only_set_fields() {
        let limits = ArchiveLimits::default().apply(&ArchiveLimitsOverrides {
            max_members: Some(3),
            ..Default::default()
        });
        assert_eq!(limits.max_members, 3);
        assert_eq!(limits.max_path_len, ArchiveLimits::default().max_path_len);
    }

    #[test]
    fn overrides_reject_unknown_keys() {
        let parsed: Result<ArchiveLimitsOverrides, _> = serde_yaml::from_str("max_bytes: 1");
        assert!(parsed.is_err());
    }

    #[test]
    fn depth_check() {
        let doc = b"<a><b><c/></b></a>";
        assert!(check_xml_depth(doc, 2, "x.xml").is_ok());
        let doc = b"<a><b><c></c></b></a>";
        let err = check_xml_depth(doc, 2, "x.xml").unwrap_err();
        assert_eq!(err.code(), ErrorCode::LimitXmlDepth);
    }
}
