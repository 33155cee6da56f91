//! Path-indexed archive buffer.
//!
//! The zip container is read exactly once. Every member is checked (path
//! shape, size limits, duplicates) and decompressed into memory, after which
//! the importer can look members up by path in any order.

use super::errors::{ArchiveError, ArchiveResult, ErrorCode};
use super::limits::{ArchiveLimits, LimitExceeded, LimitReader};
use crate::codec::MANIFEST_PATH;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;

/// One archive member, decompressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    path: String,
    is_dir: bool,
    data: Vec<u8>,
}

impl ArchiveMember {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// All members of one archive, in archive order, indexed by path.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    members: Vec<ArchiveMember>,
    by_path: HashMap<String, usize>,
}

impl ArchiveIndex {
    pub fn read(bytes: &[u8], limits: &ArchiveLimits) -> ArchiveResult<Self> {
        if bytes.len() as u64 > limits.max_archive_bytes {
            return Err(ArchiveError::limit(
                ErrorCode::LimitArchiveBytes,
                format!(
                    "archive size {} exceeds limit {}",
                    bytes.len(),
                    limits.max_archive_bytes
                ),
            ));
        }

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).map_err(zip_error)?;
        if zip.len() > limits.max_members {
            return Err(ArchiveError::limit(
                ErrorCode::LimitMemberCount,
                format!(
                    "archive has {} members, limit is {}",
                    zip.len(),
                    limits.max_members
                ),
            ));
        }

        let mut index = Self::default();
        let mut remaining = limits.max_decompressed_bytes;

        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(zip_error)?;
            let raw_name = file.name().to_string();
            let is_dir = file.is_dir();
            let path = check_member_path(&raw_name, limits)?;

            if index.by_path.contains_key(&path) {
                return Err(ArchiveError::DuplicateMember { path });
            }

            let data = if is_dir {
                Vec::new()
            } else {
                let (member_limit, code) = if path == MANIFEST_PATH {
                    (limits.max_manifest_bytes, ErrorCode::LimitManifestBytes)
                } else {
                    (limits.max_member_bytes, ErrorCode::LimitMemberBytes)
                };
                if file.size() > member_limit {
                    return Err(ArchiveError::limit(
                        code,
                        format!(
                            "{path}: declared size {} exceeds limit {member_limit}",
                            file.size()
                        ),
                    ));
                }
                let (limit, code) = if remaining < member_limit {
                    (remaining, ErrorCode::LimitDecompressedBytes)
                } else {
                    (member_limit, code)
                };
                let mut data = Vec::new();
                LimitReader::new(&mut file, limit, code)
                    .read_to_end(&mut data)
                    .map_err(|e| read_error(&path, e))?;
                remaining -= data.len() as u64;
                data
            };

            debug!(member = %path, bytes = data.len(), is_dir, "indexed archive member");
            index.by_path.insert(path.clone(), index.members.len());
            index.members.push(ArchiveMember { path, is_dir, data });
        }

        Ok(index)
    }

    /// Members in archive order.
    pub fn members(&self) -> &[ArchiveMember] {
        &self.members
    }

    pub fn get(&self, path: &str) -> Option<&ArchiveMember> {
        self.by_path.get(path).map(|&i| &self.members[i])
    }

    /// Payload of a non-directory member.
    pub fn payload(&self, path: &str) -> Option<&[u8]> {
        self.get(path).filter(|m| !m.is_dir).map(ArchiveMember::data)
    }

    pub fn manifest(&self) -> Option<&ArchiveMember> {
        self.get(MANIFEST_PATH).filter(|m| !m.is_dir)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Normalize a member name and reject unsafe shapes.
fn check_member_path(raw: &str, limits: &ArchiveLimits) -> ArchiveResult<String> {
    if raw.len() > limits.max_path_len {
        return Err(ArchiveError::limit(
            ErrorCode::LimitPathLength,
            format!(
                "path length {} exceeds limit {}",
                raw.len(),
                limits.max_path_len
            ),
        ));
    }

    let normalized = raw.replace('\\', "/");
    let has_drive = normalized.len() >= 2
        && normalized.as_bytes()[1] == b':'
        && normalized.as_bytes()[0].is_ascii_alphabetic();
    if normalized.starts_with('/') || has_drive {
        return Err(ArchiveError::Security {
            code: ErrorCode::SecurityAbsolutePath,
            path: raw.to_string(),
            message: "absolute member path".into(),
        });
    }
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(ArchiveError::Security {
            code: ErrorCode::SecurityPathTraversal,
            path: raw.to_string(),
            message: "parent-directory segment in member path".into(),
        });
    }

    let trimmed = normalized
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if normalized.ends_with('/') {
        Ok(format!("{trimmed}/"))
    } else {
        Ok(trimmed)
    }
}

fn zip_error(err: zip::result::ZipError) -> ArchiveError {
    ArchiveError::Zip {
        message: err.to_string(),
    }
}

fn read_error(path: &str, err: std::io::Error) -> ArchiveError {
    match LimitExceeded::from_io(&err) {
        Some(exceeded) => ArchiveError::limit(
            exceeded.code,
            format!("{path}: exceeded limit of {} bytes", exceeded.limit),
        ),
        None => ArchiveError::Io {
            path: path.to_string(),
            message: err.to_string(),
        },
    }
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_of(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in members {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn indexes_members_in_archive_order() {
        let bytes = zip_of(&[
            ("drivers/", b""),
            ("drivers/a.jar", b"jar"),
            ("META-INF/dataservice.xml", b"<dataservice name=\"x\"/>"),
        ]);
        let index = ArchiveIndex::read(&bytes, &ArchiveLimits::default()).unwrap();
        let paths: Vec<_> = index.members().iter().map(ArchiveMember::path).collect();
        assert_eq!(paths, ["drivers/", "drivers/a.jar", MANIFEST_PATH]);
        assert!(index.get("drivers/").unwrap().is_dir());
        assert_eq!(index.payload("drivers/a.jar"), Some(&b"jar"[..]));
        assert!(index.manifest().is_some());
    }

    #[test]
    fn rejects_traversal_and_absolute_paths() {
        for name in ["../evil.jar", "a/../../evil.jar", "/etc/passwd", "C:/win.ini"] {
            let err = check_member_path(name, &ArchiveLimits::default()).unwrap_err();
            assert!(
                matches!(
                    err.code(),
                    ErrorCode::SecurityPathTraversal | ErrorCode::SecurityAbsolutePath
                ),
                "{name}: {err}"
            );
        }
        assert_eq!(
            check_member_path("./drivers//a.jar", &ArchiveLimits::default()).unwrap(),
            "drivers/a.jar"
        );
    }

    #[test]
    fn enforces_member_limits() {
        let bytes = zip_of(&[("big.bin", &[0u8; 64])]);
        let limits = ArchiveLimits {
            max_member_bytes: 32,
            ..ArchiveLimits::default()
        };
        let err = ArchiveIndex::read(&bytes, &limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LimitMemberBytes);

        let limits = ArchiveLimits {
            max_members: 0,
            ..ArchiveLimits::default()
        };
        let err = ArchiveIndex::read(&bytes, &limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LimitMemberCount);
    }

    #[test]
    fn enforces_total_decompressed_budget() {
        let bytes = zip_of(&[("a.bin", &[1u8; 40]), ("b.bin", &[2u8; 40])]);
        let limits = ArchiveLimits {
            max_decompressed_bytes: 60,
            ..ArchiveLimits::default()
        };
        let err = ArchiveIndex::read(&bytes, &limits).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LimitDecompressedBytes);
    }

    #[test]
    fn garbage_is_a_zip_error() {
        let err = ArchiveIndex::read(b"not a zip", &ArchiveLimits::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IntegrityZip);
    }

    #[test]
    fn digest_format() {
        assert_eq!(
            sha256_digest(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
