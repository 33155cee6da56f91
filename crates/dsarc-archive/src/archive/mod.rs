//! Data service archive import and export.
//!
//! An archive is a zip whose `META-INF/dataservice.xml` manifest declares
//! every payload the data service depends on. Import buffers and indexes the
//! whole archive before the tree is touched; export rebuilds the manifest
//! from the tree and writes a deterministic zip.

pub mod errors;
pub mod export;
pub mod import;
pub mod index;
pub mod limits;
pub(crate) mod zip_write;

pub use errors::{ArchiveError, ArchiveResult, ErrorClass, ErrorCode};
pub use export::{ArtifactKind, ExportArtifact, ExportOutcome, Exporter, FileList};
pub use import::{EntryOutcome, EntryStatus, ImportReport, Importer, ManifestInfo};
pub use index::{sha256_digest, ArchiveIndex, ArchiveMember};
pub use limits::{ArchiveLimits, ArchiveLimitsOverrides};
