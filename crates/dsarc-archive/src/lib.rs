pub mod archive;
pub mod codec;
pub mod config;
pub mod delegate;
pub mod manifest;
pub mod resolve;
pub mod tree;

// Convenience re-exports
pub use archive::{
    ArchiveError, ArchiveLimits, ArchiveResult, ArtifactKind, EntryStatus, ErrorClass, ErrorCode,
    ExportArtifact, ExportOutcome, Exporter, FileList, ImportReport, Importer, ManifestInfo,
};
pub use codec::{read_manifest, write_manifest, CodecError, WriteOptions, MANIFEST_PATH};
pub use config::{ArchiveConfig, ConfigError, ExportOptions, PropertyFilter};
pub use manifest::{Manifest, PublishPolicy};
pub use resolve::{ResolutionRoots, ResourceKind};
pub use tree::{ContentTree, MemoryTree, NodeId, NodeKind, TreeError};
