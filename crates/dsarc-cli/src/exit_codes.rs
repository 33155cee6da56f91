//! Exit codes of the `dsarc` binary.
//! These codes are part of the public contract; scripts may branch on them.

use dsarc_archive::archive::{ArchiveError, ErrorClass};
use dsarc_archive::codec::CodecError;
use dsarc_archive::config::ConfigError;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1; // I/O, corrupt zip, tree storage
pub const EXIT_CONTRACT: i32 = 2; // Manifest/archive contract or config error
pub const EXIT_SECURITY: i32 = 3; // Path traversal or resource limit
pub const EXIT_TARGET: i32 = 4; // Wrong export/import target node

pub fn for_archive_error(err: &ArchiveError) -> i32 {
    match err.class() {
        ErrorClass::Contract => match err {
            ArchiveError::NoServiceVdb { .. } | ArchiveError::NotDataService { .. } => EXIT_TARGET,
            _ => EXIT_CONTRACT,
        },
        ErrorClass::Security | ErrorClass::Limits => EXIT_SECURITY,
        ErrorClass::Integrity | ErrorClass::Storage => EXIT_FAILURE,
    }
}

/// Map an error chain to an exit code; the first archive error in the chain wins.
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(archive) = cause.downcast_ref::<ArchiveError>() {
            return for_archive_error(archive);
        }
        if cause.is::<CodecError>() || cause.is::<ConfigError>() {
            return EXIT_CONTRACT;
        }
    }
    EXIT_FAILURE
}
