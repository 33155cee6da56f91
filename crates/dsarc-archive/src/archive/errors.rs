//! Archive import/export errors with stable codes.

use crate::codec::SchemaError;
use crate::delegate::DelegateError;
use crate::tree::{NodeId, TreeError};
use serde::Serialize;
use thiserror::Error;

/// High-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    /// Corrupted zip container or unreadable member.
    Integrity,
    /// The archive or manifest breaks the data service contract.
    Contract,
    /// Path traversal or absolute member paths.
    Security,
    /// Resource limit exceeded.
    Limits,
    /// The content tree rejected an operation.
    Storage,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    // Integrity
    IntegrityZip,
    IntegrityIo,
    // Contract
    ContractMissingManifest,
    ContractSchemaValidation,
    ContractMalformedManifest,
    ContractDuplicateMember,
    ContractDelegateImport,
    ContractDelegateExport,
    ContractMissingReference,
    ContractNoServiceVdb,
    ContractNotDataService,
    // Limits
    LimitArchiveBytes,
    LimitDecompressedBytes,
    LimitManifestBytes,
    LimitMemberBytes,
    LimitMemberCount,
    LimitPathLength,
    LimitXmlDepth,
    // Security
    SecurityPathTraversal,
    SecurityAbsolutePath,
    // Storage
    StorageTree,
}

impl ErrorCode {
    pub fn class(self) -> ErrorClass {
        match self {
            Self::IntegrityZip | Self::IntegrityIo => ErrorClass::Integrity,
            Self::ContractMissingManifest
            | Self::ContractSchemaValidation
            | Self::ContractMalformedManifest
            | Self::ContractDuplicateMember
            | Self::ContractDelegateImport
            | Self::ContractDelegateExport
            | Self::ContractMissingReference
            | Self::ContractNoServiceVdb
            | Self::ContractNotDataService => ErrorClass::Contract,
            Self::LimitArchiveBytes
            | Self::LimitDecompressedBytes
            | Self::LimitManifestBytes
            | Self::LimitMemberBytes
            | Self::LimitMemberCount
            | Self::LimitPathLength
            | Self::LimitXmlDepth => ErrorClass::Limits,
            Self::SecurityPathTraversal | Self::SecurityAbsolutePath => ErrorClass::Security,
            Self::StorageTree => ErrorClass::Storage,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised by the importer, the exporter and the archive index.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{member}: schema validation failed: {source}")]
    SchemaValidation {
        member: String,
        #[source]
        source: SchemaError,
    },

    #[error("{member}: malformed manifest: {reason}")]
    MalformedManifest { member: String, reason: String },

    #[error("archive has no manifest at '{expected}'")]
    MissingManifest { expected: &'static str },

    #[error("{path}: import delegate failed: {source}")]
    DelegateImport {
        path: String,
        #[source]
        source: DelegateError,
    },

    #[error("{path}: export delegate failed: {source}")]
    DelegateExport {
        path: String,
        #[source]
        source: DelegateError,
    },

    #[error("{path}: referenced resource cannot be resolved")]
    MissingReference { path: String },

    #[error("data service '{name}' has no service VDB")]
    NoServiceVdb { name: String },

    #[error("node {node} is not a data service")]
    NotDataService { node: NodeId },

    #[error("{path}: duplicate archive member")]
    DuplicateMember { path: String },

    #[error("{path}: {message}")]
    Security {
        code: ErrorCode,
        path: String,
        message: String,
    },

    #[error("{message}")]
    Limit { code: ErrorCode, message: String },

    #[error("zip container error: {message}")]
    Zip { message: String },

    #[error("{path}: failed to read member: {message}")]
    Io { path: String, message: String },

    #[error("failed to write archive: {message}")]
    Write { message: String },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl ArchiveError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SchemaValidation { .. } => ErrorCode::ContractSchemaValidation,
            Self::MalformedManifest { .. } => ErrorCode::ContractMalformedManifest,
            Self::MissingManifest { .. } => ErrorCode::ContractMissingManifest,
            Self::DelegateImport { .. } => ErrorCode::ContractDelegateImport,
            Self::DelegateExport { .. } => ErrorCode::ContractDelegateExport,
            Self::MissingReference { .. } => ErrorCode::ContractMissingReference,
            Self::NoServiceVdb { .. } => ErrorCode::ContractNoServiceVdb,
            Self::NotDataService { .. } => ErrorCode::ContractNotDataService,
            Self::DuplicateMember { .. } => ErrorCode::ContractDuplicateMember,
            Self::Security { code, .. } | Self::Limit { code, .. } => *code,
            Self::Zip { .. } => ErrorCode::IntegrityZip,
            Self::Io { .. } | Self::Write { .. } => ErrorCode::IntegrityIo,
            Self::Tree(_) => ErrorCode::StorageTree,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.code().class()
    }

    /// True for errors raised before anything was written to the tree.
    pub fn is_pre_materialization(&self) -> bool {
        matches!(
            self,
            Self::SchemaValidation { .. }
                | Self::MalformedManifest { .. }
                | Self::MissingManifest { .. }
                | Self::DuplicateMember { .. }
                | Self::Security { .. }
                | Self::Limit { .. }
                | Self::Zip { .. }
                | Self::Io { .. }
        )
    }

    /// Suggested exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self.class() {
            ErrorClass::Contract => match self {
                Self::NoServiceVdb { .. } | Self::NotDataService { .. } => 4,
                _ => 2,
            },
            ErrorClass::Security | ErrorClass::Limits => 3,
            ErrorClass::Integrity | ErrorClass::Storage => 1,
        }
    }

    pub(crate) fn limit(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Limit {
            code,
            message: message.into(),
        }
    }
}
