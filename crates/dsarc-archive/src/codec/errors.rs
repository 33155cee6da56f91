//! Error types and limits for manifest validation and parsing.

use std::fmt;
use thiserror::Error;

/// Upper bound on declared entries in one manifest.
pub const MAX_MANIFEST_ENTRIES: usize = 10_000;

/// Uniqueness constraints encoded in the manifest schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    ArchivePath,
    JndiName,
    PropertyName,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ArchivePath => "archive path",
            Self::JndiName => "JNDI name",
            Self::PropertyName => "property name",
        })
    }
}

/// The manifest does not conform to the schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("document has no root element")]
    NoRoot,

    #[error("root element must be 'dataservice', found '{found}'")]
    UnexpectedRoot { found: String },

    #[error("element '{element}' is not allowed inside '{parent}'")]
    UnexpectedElement { element: String, parent: String },

    #[error("element '{element}' is out of order inside '{parent}'")]
    OutOfOrder { element: String, parent: String },

    #[error("element '{element}' may appear at most once inside '{parent}'")]
    Repeated { element: String, parent: String },

    #[error("element '{element}' is missing required attribute '{attribute}'")]
    MissingAttribute { element: String, attribute: String },

    #[error("attribute '{attribute}' is not allowed on '{element}'")]
    UnexpectedAttribute { element: String, attribute: String },

    #[error("invalid value '{value}' for {element}/@{attribute}: {reason}")]
    InvalidValue {
        element: String,
        attribute: String,
        value: String,
        reason: String,
    },

    #[error("invalid content '{value}' in element '{element}': {reason}")]
    InvalidContent {
        element: String,
        value: String,
        reason: String,
    },

    #[error("element '{element}' must not contain text")]
    UnexpectedText { element: String },

    #[error("duplicate {constraint} '{value}'")]
    Duplicate { constraint: Constraint, value: String },

    #[error("manifest declares more than {MAX_MANIFEST_ENTRIES} entries")]
    TooManyEntries,
}

/// Errors produced by the manifest reader and writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("schema validation failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("malformed manifest: {reason}")]
    Malformed { reason: String },

    #[error("failed to write manifest: {message}")]
    Write { message: String },
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
