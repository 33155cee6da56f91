//! Kind-specific sub-codecs.
//!
//! Connections and VDBs are not stored as opaque bytes: a delegate turns the
//! archive payload into tree nodes on import and back into bytes on export.
//! Every other kind is a plain file copy.

mod connection;
mod vdb;

pub use connection::{Connection, ConnectionCodec, XmlConnectionCodec};
pub use vdb::{DynamicVdbDelegate, VdbDelegate, VdbDescriptor};

use crate::tree::TreeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("invalid {what} document: {reason}")]
    Invalid { what: &'static str, reason: String },

    #[error("{what} document is missing '{field}'")]
    MissingField {
        what: &'static str,
        field: &'static str,
    },

    #[error("failed to serialize {what}: {reason}")]
    Serialize { what: &'static str, reason: String },

    #[error("{what} property '{name}' uses a reserved name")]
    ReservedProperty { what: &'static str, name: String },

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// The delegates an importer or exporter dispatches to.
pub struct Delegates {
    pub connections: Box<dyn ConnectionCodec>,
    pub vdbs: Box<dyn VdbDelegate>,
}

impl Default for Delegates {
    fn default() -> Self {
        Self {
            connections: Box::new(XmlConnectionCodec),
            vdbs: Box::new(DynamicVdbDelegate),
        }
    }
}

impl std::fmt::Debug for Delegates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delegates").finish_non_exhaustive()
    }
}
