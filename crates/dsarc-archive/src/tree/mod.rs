//! Content tree adapter.
//!
//! Import writes into, and export reads from, a hierarchical content tree of
//! typed nodes carrying string properties and optional binary content. The
//! archive engine only talks to the tree through [`ContentTree`]; the
//! bundled [`MemoryTree`] is an arena implementation with JSON persistence.
//!
//! # Node layout after import
//!
//! ```text
//! <data service>            kind=data_service  dsarc:description, ...
//!   product-view-vdb.xml    kind=service_vdb_entry  dsarc:reference -> vdbs/product-view-vdb.xml
//!     twitter-vdb.xml       kind=vdb_entry (dependency)
//!   driver1.jar             kind=driver_entry  dsarc:reference -> drivers/driver1.jar
//! drivers/
//!   driver1.jar             kind=driver_file   <content>
//! ```

mod memory;

pub use memory::MemoryTree;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Property names written by the archive engine.
///
/// All carry the `dsarc:` prefix; export never echoes them as manifest
/// properties.
pub mod props {
    pub const PREFIX: &str = "dsarc:";
    pub const PATH: &str = "dsarc:path";
    pub const PUBLISH_POLICY: &str = "dsarc:publishPolicy";
    pub const JNDI_NAME: &str = "dsarc:jndiName";
    pub const VDB_NAME: &str = "dsarc:vdbName";
    pub const VDB_VERSION: &str = "dsarc:vdbVersion";
    pub const REFERENCE: &str = "dsarc:reference";
    pub const DESCRIPTION: &str = "dsarc:description";
    pub const LAST_MODIFIED: &str = "dsarc:lastModified";
    pub const MODIFIED_BY: &str = "dsarc:modifiedBy";
    pub const NAME: &str = "dsarc:name";
    pub const DRIVER_NAME: &str = "dsarc:driverName";
    pub const JDBC: &str = "dsarc:jdbc";
    /// JSON array of the manifest property names in document order.
    pub const PROPERTY_ORDER: &str = "dsarc:propertyOrder";

    pub fn is_internal(name: &str) -> bool {
        name.starts_with(PREFIX)
    }
}

/// Handle to a node inside one tree instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Node types known to the archive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    DataService,
    ServiceVdbEntry,
    VdbEntry,
    ConnectionEntry,
    DriverEntry,
    MetadataEntry,
    UdfEntry,
    ResourceEntry,
    Vdb,
    Connection,
    DriverFile,
    DdlFile,
    UdfFile,
    ResourceFile,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::DataService => "data_service",
            Self::ServiceVdbEntry => "service_vdb_entry",
            Self::VdbEntry => "vdb_entry",
            Self::ConnectionEntry => "connection_entry",
            Self::DriverEntry => "driver_entry",
            Self::MetadataEntry => "metadata_entry",
            Self::UdfEntry => "udf_entry",
            Self::ResourceEntry => "resource_entry",
            Self::Vdb => "vdb",
            Self::Connection => "connection",
            Self::DriverFile => "driver_file",
            Self::DdlFile => "ddl_file",
            Self::UdfFile => "udf_file",
            Self::ResourceFile => "resource_file",
        }
    }

    /// Entry nodes live under a data service and describe a manifest entry.
    pub fn is_entry(self) -> bool {
        matches!(
            self,
            Self::ServiceVdbEntry
                | Self::VdbEntry
                | Self::ConnectionEntry
                | Self::DriverEntry
                | Self::MetadataEntry
                | Self::UdfEntry
                | Self::ResourceEntry
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("unknown node {node}")]
    UnknownNode { node: NodeId },

    #[error("the root node cannot be removed")]
    RootRemoval,

    #[error("invalid node name '{name}'")]
    InvalidName { name: String },

    #[error("node {node} has kind {kind}, expected {expected}")]
    WrongKind {
        node: NodeId,
        kind: NodeKind,
        expected: NodeKind,
    },

    #[error("tree persistence failed: {message}")]
    Persist { message: String },
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Operations the archive engine needs from a content tree.
///
/// Names are not unique among siblings; lookups return the first match in
/// creation order.
pub trait ContentTree {
    fn root(&self) -> NodeId;

    fn create_child(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> TreeResult<NodeId>;

    /// Remove `node` and its whole subtree.
    fn remove(&mut self, node: NodeId) -> TreeResult<()>;

    fn name(&self, node: NodeId) -> TreeResult<&str>;

    fn kind(&self, node: NodeId) -> TreeResult<NodeKind>;

    fn parent(&self, node: NodeId) -> TreeResult<Option<NodeId>>;

    fn children(&self, node: NodeId) -> TreeResult<Vec<NodeId>>;

    fn property(&self, node: NodeId, name: &str) -> TreeResult<Option<&str>>;

    /// Set a property; `None` removes it.
    fn set_property(&mut self, node: NodeId, name: &str, value: Option<&str>) -> TreeResult<()>;

    /// Property names in sorted order.
    fn property_names(&self, node: NodeId) -> TreeResult<Vec<String>>;

    fn content(&self, node: NodeId) -> TreeResult<Option<&[u8]>>;

    fn set_content(&mut self, node: NodeId, bytes: Vec<u8>) -> TreeResult<()>;

    /// Stable identifier, valid across persistence round trips.
    fn identifier(&self, node: NodeId) -> TreeResult<&str>;

    fn resolve_reference(&self, identifier: &str) -> Option<NodeId>;

    fn find_child(&self, parent: NodeId, name: &str, kind: NodeKind) -> TreeResult<Option<NodeId>> {
        for child in self.children(parent)? {
            if self.name(child)? == name && self.kind(child)? == kind {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Resolve a `/`-separated path of names from the root, any kind.
    fn lookup(&self, path: &str) -> Option<NodeId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let children = self.children(current).ok()?;
            current = children
                .into_iter()
                .find(|&c| self.name(c).map(|n| n == segment).unwrap_or(false))?;
        }
        Some(current)
    }

    /// Resolve `path` from the root, creating missing folders.
    fn ensure_folder(&mut self, path: &str) -> TreeResult<NodeId> {
        let mut current = self.root();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = match self.find_child(current, segment, NodeKind::Folder)? {
                Some(existing) => existing,
                None => self.create_child(current, segment, NodeKind::Folder)?,
            };
        }
        Ok(current)
    }

    /// `/`-joined names from the root down to `node`.
    fn path_of(&self, node: NodeId) -> TreeResult<String> {
        let mut segments = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root() {
                break;
            }
            segments.push(self.name(id)?.to_string());
            current = self.parent(id)?;
        }
        segments.reverse();
        Ok(segments.join("/"))
    }

    /// Fail unless `node` has the expected kind.
    fn expect_kind(&self, node: NodeId, expected: NodeKind) -> TreeResult<()> {
        let kind = self.kind(node)?;
        if kind == expected {
            Ok(())
        } else {
            Err(TreeError::WrongKind {
                node,
                kind,
                expected,
            })
        }
    }
}
