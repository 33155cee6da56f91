//! VDB delegate.

use super::DelegateError;
use crate::tree::{props, ContentTree, NodeId};
use quick_xml::events::Event;
use quick_xml::Reader;

const WHAT: &str = "vdb";

/// Identity attributes of a VDB document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VdbDescriptor {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Imports VDB payloads into tree nodes and exports them back to bytes.
pub trait VdbDelegate {
    /// Check `bytes` and extract the VDB identity without touching a tree.
    fn inspect(&self, bytes: &[u8]) -> Result<VdbDescriptor, DelegateError>;

    /// Populate `node` (already created with kind `vdb`) from `bytes`.
    fn import(
        &self,
        tree: &mut dyn ContentTree,
        node: NodeId,
        bytes: &[u8],
    ) -> Result<VdbDescriptor, DelegateError>;

    fn export(&self, tree: &dyn ContentTree, node: NodeId) -> Result<Vec<u8>, DelegateError>;
}

/// Dynamic VDB documents (`<vdb name=".." version="..">`), stored verbatim.
///
/// Model content is not interpreted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicVdbDelegate;

impl VdbDelegate for DynamicVdbDelegate {
    fn inspect(&self, bytes: &[u8]) -> Result<VdbDescriptor, DelegateError> {
        let mut reader = Reader::from_reader(bytes);
        loop {
            match reader.read_event().map_err(invalid)? {
                Event::Start(start) | Event::Empty(start) => {
                    if start.local_name().as_ref() != b"vdb" {
                        return Err(invalid(format!(
                            "root element is '{}', expected 'vdb'",
                            String::from_utf8_lossy(start.local_name().as_ref())
                        )));
                    }
                    let mut descriptor = VdbDescriptor::default();
                    for attribute in start.attributes() {
                        let attribute = attribute.map_err(invalid)?;
                        let value = attribute.unescape_value().map_err(invalid)?.into_owned();
                        match attribute.key.local_name().as_ref() {
                            b"name" => descriptor.name = Some(value),
                            b"version" => descriptor.version = Some(value),
                            _ => {}
                        }
                    }
                    return Ok(descriptor);
                }
                Event::Eof => return Err(invalid("document has no root element")),
                _ => {}
            }
        }
    }

    fn import(
        &self,
        tree: &mut dyn ContentTree,
        node: NodeId,
        bytes: &[u8],
    ) -> Result<VdbDescriptor, DelegateError> {
        let descriptor = self.inspect(bytes)?;
        tree.set_content(node, bytes.to_vec())?;
        tree.set_property(node, props::VDB_NAME, descriptor.name.as_deref())?;
        tree.set_property(node, props::VDB_VERSION, descriptor.version.as_deref())?;
        Ok(descriptor)
    }

    fn export(&self, tree: &dyn ContentTree, node: NodeId) -> Result<Vec<u8>, DelegateError> {
        tree.content(node)?
            .map(<[u8]>::to_vec)
            .ok_or(DelegateError::MissingField {
                what: WHAT,
                field: "content",
            })
    }
}

fn invalid(reason: impl std::fmt::Display) -> DelegateError {
    DelegateError::Invalid {
        what: WHAT,
        reason: reason.to_string(),
    }
}
