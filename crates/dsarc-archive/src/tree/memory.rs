//! In-memory arena implementation of [`ContentTree`].

use super::{ContentTree, NodeId, NodeKind, TreeError, TreeResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Node {
    id: String,
    name: String,
    kind: NodeKind,
    parent: Option<usize>,
    children: Vec<usize>,
    properties: BTreeMap<String, String>,
    content: Option<Vec<u8>>,
}

/// Arena-backed content tree.
///
/// Removed slots stay `None`, so `NodeId`s handed out earlier never alias a
/// different node. Identifiers are UUID v4 strings and survive
/// [`to_json`](Self::to_json) / [`from_json`](Self::from_json).
#[derive(Debug, Clone)]
pub struct MemoryTree {
    nodes: Vec<Option<Node>>,
    by_id: HashMap<String, usize>,
}

impl Default for MemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTree {
    pub fn new() -> Self {
        let root = Node {
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            kind: NodeKind::Folder,
            parent: None,
            children: Vec::new(),
            properties: BTreeMap::new(),
            content: None,
        };
        let mut by_id = HashMap::new();
        by_id.insert(root.id.clone(), 0);
        Self {
            nodes: vec![Some(root)],
            by_id,
        }
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::UnknownNode { node: id })
    }

    fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode { node: id })
    }

    pub fn to_json(&self, pretty: bool) -> TreeResult<String> {
        let record = self.record(0)?;
        let result = if pretty {
            serde_json::to_string_pretty(&record)
        } else {
            serde_json::to_string(&record)
        };
        result.map_err(persist)
    }

    pub fn from_json(json: &str) -> TreeResult<Self> {
        let record: NodeRecord = serde_json::from_str(json).map_err(persist)?;
        let mut tree = Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
        };
        tree.restore(record, None)?;
        Ok(tree)
    }

    fn record(&self, index: usize) -> TreeResult<NodeRecord> {
        let node = self.node(NodeId(index))?;
        let children = node
            .children
            .iter()
            .map(|&c| self.record(c))
            .collect::<TreeResult<Vec<_>>>()?;
        Ok(NodeRecord {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            properties: node.properties.clone(),
            content: node.content.as_ref().map(|c| BASE64.encode(c)),
            children,
        })
    }

    fn restore(&mut self, record: NodeRecord, parent: Option<usize>) -> TreeResult<usize> {
        if self.by_id.contains_key(&record.id) {
            return Err(TreeError::Persist {
                message: format!("duplicate node identifier '{}'", record.id),
            });
        }
        let content = match record.content {
            Some(encoded) => Some(BASE64.decode(encoded.as_bytes()).map_err(persist)?),
            None => None,
        };
        let index = self.nodes.len();
        self.by_id.insert(record.id.clone(), index);
        self.nodes.push(Some(Node {
            id: record.id,
            name: record.name,
            kind: record.kind,
            parent,
            children: Vec::new(),
            properties: record.properties,
            content,
        }));
        for child in record.children {
            let child_index = self.restore(child, Some(index))?;
            self.node_mut(NodeId(index))?.children.push(child_index);
        }
        Ok(index)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    id: String,
    name: String,
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeRecord>,
}

fn persist<E: std::fmt::Display>(err: E) -> TreeError {
    TreeError::Persist {
        message: err.to_string(),
    }
}

impl ContentTree for MemoryTree {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn create_child(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> TreeResult<NodeId> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(TreeError::InvalidName {
                name: name.to_string(),
            });
        }
        self.node(parent)?;
        let index = self.nodes.len();
        let id = Uuid::new_v4().to_string();
        self.by_id.insert(id.clone(), index);
        self.nodes.push(Some(Node {
            id,
            name: name.to_string(),
            kind,
            parent: Some(parent.0),
            children: Vec::new(),
            properties: BTreeMap::new(),
            content: None,
        }));
        self.node_mut(parent)?.children.push(index);
        Ok(NodeId(index))
    }

    fn remove(&mut self, node: NodeId) -> TreeResult<()> {
        if node == self.root() {
            return Err(TreeError::RootRemoval);
        }
        let parent = self.node(node)?.parent;
        if let Some(parent) = parent {
            self.node_mut(NodeId(parent))?
                .children
                .retain(|&c| c != node.0);
        }
        let mut pending = vec![node.0];
        while let Some(index) = pending.pop() {
            if let Some(removed) = self.nodes.get_mut(index).and_then(Option::take) {
                self.by_id.remove(&removed.id);
                pending.extend(removed.children);
            }
        }
        Ok(())
    }

    fn name(&self, node: NodeId) -> TreeResult<&str> {
        Ok(&self.node(node)?.name)
    }

    fn kind(&self, node: NodeId) -> TreeResult<NodeKind> {
        Ok(self.node(node)?.kind)
    }

    fn parent(&self, node: NodeId) -> TreeResult<Option<NodeId>> {
        Ok(self.node(node)?.parent.map(NodeId))
    }

    fn children(&self, node: NodeId) -> TreeResult<Vec<NodeId>> {
        Ok(self.node(node)?.children.iter().copied().map(NodeId).collect())
    }

    fn property(&self, node: NodeId, name: &str) -> TreeResult<Option<&str>> {
        Ok(self.node(node)?.properties.get(name).map(String::as_str))
    }

    fn set_property(&mut self, node: NodeId, name: &str, value: Option<&str>) -> TreeResult<()> {
        let properties = &mut self.node_mut(node)?.properties;
        match value {
            Some(value) => {
                properties.insert(name.to_string(), value.to_string());
            }
            None => {
                properties.remove(name);
            }
        }
        Ok(())
    }

    fn property_names(&self, node: NodeId) -> TreeResult<Vec<String>> {
        Ok(self.node(node)?.properties.keys().cloned().collect())
    }

    fn content(&self, node: NodeId) -> TreeResult<Option<&[u8]>> {
        Ok(self.node(node)?.content.as_deref())
    }

    fn set_content(&mut self, node: NodeId, bytes: Vec<u8>) -> TreeResult<()> {
        self.node_mut(node)?.content = Some(bytes);
        Ok(())
    }

    fn identifier(&self, node: NodeId) -> TreeResult<&str> {
        Ok(&self.node(node)?.id)
    }

    fn resolve_reference(&self, identifier: &str) -> Option<NodeId> {
        self.by_id.get(identifier).copied().map(NodeId)
    }
}
