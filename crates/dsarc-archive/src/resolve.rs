//! Publish-policy resolution.
//!
//! Decides, per manifest entry, whether import creates a new resource node,
//! links to an equivalent one already under the resolution root, or records
//! the entry descriptively. The same rules are used for every resource kind;
//! only the materializer differs.

use crate::manifest::{EntryKind, PublishPolicy};
use crate::tree::{props, ContentTree, NodeId, NodeKind, TreeError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// Resource kinds that have their own resolution root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "connections")]
    Connection,
    #[serde(rename = "drivers")]
    Driver,
    #[serde(rename = "metadata")]
    Metadata,
    #[serde(rename = "resources")]
    Resource,
    #[serde(rename = "udfs")]
    Udf,
    #[serde(rename = "vdbs")]
    Vdb,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::Connection,
        Self::Driver,
        Self::Metadata,
        Self::Resource,
        Self::Udf,
        Self::Vdb,
    ];

    /// Folder name under the tree root used when nothing is configured.
    pub fn default_folder(self) -> &'static str {
        match self {
            Self::Connection => "connections",
            Self::Driver => "drivers",
            Self::Metadata => "metadata",
            Self::Resource => "resources",
            Self::Udf => "udfs",
            Self::Vdb => "vdbs",
        }
    }

    /// Node kind of a materialized resource.
    pub fn node_kind(self) -> NodeKind {
        match self {
            Self::Connection => NodeKind::Connection,
            Self::Driver => NodeKind::DriverFile,
            Self::Metadata => NodeKind::DdlFile,
            Self::Resource => NodeKind::ResourceFile,
            Self::Udf => NodeKind::UdfFile,
            Self::Vdb => NodeKind::Vdb,
        }
    }

    pub fn env_var(self) -> &'static str {
        match self {
            Self::Connection => "DSARC_CONNECTIONS_ROOT",
            Self::Driver => "DSARC_DRIVERS_ROOT",
            Self::Metadata => "DSARC_METADATA_ROOT",
            Self::Resource => "DSARC_RESOURCES_ROOT",
            Self::Udf => "DSARC_UDFS_ROOT",
            Self::Vdb => "DSARC_VDBS_ROOT",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_folder())
    }
}

impl EntryKind {
    pub fn resource_kind(self) -> ResourceKind {
        match self {
            Self::ServiceVdb | Self::Dependency | Self::Vdb => ResourceKind::Vdb,
            Self::Connection => ResourceKind::Connection,
            Self::Driver => ResourceKind::Driver,
            Self::Metadata => ResourceKind::Metadata,
            Self::Udf => ResourceKind::Udf,
            Self::Resource => ResourceKind::Resource,
        }
    }

    /// Node kind of the descriptive entry node created on import.
    pub fn node_kind(self) -> NodeKind {
        match self {
            Self::ServiceVdb => NodeKind::ServiceVdbEntry,
            Self::Dependency | Self::Vdb => NodeKind::VdbEntry,
            Self::Connection => NodeKind::ConnectionEntry,
            Self::Driver => NodeKind::DriverEntry,
            Self::Metadata => NodeKind::MetadataEntry,
            Self::Udf => NodeKind::UdfEntry,
            Self::Resource => NodeKind::ResourceEntry,
        }
    }

    /// Inverse of [`node_kind`](Self::node_kind) for top-level entry nodes.
    pub fn from_node_kind(kind: NodeKind) -> Option<Self> {
        Some(match kind {
            NodeKind::ServiceVdbEntry => Self::ServiceVdb,
            NodeKind::VdbEntry => Self::Vdb,
            NodeKind::ConnectionEntry => Self::Connection,
            NodeKind::DriverEntry => Self::Driver,
            NodeKind::MetadataEntry => Self::Metadata,
            NodeKind::UdfEntry => Self::Udf,
            NodeKind::ResourceEntry => Self::Resource,
            _ => return None,
        })
    }
}

/// Where each resource kind is materialized.
///
/// Precedence: explicit override, then environment, then the default folder
/// at the tree root if it exists, then the data service's parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRoots {
    overrides: BTreeMap<ResourceKind, String>,
}

impl ResolutionRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots from environment variables.
    ///
    /// | Variable | Resource kind |
    /// |----------|---------------|
    /// | `DSARC_CONNECTIONS_ROOT` | connections |
    /// | `DSARC_DRIVERS_ROOT` | drivers |
    /// | `DSARC_METADATA_ROOT` | metadata (DDL) files |
    /// | `DSARC_RESOURCES_ROOT` | generic resources |
    /// | `DSARC_UDFS_ROOT` | UDF binaries |
    /// | `DSARC_VDBS_ROOT` | VDBs |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut roots = Self::new();
        for kind in ResourceKind::ALL {
            if let Some(path) = lookup(kind.env_var()) {
                roots.set(kind, &path);
            }
        }
        roots
    }

    /// Set or replace the root path for `kind`. Blank paths are ignored.
    pub fn set(&mut self, kind: ResourceKind, path: &str) {
        let path = path.trim().trim_matches('/');
        if !path.is_empty() {
            self.overrides.insert(kind, path.to_string());
        }
    }

    pub fn with(mut self, kind: ResourceKind, path: &str) -> Self {
        self.set(kind, path);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&str> {
        self.overrides.get(&kind).map(String::as_str)
    }

    /// Layer `explicit` over `self`; explicit entries win.
    pub fn overlay(mut self, explicit: &ResolutionRoots) -> Self {
        for (kind, path) in &explicit.overrides {
            self.overrides.insert(*kind, path.clone());
        }
        self
    }

    /// Resolve the root node for `kind`. Configured folders are created on demand.
    pub fn resolve<T: ContentTree + ?Sized>(
        &self,
        tree: &mut T,
        kind: ResourceKind,
        data_service: NodeId,
    ) -> Result<NodeId, TreeError> {
        if let Some(path) = self.get(kind) {
            return tree.ensure_folder(path);
        }
        let root = tree.root();
        if let Some(folder) = tree.find_child(root, kind.default_folder(), NodeKind::Folder)? {
            return Ok(folder);
        }
        Ok(tree.parent(data_service)?.unwrap_or(root))
    }
}

/// How an entry ended up linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A new resource node was created and linked.
    Materialized(NodeId),
    /// An existing resource node was linked; the payload was not consumed.
    Referenced(NodeId),
    /// NEVER policy: the entry node carries descriptive properties only.
    DescriptiveOnly,
    /// A resource was required but no payload was available.
    Unresolved,
}

impl Resolution {
    pub fn resource(self) -> Option<NodeId> {
        match self {
            Self::Materialized(id) | Self::Referenced(id) => Some(id),
            Self::DescriptiveOnly | Self::Unresolved => None,
        }
    }
}

/// One entry awaiting resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolveTarget<'a> {
    pub entry_node: NodeId,
    pub data_service: NodeId,
    pub entry_name: &'a str,
    pub kind: ResourceKind,
    pub policy: PublishPolicy,
}

/// Applies publish policies against a content tree.
#[derive(Debug, Clone, Copy)]
pub struct PublishResolver<'a> {
    roots: &'a ResolutionRoots,
}

impl<'a> PublishResolver<'a> {
    pub fn new(roots: &'a ResolutionRoots) -> Self {
        Self { roots }
    }

    /// Resolve `target` under its policy.
    ///
    /// `materialize` receives the resolution root and must create the new
    /// resource node beneath it. It is only called when the policy requires a
    /// new resource.
    pub fn resolve<T, E, F>(
        &self,
        tree: &mut T,
        target: &ResolveTarget<'_>,
        materialize: F,
    ) -> Result<Resolution, E>
    where
        T: ContentTree + ?Sized,
        E: From<TreeError>,
        F: FnOnce(&mut T, NodeId) -> Result<NodeId, E>,
    {
        let root = match self.reuse(tree, target)? {
            Reuse::Done(resolution) => return Ok(resolution),
            Reuse::Create(root) => root,
        };
        let created = materialize(tree, root)?;
        if let Err(err) = link(tree, target.entry_node, created) {
            tree.remove(created)?;
            return Err(err.into());
        }
        Ok(Resolution::Materialized(created))
    }

    /// Resolve an entry whose payload is absent from the archive.
    ///
    /// Whenever a new resource would be required the result is
    /// [`Resolution::Unresolved`].
    pub fn resolve_without_payload<T: ContentTree + ?Sized>(
        &self,
        tree: &mut T,
        target: &ResolveTarget<'_>,
    ) -> Result<Resolution, TreeError> {
        match self.reuse(tree, target)? {
            Reuse::Done(resolution) => Ok(resolution),
            Reuse::Create(_) => Ok(Resolution::Unresolved),
        }
    }

    fn reuse<T: ContentTree + ?Sized>(
        &self,
        tree: &mut T,
        target: &ResolveTarget<'_>,
    ) -> Result<Reuse, TreeError> {
        if target.policy == PublishPolicy::Never {
            return Ok(Reuse::Done(Resolution::DescriptiveOnly));
        }

        let root = self.roots.resolve(tree, target.kind, target.data_service)?;

        if target.policy == PublishPolicy::IfMissing {
            if let Some(existing) =
                tree.find_child(root, target.entry_name, target.kind.node_kind())?
            {
                link(tree, target.entry_node, existing)?;
                return Ok(Reuse::Done(Resolution::Referenced(existing)));
            }
        }
        Ok(Reuse::Create(root))
    }
}

enum Reuse {
    Done(Resolution),
    Create(NodeId),
}

fn link<T: ContentTree + ?Sized>(
    tree: &mut T,
    entry_node: NodeId,
    resource: NodeId,
) -> Result<(), TreeError> {
    let identifier = tree.identifier(resource)?.to_string();
    tree.set_property(entry_node, props::REFERENCE, Some(&identifier))
}

/// Write the policy literal onto an entry node.
pub fn store_policy<T: ContentTree + ?Sized>(
    tree: &mut T,
    node: NodeId,
    policy: PublishPolicy,
) -> Result<(), TreeError> {
    tree.set_property(node, props::PUBLISH_POLICY, Some(policy.as_xml()))
}

/// Read an entry node's policy; absent or unrecognised values yield the default.
pub fn load_policy<T: ContentTree + ?Sized>(tree: &T, node: NodeId) -> Result<PublishPolicy, TreeError> {
    Ok(PublishPolicy::parse_lenient(
        tree.property(node, props::PUBLISH_POLICY)?,
    ))
}

/// Follow an entry node's reference property.
pub fn referenced<T: ContentTree + ?Sized>(tree: &T, entry_node: NodeId) -> Result<Option<NodeId>, TreeError> {
    Ok(tree
        .property(entry_node, props::REFERENCE)?
        .and_then(|id| tree.resolve_reference(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MemoryTree;

    fn setup() -> (MemoryTree, NodeId, NodeId) {
        let mut tree = MemoryTree::new();
        let root = tree.root();
        let ds = tree.create_child(root, "ds", NodeKind::DataService).unwrap();
        let entry = tree.create_child(ds, "a.jar", NodeKind::DriverEntry).unwrap();
        (tree, ds, entry)
    }

    fn target(ds: NodeId, entry: NodeId, policy: PublishPolicy) -> ResolveTarget<'static> {
        ResolveTarget {
            entry_node: entry,
            data_service: ds,
            entry_name: "a.jar",
            kind: ResourceKind::Driver,
            policy,
        }
    }

    fn create_jar(tree: &mut MemoryTree, root: NodeId) -> Result<NodeId, TreeError> {
        let node = tree.create_child(root, "a.jar", NodeKind::DriverFile)?;
        tree.set_content(node, b"jar".to_vec())?;
        Ok(node)
    }

    #[test]
    fn never_links_nothing() {
        let (mut tree, ds, entry) = setup();
        let roots = ResolutionRoots::new();
        let outcome = PublishResolver::new(&roots)
            .resolve::<_, TreeError, _>(&mut tree, &target(ds, entry, PublishPolicy::Never), create_jar)
            .unwrap();
        assert_eq!(outcome, Resolution::DescriptiveOnly);
        assert_eq!(referenced(&tree, entry).unwrap(), None);
        assert!(tree.lookup("a.jar").is_none());
    }

    #[test]
    fn if_missing_prefers_existing_resource() {
        let (mut tree, ds, entry) = setup();
        let drivers = tree.ensure_folder("drivers").unwrap();
        let existing = tree.create_child(drivers, "a.jar", NodeKind::DriverFile).unwrap();
        let roots = ResolutionRoots::new();

        let outcome = PublishResolver::new(&roots)
            .resolve::<_, TreeError, _>(
                &mut tree,
                &target(ds, entry, PublishPolicy::IfMissing),
                create_jar,
            )
            .unwrap();
        assert_eq!(outcome, Resolution::Referenced(existing));
        assert_eq!(referenced(&tree, entry).unwrap(), Some(existing));
        assert_eq!(tree.children(drivers).unwrap().len(), 1);
    }

    #[test]
    fn if_missing_materializes_when_absent() {
        let (mut tree, ds, entry) = setup();
        let roots = ResolutionRoots::new();
        let outcome = PublishResolver::new(&roots)
            .resolve::<_, TreeError, _>(
                &mut tree,
                &target(ds, entry, PublishPolicy::IfMissing),
                create_jar,
            )
            .unwrap();
        let Resolution::Materialized(created) = outcome else {
            panic!("expected materialization, got {outcome:?}");
        };
        // no drivers folder: falls back to the data service's parent
        assert_eq!(tree.parent(created).unwrap(), Some(tree.root()));
        assert_eq!(referenced(&tree, entry).unwrap(), Some(created));
    }

    #[test]
    fn always_creates_a_sibling() {
        let (mut tree, ds, entry) = setup();
        let drivers = tree.ensure_folder("drivers").unwrap();
        let existing = tree.create_child(drivers, "a.jar", NodeKind::DriverFile).unwrap();
        let roots = ResolutionRoots::new();

        let outcome = PublishResolver::new(&roots)
            .resolve::<_, TreeError, _>(&mut tree, &target(ds, entry, PublishPolicy::Always), create_jar)
            .unwrap();
        let created = outcome.resource().unwrap();
        assert_ne!(created, existing);
        assert_eq!(tree.children(drivers).unwrap().len(), 2);
    }

    #[test]
    fn failed_link_removes_the_new_resource() {
        let (mut tree, ds, entry) = setup();
        let drivers = tree.ensure_folder("drivers").unwrap();
        tree.remove(entry).unwrap();
        let roots = ResolutionRoots::new();

        let err = PublishResolver::new(&roots)
            .resolve::<_, TreeError, _>(&mut tree, &target(ds, entry, PublishPolicy::Always), create_jar)
            .unwrap_err();
        assert!(matches!(err, TreeError::UnknownNode { node } if node == entry));
        assert!(tree.children(drivers).unwrap().is_empty());
    }

    #[test]
    fn missing_payload_is_unresolved() {
        let (mut tree, ds, entry) = setup();
        let roots = ResolutionRoots::new();
        let resolver = PublishResolver::new(&roots);
        let outcome = resolver
            .resolve_without_payload(&mut tree, &target(ds, entry, PublishPolicy::Always))
            .unwrap();
        assert_eq!(outcome, Resolution::Unresolved);

        let drivers = tree.ensure_folder("drivers").unwrap();
        let existing = tree.create_child(drivers, "a.jar", NodeKind::DriverFile).unwrap();
        let outcome = resolver
            .resolve_without_payload(&mut tree, &target(ds, entry, PublishPolicy::IfMissing))
            .unwrap();
        assert_eq!(outcome, Resolution::Referenced(existing));
    }

    #[test]
    fn configured_root_is_created_and_wins() {
        let (mut tree, ds, _) = setup();
        tree.ensure_folder("drivers").unwrap();
        let env = ResolutionRoots::from_lookup(|name| {
            (name == "DSARC_DRIVERS_ROOT").then(|| "/shared/jdbc/".to_string())
        });
        assert_eq!(env.get(ResourceKind::Driver), Some("shared/jdbc"));

        let explicit = ResolutionRoots::new().with(ResourceKind::Driver, "lib");
        let roots = env.overlay(&explicit);
        let resolved = roots.resolve(&mut tree, ResourceKind::Driver, ds).unwrap();
        assert_eq!(tree.path_of(resolved).unwrap(), "lib");
    }

    #[test]
    fn entry_kinds_map_to_resources() {
        assert_eq!(EntryKind::Dependency.resource_kind(), ResourceKind::Vdb);
        assert_eq!(EntryKind::Metadata.resource_kind().node_kind(), NodeKind::DdlFile);
        assert_eq!(
            EntryKind::from_node_kind(EntryKind::Udf.node_kind()),
            Some(EntryKind::Udf)
        );
        assert_eq!(EntryKind::from_node_kind(NodeKind::Folder), None);
    }
}
