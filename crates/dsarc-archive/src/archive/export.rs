//! Archive exporter.
//!
//! Walks a data service node's typed children back into a [`Manifest`],
//! resolves each entry's linked resource and produces the requested
//! artifact. Unresolvable references are logged and their payload skipped.
//!
//! Entry nodes are deduplicated by archive path: the first node in tree
//! order wins and later ones are logged and left out, so a rebuilt manifest
//! never declares the same member twice.

use super::errors::{ArchiveError, ArchiveResult};
use super::index::sha256_digest;
use super::zip_write::DeterministicZip;
use crate::codec::{self, parse_timestamp, CodecError, MANIFEST_PATH};
use crate::config::ExportOptions;
use crate::delegate::{Connection, Delegates};
use crate::manifest::{
    ConnectionEntry, DataServiceEntry, EntryKind, Manifest, ModelError, PublishPolicy,
    ServiceVdbEntry, VdbEntry,
};
use crate::resolve::{load_policy, referenced};
use crate::tree::{props, ContentTree, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What an export call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    ManifestXml,
    #[default]
    FullZip,
    FileList,
    ServiceVdbXml,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        Self::ManifestXml,
        Self::FullZip,
        Self::FileList,
        Self::ServiceVdbXml,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ManifestXml => "manifest-xml",
            Self::FullZip => "full-zip",
            Self::FileList => "file-list",
            Self::ServiceVdbXml => "service-vdb-xml",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown artifact kind '{s}'"))
    }
}

/// Parallel arrays of archive paths and payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileList {
    pub paths: Vec<String>,
    pub contents: Vec<Vec<u8>>,
}

impl FileList {
    fn push(&mut self, path: &str, content: Vec<u8>) {
        self.paths.push(path.to_string());
        self.contents.push(content);
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.paths
            .iter()
            .position(|p| p == path)
            .map(|i| self.contents[i].as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.paths
            .iter()
            .map(String::as_str)
            .zip(self.contents.iter().map(Vec::as_slice))
    }

    /// `(path, size, sha256 digest)` per file.
    pub fn digests(&self) -> Vec<(String, usize, String)> {
        self.iter()
            .map(|(path, content)| (path.to_string(), content.len(), sha256_digest(content)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportArtifact {
    ManifestXml(Vec<u8>),
    FullZip(Vec<u8>),
    FileList(FileList),
    ServiceVdbXml(Vec<u8>),
}

impl ExportArtifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::ManifestXml(_) => ArtifactKind::ManifestXml,
            Self::FullZip(_) => ArtifactKind::FullZip,
            Self::FileList(_) => ArtifactKind::FileList,
            Self::ServiceVdbXml(_) => ArtifactKind::ServiceVdbXml,
        }
    }

    /// Raw bytes for the single-document kinds.
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::ManifestXml(b) | Self::FullZip(b) | Self::ServiceVdbXml(b) => Some(b),
            Self::FileList(_) => None,
        }
    }
}

/// Export result plus the entries whose payload could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub artifact: ExportArtifact,
    pub missing_references: Vec<String>,
}

/// An entry node and the manifest entry rebuilt from it.
struct SourceEntry {
    node: NodeId,
    kind: EntryKind,
    path: String,
    policy: PublishPolicy,
}

/// Exports data service nodes to manifests and archives.
#[derive(Debug, Default)]
pub struct Exporter {
    delegates: Delegates,
    options: ExportOptions,
}

impl Exporter {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            delegates: Delegates::default(),
            options,
        }
    }

    pub fn with_delegates(mut self, delegates: Delegates) -> Self {
        self.delegates = delegates;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export the artifact kind selected in the options.
    pub fn export(&self, tree: &dyn ContentTree, source: NodeId) -> ArchiveResult<ExportOutcome> {
        self.export_as(tree, source, self.options.artifact)
    }

    pub fn export_as(
        &self,
        tree: &dyn ContentTree,
        source: NodeId,
        kind: ArtifactKind,
    ) -> ArchiveResult<ExportOutcome> {
        if kind == ArtifactKind::ServiceVdbXml {
            let bytes = self.service_vdb_bytes(tree, source)?;
            return Ok(ExportOutcome {
                artifact: ExportArtifact::ServiceVdbXml(bytes),
                missing_references: Vec::new(),
            });
        }

        let (manifest, sources) = self.rebuild(tree, source)?;
        let manifest_bytes = self.write(&manifest)?;
        if kind == ArtifactKind::ManifestXml {
            return Ok(ExportOutcome {
                artifact: ExportArtifact::ManifestXml(manifest_bytes),
                missing_references: Vec::new(),
            });
        }

        let mut files = FileList::default();
        let mut missing_references = Vec::new();
        for entry in &sources {
            if entry.policy == PublishPolicy::Never {
                files.push(&entry.path, Vec::new());
                continue;
            }
            match self.payload(tree, entry) {
                Some(bytes) => files.push(&entry.path, bytes),
                None => missing_references.push(entry.path.clone()),
            }
        }

        let artifact = if kind == ArtifactKind::FileList {
            ExportArtifact::FileList(files)
        } else {
            let mut zip = DeterministicZip::new();
            zip.write_entry(MANIFEST_PATH, &manifest_bytes)?;
            for entry in &sources {
                if entry.policy == PublishPolicy::Never {
                    continue;
                }
                if let Some(bytes) = files.get(&entry.path) {
                    zip.write_entry(&entry.path, bytes)?;
                }
            }
            ExportArtifact::FullZip(zip.finish()?)
        };

        info!(
            data_service = %manifest.name(),
            artifact = %kind,
            entries = sources.len(),
            missing = missing_references.len(),
            "exported data service"
        );
        Ok(ExportOutcome {
            artifact,
            missing_references,
        })
    }

    /// Rebuild the manifest for `source` without resolving payloads.
    pub fn manifest(&self, tree: &dyn ContentTree, source: NodeId) -> ArchiveResult<Manifest> {
        Ok(self.rebuild(tree, source)?.0)
    }

    fn write(&self, manifest: &Manifest) -> ArchiveResult<Vec<u8>> {
        codec::write_manifest(manifest, self.options.write_options()).map_err(|e| match e {
            CodecError::Schema(source) => ArchiveError::SchemaValidation {
                member: MANIFEST_PATH.to_string(),
                source,
            },
            other => ArchiveError::Write {
                message: other.to_string(),
            },
        })
    }

    fn rebuild(
        &self,
        tree: &dyn ContentTree,
        source: NodeId,
    ) -> ArchiveResult<(Manifest, Vec<SourceEntry>)> {
        if tree.kind(source)? != NodeKind::DataService {
            return Err(ArchiveError::NotDataService { node: source });
        }
        let name = tree.name(source)?;
        let mut manifest = Manifest::new(name).map_err(|e| invalid_node(tree, source, e))?;

        manifest.set_description(tree.property(source, props::DESCRIPTION)?);
        manifest.set_last_modified(
            tree.property(source, props::LAST_MODIFIED)?
                .and_then(parse_timestamp),
        );
        manifest.set_modified_by(tree.property(source, props::MODIFIED_BY)?);
        for key in property_order(tree, source)? {
            if !self.options.filter.allows(&key) {
                continue;
            }
            let value = tree.property(source, &key)?;
            manifest
                .set_property(&key, value)
                .map_err(|e| invalid_node(tree, source, e))?;
        }

        let mut service: Vec<SourceEntry> = Vec::new();
        let mut others: Vec<SourceEntry> = Vec::new();
        let mut seen = SeenEntries::default();

        for child in tree.children(source)? {
            let Some(kind) = EntryKind::from_node_kind(tree.kind(child)?) else {
                debug!(node = %child, "ignoring non-entry child");
                continue;
            };
            let path = entry_path(tree, child)?;
            let policy = load_policy(tree, child)?;
            let invalid = |e| invalid_node(tree, child, e);

            if kind == EntryKind::ServiceVdb && manifest.service_vdb().is_some() {
                warn!(node = %child, "ignoring additional service VDB entry");
                continue;
            }
            if !seen.path(&path, child) {
                continue;
            }

            match kind {
                EntryKind::ServiceVdb => {
                    let mut entry = ServiceVdbEntry::new(&path).map_err(invalid)?.with_policy(policy);
                    apply_vdb_identity(tree, child, entry.vdb_mut())?;
                    service.push(source_entry(child, kind, entry.path(), policy));

                    for dep_node in tree.children(child)? {
                        if tree.kind(dep_node)? != NodeKind::VdbEntry {
                            continue;
                        }
                        let dep_path = entry_path(tree, dep_node)?;
                        if !seen.path(&dep_path, dep_node) {
                            continue;
                        }
                        let dep_policy = load_policy(tree, dep_node)?;
                        let mut dep = VdbEntry::new(&dep_path)
                            .map_err(|e| invalid_node(tree, dep_node, e))?
                            .with_policy(dep_policy);
                        apply_vdb_identity(tree, dep_node, &mut dep)?;
                        service.push(source_entry(
                            dep_node,
                            EntryKind::Dependency,
                            dep.path(),
                            dep_policy,
                        ));
                        entry.add_dependency(dep);
                    }
                    manifest.set_service_vdb(Some(entry));
                }
                EntryKind::Vdb | EntryKind::Dependency => {
                    let mut entry = VdbEntry::new(&path).map_err(invalid)?.with_policy(policy);
                    apply_vdb_identity(tree, child, &mut entry)?;
                    others.push(source_entry(child, EntryKind::Vdb, entry.path(), policy));
                    manifest.add_vdb(entry);
                }
                EntryKind::Connection => {
                    let Some(jndi_name) = connection_jndi_name(tree, child)? else {
                        warn!(entry = %path, "skipping connection entry without a JNDI name");
                        continue;
                    };
                    if !seen.jndi_name(&jndi_name, child) {
                        continue;
                    }
                    let entry = ConnectionEntry::new(&path, &jndi_name)
                        .map_err(invalid)?
                        .with_policy(policy);
                    others.push(source_entry(child, kind, entry.path(), policy));
                    manifest.add_connection(entry);
                }
                EntryKind::Driver | EntryKind::Metadata | EntryKind::Udf | EntryKind::Resource => {
                    let entry = DataServiceEntry::new(&path).map_err(invalid)?.with_policy(policy);
                    others.push(source_entry(child, kind, entry.path(), policy));
                    manifest.add_plain(kind, entry);
                }
            }
        }

        // Payload order follows the manifest's entry order.
        let mut sources = service;
        for entry in manifest.entries() {
            if let Some(i) = others.iter().position(|s| s.path == entry.path()) {
                sources.push(others.swap_remove(i));
            }
        }
        Ok((manifest, sources))
    }

    /// Resolve and serialize one entry's payload; `None` when unavailable.
    fn payload(&self, tree: &dyn ContentTree, entry: &SourceEntry) -> Option<Vec<u8>> {
        let resource = match referenced(tree, entry.node) {
            Ok(Some(resource)) => resource,
            Ok(None) | Err(_) => {
                let err = ArchiveError::MissingReference {
                    path: entry.path.clone(),
                };
                warn!(code = %err.code(), "{err}");
                return None;
            }
        };

        let bytes = match entry.kind {
            EntryKind::ServiceVdb | EntryKind::Dependency | EntryKind::Vdb => {
                self.delegates.vdbs.export(tree, resource)
            }
            EntryKind::Connection => Connection::load(tree, resource)
                .and_then(|connection| self.delegates.connections.write(&connection)),
            EntryKind::Driver | EntryKind::Metadata | EntryKind::Udf | EntryKind::Resource => {
                match tree.content(resource) {
                    Ok(Some(content)) => Ok(content.to_vec()),
                    _ => {
                        warn!(entry = %entry.path, "linked resource has no content");
                        return None;
                    }
                }
            }
        };

        match bytes {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(entry = %entry.path, error = %err, "failed to export linked resource");
                None
            }
        }
    }

    /// The service VDB document, read straight from the first service VDB
    /// entry without rebuilding the manifest.
    fn service_vdb_bytes(&self, tree: &dyn ContentTree, source: NodeId) -> ArchiveResult<Vec<u8>> {
        if tree.kind(source)? != NodeKind::DataService {
            return Err(ArchiveError::NotDataService { node: source });
        }
        let name = tree.name(source)?;
        let no_service = || ArchiveError::NoServiceVdb {
            name: name.to_string(),
        };
        let mut entry = None;
        for child in tree.children(source)? {
            if tree.kind(child)? == NodeKind::ServiceVdbEntry {
                entry = Some(child);
                break;
            }
        }
        let entry = entry.ok_or_else(no_service)?;
        let resource = referenced(tree, entry)?.ok_or_else(no_service)?;
        let path = entry_path(tree, entry)?;
        self.delegates
            .vdbs
            .export(tree, resource)
            .map_err(|source| ArchiveError::DelegateExport { path, source })
    }
}

/// Archive paths and JNDI names already claimed by an earlier entry node.
#[derive(Default)]
struct SeenEntries {
    paths: HashSet<String>,
    jndi_names: HashSet<String>,
}

impl SeenEntries {
    /// `false` when `path` was already taken; the duplicate is logged.
    fn path(&mut self, path: &str, node: NodeId) -> bool {
        let fresh = self.paths.insert(path.to_string());
        if !fresh {
            warn!(node = %node, entry = %path, "skipping entry node with a duplicate archive path");
        }
        fresh
    }

    fn jndi_name(&mut self, jndi_name: &str, node: NodeId) -> bool {
        let fresh = self.jndi_names.insert(jndi_name.to_string());
        if !fresh {
            warn!(node = %node, jndi_name, "skipping connection entry with a duplicate JNDI name");
        }
        fresh
    }
}

/// JNDI name of a connection entry, falling back to its linked connection.
fn connection_jndi_name(tree: &dyn ContentTree, node: NodeId) -> ArchiveResult<Option<String>> {
    if let Some(jndi_name) = tree.property(node, props::JNDI_NAME)? {
        if !jndi_name.trim().is_empty() {
            return Ok(Some(jndi_name.to_string()));
        }
    }
    let linked = match referenced(tree, node) {
        Ok(Some(resource)) => tree.property(resource, props::JNDI_NAME)?,
        Ok(None) | Err(_) => None,
    };
    Ok(linked
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string))
}

/// Data service property names, in the order they were imported, then any
/// others alphabetically.
fn property_order(tree: &dyn ContentTree, node: NodeId) -> ArchiveResult<Vec<String>> {
    let mut remaining = tree.property_names(node)?;
    let recorded: Vec<String> = match tree.property(node, props::PROPERTY_ORDER)? {
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            warn!(node = %node, error = %e, "ignoring unreadable property order");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let mut ordered = Vec::with_capacity(remaining.len());
    for name in recorded {
        if let Some(i) = remaining.iter().position(|n| *n == name) {
            ordered.push(remaining.remove(i));
        }
    }
    ordered.extend(remaining);
    Ok(ordered)
}

fn source_entry(node: NodeId, kind: EntryKind, path: &str, policy: PublishPolicy) -> SourceEntry {
    SourceEntry {
        node,
        kind,
        path: path.to_string(),
        policy,
    }
}

/// Declared archive path of an entry node, falling back to its name.
pub(super) fn entry_path(tree: &dyn ContentTree, node: NodeId) -> ArchiveResult<String> {
    Ok(match tree.property(node, props::PATH)? {
        Some(path) => path.to_string(),
        None => tree.name(node)?.to_string(),
    })
}

fn apply_vdb_identity(tree: &dyn ContentTree, node: NodeId, entry: &mut VdbEntry) -> ArchiveResult<()> {
    entry.set_vdb_name(tree.property(node, props::VDB_NAME)?);
    entry.set_vdb_version(tree.property(node, props::VDB_VERSION)?);
    Ok(())
}

fn invalid_node(tree: &dyn ContentTree, node: NodeId, err: ModelError) -> ArchiveError {
    ArchiveError::MalformedManifest {
        member: tree.path_of(node).unwrap_or_else(|_| node.to_string()),
        reason: err.to_string(),
    }
}
