//! Archive importer.
//!
//! ```text
//! bytes ─▶ ArchiveIndex ─▶ manifest (validate + parse) ─▶ data service node
//!            │                                             │
//!            └── members in archive order ──▶ entry node + PublishResolver
//! ```
//!
//! The service VDB is materialized first regardless of where it sits in the
//! archive. Every other member that matches a declared entry follows in
//! archive order; declared entries with no member are handled last.
//!
//! Importing into a data service that already holds an entry with the same
//! archive path replaces that entry once the new one is in place. A new
//! service VDB replaces the old one together with its dependencies.

use super::errors::{ArchiveError, ArchiveResult};
use super::export::entry_path;
use super::index::ArchiveIndex;
use super::limits::{check_xml_depth, ArchiveLimits};
use crate::codec::{self, CodecError, MANIFEST_PATH, TIMESTAMP_FORMAT};
use crate::delegate::Delegates;
use crate::manifest::{EntryKind, EntryRef, Manifest, PublishPolicy};
use crate::resolve::{store_policy, PublishResolver, Resolution, ResolutionRoots, ResolveTarget};
use crate::tree::{props, ContentTree, NodeId, NodeKind, TreeError};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// What happened to one manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Materialized,
    Referenced,
    DescriptiveOnly,
    PayloadMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryOutcome {
    pub path: String,
    pub kind: EntryKind,
    pub policy: PublishPolicy,
    pub status: EntryStatus,
    /// An entry with the same path was already present and was removed.
    pub replaced: bool,
    #[serde(skip)]
    pub entry_node: NodeId,
    #[serde(skip)]
    pub resource: Option<NodeId>,
}

/// Summary of one import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub data_service: String,
    #[serde(skip)]
    pub data_service_node: NodeId,
    pub entries: Vec<EntryOutcome>,
    /// Members that matched no declared entry, plus directories.
    pub skipped: Vec<String>,
}

impl ImportReport {
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn entry(&self, path: &str) -> Option<&EntryOutcome> {
        self.entries.iter().find(|e| e.path == path)
    }
}

/// A manifest read from an archive without touching any content tree.
#[derive(Debug, Clone)]
pub struct ManifestInfo {
    pub manifest: Manifest,
    pub member_count: usize,
    /// Declared entry paths with no member in the archive.
    pub missing_payloads: Vec<String>,
    /// Members that match no declared entry.
    pub undeclared_members: Vec<String>,
}

impl ManifestInfo {
    pub fn peek(archive: &[u8]) -> ArchiveResult<Self> {
        Self::peek_with_limits(archive, &ArchiveLimits::default())
    }

    pub fn peek_with_limits(archive: &[u8], limits: &ArchiveLimits) -> ArchiveResult<Self> {
        let index = ArchiveIndex::read(archive, limits)?;
        let manifest = read_archive_manifest(&index, limits)?;

        let declared: HashSet<&str> = manifest.entries().iter().map(|e| e.path()).collect();
        let missing_payloads = manifest
            .entries()
            .iter()
            .filter(|e| index.payload(e.path()).is_none())
            .map(|e| e.path().to_string())
            .collect();
        let undeclared_members = index
            .members()
            .iter()
            .filter(|m| !m.is_dir() && m.path() != MANIFEST_PATH && !declared.contains(m.path()))
            .map(|m| m.path().to_string())
            .collect();

        Ok(Self {
            member_count: index.len(),
            missing_payloads,
            undeclared_members,
            manifest,
        })
    }
}

/// Imports data service archives into a content tree.
#[derive(Debug, Default)]
pub struct Importer {
    delegates: Delegates,
    roots: ResolutionRoots,
    limits: ArchiveLimits,
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delegates(mut self, delegates: Delegates) -> Self {
        self.delegates = delegates;
        self
    }

    pub fn with_roots(mut self, roots: ResolutionRoots) -> Self {
        self.roots = roots;
        self
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Create a data service node named after the manifest under `parent`
    /// and import into it.
    ///
    /// The node is removed again if nothing could be imported.
    pub fn import_new(
        &self,
        archive: &[u8],
        tree: &mut dyn ContentTree,
        parent: NodeId,
    ) -> ArchiveResult<ImportReport> {
        let index = ArchiveIndex::read(archive, &self.limits)?;
        let manifest = read_archive_manifest(&index, &self.limits)?;
        let node = tree.create_child(parent, manifest.name(), NodeKind::DataService)?;
        match self.import_parsed(&index, &manifest, tree, node) {
            Ok(report) => Ok(report),
            Err(err) => {
                if tree.children(node).map(|c| c.is_empty()).unwrap_or(false) {
                    tree.remove(node)?;
                }
                Err(err)
            }
        }
    }

    /// Import `archive` into the existing data service node `destination`.
    pub fn import(
        &self,
        archive: &[u8],
        tree: &mut dyn ContentTree,
        destination: NodeId,
    ) -> ArchiveResult<ImportReport> {
        if tree.kind(destination)? != NodeKind::DataService {
            return Err(ArchiveError::NotDataService { node: destination });
        }
        let index = ArchiveIndex::read(archive, &self.limits)?;
        let manifest = read_archive_manifest(&index, &self.limits)?;
        self.import_parsed(&index, &manifest, tree, destination)
    }

    fn import_parsed(
        &self,
        index: &ArchiveIndex,
        manifest: &Manifest,
        tree: &mut dyn ContentTree,
        data_service: NodeId,
    ) -> ArchiveResult<ImportReport> {
        let previous = previous_entries(tree, data_service)?;
        store_scalars(tree, data_service, manifest)?;

        let mut report = ImportReport {
            data_service: manifest.name().to_string(),
            data_service_node: data_service,
            entries: Vec::new(),
            skipped: Vec::new(),
        };
        let entries = manifest.entries();
        let mut done: HashSet<&str> = HashSet::new();
        let mut service_node = None;

        if let Some(service) = entries.iter().find(|e| e.kind == EntryKind::ServiceVdb) {
            let mut outcome =
                self.import_entry(tree, data_service, None, service, index.payload(service.path()))?;
            replace_previous(tree, &previous, &mut outcome)?;
            service_node = Some(outcome.entry_node);
            done.insert(service.path());
            report.entries.push(outcome);
        }

        for member in index.members() {
            if member.is_dir() {
                debug!(member = %member.path(), "skipping directory member");
                report.skipped.push(member.path().to_string());
                continue;
            }
            if member.path() == MANIFEST_PATH || done.contains(member.path()) {
                continue;
            }
            let Some(entry) = entries.iter().find(|e| e.path() == member.path()) else {
                debug!(member = %member.path(), "skipping undeclared member");
                report.skipped.push(member.path().to_string());
                continue;
            };
            let mut outcome =
                self.import_entry(tree, data_service, service_node, entry, Some(member.data()))?;
            replace_previous(tree, &previous, &mut outcome)?;
            done.insert(entry.path());
            report.entries.push(outcome);
        }

        for entry in entries.iter().filter(|e| !done.contains(e.path())) {
            let mut outcome = self.import_entry(tree, data_service, service_node, entry, None)?;
            replace_previous(tree, &previous, &mut outcome)?;
            report.entries.push(outcome);
        }

        info!(
            data_service = %report.data_service,
            materialized = report.count(EntryStatus::Materialized),
            referenced = report.count(EntryStatus::Referenced),
            descriptive = report.count(EntryStatus::DescriptiveOnly),
            missing = report.count(EntryStatus::PayloadMissing),
            replaced = report.entries.iter().filter(|e| e.replaced).count(),
            skipped = report.skipped.len(),
            "imported data service archive"
        );
        Ok(report)
    }

    /// Create the entry node and resolve its resource.
    ///
    /// On failure every node created for this entry is removed before the
    /// error is returned.
    fn import_entry(
        &self,
        tree: &mut dyn ContentTree,
        data_service: NodeId,
        service_node: Option<NodeId>,
        entry: &EntryRef<'_>,
        payload: Option<&[u8]>,
    ) -> ArchiveResult<EntryOutcome> {
        let path = entry.path();
        if let Some(bytes) = payload {
            if is_xml_kind(entry.kind) {
                check_xml_depth(bytes, self.limits.max_xml_depth, path)?;
            }
        }

        let parent = match entry.kind {
            EntryKind::Dependency => service_node.unwrap_or(data_service),
            _ => data_service,
        };
        let entry_node = tree.create_child(parent, entry.entry_name(), entry.kind.node_kind())?;

        match self.resolve_entry(tree, data_service, entry_node, entry, payload) {
            Ok(resolution) => {
                let status = match resolution {
                    Resolution::Materialized(_) => EntryStatus::Materialized,
                    Resolution::Referenced(_) => EntryStatus::Referenced,
                    Resolution::DescriptiveOnly => EntryStatus::DescriptiveOnly,
                    Resolution::Unresolved => EntryStatus::PayloadMissing,
                };
                match status {
                    EntryStatus::PayloadMissing => {
                        warn!(entry = %path, policy = %entry.publish_policy(), "declared entry has no payload in the archive")
                    }
                    EntryStatus::DescriptiveOnly if payload.is_some() => {
                        warn!(entry = %path, "discarding payload of NEVER entry")
                    }
                    _ => debug!(entry = %path, ?status, "imported entry"),
                }
                Ok(EntryOutcome {
                    path: path.to_string(),
                    kind: entry.kind,
                    policy: entry.publish_policy(),
                    status,
                    replaced: false,
                    entry_node,
                    resource: resolution.resource(),
                })
            }
            Err(err) => {
                warn!(entry = %path, error = %err, "rolling back entry");
                tree.remove(entry_node)?;
                Err(err)
            }
        }
    }

    fn resolve_entry(
        &self,
        tree: &mut dyn ContentTree,
        data_service: NodeId,
        entry_node: NodeId,
        entry: &EntryRef<'_>,
        payload: Option<&[u8]>,
    ) -> ArchiveResult<Resolution> {
        store_entry_properties(tree, entry_node, entry)?;

        let target = ResolveTarget {
            entry_node,
            data_service,
            entry_name: entry.entry_name(),
            kind: entry.kind.resource_kind(),
            policy: entry.publish_policy(),
        };
        let resolver = PublishResolver::new(&self.roots);
        match payload {
            Some(bytes) => resolver.resolve(tree, &target, |tree, root| {
                self.materialize(tree, root, entry, bytes)
            }),
            None => Ok(resolver.resolve_without_payload(tree, &target)?),
        }
    }

    /// Create the resource node under `root` and fill it from `bytes`.
    fn materialize(
        &self,
        tree: &mut dyn ContentTree,
        root: NodeId,
        entry: &EntryRef<'_>,
        bytes: &[u8],
    ) -> ArchiveResult<NodeId> {
        let kind = entry.kind.resource_kind().node_kind();
        let node = tree.create_child(root, entry.entry_name(), kind)?;

        let filled = match entry.kind {
            EntryKind::ServiceVdb | EntryKind::Dependency | EntryKind::Vdb => self
                .delegates
                .vdbs
                .import(tree, node, bytes)
                .map(|_| ()),
            EntryKind::Connection => self
                .delegates
                .connections
                .read(bytes)
                .and_then(|connection| connection.store(tree, node)),
            EntryKind::Driver | EntryKind::Metadata | EntryKind::Udf | EntryKind::Resource => {
                tree.set_content(node, bytes.to_vec())?;
                return Ok(node);
            }
        };

        match filled {
            Ok(()) => Ok(node),
            Err(source) => {
                tree.remove(node)?;
                Err(ArchiveError::DelegateImport {
                    path: entry.path().to_string(),
                    source,
                })
            }
        }
    }
}

/// An entry node present before the import started.
struct PreviousEntry {
    path: String,
    node: NodeId,
    kind: NodeKind,
}

fn previous_entries(tree: &dyn ContentTree, data_service: NodeId) -> ArchiveResult<Vec<PreviousEntry>> {
    let mut out = Vec::new();
    for child in tree.children(data_service)? {
        let kind = tree.kind(child)?;
        if !kind.is_entry() {
            continue;
        }
        out.push(PreviousEntry {
            path: entry_path(tree, child)?,
            node: child,
            kind,
        });
        if kind == NodeKind::ServiceVdbEntry {
            for dep in tree.children(child)? {
                if tree.kind(dep)? == NodeKind::VdbEntry {
                    out.push(PreviousEntry {
                        path: entry_path(tree, dep)?,
                        node: dep,
                        kind: NodeKind::VdbEntry,
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Remove the entries `outcome` supersedes.
///
/// Nodes already removed with a replaced parent are skipped.
fn replace_previous(
    tree: &mut dyn ContentTree,
    previous: &[PreviousEntry],
    outcome: &mut EntryOutcome,
) -> ArchiveResult<()> {
    for old in previous {
        let superseded = old.path == outcome.path
            || (outcome.kind == EntryKind::ServiceVdb && old.kind == NodeKind::ServiceVdbEntry);
        if !superseded || old.node == outcome.entry_node || tree.kind(old.node).is_err() {
            continue;
        }
        info!(entry = %outcome.path, previous = %old.path, "replacing previously imported entry");
        tree.remove(old.node)?;
        outcome.replaced = true;
    }
    Ok(())
}

fn is_xml_kind(kind: EntryKind) -> bool {
    matches!(
        kind,
        EntryKind::ServiceVdb | EntryKind::Dependency | EntryKind::Vdb | EntryKind::Connection
    )
}

/// Locate, bound-check, validate and parse the manifest member.
fn read_archive_manifest(index: &ArchiveIndex, limits: &ArchiveLimits) -> ArchiveResult<Manifest> {
    let member = index.manifest().ok_or(ArchiveError::MissingManifest {
        expected: MANIFEST_PATH,
    })?;
    check_xml_depth(member.data(), limits.max_xml_depth, MANIFEST_PATH)?;
    codec::read_manifest(member.data()).map_err(|err| match err {
        CodecError::Schema(source) => ArchiveError::SchemaValidation {
            member: MANIFEST_PATH.to_string(),
            source,
        },
        CodecError::Malformed { reason } | CodecError::Write { message: reason } => {
            ArchiveError::MalformedManifest {
                member: MANIFEST_PATH.to_string(),
                reason,
            }
        }
    })
}

fn store_scalars(
    tree: &mut dyn ContentTree,
    node: NodeId,
    manifest: &Manifest,
) -> ArchiveResult<()> {
    tree.set_property(node, props::DESCRIPTION, manifest.description())?;
    let last_modified = manifest
        .last_modified()
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string());
    tree.set_property(node, props::LAST_MODIFIED, last_modified.as_deref())?;
    tree.set_property(node, props::MODIFIED_BY, manifest.modified_by())?;
    let mut order = Vec::with_capacity(manifest.properties().len());
    for (name, value) in manifest.properties() {
        tree.set_property(node, name, Some(value.as_str()))?;
        order.push(name.as_str());
    }
    let order = if order.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&order).map_err(|e| TreeError::Persist {
            message: e.to_string(),
        })?)
    };
    tree.set_property(node, props::PROPERTY_ORDER, order.as_deref())?;
    Ok(())
}

fn store_entry_properties(
    tree: &mut dyn ContentTree,
    node: NodeId,
    entry: &EntryRef<'_>,
) -> ArchiveResult<()> {
    tree.set_property(node, props::PATH, Some(entry.path()))?;
    store_policy(tree, node, entry.publish_policy())?;
    if let Some(vdb) = entry.vdb {
        tree.set_property(node, props::VDB_NAME, vdb.vdb_name())?;
        tree.set_property(node, props::VDB_VERSION, vdb.vdb_version())?;
    }
    if let Some(connection) = entry.connection {
        tree.set_property(node, props::JNDI_NAME, Some(connection.jndi_name()))?;
    }
    Ok(())
}
