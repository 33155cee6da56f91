//! Manifest entries: archive-resident files plus their publish policy.

use super::{ModelError, PublishPolicy};
use serde::Serialize;

/// Suffix every VDB entry path carries.
pub const VDB_SUFFIX: &str = "-vdb.xml";
/// Suffix every connection entry path carries.
pub const CONNECTION_SUFFIX: &str = "-connection.xml";

/// Normalize an archive member path: forward slashes, no leading slash.
///
/// Rejects empty paths, directory paths and parent-directory segments.
pub fn normalize_archive_path(path: &str) -> Result<String, ModelError> {
    let normalized = path.trim().replace('\\', "/");
    let normalized = normalized.trim_start_matches('/');
    if normalized.is_empty() {
        return Err(ModelError::EmptyPath);
    }
    if normalized.ends_with('/') {
        return Err(ModelError::InvalidPath {
            path: path.to_string(),
            reason: "path names a directory".into(),
        });
    }
    if normalized.split('/').any(|seg| seg == ".." || seg.is_empty()) {
        return Err(ModelError::InvalidPath {
            path: path.to_string(),
            reason: "empty or parent-directory segment".into(),
        });
    }
    Ok(normalized.to_string())
}

/// Force `suffix` onto `path`: a trailing `.xml` is replaced, anything else is appended to.
///
/// Idempotent: a path already ending in `suffix` is returned unchanged.
pub fn apply_suffix(path: &str, suffix: &str) -> String {
    if path.ends_with(suffix) {
        path.to_string()
    } else if let Some(stem) = path.strip_suffix(".xml") {
        format!("{stem}{suffix}")
    } else {
        format!("{path}{suffix}")
    }
}

/// Which manifest collection an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    ServiceVdb,
    Dependency,
    Vdb,
    Connection,
    Driver,
    Metadata,
    Udf,
    Resource,
}

impl EntryKind {
    /// Manifest element name for this entry kind.
    pub fn element(self) -> &'static str {
        match self {
            Self::ServiceVdb => "service-vdb",
            Self::Dependency | Self::Vdb => "vdb-file",
            Self::Connection => "connection-file",
            Self::Driver => "driver-file",
            Self::Metadata => "ddl-file",
            Self::Udf => "udf-file",
            Self::Resource => "resource-file",
        }
    }
}

/// Base entry: archive path and publish policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataServiceEntry {
    path: String,
    publish_policy: PublishPolicy,
}

impl DataServiceEntry {
    pub fn new(path: &str) -> Result<Self, ModelError> {
        Ok(Self {
            path: normalize_archive_path(path)?,
            publish_policy: PublishPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: &str) -> Result<(), ModelError> {
        self.path = normalize_archive_path(path)?;
        Ok(())
    }

    /// Final `/`-delimited segment of the path.
    pub fn entry_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        self.publish_policy
    }

    pub fn set_publish_policy(&mut self, policy: PublishPolicy) {
        self.publish_policy = policy;
    }
}

/// Owner of a VDB entry. Dependencies point at the service VDB; everything
/// else belongs to the manifest directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VdbOwner {
    #[default]
    Manifest,
    ServiceVdb,
}

/// A VDB archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VdbEntry {
    base: DataServiceEntry,
    vdb_name: Option<String>,
    vdb_version: Option<String>,
    owner: VdbOwner,
}

impl VdbEntry {
    /// Create an entry; the path is normalized to carry [`VDB_SUFFIX`].
    pub fn new(path: &str) -> Result<Self, ModelError> {
        let normalized = normalize_archive_path(path)?;
        Ok(Self {
            base: DataServiceEntry::new(&apply_suffix(&normalized, VDB_SUFFIX))?,
            vdb_name: None,
            vdb_version: None,
            owner: VdbOwner::Manifest,
        })
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.base.set_publish_policy(policy);
        self
    }

    pub fn with_vdb(mut self, name: &str, version: &str) -> Self {
        self.set_vdb_name(Some(name));
        self.set_vdb_version(Some(version));
        self
    }

    pub fn base(&self) -> &DataServiceEntry {
        &self.base
    }

    pub fn path(&self) -> &str {
        self.base.path()
    }

    pub fn set_path(&mut self, path: &str) -> Result<(), ModelError> {
        let normalized = normalize_archive_path(path)?;
        self.base.set_path(&apply_suffix(&normalized, VDB_SUFFIX))
    }

    pub fn entry_name(&self) -> &str {
        self.base.entry_name()
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        self.base.publish_policy()
    }

    pub fn set_publish_policy(&mut self, policy: PublishPolicy) {
        self.base.set_publish_policy(policy);
    }

    pub fn vdb_name(&self) -> Option<&str> {
        self.vdb_name.as_deref()
    }

    pub fn set_vdb_name(&mut self, name: Option<&str>) {
        self.vdb_name = non_blank(name);
    }

    pub fn vdb_version(&self) -> Option<&str> {
        self.vdb_version.as_deref()
    }

    pub fn set_vdb_version(&mut self, version: Option<&str>) {
        self.vdb_version = non_blank(version);
    }

    pub fn owner(&self) -> VdbOwner {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: VdbOwner) {
        self.owner = owner;
    }
}

/// The manifest's primary VDB, owning one level of dependency VDBs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceVdbEntry {
    vdb: VdbEntry,
    dependencies: Vec<VdbEntry>,
}

impl ServiceVdbEntry {
    pub fn new(path: &str) -> Result<Self, ModelError> {
        Ok(Self {
            vdb: VdbEntry::new(path)?,
            dependencies: Vec::new(),
        })
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.vdb.set_publish_policy(policy);
        self
    }

    pub fn with_vdb(mut self, name: &str, version: &str) -> Self {
        self.vdb = self.vdb.with_vdb(name, version);
        self
    }

    pub fn vdb(&self) -> &VdbEntry {
        &self.vdb
    }

    pub fn vdb_mut(&mut self) -> &mut VdbEntry {
        &mut self.vdb
    }

    pub fn path(&self) -> &str {
        self.vdb.path()
    }

    pub fn dependencies(&self) -> &[VdbEntry] {
        &self.dependencies
    }

    /// Attach a dependency, taking ownership and re-pointing its owner.
    pub fn add_dependency(&mut self, mut dependency: VdbEntry) {
        dependency.set_owner(VdbOwner::ServiceVdb);
        self.dependencies.push(dependency);
    }

    pub fn set_dependencies(&mut self, dependencies: Vec<VdbEntry>) {
        self.dependencies.clear();
        for dependency in dependencies {
            self.add_dependency(dependency);
        }
    }

    /// Detach all dependencies, handing them back with their owner reset.
    pub fn take_dependencies(&mut self) -> Vec<VdbEntry> {
        let mut taken = std::mem::take(&mut self.dependencies);
        for dependency in &mut taken {
            dependency.set_owner(VdbOwner::Manifest);
        }
        taken
    }
}

/// A connection archive entry. The JNDI name is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionEntry {
    base: DataServiceEntry,
    jndi_name: String,
}

impl ConnectionEntry {
    /// Create an entry; the path is normalized to carry [`CONNECTION_SUFFIX`].
    pub fn new(path: &str, jndi_name: &str) -> Result<Self, ModelError> {
        let normalized = normalize_archive_path(path)?;
        Ok(Self {
            base: DataServiceEntry::new(&apply_suffix(&normalized, CONNECTION_SUFFIX))?,
            jndi_name: non_blank(Some(jndi_name)).ok_or(ModelError::BlankJndiName)?,
        })
    }

    pub fn with_policy(mut self, policy: PublishPolicy) -> Self {
        self.base.set_publish_policy(policy);
        self
    }

    pub fn base(&self) -> &DataServiceEntry {
        &self.base
    }

    pub fn path(&self) -> &str {
        self.base.path()
    }

    pub fn set_path(&mut self, path: &str) -> Result<(), ModelError> {
        let normalized = normalize_archive_path(path)?;
        self.base
            .set_path(&apply_suffix(&normalized, CONNECTION_SUFFIX))
    }

    pub fn entry_name(&self) -> &str {
        self.base.entry_name()
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        self.base.publish_policy()
    }

    pub fn set_publish_policy(&mut self, policy: PublishPolicy) {
        self.base.set_publish_policy(policy);
    }

    pub fn jndi_name(&self) -> &str {
        &self.jndi_name
    }

    pub fn set_jndi_name(&mut self, jndi_name: &str) -> Result<(), ModelError> {
        self.jndi_name = non_blank(Some(jndi_name)).ok_or(ModelError::BlankJndiName)?;
        Ok(())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_string())
}
