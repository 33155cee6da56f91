//! Data service manifest model.
//!
//! Plain value types describing `META-INF/dataservice.xml`. A `Manifest` is
//! built fresh by every read or export and never outlives that call.
//! Mutators keep the invariants the codec relies on:
//!
//! - the manifest name is never blank
//! - optional text fields hold `None` instead of empty strings
//! - timestamps carry no sub-second component
//! - property names are non-blank, unique and outside the reserved `dsarc:`
//!   namespace; properties keep the order they were first set in
//! - connection entries always carry a JNDI name
//! - dependency VDBs always report the service VDB as their owner

pub mod entry;
pub mod policy;

use crate::tree::props;
use chrono::{NaiveDateTime, Timelike};

pub use entry::{
    apply_suffix, normalize_archive_path, ConnectionEntry, DataServiceEntry, EntryKind,
    ServiceVdbEntry, VdbEntry, VdbOwner, CONNECTION_SUFFIX, VDB_SUFFIX,
};
pub use policy::PublishPolicy;

use entry::non_blank;

/// Violations of model invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("manifest name must not be blank")]
    BlankName,

    #[error("property name must not be blank")]
    BlankPropertyName,

    #[error("property name '{name}' uses the reserved '{prefix}' prefix", prefix = props::PREFIX)]
    ReservedPropertyName { name: String },

    #[error("connection JNDI name must not be blank")]
    BlankJndiName,

    #[error("entry path must not be empty")]
    EmptyPath,

    #[error("invalid entry path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

/// In-memory form of a data service manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    name: String,
    description: Option<String>,
    last_modified: Option<NaiveDateTime>,
    modified_by: Option<String>,
    properties: Vec<(String, String)>,
    service_vdb: Option<ServiceVdbEntry>,
    connections: Vec<ConnectionEntry>,
    drivers: Vec<DataServiceEntry>,
    metadata: Vec<DataServiceEntry>,
    udfs: Vec<DataServiceEntry>,
    resources: Vec<DataServiceEntry>,
    vdbs: Vec<VdbEntry>,
}

/// Borrowed view of one entry of any kind, used for uniform iteration.
#[derive(Debug, Clone, Copy)]
pub struct EntryRef<'a> {
    pub kind: EntryKind,
    pub base: &'a DataServiceEntry,
    pub vdb: Option<&'a VdbEntry>,
    pub connection: Option<&'a ConnectionEntry>,
}

impl<'a> EntryRef<'a> {
    pub fn path(&self) -> &'a str {
        self.base.path()
    }

    pub fn entry_name(&self) -> &'a str {
        self.base.entry_name()
    }

    pub fn publish_policy(&self) -> PublishPolicy {
        self.base.publish_policy()
    }
}

impl Manifest {
    pub fn new(name: &str) -> Result<Self, ModelError> {
        let name = non_blank(Some(name)).ok_or(ModelError::BlankName)?;
        Ok(Self {
            name,
            description: None,
            last_modified: None,
            modified_by: None,
            properties: Vec::new(),
            service_vdb: None,
            connections: Vec::new(),
            drivers: Vec::new(),
            metadata: Vec::new(),
            udfs: Vec::new(),
            resources: Vec::new(),
            vdbs: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), ModelError> {
        self.name = non_blank(Some(name)).ok_or(ModelError::BlankName)?;
        Ok(())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<&str>) {
        self.description = description.filter(|d| !d.is_empty()).map(str::to_string);
    }

    pub fn last_modified(&self) -> Option<NaiveDateTime> {
        self.last_modified
    }

    /// Stores the timestamp truncated to whole seconds.
    pub fn set_last_modified(&mut self, last_modified: Option<NaiveDateTime>) {
        self.last_modified = last_modified.map(|ts| ts.with_nanosecond(0).unwrap_or(ts));
    }

    pub fn modified_by(&self) -> Option<&str> {
        self.modified_by.as_deref()
    }

    pub fn set_modified_by(&mut self, modified_by: Option<&str>) {
        self.modified_by = non_blank(modified_by);
    }

    /// Properties in the order they were first set.
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set or clear a property. `None` or an empty value removes it.
    ///
    /// Replacing a value keeps the property's position.
    pub fn set_property(&mut self, name: &str, value: Option<&str>) -> Result<(), ModelError> {
        if name.trim().is_empty() {
            return Err(ModelError::BlankPropertyName);
        }
        if props::is_internal(name) {
            return Err(ModelError::ReservedPropertyName {
                name: name.to_string(),
            });
        }
        let position = self.properties.iter().position(|(key, _)| key == name);
        match (value.filter(|v| !v.is_empty()), position) {
            (Some(value), Some(i)) => self.properties[i].1 = value.to_string(),
            (Some(value), None) => self.properties.push((name.to_string(), value.to_string())),
            (None, Some(i)) => {
                self.properties.remove(i);
            }
            (None, None) => {}
        }
        Ok(())
    }

    pub fn service_vdb(&self) -> Option<&ServiceVdbEntry> {
        self.service_vdb.as_ref()
    }

    pub fn set_service_vdb(&mut self, service_vdb: Option<ServiceVdbEntry>) {
        self.service_vdb = service_vdb.map(|mut svc| {
            svc.vdb_mut().set_owner(VdbOwner::Manifest);
            svc
        });
    }

    pub fn connections(&self) -> &[ConnectionEntry] {
        &self.connections
    }

    pub fn add_connection(&mut self, entry: ConnectionEntry) {
        self.connections.push(entry);
    }

    pub fn drivers(&self) -> &[DataServiceEntry] {
        &self.drivers
    }

    pub fn add_driver(&mut self, entry: DataServiceEntry) {
        self.drivers.push(entry);
    }

    pub fn metadata(&self) -> &[DataServiceEntry] {
        &self.metadata
    }

    pub fn add_metadata(&mut self, entry: DataServiceEntry) {
        self.metadata.push(entry);
    }

    pub fn udfs(&self) -> &[DataServiceEntry] {
        &self.udfs
    }

    pub fn add_udf(&mut self, entry: DataServiceEntry) {
        self.udfs.push(entry);
    }

    pub fn resources(&self) -> &[DataServiceEntry] {
        &self.resources
    }

    pub fn add_resource(&mut self, entry: DataServiceEntry) {
        self.resources.push(entry);
    }

    pub fn vdbs(&self) -> &[VdbEntry] {
        &self.vdbs
    }

    pub fn add_vdb(&mut self, mut entry: VdbEntry) {
        entry.set_owner(VdbOwner::Manifest);
        self.vdbs.push(entry);
    }

    /// Add a plain entry to the collection matching `kind`.
    ///
    /// VDB and connection kinds carry extra fields and have their own adders;
    /// passing one of them here is a no-op that returns `false`.
    pub fn add_plain(&mut self, kind: EntryKind, entry: DataServiceEntry) -> bool {
        let target = match kind {
            EntryKind::Driver => &mut self.drivers,
            EntryKind::Metadata => &mut self.metadata,
            EntryKind::Udf => &mut self.udfs,
            EntryKind::Resource => &mut self.resources,
            _ => return false,
        };
        target.push(entry);
        true
    }

    /// Every entry in collection order: service VDB, its dependencies,
    /// metadata, connections, drivers, UDFs, VDBs, resources.
    pub fn entries(&self) -> Vec<EntryRef<'_>> {
        let mut out = Vec::new();
        if let Some(svc) = &self.service_vdb {
            out.push(vdb_ref(EntryKind::ServiceVdb, svc.vdb()));
            out.extend(
                svc.dependencies()
                    .iter()
                    .map(|dep| vdb_ref(EntryKind::Dependency, dep)),
            );
        }
        out.extend(self.metadata.iter().map(|e| plain_ref(EntryKind::Metadata, e)));
        out.extend(self.connections.iter().map(|c| EntryRef {
            kind: EntryKind::Connection,
            base: c.base(),
            vdb: None,
            connection: Some(c),
        }));
        out.extend(self.drivers.iter().map(|e| plain_ref(EntryKind::Driver, e)));
        out.extend(self.udfs.iter().map(|e| plain_ref(EntryKind::Udf, e)));
        out.extend(self.vdbs.iter().map(|v| vdb_ref(EntryKind::Vdb, v)));
        out.extend(self.resources.iter().map(|e| plain_ref(EntryKind::Resource, e)));
        out
    }

    pub fn entry_count(&self) -> usize {
        let service = self
            .service_vdb
            .as_ref()
            .map(|s| 1 + s.dependencies().len())
            .unwrap_or(0);
        service
            + self.metadata.len()
            + self.connections.len()
            + self.drivers.len()
            + self.udfs.len()
            + self.vdbs.len()
            + self.resources.len()
    }

    pub fn find_entry(&self, path: &str) -> Option<EntryRef<'_>> {
        self.entries().into_iter().find(|e| e.path() == path)
    }
}

fn plain_ref(kind: EntryKind, base: &DataServiceEntry) -> EntryRef<'_> {
    EntryRef {
        kind,
        base,
        vdb: None,
        connection: None,
    }
}

fn vdb_ref(kind: EntryKind, vdb: &VdbEntry) -> EntryRef<'_> {
    EntryRef {
        kind,
        base: vdb.base(),
        vdb: Some(vdb),
        connection: None,
    }
}
