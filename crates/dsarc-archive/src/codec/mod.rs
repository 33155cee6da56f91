//! Manifest XML codec.
//!
//! `META-INF/dataservice.xml` is validated against the fixed manifest schema
//! before it is parsed: uniqueness of archive paths, JNDI names and property
//! names is a schema constraint, so a manifest that violates it never reaches
//! the event-driven parser.
//!
//! ```text
//! bytes ──validate_manifest──▶ ok ──parse_manifest──▶ Manifest
//! Manifest ──write_manifest(options)──▶ bytes
//! ```
//!
//! Round-trip law: `read_manifest(&write_manifest(m, opts)?)? == m` for any
//! options, pretty-printed or not.

mod errors;
pub mod reader;
pub mod schema;
pub mod writer;

pub use errors::{CodecError, Constraint, SchemaError, MAX_MANIFEST_ENTRIES};
pub use reader::{parse_manifest, read_manifest};
pub use schema::validate_manifest;
pub use writer::{write_manifest, WriteOptions};

/// Fixed archive path of the manifest.
pub const MANIFEST_PATH: &str = "META-INF/dataservice.xml";

/// `yyyy-MM-dd'T'HH:mm:ss`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Element names of the manifest schema.
pub mod elements {
    pub const DATASERVICE: &str = "dataservice";
    pub const DESCRIPTION: &str = "description";
    pub const LAST_MODIFIED: &str = "last-modified";
    pub const MODIFIED_BY: &str = "modified-by";
    pub const PROPERTY: &str = "property";
    pub const SERVICE_VDB: &str = "service-vdb";
    pub const DEPENDENCIES: &str = "dependencies";
    pub const METADATA: &str = "metadata";
    pub const CONNECTIONS: &str = "connections";
    pub const DRIVERS: &str = "drivers";
    pub const UDFS: &str = "udfs";
    pub const VDBS: &str = "vdbs";
    pub const RESOURCES: &str = "resources";
    pub const DDL_FILE: &str = "ddl-file";
    pub const CONNECTION_FILE: &str = "connection-file";
    pub const DRIVER_FILE: &str = "driver-file";
    pub const UDF_FILE: &str = "udf-file";
    pub const VDB_FILE: &str = "vdb-file";
    pub const RESOURCE_FILE: &str = "resource-file";
}

/// Attribute names of the manifest schema.
pub mod attributes {
    pub const NAME: &str = "name";
    pub const PATH: &str = "path";
    pub const PUBLISH: &str = "publish";
    pub const JNDI_NAME: &str = "jndi-name";
    pub const VDB_NAME: &str = "vdb-name";
    pub const VDB_VERSION: &str = "vdb-version";
}

pub(crate) fn parse_timestamp(value: &str) -> Option<chrono::NaiveDateTime> {
    chrono::NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).ok()
}
