//! Manifest writer.

use super::errors::CodecError;
use super::schema::validate_manifest;
use super::{attributes as attr, elements as el, TIMESTAMP_FORMAT};
use crate::manifest::{ConnectionEntry, DataServiceEntry, Manifest, VdbEntry};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;

/// Output formatting for [`write_manifest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub pretty: bool,
    pub indent: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            indent: 2,
        }
    }
}

impl WriteOptions {
    pub fn compact() -> Self {
        Self {
            pretty: false,
            indent: 0,
        }
    }
}

/// Serialize `manifest` as UTF-8 XML.
///
/// Unset optional elements and empty sections are omitted. Text content is
/// never padded, so pretty output reads back to the same manifest.
///
/// The output is checked against the manifest schema before it is returned.
/// Constraints the model cannot see on its own (archive paths or JNDI names
/// shared by two entries) fail here with [`CodecError::Schema`] rather than
/// on the next import.
pub fn write_manifest(manifest: &Manifest, options: WriteOptions) -> Result<Vec<u8>, CodecError> {
    let mut writer = if options.pretty {
        Writer::new_with_indent(Vec::new(), b' ', options.indent)
    } else {
        Writer::new(Vec::new())
    };
    let mut out = ManifestWriter {
        writer: &mut writer,
    };

    out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new(el::DATASERVICE);
    root.push_attribute((attr::NAME, manifest.name()));
    out.event(Event::Start(root))?;

    if let Some(description) = manifest.description() {
        out.text_element(el::DESCRIPTION, description)?;
    }
    if let Some(ts) = manifest.last_modified() {
        out.text_element(el::LAST_MODIFIED, &ts.format(TIMESTAMP_FORMAT).to_string())?;
    }
    if let Some(who) = manifest.modified_by() {
        out.text_element(el::MODIFIED_BY, who)?;
    }
    for (name, value) in manifest.properties() {
        let mut start = BytesStart::new(el::PROPERTY);
        start.push_attribute((attr::NAME, name.as_str()));
        out.event(Event::Start(start))?;
        out.event(Event::Text(BytesText::new(value)))?;
        out.event(Event::End(BytesEnd::new(el::PROPERTY)))?;
    }

    if let Some(service) = manifest.service_vdb() {
        let start = vdb_start(el::SERVICE_VDB, service.vdb());
        if service.dependencies().is_empty() {
            out.event(Event::Empty(start))?;
        } else {
            out.event(Event::Start(start))?;
            out.event(Event::Start(BytesStart::new(el::DEPENDENCIES)))?;
            for dependency in service.dependencies() {
                out.event(Event::Empty(vdb_start(el::VDB_FILE, dependency)))?;
            }
            out.event(Event::End(BytesEnd::new(el::DEPENDENCIES)))?;
            out.event(Event::End(BytesEnd::new(el::SERVICE_VDB)))?;
        }
    }

    out.plain_section(el::METADATA, el::DDL_FILE, manifest.metadata())?;
    if !manifest.connections().is_empty() {
        out.event(Event::Start(BytesStart::new(el::CONNECTIONS)))?;
        for connection in manifest.connections() {
            out.event(Event::Empty(connection_start(connection)))?;
        }
        out.event(Event::End(BytesEnd::new(el::CONNECTIONS)))?;
    }
    out.plain_section(el::DRIVERS, el::DRIVER_FILE, manifest.drivers())?;
    out.plain_section(el::UDFS, el::UDF_FILE, manifest.udfs())?;
    if !manifest.vdbs().is_empty() {
        out.event(Event::Start(BytesStart::new(el::VDBS)))?;
        for vdb in manifest.vdbs() {
            out.event(Event::Empty(vdb_start(el::VDB_FILE, vdb)))?;
        }
        out.event(Event::End(BytesEnd::new(el::VDBS)))?;
    }
    out.plain_section(el::RESOURCES, el::RESOURCE_FILE, manifest.resources())?;

    out.event(Event::End(BytesEnd::new(el::DATASERVICE)))?;

    let mut bytes = writer.into_inner();
    if options.pretty {
        bytes.push(b'\n');
    }
    validate_manifest(&bytes)?;
    Ok(bytes)
}

struct ManifestWriter<'w> {
    writer: &'w mut Writer<Vec<u8>>,
}

impl ManifestWriter<'_> {
    fn event(&mut self, event: Event<'_>) -> Result<(), CodecError> {
        self.writer.write_event(event).map_err(write_error)
    }

    fn text_element(&mut self, name: &str, text: &str) -> Result<(), CodecError> {
        self.event(Event::Start(BytesStart::new(name)))?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn plain_section(
        &mut self,
        section: &str,
        element: &str,
        entries: &[DataServiceEntry],
    ) -> Result<(), CodecError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.event(Event::Start(BytesStart::new(section)))?;
        for entry in entries {
            self.event(Event::Empty(entry_start(element, entry)))?;
        }
        self.event(Event::End(BytesEnd::new(section)))
    }
}

fn entry_start<'a>(element: &'a str, entry: &'a DataServiceEntry) -> BytesStart<'a> {
    let mut start = BytesStart::new(element);
    start.push_attribute((attr::PATH, entry.path()));
    start.push_attribute((attr::PUBLISH, entry.publish_policy().as_xml()));
    start
}

fn vdb_start<'a>(element: &'a str, vdb: &'a VdbEntry) -> BytesStart<'a> {
    let mut start = entry_start(element, vdb.base());
    if let Some(name) = vdb.vdb_name() {
        start.push_attribute((attr::VDB_NAME, name));
    }
    if let Some(version) = vdb.vdb_version() {
        start.push_attribute((attr::VDB_VERSION, version));
    }
    start
}

fn connection_start(connection: &ConnectionEntry) -> BytesStart<'_> {
    let mut start = entry_start(el::CONNECTION_FILE, connection.base());
    start.push_attribute((attr::JNDI_NAME, connection.jndi_name()));
    start
}

fn write_error<E: Display>(err: E) -> CodecError {
    CodecError::Write {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{read_manifest, Constraint, SchemaError};
    use crate::manifest::{PublishPolicy, ServiceVdbEntry};
    use chrono::NaiveDate;

    fn sample() -> Manifest {
        let mut m = Manifest::new("Portfolio").unwrap();
        m.set_description(Some("  Stocks & <bonds>  "));
        m.set_last_modified(Some(
            NaiveDate::from_ymd_opt(2023, 11, 14)
                .unwrap()
                .and_hms_opt(22, 13, 20)
                .unwrap(),
        ));
        m.set_modified_by(Some("elvis"));
        m.set_property("team", Some("markets")).unwrap();

        let mut svc = ServiceVdbEntry::new("PortfolioService-vdb.xml")
            .unwrap()
            .with_vdb("PortfolioService", "1");
        svc.add_dependency(
            VdbEntry::new("vdbs/Stocks-vdb.xml")
                .unwrap()
                .with_vdb("Stocks", "2")
                .with_policy(PublishPolicy::Always),
        );
        m.set_service_vdb(Some(svc));
        m.add_metadata(DataServiceEntry::new("metadata/portfolio.ddl").unwrap());
        m.add_connection(
            ConnectionEntry::new("connections/stocks-connection.xml", "java:/stocks").unwrap(),
        );
        m.add_driver(DataServiceEntry::new("drivers/mysql.jar").unwrap());
        m.add_udf(
            DataServiceEntry::new("udfs/math.jar")
                .unwrap()
                .with_policy(PublishPolicy::Never),
        );
        m.add_vdb(VdbEntry::new("vdbs/Extra-vdb.xml").unwrap());
        m.add_resource(DataServiceEntry::new("resources/readme.txt").unwrap());
        m
    }

    #[test]
    fn pretty_output_reads_back_identically() {
        let m = sample();
        let bytes = write_manifest(&m, WriteOptions::default()).unwrap();
        assert_eq!(read_manifest(&bytes).unwrap(), m);
    }

    #[test]
    fn compact_output_reads_back_identically() {
        let m = sample();
        let bytes = write_manifest(&m, WriteOptions::compact()).unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(read_manifest(&bytes).unwrap(), m);
    }

    #[test]
    fn omits_unset_optional_content() {
        let m = Manifest::new("bare").unwrap();
        let xml = String::from_utf8(write_manifest(&m, WriteOptions::compact()).unwrap()).unwrap();
        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?><dataservice name="bare"></dataservice>"#
        );
    }

    #[test]
    fn service_vdb_without_dependencies_is_empty_element() {
        let mut m = Manifest::new("ds").unwrap();
        m.set_service_vdb(Some(ServiceVdbEntry::new("svc-vdb.xml").unwrap()));
        let xml = String::from_utf8(write_manifest(&m, WriteOptions::compact()).unwrap()).unwrap();
        assert!(xml.contains(r#"<service-vdb path="svc-vdb.xml" publish="IF_MISSING"/>"#));
        assert!(!xml.contains("dependencies"));
    }

    #[test]
    fn connection_entry_round_trips_with_its_jndi_name() {
        let mut m = Manifest::new("DS").unwrap();
        m.add_connection(ConnectionEntry::new("c-connection.xml", "java:/c").unwrap());
        for options in [WriteOptions::default(), WriteOptions::compact()] {
            let bytes = write_manifest(&m, options).unwrap();
            assert_eq!(read_manifest(&bytes).unwrap(), m);
        }
    }

    #[test]
    fn shared_archive_path_is_refused_at_write_time() {
        let mut m = Manifest::new("ds").unwrap();
        m.add_driver(DataServiceEntry::new("lib/a.jar").unwrap());
        m.add_udf(DataServiceEntry::new("lib/a.jar").unwrap());
        assert!(matches!(
            write_manifest(&m, WriteOptions::default()),
            Err(CodecError::Schema(SchemaError::Duplicate {
                constraint: Constraint::ArchivePath,
                ..
            }))
        ));
    }

    #[test]
    fn properties_are_written_in_model_order() {
        let mut m = Manifest::new("ds").unwrap();
        m.set_property("zeta", Some("1")).unwrap();
        m.set_property("alpha", Some("2")).unwrap();
        let xml = String::from_utf8(write_manifest(&m, WriteOptions::compact()).unwrap()).unwrap();
        let zeta = xml.find(r#"name="zeta""#).unwrap();
        let alpha = xml.find(r#"name="alpha""#).unwrap();
        assert!(zeta < alpha);
    }

    #[test]
    fn writes_timestamp_in_manifest_format() {
        let xml = String::from_utf8(write_manifest(&sample(), WriteOptions::default()).unwrap())
            .unwrap();
        assert!(xml.contains("<last-modified>2023-11-14T22:13:20</last-modified>"));
        assert!(xml.contains(r#"jndi-name="java:/stocks""#));
    }
}
