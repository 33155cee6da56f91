//! Event-driven manifest reader.
//!
//! A single forward pass over the XML events. Scratch state (open element
//! stack, text buffer, VDB container mode) lives in a per-call [`ParseState`],
//! so the reader is a pure function of its input.

use super::errors::CodecError;
use super::schema::validate_manifest;
use super::{attributes as attr, elements as el, parse_timestamp};
use crate::manifest::{
    ConnectionEntry, DataServiceEntry, EntryKind, Manifest, PublishPolicy, ServiceVdbEntry,
    VdbEntry,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

/// Validate `bytes` against the manifest schema, then parse them.
pub fn read_manifest(bytes: &[u8]) -> Result<Manifest, CodecError> {
    validate_manifest(bytes)?;
    parse_manifest(bytes)
}

/// Parse without schema validation.
///
/// Structural problems the parser itself cannot resolve are reported as
/// [`CodecError::Malformed`]; uniqueness constraints are not checked.
pub fn parse_manifest(bytes: &[u8]) -> Result<Manifest, CodecError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().expand_empty_elements = true;
    let mut state = ParseState::default();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| xml_error(&reader, &e))?;
        match event {
            Event::Start(start) => state.open(&start)?,
            Event::End(_) => state.close()?,
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| xml_error(&reader, &e))?;
                state.text(&value)?;
            }
            Event::CData(data) => {
                let value = std::str::from_utf8(&data).map_err(|e| xml_error(&reader, &e))?;
                state.text(value)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

/// Which owner a `vdb-file` element attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum VdbContainer {
    #[default]
    Unknown,
    Manifest,
    ServiceVdb,
}

#[derive(Default)]
struct ParseState {
    stack: Vec<String>,
    container: VdbContainer,
    text: String,
    property_name: Option<String>,
    manifest: Option<Manifest>,
    service_vdb: Option<ServiceVdbEntry>,
}

impl ParseState {
    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), CodecError> {
        let name = local_name(start)?;
        let attrs = attributes(start)?;
        let parent = self.stack.last().cloned();

        match (name.as_str(), parent.as_deref()) {
            (el::DATASERVICE, None) => {
                if self.manifest.is_some() {
                    return Err(CodecError::malformed("second 'dataservice' root element"));
                }
                let manifest_name = required(&attrs, el::DATASERVICE, attr::NAME)?;
                self.manifest = Some(Manifest::new(manifest_name).map_err(model)?);
            }
            (el::DESCRIPTION | el::LAST_MODIFIED | el::MODIFIED_BY, Some(el::DATASERVICE)) => {
                self.text.clear();
            }
            (el::PROPERTY, Some(el::DATASERVICE)) => {
                self.text.clear();
                self.property_name = Some(required(&attrs, el::PROPERTY, attr::NAME)?.to_string());
            }
            (el::SERVICE_VDB, Some(el::DATASERVICE)) => {
                if self.service_vdb.is_some() || self.manifest()?.service_vdb().is_some() {
                    return Err(CodecError::malformed("more than one 'service-vdb' element"));
                }
                let path = required(&attrs, el::SERVICE_VDB, attr::PATH)?;
                let mut service = ServiceVdbEntry::new(path)
                    .map_err(model)?
                    .with_policy(policy(&attrs));
                service.vdb_mut().set_vdb_name(attr_value(&attrs, attr::VDB_NAME));
                service.vdb_mut().set_vdb_version(attr_value(&attrs, attr::VDB_VERSION));
                self.service_vdb = Some(service);
            }
            (el::DEPENDENCIES, Some(el::SERVICE_VDB)) => {
                self.container = VdbContainer::ServiceVdb;
            }
            (el::VDBS, Some(el::DATASERVICE)) => {
                self.container = VdbContainer::Manifest;
            }
            (el::METADATA | el::CONNECTIONS | el::DRIVERS | el::UDFS | el::RESOURCES, Some(el::DATASERVICE)) => {}
            (el::VDB_FILE, _) => self.open_vdb_file(&attrs)?,
            (el::CONNECTION_FILE, Some(el::CONNECTIONS)) => {
                let path = required(&attrs, el::CONNECTION_FILE, attr::PATH)?;
                let jndi_name = required(&attrs, el::CONNECTION_FILE, attr::JNDI_NAME)?;
                let entry = ConnectionEntry::new(path, jndi_name)
                    .map_err(model)?
                    .with_policy(policy(&attrs));
                self.manifest_mut()?.add_connection(entry);
            }
            (el::DDL_FILE, Some(el::METADATA)) => self.add_plain(EntryKind::Metadata, &attrs)?,
            (el::DRIVER_FILE, Some(el::DRIVERS)) => self.add_plain(EntryKind::Driver, &attrs)?,
            (el::UDF_FILE, Some(el::UDFS)) => self.add_plain(EntryKind::Udf, &attrs)?,
            (el::RESOURCE_FILE, Some(el::RESOURCES)) => {
                self.add_plain(EntryKind::Resource, &attrs)?
            }
            (other, parent) => {
                return Err(CodecError::malformed(format!(
                    "unexpected element '{}' inside '{}'",
                    other,
                    parent.unwrap_or("#document")
                )));
            }
        }

        self.stack.push(name);
        Ok(())
    }

    fn open_vdb_file(&mut self, attrs: &HashMap<String, String>) -> Result<(), CodecError> {
        let path = required(attrs, el::VDB_FILE, attr::PATH)?;
        let mut entry = VdbEntry::new(path).map_err(model)?.with_policy(policy(attrs));
        entry.set_vdb_name(attr_value(attrs, attr::VDB_NAME));
        entry.set_vdb_version(attr_value(attrs, attr::VDB_VERSION));

        match self.container {
            VdbContainer::Manifest => self.manifest_mut()?.add_vdb(entry),
            VdbContainer::ServiceVdb => match self.service_vdb.as_mut() {
                Some(service) => service.add_dependency(entry),
                None => {
                    return Err(CodecError::malformed(
                        "'vdb-file' dependency without an open 'service-vdb'",
                    ))
                }
            },
            VdbContainer::Unknown => {
                return Err(CodecError::malformed(format!(
                    "'vdb-file' with path '{path}' outside 'vdbs' and 'dependencies'"
                )))
            }
        }
        Ok(())
    }

    fn add_plain(
        &mut self,
        kind: EntryKind,
        attrs: &HashMap<String, String>,
    ) -> Result<(), CodecError> {
        let path = required(attrs, kind.element(), attr::PATH)?;
        let entry = DataServiceEntry::new(path)
            .map_err(model)?
            .with_policy(policy(attrs));
        self.manifest_mut()?.add_plain(kind, entry);
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        let Some(name) = self.stack.pop() else {
            return Err(CodecError::malformed("closing tag without an open element"));
        };

        match name.as_str() {
            el::DESCRIPTION => {
                let text = std::mem::take(&mut self.text);
                self.manifest_mut()?.set_description(Some(&text));
            }
            el::LAST_MODIFIED => {
                let text = std::mem::take(&mut self.text);
                let ts = parse_timestamp(&text).ok_or_else(|| {
                    CodecError::malformed(format!("invalid last-modified timestamp '{text}'"))
                })?;
                self.manifest_mut()?.set_last_modified(Some(ts));
            }
            el::MODIFIED_BY => {
                let text = std::mem::take(&mut self.text);
                self.manifest_mut()?.set_modified_by(Some(&text));
            }
            el::PROPERTY => {
                let text = std::mem::take(&mut self.text);
                let key = self.property_name.take().unwrap_or_default();
                self.manifest_mut()?
                    .set_property(&key, Some(&text))
                    .map_err(model)?;
            }
            el::SERVICE_VDB => {
                let service = self.service_vdb.take();
                self.manifest_mut()?.set_service_vdb(service);
            }
            el::DEPENDENCIES | el::VDBS => {
                self.container = VdbContainer::Unknown;
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, value: &str) -> Result<(), CodecError> {
        match self.stack.last().map(String::as_str) {
            Some(el::DESCRIPTION | el::LAST_MODIFIED | el::MODIFIED_BY | el::PROPERTY) => {
                self.text.push_str(value);
                Ok(())
            }
            _ if value.trim().is_empty() => Ok(()),
            Some(element) => Err(CodecError::malformed(format!(
                "unexpected text inside '{element}'"
            ))),
            None => Err(CodecError::malformed("text outside the root element")),
        }
    }

    fn finish(self) -> Result<Manifest, CodecError> {
        if let Some(open) = self.stack.last() {
            return Err(CodecError::malformed(format!(
                "document ended inside '{open}'"
            )));
        }
        self.manifest
            .ok_or_else(|| CodecError::malformed("missing 'dataservice' root element"))
    }

    fn manifest(&self) -> Result<&Manifest, CodecError> {
        self.manifest
            .as_ref()
            .ok_or_else(|| CodecError::malformed("entry before the 'dataservice' root"))
    }

    fn manifest_mut(&mut self) -> Result<&mut Manifest, CodecError> {
        self.manifest
            .as_mut()
            .ok_or_else(|| CodecError::malformed("entry before the 'dataservice' root"))
    }
}

fn local_name(start: &BytesStart<'_>) -> Result<String, CodecError> {
    let local = start.local_name();
    std::str::from_utf8(local.as_ref())
        .map(str::to_string)
        .map_err(|e| CodecError::malformed(e.to_string()))
}

/// Unprefixed attributes of `start`, unescaped.
fn attributes(start: &BytesStart<'_>) -> Result<HashMap<String, String>, CodecError> {
    let mut out = HashMap::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| CodecError::malformed(e.to_string()))?;
        if attribute.key.as_namespace_binding().is_some() || attribute.key.prefix().is_some() {
            continue;
        }
        let key = std::str::from_utf8(attribute.key.as_ref())
            .map_err(|e| CodecError::malformed(e.to_string()))?
            .to_string();
        let value = attribute
            .unescape_value()
            .map_err(|e| CodecError::malformed(e.to_string()))?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn attr_value<'a>(attrs: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    attrs.get(name).map(String::as_str)
}

fn required<'a>(
    attrs: &'a HashMap<String, String>,
    element: &str,
    name: &str,
) -> Result<&'a str, CodecError> {
    attr_value(attrs, name).ok_or_else(|| {
        CodecError::malformed(format!("'{element}' is missing attribute '{name}'"))
    })
}

fn policy(attrs: &HashMap<String, String>) -> PublishPolicy {
    PublishPolicy::parse_lenient(attr_value(attrs, attr::PUBLISH))
}

fn model(err: crate::manifest::ModelError) -> CodecError {
    CodecError::malformed(err.to_string())
}

fn xml_error(reader: &Reader<&[u8]>, err: &dyn std::fmt::Display) -> CodecError {
    CodecError::malformed(format!(
        "XML error at byte {}: {}",
        reader.buffer_position(),
        err
    ))
}
