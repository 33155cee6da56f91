//! Fixed manifest schema, checked before the manifest is parsed.
//!
//! The validator walks the XML event stream once and enforces:
//! - the content model of every element (allowed children, order, occurrence)
//! - required and allowed attributes, publish literals, timestamp format
//! - uniqueness of archive paths, JNDI names and property names
//!
//! Namespace declarations and prefixed attributes (`xmlns`, `xsi:*`) are ignored.

use super::errors::{Constraint, SchemaError, MAX_MANIFEST_ENTRIES};
use super::{attributes as attr, elements as el, parse_timestamp};
use crate::manifest::{apply_suffix, normalize_archive_path, PublishPolicy};
use crate::manifest::{CONNECTION_SUFFIX, VDB_SUFFIX};
use crate::tree::props;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;

const DOCUMENT: &str = "#document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurs {
    Optional,
    Many,
}

#[derive(Debug, Clone, Copy)]
struct Child {
    name: &'static str,
    occurs: Occurs,
}

const fn optional(name: &'static str) -> Child {
    Child {
        name,
        occurs: Occurs::Optional,
    }
}

const fn many(name: &'static str) -> Child {
    Child {
        name,
        occurs: Occurs::Many,
    }
}

/// Children of the root, in schema sequence order.
const DATASERVICE_CHILDREN: &[Child] = &[
    optional(el::DESCRIPTION),
    optional(el::LAST_MODIFIED),
    optional(el::MODIFIED_BY),
    many(el::PROPERTY),
    optional(el::SERVICE_VDB),
    optional(el::METADATA),
    optional(el::CONNECTIONS),
    optional(el::DRIVERS),
    optional(el::UDFS),
    optional(el::VDBS),
    optional(el::RESOURCES),
];
const SERVICE_VDB_CHILDREN: &[Child] = &[optional(el::DEPENDENCIES)];
const VDB_FILES: &[Child] = &[many(el::VDB_FILE)];
const DDL_FILES: &[Child] = &[many(el::DDL_FILE)];
const CONNECTION_FILES: &[Child] = &[many(el::CONNECTION_FILE)];
const DRIVER_FILES: &[Child] = &[many(el::DRIVER_FILE)];
const UDF_FILES: &[Child] = &[many(el::UDF_FILE)];
const RESOURCE_FILES: &[Child] = &[many(el::RESOURCE_FILE)];

fn content_model(element: &str) -> &'static [Child] {
    match element {
        el::DATASERVICE => DATASERVICE_CHILDREN,
        el::SERVICE_VDB => SERVICE_VDB_CHILDREN,
        el::DEPENDENCIES | el::VDBS => VDB_FILES,
        el::METADATA => DDL_FILES,
        el::CONNECTIONS => CONNECTION_FILES,
        el::DRIVERS => DRIVER_FILES,
        el::UDFS => UDF_FILES,
        el::RESOURCES => RESOURCE_FILES,
        _ => &[],
    }
}

/// (attribute, required)
type AttributeRule = (&'static str, bool);

const NAME_REQUIRED: &[AttributeRule] = &[(attr::NAME, true)];
const VDB_ATTRIBUTES: &[AttributeRule] = &[
    (attr::PATH, true),
    (attr::PUBLISH, false),
    (attr::VDB_NAME, false),
    (attr::VDB_VERSION, false),
];
const CONNECTION_ATTRIBUTES: &[AttributeRule] = &[
    (attr::PATH, true),
    (attr::PUBLISH, false),
    (attr::JNDI_NAME, true),
];
const FILE_ATTRIBUTES: &[AttributeRule] = &[(attr::PATH, true), (attr::PUBLISH, false)];

fn attribute_rules(element: &str) -> &'static [AttributeRule] {
    match element {
        el::DATASERVICE | el::PROPERTY => NAME_REQUIRED,
        el::SERVICE_VDB | el::VDB_FILE => VDB_ATTRIBUTES,
        el::CONNECTION_FILE => CONNECTION_ATTRIBUTES,
        el::DDL_FILE | el::DRIVER_FILE | el::UDF_FILE | el::RESOURCE_FILE => FILE_ATTRIBUTES,
        _ => &[],
    }
}

fn holds_text(element: &str) -> bool {
    matches!(
        element,
        el::DESCRIPTION | el::LAST_MODIFIED | el::MODIFIED_BY | el::PROPERTY
    )
}

fn declares_entry(element: &str) -> bool {
    attribute_rules(element)
        .iter()
        .any(|(name, _)| *name == attr::PATH)
}

/// Tracks values per uniqueness constraint across the whole document.
#[derive(Default)]
pub(crate) struct UniqueTracker {
    seen: HashMap<Constraint, HashSet<String>>,
}

impl UniqueTracker {
    pub(crate) fn insert(&mut self, constraint: Constraint, value: String) -> Result<(), SchemaError> {
        let values = self.seen.entry(constraint).or_default();
        if values.contains(&value) {
            return Err(SchemaError::Duplicate { constraint, value });
        }
        values.insert(value);
        Ok(())
    }
}

/// One open element.
struct Frame {
    name: &'static str,
    last_child: Option<usize>,
    text: String,
}

impl Frame {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            last_child: None,
            text: String::new(),
        }
    }

    /// Check `child` against this element's content model.
    fn admit(&mut self, child: &str) -> Result<&'static str, SchemaError> {
        let model = content_model(self.name);
        let Some((rank, rule)) = model.iter().enumerate().find(|(_, c)| c.name == child) else {
            return Err(SchemaError::UnexpectedElement {
                element: child.to_string(),
                parent: self.name.to_string(),
            });
        };
        if let Some(last) = self.last_child {
            if rank < last {
                return Err(SchemaError::OutOfOrder {
                    element: child.to_string(),
                    parent: self.name.to_string(),
                });
            }
            if rank == last && rule.occurs == Occurs::Optional {
                return Err(SchemaError::Repeated {
                    element: child.to_string(),
                    parent: self.name.to_string(),
                });
            }
        }
        self.last_child = Some(rank);
        Ok(rule.name)
    }

    fn push_text(&mut self, text: &str) -> Result<(), SchemaError> {
        if holds_text(self.name) {
            self.text.push_str(text);
        } else if !text.trim().is_empty() {
            return Err(SchemaError::UnexpectedText {
                element: self.name.to_string(),
            });
        }
        Ok(())
    }

    fn close(self) -> Result<(), SchemaError> {
        if self.name == el::LAST_MODIFIED && parse_timestamp(&self.text).is_none() {
            return Err(SchemaError::InvalidContent {
                element: self.name.to_string(),
                value: self.text,
                reason: "expected yyyy-MM-ddTHH:mm:ss".into(),
            });
        }
        Ok(())
    }
}

/// Validate manifest bytes against the fixed schema.
pub fn validate_manifest(bytes: &[u8]) -> Result<(), SchemaError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().expand_empty_elements = true;

    let mut stack: Vec<Frame> = Vec::new();
    let mut unique = UniqueTracker::default();
    let mut root_seen = false;
    let mut entries = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| syntax(&reader, e))?;
        match event {
            Event::Start(start) => {
                let name = element_name(&reader, &start)?;
                let element = match stack.last_mut() {
                    Some(parent) => parent.admit(&name)?,
                    None if root_seen => {
                        return Err(SchemaError::UnexpectedElement {
                            element: name,
                            parent: DOCUMENT.into(),
                        })
                    }
                    None if name == el::DATASERVICE => {
                        root_seen = true;
                        el::DATASERVICE
                    }
                    None => return Err(SchemaError::UnexpectedRoot { found: name }),
                };
                check_attributes(&reader, element, &start, &mut unique)?;
                if declares_entry(element) {
                    entries += 1;
                    if entries > MAX_MANIFEST_ENTRIES {
                        return Err(SchemaError::TooManyEntries);
                    }
                }
                stack.push(Frame::new(element));
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    frame.close()?;
                }
            }
            Event::Text(text) => {
                let value = text.unescape().map_err(|e| syntax(&reader, e))?;
                push_text(&mut stack, &value)?;
            }
            Event::CData(data) => {
                let value = std::str::from_utf8(&data).map_err(|e| syntax(&reader, e))?;
                push_text(&mut stack, value)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(SchemaError::NoRoot);
    }
    if let Some(open) = stack.last() {
        return Err(SchemaError::Syntax {
            position: reader.buffer_position() as u64,
            message: format!("unclosed element '{}'", open.name),
        });
    }
    Ok(())
}

fn push_text(stack: &mut [Frame], text: &str) -> Result<(), SchemaError> {
    match stack.last_mut() {
        Some(frame) => frame.push_text(text),
        None if text.trim().is_empty() => Ok(()),
        None => Err(SchemaError::UnexpectedText {
            element: DOCUMENT.into(),
        }),
    }
}

fn check_attributes(
    reader: &Reader<&[u8]>,
    element: &'static str,
    start: &BytesStart<'_>,
    unique: &mut UniqueTracker,
) -> Result<(), SchemaError> {
    let rules = attribute_rules(element);
    let mut found: HashMap<&'static str, String> = HashMap::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| syntax(reader, e))?;
        if attribute.key.as_namespace_binding().is_some() || attribute.key.prefix().is_some() {
            continue;
        }
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(|e| syntax(reader, e))?;
        let Some((rule, _)) = rules.iter().find(|(name, _)| *name == key) else {
            return Err(SchemaError::UnexpectedAttribute {
                element: element.to_string(),
                attribute: key.to_string(),
            });
        };
        let value = attribute
            .unescape_value()
            .map_err(|e| syntax(reader, e))?
            .into_owned();
        found.insert(*rule, value);
    }

    for (name, required) in rules {
        if *required && !found.contains_key(name) {
            return Err(SchemaError::MissingAttribute {
                element: element.to_string(),
                attribute: name.to_string(),
            });
        }
    }

    let invalid = |attribute: &str, value: &str, reason: String| SchemaError::InvalidValue {
        element: element.to_string(),
        attribute: attribute.to_string(),
        value: value.to_string(),
        reason,
    };

    if let Some(name) = found.get(attr::NAME) {
        if name.trim().is_empty() {
            return Err(invalid(attr::NAME, name, "must not be blank".into()));
        }
        if element == el::PROPERTY {
            if props::is_internal(name) {
                return Err(invalid(
                    attr::NAME,
                    name,
                    format!("the '{}' prefix is reserved", props::PREFIX),
                ));
            }
            unique.insert(Constraint::PropertyName, name.clone())?;
        }
    }

    if let Some(publish) = found.get(attr::PUBLISH) {
        if PublishPolicy::from_xml(publish).is_none() {
            return Err(invalid(
                attr::PUBLISH,
                publish,
                "expected ALWAYS, IF_MISSING or NEVER".into(),
            ));
        }
    }

    if let Some(path) = found.get(attr::PATH) {
        let normalized =
            normalize_archive_path(path).map_err(|e| invalid(attr::PATH, path, e.to_string()))?;
        let normalized = match element {
            el::SERVICE_VDB | el::VDB_FILE => apply_suffix(&normalized, VDB_SUFFIX),
            el::CONNECTION_FILE => apply_suffix(&normalized, CONNECTION_SUFFIX),
            _ => normalized,
        };
        unique.insert(Constraint::ArchivePath, normalized)?;
    }

    if let Some(jndi) = found.get(attr::JNDI_NAME) {
        let trimmed = jndi.trim();
        if trimmed.is_empty() {
            return Err(invalid(attr::JNDI_NAME, jndi, "must not be blank".into()));
        }
        unique.insert(Constraint::JndiName, trimmed.to_string())?;
    }

    Ok(())
}

fn element_name(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<String, SchemaError> {
    let local = start.local_name();
    std::str::from_utf8(local.as_ref())
        .map(str::to_string)
        .map_err(|e| syntax(reader, e))
}

fn syntax<E: Display>(reader: &Reader<&[u8]>, err: E) -> SchemaError {
    SchemaError::Syntax {
        position: reader.buffer_position() as u64,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><dataservice name="ds">{body}</dataservice>"#)
    }

    #[test]
    fn accepts_minimal_manifest() {
        let xml = doc(r#"<drivers><driver-file path="driver1.jar" publish="IF_MISSING"/></drivers>"#);
        assert!(validate_manifest(xml.as_bytes()).is_ok());
    }

    #[test]
    fn accepts_indented_manifest_with_namespaces() {
        let xml = r#"<?xml version="1.0"?>
<dataservice xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:noNamespaceSchemaLocation="dataservice.xsd" name="ds">
    <description>Sales view</description>
    <last-modified>2024-02-29T23:59:59</last-modified>
    <property name="owner">ops</property>
    <service-vdb path="svc-vdb.xml" vdb-name="svc" vdb-version="1">
        <dependencies>
            <vdb-file path="vdbs/dep-vdb.xml" publish="ALWAYS"/>
        </dependencies>
    </service-vdb>
</dataservice>"#;
        assert_eq!(validate_manifest(xml.as_bytes()), Ok(()));
    }

    #[test]
    fn rejects_duplicate_archive_path_across_collections() {
        let xml = doc(
            r#"<drivers><driver-file path="lib/a.jar"/></drivers><udfs><udf-file path="lib/a.jar"/></udfs>"#,
        );
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::Duplicate { constraint: Constraint::ArchivePath, value }) if value == "lib/a.jar"
        ));
    }

    #[test]
    fn duplicate_path_detected_after_suffix_normalization() {
        let xml = doc(r#"<vdbs><vdb-file path="v.xml"/><vdb-file path="v-vdb.xml"/></vdbs>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::Duplicate { constraint: Constraint::ArchivePath, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_jndi_name() {
        let xml = doc(
            r#"<connections>
                <connection-file path="a-connection.xml" jndi-name="java:/pg"/>
                <connection-file path="b-connection.xml" jndi-name="java:/pg"/>
            </connections>"#,
        );
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::Duplicate { constraint: Constraint::JndiName, .. })
        ));
    }

    #[test]
    fn rejects_two_service_vdbs() {
        let xml = doc(r#"<service-vdb path="a-vdb.xml"/><service-vdb path="b-vdb.xml"/>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::Repeated { element, .. }) if element == "service-vdb"
        ));
    }

    #[test]
    fn rejects_duplicate_property_name() {
        let xml = doc(r#"<property name="a">1</property><property name="a">2</property>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::Duplicate { constraint: Constraint::PropertyName, .. })
        ));
    }

    #[test]
    fn rejects_reserved_property_prefix() {
        let xml = doc(r#"<property name="dsarc:path">evil.jar</property>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::InvalidValue { element, attribute, .. })
                if element == "property" && attribute == "name"
        ));
    }

    #[test]
    fn rejects_out_of_order_sections() {
        let xml = doc(r#"<resources/><drivers/>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::OutOfOrder { element, .. }) if element == "drivers"
        ));
    }

    #[test]
    fn rejects_misplaced_entry_element() {
        let xml = doc(r#"<drivers><vdb-file path="x-vdb.xml"/></drivers>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::UnexpectedElement { element, parent }) if element == "vdb-file" && parent == "drivers"
        ));
    }

    #[test]
    fn rejects_missing_and_unknown_attributes() {
        let missing = doc(r#"<connections><connection-file path="c-connection.xml"/></connections>"#);
        assert!(matches!(
            validate_manifest(missing.as_bytes()),
            Err(SchemaError::MissingAttribute { attribute, .. }) if attribute == "jndi-name"
        ));
        let unknown = doc(r#"<drivers><driver-file path="d.jar" size="3"/></drivers>"#);
        assert!(matches!(
            validate_manifest(unknown.as_bytes()),
            Err(SchemaError::UnexpectedAttribute { attribute, .. }) if attribute == "size"
        ));
    }

    #[test]
    fn rejects_unknown_publish_literal() {
        let xml = doc(r#"<drivers><driver-file path="d.jar" publish="SOMETIMES"/></drivers>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::InvalidValue { attribute, .. }) if attribute == "publish"
        ));
    }

    #[test]
    fn rejects_bad_timestamp() {
        let xml = doc(r#"<last-modified>2024-02-29 10:00</last-modified>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::InvalidContent { element, .. }) if element == "last-modified"
        ));
    }

    #[test]
    fn rejects_wrong_root_and_text_in_sections() {
        assert!(matches!(
            validate_manifest(b"<manifest name=\"x\"/>"),
            Err(SchemaError::UnexpectedRoot { .. })
        ));
        let xml = doc("<drivers>stray</drivers>");
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::UnexpectedText { .. })
        ));
        assert_eq!(validate_manifest(b"   "), Err(SchemaError::NoRoot));
    }

    #[test]
    fn rejects_parent_directory_paths() {
        let xml = doc(r#"<resources><resource-file path="../etc/passwd"/></resources>"#);
        assert!(matches!(
            validate_manifest(xml.as_bytes()),
            Err(SchemaError::InvalidValue { attribute, .. }) if attribute == "path"
        ));
    }
}
