//! Connection sub-codec.
//!
//! ```xml
//! <connection name="stocks" jndi-name="java:/stocks" driver-name="mysql" jdbc="true">
//!   <property name="url">jdbc:mysql://db/stocks</property>
//! </connection>
//! ```

use super::DelegateError;
use crate::tree::{props, ContentTree, NodeId};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;

const WHAT: &str = "connection";

/// A data source connection definition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Connection {
    pub name: String,
    pub jndi_name: String,
    pub driver_name: Option<String>,
    pub jdbc: bool,
    pub properties: BTreeMap<String, String>,
}

impl Connection {
    /// Copy the connection onto a tree node.
    ///
    /// User properties share the node with the engine's own keys, so a
    /// property named with the reserved prefix is refused before anything
    /// is written.
    pub fn store<T: ContentTree + ?Sized>(&self, tree: &mut T, node: NodeId) -> Result<(), DelegateError> {
        if let Some(key) = self.properties.keys().find(|key| props::is_internal(key)) {
            return Err(reserved(key));
        }
        tree.set_property(node, props::NAME, Some(&self.name))?;
        tree.set_property(node, props::JNDI_NAME, Some(&self.jndi_name))?;
        tree.set_property(node, props::DRIVER_NAME, self.driver_name.as_deref())?;
        tree.set_property(node, props::JDBC, Some(if self.jdbc { "true" } else { "false" }))?;
        for (key, value) in &self.properties {
            tree.set_property(node, key, Some(value))?;
        }
        Ok(())
    }

    /// Rebuild a connection from a node written by [`store`](Self::store).
    pub fn load<T: ContentTree + ?Sized>(tree: &T, node: NodeId) -> Result<Self, DelegateError> {
        let name = match tree.property(node, props::NAME)? {
            Some(name) => name.to_string(),
            None => tree.name(node)?.to_string(),
        };
        let jndi_name = tree
            .property(node, props::JNDI_NAME)?
            .ok_or(DelegateError::MissingField {
                what: WHAT,
                field: "jndi-name",
            })?
            .to_string();
        let driver_name = tree.property(node, props::DRIVER_NAME)?.map(str::to_string);
        let jdbc = tree.property(node, props::JDBC)? != Some("false");
        let mut properties = BTreeMap::new();
        for key in tree.property_names(node)? {
            if props::is_internal(&key) {
                continue;
            }
            if let Some(value) = tree.property(node, &key)? {
                properties.insert(key, value.to_string());
            }
        }
        Ok(Self {
            name,
            jndi_name,
            driver_name,
            jdbc,
            properties,
        })
    }
}

/// Converts connection payloads to and from [`Connection`] values.
pub trait ConnectionCodec {
    fn read(&self, bytes: &[u8]) -> Result<Connection, DelegateError>;

    fn write(&self, connection: &Connection) -> Result<Vec<u8>, DelegateError>;
}

/// The default XML connection format.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlConnectionCodec;

impl ConnectionCodec for XmlConnectionCodec {
    fn read(&self, bytes: &[u8]) -> Result<Connection, DelegateError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().expand_empty_elements = true;

        let mut connection: Option<Connection> = None;
        let mut property: Option<(String, String)> = None;

        loop {
            match reader.read_event().map_err(invalid)? {
                Event::Start(start) => match start.local_name().as_ref() {
                    b"connection" if connection.is_none() => {
                        let mut attrs = attribute_map(&start)?;
                        let name = attrs.remove("name").ok_or(DelegateError::MissingField {
                            what: WHAT,
                            field: "name",
                        })?;
                        let jndi_name =
                            attrs.remove("jndi-name").ok_or(DelegateError::MissingField {
                                what: WHAT,
                                field: "jndi-name",
                            })?;
                        connection = Some(Connection {
                            name,
                            jndi_name,
                            driver_name: attrs.remove("driver-name"),
                            jdbc: attrs.remove("jdbc").as_deref() != Some("false"),
                            properties: BTreeMap::new(),
                        });
                    }
                    b"property" if connection.is_some() && property.is_none() => {
                        let mut attrs = attribute_map(&start)?;
                        let key = attrs.remove("name").ok_or(DelegateError::MissingField {
                            what: WHAT,
                            field: "property/@name",
                        })?;
                        if props::is_internal(&key) {
                            return Err(reserved(&key));
                        }
                        property = Some((key, String::new()));
                    }
                    other => {
                        return Err(invalid(format!(
                            "unexpected element '{}'",
                            String::from_utf8_lossy(other)
                        )))
                    }
                },
                Event::Text(text) => {
                    if let Some((_, value)) = property.as_mut() {
                        value.push_str(&text.unescape().map_err(invalid)?);
                    }
                }
                Event::End(end) => {
                    if end.local_name().as_ref() == b"property" {
                        if let (Some((key, value)), Some(conn)) = (property.take(), connection.as_mut()) {
                            conn.properties.insert(key, value);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        connection.ok_or_else(|| invalid("no 'connection' root element"))
    }

    fn write(&self, connection: &Connection) -> Result<Vec<u8>, DelegateError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let mut root = BytesStart::new("connection");
        root.push_attribute(("name", connection.name.as_str()));
        root.push_attribute(("jndi-name", connection.jndi_name.as_str()));
        if let Some(driver) = &connection.driver_name {
            root.push_attribute(("driver-name", driver.as_str()));
        }
        root.push_attribute(("jdbc", if connection.jdbc { "true" } else { "false" }));

        let mut events = vec![
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
            Event::Start(root),
        ];
        for (key, value) in &connection.properties {
            let mut start = BytesStart::new("property");
            start.push_attribute(("name", key.as_str()));
            events.push(Event::Start(start));
            events.push(Event::Text(BytesText::new(value)));
            events.push(Event::End(BytesEnd::new("property")));
        }
        events.push(Event::End(BytesEnd::new("connection")));

        for event in events {
            writer.write_event(event).map_err(|e| DelegateError::Serialize {
                what: WHAT,
                reason: e.to_string(),
            })?;
        }
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn attribute_map(start: &BytesStart<'_>) -> Result<BTreeMap<String, String>, DelegateError> {
    let mut out = BTreeMap::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(invalid)?;
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(invalid)?.into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

fn reserved(name: &str) -> DelegateError {
    DelegateError::ReservedProperty {
        what: WHAT,
        name: name.to_string(),
    }
}

fn invalid(reason: impl std::fmt::Display) -> DelegateError {
    DelegateError::Invalid {
        what: WHAT,
        reason: reason.to_string(),
    }
}
