//! Property sets and declared property types.
//!
//! A property set is XML:
//!
//! ```xml
//! <codeGenerator>
//!   <propertySet>
//!     <property name="ClassName">Customer</property>
//!     <property name="Columns"><string>Id</string><string>Name</string></property>
//!   </propertySet>
//! </codeGenerator>
//! ```
//!
//! `<codeSmith>` is accepted as the root as well. Values are kept as raw inner
//! XML until they are bound, when the declared [`PropertyType`] decides how
//! to read them.

use std::fmt::Display;

use mlua::{Lua, LuaSerdeExt, Value};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value as JsonValue};

use crate::schema::{self, SchemaKind};

const ROOT_NAMES: [&[u8]; 2] = [b"codeGenerator", b"codeSmith"];
const SET_NAME: &[u8] = b"propertySet";
const PROPERTY_NAME: &[u8] = b"property";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    #[error("invalid property set: {0}")]
    Envelope(String),

    #[error("malformed property XML: {0}")]
    Xml(String),

    #[error("property '{property}' cannot be read as {type_name}: {message}")]
    Value {
        property: String,
        type_name: String,
        message: String,
    },
}

fn xml_error(err: impl Display) -> PropertyError {
    PropertyError::Xml(err.to_string())
}

// =========================================================================
// Property set
// =========================================================================

/// Ordered `(name, raw inner XML)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet {
    entries: Vec<(String, String)>,
}

impl PropertySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a property-set document, validating its envelope.
    pub fn parse(xml: &str) -> Result<Self, PropertyError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut set = PropertySet::new();
        let mut depth = 0_u32;
        let mut seen_set = false;

        loop {
            match reader.read_event().map_err(xml_error)? {
                Event::Start(e) => match depth {
                    0 if is_root(&e) => depth = 1,
                    1 if e.name().as_ref() == SET_NAME && !seen_set => {
                        seen_set = true;
                        depth = 2;
                    }
                    2 if e.name().as_ref() == PROPERTY_NAME => {
                        let name = property_name(&e)?;
                        let value = reader.read_text(e.name()).map_err(xml_error)?;
                        set.entries.push((name, value.into_owned()));
                    }
                    _ => return Err(unexpected_element(&e)),
                },
                Event::Empty(e) => match depth {
                    1 if e.name().as_ref() == SET_NAME && !seen_set => seen_set = true,
                    2 if e.name().as_ref() == PROPERTY_NAME => {
                        set.entries.push((property_name(&e)?, String::new()));
                    }
                    _ => return Err(unexpected_element(&e)),
                },
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(xml_error)?;
                    if !text.trim().is_empty() {
                        return Err(PropertyError::Envelope(format!(
                            "unexpected text '{}'",
                            text.trim()
                        )));
                    }
                }
                Event::CData(_) => {
                    return Err(PropertyError::Envelope(
                        "unexpected CDATA outside a property".to_string(),
                    ));
                }
                Event::Eof => {
                    return Err(PropertyError::Envelope(
                        "document ended before the property set was closed".to_string(),
                    ));
                }
                _ => {}
            }
        }

        if !seen_set {
            return Err(PropertyError::Envelope(
                "missing <propertySet> element".to_string(),
            ));
        }
        Ok(set)
    }

    /// Append a plain text value, escaping it.
    pub fn push(&mut self, name: impl Into<String>, value: &str) {
        self.entries.push((name.into(), escape(value).into_owned()));
    }

    /// Append a value that is already XML content.
    pub fn push_raw(&mut self, name: impl Into<String>, raw: impl Into<String>) {
        self.entries.push((name.into(), raw.into()));
    }

    /// Append every entry of another set.
    pub fn extend(&mut self, other: &PropertySet) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Raw value of the last entry with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize with the `codeGenerator` root.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<codeGenerator>\n  <propertySet>\n");
        for (name, value) in &self.entries {
            xml.push_str(&format!(
                "    <property name=\"{}\">{}</property>\n",
                escape(name.as_str()),
                value
            ));
        }
        xml.push_str("  </propertySet>\n</codeGenerator>\n");
        xml
    }
}

fn is_root(e: &BytesStart<'_>) -> bool {
    ROOT_NAMES.contains(&e.name().as_ref())
}

fn property_name(e: &BytesStart<'_>) -> Result<String, PropertyError> {
    for attr in e.attributes() {
        let attr = attr.map_err(xml_error)?;
        if attr.key.as_ref() == b"name" {
            return Ok(attr.unescape_value().map_err(xml_error)?.into_owned());
        }
    }
    Err(PropertyError::Envelope(
        "<property> element without a name attribute".to_string(),
    ))
}

fn unexpected_element(e: &BytesStart<'_>) -> PropertyError {
    PropertyError::Envelope(format!(
        "unexpected element <{}>",
        String::from_utf8_lossy(e.name().as_ref())
    ))
}

// =========================================================================
// Property types
// =========================================================================

/// How a declared property's raw value is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Text,
    Integer,
    Number,
    Boolean,
    List(Box<PropertyType>),
    Schema(SchemaKind),
    /// Any other type: the XML tree becomes nested tables.
    Structured(String),
}

impl PropertyType {
    /// Map a declared type descriptor.
    pub fn parse(descriptor: &str) -> Self {
        let descriptor = descriptor.trim();
        if let Some(inner) = descriptor.strip_suffix("[]") {
            return PropertyType::List(Box::new(Self::parse(inner)));
        }
        let lower = descriptor.to_ascii_lowercase();
        if let Some(inner) = lower.strip_prefix("list<").and_then(|s| s.strip_suffix('>')) {
            let start = "list<".len();
            let inner = &descriptor[start..start + inner.len()];
            return PropertyType::List(Box::new(Self::parse(inner)));
        }

        match lower.as_str() {
            "string" | "system.string" | "str" | "text" => PropertyType::Text,
            "int" | "integer" | "long" | "short" | "system.int16" | "system.int32"
            | "system.int64" | "i32" | "i64" => PropertyType::Integer,
            "float" | "double" | "decimal" | "number" | "single" | "system.double"
            | "system.single" | "system.decimal" | "f64" => PropertyType::Number,
            "bool" | "boolean" | "system.boolean" => PropertyType::Boolean,
            "database" | "databaseschema.database" => PropertyType::Schema(SchemaKind::Database),
            "table" | "databaseschema.table" => PropertyType::Schema(SchemaKind::Table),
            _ => PropertyType::Structured(descriptor.to_string()),
        }
    }

    /// Lua expression for the value a fresh instance starts with.
    pub fn lua_default(&self) -> &'static str {
        match self {
            PropertyType::Integer => "0",
            PropertyType::Number => "0.0",
            PropertyType::Boolean => "false",
            _ => "nil",
        }
    }

    /// Read a raw XML value into a Lua value.
    pub fn to_lua(&self, lua: &Lua, raw: &str, property: &str) -> Result<Value, PropertyError> {
        let fail = |message: String| PropertyError::Value {
            property: property.to_string(),
            type_name: self.to_string(),
            message,
        };

        match self {
            PropertyType::Text => {
                let text = text_content(raw)?;
                lua.create_string(text.as_bytes())
                    .map(Value::String)
                    .map_err(|e| fail(e.to_string()))
            }
            PropertyType::Integer => {
                let text = text_content(raw)?;
                text.trim()
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|e| fail(format!("'{}': {e}", text.trim())))
            }
            PropertyType::Number => {
                let text = text_content(raw)?;
                text.trim()
                    .parse::<f64>()
                    .map(Value::Number)
                    .map_err(|e| fail(format!("'{}': {e}", text.trim())))
            }
            PropertyType::Boolean => {
                let text = text_content(raw)?;
                match text.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Boolean(true)),
                    "false" | "0" => Ok(Value::Boolean(false)),
                    other => Err(fail(format!("'{other}' is not a boolean"))),
                }
            }
            PropertyType::List(item) => {
                let table = lua.create_table().map_err(|e| fail(e.to_string()))?;
                for child in child_elements(raw)? {
                    let value = item.to_lua(lua, &child, property)?;
                    table.push(value).map_err(|e| fail(e.to_string()))?;
                }
                Ok(Value::Table(table))
            }
            PropertyType::Schema(kind) => {
                schema::to_lua(lua, *kind, raw).map_err(|e| fail(e.to_string()))
            }
            PropertyType::Structured(_) => {
                let json = xml_to_json(raw)?;
                lua.to_value(&json).map_err(|e| fail(e.to_string()))
            }
        }
    }
}

impl Display for PropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyType::Text => write!(f, "text"),
            PropertyType::Integer => write!(f, "integer"),
            PropertyType::Number => write!(f, "number"),
            PropertyType::Boolean => write!(f, "boolean"),
            PropertyType::List(item) => write!(f, "list of {item}"),
            PropertyType::Schema(kind) => write!(f, "{kind}"),
            PropertyType::Structured(name) => write!(f, "{name}"),
        }
    }
}

// =========================================================================
// Raw value readers
// =========================================================================

/// Concatenated text and CDATA content of an XML fragment, unescaped.
pub fn text_content(raw: &str) -> Result<String, PropertyError> {
    let mut reader = Reader::from_str(raw);
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Text(t) => text.push_str(&t.unescape().map_err(xml_error)?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Raw inner XML of each top-level element of a fragment.
fn child_elements(raw: &str) -> Result<Vec<String>, PropertyError> {
    let mut reader = Reader::from_str(raw);
    let mut children = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let inner = reader.read_text(e.name()).map_err(xml_error)?;
                children.push(inner.into_owned());
            }
            Event::Empty(_) => children.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(children)
}

#[derive(Default)]
struct Node {
    attributes: Map<String, JsonValue>,
    children: Vec<(String, Vec<JsonValue>)>,
    text: String,
}

impl Node {
    fn from_start(e: &BytesStart<'_>) -> Result<Self, PropertyError> {
        let mut node = Node::default();
        for attr in e.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            node.attributes.insert(key, JsonValue::String(value));
        }
        Ok(node)
    }

    fn add_child(&mut self, name: String, value: JsonValue) {
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.children.push((name, vec![value])),
        }
    }

    fn finish(self) -> JsonValue {
        if self.attributes.is_empty() && self.children.is_empty() {
            return JsonValue::String(self.text.trim().to_string());
        }
        let mut map = self.attributes;
        for (name, mut values) in self.children {
            let value = if values.len() == 1 {
                values.remove(0)
            } else {
                JsonValue::Array(values)
            };
            map.insert(name, value);
        }
        if !self.text.trim().is_empty() {
            map.insert("text".to_string(), JsonValue::String(self.text.trim().to_string()));
        }
        JsonValue::Object(map)
    }
}

/// Convert an XML fragment into a JSON tree. Attributes and child elements
/// become keys, repeated children become arrays, text-only elements become
/// strings.
pub fn xml_to_json(raw: &str) -> Result<JsonValue, PropertyError> {
    let mut reader = Reader::from_str(raw);
    let mut stack: Vec<(String, Node)> = vec![(String::new(), Node::default())];

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = element_name(&e);
                stack.push((name, Node::from_start(&e)?));
            }
            Event::Empty(e) => {
                let name = element_name(&e);
                let node = Node::from_start(&e)?;
                if let Some((_, parent)) = stack.last_mut() {
                    parent.add_child(name, node.finish());
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(PropertyError::Xml("unbalanced end tag".to_string()));
                }
                if let Some((name, node)) = stack.pop() {
                    if let Some((_, parent)) = stack.last_mut() {
                        parent.add_child(name, node.finish());
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(xml_error)?;
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some((_, node)) = stack.last_mut() {
                    node.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match stack.pop() {
        Some((_, root)) if stack.is_empty() => Ok(root.finish()),
        _ => Err(PropertyError::Xml("unclosed element".to_string())),
    }
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let xml = r#"<?xml version="1.0"?>
            <!-- settings -->
            <codeGenerator>
              <propertySet>
                <property name="ClassName">Customer</property>
                <property name="Empty"/>
                <property name="Rich"><b>x</b> &amp; y</property>
              </propertySet>
            </codeGenerator>"#;
        let set = PropertySet::parse(xml).unwrap();
        let entries: Vec<_> = set.entries().collect();
        assert_eq!(
            entries,
            vec![
                ("ClassName", "Customer"),
                ("Empty", ""),
                ("Rich", "<b>x</b> &amp; y"),
            ]
        );
    }

    #[test]
    fn test_legacy_root_is_accepted() {
        let set = PropertySet::parse(
            r#"<codeSmith><propertySet><property name="A">1</property></propertySet></codeSmith>"#,
        )
        .unwrap();
        assert_eq!(set.get("A"), Some("1"));
    }

    #[test]
    fn test_envelope_errors() {
        for xml in [
            "<settings><propertySet/></settings>",
            "<codeGenerator></codeGenerator>",
            "<codeGenerator><propertySet><value name=\"x\"/></propertySet></codeGenerator>",
            "<codeGenerator><propertySet><property>1</property></propertySet></codeGenerator>",
            "<codeGenerator><propertySet/><propertySet/></codeGenerator>",
            "<codeGenerator><propertySet>",
        ] {
            let err = PropertySet::parse(xml).unwrap_err();
            assert!(
                matches!(err, PropertyError::Envelope(_) | PropertyError::Xml(_)),
                "{xml} -> {err:?}"
            );
        }
    }

    #[test]
    fn test_push_escapes_and_round_trips() {
        let mut set = PropertySet::new();
        set.push("Name", "a < b & \"c\"");
        let parsed = PropertySet::parse(&set.to_xml()).unwrap();
        assert_eq!(text_content(parsed.get("Name").unwrap()).unwrap(), "a < b & \"c\"");
    }

    #[test]
    fn test_later_entries_shadow_earlier_ones() {
        let mut base = PropertySet::new();
        base.push("A", "1");
        let mut overrides = PropertySet::new();
        overrides.push("A", "2");
        base.extend(&overrides);
        assert_eq!(base.len(), 2);
        assert_eq!(base.get("A"), Some("2"));
    }

    #[test]
    fn test_type_descriptors() {
        assert_eq!(PropertyType::parse("System.String"), PropertyType::Text);
        assert_eq!(PropertyType::parse("System.Int64"), PropertyType::Integer);
        assert_eq!(PropertyType::parse("System.Boolean"), PropertyType::Boolean);
        assert_eq!(PropertyType::parse("double"), PropertyType::Number);
        assert_eq!(
            PropertyType::parse("string[]"),
            PropertyType::List(Box::new(PropertyType::Text))
        );
        assert_eq!(
            PropertyType::parse("List<Int>"),
            PropertyType::List(Box::new(PropertyType::Integer))
        );
        assert_eq!(
            PropertyType::parse("DatabaseSchema.Table"),
            PropertyType::Schema(SchemaKind::Table)
        );
        assert_eq!(
            PropertyType::parse("Options"),
            PropertyType::Structured("Options".to_string())
        );
    }

    #[test]
    fn test_scalar_values() {
        let lua = Lua::new();
        let v = PropertyType::Integer.to_lua(&lua, " 42 ", "Count").unwrap();
        assert_eq!(v, Value::Integer(42));
        let v = PropertyType::Boolean.to_lua(&lua, "True", "Flag").unwrap();
        assert_eq!(v, Value::Boolean(true));
        let v = PropertyType::Text.to_lua(&lua, "a &lt; b", "Name").unwrap();
        assert_eq!(v.as_string().unwrap().to_string_lossy(), "a < b");
    }

    #[test]
    fn test_bad_value_names_property() {
        let lua = Lua::new();
        let err = PropertyType::Integer.to_lua(&lua, "many", "Count").unwrap_err();
        match err {
            PropertyError::Value { property, .. } => assert_eq!(property, "Count"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_list_values() {
        let lua = Lua::new();
        let value = PropertyType::parse("int[]")
            .to_lua(&lua, "<int>1</int><int>2</int><int>3</int>", "Ids")
            .unwrap();
        let table = value.as_table().unwrap();
        let items: Vec<i64> = table.sequence_values::<i64>().collect::<mlua::Result<_>>().unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn test_structured_values() {
        let json = xml_to_json(
            r#"<author name="Ada"><tag>x</tag><tag>y</tag><bio>First</bio></author>"#,
        )
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "author": {
                    "name": "Ada",
                    "tag": ["x", "y"],
                    "bio": "First"
                }
            })
        );
    }
}
