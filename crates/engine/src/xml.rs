//! XML reading and writing for API payloads.
//!
//! The reader lifts an XML document into JSON-shaped values: attributes
//! merge into the element mapping without a prefix, an element carrying
//! both attributes and text keeps the text under `#text`, repeated sibling
//! elements collapse into a list, and empty elements become null. The
//! writer performs the reverse mapping for response envelopes.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure while reading or writing an XML document.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml parse: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("write: {0}")]
    Write(#[from] std::io::Error),
    #[error("utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("element name {0:?} is not a valid XML name")]
    InvalidName(String),
    #[error("document must have exactly one root element")]
    Malformed,
    #[error("binary data cannot be represented in an XML document")]
    Binary,
}

struct PendingElement {
    name: String,
    attributes: Map<String, Value>,
    text: String,
    children: Vec<(String, Value)>,
}

impl PendingElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Map::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attributes.insert(key, Value::String(value));
        }
        Ok(Self {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn append_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn finish(self) -> (String, Value) {
        if self.attributes.is_empty() && self.children.is_empty() {
            let value = if self.text.is_empty() {
                Value::Null
            } else {
                Value::String(self.text)
            };
            return (self.name, value);
        }
        let mut map = self.attributes;
        for (name, child) in self.children {
            insert_or_append(&mut map, name, child);
        }
        if !self.text.is_empty() {
            map.insert("#text".to_string(), Value::String(self.text));
        }
        (self.name, Value::Object(map))
    }
}

fn insert_or_append(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn attach(
    node: (String, Value),
    stack: &mut [PendingElement],
    root: &mut Option<(String, Value)>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(XmlError::Malformed),
    }
}

/// Parse an XML document into a single-root JSON mapping.
pub fn xml_to_value(text: &str) -> Result<Value, XmlError> {
    let mut reader = Reader::from_str(text.trim());
    reader.config_mut().trim_text(true);

    let mut stack: Vec<PendingElement> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(PendingElement::from_start(&start)?),
            Event::Empty(start) => {
                let node = PendingElement::from_start(&start)?.finish();
                attach(node, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or(XmlError::Malformed)?.finish();
                attach(node, &mut stack, &mut root)?;
            }
            Event::Text(event) => {
                if let Some(top) = stack.last_mut() {
                    top.append_text(&event.unescape()?);
                }
            }
            Event::CData(event) => {
                if let Some(top) = stack.last_mut() {
                    let raw = event.into_inner();
                    top.append_text(&String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Malformed);
    }
    root.map(|(name, value)| {
        let mut map = Map::new();
        map.insert(name, value);
        Value::Object(map)
    })
    .ok_or(XmlError::Malformed)
}

/// Serialize a single-root JSON mapping into a pretty-printed XML document.
pub fn value_to_xml(value: &Value) -> Result<String, XmlError> {
    let (root_name, root_value) = match value {
        Value::Object(map) if map.len() == 1 => {
            let (name, child) = map.iter().next().ok_or(XmlError::Malformed)?;
            (name.as_str(), child)
        }
        _ => return Err(XmlError::Malformed),
    };

    let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write_element(&mut writer, root_name, root_value)?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<(), XmlError> {
    validate_name(name)?;
    match value {
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
        }
        Value::String(text) if text.is_empty() => {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
        }
        Value::String(text) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::Bool(_) | Value::Number(_) => {
            let text = scalar_text(value);
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
        }
        Value::Object(map) if map.is_empty() => {
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
        }
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            for (key, child) in map {
                if key == "#text" {
                    continue;
                }
                write_element(writer, key, child)?;
            }
            if let Some(Value::String(text)) = map.get("#text") {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
    }
    Ok(())
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        _ => String::new(),
    }
}

/// Element names are restricted to ASCII names. Anything else fails the
/// write so the caller can fall back to a simpler document.
fn validate_name(name: &str) -> Result<(), XmlError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(XmlError::InvalidName(name.to_string()))
    }
}
