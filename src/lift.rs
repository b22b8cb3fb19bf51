//! LIFT XML → generic document tree.
//!
//! Elements become JSON objects: attributes under `"$"`, repeated child
//! elements collapse into arrays, a lone child stays a plain object, and
//! character data lands under `"_"` (or becomes the whole value when the
//! element has neither attributes nor children). Inline `<span>` runs are
//! folded into the surrounding text.
//!
//! The tree carries no LIFT-specific knowledge; [`crate::extract`] owns the
//! interpretation.

use std::path::Path;

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

struct Frame {
    name: String,
    attrs: Map<String, Value>,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Map::new();
        for attr in start.attributes() {
            let attr = attr.with_context(|| format!("malformed attribute on <{}>", name))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .with_context(|| format!("bad attribute value on <{}>", name))?;
            attrs.insert(key, Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            attrs,
            children: Map::new(),
            text: String::new(),
        })
    }

    fn close(self) -> Value {
        let text = self.text.trim();
        if self.attrs.is_empty() && self.children.is_empty() {
            return Value::String(text.to_string());
        }
        let mut obj = Map::new();
        if !self.attrs.is_empty() {
            obj.insert("$".to_string(), Value::Object(self.attrs));
        }
        if !text.is_empty() {
            obj.insert("_".to_string(), Value::String(text.to_string()));
        }
        obj.extend(self.children);
        Value::Object(obj)
    }
}

fn push_child(children: &mut Map<String, Value>, name: String, value: Value) {
    match children.get_mut(&name) {
        None => {
            children.insert(name, value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
    }
}

/// Parse a LIFT document held in memory.
///
/// Returns an object with a single `"lift"` key. Errors on malformed XML or
/// when the root element is not `<lift>`.
pub fn parse_lift_str(xml: &str) -> Result<Value> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .with_context(|| format!("XML parse error near byte {}", position))?;
        match event {
            Event::Start(start) => stack.push(Frame::open(&start)?),
            Event::Empty(start) => {
                let frame = Frame::open(&start)?;
                let name = frame.name.clone();
                let value = frame.close();
                match stack.last_mut() {
                    Some(parent) => push_child(&mut parent.children, name, value),
                    None => root = Some((name, value)),
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = text
                        .unescape()
                        .with_context(|| format!("bad character data in <{}>", top.name))?;
                    top.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(frame) = stack.pop() else {
                    bail!("unbalanced closing tag near byte {}", position);
                };
                let name = frame.name.clone();
                match stack.last_mut() {
                    Some(parent) if name == "span" => {
                        parent.text.push_str(frame.text.as_str());
                    }
                    Some(parent) => {
                        let value = frame.close();
                        push_child(&mut parent.children, name, value);
                    }
                    None => root = Some((name, frame.close())),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        bail!("unexpected end of document inside <{}>", open.name);
    }
    match root {
        Some((name, value)) if name == "lift" => {
            let mut obj = Map::new();
            obj.insert(name, value);
            Ok(Value::Object(obj))
        }
        Some((name, _)) => bail!("expected <lift> root element, found <{}>", name),
        None => bail!("document has no root element"),
    }
}

/// Read and parse a LIFT file from disk.
pub fn parse_lift_file(path: &Path) -> Result<Value> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read LIFT file: {}", path.display()))?;
    parse_lift_str(&xml).with_context(|| format!("Failed to parse LIFT file: {}", path.display()))
}
