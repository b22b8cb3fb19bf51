//! Lexical entry extraction.
//!
//! Walks the generic tree produced by [`crate::lift`] and flattens each
//! `<entry>` into an [`Entry`]. Every nested lookup is defensive: a missing
//! step anywhere along a path yields `None`, never an error. Only a tree
//! without a `lift` root is fatal.
//!
//! The tree shape is "one child = object, several = array". All shape
//! handling goes through [`as_seq`]; when a single value is wanted, the
//! first element of the sequence is taken.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::models::{Entry, Example, Sense};

/// Coerce an optional node to a sequence of nodes.
///
/// Absent and `null` give an empty sequence, an array gives its items, any
/// other value gives a one-element sequence.
pub fn as_seq(node: Option<&Value>) -> Vec<&Value> {
    match node {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
        Some(other) => vec![other],
    }
}

fn first(node: Option<&Value>) -> Option<&Value> {
    as_seq(node).into_iter().next()
}

fn child<'a>(node: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    first(first(node)?.get(key))
}

fn attr(node: Option<&Value>, name: &str) -> Option<String> {
    child(node, "$")?
        .get(name)?
        .as_str()
        .map(str::to_string)
}

fn text_of(node: Option<&Value>) -> Option<String> {
    let text = match first(node)? {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj.get("_")?.as_str()?,
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Follow `path` from `node`, taking the first element at every step, and
/// read the text at the end.
fn text_at(node: Option<&Value>, path: &[&str]) -> Option<String> {
    let mut cur = first(node);
    for key in path {
        cur = child(cur, key);
    }
    text_of(cur)
}

fn extract_traits(entry: &Value) -> BTreeMap<String, Option<String>> {
    let mut traits = BTreeMap::new();
    for t in as_seq(entry.get("trait")) {
        if let Some(name) = attr(Some(t), "name") {
            traits.insert(name, attr(Some(t), "value"));
        }
    }
    traits
}

fn extract_example(example: &Value) -> Example {
    let node = Some(example);
    Example {
        source: attr(node, "source"),
        form: text_at(node, &["form", "text"]),
        translation: text_at(node, &["translation", "form", "text"]),
        note: text_at(node, &["note", "form", "text"]),
    }
}

fn extract_sense(sense: &Value) -> Sense {
    let node = Some(sense);
    Sense {
        id: attr(node, "id"),
        grammatical_info: attr(child(node, "grammatical-info"), "value"),
        gloss: text_at(node, &["gloss", "text"]),
        definition: text_at(node, &["definition", "form", "text"]),
        examples: as_seq(sense.get("example"))
            .into_iter()
            .map(extract_example)
            .collect(),
    }
}

/// Flatten a single `<entry>` node.
pub fn extract_entry(entry: &Value) -> Entry {
    let node = Some(entry);
    Entry {
        id: attr(node, "id"),
        date_created: attr(node, "dateCreated"),
        date_modified: attr(node, "dateModified"),
        guid: attr(node, "guid"),
        lexical_form: text_at(node, &["lexical-unit", "form", "text"]),
        traits: extract_traits(entry),
        senses: as_seq(entry.get("sense"))
            .into_iter()
            .map(extract_sense)
            .collect(),
    }
}

/// Extract every entry of a parsed LIFT document, in document order.
pub fn extract_entries(tree: &Value) -> Result<Vec<Entry>> {
    let lift = match tree.get("lift") {
        Some(lift @ (Value::Object(_) | Value::String(_))) => lift,
        Some(other) => bail!("malformed LIFT document: unexpected root value {}", other),
        None => bail!("malformed LIFT document: missing <lift> root"),
    };
    Ok(as_seq(lift.get("entry"))
        .into_iter()
        .map(extract_entry)
        .collect())
}
