//! Core data models that flow through the ingestion pipeline.
//!
//! [`Entry`] is the flat record produced by the extractor. [`WordDocument`]
//! and [`SentenceDocument`] are the shapes persisted to the `words` and
//! `sentences` collections; field names are camelCase on the wire.

use std::collections::BTreeMap;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A dictionary entry extracted from one LIFT `<entry>` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Option<String>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
    pub guid: Option<String>,
    pub lexical_form: Option<String>,
    #[serde(default)]
    pub traits: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub senses: Vec<Sense>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sense {
    pub id: Option<String>,
    pub grammatical_info: Option<String>,
    pub gloss: Option<String>,
    pub definition: Option<String>,
    #[serde(default)]
    pub examples: Vec<Example>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub source: Option<String>,
    pub form: Option<String>,
    pub translation: Option<String>,
    pub note: Option<String>,
}

impl Entry {
    /// Text submitted to the embedding provider for this word: lexical form,
    /// then every gloss, then every definition, space-joined.
    pub fn text_to_embed(&self) -> String {
        let glosses = self.senses.iter().filter_map(|s| s.gloss.as_deref());
        let definitions = self.senses.iter().filter_map(|s| s.definition.as_deref());
        self.lexical_form
            .as_deref()
            .into_iter()
            .chain(glosses)
            .chain(definitions)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// An embedding in its stored form: little-endian `f32` bytes, base64 in JSON.
///
/// Reuse copies this value as-is, so a carried-forward embedding stays
/// byte-identical to the one in the prior snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedEmbedding(Vec<u8>);

impl PackedEmbedding {
    pub fn pack(vector: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for &v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self(bytes)
    }

    #[cfg(test)]
    pub fn unpack(&self) -> Vec<f32> {
        self.0
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn dims(&self) -> usize {
        self.0.len() / 4
    }
}

impl Serialize for PackedEmbedding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for PackedEmbedding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % 4 != 0 {
            return Err(serde::de::Error::custom(format!(
                "packed embedding length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }
}

/// Document stored in the `words` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDocument {
    #[serde(flatten)]
    pub entry: Entry,
    #[serde(default)]
    pub embedding: Option<PackedEmbedding>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Document stored in the `sentences` collection; one per distinct sentence text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentenceDocument {
    /// Content fingerprint of `text`.
    pub id: String,
    pub text: String,
    pub translation: Option<String>,
    pub source_entry_ids: Vec<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub embedding: Option<PackedEmbedding>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl SentenceDocument {
    pub fn text_to_embed(&self) -> String {
        format!(
            "{} {}",
            self.text,
            self.translation.as_deref().unwrap_or_default()
        )
    }
}
