//! Sentence derivation.
//!
//! Every example form across the corpus becomes one [`SentenceDocument`],
//! keyed by the fingerprint of its literal text. Entries that share a
//! sentence are merged into its `source_entry_ids`, each id at most once.

use std::collections::HashMap;

use crate::fingerprint::fingerprint;
use crate::models::{Entry, SentenceDocument};

/// Derive deduplicated sentence records, in first-seen order.
///
/// Examples without form text are skipped. Translation and source come from
/// the first occurrence that has one.
pub fn derive_sentences(entries: &[Entry]) -> Vec<SentenceDocument> {
    let mut sentences: Vec<SentenceDocument> = Vec::new();
    let mut by_id: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        for sense in &entry.senses {
            for example in &sense.examples {
                let Some(text) = example.form.as_deref().filter(|t| !t.is_empty()) else {
                    continue;
                };
                let id = fingerprint(text);
                let idx = *by_id.entry(id.clone()).or_insert_with(|| {
                    sentences.push(SentenceDocument {
                        id,
                        text: text.to_string(),
                        translation: None,
                        source_entry_ids: Vec::new(),
                        source: None,
                        embedding: None,
                        created_at: None,
                        updated_at: None,
                    });
                    sentences.len() - 1
                });

                let sentence = &mut sentences[idx];
                if let Some(entry_id) = &entry.id {
                    if !sentence.source_entry_ids.contains(entry_id) {
                        sentence.source_entry_ids.push(entry_id.clone());
                    }
                }
                if sentence.translation.is_none() {
                    sentence.translation = example.translation.clone();
                }
                if sentence.source.as_deref().map_or(true, str::is_empty) {
                    if let Some(source) = example.source.as_deref().filter(|s| !s.is_empty()) {
                        sentence.source = Some(source.to_string());
                    }
                }
            }
        }
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Example, Sense};

    fn entry(id: &str, forms: &[(&str, Option<&str>)]) -> Entry {
        Entry {
            id: Some(id.to_string()),
            date_created: None,
            date_modified: None,
            guid: None,
            lexical_form: None,
            traits: Default::default(),
            senses: vec![Sense {
                id: None,
                grammatical_info: None,
                gloss: None,
                definition: None,
                examples: forms
                    .iter()
                    .map(|(form, translation)| Example {
                        source: Some("Norma Nelson".to_string()),
                        form: Some(form.to_string()),
                        translation: translation.map(str::to_string),
                        note: None,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn shared_sentence_collects_both_entries_once() {
        let entries = vec![
            entry("a", &[("the dog ran", Some("x")), ("the dog ran", None)]),
            entry("b", &[("the dog ran", Some("y"))]),
        ];
        let sentences = derive_sentences(&entries);
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].id, fingerprint("the dog ran"));
        assert_eq!(sentences[0].source_entry_ids, vec!["a", "b"]);
        assert_eq!(sentences[0].translation.as_deref(), Some("x"));
        assert_eq!(sentences[0].source.as_deref(), Some("Norma Nelson"));
    }

    #[test]
    fn distinct_texts_keep_first_seen_order() {
        let entries = vec![entry("a", &[("two", None), ("one", None)]), entry("b", &[("three", None)])];
        let texts: Vec<_> = derive_sentences(&entries)
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["two", "one", "three"]);
    }

    #[test]
    fn later_translation_fills_missing_one() {
        let entries = vec![entry("a", &[("s", None)]), entry("b", &[("s", Some("late"))])];
        assert_eq!(derive_sentences(&entries)[0].translation.as_deref(), Some("late"));
    }

    #[test]
    fn examples_without_form_are_skipped() {
        let mut e = entry("a", &[("", None)]);
        e.senses[0].examples[0].form = None;
        assert!(derive_sentences(&[e]).is_empty());
    }
}
