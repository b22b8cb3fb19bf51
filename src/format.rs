//! Contributor-abbreviation expansion for example `source` and `note` text.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use regex::{Captures, Regex};

use crate::models::Entry;

/// Whether `token` can be matched as a whole word: non-empty, no whitespace,
/// and starting and ending with a word character.
pub fn is_matchable_token(token: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    match (token.chars().next(), token.chars().last()) {
        (Some(first), Some(last)) => {
            is_word(first) && is_word(last) && !token.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

/// Expands whole-word abbreviation tokens (e.g. `nn` → `Norma Nelson`).
pub struct SourceFormatter {
    pattern: Option<Regex>,
    expansions: BTreeMap<String, String>,
}

impl SourceFormatter {
    pub fn new(abbreviations: &BTreeMap<String, String>) -> Result<Self> {
        if abbreviations.is_empty() {
            return Ok(Self {
                pattern: None,
                expansions: BTreeMap::new(),
            });
        }
        if let Some(bad) = abbreviations.keys().find(|t| !is_matchable_token(t)) {
            bail!("Abbreviation '{}' cannot be matched as a whole word", bad);
        }
        // Longest first so a token that prefixes another never shadows it.
        let mut tokens: Vec<&str> = abbreviations.keys().map(String::as_str).collect();
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        let alternation = tokens
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"\b(?:{})\b", alternation))
            .context("Failed to build abbreviation pattern")?;
        Ok(Self {
            pattern: Some(pattern),
            expansions: abbreviations.clone(),
        })
    }

    /// Replace every whole-word abbreviation in `text`. `None` yields `""`.
    pub fn format(&self, text: Option<&str>) -> String {
        let Some(text) = text else {
            return String::new();
        };
        match &self.pattern {
            Some(pattern) => pattern
                .replace_all(text, |caps: &Captures<'_>| {
                    self.expansions
                        .get(&caps[0])
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned(),
            None => text.to_string(),
        }
    }

    /// Format the source and note of every example in place. Other fields are
    /// left untouched.
    pub fn format_entry(&self, entry: &mut Entry) {
        for sense in &mut entry.senses {
            for example in &mut sense.examples {
                example.source = Some(self.format(example.source.as_deref()));
                example.note = Some(self.format(example.note.as_deref()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Example, Sense};

    fn formatter() -> SourceFormatter {
        let abbreviations = BTreeMap::from([("nn".to_string(), "Norma Nelson".to_string())]);
        SourceFormatter::new(&abbreviations).unwrap()
    }

    #[test]
    fn expands_whole_word() {
        assert_eq!(
            formatter().format(Some("interviewed by nn")),
            "interviewed by Norma Nelson"
        );
    }

    #[test]
    fn ignores_substrings() {
        assert_eq!(formatter().format(Some("annnounce")), "annnounce");
        assert_eq!(formatter().format(Some("nnn")), "nnn");
    }

    #[test]
    fn null_becomes_empty() {
        assert_eq!(formatter().format(None), "");
    }

    #[test]
    fn expands_next_to_punctuation() {
        assert_eq!(
            formatter().format(Some("(nn, 1998); nn.")),
            "(Norma Nelson, 1998); Norma Nelson."
        );
    }

    #[test]
    fn longer_token_wins_over_prefix() {
        let abbreviations = BTreeMap::from([
            ("nn".to_string(), "Norma Nelson".to_string()),
            ("nnb".to_string(), "N. N. Brown".to_string()),
        ]);
        let f = SourceFormatter::new(&abbreviations).unwrap();
        assert_eq!(f.format(Some("nnb and nn")), "N. N. Brown and Norma Nelson");
    }

    #[test]
    fn rejects_tokens_with_punctuation_at_the_edges() {
        assert!(is_matchable_token("nn"));
        assert!(is_matchable_token("n.n"));
        assert!(!is_matchable_token("N.N."));
        assert!(!is_matchable_token("(nn"));
        assert!(!is_matchable_token("a b"));
        assert!(!is_matchable_token(""));

        let abbreviations = BTreeMap::from([("N.N.".to_string(), "Norma Nelson".to_string())]);
        assert!(SourceFormatter::new(&abbreviations).is_err());
    }

    #[test]
    fn inner_punctuation_still_matches_whole_word() {
        let abbreviations = BTreeMap::from([("n.n".to_string(), "Norma Nelson".to_string())]);
        let f = SourceFormatter::new(&abbreviations).unwrap();
        assert_eq!(f.format(Some("by n.n, 1998")), "by Norma Nelson, 1998");
        assert_eq!(f.format(Some("xn.n")), "xn.n");
    }

    #[test]
    fn format_entry_only_touches_source_and_note() {
        let mut entry = Entry {
            id: Some("e".into()),
            date_created: None,
            date_modified: None,
            guid: None,
            lexical_form: Some("nn".into()),
            traits: Default::default(),
            senses: vec![Sense {
                id: None,
                grammatical_info: None,
                gloss: Some("nn".into()),
                definition: None,
                examples: vec![Example {
                    source: Some("nn".into()),
                    form: Some("nn".into()),
                    translation: Some("nn".into()),
                    note: None,
                }],
            }],
        };
        formatter().format_entry(&mut entry);
        let ex = &entry.senses[0].examples[0];
        assert_eq!(ex.source.as_deref(), Some("Norma Nelson"));
        assert_eq!(ex.note.as_deref(), Some(""));
        assert_eq!(ex.form.as_deref(), Some("nn"));
        assert_eq!(ex.translation.as_deref(), Some("nn"));
        assert_eq!(entry.senses[0].gloss.as_deref(), Some("nn"));
        assert_eq!(entry.lexical_form.as_deref(), Some("nn"));
    }
}
