//! Word symbol table (id ↔ word).

use std::collections::HashMap;

use crate::error::{HarkError, Result};

/// Label reserved for epsilon (no word).
pub const EPSILON: u32 = 0;

/// Bidirectional word table with unique ids.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    words: HashMap<u32, String>,
    ids: HashMap<String, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the `word id` per line text format (`words.txt`).
    ///
    /// # Errors
    /// Malformed lines and duplicate ids or words are rejected.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut table = Self::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(word), Some(id), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(HarkError::Config(format!(
                    "symbol table line {}: expected `word id`, got {line:?}",
                    line_no + 1
                )));
            };
            let id = id.parse::<u32>().map_err(|_| {
                HarkError::Config(format!(
                    "symbol table line {}: invalid id {id:?}",
                    line_no + 1
                ))
            })?;
            table.insert(word, id)?;
        }
        Ok(table)
    }

    /// Build a table from words in order, assigning ids from 1 (0 is `<eps>`).
    pub fn from_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut table = Self::new();
        table.insert("<eps>", EPSILON)?;
        for (i, word) in words.into_iter().enumerate() {
            table.insert(word, i as u32 + 1)?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, word: &str, id: u32) -> Result<()> {
        if let Some(existing) = self.words.get(&id) {
            return Err(HarkError::DuplicateSymbol {
                id,
                existing: existing.clone(),
                word: word.to_string(),
            });
        }
        if let Some(&existing_id) = self.ids.get(word) {
            return Err(HarkError::DuplicateSymbol {
                id: existing_id,
                existing: word.to_string(),
                word: word.to_string(),
            });
        }
        self.words.insert(id, word.to_string());
        self.ids.insert(word.to_string(), id);
        Ok(())
    }

    pub fn id(&self, word: &str) -> Option<u32> {
        self.ids.get(word).copied()
    }

    pub fn word(&self, id: u32) -> Option<&str> {
        self.words.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.words.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Join the words for `ids` with single spaces. Unknown ids are skipped.
    pub fn join(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter_map(|&id| self.word(id))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Symbols with no lexical content: `<unk>`, `[noise]`, `<eps>` and friends.
pub fn is_filler(word: &str) -> bool {
    (word.starts_with('<') && word.ends_with('>')) || (word.starts_with('[') && word.ends_with(']'))
}
