//! Static Hebrew surface → English query text table.

use std::collections::HashMap;
use std::path::Path;

use odontolink_lexicon::normalize::normalize_surface;

use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    entries: HashMap<String, Vec<String>>,
}

impl TranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{surface: [english, ...]}`; a bare string value is accepted too.
    pub fn from_json(json: &str) -> Result<Self> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Value {
            Many(Vec<String>),
            One(String),
        }

        let raw: HashMap<String, Value> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for (surface, value) in raw {
            let terms = match value {
                Value::Many(v) => v,
                Value::One(s) => vec![s],
            };
            table.insert(&surface, terms);
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn insert(&mut self, surface: &str, terms: Vec<String>) {
        let terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if !terms.is_empty() {
            self.entries.insert(normalize_surface(surface), terms);
        }
    }

    /// First English rendering for `surface`.
    pub fn lookup(&self, surface: &str) -> Option<&str> {
        self.entries
            .get(&normalize_surface(surface))
            .and_then(|t| t.first())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
