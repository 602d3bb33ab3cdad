//! Language registry
//!
//! Supplied by the hosting application; consumed by the per-language
//! fan-out and by `currentLanguageOnly` queries. Languages are kept ordered
//! by ascending id, which is also the stable in-group row ordering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Language {
    pub id: i64,
    /// Short code, e.g. "en"
    pub abbr: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

impl Language {
    pub fn new(id: i64, abbr: &str, name: &str) -> Self {
        Self {
            id,
            abbr: abbr.to_string(),
            name: name.to_string(),
            is_default: false,
        }
    }
}

/// The set of content languages plus the currently active one
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageRegistry {
    languages: Vec<Language>,
    current: i64,
}

impl LanguageRegistry {
    /// Build a registry; languages are re-sorted by ascending id
    pub fn new(mut languages: Vec<Language>, current: i64) -> Self {
        languages.sort_by_key(|language| language.id);
        Self { languages, current }
    }

    pub fn current(&self) -> i64 {
        self.current
    }

    pub fn ids(&self) -> Vec<i64> {
        self.languages.iter().map(|language| language.id).collect()
    }

    pub fn get(&self, id: i64) -> Option<&Language> {
        self.languages.iter().find(|language| language.id == id)
    }

    pub fn len(&self) -> usize {
        self.languages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Language> {
        self.languages.iter()
    }
}
