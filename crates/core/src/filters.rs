use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::TranslationKey;

/// Narrows a key list by text, category and language. Empty fields do not filter.
///
/// `search` is matched case-insensitively as typed, surrounding whitespace included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFilter {
    pub search: String,
    pub categories: BTreeSet<String>,
    pub languages: BTreeSet<String>,
}

impl KeyFilter {
    pub fn is_empty(&self) -> bool {
        self.search.is_empty() && self.categories.is_empty() && self.languages.is_empty()
    }

    pub fn matches(&self, key: &TranslationKey) -> bool {
        self.matches_search(key) && self.matches_category(key) && self.matches_language(key)
    }

    fn matches_search(&self, key: &TranslationKey) -> bool {
        let needle = self.search.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let contains = |text: &str| text.to_lowercase().contains(&needle);
        contains(&key.key)
            || key.description.as_deref().is_some_and(contains)
            || key
                .translations
                .values()
                .any(|translation| contains(&translation.value))
    }

    fn matches_category(&self, key: &TranslationKey) -> bool {
        self.categories.is_empty() || self.categories.contains(&key.category)
    }

    fn matches_language(&self, key: &TranslationKey) -> bool {
        self.languages.is_empty()
            || self
                .languages
                .iter()
                .any(|language| key.has_value(language))
    }

    pub fn summary(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        if !self.search.is_empty() {
            parts.push(format!("search:\"{}\"", self.search));
        }
        if !self.categories.is_empty() {
            let joined = self
                .categories
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("category:{joined}"));
        }
        if !self.languages.is_empty() {
            let joined = self
                .languages
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("lang:{joined}"));
        }

        Some(parts.join(" | "))
    }
}

/// Keys matching `filter`, in their original order.
pub fn filter_keys(keys: &[TranslationKey], filter: &KeyFilter) -> Vec<TranslationKey> {
    keys.iter().filter(|key| filter.matches(key)).cloned().collect()
}

/// Options offered by the filter pickers for a key list.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FilterFacets {
    pub categories: Vec<String>,
    pub languages: Vec<String>,
}

impl FilterFacets {
    pub fn from_keys(keys: &[TranslationKey]) -> Self {
        let mut categories = BTreeSet::new();
        let mut languages = BTreeSet::new();

        for key in keys {
            if !key.category.is_empty() {
                categories.insert(key.category.clone());
            }
            for language in key.translations.keys() {
                languages.insert(language.clone());
            }
        }

        Self {
            categories: categories.into_iter().collect(),
            languages: languages.into_iter().collect(),
        }
    }

    /// Keeps active selections pickable even when no key carries them anymore.
    pub fn ensure_selected(&mut self, active: &KeyFilter) {
        for category in &active.categories {
            if !self.categories.contains(category) {
                self.categories.push(category.clone());
            }
        }
        self.categories.sort();

        for language in &active.languages {
            if !self.languages.contains(language) {
                self.languages.push(language.clone());
            }
        }
        self.languages.sort();
    }
}
