use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ValidationError;

/// Prefix carried by ids minted locally for optimistic entries.
pub const PLACEHOLDER_PREFIX: &str = "temp-";

/// Language code to plain value, as submitted by editors.
pub type TranslationValues = BTreeMap<String, String>;

pub fn placeholder_id() -> String {
    format!("{PLACEHOLDER_PREFIX}{}", Ulid::new())
}

pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub default_language: String,
    pub supported_languages: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub translation_key_count: usize,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Project {
    pub fn supports(&self, code: &str) -> bool {
        self.supported_languages.iter().any(|lang| lang == code)
    }

    /// Appends `code` unless it is already supported. Returns whether the set changed.
    pub fn add_language(&mut self, code: &str) -> bool {
        if self.supports(code) {
            return false;
        }
        self.supported_languages.push(code.to_string());
        true
    }

    pub fn remove_language(&mut self, code: &str) -> bool {
        let before = self.supported_languages.len();
        self.supported_languages.retain(|lang| lang != code);
        before != self.supported_languages.len()
    }

    /// Applies the populated fields of `changes`, leaving the rest untouched.
    pub fn apply_changes(&mut self, changes: &ProjectChanges, now: DateTime<Utc>) {
        if let Some(name) = &changes.name {
            self.name = name.clone();
        }
        if let Some(description) = &changes.description {
            self.description = Some(description.clone());
        }
        if let Some(languages) = &changes.supported_languages {
            self.supported_languages = languages.clone();
        }
        if let Some(active) = changes.is_active {
            self.is_active = active;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub value: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationKey {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub translations: BTreeMap<String, Translation>,
}

impl TranslationKey {
    pub fn value(&self, language: &str) -> Option<&str> {
        self.translations
            .get(language)
            .map(|translation| translation.value.as_str())
    }

    pub fn has_value(&self, language: &str) -> bool {
        self.value(language).is_some_and(|value| !value.is_empty())
    }

    /// Overwrites the given languages, stamping each with `actor` and `now`.
    pub fn merge_values(&mut self, values: &TranslationValues, actor: &str, now: DateTime<Utc>) {
        for (language, value) in values {
            self.translations.insert(
                language.clone(),
                Translation {
                    value: value.clone(),
                    updated_at: now,
                    updated_by: actor.to_string(),
                },
            );
        }
    }

    pub fn purge_language(&mut self, language: &str) -> bool {
        self.translations.remove(language).is_some()
    }
}

/// Raw create-key input as collected from a form or the command line.
#[derive(Debug, Clone, Default)]
pub struct KeyDraft {
    pub key: String,
    pub category: String,
    pub description: Option<String>,
    pub translations: TranslationValues,
}

impl KeyDraft {
    /// Trims every field and rejects drafts that would create an unusable key.
    pub fn validate(&self) -> Result<NewTranslationKey, ValidationError> {
        let key = self.key.trim();
        if key.is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        let category = self.category.trim();
        if category.is_empty() {
            return Err(ValidationError::EmptyCategory);
        }
        let translations: TranslationValues = self
            .translations
            .iter()
            .filter_map(|(language, value)| {
                let language = language.trim();
                let value = value.trim();
                if language.is_empty() || value.is_empty() {
                    None
                } else {
                    Some((language.to_string(), value.to_string()))
                }
            })
            .collect();
        if translations.is_empty() {
            return Err(ValidationError::MissingTranslation);
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        Ok(NewTranslationKey {
            key: key.to_string(),
            category: category.to_string(),
            description,
            translations,
        })
    }
}

/// A validated create-key request body. Only obtainable through [`KeyDraft::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTranslationKey {
    key: String,
    category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    translations: TranslationValues,
}

impl NewTranslationKey {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn translations(&self) -> &TranslationValues {
        &self.translations
    }

    /// Materialises the request as a key owned by `project_id` under the given id.
    pub fn to_key(
        &self,
        id: String,
        project_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> TranslationKey {
        let mut key = TranslationKey {
            id,
            project_id: project_id.to_string(),
            key: self.key.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            translations: BTreeMap::new(),
        };
        key.merge_values(&self.translations, actor, now);
        key
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectDraft {
    pub name: String,
    pub description: Option<String>,
    pub default_language: String,
    pub supported_languages: Vec<String>,
}

impl ProjectDraft {
    pub fn validate(&self) -> Result<NewProject, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyProjectName);
        }
        let default_language = self.default_language.trim();
        if default_language.is_empty() {
            return Err(ValidationError::EmptyLanguageCode);
        }
        let mut supported_languages = vec![default_language.to_string()];
        for code in normalize_languages(&self.supported_languages)? {
            if !supported_languages.contains(&code) {
                supported_languages.push(code);
            }
        }
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string);

        Ok(NewProject {
            name: name.to_string(),
            description,
            default_language: default_language.to_string(),
            supported_languages,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    default_language: String,
    supported_languages: Vec<String>,
}

impl NewProject {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn supported_languages(&self) -> &[String] {
        &self.supported_languages
    }

    pub fn to_project(&self, id: String, actor: &str, now: DateTime<Utc>) -> Project {
        Project {
            id,
            name: self.name.clone(),
            description: self.description.clone(),
            default_language: self.default_language.clone(),
            supported_languages: self.supported_languages.clone(),
            created_at: now,
            updated_at: now,
            created_by: actor.to_string(),
            translation_key_count: 0,
            is_active: true,
        }
    }
}

/// Partial project update; `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_languages: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl ProjectChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.supported_languages.is_none()
            && self.is_active.is_none()
    }

    /// Trims names and language codes; fails on blank values.
    pub fn normalized(&self) -> Result<Self, ValidationError> {
        let name = match &self.name {
            Some(name) if name.trim().is_empty() => return Err(ValidationError::EmptyProjectName),
            Some(name) => Some(name.trim().to_string()),
            None => None,
        };
        let supported_languages = match &self.supported_languages {
            Some(languages) => Some(normalize_languages(languages)?),
            None => None,
        };
        Ok(Self {
            name,
            description: self.description.as_ref().map(|text| text.trim().to_string()),
            supported_languages,
            is_active: self.is_active,
        })
    }
}

/// Trims codes and removes duplicates while keeping first-seen order.
pub fn normalize_languages(codes: &[String]) -> Result<Vec<String>, ValidationError> {
    let mut seen = BTreeSet::new();
    let mut result = Vec::new();
    for code in codes {
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyLanguageCode);
        }
        if seen.insert(trimmed.to_string()) {
            result.push(trimmed.to_string());
        }
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub translated: usize,
    pub total: usize,
    pub completion_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub project_id: String,
    pub total_keys: usize,
    pub categories: Vec<String>,
    pub language_stats: BTreeMap<String, LanguageStats>,
    pub supported_languages: Vec<String>,
}

impl ProjectStats {
    /// Completion figures for `project` over the keys it owns. Blank values count as untranslated.
    pub fn compute(project: &Project, keys: &[TranslationKey]) -> Self {
        let owned: Vec<&TranslationKey> = keys
            .iter()
            .filter(|key| key.project_id == project.id)
            .collect();
        let total = owned.len();
        let language_stats = project
            .supported_languages
            .iter()
            .map(|language| {
                let translated = owned
                    .iter()
                    .filter(|key| key.value(language).is_some_and(|v| !v.trim().is_empty()))
                    .count();
                let completion_percentage = if total > 0 {
                    translated as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                (
                    language.clone(),
                    LanguageStats {
                        translated,
                        total,
                        completion_percentage,
                    },
                )
            })
            .collect();
        let categories = owned
            .iter()
            .filter(|key| !key.category.is_empty())
            .map(|key| key.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self {
            project_id: project.id.clone(),
            total_keys: total,
            categories,
            language_stats,
            supported_languages: project.supported_languages.clone(),
        }
    }
}

/// Flattened key → value table for one project and locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Localizations {
    pub project_id: String,
    pub locale: String,
    pub localizations: BTreeMap<String, String>,
}

impl Localizations {
    pub fn compute(project_id: &str, locale: &str, keys: &[TranslationKey]) -> Self {
        let localizations = keys
            .iter()
            .filter(|key| key.project_id == project_id)
            .filter_map(|key| {
                key.value(locale)
                    .map(|value| (key.key.clone(), value.to_string()))
            })
            .collect();
        Self {
            project_id: project_id.to_string(),
            locale: locale.to_string(),
            localizations,
        }
    }
}
