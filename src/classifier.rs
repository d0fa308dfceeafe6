//! Click label classification
//!
//! The tracker reports clicks as raw tags: button/link text (truncated to 60
//! characters), `tag#id` for elements with an id, `tag.class` for elements
//! with a class, or the bare tag name. Only button text and known form fields
//! are meaningful on the dashboard; everything else is dropped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tags shorter than this carry no information
const MIN_TAG_CHARS: usize = 2;

/// Built-in form field identifiers and their display names
const DEFAULT_FIELD_NAMES: [(&str, &str); 22] = [
    ("name", "Имя"),
    ("surname", "Фамилия"),
    ("patronymic", "Отчество"),
    ("service", "Услуга"),
    ("business_info", "О бизнесе"),
    ("niche", "Ниша"),
    ("company_size", "Размер компании"),
    ("role", "Роль"),
    ("business_size", "Размер бизнеса"),
    ("budget", "Бюджет"),
    ("task_volume", "Объём задач"),
    ("need_volume", "Потребность"),
    ("deadline", "Срок"),
    ("task_type", "Тип задачи"),
    ("product_interest", "Интерес к продукту"),
    ("contact_method", "Способ связи"),
    ("preferred_contact_method", "Предпочтительный способ связи"),
    ("convenient_time", "Удобное время"),
    ("comments", "Комментарий"),
    ("admin-login", "Логин (админ)"),
    ("admin-password", "Пароль (админ)"),
    ("submit-btn", "Кнопка отправки"),
];

/// Human-meaningful click label used as a dashboard key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClickLabel(String);

impl ClickLabel {
    /// Label for a known form field
    pub fn field(display_name: &str) -> Self {
        Self(format!("Поле «{}»", display_name))
    }

    /// Label taken verbatim from button or link text
    pub fn text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ClickLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static mapping from DOM ids to form field display names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDictionary {
    names: BTreeMap<String, String>,
}

impl Default for FieldDictionary {
    fn default() -> Self {
        Self {
            names: DEFAULT_FIELD_NAMES
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl FieldDictionary {
    /// An empty dictionary: every `tag#id` click is dropped
    pub fn empty() -> Self {
        Self {
            names: BTreeMap::new(),
        }
    }

    /// Default dictionary extended (or overridden) by `extra`
    pub fn with_overrides(extra: &BTreeMap<String, String>) -> Self {
        let mut dictionary = Self::default();
        for (id, name) in extra {
            dictionary.insert(id.clone(), name.clone());
        }
        dictionary
    }

    pub fn insert(&mut self, id: impl Into<String>, display_name: impl Into<String>) {
        self.names.insert(id.into(), display_name.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Decides whether a raw click tag is worth showing and under which label
#[derive(Debug, Clone, Default)]
pub struct ClickLabelClassifier {
    fields: FieldDictionary,
}

impl ClickLabelClassifier {
    pub fn new(fields: FieldDictionary) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &FieldDictionary {
        &self.fields
    }

    /// Classify a raw tag. Rules are evaluated in order, first match wins.
    pub fn classify(&self, raw: &str) -> Option<ClickLabel> {
        if raw.chars().count() < MIN_TAG_CHARS {
            return None;
        }

        // `tag#id` must be checked before the bare-tag rule
        if let Some(id) = element_id(raw) {
            return self.fields.get(id).map(ClickLabel::field);
        }

        if is_bare_tag(raw) {
            return None;
        }

        if raw.contains('.') && !raw.chars().any(char::is_whitespace) {
            return None;
        }

        if raw.starts_with('#') || raw.starts_with('/') {
            return None;
        }

        Some(ClickLabel::text(raw))
    }
}

/// `^[a-z]+#(.+)$` → the id part
fn element_id(raw: &str) -> Option<&str> {
    let (tag, id) = raw.split_once('#')?;
    if is_bare_tag(tag) && !id.is_empty() {
        Some(id)
    } else {
        None
    }
}

fn is_bare_tag(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_lowercase())
}
