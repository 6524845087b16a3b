use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::reconcile::{TypeLabel, ViewRecord};

/// Filter value that matches records with no value at all.
pub const NONE_VALUE: &str = "(none)";
/// Type-category filter value covering Public and Private, i.e. everything
/// but forks.
pub const SOURCES_VALUE: &str = "Sources";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {what} '{value}'")]
pub struct UnknownValue {
    what: &'static str,
    value: String,
}

/// Equality filter on an optional string column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueFilter {
    /// Matches an empty or missing value, written `(none)`
    Missing,
    Equals(String),
}

impl ValueFilter {
    pub fn matches(&self, value: Option<&str>) -> bool {
        let value = value.filter(|v| !v.is_empty());
        match self {
            ValueFilter::Missing => value.is_none(),
            ValueFilter::Equals(expected) => value == Some(expected.as_str()),
        }
    }
}

impl FromStr for ValueFilter {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NONE_VALUE || s.is_empty() {
            Ok(ValueFilter::Missing)
        } else {
            Ok(ValueFilter::Equals(s.to_string()))
        }
    }
}

/// Type-category filter. `Sources` is a composite, not a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Sources,
    Only(TypeLabel),
}

impl TypeFilter {
    pub fn matches(&self, label: TypeLabel) -> bool {
        match self {
            TypeFilter::Sources => label != TypeLabel::Fork,
            TypeFilter::Only(expected) => label == *expected,
        }
    }
}

impl FromStr for TypeFilter {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SOURCES_VALUE => Ok(TypeFilter::Sources),
            "Public" => Ok(TypeFilter::Only(TypeLabel::Public)),
            "Private" => Ok(TypeFilter::Only(TypeLabel::Private)),
            "Fork" => Ok(TypeFilter::Only(TypeLabel::Fork)),
            other => Err(UnknownValue {
                what: "type",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::Sources => write!(f, "{SOURCES_VALUE}"),
            TypeFilter::Only(label) => write!(f, "{label}"),
        }
    }
}

/// Active predicates, AND-ed together. `None` means "any".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    /// Case-insensitive substring of the repository name
    pub name: Option<String>,
    pub owner: Option<String>,
    pub language: Option<ValueFilter>,
    pub type_category: Option<TypeFilter>,
    pub class: Option<ValueFilter>,
}

impl Default for Filters {
    fn default() -> Self {
        Filters {
            name: None,
            owner: None,
            language: None,
            type_category: Some(TypeFilter::Sources),
            class: None,
        }
    }
}

impl Filters {
    pub fn matches(&self, record: &ViewRecord) -> bool {
        if let Some(needle) = self.name.as_deref().filter(|n| !n.is_empty()) {
            if !record.name.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if &record.owner != owner {
                return false;
            }
        }
        if let Some(language) = &self.language {
            if !language.matches(record.primary_language.as_deref()) {
                return false;
            }
        }
        if let Some(type_category) = &self.type_category {
            if !type_category.matches(record.type_label) {
                return false;
            }
        }
        if let Some(class) = &self.class {
            if !class.matches(Some(record.class_label.as_str())) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Name,
    Owner,
    Language,
    Type,
    Class,
    Stars,
    Created,
    Size,
    Commits,
    Enabled,
}

impl FromStr for SortKey {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "owner" => Ok(SortKey::Owner),
            "language" => Ok(SortKey::Language),
            "type" => Ok(SortKey::Type),
            "class" => Ok(SortKey::Class),
            "stars" => Ok(SortKey::Stars),
            "created" => Ok(SortKey::Created),
            "size" => Ok(SortKey::Size),
            "commits" => Ok(SortKey::Commits),
            "enabled" => Ok(SortKey::Enabled),
            _ => Err(UnknownValue {
                what: "sort key",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder {
            key: SortKey::Name,
            direction: SortDirection::Ascending,
        }
    }
}

/// Table columns the renderer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Enabled,
    Name,
    Owner,
    Type,
    Language,
    Class,
    Stars,
    Created,
    Size,
    Commits,
    Urls,
    Description,
}

impl Column {
    pub const ALL: [Column; 12] = [
        Column::Enabled,
        Column::Name,
        Column::Owner,
        Column::Type,
        Column::Language,
        Column::Class,
        Column::Stars,
        Column::Created,
        Column::Size,
        Column::Commits,
        Column::Urls,
        Column::Description,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Column::Enabled => "On",
            Column::Name => "Name",
            Column::Owner => "Owner",
            Column::Type => "Type",
            Column::Language => "Language",
            Column::Class => "Class",
            Column::Stars => "Stars",
            Column::Created => "Created",
            Column::Size => "Size (KB)",
            Column::Commits => "Commits",
            Column::Urls => "URLs",
            Column::Description => "Description",
        }
    }
}

impl FromStr for Column {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_ascii_lowercase();
        Column::ALL
            .into_iter()
            .find(|c| format!("{c:?}").to_ascii_lowercase() == wanted)
            .ok_or_else(|| UnknownValue {
                what: "column",
                value: s.to_string(),
            })
    }
}

/// Option counts over the unfiltered list, for "N available" hints.
/// Missing languages and empty classes are counted under `(none)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregates {
    pub languages: BTreeMap<String, usize>,
    pub owners: BTreeMap<String, usize>,
    pub types: BTreeMap<TypeLabel, usize>,
    pub classes: BTreeMap<String, usize>,
}

impl Aggregates {
    pub fn from_records(records: &[ViewRecord]) -> Self {
        let mut aggregates = Aggregates::default();
        for record in records {
            let language = record
                .primary_language
                .as_deref()
                .filter(|l| !l.is_empty())
                .unwrap_or(NONE_VALUE);
            *aggregates.languages.entry(language.to_string()).or_default() += 1;
            *aggregates.owners.entry(record.owner.clone()).or_default() += 1;
            *aggregates.types.entry(record.type_label).or_default() += 1;
            let class = if record.class_label.is_empty() {
                NONE_VALUE
            } else {
                record.class_label.as_str()
            };
            *aggregates.classes.entry(class.to_string()).or_default() += 1;
        }
        aggregates
    }

    /// How many records a type-category filter would admit.
    pub fn count_for_type(&self, filter: TypeFilter) -> usize {
        self.types
            .iter()
            .filter(|(label, _)| filter.matches(**label))
            .map(|(_, count)| count)
            .sum()
    }
}

/// The window currently on screen, plus enough context to describe it.
#[derive(Debug)]
pub struct VisiblePage<'a> {
    pub rows: Vec<&'a ViewRecord>,
    /// Zero-based page index actually shown
    pub page: usize,
    pub page_count: usize,
    pub filtered_total: usize,
    pub total: usize,
}
