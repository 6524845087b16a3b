use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything the user has typed in, keyed by repo key (`owner/name`).
///
/// This is both the persisted annotation layer and the export envelope.
/// Entries are created on first edit and survive refetches, even when
/// the repository they refer to is no longer listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationBundle {
    /// Class taxonomy, distinct labels in display order
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub repo_classes: BTreeMap<String, String>,
    /// Extra URLs per repo, insertion order kept, duplicates allowed
    #[serde(default)]
    pub custom_urls: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub repo_enabled: BTreeMap<String, bool>,
    #[serde(default)]
    pub repo_descriptions: BTreeMap<String, String>,
}

/// Per-repository view over the bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationRecord {
    pub enabled: bool,
    pub class_label: String,
    pub custom_urls: Vec<String>,
    pub description_override: String,
}

impl AnnotationBundle {
    pub fn record(&self, key: &str) -> AnnotationRecord {
        AnnotationRecord {
            enabled: self.is_enabled(key),
            class_label: self.repo_classes.get(key).cloned().unwrap_or_default(),
            custom_urls: self.custom_urls.get(key).cloned().unwrap_or_default(),
            description_override: self.repo_descriptions.get(key).cloned().unwrap_or_default(),
        }
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.repo_enabled.get(key).copied().unwrap_or(false)
    }

    pub fn set_enabled(&mut self, key: &str, enabled: bool) {
        self.repo_enabled.insert(key.to_string(), enabled);
    }

    /// Assign a class label. An empty label clears the assignment. The
    /// label does not have to be in the taxonomy.
    pub fn set_class(&mut self, key: &str, label: &str) {
        if label.is_empty() {
            self.repo_classes.remove(key);
        } else {
            self.repo_classes.insert(key.to_string(), label.to_string());
        }
    }

    /// An empty description clears the override.
    pub fn set_description(&mut self, key: &str, description: &str) {
        if description.is_empty() {
            self.repo_descriptions.remove(key);
        } else {
            self.repo_descriptions
                .insert(key.to_string(), description.to_string());
        }
    }

    pub fn add_url(&mut self, key: &str, url: &str) {
        self.custom_urls
            .entry(key.to_string())
            .or_default()
            .push(url.to_string());
    }

    /// Remove the URL at `index`, returning it if it existed.
    pub fn remove_url(&mut self, key: &str, index: usize) -> Option<String> {
        let urls = self.custom_urls.get_mut(key)?;
        if index >= urls.len() {
            return None;
        }
        let removed = urls.remove(index);
        if urls.is_empty() {
            self.custom_urls.remove(key);
        }
        Some(removed)
    }

    pub fn clear_urls(&mut self, key: &str) {
        self.custom_urls.remove(key);
    }

    /// Add a label to the taxonomy. Returns false if it was already there
    /// or is blank.
    pub fn add_class(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || self.classes.iter().any(|c| c == label) {
            return false;
        }
        self.classes.push(label.to_string());
        true
    }

    /// Drop a label from the taxonomy. Repositories already tagged with
    /// it keep the label.
    pub fn remove_class(&mut self, label: &str) -> bool {
        let before = self.classes.len();
        self.classes.retain(|c| c != label);
        self.classes.len() != before
    }

    /// Labels used by some repository but missing from the taxonomy.
    pub fn dangling_classes(&self) -> Vec<&str> {
        let mut dangling: Vec<&str> = self
            .repo_classes
            .values()
            .filter(|label| !self.classes.contains(label))
            .map(String::as_str)
            .collect();
        dangling.sort_unstable();
        dangling.dedup();
        dangling
    }
}
