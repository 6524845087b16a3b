//! JSON envelopes for moving annotations in and out.
//!
//! Imports are best-effort: anything unreadable is reported as ignored
//! and the current state stays as it was.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::annotations::AnnotationBundle;
use crate::reconcile::ViewRecord;

/// Deployment URL per bare repository name, as produced by the
/// infrastructure tooling.
pub type InfraUrls = BTreeMap<String, String>;

/// Key older exports used for the custom URL layer, when each repo held a
/// single string.
const LEGACY_CUSTOM_URLS_KEY: &str = "customUrl";
/// Output name the infrastructure tool uses for per-repo site URLs.
const PAGES_OUTPUT_KEY: &str = "pages_urls";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected document shape: {0}")]
    Shape(String),
}

/// Outcome of an import. Never an error; a rejected document is reported
/// as `Ignored` and leaves the bundle untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportReport {
    Applied { fields: Vec<&'static str> },
    Ignored { reason: String },
}

pub fn export(bundle: &AnnotationBundle) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(bundle)?)
}

/// Apply an exported (or hand-written) annotation document.
///
/// Every top-level key present replaces the matching map wholesale; keys
/// that are missing or null leave the current value alone. Legacy
/// `pages_urls` entries are appended to the custom URLs per name.
pub fn import(bundle: &mut AnnotationBundle, text: &str) -> ImportReport {
    match ImportPatch::decode(text) {
        Ok(patch) => {
            let fields = patch.apply(bundle);
            debug!(?fields, "imported annotations");
            ImportReport::Applied { fields }
        }
        Err(e) => {
            warn!(error = %e, "ignoring annotation import");
            ImportReport::Ignored {
                reason: e.to_string(),
            }
        }
    }
}

/// Fully decoded import, built before anything is assigned.
#[derive(Debug)]
struct ImportPatch {
    classes: Option<Vec<String>>,
    repo_classes: Option<BTreeMap<String, String>>,
    custom_urls: Option<BTreeMap<String, Vec<String>>>,
    repo_enabled: Option<BTreeMap<String, bool>>,
    repo_descriptions: Option<BTreeMap<String, String>>,
    pages_urls: Option<BTreeMap<String, Vec<String>>>,
}

impl ImportPatch {
    fn decode(text: &str) -> Result<Self, CodecError> {
        let Value::Object(mut root) = serde_json::from_str::<Value>(text)? else {
            return Err(CodecError::Shape("top level must be an object".to_string()));
        };

        let custom_urls = match take(&mut root, "customUrls")
            .or_else(|| take(&mut root, LEGACY_CUSTOM_URLS_KEY))
        {
            Some(value) => Some(url_map(value)?),
            None => None,
        };

        let pages_urls = match take(&mut root, PAGES_OUTPUT_KEY) {
            Some(output) => match output_value(output) {
                Some(value) => Some(url_map(value)?),
                None => None,
            },
            None => None,
        };

        Ok(ImportPatch {
            classes: field(&mut root, "classes")?,
            repo_classes: field(&mut root, "repoClasses")?,
            custom_urls,
            repo_enabled: field(&mut root, "repoEnabled")?,
            repo_descriptions: field(&mut root, "repoDescriptions")?,
            pages_urls,
        })
    }

    fn apply(self, bundle: &mut AnnotationBundle) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if let Some(classes) = self.classes {
            bundle.classes = classes;
            fields.push("classes");
        }
        if let Some(repo_classes) = self.repo_classes {
            bundle.repo_classes = repo_classes;
            fields.push("repoClasses");
        }
        if let Some(custom_urls) = self.custom_urls {
            bundle.custom_urls = custom_urls;
            fields.push("customUrls");
        }
        if let Some(repo_enabled) = self.repo_enabled {
            bundle.repo_enabled = repo_enabled;
            fields.push("repoEnabled");
        }
        if let Some(repo_descriptions) = self.repo_descriptions {
            bundle.repo_descriptions = repo_descriptions;
            fields.push("repoDescriptions");
        }
        // Keyed by bare repo name as the infra tool writes it, so these
        // only surface where a key happens to equal an owner/name key.
        if let Some(pages_urls) = self.pages_urls {
            for (name, urls) in pages_urls {
                bundle.custom_urls.entry(name).or_default().extend(urls);
            }
            fields.push(PAGES_OUTPUT_KEY);
        }
        fields
    }
}

/// Remove a key, treating an explicit null as absent.
fn take(root: &mut Map<String, Value>, key: &str) -> Option<Value> {
    root.remove(key).filter(|v| !v.is_null())
}

fn field<T: DeserializeOwned>(
    root: &mut Map<String, Value>,
    key: &str,
) -> Result<Option<T>, CodecError> {
    take(root, key)
        .map(serde_json::from_value)
        .transpose()
        .map_err(CodecError::from)
}

/// Unwrap an infrastructure output, `{ "value": {...} }`.
fn output_value(output: Value) -> Option<Value> {
    match output {
        Value::Object(mut map) => map.remove("value").filter(|v| !v.is_null()),
        _ => None,
    }
}

fn url_map(value: Value) -> Result<BTreeMap<String, Vec<String>>, CodecError> {
    let Value::Object(map) = value else {
        return Err(CodecError::Shape("URL layer must be an object".to_string()));
    };
    map.into_iter()
        .map(|(key, urls)| {
            let list = url_list(&key, urls)?;
            Ok((key, list))
        })
        .collect()
}

/// Accept both the current list form and the old single-string form.
fn url_list(key: &str, value: Value) -> Result<Vec<String>, CodecError> {
    match value {
        Value::String(url) if url.is_empty() => Ok(Vec::new()),
        Value::String(url) => Ok(vec![url]),
        Value::Null | Value::Bool(false) => Ok(Vec::new()),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(url) => Ok(url),
                other => Err(CodecError::Shape(format!(
                    "URL for {key} must be a string, got {other}"
                ))),
            })
            .collect(),
        other => Err(CodecError::Shape(format!(
            "URLs for {key} must be a string or list, got {other}"
        ))),
    }
}

/// Flattened snapshot of one enabled repository, for handing to other
/// tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnabledProject {
    pub name: String,
    pub owner: String,
    pub repo_key: String,
    pub url: String,
    pub description: String,
    pub language: Option<String>,
    #[serde(rename = "type")]
    pub type_label: String,
    pub class: String,
    pub urls: Vec<String>,
    pub stars: u64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "diskUsageKB")]
    pub disk_usage_kb: u64,
    pub commit_count: Option<u64>,
}

impl From<&ViewRecord> for EnabledProject {
    fn from(view: &ViewRecord) -> Self {
        EnabledProject {
            name: view.name.clone(),
            owner: view.owner.clone(),
            repo_key: view.repo_key.clone(),
            url: view.url.clone(),
            description: view.resolved_description.clone(),
            language: view.primary_language.clone(),
            type_label: view.type_label.to_string(),
            class: view.class_label.clone(),
            urls: view.resolved_urls.clone(),
            stars: view.star_count,
            created_at: view.created_at,
            disk_usage_kb: view.disk_usage_kb,
            commit_count: view.default_branch_commit_count,
        }
    }
}

pub fn enabled_projects(views: &[ViewRecord]) -> Vec<EnabledProject> {
    views
        .iter()
        .filter(|v| v.enabled)
        .map(EnabledProject::from)
        .collect()
}

pub fn export_enabled(views: &[ViewRecord]) -> Result<String, CodecError> {
    Ok(serde_json::to_string_pretty(&enabled_projects(views))?)
}

/// Read infrastructure output into the infra layer. Accepts the tool's
/// `{ "pages_urls": { "value": {...} } }` output or a flat name→url map.
/// List values contribute their first non-empty entry.
pub fn parse_infra_outputs(text: &str) -> Result<InfraUrls, CodecError> {
    let Value::Object(mut root) = serde_json::from_str::<Value>(text)? else {
        return Err(CodecError::Shape("top level must be an object".to_string()));
    };

    let map = match root.remove(PAGES_OUTPUT_KEY) {
        Some(output) => match output_value(output) {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(CodecError::Shape(format!(
                    "{PAGES_OUTPUT_KEY} has no object value"
                )))
            }
        },
        None => root,
    };

    let mut urls = InfraUrls::new();
    for (name, value) in map {
        let url = match value {
            Value::String(url) => Some(url),
            Value::Array(items) => items.into_iter().find_map(|item| match item {
                Value::String(url) if !url.is_empty() => Some(url),
                _ => None,
            }),
            _ => None,
        };
        match url {
            Some(url) => {
                urls.insert(name, url);
            }
            None => warn!(repo = %name, "skipping infra output entry without a URL"),
        }
    }
    Ok(urls)
}
