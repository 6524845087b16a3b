use chrono::{DateTime, Utc};
use std::fmt;

use crate::annotations::AnnotationBundle;
use crate::codec::InfraUrls;
use crate::fetch::RemoteRecord;

/// Visibility/origin category of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeLabel {
    Public,
    Private,
    Fork,
}

impl TypeLabel {
    pub fn of(record: &RemoteRecord) -> Self {
        if record.is_fork {
            TypeLabel::Fork
        } else if record.is_private {
            TypeLabel::Private
        } else {
            TypeLabel::Public
        }
    }
}

impl fmt::Display for TypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeLabel::Public => write!(f, "Public"),
            TypeLabel::Private => write!(f, "Private"),
            TypeLabel::Fork => write!(f, "Fork"),
        }
    }
}

/// A repository with every layer folded in, ready to filter and display.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRecord {
    pub repo_key: String,
    pub name: String,
    pub owner: String,
    pub url: String,
    pub description: Option<String>,
    pub primary_language: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub star_count: u64,
    pub created_at: DateTime<Utc>,
    pub disk_usage_kb: u64,
    pub default_branch_commit_count: Option<u64>,
    /// Infra URL first (if any), then custom URLs; blanks dropped
    pub resolved_urls: Vec<String>,
    /// Override, else remote description, else empty
    pub resolved_description: String,
    pub type_label: TypeLabel,
    pub enabled: bool,
    /// Empty means unclassified
    pub class_label: String,
}

/// Fold the infra and annotation layers onto the fetched list.
///
/// Output order matches `remote`. Layer entries with no matching
/// repository are ignored and left alone. Note the infra layer is keyed
/// by bare repository name, so two owners with the same repo name share
/// one infra URL.
pub fn reconcile(
    remote: &[RemoteRecord],
    infra: &InfraUrls,
    annotations: &AnnotationBundle,
) -> Vec<ViewRecord> {
    remote
        .iter()
        .map(|record| {
            let key = record.repo_key();
            let annotation = annotations.record(&key);

            let resolved_urls = infra
                .get(&record.name)
                .into_iter()
                .chain(annotation.custom_urls.iter())
                .filter(|url| !url.is_empty())
                .cloned()
                .collect();

            let resolved_description = if annotation.description_override.is_empty() {
                record.description.clone().unwrap_or_default()
            } else {
                annotation.description_override
            };

            ViewRecord {
                repo_key: key,
                name: record.name.clone(),
                owner: record.owner.clone(),
                url: record.url.clone(),
                description: record.description.clone(),
                primary_language: record.primary_language.clone(),
                is_private: record.is_private,
                is_fork: record.is_fork,
                star_count: record.star_count,
                created_at: record.created_at,
                disk_usage_kb: record.disk_usage_kb,
                default_branch_commit_count: record.default_branch_commit_count,
                resolved_urls,
                resolved_description,
                type_label: TypeLabel::of(record),
                enabled: annotation.enabled,
                class_label: annotation.class_label,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub fn remote(owner: &str, name: &str) -> RemoteRecord {
        RemoteRecord {
            name: name.to_string(),
            owner: owner.to_string(),
            url: format!("https://github.com/{owner}/{name}"),
            description: Some(format!("{name} from upstream")),
            primary_language: Some("Rust".to_string()),
            is_private: false,
            is_fork: false,
            star_count: 0,
            created_at: "2020-01-01T00:00:00Z".parse().unwrap(),
            disk_usage_kb: 0,
            default_branch_commit_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::remote;
    use super::*;

    #[test]
    fn test_type_label() {
        let mut record = remote("a", "b");
        assert_eq!(TypeLabel::of(&record), TypeLabel::Public);
        record.is_private = true;
        assert_eq!(TypeLabel::of(&record), TypeLabel::Private);
        record.is_fork = true;
        assert_eq!(TypeLabel::of(&record), TypeLabel::Fork);
    }

    #[test]
    fn test_order_preserved_and_pure() {
        let records = vec![remote("z", "last"), remote("a", "first"), remote("m", "mid")];
        let infra = InfraUrls::new();
        let bundle = AnnotationBundle::default();

        let first = reconcile(&records, &infra, &bundle);
        let second = reconcile(&records, &infra, &bundle);
        assert_eq!(first, second);
        let names: Vec<_> = first.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["last", "first", "mid"]);
    }

    #[test]
    fn test_infra_url_prepended_to_custom_urls() {
        let records = vec![remote("alice", "site")];
        let mut infra = InfraUrls::new();
        infra.insert("site".to_string(), "https://deploy.example".to_string());
        let mut bundle = AnnotationBundle::default();
        bundle.add_url("alice/site", "https://docs.example");
        bundle.add_url("alice/site", "");
        bundle.add_url("alice/site", "https://deploy.example");

        let view = &reconcile(&records, &infra, &bundle)[0];
        assert_eq!(
            view.resolved_urls,
            vec![
                "https://deploy.example",
                "https://docs.example",
                "https://deploy.example"
            ]
        );
    }

    #[test]
    fn test_empty_infra_url_skipped() {
        let records = vec![remote("alice", "site")];
        let mut infra = InfraUrls::new();
        infra.insert("site".to_string(), String::new());
        let view = &reconcile(&records, &infra, &AnnotationBundle::default())[0];
        assert!(view.resolved_urls.is_empty());
    }

    #[test]
    fn test_infra_keyed_by_bare_name_across_owners() {
        let records = vec![remote("alice", "site"), remote("bob", "site")];
        let mut infra = InfraUrls::new();
        infra.insert("site".to_string(), "https://shared.example".to_string());
        let views = reconcile(&records, &infra, &AnnotationBundle::default());
        assert_eq!(views[0].resolved_urls, vec!["https://shared.example"]);
        assert_eq!(views[1].resolved_urls, vec!["https://shared.example"]);
    }

    #[test]
    fn test_description_resolution() {
        let mut without_remote = remote("a", "none");
        without_remote.description = None;
        let records = vec![remote("a", "kept"), remote("a", "over"), without_remote];
        let mut bundle = AnnotationBundle::default();
        bundle.set_description("a/over", "local text");

        let views = reconcile(&records, &InfraUrls::new(), &bundle);
        assert_eq!(views[0].resolved_description, "kept from upstream");
        assert_eq!(views[1].resolved_description, "local text");
        assert_eq!(views[2].resolved_description, "");
    }

    #[test]
    fn test_empty_override_means_absent() {
        let records = vec![remote("a", "kept")];
        let mut bundle = AnnotationBundle::default();
        bundle
            .repo_descriptions
            .insert("a/kept".to_string(), String::new());
        let views = reconcile(&records, &InfraUrls::new(), &bundle);
        assert_eq!(views[0].resolved_description, "kept from upstream");
    }

    #[test]
    fn test_orphaned_annotations_ignored_not_purged() {
        let records = vec![remote("a", "live")];
        let mut bundle = AnnotationBundle::default();
        bundle.set_enabled("a/gone", true);
        bundle.set_class("a/live", "tool");

        let views = reconcile(&records, &InfraUrls::new(), &bundle);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].class_label, "tool");
        assert!(!views[0].enabled);
        assert!(bundle.is_enabled("a/gone"));
    }
}
