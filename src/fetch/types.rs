use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One repository as reported by the source-control API.
///
/// This is also the shape of the persisted snapshot layer, so it is
/// serialized in camelCase to stay compatible with exported snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Repository name, case preserved
    pub name: String,
    /// Owner login
    pub owner: String,
    /// Web URL of the repository
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub primary_language: Option<String>,
    pub is_private: bool,
    pub is_fork: bool,
    pub star_count: u64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "diskUsageKB")]
    pub disk_usage_kb: u64,
    /// Commits on the default branch. Absent without a default branch or
    /// when the REST path was used.
    #[serde(default)]
    pub default_branch_commit_count: Option<u64>,
}

impl RemoteRecord {
    /// The `"{owner}/{name}"` key used by every annotation layer.
    pub fn repo_key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// How to reach the remote account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer token, uses the paginated GraphQL query
    Token(String),
    /// Plain username, uses the public REST listing
    Username(String),
}

// GraphQL wire shapes.

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlResponse {
    pub data: Option<GraphQlData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlData {
    pub viewer: Viewer,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Viewer {
    pub repositories: RepositoryConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepositoryConnection {
    pub total_count: u64,
    pub page_info: PageInfo,
    pub nodes: Vec<GraphQlRepo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphQlRepo {
    pub name: String,
    pub owner: Login,
    pub url: String,
    pub description: Option<String>,
    pub primary_language: Option<NamedLanguage>,
    pub is_private: bool,
    pub is_fork: bool,
    pub stargazer_count: u64,
    pub created_at: DateTime<Utc>,
    pub disk_usage: Option<u64>,
    pub default_branch_ref: Option<BranchRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Login {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NamedLanguage {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchRef {
    pub target: Option<CommitTarget>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitTarget {
    pub history: Option<CommitHistory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommitHistory {
    pub total_count: u64,
}

impl From<GraphQlRepo> for RemoteRecord {
    fn from(repo: GraphQlRepo) -> Self {
        let default_branch_commit_count = repo
            .default_branch_ref
            .and_then(|r| r.target)
            .and_then(|t| t.history)
            .map(|h| h.total_count);

        RemoteRecord {
            name: repo.name,
            owner: repo.owner.login,
            url: repo.url,
            description: repo.description,
            primary_language: repo.primary_language.map(|l| l.name),
            is_private: repo.is_private,
            is_fork: repo.is_fork,
            star_count: repo.stargazer_count,
            created_at: repo.created_at,
            disk_usage_kb: repo.disk_usage.unwrap_or(0),
            default_branch_commit_count,
        }
    }
}

// REST wire shape.

#[derive(Debug, Deserialize)]
pub(crate) struct RestRepo {
    pub name: String,
    pub owner: Login,
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub private: bool,
    pub fork: bool,
    pub stargazers_count: u64,
    pub created_at: DateTime<Utc>,
    /// Size in KB
    pub size: u64,
}

impl From<RestRepo> for RemoteRecord {
    fn from(repo: RestRepo) -> Self {
        RemoteRecord {
            name: repo.name,
            owner: repo.owner.login,
            url: repo.html_url,
            description: repo.description,
            primary_language: repo.language,
            is_private: repo.private,
            is_fork: repo.fork,
            star_count: repo.stargazers_count,
            created_at: repo.created_at,
            disk_usage_kb: repo.size,
            default_branch_commit_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_key() {
        let record = RemoteRecord {
            name: "Widget".to_string(),
            owner: "Acme".to_string(),
            url: "https://github.com/Acme/Widget".to_string(),
            description: None,
            primary_language: None,
            is_private: false,
            is_fork: false,
            star_count: 0,
            created_at: "2020-01-01T00:00:00Z".parse().unwrap(),
            disk_usage_kb: 0,
            default_branch_commit_count: None,
        };
        assert_eq!(record.repo_key(), "Acme/Widget");
    }

    #[test]
    fn test_graphql_node_without_default_branch() {
        let node: GraphQlRepo = serde_json::from_str(
            r#"{
                "name": "empty",
                "owner": {"login": "alice"},
                "url": "https://github.com/alice/empty",
                "description": null,
                "primaryLanguage": null,
                "isPrivate": true,
                "isFork": false,
                "stargazerCount": 3,
                "createdAt": "2021-05-04T10:00:00Z",
                "diskUsage": 12,
                "defaultBranchRef": null
            }"#,
        )
        .unwrap();
        let record = RemoteRecord::from(node);
        assert_eq!(record.owner, "alice");
        assert_eq!(record.disk_usage_kb, 12);
        assert!(record.default_branch_commit_count.is_none());
        assert!(record.primary_language.is_none());
    }

    #[test]
    fn test_graphql_node_with_commit_history() {
        let node: GraphQlRepo = serde_json::from_str(
            r#"{
                "name": "busy",
                "owner": {"login": "alice"},
                "url": "https://github.com/alice/busy",
                "description": "lots of commits",
                "primaryLanguage": {"name": "Rust"},
                "isPrivate": false,
                "isFork": false,
                "stargazerCount": 10,
                "createdAt": "2019-01-01T00:00:00Z",
                "diskUsage": 2048,
                "defaultBranchRef": {"target": {"history": {"totalCount": 512}}}
            }"#,
        )
        .unwrap();
        let record = RemoteRecord::from(node);
        assert_eq!(record.primary_language.as_deref(), Some("Rust"));
        assert_eq!(record.default_branch_commit_count, Some(512));
    }

    #[test]
    fn test_rest_repo_conversion() {
        let repo: RestRepo = serde_json::from_str(
            r#"{
                "name": "site",
                "owner": {"login": "bob"},
                "html_url": "https://github.com/bob/site",
                "description": null,
                "language": "HTML",
                "private": false,
                "fork": true,
                "stargazers_count": 1,
                "created_at": "2018-02-03T04:05:06Z",
                "size": 99
            }"#,
        )
        .unwrap();
        let record = RemoteRecord::from(repo);
        assert!(record.is_fork);
        assert_eq!(record.url, "https://github.com/bob/site");
        assert_eq!(record.disk_usage_kb, 99);
        assert!(record.default_branch_commit_count.is_none());
    }

    #[test]
    fn test_snapshot_serialization_uses_wire_names() {
        let record = RemoteRecord {
            name: "a".to_string(),
            owner: "o".to_string(),
            url: "u".to_string(),
            description: None,
            primary_language: Some("Go".to_string()),
            is_private: false,
            is_fork: false,
            star_count: 2,
            created_at: "2020-01-01T00:00:00Z".parse().unwrap(),
            disk_usage_kb: 5,
            default_branch_commit_count: Some(7),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["diskUsageKB"], 5);
        assert_eq!(json["primaryLanguage"], "Go");
        assert_eq!(json["defaultBranchCommitCount"], 7);
    }
}
