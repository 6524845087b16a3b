pub mod types;

pub use types::{Credential, RemoteRecord};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use types::{GraphQlResponse, RestRepo};

/// Items requested per page on both API paths.
pub const PAGE_SIZE: usize = 100;

const REPOSITORIES_QUERY: &str = r#"
query($first: Int!, $cursor: String) {
  viewer {
    repositories(first: $first, after: $cursor, ownerAffiliations: [OWNER, COLLABORATOR]) {
      totalCount
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        owner { login }
        url
        description
        primaryLanguage { name }
        isPrivate
        isFork
        stargazerCount
        createdAt
        diskUsage
        defaultBranchRef {
          target { ... on Commit { history { totalCount } } }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GitHub rejected the request ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("No GitHub token or username configured")]
    MissingCredential,

    #[error("GitHub API error: {0}")]
    Api(String),

    #[error("Network error talking to GitHub: {0}")]
    Network(String),
}

/// Coarse failure category, for callers that branch on the kind rather
/// than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Auth,
    Api,
    Network,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Auth { .. } | FetchError::MissingCredential => FetchErrorKind::Auth,
            FetchError::Api(_) => FetchErrorKind::Api,
            FetchError::Network(_) => FetchErrorKind::Network,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Raw HTTP answer handed back by a transport. Status checking is the
/// fetcher's job, not the transport's.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP surface the fetcher needs. Implementations only report
/// transport failures as errors; any status code is a successful response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, FetchError>;

    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// Production transport backed by reqwest.
pub struct ReqwestTransport {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            user_agent: user_agent.into(),
        }
    }

    async fn read_response(response: reqwest::Response) -> Result<HttpResponse, FetchError> {
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .post(url)
            .header("User-Agent", &self.user_agent)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        Self::read_response(response).await
    }
}

/// Where the two API paths live. Pointing `graphql_url` at a proxy works
/// as long as it speaks the same request/response shapes.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub graphql_url: String,
    pub rest_url: String,
}

/// Pulls every repository of an account, one page at a time.
///
/// A failure on any page aborts the whole run and drops whatever was
/// accumulated so far. Nothing is persisted here.
pub struct RemoteFetcher<T: HttpTransport> {
    transport: T,
    endpoints: Endpoints,
}

impl<T: HttpTransport> RemoteFetcher<T> {
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub async fn fetch_all(&self, credential: &Credential) -> Result<Vec<RemoteRecord>, FetchError> {
        match credential {
            Credential::Token(token) if !token.is_empty() => self.fetch_with_token(token).await,
            Credential::Username(user) if !user.is_empty() => self.fetch_public(user).await,
            _ => Err(FetchError::MissingCredential),
        }
    }

    /// Cursor-paginated GraphQL listing of owned and collaborated repos.
    #[instrument(skip_all)]
    pub async fn fetch_with_token(&self, token: &str) -> Result<Vec<RemoteRecord>, FetchError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut page = 0usize;

        loop {
            page += 1;
            let body = json!({
                "query": REPOSITORIES_QUERY,
                "variables": { "first": PAGE_SIZE, "cursor": cursor },
            });
            let response = self
                .transport
                .post_json(&self.endpoints.graphql_url, token, &body)
                .await?;
            check_status(&response)?;

            let parsed: GraphQlResponse = serde_json::from_str(&response.body)
                .map_err(|e| FetchError::Api(format!("malformed response: {e}")))?;
            if let Some(first) = parsed.errors.into_iter().next() {
                return Err(FetchError::Api(first.message));
            }
            let connection = parsed
                .data
                .ok_or_else(|| FetchError::Api("response carried no data".to_string()))?
                .viewer
                .repositories;

            debug!(
                page,
                nodes = connection.nodes.len(),
                total = connection.total_count,
                has_next = connection.page_info.has_next_page,
                "received repository page"
            );
            records.extend(connection.nodes.into_iter().map(RemoteRecord::from));

            if !connection.page_info.has_next_page {
                break;
            }
            match connection.page_info.end_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    warn!(page, "hasNextPage set without an endCursor");
                    return Err(FetchError::Api(
                        "malformed response: hasNextPage without endCursor".to_string(),
                    ));
                }
            }
        }

        debug!(pages = page, repositories = records.len(), "finished GraphQL pagination");
        Ok(records)
    }

    /// Numbered-page REST listing of a user's public repos. A short page
    /// is the last page.
    #[instrument(skip(self))]
    pub async fn fetch_public(&self, username: &str) -> Result<Vec<RemoteRecord>, FetchError> {
        let base = self.endpoints.rest_url.trim_end_matches('/');
        let mut records = Vec::new();
        let mut page = 1usize;

        loop {
            let url = format!("{base}/users/{username}/repos?per_page={PAGE_SIZE}&page={page}");
            let response = self.transport.get(&url).await?;
            check_status(&response)?;

            let repos: Vec<RestRepo> = serde_json::from_str(&response.body)
                .map_err(|e| FetchError::Api(format!("malformed response: {e}")))?;
            let count = repos.len();
            debug!(page, repositories = count, "received repository page");
            records.extend(repos.into_iter().map(RemoteRecord::from));

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!(pages = page, repositories = records.len(), "finished REST pagination");
        Ok(records)
    }
}

fn check_status(response: &HttpResponse) -> Result<(), FetchError> {
    if response.is_success() {
        return Ok(());
    }

    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let message = serde_json::from_str::<ErrorBody>(&response.body)
        .map(|b| b.message)
        .unwrap_or_else(|_| format!("HTTP status {}", response.status));
    Err(FetchError::Auth {
        status: response.status,
        message,
    })
}
