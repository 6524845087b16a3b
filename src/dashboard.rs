use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::annotations::AnnotationBundle;
use crate::codec::{self, CodecError, ImportReport, InfraUrls};
use crate::fetch::{Credential, FetchError, HttpTransport, RemoteFetcher, RemoteRecord};
use crate::reconcile::{reconcile, ViewRecord};
use crate::store::{KeyValueStore, StoreError, ANNOTATIONS, INFRA_URLS, SNAPSHOT};
use crate::view::QueryState;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Invalid repository key '{0}', expected owner/name")]
    InvalidKey(String),
}

/// Change counters for the three layers. Derived views are rebuilt only
/// when this moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Versions {
    snapshot: u64,
    infra: u64,
    annotations: u64,
}

/// In-memory copy of the three persisted layers.
///
/// Layers are read once in [`Dashboard::open`] and each write goes
/// straight to the store for that layer only.
pub struct Dashboard {
    store: Box<dyn KeyValueStore>,
    snapshot: Vec<RemoteRecord>,
    infra: InfraUrls,
    annotations: AnnotationBundle,
    versions: Versions,
    views: Option<(Versions, Vec<ViewRecord>)>,
}

impl Dashboard {
    pub fn open(store: Box<dyn KeyValueStore>) -> Result<Self, DashboardError> {
        let snapshot = SNAPSHOT.load(store.as_ref())?;
        let infra = INFRA_URLS.load(store.as_ref())?;
        let annotations = ANNOTATIONS.load(store.as_ref())?;
        debug!(
            repositories = snapshot.len(),
            infra_urls = infra.len(),
            classes = annotations.classes.len(),
            "opened dashboard"
        );
        Ok(Self {
            store,
            snapshot,
            infra,
            annotations,
            versions: Versions::default(),
            views: None,
        })
    }

    pub fn snapshot(&self) -> &[RemoteRecord] {
        &self.snapshot
    }

    pub fn infra_urls(&self) -> &InfraUrls {
        &self.infra
    }

    pub fn annotations(&self) -> &AnnotationBundle {
        &self.annotations
    }

    /// Refetch everything and replace the snapshot. On failure the stored
    /// snapshot is left exactly as it was.
    #[instrument(skip_all)]
    pub async fn refresh<T: HttpTransport>(
        &mut self,
        fetcher: &RemoteFetcher<T>,
        credential: &Credential,
    ) -> Result<usize, DashboardError> {
        let records = fetcher.fetch_all(credential).await?;
        SNAPSHOT.save(self.store.as_ref(), &records)?;
        info!(repositories = records.len(), "stored new snapshot");
        self.snapshot = records;
        self.versions.snapshot += 1;
        Ok(self.snapshot.len())
    }

    pub fn set_infra_urls(&mut self, urls: InfraUrls) -> Result<(), DashboardError> {
        INFRA_URLS.save(self.store.as_ref(), &urls)?;
        self.infra = urls;
        self.versions.infra += 1;
        Ok(())
    }

    pub fn set_enabled(&mut self, key: &str, enabled: bool) -> Result<(), DashboardError> {
        check_key(key)?;
        self.edit(|a| a.set_enabled(key, enabled))
    }

    pub fn set_class(&mut self, key: &str, label: &str) -> Result<(), DashboardError> {
        check_key(key)?;
        self.edit(|a| a.set_class(key, label))
    }

    pub fn set_description(&mut self, key: &str, text: &str) -> Result<(), DashboardError> {
        check_key(key)?;
        self.edit(|a| a.set_description(key, text))
    }

    pub fn add_url(&mut self, key: &str, url: &str) -> Result<(), DashboardError> {
        check_key(key)?;
        self.edit(|a| a.add_url(key, url))
    }

    pub fn remove_url(&mut self, key: &str, index: usize) -> Result<Option<String>, DashboardError> {
        check_key(key)?;
        self.edit(|a| a.remove_url(key, index))
    }

    pub fn clear_urls(&mut self, key: &str) -> Result<(), DashboardError> {
        check_key(key)?;
        self.edit(|a| a.clear_urls(key))
    }

    pub fn add_class(&mut self, label: &str) -> Result<bool, DashboardError> {
        self.edit(|a| a.add_class(label))
    }

    pub fn remove_class(&mut self, label: &str) -> Result<bool, DashboardError> {
        self.edit(|a| a.remove_class(label))
    }

    /// Import an annotation document. Rejected documents change nothing
    /// and are not an error.
    pub fn import_annotations(&mut self, text: &str) -> Result<ImportReport, DashboardError> {
        let mut updated = self.annotations.clone();
        let report = codec::import(&mut updated, text);
        if let ImportReport::Applied { .. } = report {
            ANNOTATIONS.save(self.store.as_ref(), &updated)?;
            self.annotations = updated;
            self.versions.annotations += 1;
        }
        Ok(report)
    }

    pub fn export_annotations(&self) -> Result<String, DashboardError> {
        Ok(codec::export(&self.annotations)?)
    }

    pub fn export_enabled(&mut self) -> Result<String, DashboardError> {
        Ok(codec::export_enabled(self.view_records())?)
    }

    /// Reconciled rows, rebuilt only when a layer changed since last time.
    pub fn view_records(&mut self) -> &[ViewRecord] {
        let current = self.versions;
        let stale = !matches!(&self.views, Some((built, _)) if *built == current);
        if stale {
            debug!(?current, "rebuilding view records");
            let views = reconcile(&self.snapshot, &self.infra, &self.annotations);
            self.views = Some((current, views));
        }
        match &self.views {
            Some((_, views)) => views,
            None => &[],
        }
    }

    /// A fresh query state over the current rows, with default filters.
    pub fn query(&mut self, page_size: usize) -> QueryState {
        let mut state = QueryState::new(page_size);
        state.set_records(self.view_records().to_vec());
        state
    }

    /// Apply a change to a copy of the bundle and keep it only once the
    /// store accepted it.
    fn edit<R>(&mut self, change: impl FnOnce(&mut AnnotationBundle) -> R) -> Result<R, DashboardError> {
        let mut updated = self.annotations.clone();
        let result = change(&mut updated);
        ANNOTATIONS.save(self.store.as_ref(), &updated)?;
        self.annotations = updated;
        self.versions.annotations += 1;
        Ok(result)
    }
}

fn check_key(key: &str) -> Result<(), DashboardError> {
    match key.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(())
        }
        _ => Err(DashboardError::InvalidKey(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{endpoints, graphql_page, ScriptedTransport};
    use crate::fetch::FetchErrorKind;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    /// Lets a test keep a handle on the store the dashboard writes to.
    struct Shared(Arc<MemoryStore>);

    impl KeyValueStore for Shared {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.0.set(key, value)
        }
    }

    /// Reads succeed, every write fails.
    struct ReadOnly(MemoryStore);

    impl KeyValueStore for ReadOnly {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Io {
                path: format!("{key}.json").into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    fn open_shared() -> (Dashboard, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let dashboard = Dashboard::open(Box::new(Shared(store.clone()))).unwrap();
        (dashboard, store)
    }

    fn token() -> Credential {
        Credential::Token("tok".to_string())
    }

    #[tokio::test]
    async fn test_refresh_persists_snapshot() {
        let (mut dashboard, store) = open_shared();
        let fetcher = RemoteFetcher::new(
            ScriptedTransport::new().respond(200, graphql_page(0, 3, 3, None)),
            endpoints(),
        );
        let count = dashboard.refresh(&fetcher, &token()).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(SNAPSHOT.load(store.as_ref()).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_second_page_keeps_previous_snapshot() {
        let (mut dashboard, store) = open_shared();
        let first = RemoteFetcher::new(
            ScriptedTransport::new().respond(200, graphql_page(0, 5, 5, None)),
            endpoints(),
        );
        dashboard.refresh(&first, &token()).await.unwrap();

        let failing = RemoteFetcher::new(
            ScriptedTransport::new()
                .respond(200, graphql_page(0, 100, 200, Some("c1")))
                .fail(FetchError::Network("connection reset".to_string())),
            endpoints(),
        );
        let err = dashboard.refresh(&failing, &token()).await.unwrap_err();
        match err {
            DashboardError::Fetch(e) => assert_eq!(e.kind(), FetchErrorKind::Network),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dashboard.snapshot().len(), 5);
        assert_eq!(SNAPSHOT.load(store.as_ref()).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_leaves_empty_snapshot() {
        let (mut dashboard, store) = open_shared();
        let failing = RemoteFetcher::new(
            ScriptedTransport::new()
                .respond(200, graphql_page(0, 100, 200, Some("c1")))
                .respond(502, "bad gateway"),
            endpoints(),
        );
        assert!(dashboard.refresh(&failing, &token()).await.is_err());
        assert!(dashboard.snapshot().is_empty());
        assert!(store.get(SNAPSHOT.key()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_annotations_survive_refetch() {
        let (mut dashboard, _store) = open_shared();
        dashboard.set_class("alice/repo-1", "tool").unwrap();
        dashboard.set_enabled("alice/vanished", true).unwrap();

        let fetcher = RemoteFetcher::new(
            ScriptedTransport::new().respond(200, graphql_page(0, 3, 3, None)),
            endpoints(),
        );
        dashboard.refresh(&fetcher, &token()).await.unwrap();

        let views = dashboard.view_records();
        let tagged = views.iter().find(|v| v.name == "repo-1").unwrap();
        assert_eq!(tagged.class_label, "tool");
        assert!(dashboard.annotations().is_enabled("alice/vanished"));
    }

    #[test]
    fn test_edits_persist_immediately() {
        let (mut dashboard, store) = open_shared();
        dashboard.add_url("alice/site", "https://a").unwrap();
        dashboard.set_description("alice/site", "mine").unwrap();

        let stored = ANNOTATIONS.load(store.as_ref()).unwrap();
        assert_eq!(stored.custom_urls["alice/site"], vec!["https://a"]);
        assert_eq!(stored.repo_descriptions["alice/site"], "mine");

        let reopened = Dashboard::open(Box::new(Shared(store.clone()))).unwrap();
        assert_eq!(reopened.annotations(), dashboard.annotations());
    }

    #[test]
    fn test_invalid_key_rejected() {
        let (mut dashboard, _store) = open_shared();
        assert!(matches!(
            dashboard.set_enabled("no-slash", true),
            Err(DashboardError::InvalidKey(_))
        ));
        assert!(dashboard.set_class("a/b/c", "x").is_err());
        assert!(dashboard.annotations().repo_enabled.is_empty());
    }

    #[test]
    fn test_view_records_follow_edits() {
        let store = MemoryStore::new();
        SNAPSHOT
            .save(&store, &vec![crate::reconcile::testing::remote("alice", "site")])
            .unwrap();
        let mut dashboard = Dashboard::open(Box::new(store)).unwrap();
        assert!(!dashboard.view_records()[0].enabled);

        dashboard.set_enabled("alice/site", true).unwrap();
        assert!(dashboard.view_records()[0].enabled);

        let mut infra = InfraUrls::new();
        infra.insert("site".to_string(), "https://deploy".to_string());
        dashboard.set_infra_urls(infra).unwrap();
        assert_eq!(dashboard.view_records()[0].resolved_urls, vec!["https://deploy"]);
    }

    #[test]
    fn test_failed_save_keeps_previous_annotations() {
        let store = MemoryStore::new();
        SNAPSHOT
            .save(&store, &vec![crate::reconcile::testing::remote("alice", "site")])
            .unwrap();
        let mut dashboard = Dashboard::open(Box::new(ReadOnly(store))).unwrap();
        assert!(!dashboard.view_records()[0].enabled);

        let err = dashboard.set_enabled("alice/site", true).unwrap_err();
        assert!(matches!(err, DashboardError::Store(_)));
        assert!(!dashboard.annotations().is_enabled("alice/site"));
        assert!(!dashboard.view_records()[0].enabled);

        assert!(dashboard.add_class("tool").is_err());
        assert!(dashboard.annotations().classes.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_pagination_keeps_previous_snapshot() {
        let (mut dashboard, store) = open_shared();
        let first = RemoteFetcher::new(
            ScriptedTransport::new().respond(200, graphql_page(0, 5, 5, None)),
            endpoints(),
        );
        dashboard.refresh(&first, &token()).await.unwrap();

        let page = graphql_page(0, 100, 500, None)
            .replace(r#""hasNextPage":false"#, r#""hasNextPage":true"#);
        let truncated =
            RemoteFetcher::new(ScriptedTransport::new().respond(200, page), endpoints());
        let err = dashboard.refresh(&truncated, &token()).await.unwrap_err();
        match err {
            DashboardError::Fetch(e) => assert_eq!(e.kind(), FetchErrorKind::Api),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dashboard.snapshot().len(), 5);
        assert_eq!(SNAPSHOT.load(store.as_ref()).unwrap().len(), 5);
    }

    #[test]
    fn test_import_rejected_document_changes_nothing() {
        let (mut dashboard, store) = open_shared();
        dashboard.add_class("tool").unwrap();
        let report = dashboard.import_annotations("garbage").unwrap();
        assert!(matches!(report, ImportReport::Ignored { .. }));
        assert_eq!(ANNOTATIONS.load(store.as_ref()).unwrap().classes, vec!["tool"]);
    }

    #[test]
    fn test_import_then_export_enabled() {
        let store = MemoryStore::new();
        SNAPSHOT
            .save(
                &store,
                &vec![
                    crate::reconcile::testing::remote("alice", "cli"),
                    crate::reconcile::testing::remote("alice", "web"),
                ],
            )
            .unwrap();
        let mut dashboard = Dashboard::open(Box::new(store)).unwrap();
        dashboard
            .import_annotations(r#"{"repoEnabled": {"alice/web": true}}"#)
            .unwrap();
        let exported: serde_json::Value =
            serde_json::from_str(&dashboard.export_enabled().unwrap()).unwrap();
        let list = exported.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["repoKey"], "alice/web");
    }

    #[test]
    fn test_query_starts_with_defaults() {
        let store = MemoryStore::new();
        let mut fork = crate::reconcile::testing::remote("alice", "fork");
        fork.is_fork = true;
        SNAPSHOT
            .save(&store, &vec![crate::reconcile::testing::remote("alice", "src"), fork])
            .unwrap();
        let mut dashboard = Dashboard::open(Box::new(store)).unwrap();
        let state = dashboard.query(200);
        assert_eq!(state.filtered_count(), 1);
        assert_eq!(state.records().len(), 2);
    }
}
