//! Persistence and rollback through repository stores

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;
use verso_core::config::StorageConfig;
use verso_core::prelude::*;
use verso_core::storage::RepositoryState;

fn author() -> Author {
    Author::new("user-1", "Ada Lovelace", "ada@example.com")
}

/// Store that fails every save while `failing` is set
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

#[async_trait]
impl RepositoryStore for FlakyStore {
    async fn load(&self) -> Result<Option<RepositoryState>> {
        self.inner.load().await
    }

    async fn save(&self, state: &RepositoryState) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VersoError::Storage("disk unavailable".to_string()));
        }
        self.inner.save(state).await
    }
}

#[tokio::test]
async fn test_failed_commit_rolls_back() {
    let store = Arc::new(FlakyStore::default());
    let mut repo = Repository::with_store(VersoConfig::default(), store.clone());
    repo.initialize(None).await.unwrap();
    let (_handle, mut rx) = repo.subscribe_channel(EventKind::CommitCreated);

    repo.write_file("a.sol", "a");
    repo.add(["a.sol"]).unwrap();
    store.failing.store(true, Ordering::SeqCst);

    let err = repo.commit("a", author()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(repo.get_commit_history(None, None).unwrap().len(), 1);
    assert!(repo.staging_area().contains("a.sol"));
    assert!(rx.try_recv().is_err());

    store.failing.store(false, Ordering::SeqCst);
    repo.commit("a", author()).await.unwrap();
    assert_eq!(repo.get_commit_history(None, None).unwrap().len(), 2);
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn test_failed_checkout_keeps_branch() {
    let store = Arc::new(FlakyStore::default());
    let mut repo = Repository::with_store(VersoConfig::default(), store.clone());
    repo.initialize(None).await.unwrap();
    repo.create_branch("feature").unwrap();
    repo.write_file("draft.sol", "wip");

    store.failing.store(true, Ordering::SeqCst);
    assert!(repo.checkout("feature").await.is_err());
    assert_eq!(repo.current_branch(), "main");
    assert_eq!(repo.read_file("draft.sol"), Some("wip"));
}

#[tokio::test]
async fn test_failed_initialize_leaves_repository_empty() {
    let store = Arc::new(FlakyStore::default());
    store.failing.store(true, Ordering::SeqCst);
    let mut repo = Repository::with_store(VersoConfig::default(), store.clone());

    let files = [("a.sol".to_string(), "a".to_string())].into();
    assert!(repo.initialize(Some(files)).await.is_err());
    assert!(!repo.is_initialized());
    assert!(repo.working_tree().is_empty());
    assert!(repo.head().is_none());

    store.failing.store(false, Ordering::SeqCst);
    assert!(repo.initialize(None).await.is_ok());
}

#[tokio::test]
async fn test_failed_merge_request_completion_rolls_back_merge() {
    let store = Arc::new(FlakyStore::default());
    let mut repo = Repository::with_store(VersoConfig::default(), store.clone());
    repo.initialize(Some([("a.sol".to_string(), "a".to_string())].into()))
        .await
        .unwrap();
    repo.create_branch("feature/x").unwrap();
    repo.checkout("feature/x").await.unwrap();
    repo.write_file("b.sol", "b");
    repo.add(["b.sol"]).unwrap();
    repo.commit("Add b", author()).await.unwrap();
    repo.checkout("main").await.unwrap();

    let main_head = repo.head().map(str::to_string);
    let request = repo.create_merge_request("Ship b", "", "feature/x", "main", author());
    let (_merged, mut merged_rx) = repo.subscribe_channel(EventKind::BranchesMerged);
    let (_updated, mut updated_rx) = repo.subscribe_channel(EventKind::MergeRequestUpdated);

    store.failing.store(true, Ordering::SeqCst);
    let err = repo.complete_merge_request(&request.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(repo.head().map(str::to_string), main_head);
    assert_eq!(repo.read_file("b.sol"), None);
    assert_eq!(
        repo.get_merge_request(&request.id).unwrap().status,
        MergeRequestStatus::Open
    );
    assert!(merged_rx.try_recv().is_err());
    assert!(updated_rx.try_recv().is_err());

    store.failing.store(false, Ordering::SeqCst);
    let completed = repo.complete_merge_request(&request.id).await.unwrap();
    assert_eq!(completed.status, MergeRequestStatus::Merged);
    assert_eq!(completed.merge_commit_id.as_deref(), repo.head());
    assert_eq!(repo.read_file("b.sol"), Some("b"));
    assert!(merged_rx.try_recv().is_ok());
    assert!(updated_rx.try_recv().is_ok());

    let saved = store.inner.load().await.unwrap().unwrap();
    assert_eq!(saved.merge_requests[0].status, MergeRequestStatus::Merged);
}

#[tokio::test]
async fn test_file_mode_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = ConfigBuilder::new()
        .storage(StorageConfig {
            mode: StorageMode::File,
            path: dir.path().join(".verso").join("state.json"),
        })
        .build();

    let mut repo = Repository::new(config.clone());
    repo.initialize(Some([("a.sol".to_string(), "a".to_string())].into()))
        .await
        .unwrap();
    repo.create_branch("feature/x").unwrap();
    let request = repo.create_merge_request("Ship it", "", "feature/x", "main", author());
    repo.flush().await.unwrap();

    let store = Arc::new(JsonFileStore::new(&config.storage.path));
    let reopened = Repository::open(config, store).await.unwrap();
    assert_eq!(reopened.id(), repo.id());
    assert_eq!(reopened.list_branches().len(), 2);
    assert_eq!(reopened.get_merge_request(&request.id), Some(&request));
    assert_eq!(reopened.head(), repo.head());
}

#[tokio::test]
async fn test_open_empty_store_starts_fresh() {
    let store = Arc::new(InMemoryStore::new());
    let repo = Repository::open(VersoConfig::default(), store).await.unwrap();

    assert!(!repo.is_initialized());
    assert_eq!(repo.current_branch(), "main");
}
