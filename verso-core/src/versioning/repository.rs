//! Repository facade - owns the commit graph, branches, working tree,
//! staging area and merge requests, and dispatches lifecycle events

use crate::config::{StorageMode, VersoConfig};
use crate::diff::{FileDiff, diff_snapshots};
use crate::error::{Result, VersoError};
use crate::events::{EventBus, EventKind, RepositoryEvent, SubscriptionHandle};
use crate::storage::{InMemoryStore, JsonFileStore, RepositoryState, RepositoryStore, STATE_FORMAT_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::branch::{Branch, BranchManager, validate_branch_name};
use super::commit::{Commit, CommitGraph, Snapshot};
use super::merge_request::{MergeRequest, MergeRequestTracker};
use super::staging::{StagingArea, WorkingTree};

/// Embedded version-control repository
///
/// Mutating operations take `&mut self`. Those marked `async` persist the
/// resulting state through the configured [`RepositoryStore`]; when that
/// fails the in-memory state is restored and no event is emitted.
pub struct Repository {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) default_branch: String,
    pub(crate) current_branch: String,
    pub(crate) root_commit: Option<String>,
    pub(crate) graph: CommitGraph,
    pub(crate) branches: BranchManager,
    pub(crate) working_tree: WorkingTree,
    pub(crate) staging: StagingArea,
    pub(crate) merge_requests: MergeRequestTracker,
    pub(crate) events: EventBus,
    pub(crate) store: Arc<dyn RepositoryStore>,
    pub(crate) config: VersoConfig,
}

/// Read-only summary of a repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    pub id: String,
    pub name: String,
    pub default_branch: String,
    pub current_branch: String,
    pub root_commit: Option<String>,
    pub branches: Vec<Branch>,
    pub merge_requests: Vec<MergeRequest>,
    pub commit_count: usize,
}

/// Mutable state captured before an operation, restored if persisting fails
pub(crate) struct Checkpoint {
    current_branch: String,
    root_commit: Option<String>,
    graph: CommitGraph,
    branches: BranchManager,
    working_tree: WorkingTree,
    staging: StagingArea,
    merge_requests: MergeRequestTracker,
}

impl Default for Repository {
    fn default() -> Self {
        Self::with_store(VersoConfig::default(), Arc::new(InMemoryStore::new()))
    }
}

impl Repository {
    /// Create an empty repository using the store selected in `config`
    pub fn new(config: VersoConfig) -> Self {
        let store: Arc<dyn RepositoryStore> = match config.storage.mode {
            StorageMode::Memory => Arc::new(InMemoryStore::new()),
            StorageMode::File => Arc::new(JsonFileStore::new(config.storage.path.clone())),
        };
        Self::with_store(config, store)
    }

    /// Create an empty repository persisting through `store`
    ///
    /// The default branch exists immediately but has no head until
    /// [`Repository::initialize`] runs.
    pub fn with_store(config: VersoConfig, store: Arc<dyn RepositoryStore>) -> Self {
        let default_branch = config.repository.default_branch.clone();
        Self {
            id: format!("repo_{}", Uuid::new_v4().simple()),
            name: config.repository.name.clone(),
            current_branch: default_branch.clone(),
            branches: BranchManager::with_default(&default_branch),
            default_branch,
            root_commit: None,
            graph: CommitGraph::new(),
            working_tree: WorkingTree::new(),
            staging: StagingArea::new(),
            merge_requests: MergeRequestTracker::new(),
            events: EventBus::new(config.events.channel_buffer),
            store,
            config,
        }
    }

    /// Restore a repository from `store`, or create an empty one if the
    /// store holds nothing yet
    ///
    /// # Errors
    /// `Storage` if the stored state cannot be loaded or is inconsistent
    pub async fn open(config: VersoConfig, store: Arc<dyn RepositoryStore>) -> Result<Self> {
        config.validate()?;
        let Some(state) = store.load().await? else {
            tracing::debug!("No stored state, starting empty repository");
            return Ok(Self::with_store(config, store));
        };

        let graph = CommitGraph::from_commits(state.commits)
            .map_err(|e| VersoError::Storage(format!("Corrupt commit graph: {}", e)))?;
        let branches = BranchManager::from_branches(state.branches)?;

        if !branches.get(&state.default_branch).is_some_and(|b| b.is_default) {
            return Err(VersoError::Storage(format!(
                "Stored default branch {} is missing",
                state.default_branch
            )));
        }
        if !branches.contains(&state.current_branch) {
            return Err(VersoError::Storage(format!(
                "Stored current branch {} is missing",
                state.current_branch
            )));
        }
        if let Some(missing) = branches
            .list()
            .into_iter()
            .filter_map(|b| b.head_commit_id)
            .find(|head| !graph.contains(head))
        {
            return Err(VersoError::Storage(format!(
                "Branch head {} is not in the commit graph",
                missing
            )));
        }

        tracing::info!(
            repository = %state.id,
            commits = graph.len(),
            branch = %state.current_branch,
            "Repository opened"
        );

        Ok(Self {
            id: state.id,
            name: state.name,
            default_branch: state.default_branch,
            current_branch: state.current_branch,
            root_commit: state.root_commit,
            graph,
            branches,
            working_tree: state.working_tree,
            staging: state.staging,
            merge_requests: MergeRequestTracker::from_requests(state.merge_requests),
            events: EventBus::new(config.events.channel_buffer),
            store,
            config,
        })
    }

    /// Create the root commit from `initial_files`
    ///
    /// Every initial file is written to the working tree and committed as
    /// "Initial commit" by the configured system author. The root commit is
    /// created even when there are no files.
    ///
    /// # Errors
    /// `State` if the repository already has commits
    pub async fn initialize(&mut self, initial_files: Option<Snapshot>) -> Result<String> {
        if !self.graph.is_empty() {
            return Err(VersoError::State(
                "Repository is already initialized".to_string(),
            ));
        }
        validate_branch_name(&self.default_branch)?;

        let checkpoint = self.checkpoint();
        for (path, content) in initial_files.unwrap_or_default() {
            self.staging.stage(path.clone(), content.clone());
            self.working_tree.write(path, content);
        }
        self.current_branch = self.default_branch.clone();

        let author = self.config.repository.system_author.clone();
        let commit = match self.record_commit("Initial commit", author) {
            Ok(commit) => commit,
            Err(e) => {
                self.restore(checkpoint);
                return Err(e);
            }
        };
        self.persist_or_rollback(checkpoint).await?;

        tracing::info!(
            repository = %self.id,
            commit_id = %commit.id,
            files = self.working_tree.len(),
            "Repository initialized"
        );
        self.events.emit(RepositoryEvent::RepositoryInitialized {
            repository_id: self.id.clone(),
            commit_id: commit.id.clone(),
        });
        Ok(commit.id)
    }

    /// Commits reachable from a branch head, most recent first
    ///
    /// # Arguments
    /// * `branch` - Branch to walk, the current branch when None
    /// * `limit` - Maximum number of commits to return
    ///
    /// # Errors
    /// `NotFound` if the branch does not exist
    pub fn get_commit_history(&self, branch: Option<&str>, limit: Option<usize>) -> Result<Vec<Commit>> {
        let branch = branch.unwrap_or(&self.current_branch);
        Ok(match self.branches.head(branch)? {
            Some(head) => self.graph.history(&head, limit),
            None => Vec::new(),
        })
    }

    pub fn get_commit(&self, id: &str) -> Option<&Commit> {
        self.graph.get(id)
    }

    /// Line diff between two commits, optionally restricted to one path
    ///
    /// # Errors
    /// `Reference` if either commit id is unknown
    pub fn get_diff(&self, from: &str, to: &str, path: Option<&str>) -> Result<Vec<FileDiff>> {
        if !self.graph.contains(from) || !self.graph.contains(to) {
            return Err(VersoError::Reference(
                "Invalid commit references".to_string(),
            ));
        }
        let before = self.graph.snapshot(from)?;
        let after = self.graph.snapshot(to)?;
        Ok(diff_snapshots(&before, &after, path, self.config.diff.context_lines))
    }

    /// File set at the current branch head
    pub fn head_snapshot(&self) -> Result<Snapshot> {
        match self.branches.head(&self.current_branch)? {
            Some(id) => self.graph.snapshot(&id),
            None => Ok(Snapshot::new()),
        }
    }

    /// Head commit of the current branch
    pub fn head(&self) -> Option<&str> {
        self.branches
            .get(&self.current_branch)
            .and_then(|b| b.head_commit_id.as_deref())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn current_branch(&self) -> &str {
        &self.current_branch
    }

    pub fn root_commit(&self) -> Option<&str> {
        self.root_commit.as_deref()
    }

    pub fn config(&self) -> &VersoConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        !self.graph.is_empty()
    }

    pub fn info(&self) -> RepositoryInfo {
        RepositoryInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            default_branch: self.default_branch.clone(),
            current_branch: self.current_branch.clone(),
            root_commit: self.root_commit.clone(),
            branches: self.branches.list(),
            merge_requests: self.merge_requests.list(None),
            commit_count: self.graph.len(),
        }
    }

    /// Register a callback for one event kind
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionHandle
    where
        F: Fn(&RepositoryEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// Receive one event kind through a bounded channel
    pub fn subscribe_channel(&mut self, kind: EventKind) -> (SubscriptionHandle, mpsc::Receiver<RepositoryEvent>) {
        self.events.subscribe_channel(kind)
    }

    /// Remove a subscription, returns false if it was already gone
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) -> bool {
        self.events.unsubscribe(handle)
    }

    pub fn unsubscribe_all(&mut self) {
        self.events.unsubscribe_all();
    }

    /// Persist the current state, including staged and unstaged edits
    pub async fn flush(&self) -> Result<()> {
        self.store.save(&self.state()).await?;
        tracing::debug!(repository = %self.id, "Repository state flushed");
        Ok(())
    }

    /// Serializable copy of the whole repository
    pub fn state(&self) -> RepositoryState {
        RepositoryState {
            format_version: STATE_FORMAT_VERSION,
            id: self.id.clone(),
            name: self.name.clone(),
            default_branch: self.default_branch.clone(),
            current_branch: self.current_branch.clone(),
            root_commit: self.root_commit.clone(),
            commits: self.graph.commits().to_vec(),
            branches: self.branches.list(),
            working_tree: self.working_tree.clone(),
            staging: self.staging.clone(),
            merge_requests: self.merge_requests.requests().to_vec(),
            saved_at: Utc::now(),
        }
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            current_branch: self.current_branch.clone(),
            root_commit: self.root_commit.clone(),
            graph: self.graph.clone(),
            branches: self.branches.clone(),
            working_tree: self.working_tree.clone(),
            staging: self.staging.clone(),
            merge_requests: self.merge_requests.clone(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.current_branch = checkpoint.current_branch;
        self.root_commit = checkpoint.root_commit;
        self.graph = checkpoint.graph;
        self.branches = checkpoint.branches;
        self.working_tree = checkpoint.working_tree;
        self.staging = checkpoint.staging;
        self.merge_requests = checkpoint.merge_requests;
    }

    /// Save the current state, restoring `checkpoint` if the store fails
    pub(crate) async fn persist_or_rollback(&mut self, checkpoint: Checkpoint) -> Result<()> {
        if let Err(e) = self.store.save(&self.state()).await {
            tracing::warn!(repository = %self.id, error = %e, "Persisting failed, rolling back");
            self.restore(checkpoint);
            return Err(match e {
                VersoError::Storage(msg) => VersoError::Storage(msg),
                other => VersoError::Storage(other.to_string()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::versioning::Author;

    fn files(entries: &[(&str, &str)]) -> Option<Snapshot> {
        Some(
            entries
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_initialize_creates_root_commit() {
        let mut repo = Repository::default();
        let root = repo.initialize(files(&[("test.sol", "contract Test {}")])).await.unwrap();

        assert_eq!(repo.current_branch(), "main");
        assert_eq!(repo.head(), Some(root.as_str()));
        assert_eq!(repo.root_commit(), Some(root.as_str()));
        assert!(repo.staging_area().is_empty());

        let history = repo.get_commit_history(None, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "Initial commit");
        assert_eq!(history[0].author.id, "system");
        assert!(history[0].parent_ids.is_empty());
    }

    #[tokio::test]
    async fn test_initialize_without_files() {
        let mut repo = Repository::default();
        let root = repo.initialize(None).await.unwrap();

        let commit = repo.get_commit(&root).unwrap();
        assert!(commit.changes.is_empty());
        assert!(repo.working_tree().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let mut repo = Repository::default();
        repo.initialize(None).await.unwrap();

        let err = repo.initialize(None).await.unwrap_err();
        assert!(matches!(err, VersoError::State(_)));
        assert_eq!(repo.get_commit_history(None, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_default_branch() {
        let config = ConfigBuilder::new().name("contracts").default_branch("trunk").build();
        let mut repo = Repository::new(config);
        repo.initialize(None).await.unwrap();

        let info = repo.info();
        assert_eq!(info.name, "contracts");
        assert_eq!(info.current_branch, "trunk");
        assert_eq!(info.branches.len(), 1);
        assert!(info.branches[0].is_default);
    }

    #[tokio::test]
    async fn test_history_limit_and_unknown_branch() {
        let mut repo = Repository::default();
        repo.initialize(None).await.unwrap();
        for i in 0..4 {
            repo.write_file("counter.txt", i.to_string());
            repo.add(["counter.txt"]).unwrap();
            repo.commit(&format!("commit {}", i), Author::new("u1", "Ada", "ada@example.com"))
                .await
                .unwrap();
        }

        let history = repo.get_commit_history(Some("main"), Some(2)).unwrap();
        let messages: Vec<&str> = history.iter().map(|c| c.message.as_str()).collect();
        assert_eq!(messages, vec!["commit 3", "commit 2"]);

        let err = repo.get_commit_history(Some("ghost"), None).unwrap_err();
        assert!(matches!(err, VersoError::NotFound(msg) if msg.contains("ghost")));
    }

    #[tokio::test]
    async fn test_get_diff_unknown_commit() {
        let mut repo = Repository::default();
        let root = repo.initialize(None).await.unwrap();

        let err = repo.get_diff(&root, "commit_missing", None).unwrap_err();
        assert_eq!(err.to_string(), "Reference error: Invalid commit references");
    }

    #[tokio::test]
    async fn test_open_restores_state() {
        let store = Arc::new(InMemoryStore::new());
        let mut repo = Repository::with_store(VersoConfig::default(), store.clone());
        repo.initialize(files(&[("a.txt", "1")])).await.unwrap();
        repo.create_branch("feature").unwrap();
        repo.write_file("scratch.txt", "draft");
        repo.flush().await.unwrap();

        let reopened = Repository::open(VersoConfig::default(), store).await.unwrap();
        assert_eq!(reopened.id(), repo.id());
        assert_eq!(reopened.list_branches().len(), 2);
        assert_eq!(reopened.read_file("scratch.txt"), Some("draft"));
        assert_eq!(reopened.head(), repo.head());
    }
}
