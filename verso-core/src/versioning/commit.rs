//! Commit system - commit objects, the commit graph, and commit creation

use crate::error::{Result, VersoError};
use crate::events::RepositoryEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Materialized file set: path -> content, ordered by path
pub type Snapshot = BTreeMap<String, String>;

/// Identity attached to a commit, opaque to the engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Kind of change recorded for a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// Change to a single path within a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: ChangeType,

    pub path: String,

    /// New content (added/modified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Content before the change (modified/deleted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_content: Option<String>,
}

impl Change {
    /// Classify the transition of `path` from `before` to `after`
    ///
    /// Returns None when nothing changed.
    pub fn between(path: &str, before: Option<&String>, after: Option<&String>) -> Option<Self> {
        let change_type = match (before, after) {
            (None, Some(_)) => ChangeType::Added,
            (Some(old), Some(new)) if old != new => ChangeType::Modified,
            (Some(_), None) => ChangeType::Deleted,
            _ => return None,
        };
        Some(Self {
            change_type,
            path: path.to_string(),
            content: after.cloned(),
            previous_content: before.cloned(),
        })
    }

    /// Apply this change to a snapshot
    pub fn apply(&self, snapshot: &mut Snapshot) {
        match (self.change_type, &self.content) {
            (ChangeType::Deleted, _) => {
                snapshot.remove(&self.path);
            }
            (_, Some(content)) => {
                snapshot.insert(self.path.clone(), content.clone());
            }
            (_, None) => {
                snapshot.insert(self.path.clone(), String::new());
            }
        }
    }
}

/// Immutable commit object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    /// Commit id, `commit_<hex>`
    pub id: String,

    /// Parent commit ids: none for the root, two for merges (target first)
    pub parent_ids: Vec<String>,

    pub message: String,

    pub author: Author,

    pub timestamp: DateTime<Utc>,

    /// Changes relative to the first parent, ordered by path
    pub changes: Vec<Change>,
}

impl Commit {
    /// Build a commit, deriving its id from its content plus a random nonce
    pub fn new(parent_ids: Vec<String>, message: &str, author: Author, changes: Vec<Change>) -> Self {
        let timestamp = Utc::now();

        let mut hasher = Sha256::new();
        for parent in &parent_ids {
            hasher.update(parent.as_bytes());
        }
        hasher.update(message.as_bytes());
        hasher.update(author.id.as_bytes());
        hasher.update(timestamp.to_rfc3339().as_bytes());
        for change in &changes {
            hasher.update(change.path.as_bytes());
            if let Some(content) = &change.content {
                hasher.update(content.as_bytes());
            }
        }
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Self {
            id: format!("commit_{}", &digest[..20]),
            parent_ids,
            message: message.to_string(),
            author,
            timestamp,
            changes,
        }
    }

    /// True for commits with two parents
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }
}

/// Append-only arena of commits addressed by id
#[derive(Debug, Clone, Default)]
pub struct CommitGraph {
    commits: Vec<Commit>,
    index: HashMap<String, usize>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from commits in insertion order
    pub fn from_commits(commits: Vec<Commit>) -> Result<Self> {
        let mut graph = Self::new();
        for commit in commits {
            graph.insert(commit)?;
        }
        Ok(graph)
    }

    /// Append a commit; every parent must already be present
    pub fn insert(&mut self, commit: Commit) -> Result<()> {
        if self.index.contains_key(&commit.id) {
            return Err(VersoError::Validation(format!(
                "Commit '{}' already exists",
                commit.id
            )));
        }
        if let Some(missing) = commit.parent_ids.iter().find(|p| !self.index.contains_key(*p)) {
            return Err(VersoError::Reference(format!(
                "Parent commit '{}' not found",
                missing
            )));
        }
        self.index.insert(commit.id.clone(), self.commits.len());
        self.commits.push(commit);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Commit> {
        self.index.get(id).map(|&i| &self.commits[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    /// All commits in insertion order
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    /// Insertion sequence of a commit
    pub fn sequence(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// File set at a commit, replaying the first-parent chain from the root
    pub fn snapshot(&self, id: &str) -> Result<Snapshot> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(commit_id) = current {
            let commit = self
                .get(commit_id)
                .ok_or_else(|| VersoError::Reference(format!("Commit '{}' not found", commit_id)))?;
            chain.push(commit);
            current = commit.parent_ids.first().map(String::as_str);
        }

        let mut snapshot = Snapshot::new();
        for commit in chain.into_iter().rev() {
            for change in &commit.changes {
                change.apply(&mut snapshot);
            }
        }
        Ok(snapshot)
    }

    /// Every commit reachable from `id` through parent links, including `id`
    pub fn ancestors(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(commit_id) = queue.pop_front() {
            if !seen.insert(commit_id.clone()) {
                continue;
            }
            if let Some(commit) = self.get(&commit_id) {
                queue.extend(commit.parent_ids.iter().cloned());
            }
        }
        seen
    }

    /// True if `ancestor` is reachable from `descendant`
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.ancestors(descendant).contains(ancestor)
    }

    /// Commits reachable from `head`, most recent first
    pub fn history(&self, head: &str, limit: Option<usize>) -> Vec<Commit> {
        let mut reachable: Vec<usize> = self
            .ancestors(head)
            .iter()
            .filter_map(|id| self.sequence(id))
            .collect();
        reachable.sort_unstable_by(|a, b| b.cmp(a));
        if let Some(limit) = limit {
            reachable.truncate(limit);
        }
        reachable.into_iter().map(|i| self.commits[i].clone()).collect()
    }
}

/// Extension methods for Repository to handle commits
impl super::repository::Repository {
    /// Commit the staging area onto the current branch
    ///
    /// # Arguments
    /// * `message` - Commit message
    /// * `author` - Author recorded on the commit
    ///
    /// # Returns
    /// Id of the new commit
    ///
    /// # Errors
    /// `Validation` if nothing is staged
    pub async fn commit(&mut self, message: &str, author: Author) -> Result<String> {
        if self.staging.is_empty() {
            return Err(VersoError::Validation(
                "No changes staged for commit".to_string(),
            ));
        }

        let checkpoint = self.checkpoint();
        let commit = self.record_commit(message, author)?;
        self.persist_or_rollback(checkpoint).await?;

        tracing::info!(
            commit_id = %commit.id,
            branch = %self.current_branch,
            changes = commit.changes.len(),
            "Commit created"
        );
        let id = commit.id.clone();
        self.events.emit(RepositoryEvent::CommitCreated { commit });
        Ok(id)
    }

    /// Build and append a commit from the staging area, advancing the branch
    pub(crate) fn record_commit(&mut self, message: &str, author: Author) -> Result<Commit> {
        let head = self.branches.head(&self.current_branch)?;
        let base = match &head {
            Some(id) => self.graph.snapshot(id)?,
            None => Snapshot::new(),
        };

        let changes: Vec<Change> = self
            .staging
            .entries()
            .filter_map(|(path, staged)| Change::between(path, base.get(path), staged.as_ref()))
            .collect();

        let commit = Commit::new(head.into_iter().collect(), message, author, changes);
        self.graph.insert(commit.clone())?;
        self.branches.set_head(&self.current_branch, &commit.id)?;
        if self.root_commit.is_none() {
            self.root_commit = Some(commit.id.clone());
        }
        self.staging.clear();
        Ok(commit)
    }
}
