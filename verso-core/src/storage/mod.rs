//! Storage backends for repository state
//!
//! The repository keeps its whole state in memory and hands a
//! [`RepositoryState`] document to a [`RepositoryStore`] at each durability
//! point. Two backends ship with the crate:
//!
//! - [`InMemoryStore`] keeps the latest document in process memory (default,
//!   and handy in tests)
//! - [`JsonFileStore`] writes the document to a JSON file

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::versioning::{Branch, Commit, MergeRequest, StagingArea, WorkingTree};

pub mod file;
pub mod inmemory;

pub use file::JsonFileStore;
pub use inmemory::InMemoryStore;

/// Version of the persisted document layout
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Serializable snapshot of a whole repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryState {
    pub format_version: u32,
    pub id: String,
    pub name: String,
    pub default_branch: String,
    pub current_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_commit: Option<String>,
    /// Commits in graph insertion order
    pub commits: Vec<Commit>,
    pub branches: Vec<Branch>,
    pub working_tree: WorkingTree,
    pub staging: StagingArea,
    #[serde(default)]
    pub merge_requests: Vec<MergeRequest>,
    pub saved_at: DateTime<Utc>,
}

/// Persistence backend for repository state
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Load the last saved state, None if nothing was saved yet
    async fn load(&self) -> Result<Option<RepositoryState>>;

    /// Replace the saved state
    async fn save(&self, state: &RepositoryState) -> Result<()>;
}
