//! # Verso - Embedded Version Control
//!
//! Verso is an in-process version-control engine for applications that keep
//! a small set of text files (contracts, configs, documents) and want Git-style
//! history without shelling out to Git:
//! - Working tree and staging area
//! - Append-only commit graph with branches
//! - Myers line diffs rendered as unified hunks
//! - Three-way merge with line-level conflict detection
//! - Merge requests
//! - Lifecycle events for observers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use verso_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut repo = Repository::default();
//!     repo.initialize(Some([("Token.sol".to_string(), "contract Token {}".to_string())].into()))
//!         .await?;
//!
//!     repo.create_branch("feature/mint")?;
//!     repo.checkout("feature/mint").await?;
//!     repo.write_file("Token.sol", "contract Token {\n  function mint() {}\n}");
//!     repo.add(["Token.sol"])?;
//!     repo.commit("Add mint", Author::new("u1", "Ada", "ada@example.com")).await?;
//!
//!     repo.checkout("main").await?;
//!     let merge_commit = repo.merge("feature/mint", "main").await?;
//!     println!("merged as {}", merge_commit);
//!     Ok(())
//! }
//! ```
//!
//! ## Persistence
//!
//! State lives in memory and is saved through a [`storage::RepositoryStore`]
//! after every async mutating operation. [`storage::JsonFileStore`] keeps it in
//! a JSON document; [`Repository::open`](versioning::Repository::open)
//! restores it.

pub mod config;
pub mod diff;
pub mod error;
pub mod events;
pub mod storage;
pub mod versioning;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ConfigBuilder, StorageMode, VersoConfig};
    pub use crate::diff::{FileDiff, Hunk, Line, LineKind};
    pub use crate::error::{ErrorKind, Result, VersoError};
    pub use crate::events::{EventKind, RepositoryEvent, SubscriptionHandle};
    pub use crate::storage::{InMemoryStore, JsonFileStore, RepositoryStore};
    pub use crate::versioning::{
        Author, Branch, Change, ChangeType, Commit, MergeConflict, MergePlan, MergeRequest,
        MergeRequestStatus, Repository, RepositoryStatus,
    };
}
