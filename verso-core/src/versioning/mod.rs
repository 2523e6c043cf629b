//! Versioning engine providing Git-style operations over an in-memory file set
//!
//! This module provides:
//! - Staging: Working tree edits and the index for the next commit
//! - Commits: Append-only commit graph with snapshot reconstruction
//! - Branches: Named pointers into the graph
//! - Checkout: Switch the working tree between branches
//! - Merge: Three-way merge with line-level conflict detection
//! - Merge requests: Proposed merges and their lifecycle

pub mod branch;
pub mod checkout;
pub mod commit;
pub mod merge;
pub mod merge_request;
pub mod repository;
pub mod staging;

pub use branch::{Branch, BranchManager, validate_branch_name};
pub use commit::{Author, Change, ChangeType, Commit, CommitGraph, Snapshot};
pub use merge::{ConflictKind, ConflictRegion, MergeConflict, MergePlan, merge_base, merge_snapshots, merge_text};
pub use merge_request::{MergeRequest, MergeRequestStatus, MergeRequestTracker};
pub use repository::{Repository, RepositoryInfo};
pub use staging::{RepositoryStatus, StagingArea, WorkingTree};
