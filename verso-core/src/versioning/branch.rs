//! Branch management - named pointers to commits

use crate::error::{Result, VersoError};
use crate::events::RepositoryEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named, mutable pointer to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Branch name
    pub name: String,

    /// Commit this branch points to, None before the first commit
    pub head_commit_id: Option<String>,

    /// Whether this is the repository's default branch
    pub is_default: bool,

    /// Whether merges into this branch are restricted
    pub is_protected: bool,

    /// When branch was created
    pub created_at: DateTime<Utc>,
}

/// Branch table keyed by name
#[derive(Debug, Clone, Default)]
pub struct BranchManager {
    branches: BTreeMap<String, Branch>,
}

/// Reject names that cannot be used as branch names
pub fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name.chars().any(|c| c.is_whitespace() || c.is_control())
        || name.contains("..")
        || name.starts_with('/')
        || name.ends_with('/')
        || name.contains("//");
    if invalid {
        return Err(VersoError::Validation(format!(
            "Invalid branch name '{}'",
            name
        )));
    }
    Ok(())
}

impl BranchManager {
    /// Create a manager holding only the default branch
    pub fn with_default(name: &str) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(
            name.to_string(),
            Branch {
                name: name.to_string(),
                head_commit_id: None,
                is_default: true,
                is_protected: false,
                created_at: Utc::now(),
            },
        );
        Self { branches }
    }

    /// Restore a manager from persisted branches
    pub fn from_branches(branches: Vec<Branch>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for branch in branches {
            if table.insert(branch.name.clone(), branch).is_some() {
                return Err(VersoError::Storage("Duplicate branch in stored state".to_string()));
            }
        }
        if table.values().filter(|b| b.is_default).count() != 1 {
            return Err(VersoError::Storage(
                "Stored state must have exactly one default branch".to_string(),
            ));
        }
        Ok(Self { branches: table })
    }

    /// Create a branch pointing at `head`
    ///
    /// # Errors
    /// Returns error if the name is invalid or already taken
    pub fn create(&mut self, name: &str, head: Option<String>) -> Result<Branch> {
        validate_branch_name(name)?;
        if self.branches.contains_key(name) {
            return Err(VersoError::Validation(format!(
                "Branch {} already exists",
                name
            )));
        }

        let branch = Branch {
            name: name.to_string(),
            head_commit_id: head,
            is_default: false,
            is_protected: false,
            created_at: Utc::now(),
        };
        self.branches.insert(name.to_string(), branch.clone());
        Ok(branch)
    }

    pub fn get(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.branches.contains_key(name)
    }

    /// Head commit of a branch
    pub fn head(&self, name: &str) -> Result<Option<String>> {
        self.branches
            .get(name)
            .map(|b| b.head_commit_id.clone())
            .ok_or_else(|| VersoError::NotFound(format!("Branch {} does not exist", name)))
    }

    /// Move a branch to a new commit
    pub fn set_head(&mut self, name: &str, commit_id: &str) -> Result<()> {
        let branch = self
            .branches
            .get_mut(name)
            .ok_or_else(|| VersoError::NotFound(format!("Branch {} does not exist", name)))?;
        branch.head_commit_id = Some(commit_id.to_string());
        Ok(())
    }

    pub fn set_protected(&mut self, name: &str, protected: bool) -> Result<()> {
        let branch = self
            .branches
            .get_mut(name)
            .ok_or_else(|| VersoError::NotFound(format!("Branch {} does not exist", name)))?;
        branch.is_protected = protected;
        Ok(())
    }

    /// All branches ordered by name
    pub fn list(&self) -> Vec<Branch> {
        self.branches.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

/// Extension methods for Repository to handle branches
impl super::repository::Repository {
    /// Create a new branch at the current branch's head
    ///
    /// # Errors
    /// `Validation` if the name is invalid or already exists
    pub fn create_branch(&mut self, name: &str) -> Result<Branch> {
        let head = self.branches.head(&self.current_branch)?;
        let branch = self.branches.create(name, head)?;

        tracing::info!(branch = %name, head = ?branch.head_commit_id, "Branch created");
        self.events.emit(RepositoryEvent::BranchCreated {
            branch: branch.clone(),
        });
        Ok(branch)
    }

    /// List all branches
    pub fn list_branches(&self) -> Vec<Branch> {
        self.branches.list()
    }

    /// Get branch by name
    pub fn get_branch(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }

    /// Mark or unmark a branch as protected
    pub fn set_branch_protection(&mut self, name: &str, protected: bool) -> Result<()> {
        self.branches.set_protected(name, protected)?;
        tracing::info!(branch = %name, protected, "Branch protection changed");
        Ok(())
    }
}
