//! Working tree and staging area (index)

use crate::error::Result;
use crate::events::RepositoryEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::commit::{ChangeType, Snapshot};

/// Current logical file set, including uncommitted edits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingTree {
    files: Snapshot,
}

impl WorkingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(files: Snapshot) -> Self {
        Self { files }
    }

    pub fn get(&self, path: &str) -> Option<&String> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Write a file, returns the previous content
    pub fn write(&mut self, path: impl Into<String>, content: impl Into<String>) -> Option<String> {
        self.files.insert(path.into(), content.into())
    }

    /// Remove a file, returns its content
    pub fn remove(&mut self, path: &str) -> Option<String> {
        self.files.remove(path)
    }

    /// Replace the whole file set
    pub fn replace(&mut self, files: Snapshot) {
        self.files = files;
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.files.keys()
    }

    pub fn files(&self) -> &Snapshot {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Staging area for the next commit
///
/// `Some(content)` stages an addition or modification, `None` a deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingArea {
    entries: BTreeMap<String, Option<String>>,
}

impl StagingArea {
    /// Create a new empty staging area
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage content for a path
    pub fn stage(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(path.into(), Some(content.into()));
    }

    /// Stage the deletion of a path
    pub fn stage_deletion(&mut self, path: impl Into<String>) {
        self.entries.insert(path.into(), None);
    }

    /// Drop a staged entry, returns true if one existed
    pub fn unstage(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&Option<String>> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Check if staging area is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clear staging area
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Staged entries ordered by path
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Option<String>)> {
        self.entries.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

/// Staged and unstaged differences of the current branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatus {
    pub branch: String,
    pub head: Option<String>,
    /// Staging area compared with the branch head
    pub staged: Vec<(String, ChangeType)>,
    /// Working tree compared with the staged (or committed) content
    pub unstaged: Vec<(String, ChangeType)>,
}

impl RepositoryStatus {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty()
    }
}

fn classify(before: Option<&String>, after: Option<&String>) -> Option<ChangeType> {
    match (before, after) {
        (None, Some(_)) => Some(ChangeType::Added),
        (Some(a), Some(b)) if a != b => Some(ChangeType::Modified),
        (Some(_), None) => Some(ChangeType::Deleted),
        _ => None,
    }
}

/// Extension methods for Repository to handle the working tree and staging
impl super::repository::Repository {
    /// Write a file into the working tree
    pub fn write_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        tracing::debug!(path = %path, "Working tree file written");
        self.working_tree.write(path, content);
    }

    /// Read a file from the working tree
    pub fn read_file(&self, path: &str) -> Option<&str> {
        self.working_tree.get(path).map(String::as_str)
    }

    /// Remove a file from the working tree without staging anything
    pub fn delete_file(&mut self, path: &str) -> Option<String> {
        self.working_tree.remove(path)
    }

    pub fn working_tree(&self) -> &WorkingTree {
        &self.working_tree
    }

    pub fn staging_area(&self) -> &StagingArea {
        &self.staging
    }

    /// Stage the current working-tree content of each path
    ///
    /// Paths missing from the working tree are skipped, unless they are
    /// tracked at the branch head, in which case their deletion is staged.
    /// Returns the paths actually staged.
    pub fn add<I, S>(&mut self, paths: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let head = self.head_snapshot()?;
        let mut staged = Vec::new();

        for path in paths {
            let path = path.as_ref();
            if let Some(content) = self.working_tree.get(path) {
                self.staging.stage(path, content.clone());
            } else if head.contains_key(path) {
                self.staging.stage_deletion(path);
            } else {
                tracing::debug!(path = %path, "Skipping path not present in working tree");
                continue;
            }
            staged.push(path.to_string());
        }

        if !staged.is_empty() {
            tracing::debug!(count = staged.len(), "Files staged");
            self.events.emit(RepositoryEvent::FilesStaged {
                paths: staged.clone(),
            });
        }
        Ok(staged)
    }

    /// Remove files from the working tree and stage their deletion
    pub fn remove<I, S>(&mut self, paths: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let head = self.head_snapshot()?;
        let mut staged = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let in_tree = self.working_tree.remove(path).is_some();
            if head.contains_key(path) {
                self.staging.stage_deletion(path);
            } else if in_tree {
                // Never committed: dropping it from the index is enough
                self.staging.unstage(path);
            } else {
                continue;
            }
            staged.push(path.to_string());
        }

        if !staged.is_empty() {
            self.events.emit(RepositoryEvent::FilesStaged {
                paths: staged.clone(),
            });
        }
        Ok(staged)
    }

    /// Drop paths from the staging area, returns the paths that were staged
    pub fn unstage<I, S>(&mut self, paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed: Vec<String> = paths
            .into_iter()
            .filter(|p| self.staging.unstage(p.as_ref()))
            .map(|p| p.as_ref().to_string())
            .collect();

        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "Files unstaged");
            self.events.emit(RepositoryEvent::FilesUnstaged {
                paths: removed.clone(),
            });
        }
        removed
    }

    /// Compare staging with the head and the working tree with staging
    pub fn status(&self) -> Result<RepositoryStatus> {
        let head = self.head_snapshot()?;

        let staged = self
            .staging
            .entries()
            .filter_map(|(path, entry)| {
                classify(head.get(path), entry.as_ref()).map(|kind| (path.clone(), kind))
            })
            .collect();

        let mut paths: Vec<&String> = head.keys().chain(self.working_tree.paths()).chain(self.staging.paths()).collect();
        paths.sort();
        paths.dedup();

        let unstaged = paths
            .into_iter()
            .filter_map(|path| {
                let indexed = match self.staging.get(path) {
                    Some(entry) => entry.as_ref(),
                    None => head.get(path),
                };
                classify(indexed, self.working_tree.get(path)).map(|kind| (path.clone(), kind))
            })
            .collect();

        Ok(RepositoryStatus {
            branch: self.current_branch.clone(),
            head: self.branches.head(&self.current_branch)?,
            staged,
            unstaged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_area_empty() {
        let index = StagingArea::new();
        assert!(index.is_empty());
    }

    #[test]
    fn test_stage_and_unstage() {
        let mut index = StagingArea::new();
        index.stage("a.sol", "contract A {}");
        index.stage_deletion("b.sol");
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("b.sol"), Some(&None));

        assert!(index.unstage("a.sol"));
        assert!(!index.unstage("a.sol"));
        assert_eq!(index.paths().collect::<Vec<_>>(), vec!["b.sol"]);
    }

    #[test]
    fn test_restaging_overwrites_deletion() {
        let mut index = StagingArea::new();
        index.stage_deletion("a.sol");
        index.stage("a.sol", "back");
        assert_eq!(index.get("a.sol"), Some(&Some("back".to_string())));
    }

    #[test]
    fn test_working_tree_replace() {
        let mut tree = WorkingTree::new();
        tree.write("old.sol", "x");
        let mut files = Snapshot::new();
        files.insert("new.sol".to_string(), "y".to_string());
        tree.replace(files);

        assert!(!tree.contains("old.sol"));
        assert_eq!(tree.get("new.sol").map(String::as_str), Some("y"));
    }
}
