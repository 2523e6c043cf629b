//! Merge operations - merge base search and three-way merge with conflict detection

use crate::diff::{line_matches, split_lines};
use crate::error::{Result, VersoError};
use crate::events::RepositoryEvent;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use super::commit::{Change, Commit, CommitGraph, Snapshot};

/// Why a path could not be merged automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Both sides edited overlapping lines
    Content,
    /// Both sides added the path with different content
    AddAdd,
    /// One side modified the path, the other deleted it
    ModifyDelete,
}

/// Overlapping edit region inside a conflicting file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRegion {
    /// 1-based line in the ancestor where the region starts
    pub base_start: usize,
    pub base: Vec<String>,
    /// Target branch lines
    pub ours: Vec<String>,
    /// Source branch lines
    pub theirs: Vec<String>,
}

/// Merge conflict detected for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub path: String,
    pub kind: ConflictKind,
    /// Line regions, only for content conflicts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<ConflictRegion>,
}

/// Outcome of planning a merge, nothing applied yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePlan {
    pub source_head: String,
    pub target_head: String,
    /// Merge base used for the three-way comparison
    pub base: Option<String>,
    /// Source head is already reachable from the target head
    pub up_to_date: bool,
    /// Changes to apply on top of the target head
    pub changes: Vec<Change>,
    pub conflicts: Vec<MergeConflict>,
}

impl MergePlan {
    /// True if merge is clean (no conflicts)
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Nearest common ancestor of two commits
///
/// Walks `b`'s ancestry breadth-first through every parent and returns the
/// first commit that is also an ancestor of `a`.
pub fn merge_base(graph: &CommitGraph, a: &str, b: &str) -> Option<String> {
    if a == b {
        return graph.contains(a).then(|| a.to_string());
    }

    let ancestors_a = graph.ancestors(a);
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b.to_string()]);
    while let Some(id) = queue.pop_front() {
        if ancestors_a.contains(&id) {
            return Some(id);
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(commit) = graph.get(&id) {
            queue.extend(commit.parent_ids.iter().cloned());
        }
    }
    None
}

/// Three-way merge of two file sets against their ancestor
///
/// Returns the changes to apply on top of `target` and the conflicts found.
pub fn merge_snapshots(base: &Snapshot, source: &Snapshot, target: &Snapshot) -> (Vec<Change>, Vec<MergeConflict>) {
    let mut paths: Vec<&String> = base.keys().chain(source.keys()).chain(target.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut changes = Vec::new();
    let mut conflicts = Vec::new();

    for path in paths {
        let (a, s, t) = (base.get(path), source.get(path), target.get(path));

        // Identical on both sides, or only the target moved
        if s == t || s == a {
            continue;
        }
        // Only the source moved
        if t == a {
            changes.extend(Change::between(path, t, s));
            continue;
        }

        match (a, s, t) {
            (Some(a), Some(s), Some(t)) => match merge_text(a, t, s) {
                Ok(merged) => changes.extend(Change::between(path, Some(t), Some(&merged))),
                Err(regions) => conflicts.push(MergeConflict {
                    path: path.clone(),
                    kind: ConflictKind::Content,
                    regions,
                }),
            },
            (None, Some(_), Some(_)) => conflicts.push(MergeConflict {
                path: path.clone(),
                kind: ConflictKind::AddAdd,
                regions: Vec::new(),
            }),
            _ => conflicts.push(MergeConflict {
                path: path.clone(),
                kind: ConflictKind::ModifyDelete,
                regions: Vec::new(),
            }),
        }
    }

    (changes, conflicts)
}

/// Line-level three-way merge of `ours` (target) and `theirs` (source)
///
/// Edits that touch disjoint line ranges of `base` merge cleanly; overlapping
/// edits are returned as conflict regions. Lines keep their own endings, so
/// untouched lines come out byte-for-byte as they went in.
pub fn merge_text(base: &str, ours: &str, theirs: &str) -> std::result::Result<String, Vec<ConflictRegion>> {
    let b = split_lines(base);
    let o = split_lines(ours);
    let t = split_lines(theirs);

    let mut to_ours = vec![None; b.len()];
    for (bi, oi) in line_matches(&b, &o) {
        to_ours[bi] = Some(oi);
    }
    let mut to_theirs = vec![None; b.len()];
    for (bi, ti) in line_matches(&b, &t) {
        to_theirs[bi] = Some(ti);
    }

    let mut merged: Vec<&str> = Vec::new();
    let mut regions = Vec::new();
    let (mut i, mut j, mut k) = (0, 0, 0);

    loop {
        // Stable run: base line kept by both sides at the expected positions
        let mut n = 0;
        while i + n < b.len() && to_ours[i + n] == Some(j + n) && to_theirs[i + n] == Some(k + n) {
            n += 1;
        }
        if n > 0 {
            merged.extend_from_slice(&b[i..i + n]);
            i += n;
            j += n;
            k += n;
            continue;
        }
        if i == b.len() && j == o.len() && k == t.len() {
            break;
        }

        // Unstable chunk up to the next base line both sides kept
        let (bi, oi, ti) = (i..b.len())
            .find_map(|x| match (to_ours[x], to_theirs[x]) {
                (Some(oi), Some(ti)) => Some((x, oi, ti)),
                _ => None,
            })
            .unwrap_or((b.len(), o.len(), t.len()));

        let (base_chunk, ours_chunk, theirs_chunk) = (&b[i..bi], &o[j..oi], &t[k..ti]);
        if ours_chunk == base_chunk {
            merged.extend_from_slice(theirs_chunk);
        } else if theirs_chunk == base_chunk || ours_chunk == theirs_chunk {
            merged.extend_from_slice(ours_chunk);
        } else {
            regions.push(ConflictRegion {
                base_start: i + 1,
                base: region_lines(base_chunk),
                ours: region_lines(ours_chunk),
                theirs: region_lines(theirs_chunk),
            });
        }
        i = bi;
        j = oi;
        k = ti;
    }

    if !regions.is_empty() {
        return Err(regions);
    }

    Ok(merged.concat())
}

fn region_lines(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .map(|line| line.strip_suffix('\n').unwrap_or(*line).to_string())
        .collect()
}

/// Extension methods for Repository to handle merges
impl super::repository::Repository {
    /// Plan a merge of `source_branch` into `target_branch` without applying it
    ///
    /// # Errors
    /// `NotFound` if either branch is missing, `State` if either has no commits
    pub fn preview_merge(&self, source_branch: &str, target_branch: &str) -> Result<MergePlan> {
        let (Some(source), Some(target)) = (
            self.branches.get(source_branch),
            self.branches.get(target_branch),
        ) else {
            return Err(VersoError::NotFound(
                "Source or target branch does not exist".to_string(),
            ));
        };

        let (Some(source_head), Some(target_head)) =
            (source.head_commit_id.clone(), target.head_commit_id.clone())
        else {
            return Err(VersoError::State(
                "Cannot merge branches without commits".to_string(),
            ));
        };

        if self.graph.is_ancestor(&source_head, &target_head) {
            return Ok(MergePlan {
                base: Some(source_head.clone()),
                source_head,
                target_head,
                up_to_date: true,
                changes: Vec::new(),
                conflicts: Vec::new(),
            });
        }

        let base = merge_base(&self.graph, &source_head, &target_head).or_else(|| self.root_commit.clone());
        let base_snapshot = match &base {
            Some(id) => self.graph.snapshot(id)?,
            None => Snapshot::new(),
        };
        let source_snapshot = self.graph.snapshot(&source_head)?;
        let target_snapshot = self.graph.snapshot(&target_head)?;

        let (changes, conflicts) = merge_snapshots(&base_snapshot, &source_snapshot, &target_snapshot);

        Ok(MergePlan {
            source_head,
            target_head,
            base,
            up_to_date: false,
            changes,
            conflicts,
        })
    }

    /// Merge source branch into target branch
    ///
    /// # Arguments
    /// * `source_branch` - Branch to merge from
    /// * `target_branch` - Branch to merge into
    ///
    /// # Returns
    /// Id of the merge commit, or the unchanged target head when the source
    /// is already contained in the target
    ///
    /// # Errors
    /// `NotFound` for a missing branch, `Conflict` when the branches edited
    /// the same content differently. No branch moves on error.
    pub async fn merge(&mut self, source_branch: &str, target_branch: &str) -> Result<String> {
        let checkpoint = self.checkpoint();
        let (head, event) = match self.apply_merge(source_branch, target_branch) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.restore(checkpoint);
                return Err(e);
            }
        };

        if let Some(event) = event {
            self.persist_or_rollback(checkpoint).await?;
            tracing::info!(
                source = %source_branch,
                target = %target_branch,
                merge_commit = %head,
                "Branches merged"
            );
            self.events.emit(event);
        }
        Ok(head)
    }

    /// Record a merge in memory without persisting it
    ///
    /// Returns the resulting target head and, when a merge commit was
    /// created, the event to emit once the state is saved. Callers restore
    /// their checkpoint on error.
    pub(crate) fn apply_merge(
        &mut self,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(String, Option<RepositoryEvent>)> {
        let plan = self.preview_merge(source_branch, target_branch)?;

        if self.config.repository.enforce_protection
            && self.branches.get(target_branch).is_some_and(|b| b.is_protected)
        {
            return Err(VersoError::State(format!(
                "Branch {} is protected",
                target_branch
            )));
        }

        if plan.up_to_date {
            tracing::info!(source = %source_branch, target = %target_branch, "Already up to date");
            return Ok((plan.target_head, None));
        }

        if !plan.is_clean() {
            tracing::warn!(
                source = %source_branch,
                target = %target_branch,
                conflicts = plan.conflicts.len(),
                "Merge aborted on conflicts"
            );
            return Err(VersoError::conflict(plan.conflicts));
        }

        let commit = Commit::new(
            vec![plan.target_head.clone(), plan.source_head.clone()],
            &format!("Merge branch '{}' into {}", source_branch, target_branch),
            self.config.repository.system_author.clone(),
            plan.changes,
        );
        self.graph.insert(commit.clone())?;
        self.branches.set_head(target_branch, &commit.id)?;

        if target_branch == self.current_branch {
            for change in &commit.changes {
                match &change.content {
                    Some(content) => {
                        self.working_tree.write(change.path.clone(), content.clone());
                    }
                    None => {
                        self.working_tree.remove(&change.path);
                    }
                }
            }
        }

        tracing::debug!(merge_commit = %commit.id, base = ?plan.base, "Merge commit recorded");
        let event = RepositoryEvent::BranchesMerged {
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            merge_commit_id: commit.id.clone(),
        };
        Ok((commit.id, Some(event)))
    }

    /// Nearest common ancestor of two commits
    pub fn merge_base(&self, a: &str, b: &str) -> Option<String> {
        merge_base(&self.graph, a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::{Author, ChangeType};

    fn snap(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    fn author() -> Author {
        Author::new("u1", "Ada", "ada@example.com")
    }

    #[test]
    fn test_merge_text_disjoint_edits() {
        let base = "a\nb\nc\nd\ne\n";
        let ours = "A\nb\nc\nd\ne\n";
        let theirs = "a\nb\nc\nd\nE\n";

        assert_eq!(merge_text(base, ours, theirs).unwrap(), "A\nb\nc\nd\nE\n");
    }

    #[test]
    fn test_merge_text_insertions_on_both_sides() {
        let base = "one\ntwo\nthree";
        let ours = "zero\none\ntwo\nthree";
        let theirs = "one\ntwo\nthree\nfour";

        assert_eq!(merge_text(base, ours, theirs).unwrap(), "zero\none\ntwo\nthree\nfour");
    }

    #[test]
    fn test_merge_text_overlapping_edits_conflict() {
        let regions = merge_text("a\nb\nc", "a\nX\nc", "a\nY\nc").unwrap_err();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].base_start, 2);
        assert_eq!(regions[0].base, vec!["b"]);
        assert_eq!(regions[0].ours, vec!["X"]);
        assert_eq!(regions[0].theirs, vec!["Y"]);
    }

    #[test]
    fn test_merge_text_keeps_crlf_endings() {
        let merged = merge_text("a\r\nb\r\nc\r\n", "A\r\nb\r\nc\r\n", "a\r\nb\r\nC\r\n").unwrap();
        assert_eq!(merged, "A\r\nb\r\nC\r\n");
    }

    #[test]
    fn test_merge_text_keeps_missing_final_newline() {
        let merged = merge_text("a\nb\nc", "A\nb\nc", "a\nb\nc").unwrap();
        assert_eq!(merged, "A\nb\nc");
    }

    #[test]
    fn test_merge_text_identical_edits() {
        assert_eq!(merge_text("a\nb", "a\nc", "a\nc").unwrap(), "a\nc");
    }

    #[test]
    fn test_merge_snapshots_one_sided_changes() {
        let base = snap(&[("a.sol", "1"), ("b.sol", "1"), ("c.sol", "1")]);
        let source = snap(&[("a.sol", "2"), ("b.sol", "1"), ("new.sol", "n")]);
        let target = snap(&[("a.sol", "1"), ("b.sol", "3"), ("c.sol", "1")]);

        let (changes, conflicts) = merge_snapshots(&base, &source, &target);
        assert!(conflicts.is_empty());

        let summary: Vec<(&str, ChangeType)> = changes
            .iter()
            .map(|c| (c.path.as_str(), c.change_type))
            .collect();
        // b.sol only changed on the target, so it is left alone
        assert_eq!(
            summary,
            vec![
                ("a.sol", ChangeType::Modified),
                ("c.sol", ChangeType::Deleted),
                ("new.sol", ChangeType::Added),
            ]
        );
    }

    #[test]
    fn test_merge_snapshots_conflict_kinds() {
        let base = snap(&[("edit.sol", "a\nb\nc"), ("gone.sol", "x")]);
        let source = snap(&[("edit.sol", "a\nS\nc"), ("gone.sol", "changed"), ("both.sol", "s")]);
        let target = snap(&[("edit.sol", "a\nT\nc"), ("both.sol", "t")]);

        let (_, conflicts) = merge_snapshots(&base, &source, &target);
        let kinds: Vec<(&str, ConflictKind)> = conflicts
            .iter()
            .map(|c| (c.path.as_str(), c.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("both.sol", ConflictKind::AddAdd),
                ("edit.sol", ConflictKind::Content),
                ("gone.sol", ConflictKind::ModifyDelete),
            ]
        );
    }

    #[test]
    fn test_merge_base_of_diverged_branches() {
        let mut graph = CommitGraph::new();
        let root = Commit::new(vec![], "root", author(), vec![]);
        let fork = Commit::new(vec![root.id.clone()], "fork", author(), vec![]);
        let left = Commit::new(vec![fork.id.clone()], "left", author(), vec![]);
        let right = Commit::new(vec![fork.id.clone()], "right", author(), vec![]);
        for c in [&root, &fork, &left, &right] {
            graph.insert(c.clone()).unwrap();
        }

        assert_eq!(merge_base(&graph, &left.id, &right.id), Some(fork.id.clone()));
        assert_eq!(merge_base(&graph, &left.id, &fork.id), Some(fork.id.clone()));
        assert_eq!(merge_base(&graph, &left.id, &left.id), Some(left.id.clone()));
    }

    #[test]
    fn test_merge_base_after_previous_merge() {
        let mut graph = CommitGraph::new();
        let root = Commit::new(vec![], "root", author(), vec![]);
        let feature = Commit::new(vec![root.id.clone()], "feature", author(), vec![]);
        let main = Commit::new(vec![root.id.clone()], "main", author(), vec![]);
        let merged = Commit::new(vec![main.id.clone(), feature.id.clone()], "merge", author(), vec![]);
        let feature2 = Commit::new(vec![feature.id.clone()], "feature 2", author(), vec![]);
        for c in [&root, &feature, &main, &merged, &feature2] {
            graph.insert(c.clone()).unwrap();
        }

        // The earlier merge makes `feature` the nearest shared commit
        assert_eq!(merge_base(&graph, &feature2.id, &merged.id), Some(feature.id.clone()));
    }
}
