//! Line-based diff engine
//!
//! Computes a shortest edit script between two texts with the Myers O(ND)
//! algorithm and groups it into unified-diff style hunks. The output is fully
//! deterministic: identical inputs always yield identical hunks.

use serde::{Deserialize, Serialize};

use crate::versioning::{ChangeType, Snapshot};

/// One step of an edit script, indices are 0-based line numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Line present in both texts
    Equal { old: usize, new: usize },
    /// Line only present in the old text
    Delete { old: usize },
    /// Line only present in the new text
    Insert { new: usize },
}

/// Kind of a rendered diff line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Context,
    Added,
    Removed,
}

/// A rendered diff line
///
/// `text` drops the trailing `\n` only, so a `\r` from CRLF endings stays
/// visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub kind: LineKind,
    pub text: String,

    /// Last line of a text that does not end with a newline
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_newline: bool,
}

impl Line {
    fn new(kind: LineKind, segment: &str) -> Self {
        let (text, no_newline) = match segment.strip_suffix('\n') {
            Some(text) => (text, false),
            None => (segment, true),
        };
        Self {
            kind,
            text: text.to_string(),
            no_newline,
        }
    }
}

/// Contiguous block of changes with surrounding context
///
/// Starts are 1-based. When a side has no lines, its start is the line after
/// which the change applies (0 for the top of the file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub lines: Vec<Line>,
}

impl Hunk {
    /// Unified-diff header, e.g. `@@ -1,3 +1,4 @@`
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_lines, self.new_start, self.new_lines
        )
    }
}

/// Differences for a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub path: String,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Count of (added, removed) lines across all hunks
    pub fn stats(&self) -> (usize, usize) {
        self.hunks
            .iter()
            .flat_map(|h| h.lines.iter())
            .fold((0, 0), |(added, removed), line| match line.kind {
                LineKind::Added => (added + 1, removed),
                LineKind::Removed => (added, removed + 1),
                LineKind::Context => (added, removed),
            })
    }
}

/// Split text into lines, each keeping its line ending
///
/// Two texts that differ only in line endings (CRLF against LF, or a missing
/// final newline) produce different line lists.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Shortest edit script turning `old` into `new`
pub fn diff_lines<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Edit> {
    let n = old.len() as isize;
    let m = new.len() as isize;
    let max = n + m;
    if max == 0 {
        return Vec::new();
    }

    let offset = max + 1;
    // -1 marks a diagonal with no in-grid path yet
    let mut v = vec![-1isize; (2 * max + 3) as usize];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'search: for d in 0..=max {
        trace.push(v.clone());
        for k in (-d..=d).step_by(2) {
            let start = if d == 0 {
                0
            } else {
                match furthest_move(&v, k, d, n, m, offset) {
                    Some((x, _)) => x,
                    None => {
                        v[(k + offset) as usize] = -1;
                        continue;
                    }
                }
            };
            let mut x = start;
            let mut y = x - k;
            while x < n && y < m && old[x as usize] == new[y as usize] {
                x += 1;
                y += 1;
            }
            v[(k + offset) as usize] = x;
            if x == n && y == m {
                break 'search;
            }
        }
    }

    let mut edits = Vec::with_capacity((n + m) as usize);
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let (start, prev_k) = if d == 0 {
            (0, k)
        } else {
            match furthest_move(v, k, d, n, m, offset) {
                Some(found) => found,
                None => break,
            }
        };

        while x > start {
            x -= 1;
            y -= 1;
            edits.push(Edit::Equal {
                old: x as usize,
                new: y as usize,
            });
        }
        if d == 0 {
            break;
        }
        if prev_k == k + 1 {
            edits.push(Edit::Insert {
                new: (y - 1) as usize,
            });
            y -= 1;
        } else {
            edits.push(Edit::Delete {
                old: (x - 1) as usize,
            });
            x -= 1;
        }
    }

    edits.reverse();
    edits
}

/// Best in-grid move onto diagonal `k` at edit distance `d`
///
/// Returns the x reached before following the snake and the diagonal the
/// move came from. `v` holds the furthest x per diagonal after `d - 1` edits.
fn furthest_move(v: &[isize], k: isize, d: isize, n: isize, m: isize, offset: isize) -> Option<(isize, isize)> {
    let at = |k: isize| v[(k + offset) as usize];
    let down = (k < d)
        .then(|| at(k + 1))
        .filter(|&x| x >= 0 && x - k <= m);
    let right = (k > -d)
        .then(|| at(k - 1))
        .filter(|&x| x >= 0 && x < n)
        .map(|x| x + 1);

    match (down, right) {
        (Some(dx), Some(rx)) if rx > dx => Some((rx, k - 1)),
        (Some(dx), _) => Some((dx, k + 1)),
        (None, Some(rx)) => Some((rx, k - 1)),
        (None, None) => None,
    }
}

/// Pairs of (old, new) line indices the edit script keeps unchanged
pub(crate) fn line_matches<T: PartialEq>(old: &[T], new: &[T]) -> Vec<(usize, usize)> {
    diff_lines(old, new)
        .into_iter()
        .filter_map(|edit| match edit {
            Edit::Equal { old, new } => Some((old, new)),
            _ => None,
        })
        .collect()
}

/// Diff two texts into hunks with `context` unchanged lines on each side
pub fn diff_text(old: &str, new: &str, context: usize) -> Vec<Hunk> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let edits = diff_lines(&old_lines, &new_lines);
    build_hunks(&edits, &old_lines, &new_lines, context)
}

fn build_hunks(edits: &[Edit], old: &[&str], new: &[&str], context: usize) -> Vec<Hunk> {
    // Line positions before each edit
    let mut positions = Vec::with_capacity(edits.len());
    let (mut old_pos, mut new_pos) = (0usize, 0usize);
    for edit in edits {
        positions.push((old_pos, new_pos));
        match edit {
            Edit::Equal { .. } => {
                old_pos += 1;
                new_pos += 1;
            }
            Edit::Delete { .. } => old_pos += 1,
            Edit::Insert { .. } => new_pos += 1,
        }
    }

    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Edit::Equal { .. }))
        .map(|(i, _)| i)
        .collect();

    let mut hunks = Vec::new();
    let mut i = 0;
    while i < changes.len() {
        let first = changes[i];
        let mut last = first;
        // Join changes whose context windows touch
        while i + 1 < changes.len() && changes[i + 1] - last <= 2 * context + 1 {
            i += 1;
            last = changes[i];
        }
        i += 1;

        let start = first.saturating_sub(context);
        let end = (last + context + 1).min(edits.len());
        hunks.push(render_hunk(&edits[start..end], positions[start], old, new));
    }

    hunks
}

fn render_hunk(edits: &[Edit], (old_pos, new_pos): (usize, usize), old: &[&str], new: &[&str]) -> Hunk {
    let mut lines = Vec::with_capacity(edits.len());
    let (mut old_count, mut new_count) = (0, 0);

    for edit in edits {
        match *edit {
            Edit::Equal { old: o, .. } => {
                old_count += 1;
                new_count += 1;
                lines.push(Line::new(LineKind::Context, old[o]));
            }
            Edit::Delete { old: o } => {
                old_count += 1;
                lines.push(Line::new(LineKind::Removed, old[o]));
            }
            Edit::Insert { new: n } => {
                new_count += 1;
                lines.push(Line::new(LineKind::Added, new[n]));
            }
        }
    }

    Hunk {
        old_start: if old_count == 0 { old_pos } else { old_pos + 1 },
        old_lines: old_count,
        new_start: if new_count == 0 { new_pos } else { new_pos + 1 },
        new_lines: new_count,
        lines,
    }
}

/// Diff two materialized snapshots
///
/// With `path` set only that path is compared, otherwise every path present
/// in either snapshot. Identical paths are omitted; results are ordered by path.
pub fn diff_snapshots(from: &Snapshot, to: &Snapshot, path: Option<&str>, context: usize) -> Vec<FileDiff> {
    let paths: Vec<&String> = match path {
        Some(p) => from
            .get_key_value(p)
            .or_else(|| to.get_key_value(p))
            .map(|(k, _)| vec![k])
            .unwrap_or_default(),
        None => {
            let mut all: Vec<&String> = from.keys().chain(to.keys()).collect();
            all.sort();
            all.dedup();
            all
        }
    };

    paths
        .into_iter()
        .filter_map(|path| {
            let (change_type, old, new) = match (from.get(path), to.get(path)) {
                (None, Some(new)) => (ChangeType::Added, "", new.as_str()),
                (Some(old), None) => (ChangeType::Deleted, old.as_str(), ""),
                (Some(old), Some(new)) if old != new => (ChangeType::Modified, old.as_str(), new.as_str()),
                _ => return None,
            };
            Some(FileDiff {
                change_type,
                path: path.clone(),
                hunks: diff_text(old, new, context),
            })
        })
        .collect()
}
