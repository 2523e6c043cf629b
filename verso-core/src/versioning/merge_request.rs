//! Merge requests - proposals to merge one branch into another

use crate::error::{Result, VersoError};
use crate::events::RepositoryEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commit::Author;

/// Lifecycle state of a merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestStatus {
    Open,
    Merged,
    Closed,
}

impl std::fmt::Display for MergeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeRequestStatus::Open => write!(f, "open"),
            MergeRequestStatus::Merged => write!(f, "merged"),
            MergeRequestStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Proposal to merge `source_branch` into `target_branch`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    /// Identifier (`mr_` prefix)
    pub id: String,
    pub title: String,
    pub description: String,
    pub source_branch: String,
    pub target_branch: String,
    pub author: Author,
    pub status: MergeRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Merge commit recorded when the request was completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit_id: Option<String>,
}

/// Merge requests in creation order
#[derive(Debug, Clone, Default)]
pub struct MergeRequestTracker {
    requests: Vec<MergeRequest>,
}

impl MergeRequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_requests(requests: Vec<MergeRequest>) -> Self {
        Self { requests }
    }

    /// Record a new open request
    pub fn create(
        &mut self,
        title: &str,
        description: &str,
        source_branch: &str,
        target_branch: &str,
        author: Author,
    ) -> MergeRequest {
        let now = Utc::now();
        let request = MergeRequest {
            id: format!("mr_{}", Uuid::new_v4().simple()),
            title: title.to_string(),
            description: description.to_string(),
            source_branch: source_branch.to_string(),
            target_branch: target_branch.to_string(),
            author,
            status: MergeRequestStatus::Open,
            created_at: now,
            updated_at: now,
            merge_commit_id: None,
        };
        self.requests.push(request.clone());
        request
    }

    pub fn get(&self, id: &str) -> Option<&MergeRequest> {
        self.requests.iter().find(|r| r.id == id)
    }

    /// Requests, optionally filtered by status
    pub fn list(&self, status: Option<MergeRequestStatus>) -> Vec<MergeRequest> {
        self.requests
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .cloned()
            .collect()
    }

    /// Open request by id
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `State` if the request is no longer open
    pub fn open_request(&self, id: &str) -> Result<&MergeRequest> {
        let request = self
            .get(id)
            .ok_or_else(|| VersoError::NotFound(format!("Merge request {} does not exist", id)))?;
        if request.status != MergeRequestStatus::Open {
            return Err(VersoError::State(format!(
                "Merge request {} is {}",
                id, request.status
            )));
        }
        Ok(request)
    }

    /// Move an open request to a final status
    pub fn resolve(
        &mut self,
        id: &str,
        status: MergeRequestStatus,
        merge_commit_id: Option<String>,
    ) -> Result<MergeRequest> {
        self.open_request(id)?;
        let request = self
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| VersoError::NotFound(format!("Merge request {} does not exist", id)))?;
        request.status = status;
        request.merge_commit_id = merge_commit_id;
        request.updated_at = Utc::now();
        Ok(request.clone())
    }

    pub fn requests(&self) -> &[MergeRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Extension methods for Repository to handle merge requests
impl super::repository::Repository {
    /// Open a merge request
    ///
    /// Branches are not validated here; they are resolved when the request
    /// is completed.
    pub fn create_merge_request(
        &mut self,
        title: &str,
        description: &str,
        source_branch: &str,
        target_branch: &str,
        author: Author,
    ) -> MergeRequest {
        let request = self
            .merge_requests
            .create(title, description, source_branch, target_branch, author);

        tracing::info!(
            merge_request = %request.id,
            source = %source_branch,
            target = %target_branch,
            "Merge request created"
        );
        self.events.emit(RepositoryEvent::MergeRequestCreated {
            merge_request: request.clone(),
        });
        request
    }

    pub fn get_merge_request(&self, id: &str) -> Option<&MergeRequest> {
        self.merge_requests.get(id)
    }

    /// Merge requests in creation order, optionally filtered by status
    pub fn list_merge_requests(&self, status: Option<MergeRequestStatus>) -> Vec<MergeRequest> {
        self.merge_requests.list(status)
    }

    /// Close an open merge request without merging
    pub fn close_merge_request(&mut self, id: &str) -> Result<MergeRequest> {
        let request = self
            .merge_requests
            .resolve(id, MergeRequestStatus::Closed, None)?;

        tracing::info!(merge_request = %id, "Merge request closed");
        self.events.emit(RepositoryEvent::MergeRequestUpdated {
            merge_request: request.clone(),
        });
        Ok(request)
    }

    /// Merge the request's source into its target and mark it merged
    ///
    /// The merge and the status change are saved together; if either fails
    /// neither is kept and the request stays open.
    ///
    /// # Errors
    /// Any merge error, or `Storage` if saving fails
    pub async fn complete_merge_request(&mut self, id: &str) -> Result<MergeRequest> {
        let (source, target) = {
            let request = self.merge_requests.open_request(id)?;
            (request.source_branch.clone(), request.target_branch.clone())
        };

        let checkpoint = self.checkpoint();
        let outcome = self.apply_merge(&source, &target).and_then(|(head, event)| {
            let request = self
                .merge_requests
                .resolve(id, MergeRequestStatus::Merged, Some(head))?;
            Ok((event, request))
        });
        let (merged_event, request) = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                self.restore(checkpoint);
                return Err(e);
            }
        };
        self.persist_or_rollback(checkpoint).await?;

        tracing::info!(
            merge_request = %id,
            merge_commit = ?request.merge_commit_id,
            "Merge request completed"
        );
        if let Some(event) = merged_event {
            self.events.emit(event);
        }
        self.events.emit(RepositoryEvent::MergeRequestUpdated {
            merge_request: request.clone(),
        });
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> Author {
        Author::new("u1", "Ada", "ada@example.com")
    }

    #[test]
    fn test_create_request() {
        let mut tracker = MergeRequestTracker::new();
        let request = tracker.create("Add login", "", "feature/login", "main", author());

        assert!(request.id.starts_with("mr_"));
        assert_eq!(request.status, MergeRequestStatus::Open);
        assert_eq!(request.created_at, request.updated_at);
        assert!(request.merge_commit_id.is_none());
        assert_eq!(tracker.get(&request.id), Some(&request));
    }

    #[test]
    fn test_list_filters_by_status() {
        let mut tracker = MergeRequestTracker::new();
        let first = tracker.create("one", "", "a", "main", author());
        tracker.create("two", "", "b", "main", author());
        tracker.resolve(&first.id, MergeRequestStatus::Closed, None).unwrap();

        assert_eq!(tracker.list(None).len(), 2);
        let open = tracker.list(Some(MergeRequestStatus::Open));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].title, "two");
    }

    #[test]
    fn test_resolve_only_open_requests() {
        let mut tracker = MergeRequestTracker::new();
        let request = tracker.create("one", "", "a", "main", author());
        tracker.resolve(&request.id, MergeRequestStatus::Closed, None).unwrap();

        let err = tracker
            .resolve(&request.id, MergeRequestStatus::Merged, None)
            .unwrap_err();
        assert!(matches!(err, VersoError::State(_)));

        let err = tracker.resolve("mr_missing", MergeRequestStatus::Closed, None).unwrap_err();
        assert!(matches!(err, VersoError::NotFound(_)));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MergeRequestStatus::Merged).unwrap(),
            "\"merged\""
        );
    }
}
