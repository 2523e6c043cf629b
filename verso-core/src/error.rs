//! Error types for Verso operations

use crate::versioning::MergeConflict;

/// Result type for Verso operations
pub type Result<T> = std::result::Result<T, VersoError>;

/// Error types for the version-control engine
#[derive(Debug, thiserror::Error)]
pub enum VersoError {
    /// Caller violated an operation precondition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced branch (or record) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation blocked by the current repository state
    #[error("Invalid state: {0}")]
    State(String),

    /// Commit ids that do not resolve in the graph
    #[error("Reference error: {0}")]
    Reference(String),

    /// Merge could not be completed automatically
    #[error("Merge conflict in {}", .paths.join(", "))]
    Conflict {
        /// Conflicting paths, sorted
        paths: Vec<String>,

        /// Structured description of each conflict
        conflicts: Vec<MergeConflict>,
    },

    /// Persistence backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Coarse error category, for hosts that map failures to their own surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    State,
    Reference,
    Conflict,
    Storage,
    Configuration,
    Internal,
}

impl VersoError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            VersoError::Validation(_) => ErrorKind::Validation,
            VersoError::NotFound(_) => ErrorKind::NotFound,
            VersoError::State(_) => ErrorKind::State,
            VersoError::Reference(_) => ErrorKind::Reference,
            VersoError::Conflict { .. } => ErrorKind::Conflict,
            VersoError::Storage(_) | VersoError::Io(_) | VersoError::Serialization(_) => {
                ErrorKind::Storage
            }
            VersoError::Configuration(_) => ErrorKind::Configuration,
            VersoError::Other(_) => ErrorKind::Internal,
        }
    }

    /// Build a conflict error from structured conflicts
    pub(crate) fn conflict(conflicts: Vec<MergeConflict>) -> Self {
        let mut paths: Vec<String> = conflicts.iter().map(|c| c.path.clone()).collect();
        paths.sort();
        paths.dedup();
        VersoError::Conflict { paths, conflicts }
    }
}

impl From<String> for VersoError {
    fn from(s: String) -> Self {
        VersoError::Other(s)
    }
}

impl From<&str> for VersoError {
    fn from(s: &str) -> Self {
        VersoError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for VersoError {
    fn from(err: anyhow::Error) -> Self {
        VersoError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::ConflictKind;

    #[test]
    fn test_conflict_message_lists_paths() {
        let err = VersoError::conflict(vec![
            MergeConflict {
                path: "b.sol".to_string(),
                kind: ConflictKind::Content,
                regions: Vec::new(),
            },
            MergeConflict {
                path: "a.sol".to_string(),
                kind: ConflictKind::ModifyDelete,
                regions: Vec::new(),
            },
        ]);

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Merge conflict in a.sol, b.sol");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(VersoError::State("x".into()).kind(), ErrorKind::State);
        assert_eq!(VersoError::from("boom").kind(), ErrorKind::Internal);
        let io = std::io::Error::other("disk");
        assert_eq!(VersoError::from(io).kind(), ErrorKind::Storage);
    }
}
