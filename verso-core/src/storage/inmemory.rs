//! In-memory store for tests and ephemeral repositories

use std::sync::RwLock;

use async_trait::async_trait;

use super::{RepositoryState, RepositoryStore};
use crate::error::{Result, VersoError};

/// Keeps the last saved state in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<Option<RepositoryState>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits in the saved state
    pub fn saved_commits(&self) -> usize {
        self.state
            .read()
            .map(|s| s.as_ref().map_or(0, |state| state.commits.len()))
            .unwrap_or(0)
    }
}

#[async_trait]
impl RepositoryStore for InMemoryStore {
    async fn load(&self) -> Result<Option<RepositoryState>> {
        let state = self
            .state
            .read()
            .map_err(|_| VersoError::Storage("In-memory store lock poisoned".to_string()))?;
        Ok(state.clone())
    }

    async fn save(&self, state: &RepositoryState) -> Result<()> {
        let mut slot = self
            .state
            .write()
            .map_err(|_| VersoError::Storage("In-memory store lock poisoned".to_string()))?;
        *slot = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::Repository;

    #[tokio::test]
    async fn test_empty_store_loads_nothing() {
        let store = InMemoryStore::new();
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.saved_commits(), 0);
    }

    #[tokio::test]
    async fn test_save_replaces_state() {
        let store = InMemoryStore::new();
        let mut repo = Repository::default();
        repo.initialize(None).await.unwrap();

        store.save(&repo.state()).await.unwrap();
        let loaded = store.load().await.unwrap().expect("saved state");
        assert_eq!(loaded.commits.len(), 1);
        assert_eq!(loaded.current_branch, "main");
        assert_eq!(store.saved_commits(), 1);
    }
}
