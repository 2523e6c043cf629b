//! JSON file store
//!
//! State is written to a sibling temporary file and renamed over the target,
//! so a crash mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{RepositoryState, RepositoryStore, STATE_FORMAT_VERSION};
use crate::error::{Result, VersoError};

/// Persists repository state as a pretty-printed JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RepositoryStore for JsonFileStore {
    async fn load(&self) -> Result<Option<RepositoryState>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: RepositoryState = serde_json::from_slice(&bytes)?;
        if state.format_version != STATE_FORMAT_VERSION {
            return Err(VersoError::Storage(format!(
                "Unsupported state format version {} in {}",
                state.format_version,
                self.path.display()
            )));
        }

        tracing::debug!(path = %self.path.display(), commits = state.commits.len(), "Loaded repository state");
        Ok(Some(state))
    }

    async fn save(&self, state: &RepositoryState) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), "Saved repository state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::versioning::{Author, Repository};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(".verso").join("state.json");
        let store = JsonFileStore::new(&path);

        let mut repo = Repository::default();
        repo.initialize(Some([("a.txt".to_string(), "1".to_string())].into()))
            .await
            .unwrap();
        store.save(&repo.state()).await.unwrap();

        assert!(path.exists());
        assert!(!store.temp_path().exists());

        let loaded = store.load().await.unwrap().expect("saved state");
        let expected = repo.state();
        assert_eq!(loaded.id, expected.id);
        assert_eq!(loaded.commits, expected.commits);
        assert_eq!(loaded.working_tree, expected.working_tree);
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = std::sync::Arc::new(JsonFileStore::new(&path));

        let mut repo = Repository::with_store(Default::default(), store.clone());
        repo.initialize(None).await.unwrap();
        repo.write_file("a.txt", "hello");
        repo.add(["a.txt"]).unwrap();
        let commit_id = repo
            .commit("add a", Author::new("u1", "Ada", "ada@example.com"))
            .await
            .unwrap();

        let reopened = Repository::open(Default::default(), store).await.unwrap();
        assert_eq!(reopened.head(), Some(commit_id.as_str()));
        assert_eq!(reopened.read_file("a.txt"), Some("hello"));
        assert_eq!(reopened.get_commit_history(None, None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_unknown_format_version() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));

        let mut repo = Repository::default();
        repo.initialize(None).await.unwrap();
        let mut state = repo.state();
        state.format_version = 99;
        store.save(&state).await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, VersoError::Storage(msg) if msg.contains("99")));
    }
}
