//! Checkout operations - switching the current branch

use crate::error::{Result, VersoError};
use crate::events::RepositoryEvent;

use super::commit::Snapshot;

/// Extension methods for Repository to handle checkout
impl super::repository::Repository {
    /// Switch to a branch, replacing the working tree with its head snapshot
    ///
    /// # Arguments
    /// * `branch_name` - Name of the branch to check out
    ///
    /// # Errors
    /// `NotFound` if the branch does not exist, `State` if anything is staged
    pub async fn checkout(&mut self, branch_name: &str) -> Result<()> {
        let head = self
            .branches
            .get(branch_name)
            .map(|b| b.head_commit_id.clone())
            .ok_or_else(|| VersoError::NotFound(format!("Branch {} does not exist", branch_name)))?;

        if !self.staging.is_empty() {
            return Err(VersoError::State(
                "Cannot checkout with uncommitted changes".to_string(),
            ));
        }

        let files = match &head {
            Some(id) => self.graph.snapshot(id)?,
            None => Snapshot::new(),
        };

        let checkpoint = self.checkpoint();
        self.working_tree.replace(files);
        self.current_branch = branch_name.to_string();
        self.persist_or_rollback(checkpoint).await?;

        tracing::info!(branch = %branch_name, commit = ?head, "Checked out branch");
        self.events.emit(RepositoryEvent::BranchSwitched {
            branch_name: branch_name.to_string(),
            commit_id: head,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::versioning::{Author, Repository};

    fn author() -> Author {
        Author::new("u1", "Ada", "ada@example.com")
    }

    #[tokio::test]
    async fn test_checkout_restores_branch_files() {
        let mut repo = Repository::default();
        repo.initialize(Some([("a.txt".to_string(), "base".to_string())].into()))
            .await
            .unwrap();
        repo.create_branch("feature").unwrap();

        repo.checkout("feature").await.unwrap();
        repo.write_file("b.txt", "feature only");
        repo.add(["b.txt"]).unwrap();
        repo.commit("add b", author()).await.unwrap();

        repo.checkout("main").await.unwrap();
        assert_eq!(repo.current_branch(), "main");
        assert!(repo.read_file("b.txt").is_none());
        assert_eq!(repo.read_file("a.txt"), Some("base"));

        repo.checkout("feature").await.unwrap();
        assert_eq!(repo.read_file("b.txt"), Some("feature only"));
    }

    #[tokio::test]
    async fn test_checkout_discards_unstaged_edits() {
        let mut repo = Repository::default();
        repo.initialize(Some([("a.txt".to_string(), "base".to_string())].into()))
            .await
            .unwrap();
        repo.write_file("a.txt", "scratch");

        repo.checkout("main").await.unwrap();
        assert_eq!(repo.read_file("a.txt"), Some("base"));
    }

    #[tokio::test]
    async fn test_checkout_rejects_staged_changes() {
        let mut repo = Repository::default();
        repo.initialize(None).await.unwrap();
        repo.create_branch("feature").unwrap();
        repo.write_file("a.txt", "x");
        repo.add(["a.txt"]).unwrap();

        let err = repo.checkout("feature").await.unwrap_err();
        assert!(err.to_string().contains("Cannot checkout with uncommitted changes"));
        assert_eq!(repo.current_branch(), "main");
    }

    #[tokio::test]
    async fn test_checkout_unknown_branch() {
        let mut repo = Repository::default();
        repo.initialize(None).await.unwrap();

        let err = repo.checkout("ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: Branch ghost does not exist");
    }
}
