//! Convenience operations bound to a single repository.

use std::sync::Arc;

use crate::error::Result;
use crate::git::{Base, ChangeSet, CommitFound, File, Head};

use super::repositories::GitHubRepositories;

/// Branch [`RepoService::write_file`] commits to.
pub const DEFAULT_BRANCH: &str = "main";

/// Author of commits made by [`RepoService::write_file`].
pub const SERVICE_AUTHOR: &str = "testkit";
pub const SERVICE_AUTHOR_EMAIL: &str = "testkit@users.noreply.github.com";

/// Reads and writes one `owner/repo` through a shared [`GitHubRepositories`].
#[derive(Debug, Clone)]
pub struct RepoService {
    repos: Arc<GitHubRepositories>,
    owner: String,
    repo: String,
}

impl RepoService {
    pub fn new(repos: Arc<GitHubRepositories>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            repos,
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Returns `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn find_commits(&self, branch: &str, since_sha: &str) -> Result<Vec<CommitFound>> {
        self.repos
            .find_commits(&Base::new(&self.owner, &self.repo, branch), since_sha)
    }

    /// Commits `content` to `path` directly on the default branch.
    pub fn write_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        let change_set = ChangeSet {
            files: vec![File::string(path, content)],
            message: message.to_string(),
            user_name: SERVICE_AUTHOR.to_string(),
            user_email: SERVICE_AUTHOR_EMAIL.to_string(),
        };
        self.repos.push(
            &Base::new(&self.owner, &self.repo, DEFAULT_BRANCH),
            &Head::branch(DEFAULT_BRANCH),
            &change_set,
        )
    }
}
