//! Writable GitHub repositories registered through the environment.
//!
//! A repository is only handed out when its `testkit-config` branch carries a
//! `.testkit.writable` file reading `true`, so that tests never push to a
//! repository that did not opt in. Repositories are never created.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::git::Base;
use crate::github::RepoService;
use crate::harness::{
    has_testkit_env, GitHubWritableRepository, GitHubWritableRepositoryOptions, GitHubWritableRepositoryProvider,
    Provider,
};

use super::env::TESTKIT_GITHUB_TOKEN_ENV;

pub const GITHUB_WRITEABLE_REPOS_ENV: &str = "TESTKIT_GITHUB_WRITEABLE_REPOS";

/// Branch holding the opt-in marker.
pub const CONFIG_BRANCH: &str = "testkit-config";

/// Opt-in marker file at the root of [`CONFIG_BRANCH`].
pub const WRITABLE_MARKER: &str = ".testkit.writable";

/// Picks the first opted-in repository out of `TESTKIT_GITHUB_WRITEABLE_REPOS`.
#[derive(Debug, Default)]
pub struct GitHubWritableRepositoriesEnvProvider {
    /// Replaces the process environment when set.
    vars: Option<BTreeMap<String, String>>,
    github: GitHubConfig,
}

impl GitHubWritableRepositoriesEnvProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `vars` instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
            github: GitHubConfig::default(),
        }
    }

    /// Settings of the façade used to check and write repositories.
    pub fn with_github_config(mut self, github: GitHubConfig) -> Self {
        self.github = github;
        self
    }

    fn required(&self, key: &str) -> Result<String> {
        let value = match &self.vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Precondition(format!("{key} environment variable is not set")))
    }
}

impl Provider for GitHubWritableRepositoriesEnvProvider {
    fn name(&self) -> &str {
        "github-writable-repositories-env"
    }

    fn setup(&mut self) -> Result<()> {
        let found = match &self.vars {
            Some(vars) => vars.keys().any(|k| k.starts_with("TESTKIT_")),
            None => has_testkit_env(),
        };
        if !found {
            return Err(Error::Precondition("no TESTKIT_* environment variables found".to_string()));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_github_writable_repository_provider(
        &mut self,
    ) -> Option<&mut dyn GitHubWritableRepositoryProvider> {
        Some(self)
    }
}

impl GitHubWritableRepositoryProvider for GitHubWritableRepositoriesEnvProvider {
    fn github_writable_repository(
        &mut self,
        opts: &GitHubWritableRepositoryOptions,
    ) -> Result<GitHubWritableRepository> {
        let candidates = self.required(GITHUB_WRITEABLE_REPOS_ENV)?;
        let token = self.required(TESTKIT_GITHUB_TOKEN_ENV)?;
        let repos = Arc::new(self.github.repositories(Some(&token)));

        for candidate in candidates.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let base = Base::parse(candidate, CONFIG_BRANCH)?;
            let content = match repos.get_file_content(&base, WRITABLE_MARKER) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(repo = %candidate, error = %e, "failed to read {WRITABLE_MARKER}");
                    continue;
                }
            };

            let marker = String::from_utf8_lossy(&content);
            let marker = marker.trim();
            if marker != "true" {
                return Err(Error::Precondition(format!(
                    "repository {candidate} has {WRITABLE_MARKER}, but its content is {marker:?} instead of \"true\""
                )));
            }

            tracing::info!(repo = %candidate, "using writable repository");
            return Ok(GitHubWritableRepository {
                id: opts.id.clone(),
                name: base.full_name(),
                token,
                service: RepoService::new(repos, &base.owner, &base.repo),
            });
        }

        Err(Error::NotFound("no writable repository found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Remotes;
    use tempfile::TempDir;

    fn provider(remotes: &Remotes, temp: &TempDir, repos: &str) -> GitHubWritableRepositoriesEnvProvider {
        GitHubWritableRepositoriesEnvProvider::from_vars([
            (GITHUB_WRITEABLE_REPOS_ENV, repos),
            (TESTKIT_GITHUB_TOKEN_ENV, "token"),
        ])
        .with_github_config(GitHubConfig {
            temp_root: Some(temp.path().to_path_buf()),
            remote_root: Some(remotes.root()),
            ..Default::default()
        })
    }

    fn opt_in(remotes: &Remotes, owner: &str, repo: &str, content: &str) {
        remotes.create(owner, repo);
        remotes.push_commit(owner, repo, &format!("refs/heads/{CONFIG_BRANCH}"), WRITABLE_MARKER, content);
    }

    #[test]
    fn skips_repositories_without_marker() {
        let remotes = Remotes::new();
        let temp = TempDir::new().unwrap();
        remotes.create("o", "plain");
        opt_in(&remotes, "o", "sandbox", "true\n");

        let mut provider = provider(&remotes, &temp, "o/plain,o/sandbox");
        provider.setup().unwrap();
        let repo = provider
            .github_writable_repository(&GitHubWritableRepositoryOptions { id: "w".to_string() })
            .unwrap();

        assert_eq!(repo.id, "w");
        assert_eq!(repo.name, "o/sandbox");
        assert_eq!(repo.full_name(), "o/sandbox");
    }

    #[test]
    fn marker_with_other_content_is_an_error() {
        let remotes = Remotes::new();
        let temp = TempDir::new().unwrap();
        opt_in(&remotes, "o", "prod", "false");
        opt_in(&remotes, "o", "sandbox", "true");

        let mut provider = provider(&remotes, &temp, "o/prod,o/sandbox");
        let err = provider.github_writable_repository(&Default::default()).unwrap_err();
        assert!(err.to_string().contains("\"false\""));
    }

    #[test]
    fn no_opted_in_repository_is_not_found() {
        let remotes = Remotes::new();
        let temp = TempDir::new().unwrap();
        remotes.create("o", "plain");

        let mut provider = provider(&remotes, &temp, "o/plain");
        let err = provider.github_writable_repository(&Default::default()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn missing_token_is_a_precondition_error() {
        let mut provider = GitHubWritableRepositoriesEnvProvider::from_vars([(GITHUB_WRITEABLE_REPOS_ENV, "o/r")]);
        let err = provider.github_writable_repository(&Default::default()).unwrap_err();
        assert!(err.to_string().contains(TESTKIT_GITHUB_TOKEN_ENV));
    }

    #[test]
    fn returned_repository_accepts_writes() {
        let remotes = Remotes::new();
        let temp = TempDir::new().unwrap();
        opt_in(&remotes, "o", "sandbox", "true");
        let before = remotes.rev_parse("o", "sandbox", "refs/heads/main");

        let mut provider = provider(&remotes, &temp, "o/sandbox");
        let repo = provider.github_writable_repository(&Default::default()).unwrap();
        repo.write_file("app.yaml", "replicas: 2\n", "scale app").unwrap();

        let commits = repo.find_commits("main", &before).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "scale app");
    }
}
