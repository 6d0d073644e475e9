//! Value types describing repository coordinates and desired changes.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Commit message used when a change set does not carry one.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Automated commit via testkit";

/// A remote repository and the branch to base work on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Base {
    pub owner: String,
    pub repo: String,
    /// Branch name, or a full ref such as `refs/pull/7/head`.
    pub branch: String,
}

impl Base {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
        }
    }

    /// Parses `owner/repo` into a base on `branch`.
    pub fn parse(full_name: &str, branch: impl Into<String>) -> Result<Self> {
        match full_name.trim().split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self::new(owner, repo, branch))
            }
            _ => Err(Error::Precondition(format!(
                "repository must be in the form owner/name, got {full_name:?}"
            ))),
        }
    }

    /// Returns `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// SSH clone URL.
    pub fn clone_git_url(&self) -> String {
        format!("git@github.com:{}/{}.git", self.owner, self.repo)
    }

    /// Token-authenticated HTTPS clone URL.
    pub fn clone_https_url(&self, token: &str) -> String {
        format!(
            "https://x-access-token:{}@github.com/{}/{}.git",
            token, self.owner, self.repo
        )
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(Error::Precondition(format!(
                "base repository owner and name must be set, got {:?}",
                self.full_name()
            )));
        }
        Ok(())
    }

    /// True when `branch` names a full ref rather than a branch on `origin`.
    pub(crate) fn is_full_ref(&self) -> bool {
        self.branch.starts_with("refs/")
    }
}

/// The branch (and optional tag) a change is pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Head {
    pub branch: String,
    #[serde(default)]
    pub tag: Option<String>,
}

impl Head {
    pub fn branch(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Computes new file content from the current content (`None` when the file is absent).
pub type ContentFn = Arc<dyn Fn(Option<&[u8]>) -> Result<Vec<u8>> + Send + Sync>;

/// Desired content of one repository path.
///
/// Exactly one of the content sources must be set.
#[derive(Clone, Default)]
pub struct File {
    /// Path within the repository.
    pub path: String,
    pub content_string: Option<String>,
    pub content_bytes: Option<Vec<u8>>,
    /// Path to a local file whose bytes become the content.
    pub content_from_local_file: Option<PathBuf>,
    pub content_fn: Option<ContentFn>,
}

/// The single content source of a validated [`File`].
pub enum ContentSource<'a> {
    String(&'a str),
    Bytes(&'a [u8]),
    LocalFile(&'a Path),
    Transform(&'a ContentFn),
}

impl File {
    pub fn string(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_string: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn bytes(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content_bytes: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn from_local_file(path: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            content_from_local_file: Some(local.into()),
            ..Default::default()
        }
    }

    pub fn transform<F>(path: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<&[u8]>) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            content_fn: Some(Arc::new(f)),
            ..Default::default()
        }
    }

    /// Returns the literal content, if this file carries one.
    ///
    /// Files reconstructed from history always do.
    pub fn content(&self) -> Option<&[u8]> {
        self.content_string
            .as_deref()
            .map(str::as_bytes)
            .or(self.content_bytes.as_deref())
    }

    /// Validates the path and returns the single content source.
    pub fn source(&self) -> Result<ContentSource<'_>> {
        self.validate_path()?;

        let mut sources = Vec::with_capacity(1);
        if let Some(s) = &self.content_string {
            sources.push(ContentSource::String(s));
        }
        if let Some(b) = &self.content_bytes {
            sources.push(ContentSource::Bytes(b));
        }
        if let Some(p) = &self.content_from_local_file {
            sources.push(ContentSource::LocalFile(p));
        }
        if let Some(f) = &self.content_fn {
            sources.push(ContentSource::Transform(f));
        }

        match sources.len() {
            1 => Ok(sources.remove(0)),
            0 => Err(self.invalid("one of content_string, content_bytes, content_from_local_file and content_fn must be set")),
            n => Err(self.invalid(&format!("exactly one content source must be set, found {n}"))),
        }
    }

    fn validate_path(&self) -> Result<()> {
        let path = Path::new(&self.path);
        if self.path.is_empty() {
            return Err(self.invalid("path must be set"));
        }
        let escapes = path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(self.invalid("path must be relative to the repository root"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::InvalidFile {
            path: PathBuf::from(&self.path),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("content_string", &self.content_string)
            .field("content_bytes", &self.content_bytes.as_ref().map(Vec::len))
            .field("content_from_local_file", &self.content_from_local_file)
            .field("content_fn", &self.content_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A logical commit: files plus commit metadata.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub files: Vec<File>,
    pub message: String,
    /// `user.name` of the committer.
    pub user_name: String,
    /// `user.email` of the committer.
    pub user_email: String,
}

impl ChangeSet {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn file(mut self, file: File) -> Self {
        self.files.push(file);
        self
    }

    pub fn author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.user_name = name.into();
        self.user_email = email.into();
        self
    }

    /// The commit message, or [`DEFAULT_COMMIT_MESSAGE`] when empty.
    pub fn message_or_default(&self) -> &str {
        if self.message.is_empty() {
            DEFAULT_COMMIT_MESSAGE
        } else {
            &self.message
        }
    }

    /// Checks every file has exactly one content source.
    pub fn validate(&self) -> Result<()> {
        for file in &self.files {
            file.source()?;
        }
        Ok(())
    }

    /// Finds a file by repository path.
    pub fn get(&self, path: &str) -> Option<&File> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// A commit discovered in a working copy and the files it added or modified.
#[derive(Debug, Clone)]
pub struct CommitFound {
    pub sha: String,
    /// Commit subject.
    pub message: String,
    /// Author and post-change content of added/modified files. Deleted files are omitted.
    pub change_set: ChangeSet,
}

/// A pull request discovered on the hosting service.
#[derive(Debug, Clone)]
pub struct PullRequestFound {
    pub number: u64,
    pub base_sha: String,
    /// Never empty once back-filled.
    pub commits: Vec<CommitFound>,
}

/// A pull request to open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A pull request that was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestCreated {
    pub number: u64,
}
