//! Ephemeral working copies: clone, materialize a change set, commit and push.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::process::git;

use super::changeset::{Base, ChangeSet, ContentSource, File, Head};

/// How to reach the remote when cloning.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneOptions<'a> {
    /// Token for HTTPS clones. SSH is used when unset.
    pub token: Option<&'a str>,
    /// Replaces the GitHub URL with `<remote_root>/<owner>/<repo>.git`.
    pub remote_root: Option<&'a str>,
}

impl CloneOptions<'_> {
    /// Computes the clone URL for `base`.
    pub fn url_for(&self, base: &Base) -> String {
        if let Some(root) = self.remote_root {
            return format!("{}/{}/{}.git", root.trim_end_matches('/'), base.owner, base.repo);
        }
        match self.token {
            Some(token) if !token.is_empty() => base.clone_https_url(token),
            _ => base.clone_git_url(),
        }
    }
}

/// A local clone living in an ephemeral directory.
///
/// The directory is removed when the value is dropped unless it is retained.
#[derive(Debug)]
pub struct WorkingCopy {
    path: PathBuf,
    retain: bool,
}

impl WorkingCopy {
    /// Clones `base` into `local` and checks out a new branch `work_branch` from it.
    ///
    /// `local` must not exist yet.
    pub fn clone_into_new_branch(
        base: &Base,
        local: PathBuf,
        work_branch: &str,
        opts: &CloneOptions<'_>,
        retain: bool,
    ) -> Result<Self> {
        base.validate()?;

        let parent = local
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Precondition(format!("invalid clone directory {}", local.display())))?;
        std::fs::create_dir_all(&parent)?;

        // Guard first so a half-finished clone is removed too.
        let copy = Self { path: local, retain };

        let url = opts.url_for(base);
        let target = copy.path.to_string_lossy().into_owned();
        git(&parent, &["clone", &url, &target])?;

        if base.is_full_ref() {
            git(&copy.path, &["fetch", "origin", &base.branch])?;
            git(&copy.path, &["checkout", "-b", work_branch, "FETCH_HEAD"])?;
        } else {
            let upstream = format!("origin/{}", base.branch);
            git(&copy.path, &["checkout", "-b", work_branch, &upstream])?;
        }

        tracing::debug!(repo = %base.full_name(), path = ?copy.path, branch = %work_branch, "cloned working copy");

        Ok(copy)
    }

    /// Returns the local path of the clone.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the directory on drop.
    pub fn retain(&mut self) {
        self.retain = true;
    }

    /// Reads a file from the checked-out tree.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.path.join(path))?)
    }

    /// Writes every file of the change set and stages it.
    pub fn write_and_add_files(&self, files: &[File]) -> Result<()> {
        for file in files {
            self.write_and_add_file(file)?;
        }
        Ok(())
    }

    fn write_and_add_file(&self, file: &File) -> Result<()> {
        let target = self.path.join(&file.path);

        let content = match file.source()? {
            ContentSource::String(s) => s.as_bytes().to_vec(),
            ContentSource::Bytes(b) => b.to_vec(),
            ContentSource::LocalFile(local) => std::fs::read(local)?,
            ContentSource::Transform(f) => {
                let existing = match std::fs::read(&target) {
                    Ok(bytes) => Some(bytes),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                    Err(e) => return Err(e.into()),
                };
                f(existing.as_deref())?
            }
        };

        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&target, content)?;

        git(&self.path, &["add", "--", &file.path])?;
        Ok(())
    }

    /// Commits staged changes, renames the work branch to `head.branch`, pushes it
    /// and, when set, creates and pushes `head.tag`.
    pub fn commit_rename_branch_and_push(&self, change_set: &ChangeSet, head: &Head) -> Result<()> {
        if !change_set.user_name.is_empty() {
            git(&self.path, &["config", "user.name", &change_set.user_name])?;
        }
        if !change_set.user_email.is_empty() {
            git(&self.path, &["config", "user.email", &change_set.user_email])?;
        }

        git(&self.path, &["commit", "-m", change_set.message_or_default()])?;

        if head.branch.is_empty() {
            return Err(Error::Precondition("head branch must be set".to_string()));
        }

        // Forced so that pushing back onto the cloned branch works.
        git(&self.path, &["branch", "-M", &head.branch])?;
        git(&self.path, &["push", "origin", &head.branch])?;

        if let Some(tag) = head.tag.as_deref().filter(|t| !t.is_empty()) {
            git(&self.path, &["tag", tag])?;
            git(&self.path, &["push", "origin", tag])?;
        }

        Ok(())
    }
}

impl Drop for WorkingCopy {
    fn drop(&mut self) {
        if self.retain {
            tracing::info!(path = ?self.path, "retaining cloned repository");
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = ?self.path, error = %e, "failed to remove cloned repository");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Remotes;
    use tempfile::TempDir;

    fn clone(remotes: &Remotes, repo: &str, local: PathBuf, retain: bool) -> Result<WorkingCopy> {
        let root = remotes.root();
        let opts = CloneOptions {
            token: None,
            remote_root: Some(&root),
        };
        WorkingCopy::clone_into_new_branch(&Base::new("o", repo, "main"), local, "testkit-work-1", &opts, retain)
    }

    #[test]
    fn url_prefers_remote_root_then_token_then_ssh() {
        let base = Base::new("o", "r", "main");
        let local = CloneOptions {
            token: Some("t"),
            remote_root: Some("/srv/git/"),
        };
        assert_eq!(local.url_for(&base), "/srv/git/o/r.git");

        let https = CloneOptions {
            token: Some("t"),
            remote_root: None,
        };
        assert_eq!(https.url_for(&base), "https://x-access-token:t@github.com/o/r.git");

        assert_eq!(CloneOptions::default().url_for(&base), "git@github.com:o/r.git");
    }

    #[test]
    fn working_copy_is_removed_on_drop() {
        let remotes = Remotes::new();
        remotes.create("o", "r");
        let work = TempDir::new().unwrap();

        let local = work.path().join("o/r/1");
        let copy = clone(&remotes, "r", local.clone(), false).unwrap();
        assert_eq!(copy.read_file("README.md").unwrap(), b"# Test\n");

        drop(copy);
        assert!(!local.exists());
    }

    #[test]
    fn retained_working_copy_survives_drop() {
        let remotes = Remotes::new();
        remotes.create("o", "r");
        let work = TempDir::new().unwrap();

        let local = work.path().join("o/r/1");
        drop(clone(&remotes, "r", local.clone(), true).unwrap());
        assert!(local.join("README.md").exists());
    }

    #[test]
    fn failed_clone_leaves_no_directory() {
        let remotes = Remotes::new();
        let work = TempDir::new().unwrap();

        let local = work.path().join("o/missing/1");
        let err = clone(&remotes, "missing", local.clone(), false).unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
        assert!(!local.exists());
    }

    #[test]
    fn transform_receives_existing_content() {
        let remotes = Remotes::new();
        remotes.create("o", "r");
        let work = TempDir::new().unwrap();
        let copy = clone(&remotes, "r", work.path().join("c"), false).unwrap();

        let files = vec![
            File::transform("README.md", |old| {
                let mut out = old.expect("README exists").to_vec();
                out.extend_from_slice(b"more\n");
                Ok(out)
            }),
            File::transform("new/file.txt", |old| {
                assert!(old.is_none());
                Ok(b"fresh".to_vec())
            }),
        ];
        copy.write_and_add_files(&files).unwrap();

        assert_eq!(copy.read_file("README.md").unwrap(), b"# Test\nmore\n");
        assert_eq!(copy.read_file("new/file.txt").unwrap(), b"fresh");
    }

    #[test]
    fn push_requires_head_branch() {
        let remotes = Remotes::new();
        remotes.create("o", "r");
        let work = TempDir::new().unwrap();
        let copy = clone(&remotes, "r", work.path().join("c"), false).unwrap();

        copy.write_and_add_files(&[File::string("a.txt", "a")]).unwrap();
        let cs = ChangeSet::new("add a").author("Test", "test@test.com");
        let err = copy.commit_rename_branch_and_push(&cs, &Head::default()).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn push_creates_branch_and_tag_on_remote() {
        let remotes = Remotes::new();
        remotes.create("o", "r");
        let work = TempDir::new().unwrap();
        let copy = clone(&remotes, "r", work.path().join("c"), false).unwrap();

        copy.write_and_add_files(&[File::string("a.txt", "a")]).unwrap();
        let cs = ChangeSet::new("add a").author("Test", "test@test.com");
        copy.commit_rename_branch_and_push(&cs, &Head::branch("feature").with_tag("v0.1.0"))
            .unwrap();

        let branch = remotes.rev_parse("o", "r", "refs/heads/feature");
        let tag = remotes.rev_parse("o", "r", "refs/tags/v0.1.0");
        assert_eq!(branch, tag);
    }

    #[test]
    fn push_onto_base_branch_fast_forwards_it() {
        let remotes = Remotes::new();
        remotes.create("o", "r");
        let before = remotes.rev_parse("o", "r", "refs/heads/main");
        let work = TempDir::new().unwrap();
        let copy = clone(&remotes, "r", work.path().join("c"), false).unwrap();

        copy.write_and_add_files(&[File::string("a.txt", "a")]).unwrap();
        copy.commit_rename_branch_and_push(&ChangeSet::new("add a").author("T", "t@t"), &Head::branch("main"))
            .unwrap();

        assert_ne!(remotes.rev_parse("o", "r", "refs/heads/main"), before);
    }
}
