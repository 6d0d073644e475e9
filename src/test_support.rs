//! Local bare repositories standing in for GitHub in unit tests.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Runs git and panics with stderr on failure.
pub(crate) fn run_git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

/// A directory of `<owner>/<repo>.git` bare repositories.
pub(crate) struct Remotes {
    dir: TempDir,
}

impl Remotes {
    pub(crate) fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub(crate) fn root(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    /// Creates a bare repository with one commit (`README.md`) on `main`.
    pub(crate) fn create(&self, owner: &str, repo: &str) -> PathBuf {
        let seed = TempDir::new().expect("failed to create seed dir");
        run_git(seed.path(), &["init", "-b", "main"]);
        run_git(seed.path(), &["config", "user.email", "test@test.com"]);
        run_git(seed.path(), &["config", "user.name", "Test"]);
        std::fs::write(seed.path().join("README.md"), "# Test\n").expect("failed to write README");
        run_git(seed.path(), &["add", "-A"]);
        run_git(seed.path(), &["commit", "-m", "Initial"]);

        let bare = self.dir.path().join(owner).join(format!("{repo}.git"));
        std::fs::create_dir_all(bare.parent().expect("bare path has parent")).expect("failed to create owner dir");
        run_git(
            self.dir.path(),
            &["clone", "--bare", &seed.path().to_string_lossy(), &bare.to_string_lossy()],
        );
        bare
    }

    /// Commits `path` on top of `main` and pushes it to `target` (any refspec destination).
    ///
    /// Returns the new commit sha.
    pub(crate) fn push_commit(&self, owner: &str, repo: &str, target: &str, path: &str, content: &str) -> String {
        let bare = self.dir.path().join(owner).join(format!("{repo}.git"));
        let work = TempDir::new().expect("failed to create work dir");
        run_git(
            work.path(),
            &["clone", &bare.to_string_lossy(), &work.path().join("c").to_string_lossy()],
        );
        let clone = work.path().join("c");
        run_git(&clone, &["config", "user.email", "author@test.com"]);
        run_git(&clone, &["config", "user.name", "Author"]);
        let file = clone.join(path);
        std::fs::create_dir_all(file.parent().expect("file has parent")).expect("failed to create dirs");
        std::fs::write(&file, content).expect("failed to write file");
        run_git(&clone, &["add", "-A"]);
        run_git(&clone, &["commit", "-m", &format!("Update {path}")]);
        run_git(&clone, &["push", "origin", &format!("HEAD:{target}")]);
        run_git(&clone, &["rev-parse", "HEAD"]).trim().to_string()
    }

    /// Returns the sha `branch` points at in the bare repository.
    pub(crate) fn rev_parse(&self, owner: &str, repo: &str, rev: &str) -> String {
        let bare = self.dir.path().join(owner).join(format!("{repo}.git"));
        run_git(&bare, &["rev-parse", rev]).trim().to_string()
    }
}

/// Writes an executable shell script named `name` into `dir` that stands in for a CLI.
///
/// Each invocation appends its arguments to `<dir>/<name>.log`. When
/// `<dir>/<name>.<first-arg>.out` exists it is printed to stdout.
#[cfg(unix)]
pub(crate) fn fake_cli(dir: &Path, name: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let bin = dir.join(name);
    let script = format!(
        "#!/bin/sh\necho \"$*\" >> '{dir}/{name}.log'\nif [ -f '{dir}/{name}.'\"$1\"'.out' ]; then cat '{dir}/{name}.'\"$1\"'.out'; fi\nexit 0\n",
        dir = dir.display(),
    );
    std::fs::write(&bin, script).expect("failed to write fake cli");
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).expect("failed to chmod fake cli");
    bin
}

/// Lines logged by a [`fake_cli`] script so far.
#[cfg(unix)]
pub(crate) fn fake_cli_calls(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(format!("{name}.log")))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
