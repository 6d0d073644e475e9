//! Commit history introspection.
//!
//! Reconstructs, for each commit in a range, the author and the full content of
//! every file the commit added or modified. Never mutates the working copy.

use std::path::Path;

use crate::error::{Error, Result};
use crate::process::{git, git_bytes};

use super::changeset::{ChangeSet, CommitFound, File};

/// Lists commits in `HEAD` (or `since_sha..HEAD`), newest first.
pub fn find_commits(local: &Path, since_sha: &str) -> Result<Vec<CommitFound>> {
    let range = if since_sha.is_empty() {
        "HEAD".to_string()
    } else {
        format!("{since_sha}..HEAD")
    };

    let log = git(local, &["log", "--pretty=format:%H %s", &range])?;

    let mut commits = Vec::new();
    for line in log.lines().filter(|l| !l.trim().is_empty()) {
        let (sha, message) = line.split_once(' ').unwrap_or((line, ""));
        commits.push(commit_details(local, sha, message)?);
    }

    Ok(commits)
}

fn commit_details(local: &Path, sha: &str, message: &str) -> Result<CommitFound> {
    let author_name = git(local, &["show", "-s", "--format=%an", sha])?;
    let author_email = git(local, &["show", "-s", "--format=%ae", sha])?;

    // NUL separated "<status>\0<path>\0" pairs, so paths are never quoted.
    let name_statuses = git(
        local,
        &["show", "--no-renames", "--pretty=format:", "--name-status", "-z", sha],
    )?;

    let mut files = Vec::new();
    for (status, path) in parse_name_status(sha, &name_statuses)? {
        match status {
            FileStatus::Added | FileStatus::Modified => {
                let content = show_file_content_at_commit(local, sha, path)?;
                files.push(file_from_bytes(path, content));
            }
            FileStatus::Deleted => continue,
        }
    }

    Ok(CommitFound {
        sha: sha.to_string(),
        message: message.to_string(),
        change_set: ChangeSet {
            files,
            message: message.to_string(),
            user_name: author_name.trim_end().to_string(),
            user_email: author_email.trim_end().to_string(),
        },
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileStatus {
    Added,
    Modified,
    Deleted,
}

fn parse_name_status<'a>(sha: &str, output: &'a str) -> Result<Vec<(FileStatus, &'a str)>> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0');
    while let Some(status) = fields.next() {
        let status = status.trim_matches('\n');
        if status.is_empty() {
            continue;
        }
        let path = fields.next().filter(|p| !p.is_empty()).ok_or_else(|| Error::Decode {
            what: format!("name-status entry of commit {sha}"),
            payload: status.to_string(),
        })?;
        let status = match status {
            "A" => FileStatus::Added,
            "M" => FileStatus::Modified,
            "D" => FileStatus::Deleted,
            other => {
                return Err(Error::UnknownFileStatus {
                    sha: sha.to_string(),
                    status: other.to_string(),
                })
            }
        };
        entries.push((status, path));
    }
    Ok(entries)
}

fn show_file_content_at_commit(local: &Path, sha: &str, path: &str) -> Result<Vec<u8>> {
    git_bytes(local, &["show", &format!("{sha}:{path}")])
}

fn file_from_bytes(path: &str, content: Vec<u8>) -> File {
    match String::from_utf8(content) {
        Ok(text) => File::string(path, text),
        Err(e) => File::bytes(path, e.into_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::run_git;
    use tempfile::TempDir;

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@test.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        std::fs::write(dir.path().join("README.md"), "# Test\n").unwrap();
        run_git(dir.path(), &["add", "-A"]);
        run_git(dir.path(), &["commit", "-m", "Initial"]);
        dir
    }

    fn head(dir: &Path) -> String {
        run_git(dir, &["rev-parse", "HEAD"]).trim().to_string()
    }

    #[test]
    fn empty_since_lists_whole_history() {
        let dir = repo();
        let commits = find_commits(dir.path(), "").unwrap();

        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].message, "Initial");
        assert_eq!(commits[0].change_set.user_name, "Test User");
        assert_eq!(commits[0].change_set.user_email, "test@test.com");
        assert_eq!(commits[0].change_set.files.len(), 1);
        assert_eq!(commits[0].change_set.files[0].content_string.as_deref(), Some("# Test\n"));
    }

    #[test]
    fn commits_are_newest_first_with_content_as_of_commit() {
        let dir = repo();
        let since = head(dir.path());

        std::fs::write(dir.path().join("a.txt"), "one").unwrap();
        run_git(dir.path(), &["add", "-A"]);
        run_git(dir.path(), &["commit", "-m", "First"]);

        std::fs::write(dir.path().join("a.txt"), "two").unwrap();
        run_git(dir.path(), &["add", "-A"]);
        run_git(dir.path(), &["commit", "-m", "Second"]);

        // Working tree content must not leak into history.
        std::fs::write(dir.path().join("a.txt"), "dirty").unwrap();

        let commits = find_commits(dir.path(), &since).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "Second");
        assert_eq!(commits[0].change_set.get("a.txt").unwrap().content(), Some(&b"two"[..]));
        assert_eq!(commits[1].message, "First");
        assert_eq!(commits[1].change_set.get("a.txt").unwrap().content(), Some(&b"one"[..]));
    }

    #[test]
    fn deleted_files_are_omitted() {
        let dir = repo();
        let since = head(dir.path());

        run_git(dir.path(), &["rm", "README.md"]);
        std::fs::write(dir.path().join("kept.txt"), "kept").unwrap();
        run_git(dir.path(), &["add", "-A"]);
        run_git(dir.path(), &["commit", "-m", "Swap"]);

        let commits = find_commits(dir.path(), &since).unwrap();
        assert_eq!(commits.len(), 1);
        let paths: Vec<_> = commits[0].change_set.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["kept.txt"]);
    }

    #[test]
    fn empty_range_yields_no_commits() {
        let dir = repo();
        let since = head(dir.path());
        assert!(find_commits(dir.path(), &since).unwrap().is_empty());
    }

    #[test]
    fn binary_content_is_kept_as_bytes() {
        let dir = repo();
        let since = head(dir.path());
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0x00, 0xfe]).unwrap();
        run_git(dir.path(), &["add", "-A"]);
        run_git(dir.path(), &["commit", "-m", "Binary"]);

        let commits = find_commits(dir.path(), &since).unwrap();
        let file = commits[0].change_set.get("blob.bin").unwrap();
        assert!(file.content_string.is_none());
        assert_eq!(file.content(), Some(&[0xff, 0x00, 0xfe][..]));
    }

    #[test]
    fn paths_git_would_quote_are_read_verbatim() {
        let dir = repo();
        let since = head(dir.path());
        for name in ["say \"hi\".txt", "back\\slash.txt", "tab\there.txt", "héllo.txt"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        run_git(dir.path(), &["add", "-A"]);
        run_git(dir.path(), &["commit", "-m", "Odd names"]);

        let commits = find_commits(dir.path(), &since).unwrap();
        let found = &commits[0].change_set;
        assert_eq!(found.files.len(), 4);
        for name in ["say \"hi\".txt", "back\\slash.txt", "tab\there.txt", "héllo.txt"] {
            assert_eq!(found.get(name).unwrap().content(), Some(name.as_bytes()));
        }
    }

    #[test]
    fn truncated_entry_is_a_decode_error() {
        let err = parse_name_status("abc", "A\0").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn unknown_status_is_an_error() {
        let err = parse_name_status("abc", "T\0link\0").unwrap_err();
        assert!(matches!(err, Error::UnknownFileStatus { ref status, .. } if status == "T"));
    }

    #[test]
    fn name_status_parses_paths_with_spaces() {
        let entries = parse_name_status("abc", "\nA\0dir/with space.txt\0D\0old.txt\0").unwrap();
        assert_eq!(
            entries,
            vec![(FileStatus::Added, "dir/with space.txt"), (FileStatus::Deleted, "old.txt")]
        );
    }
}
