//! GitOps change orchestration: change-set model, working copies and history.

pub mod changeset;
pub mod history;
pub mod workdir;

pub use changeset::{
    Base, ChangeSet, CommitFound, ContentFn, ContentSource, File, Head, PullRequest,
    PullRequestCreated, PullRequestFound, DEFAULT_COMMIT_MESSAGE,
};
pub use history::find_commits;
pub use workdir::{CloneOptions, WorkingCopy};
