//! Remote repository façade.
//!
//! Every write goes through an ephemeral clone; every API call obtains its own
//! client from the configured [`Connector`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::git::{
    history, Base, ChangeSet, CloneOptions, CommitFound, Head, PullRequest, PullRequestCreated,
    PullRequestFound, WorkingCopy,
};

use super::api::{Connector, GitHubConnector, HostingApi, NewPullRequest, Page};

/// Environment variable consulted when no token is configured.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Prefix of the throwaway branch every clone checks out.
pub const WORK_BRANCH_PREFIX: &str = "testkit-work-";

/// Clones, modifies and inspects GitHub repositories on behalf of tests.
pub struct GitHubRepositories {
    token: Option<String>,
    temp_root: PathBuf,
    retain_cloned_repository: bool,
    remote_root: Option<String>,
    connector: Arc<dyn Connector>,
    cloned_repo_index: AtomicU64,
    work_branch_index: AtomicU64,
}

impl Default for GitHubRepositories {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GitHubRepositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubRepositories")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("temp_root", &self.temp_root)
            .field("retain_cloned_repository", &self.retain_cloned_repository)
            .field("remote_root", &self.remote_root)
            .finish()
    }
}

impl GitHubRepositories {
    pub fn new() -> Self {
        Self {
            token: None,
            temp_root: std::env::temp_dir().join("testkit").join("ghreposvc"),
            retain_cloned_repository: false,
            remote_root: None,
            connector: Arc::new(GitHubConnector::default()),
            cloned_repo_index: AtomicU64::new(0),
            work_branch_index: AtomicU64::new(0),
        }
    }

    /// Sets the API token. Without one, `GITHUB_TOKEN` is read per call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the directory clones are created under.
    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = dir.into();
        self
    }

    /// Keeps cloned repositories on disk for inspection.
    pub fn retain_cloned_repository(mut self, retain: bool) -> Self {
        self.retain_cloned_repository = retain;
        self
    }

    /// Clones from `<root>/<owner>/<repo>.git` instead of GitHub.
    pub fn with_remote_root(mut self, root: impl Into<String>) -> Self {
        self.remote_root = Some(root.into());
        self
    }

    /// Talks to a different API root, e.g. GitHub Enterprise.
    pub fn with_api_base_url(self, url: impl Into<String>) -> Self {
        self.with_connector(GitHubConnector {
            api_base_url: url.into(),
        })
    }

    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    fn token(&self) -> Result<String> {
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        match std::env::var(GITHUB_TOKEN_ENV) {
            Ok(token) if !token.is_empty() => Ok(token),
            _ => Err(Error::Precondition(format!(
                "no GitHub token configured and {GITHUB_TOKEN_ENV} is not set"
            ))),
        }
    }

    fn client(&self) -> Result<Box<dyn HostingApi>> {
        let token = self.token()?;
        self.connector.connect(&token)
    }

    fn new_local_repo_dir(&self, base: &Base) -> PathBuf {
        let parent = self.temp_root.join(&base.owner).join(&base.repo);
        loop {
            let index = self.cloned_repo_index.fetch_add(1, Ordering::SeqCst);
            let dir = parent.join(index.to_string());
            if !dir.exists() {
                return dir;
            }
        }
    }

    fn new_work_branch_name(&self) -> String {
        let index = self.work_branch_index.fetch_add(1, Ordering::SeqCst);
        format!("{WORK_BRANCH_PREFIX}{index}")
    }

    fn clone_working_copy(&self, base: &Base) -> Result<WorkingCopy> {
        let token = self.token().ok();
        let opts = CloneOptions {
            token: token.as_deref(),
            remote_root: self.remote_root.as_deref(),
        };
        WorkingCopy::clone_into_new_branch(
            base,
            self.new_local_repo_dir(base),
            &self.new_work_branch_name(),
            &opts,
            self.retain_cloned_repository,
        )
    }

    /// Clones `base`, commits `change_set` and pushes it to `head`.
    pub fn push(&self, base: &Base, head: &Head, change_set: &ChangeSet) -> Result<()> {
        change_set.validate()?;

        let copy = self.clone_working_copy(base)?;
        copy.write_and_add_files(&change_set.files)?;
        copy.commit_rename_branch_and_push(change_set, head)?;

        tracing::info!(repo = %base.full_name(), branch = %head.branch, "pushed change set");
        Ok(())
    }

    /// Pushes `change_set` to `head` and opens a pull request against `base`.
    pub fn send(
        &self,
        base: &Base,
        head: &Head,
        change_set: &ChangeSet,
        pr: &PullRequest,
    ) -> Result<PullRequestCreated> {
        let client = self.client()?;

        self.push(base, head, change_set)?;

        let created = client.create_pull_request(
            base,
            &NewPullRequest {
                title: pr.title.clone(),
                body: pr.body.clone(),
                head: head.branch.clone(),
                base: base.branch.clone(),
            },
        )?;

        if !pr.labels.is_empty() {
            client.add_labels(base, created.number, &pr.labels)?;
        }

        tracing::info!(repo = %base.full_name(), number = created.number, "opened pull request");
        Ok(created)
    }

    pub fn comment(&self, base: &Base, number: u64, body: &str) -> Result<()> {
        self.client()?.create_comment(base, number, body)
    }

    /// Merges a pull request with the `merge` method.
    pub fn merge(&self, base: &Base, number: u64) -> Result<()> {
        self.client()?.merge_pull_request(base, number)
    }

    /// Creates a release for an existing tag.
    pub fn release(&self, base: &Base, tag_name: &str) -> Result<()> {
        self.client()?.create_release(base, tag_name)
    }

    /// Sends a `repository_dispatch` event with `client_payload` serialized to JSON.
    pub fn dispatch(&self, base: &Base, event_type: &str, client_payload: &impl Serialize) -> Result<()> {
        let payload = serde_json::to_value(client_payload)?;
        self.client()?.dispatch(base, event_type, &payload)
    }

    /// Lists commits of `base.branch` newer than `since_sha` (all when empty), newest first.
    pub fn find_commits(&self, base: &Base, since_sha: &str) -> Result<Vec<CommitFound>> {
        let copy = self.clone_working_copy(base)?;
        history::find_commits(copy.path(), since_sha)
    }

    /// Returns tags that are `>= since`, or only the greatest tag when `since` is empty.
    ///
    /// Fails when any tag in the repository is not a semantic version.
    pub fn find_semver_tags(&self, base: &Base, since: &str) -> Result<Vec<String>> {
        let since = if since.is_empty() { None } else { Some(parse_version(since)?) };
        let client = self.client()?;

        let mut greatest: Option<(semver::Version, String)> = None;
        let mut tags = Vec::new();

        for name in paginate(|page| client.list_tags(base, page))? {
            let version = parse_version(&name)?;
            match &since {
                Some(since) => {
                    if version.cmp_precedence(since).is_ge() {
                        tags.push(name);
                    }
                }
                None => {
                    if greatest.as_ref().map_or(true, |(v, _)| version.cmp_precedence(v).is_gt()) {
                        greatest = Some((version, name));
                    }
                }
            }
        }

        if since.is_none() {
            tags.extend(greatest.map(|(_, name)| name));
        }
        Ok(tags)
    }

    /// Returns pull requests numbered `>= since`, or only the latest one when `since` is 0.
    ///
    /// Each result carries the commits between its base sha and its head.
    pub fn find_pull_requests(&self, base: &Base, since: u64) -> Result<Vec<PullRequestFound>> {
        let client = self.client()?;

        let mut prs: Vec<PullRequestFound> = Vec::new();
        for summary in paginate(|page| client.list_pull_requests(base, page))? {
            let found = PullRequestFound {
                number: summary.number,
                base_sha: summary.base_sha,
                commits: Vec::new(),
            };
            if since == 0 {
                match prs.first_mut() {
                    Some(latest) if latest.number >= found.number => {}
                    Some(latest) => *latest = found,
                    None => prs.push(found),
                }
            } else if found.number >= since {
                prs.push(found);
            }
        }

        for pr in &mut prs {
            let head_ref = Base::new(&base.owner, &base.repo, format!("refs/pull/{}/head", pr.number));
            let commits = self.find_commits(&head_ref, &pr.base_sha)?;
            if commits.is_empty() {
                return Err(Error::NotFound(format!(
                    "no commits found in pull request #{} of {}",
                    pr.number,
                    base.full_name()
                )));
            }
            pr.commits = commits;
        }

        Ok(prs)
    }

    /// Reads `path` as of `base.branch`.
    pub fn get_file_content(&self, base: &Base, path: &str) -> Result<Vec<u8>> {
        let copy = self.clone_working_copy(base)?;
        copy.read_file(path)
    }
}

/// Collects every item of a paginated listing, starting at page 1.
fn paginate<T>(mut fetch: impl FnMut(u32) -> Result<Page<T>>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let Page { items: batch, next_page } = fetch(page)?;
        items.extend(batch);
        match next_page {
            Some(next) if next > page => page = next,
            _ => return Ok(items),
        }
    }
}

/// Parses a tag as a semantic version, allowing a leading `v` and missing minor/patch.
pub(crate) fn parse_version(tag: &str) -> Result<semver::Version> {
    let raw = tag.strip_prefix('v').unwrap_or(tag);
    semver::Version::parse(raw).or_else(|source| {
        let numeric = raw.split('.').all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
        match raw.split('.').count() {
            1 if numeric => semver::Version::parse(&format!("{raw}.0.0")),
            2 if numeric => semver::Version::parse(&format!("{raw}.0")),
            _ => Err(source),
        }
        .map_err(|source| Error::Semver {
            tag: tag.to_string(),
            source,
        })
    })
}
