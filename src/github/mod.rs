//! GitHub-facing operations: REST client, repository façade and per-repo service.

pub mod api;
pub mod repositories;
pub mod service;

pub use api::{
    Connector, GitHubClient, GitHubConnector, HostingApi, NewPullRequest, Page, PullRequestSummary,
    DEFAULT_API_BASE_URL,
};
pub use repositories::{GitHubRepositories, GITHUB_TOKEN_ENV};
pub use service::RepoService;
