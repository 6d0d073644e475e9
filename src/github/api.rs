//! GitHub REST API client.
//!
//! [`HostingApi`] is the seam the repository façade talks to; [`GitHubClient`]
//! implements it over blocking HTTP.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::git::{Base, PullRequestCreated};

/// Default API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Page size used for every list call.
pub const PER_PAGE: u32 = 100;

/// One page of a paginated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Page number to request next, if the server advertised one.
    pub next_page: Option<u32>,
}

/// The fields of a listed pull request the façade needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSummary {
    pub number: u64,
    pub base_sha: String,
}

/// Body of a create-pull-request call.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch the changes live on.
    pub head: String,
    /// Branch the changes should be merged into.
    pub base: String,
}

/// Remote operations against a repository hosting service.
pub trait HostingApi {
    fn create_pull_request(&self, repo: &Base, pr: &NewPullRequest) -> Result<PullRequestCreated>;

    fn add_labels(&self, repo: &Base, number: u64, labels: &[String]) -> Result<()>;

    fn create_comment(&self, repo: &Base, number: u64, body: &str) -> Result<()>;

    /// Merges with the `merge` method.
    fn merge_pull_request(&self, repo: &Base, number: u64) -> Result<()>;

    fn create_release(&self, repo: &Base, tag_name: &str) -> Result<()>;

    /// Fires a `repository_dispatch` event.
    fn dispatch(&self, repo: &Base, event_type: &str, client_payload: &serde_json::Value) -> Result<()>;

    /// Lists tag names, `page` starting at 1.
    fn list_tags(&self, repo: &Base, page: u32) -> Result<Page<String>>;

    /// Lists pull requests in every state, `page` starting at 1.
    fn list_pull_requests(&self, repo: &Base, page: u32) -> Result<Page<PullRequestSummary>>;
}

/// Creates an authenticated [`HostingApi`] for one operation.
pub trait Connector: Send + Sync {
    fn connect(&self, token: &str) -> Result<Box<dyn HostingApi>>;
}

/// Connects to GitHub (or a GitHub Enterprise API root).
#[derive(Debug, Clone)]
pub struct GitHubConnector {
    pub api_base_url: String,
}

impl Default for GitHubConnector {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl Connector for GitHubConnector {
    fn connect(&self, token: &str) -> Result<Box<dyn HostingApi>> {
        Ok(Box::new(GitHubClient::new(&self.api_base_url, token)))
    }
}

/// Blocking GitHub REST client.
pub struct GitHubClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct TagItem {
    name: String,
}

#[derive(Deserialize)]
struct PullItem {
    number: u64,
    base: PullBase,
}

#[derive(Deserialize)]
struct PullBase {
    sha: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn url(&self, repo: &Base, rest: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.base_url, repo.owner, repo.repo, rest)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28")
            .set("User-Agent", "testkit")
    }

    fn send(&self, operation: &str, method: &str, url: &str, body: &impl Serialize) -> Result<String> {
        tracing::debug!(operation, method, url, "calling GitHub API");
        let response = self
            .request(method, url)
            .send_json(body)
            .map_err(|e| api_error(operation, e))?;
        read_body(operation, response)
    }

    fn get_page<T: DeserializeOwned>(&self, operation: &str, url: &str) -> Result<(Vec<T>, Option<u32>)> {
        tracing::debug!(operation, url, "calling GitHub API");
        let response = self
            .request("GET", url)
            .call()
            .map_err(|e| api_error(operation, e))?;
        let next_page = response.header("link").and_then(next_page_from_link);
        let body = read_body(operation, response)?;
        let items = decode(operation, &body)?;
        Ok((items, next_page))
    }
}

impl HostingApi for GitHubClient {
    fn create_pull_request(&self, repo: &Base, pr: &NewPullRequest) -> Result<PullRequestCreated> {
        let operation = "creating pull request";
        let body = self.send(operation, "POST", &self.url(repo, "pulls"), pr)?;
        decode(operation, &body)
    }

    fn add_labels(&self, repo: &Base, number: u64, labels: &[String]) -> Result<()> {
        let url = self.url(repo, &format!("issues/{number}/labels"));
        self.send(
            "adding labels",
            "POST",
            &url,
            &serde_json::json!({ "labels": labels }),
        )?;
        Ok(())
    }

    fn create_comment(&self, repo: &Base, number: u64, body: &str) -> Result<()> {
        let url = self.url(repo, &format!("issues/{number}/comments"));
        self.send("creating comment", "POST", &url, &serde_json::json!({ "body": body }))?;
        Ok(())
    }

    fn merge_pull_request(&self, repo: &Base, number: u64) -> Result<()> {
        let url = self.url(repo, &format!("pulls/{number}/merge"));
        self.send(
            "merging pull request",
            "PUT",
            &url,
            &serde_json::json!({ "merge_method": "merge" }),
        )?;
        Ok(())
    }

    fn create_release(&self, repo: &Base, tag_name: &str) -> Result<()> {
        self.send(
            "creating release",
            "POST",
            &self.url(repo, "releases"),
            &serde_json::json!({ "tag_name": tag_name }),
        )?;
        Ok(())
    }

    fn dispatch(&self, repo: &Base, event_type: &str, client_payload: &serde_json::Value) -> Result<()> {
        self.send(
            "creating repository dispatch event",
            "POST",
            &self.url(repo, "dispatches"),
            &serde_json::json!({ "event_type": event_type, "client_payload": client_payload }),
        )?;
        Ok(())
    }

    fn list_tags(&self, repo: &Base, page: u32) -> Result<Page<String>> {
        let url = self.url(repo, &format!("tags?per_page={PER_PAGE}&page={page}"));
        let (items, next_page) = self.get_page::<TagItem>("listing tags", &url)?;
        Ok(Page {
            items: items.into_iter().map(|t| t.name).collect(),
            next_page,
        })
    }

    fn list_pull_requests(&self, repo: &Base, page: u32) -> Result<Page<PullRequestSummary>> {
        let url = self.url(repo, &format!("pulls?state=all&per_page={PER_PAGE}&page={page}"));
        let (items, next_page) = self.get_page::<PullItem>("listing pull requests", &url)?;
        Ok(Page {
            items: items
                .into_iter()
                .map(|p| PullRequestSummary {
                    number: p.number,
                    base_sha: p.base.sha,
                })
                .collect(),
            next_page,
        })
    }
}

fn api_error(operation: &str, err: ureq::Error) -> Error {
    let message = match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            format!("status {code}: {}", body.trim())
        }
        ureq::Error::Transport(t) => t.to_string(),
    };
    Error::Api {
        operation: operation.to_string(),
        message,
    }
}

fn read_body(operation: &str, response: ureq::Response) -> Result<String> {
    response.into_string().map_err(|e| Error::Api {
        operation: operation.to_string(),
        message: format!("reading response body: {e}"),
    })
}

fn decode<T: DeserializeOwned>(what: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|_| Error::Decode {
        what: what.to_string(),
        payload: body.to_string(),
    })
}

/// Extracts the `page` of the `rel="next"` entry of a `Link` header.
pub(crate) fn next_page_from_link(link: &str) -> Option<u32> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|p| p.trim() == r#"rel="next""#);
        if !is_next {
            return None;
        }
        let url = target.strip_prefix('<')?.strip_suffix('>')?;
        let (_, query) = url.split_once('?')?;
        query
            .split('&')
            .find_map(|kv| kv.strip_prefix("page="))
            .and_then(|n| n.parse().ok())
    })
}
