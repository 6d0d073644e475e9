//! testkit - provision, locate and tear down external resources for end-to-end tests
//!
//! Two halves:
//! - [`harness`] resolves abstract resource requests (clusters, namespaces,
//!   buckets, repositories, chat rooms) through pluggable [`providers`] and
//!   cleans up what they created when the test ends.
//! - [`git`] and [`github`] drive a remote repository GitOps-style: stage a
//!   change set in an ephemeral clone, push it, open and merge pull requests,
//!   and read commits, tags and files back.

pub mod config;
pub mod error;
pub mod git;
pub mod github;
pub mod harness;
pub mod kubectl;
pub mod logging;
pub mod poll;
pub mod process;
pub mod providers;

#[cfg(test)]
mod test_support;

pub use config::{GitHubConfig, HarnessConfig, TerraformConfig};
pub use error::{Error, Result};
pub use git::{
    find_commits, Base, ChangeSet, CloneOptions, CommitFound, ContentSource, File, Head, PullRequest,
    PullRequestCreated, PullRequestFound, WorkingCopy, DEFAULT_COMMIT_MESSAGE,
};
pub use github::{Connector, GitHubClient, GitHubConnector, GitHubRepositories, HostingApi, RepoService};
pub use harness::{
    ChatworkRoom, ChatworkRoomOptions, EcrImageRepository, EcrImageRepositoryOptions, EksCluster, EksClusterOptions,
    GitHubRepository, GitHubRepositoryOptions, GitHubWritableRepository, GitHubWritableRepositoryOptions, Harness,
    HarnessBuilder, HarnessState, KubernetesCluster, KubernetesClusterOptions, KubernetesConfigMap,
    KubernetesConfigMapOptions, KubernetesNamespace, KubernetesNamespaceOptions, Provider, ResolutionPolicy,
    ResourceKind, S3Bucket, S3BucketOptions, SlackChannel, SlackChannelOptions,
};
pub use kubectl::{Kubectl, KubernetesNode};
pub use poll::{assert_eventually, poll_until};
pub use providers::{
    EnvProvider, GitHubWritableRepositoriesEnvProvider, KindProvider, KubectlProvider, TerraformProvider,
};
