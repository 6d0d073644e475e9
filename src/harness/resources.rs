//! Resource records, request options and the capability trait for each kind.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::github::RepoService;

use super::provider::Provider;

/// How the broker treats an implementer whose request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// The first implementer's result is final, error or not.
    #[default]
    FailFast,
    /// Errors are logged and the next implementer is tried.
    FirstSuccess,
}

/// A resource kind the broker can resolve.
pub trait ResourceKind: Sized {
    type Options: Default;

    /// Name used in diagnostics, e.g. `KubernetesClusterProvider`.
    const CAPABILITY: &'static str;

    /// Policy used by [`Harness::resolve`](super::Harness::resolve).
    const POLICY: ResolutionPolicy;

    /// Asks `provider` for the resource, or `None` if it lacks the capability.
    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>>;
}

// -- Kubernetes cluster --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesCluster {
    pub kubeconfig_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct KubernetesClusterOptions {
    pub id: String,
}

pub trait KubernetesClusterProvider {
    fn kubernetes_cluster(&mut self, opts: &KubernetesClusterOptions) -> Result<KubernetesCluster>;
}

impl ResourceKind for KubernetesCluster {
    type Options = KubernetesClusterOptions;
    const CAPABILITY: &'static str = "KubernetesClusterProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FailFast;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider
            .as_kubernetes_cluster_provider()
            .map(|p| p.kubernetes_cluster(opts))
    }
}

// -- EKS cluster --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EksCluster {
    /// API server endpoint. Empty when the provider does not know it.
    pub endpoint: String,
    pub kubeconfig_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct EksClusterOptions {
    pub id: String,
}

pub trait EksClusterProvider {
    fn eks_cluster(&mut self, opts: &EksClusterOptions) -> Result<EksCluster>;
}

impl ResourceKind for EksCluster {
    type Options = EksClusterOptions;
    const CAPABILITY: &'static str = "EKSClusterProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FailFast;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider.as_eks_cluster_provider().map(|p| p.eks_cluster(opts))
    }
}

// -- Kubernetes namespace --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesNamespace {
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct KubernetesNamespaceOptions {
    pub id: String,
    /// Cluster to create the namespace in. Defaults to the provider's kubeconfig.
    pub kubeconfig_path: Option<PathBuf>,
}

pub trait KubernetesNamespaceProvider {
    fn kubernetes_namespace(&mut self, opts: &KubernetesNamespaceOptions) -> Result<KubernetesNamespace>;
}

impl ResourceKind for KubernetesNamespace {
    type Options = KubernetesNamespaceOptions;
    const CAPABILITY: &'static str = "KubernetesNamespaceProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FirstSuccess;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider
            .as_kubernetes_namespace_provider()
            .map(|p| p.kubernetes_namespace(opts))
    }
}

// -- Kubernetes config map --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesConfigMap {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct KubernetesConfigMapOptions {
    pub id: String,
    /// Namespace to create the config map in. Defaults to `default`.
    pub namespace: Option<String>,
    pub kubeconfig_path: Option<PathBuf>,
}

pub trait KubernetesConfigMapProvider {
    fn kubernetes_config_map(&mut self, opts: &KubernetesConfigMapOptions) -> Result<KubernetesConfigMap>;
}

impl ResourceKind for KubernetesConfigMap {
    type Options = KubernetesConfigMapOptions;
    const CAPABILITY: &'static str = "KubernetesConfigMapProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FirstSuccess;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider
            .as_kubernetes_config_map_provider()
            .map(|p| p.kubernetes_config_map(opts))
    }
}

// -- S3 bucket --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Bucket {
    pub name: String,
    pub region: String,
    /// AWS profile to access the bucket with.
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct S3BucketOptions {
    pub id: String,
}

pub trait S3BucketProvider {
    fn s3_bucket(&mut self, opts: &S3BucketOptions) -> Result<S3Bucket>;
}

impl ResourceKind for S3Bucket {
    type Options = S3BucketOptions;
    const CAPABILITY: &'static str = "S3BucketProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FailFast;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider.as_s3_bucket_provider().map(|p| p.s3_bucket(opts))
    }
}

// -- ECR image repository --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcrImageRepository {
    pub id: String,
    pub arn: String,
    pub repository_url: String,
    pub registry_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct EcrImageRepositoryOptions {
    pub id: String,
}

pub trait EcrImageRepositoryProvider {
    fn ecr_image_repository(&mut self, opts: &EcrImageRepositoryOptions) -> Result<EcrImageRepository>;
}

impl ResourceKind for EcrImageRepository {
    type Options = EcrImageRepositoryOptions;
    const CAPABILITY: &'static str = "ECRImageRepositoryProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FailFast;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider
            .as_ecr_image_repository_provider()
            .map(|p| p.ecr_image_repository(opts))
    }
}

// -- GitHub repository --

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub id: String,
    /// `owner/name`.
    pub name: String,
    pub token: String,
}

impl std::fmt::Debug for GitHubRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubRepository")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GitHubRepositoryOptions {
    pub id: String,
}

pub trait GitHubRepositoryProvider {
    fn github_repository(&mut self, opts: &GitHubRepositoryOptions) -> Result<GitHubRepository>;
}

impl ResourceKind for GitHubRepository {
    type Options = GitHubRepositoryOptions;
    const CAPABILITY: &'static str = "GitHubRepositoryProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FirstSuccess;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider
            .as_github_repository_provider()
            .map(|p| p.github_repository(opts))
    }
}

// -- GitHub writable repository --

/// A repository tests may push to, with operations bound to it.
#[derive(Clone)]
pub struct GitHubWritableRepository {
    pub id: String,
    /// `owner/name`.
    pub name: String,
    pub token: String,
    pub service: RepoService,
}

impl std::fmt::Debug for GitHubWritableRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubWritableRepository")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl std::ops::Deref for GitHubWritableRepository {
    type Target = RepoService;

    fn deref(&self) -> &RepoService {
        &self.service
    }
}

#[derive(Debug, Clone, Default)]
pub struct GitHubWritableRepositoryOptions {
    pub id: String,
}

pub trait GitHubWritableRepositoryProvider {
    fn github_writable_repository(
        &mut self,
        opts: &GitHubWritableRepositoryOptions,
    ) -> Result<GitHubWritableRepository>;
}

impl ResourceKind for GitHubWritableRepository {
    type Options = GitHubWritableRepositoryOptions;
    const CAPABILITY: &'static str = "GitHubWritableRepositoriesProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FirstSuccess;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider
            .as_github_writable_repository_provider()
            .map(|p| p.github_writable_repository(opts))
    }
}

// -- Slack channel --

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    pub bot_token: String,
    pub app_token: String,
    pub incoming_webhook_url: String,
}

impl std::fmt::Debug for SlackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackChannel")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SlackChannelOptions {
    pub id: String,
}

pub trait SlackChannelProvider {
    fn slack_channel(&mut self, opts: &SlackChannelOptions) -> Result<SlackChannel>;
}

impl ResourceKind for SlackChannel {
    type Options = SlackChannelOptions;
    const CAPABILITY: &'static str = "SlackChannelProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FailFast;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider.as_slack_channel_provider().map(|p| p.slack_channel(opts))
    }
}

// -- Chatwork room --

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatworkRoom {
    pub id: String,
    pub token: String,
}

impl std::fmt::Debug for ChatworkRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatworkRoom")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatworkRoomOptions {
    pub id: String,
}

pub trait ChatworkRoomProvider {
    fn chatwork_room(&mut self, opts: &ChatworkRoomOptions) -> Result<ChatworkRoom>;
}

impl ResourceKind for ChatworkRoom {
    type Options = ChatworkRoomOptions;
    const CAPABILITY: &'static str = "ChatworkRoomProvider";
    const POLICY: ResolutionPolicy = ResolutionPolicy::FailFast;

    fn request(provider: &mut dyn Provider, opts: &Self::Options) -> Option<Result<Self>> {
        provider.as_chatwork_room_provider().map(|p| p.chatwork_room(opts))
    }
}
