//! The provider trait and its capability queries.

use crate::error::Result;

use super::resources::{
    ChatworkRoomProvider, EcrImageRepositoryProvider, EksClusterProvider, GitHubRepositoryProvider,
    GitHubWritableRepositoryProvider, KubernetesClusterProvider, KubernetesConfigMapProvider,
    KubernetesNamespaceProvider, S3BucketProvider, SlackChannelProvider,
};

/// A pluggable source of resources.
///
/// A provider declares a capability by overriding the matching `as_*` query to
/// return `Some(self)`. The harness calls [`Provider::setup`] once before any
/// request and [`Provider::cleanup`] once at teardown, unless resources are
/// retained.
pub trait Provider {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn setup(&mut self) -> Result<()>;

    /// Deletes everything this provider created. Objects it merely reused are left alone.
    fn cleanup(&mut self) -> Result<()>;

    fn as_kubernetes_cluster_provider(&mut self) -> Option<&mut dyn KubernetesClusterProvider> {
        None
    }

    fn as_eks_cluster_provider(&mut self) -> Option<&mut dyn EksClusterProvider> {
        None
    }

    fn as_kubernetes_namespace_provider(&mut self) -> Option<&mut dyn KubernetesNamespaceProvider> {
        None
    }

    fn as_kubernetes_config_map_provider(&mut self) -> Option<&mut dyn KubernetesConfigMapProvider> {
        None
    }

    fn as_s3_bucket_provider(&mut self) -> Option<&mut dyn S3BucketProvider> {
        None
    }

    fn as_ecr_image_repository_provider(&mut self) -> Option<&mut dyn EcrImageRepositoryProvider> {
        None
    }

    fn as_github_repository_provider(&mut self) -> Option<&mut dyn GitHubRepositoryProvider> {
        None
    }

    fn as_github_writable_repository_provider(
        &mut self,
    ) -> Option<&mut dyn GitHubWritableRepositoryProvider> {
        None
    }

    fn as_slack_channel_provider(&mut self) -> Option<&mut dyn SlackChannelProvider> {
        None
    }

    fn as_chatwork_room_provider(&mut self) -> Option<&mut dyn ChatworkRoomProvider> {
        None
    }
}

/// True when at least one `TESTKIT_*` variable is set.
pub(crate) fn has_testkit_env() -> bool {
    std::env::vars_os().any(|(key, _)| key.to_string_lossy().starts_with("TESTKIT_"))
}
