//! Resources described by `TESTKIT_*` environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::harness::{
    has_testkit_env, ChatworkRoom, ChatworkRoomOptions, ChatworkRoomProvider, EksCluster, EksClusterOptions,
    EksClusterProvider, GitHubRepository, GitHubRepositoryOptions, GitHubRepositoryProvider, KubernetesCluster,
    KubernetesClusterOptions, KubernetesClusterProvider, Provider, S3Bucket, S3BucketOptions, S3BucketProvider,
    SlackChannel, SlackChannelOptions, SlackChannelProvider,
};

pub const KUBECONFIG_ENV: &str = "TESTKIT_KUBECONFIG";
pub const S3_BUCKET_NAME_ENV: &str = "TESTKIT_S3_BUCKET_NAME";
pub const S3_BUCKET_REGION_ENV: &str = "TESTKIT_S3_BUCKET_REGION";
pub const S3_BUCKET_PROFILE_ENV: &str = "TESTKIT_S3_BUCKET_PROFILE";
pub const GITHUB_REPO_ENV: &str = "TESTKIT_GITHUB_REPO";
pub const TESTKIT_GITHUB_TOKEN_ENV: &str = "TESTKIT_GITHUB_TOKEN";
pub const SLACK_CHANNEL_ID_ENV: &str = "TESTKIT_SLACK_CHANNEL_ID";
pub const SLACK_BOT_TOKEN_ENV: &str = "TESTKIT_SLACK_BOT_TOKEN";
pub const SLACK_APP_TOKEN_ENV: &str = "TESTKIT_SLACK_APP_TOKEN";
pub const SLACK_INCOMING_WEBHOOK_URL_ENV: &str = "TESTKIT_SLACK_INCOMING_WEBHOOK_URL";
pub const CHATWORK_ROOM_ID_ENV: &str = "TESTKIT_CHATWORK_ROOM_ID";
pub const CHATWORK_TOKEN_ENV: &str = "TESTKIT_CHATWORK_TOKEN";

/// Hands out pre-existing resources named in the environment. Never creates or deletes anything.
#[derive(Debug, Default)]
pub struct EnvProvider {
    /// Replaces the process environment when set.
    vars: Option<BTreeMap<String, String>>,
}

impl EnvProvider {
    /// Reads the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `vars` instead of the process environment.
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    fn var(&self, key: &str) -> Option<String> {
        let value = match &self.vars {
            Some(vars) => vars.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        value.filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.var(key)
            .ok_or_else(|| Error::Precondition(format!("{key} environment variable is not set")))
    }

    fn kubeconfig_path(&self) -> Result<PathBuf> {
        self.required(KUBECONFIG_ENV).map(PathBuf::from)
    }
}

impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn setup(&mut self) -> Result<()> {
        let found = match &self.vars {
            Some(vars) => vars.keys().any(|k| k.starts_with("TESTKIT_")),
            None => has_testkit_env(),
        };
        if !found {
            return Err(Error::Precondition("no TESTKIT_* environment variables found".to_string()));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }

    fn as_kubernetes_cluster_provider(&mut self) -> Option<&mut dyn KubernetesClusterProvider> {
        Some(self)
    }

    fn as_eks_cluster_provider(&mut self) -> Option<&mut dyn EksClusterProvider> {
        Some(self)
    }

    fn as_s3_bucket_provider(&mut self) -> Option<&mut dyn S3BucketProvider> {
        Some(self)
    }

    fn as_github_repository_provider(&mut self) -> Option<&mut dyn GitHubRepositoryProvider> {
        Some(self)
    }

    fn as_slack_channel_provider(&mut self) -> Option<&mut dyn SlackChannelProvider> {
        Some(self)
    }

    fn as_chatwork_room_provider(&mut self) -> Option<&mut dyn ChatworkRoomProvider> {
        Some(self)
    }
}

impl KubernetesClusterProvider for EnvProvider {
    fn kubernetes_cluster(&mut self, _opts: &KubernetesClusterOptions) -> Result<KubernetesCluster> {
        Ok(KubernetesCluster {
            kubeconfig_path: self.kubeconfig_path()?,
        })
    }
}

impl EksClusterProvider for EnvProvider {
    fn eks_cluster(&mut self, _opts: &EksClusterOptions) -> Result<EksCluster> {
        Ok(EksCluster {
            endpoint: String::new(),
            kubeconfig_path: self.kubeconfig_path()?,
        })
    }
}

impl S3BucketProvider for EnvProvider {
    fn s3_bucket(&mut self, _opts: &S3BucketOptions) -> Result<S3Bucket> {
        Ok(S3Bucket {
            name: self.required(S3_BUCKET_NAME_ENV)?,
            region: self.required(S3_BUCKET_REGION_ENV)?,
            profile: self.var(S3_BUCKET_PROFILE_ENV),
        })
    }
}

impl GitHubRepositoryProvider for EnvProvider {
    fn github_repository(&mut self, opts: &GitHubRepositoryOptions) -> Result<GitHubRepository> {
        Ok(GitHubRepository {
            id: opts.id.clone(),
            name: self.required(GITHUB_REPO_ENV)?,
            token: self.required(TESTKIT_GITHUB_TOKEN_ENV)?,
        })
    }
}

impl SlackChannelProvider for EnvProvider {
    fn slack_channel(&mut self, _opts: &SlackChannelOptions) -> Result<SlackChannel> {
        Ok(SlackChannel {
            id: self.required(SLACK_CHANNEL_ID_ENV)?,
            bot_token: self.required(SLACK_BOT_TOKEN_ENV)?,
            app_token: self.required(SLACK_APP_TOKEN_ENV)?,
            incoming_webhook_url: self.required(SLACK_INCOMING_WEBHOOK_URL_ENV)?,
        })
    }
}

impl ChatworkRoomProvider for EnvProvider {
    fn chatwork_room(&mut self, _opts: &ChatworkRoomOptions) -> Result<ChatworkRoom> {
        Ok(ChatworkRoom {
            id: self.required(CHATWORK_ROOM_ID_ENV)?,
            token: self.required(CHATWORK_TOKEN_ENV)?,
        })
    }
}
