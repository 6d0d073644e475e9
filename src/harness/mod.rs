//! Capability broker and resource resolver.
//!
//! A [`Harness`] owns an ordered list of set-up providers. Tests ask it for a
//! resource kind; it finds the providers implementing that capability and
//! applies the kind's [`ResolutionPolicy`]. Dropping the harness cleans up
//! every provider unless resources are retained.

mod naming;
mod provider;
mod resources;

pub use naming::{matches_prefix, name_prefix, random_suffix, NameRegistry, NameResolution, NAME_PREFIX};
pub use provider::Provider;
pub(crate) use provider::has_testkit_env;
pub use resources::*;

use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::providers::{EnvProvider, TerraformProvider};

/// Lifecycle of a [`Harness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Unconfigured,
    ProvidersSetup,
    Active,
    TornDown,
}

/// Resolves resources from providers and cleans them up at the end of a test.
pub struct Harness {
    config: HarnessConfig,
    providers: Vec<Box<dyn Provider>>,
    state: HarnessState,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("providers", &self.provider_names())
            .field("state", &self.state)
            .finish()
    }
}

/// Builds a [`Harness`].
#[derive(Default)]
pub struct HarnessBuilder {
    config: HarnessConfig,
    providers: Vec<Box<dyn Provider>>,
}

impl HarnessBuilder {
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds an explicit provider. With any explicit provider the defaults are not used.
    pub fn provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn boxed_provider(mut self, provider: Box<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn retain_resources(mut self, retain: bool) -> Self {
        self.config.retain_resources = retain;
        self
    }

    pub fn retain_resources_on_failure(mut self, retain: bool) -> Self {
        self.config.retain_resources_on_failure = retain;
        self
    }

    /// Applies environment overrides and sets up providers.
    ///
    /// Explicit providers must all set up successfully. Otherwise the default
    /// providers are tried and those that fail are skipped; it is an error if
    /// none is left.
    pub fn build(self) -> Result<Harness> {
        let Self {
            mut config,
            providers,
        } = self;
        config.apply_env_overrides();

        let mut harness = Harness {
            config,
            providers: Vec::new(),
            state: HarnessState::Unconfigured,
        };

        if providers.is_empty() {
            for mut provider in harness.default_providers() {
                match provider.setup() {
                    Ok(()) => harness.providers.push(provider),
                    Err(e) => {
                        tracing::info!(provider = provider.name(), error = %e, "skipped setting up failed provider");
                    }
                }
            }
            if harness.providers.is_empty() {
                return Err(Error::NotFound(
                    "no provider out of the default providers is available".to_string(),
                ));
            }
        } else {
            for mut provider in providers {
                if let Err(e) = provider.setup() {
                    // Undo the ones already set up.
                    harness.teardown(false);
                    return Err(Error::Precondition(format!(
                        "failed to setup provider {}: {e}",
                        provider.name()
                    )));
                }
                harness.providers.push(provider);
            }
        }

        harness.state = HarnessState::ProvidersSetup;
        tracing::debug!(providers = ?harness.provider_names(), "providers set up");
        harness.state = HarnessState::Active;
        Ok(harness)
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Builds a harness from the default providers.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn with_config(config: HarnessConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    fn default_providers(&self) -> Vec<Box<dyn Provider>> {
        vec![
            Box::new(TerraformProvider::from_config(&self.config.terraform)),
            Box::new(EnvProvider::new()),
        ]
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Names of the active providers, in resolution order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Resolves `K` with the kind's default policy.
    pub fn resolve<K: ResourceKind>(&mut self, opts: &K::Options) -> Result<K> {
        self.resolve_with::<K>(K::POLICY, opts)
    }

    /// Resolves `K` with an explicit policy.
    pub fn resolve_with<K: ResourceKind>(&mut self, policy: ResolutionPolicy, opts: &K::Options) -> Result<K> {
        if self.state != HarnessState::Active {
            return Err(Error::Precondition(format!(
                "harness is {:?}, cannot resolve {}",
                self.state,
                K::CAPABILITY
            )));
        }

        let mut last_error = None;
        for provider in &mut self.providers {
            let name = provider.name().to_string();
            let Some(result) = K::request(&mut **provider, opts) else {
                continue;
            };
            match result {
                Ok(resource) => return Ok(resource),
                Err(e) if policy == ResolutionPolicy::FailFast => return Err(e),
                Err(e) => {
                    tracing::warn!(provider = %name, capability = K::CAPABILITY, error = %e, "provider failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::NotFound(format!("no {} found", K::CAPABILITY))))
    }

    /// Whether teardown deletes resources, given the test outcome.
    pub fn cleanup_needed(&self, failed: bool) -> bool {
        !(self.config.retain_resources || (failed && self.config.retain_resources_on_failure))
    }

    /// Cleans up every provider unless resources are retained. Runs at most once.
    ///
    /// Cleanup failures are logged and do not stop the remaining providers.
    pub fn teardown(&mut self, failed: bool) {
        if self.state == HarnessState::TornDown {
            return;
        }
        self.state = HarnessState::TornDown;

        if !self.cleanup_needed(failed) {
            tracing::info!(failed, "retaining resources");
            return;
        }

        for provider in &mut self.providers {
            if let Err(e) = provider.cleanup() {
                tracing::warn!(provider = provider.name(), error = %e, "failed to cleanup provider");
            }
        }
    }

    pub fn try_kubernetes_cluster(&mut self, opts: &KubernetesClusterOptions) -> Result<KubernetesCluster> {
        self.resolve(opts)
    }

    pub fn kubernetes_cluster(&mut self, opts: &KubernetesClusterOptions) -> KubernetesCluster {
        expect_resource(self.try_kubernetes_cluster(opts))
    }

    pub fn try_eks_cluster(&mut self, opts: &EksClusterOptions) -> Result<EksCluster> {
        self.resolve(opts)
    }

    pub fn eks_cluster(&mut self, opts: &EksClusterOptions) -> EksCluster {
        expect_resource(self.try_eks_cluster(opts))
    }

    pub fn try_kubernetes_namespace(&mut self, opts: &KubernetesNamespaceOptions) -> Result<KubernetesNamespace> {
        self.resolve(opts)
    }

    pub fn kubernetes_namespace(&mut self, opts: &KubernetesNamespaceOptions) -> KubernetesNamespace {
        expect_resource(self.try_kubernetes_namespace(opts))
    }

    pub fn try_kubernetes_config_map(&mut self, opts: &KubernetesConfigMapOptions) -> Result<KubernetesConfigMap> {
        self.resolve(opts)
    }

    pub fn kubernetes_config_map(&mut self, opts: &KubernetesConfigMapOptions) -> KubernetesConfigMap {
        expect_resource(self.try_kubernetes_config_map(opts))
    }

    pub fn try_s3_bucket(&mut self, opts: &S3BucketOptions) -> Result<S3Bucket> {
        self.resolve(opts)
    }

    pub fn s3_bucket(&mut self, opts: &S3BucketOptions) -> S3Bucket {
        expect_resource(self.try_s3_bucket(opts))
    }

    pub fn try_ecr_image_repository(&mut self, opts: &EcrImageRepositoryOptions) -> Result<EcrImageRepository> {
        self.resolve(opts)
    }

    pub fn ecr_image_repository(&mut self, opts: &EcrImageRepositoryOptions) -> EcrImageRepository {
        expect_resource(self.try_ecr_image_repository(opts))
    }

    pub fn try_github_repository(&mut self, opts: &GitHubRepositoryOptions) -> Result<GitHubRepository> {
        self.resolve(opts)
    }

    pub fn github_repository(&mut self, opts: &GitHubRepositoryOptions) -> GitHubRepository {
        expect_resource(self.try_github_repository(opts))
    }

    pub fn try_github_writable_repository(
        &mut self,
        opts: &GitHubWritableRepositoryOptions,
    ) -> Result<GitHubWritableRepository> {
        self.resolve(opts)
    }

    pub fn github_writable_repository(&mut self, opts: &GitHubWritableRepositoryOptions) -> GitHubWritableRepository {
        expect_resource(self.try_github_writable_repository(opts))
    }

    pub fn try_slack_channel(&mut self, opts: &SlackChannelOptions) -> Result<SlackChannel> {
        self.resolve(opts)
    }

    pub fn slack_channel(&mut self, opts: &SlackChannelOptions) -> SlackChannel {
        expect_resource(self.try_slack_channel(opts))
    }

    pub fn try_chatwork_room(&mut self, opts: &ChatworkRoomOptions) -> Result<ChatworkRoom> {
        self.resolve(opts)
    }

    pub fn chatwork_room(&mut self, opts: &ChatworkRoomOptions) -> ChatworkRoom {
        expect_resource(self.try_chatwork_room(opts))
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.teardown(std::thread::panicking());
    }
}

/// Fails the current test with the resolution error.
#[track_caller]
fn expect_resource<T>(result: Result<T>) -> T {
    match result {
        Ok(resource) => resource,
        Err(e) => panic!("{e}"),
    }
}
