//! Local Kubernetes clusters created with `kind`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::harness::{
    name_prefix, KubernetesCluster, KubernetesClusterOptions, KubernetesClusterProvider, NameRegistry,
    NameResolution, Provider, NAME_PREFIX,
};
use crate::process::capture;

const SUFFIX_LEN: usize = 4;

/// Creates `kind` clusters on demand and deletes the ones it created.
#[derive(Debug, Default)]
pub struct KindProvider {
    kind_bin: Option<OsString>,
    kubeconfig_dir: Option<PathBuf>,
    clusters: NameRegistry,
    /// Wait for the control plane to be ready. Zero does not wait.
    pub wait: Duration,
    /// Node image to boot the cluster with.
    pub image: Option<String>,
    /// Path to a kind configuration file.
    pub config_path: Option<PathBuf>,
    /// Keep nodes for debugging when creation fails.
    pub retain: bool,
}

impl KindProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `bin` instead of looking `kind` up on `PATH`.
    pub fn with_kind_bin(mut self, bin: impl Into<OsString>) -> Self {
        self.kind_bin = Some(bin.into());
        self
    }

    pub fn with_kubeconfig_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.kubeconfig_dir = Some(dir.into());
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    fn kubeconfig_dir(&self) -> PathBuf {
        self.kubeconfig_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("testkit_kind_kubeconfigs"))
    }

    fn cluster_kubeconfig_path(&self, cluster: &str) -> PathBuf {
        self.kubeconfig_dir().join(format!("{cluster}.kubeconfig"))
    }

    fn run(&self, kubeconfig: Option<&Path>, args: &[&str]) -> Result<String> {
        let bin = self
            .kind_bin
            .as_ref()
            .ok_or_else(|| Error::Precondition("kind provider is not set up".to_string()))?;
        let envs: Vec<(&str, &std::ffi::OsStr)> = kubeconfig
            .map(|path| vec![("KUBECONFIG", path.as_os_str())])
            .unwrap_or_default();
        let out = capture(bin, None, &envs, args)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    fn list_clusters(&self) -> Result<Vec<String>> {
        let out = self.run(None, &["get", "clusters"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn create_args(&self, name: &str) -> Vec<String> {
        let mut args = vec!["create", "cluster", "--name", name]
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !self.wait.is_zero() {
            // kind takes whole seconds; round up so a short wait still waits.
            let secs = self.wait.as_secs() + u64::from(self.wait.subsec_nanos() > 0);
            args.extend(["--wait".to_string(), format!("{secs}s")]);
        }
        if let Some(image) = &self.image {
            args.extend(["--image".to_string(), image.clone()]);
        }
        if let Some(config) = &self.config_path {
            args.extend(["--config".to_string(), config.to_string_lossy().into_owned()]);
        }
        if self.retain {
            args.push("--retain".to_string());
        }
        args
    }
}

impl Provider for KindProvider {
    fn name(&self) -> &str {
        "kind"
    }

    fn setup(&mut self) -> Result<()> {
        if self.kind_bin.is_none() {
            let bin = which::which("kind")
                .map_err(|e| Error::Precondition(format!("unable to find kind binary: {e}")))?;
            self.kind_bin = Some(bin.into_os_string());
        }
        let dir = self.kubeconfig_dir();
        std::fs::create_dir_all(&dir)?;
        self.kubeconfig_dir = Some(dir);
        self.clusters = NameRegistry::new();
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut first_error = None;
        for name in self.clusters.names() {
            let kubeconfig = self.cluster_kubeconfig_path(name);
            match self.run(Some(&kubeconfig), &["delete", "cluster", "--name", name]) {
                Ok(_) => tracing::info!(cluster = %name, "deleted kind cluster"),
                Err(e) => {
                    tracing::warn!(cluster = %name, error = %e, "unable to delete kind cluster");
                    first_error.get_or_insert(e);
                }
            }
        }
        self.clusters = NameRegistry::new();
        first_error.map_or(Ok(()), Err)
    }

    fn as_kubernetes_cluster_provider(&mut self) -> Option<&mut dyn KubernetesClusterProvider> {
        Some(self)
    }
}

impl KubernetesClusterProvider for KindProvider {
    fn kubernetes_cluster(&mut self, opts: &KubernetesClusterOptions) -> Result<KubernetesCluster> {
        let prefix = name_prefix(NAME_PREFIX, &opts.id);
        let mut registry = std::mem::take(&mut self.clusters);
        let resolved = registry.resolve(
            &prefix,
            SUFFIX_LEN,
            || self.list_clusters(),
            |name| {
                let args = self.create_args(name);
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                self.run(Some(&self.cluster_kubeconfig_path(name)), &args).map(drop)
            },
        );
        self.clusters = registry;

        let resolved = resolved?;
        let kubeconfig_path = self.cluster_kubeconfig_path(resolved.name());
        if !matches!(resolved, NameResolution::Created(_)) {
            self.run(
                Some(&kubeconfig_path),
                &["export", "kubeconfig", "--name", resolved.name()],
            )?;
        }

        Ok(KubernetesCluster { kubeconfig_path })
    }
}
