//! Namespaces and config maps created with `kubectl`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::harness::{
    name_prefix, KubernetesConfigMap, KubernetesConfigMapOptions, KubernetesConfigMapProvider,
    KubernetesNamespace, KubernetesNamespaceOptions, KubernetesNamespaceProvider, NameRegistry, Provider,
    NAME_PREFIX,
};
use crate::kubectl::Kubectl;

const SUFFIX_LEN: usize = 5;
const DEFAULT_NAMESPACE: &str = "default";

/// Objects created in one cluster.
#[derive(Debug, Default)]
struct ClusterObjects {
    namespaces: NameRegistry,
    /// Keyed by namespace.
    config_maps: BTreeMap<String, NameRegistry>,
}

/// Supplies namespaces and config maps in existing clusters.
#[derive(Debug)]
pub struct KubectlProvider {
    default_kubeconfig_path: Option<PathBuf>,
    kubectl_bin: OsString,
    clusters: BTreeMap<PathBuf, ClusterObjects>,
}

impl Default for KubectlProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlProvider {
    pub fn new() -> Self {
        Self {
            default_kubeconfig_path: None,
            kubectl_bin: OsString::from("kubectl"),
            clusters: BTreeMap::new(),
        }
    }

    /// Cluster used when a request names no kubeconfig.
    pub fn with_default_kubeconfig_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_kubeconfig_path = Some(path.into());
        self
    }

    pub fn with_kubectl_bin(mut self, bin: impl Into<OsString>) -> Self {
        self.kubectl_bin = bin.into();
        self
    }

    fn kubeconfig_for(&self, requested: Option<&PathBuf>) -> Result<PathBuf> {
        requested
            .or(self.default_kubeconfig_path.as_ref())
            .cloned()
            .ok_or_else(|| Error::Precondition("no kubeconfig path given and no default configured".to_string()))
    }

    fn kubectl(&self, kubeconfig: &Path) -> Kubectl {
        Kubectl::new(kubeconfig).with_bin(&self.kubectl_bin)
    }
}

impl Provider for KubectlProvider {
    fn name(&self) -> &str {
        "kubectl"
    }

    fn setup(&mut self) -> Result<()> {
        if let Some(path) = &self.default_kubeconfig_path {
            std::fs::metadata(path).map_err(|e| {
                Error::Precondition(format!("unable to stat kubeconfig file {}: {e}", path.display()))
            })?;
        }
        self.clusters.clear();
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut first_error = None;
        let mut record = |result: Result<String>, what: String| {
            if let Err(e) = result {
                tracing::warn!(object = %what, error = %e, "failed to delete");
                first_error.get_or_insert(e);
            } else {
                tracing::info!(object = %what, "deleted");
            }
        };

        for (kubeconfig, objects) in &self.clusters {
            let kubectl = self.kubectl(kubeconfig);
            for (ns, names) in &objects.config_maps {
                for name in names.names() {
                    record(
                        kubectl.capture(&["delete", "configmap", name, "--namespace", ns]),
                        format!("configmap {ns}/{name}"),
                    );
                }
            }
            for name in objects.namespaces.names() {
                record(
                    kubectl.capture(&["delete", "namespace", name]),
                    format!("namespace {name}"),
                );
            }
        }

        self.clusters.clear();
        first_error.map_or(Ok(()), Err)
    }

    fn as_kubernetes_namespace_provider(&mut self) -> Option<&mut dyn KubernetesNamespaceProvider> {
        Some(self)
    }

    fn as_kubernetes_config_map_provider(&mut self) -> Option<&mut dyn KubernetesConfigMapProvider> {
        Some(self)
    }
}

impl KubernetesNamespaceProvider for KubectlProvider {
    fn kubernetes_namespace(&mut self, opts: &KubernetesNamespaceOptions) -> Result<KubernetesNamespace> {
        let kubeconfig = self.kubeconfig_for(opts.kubeconfig_path.as_ref())?;
        let kubectl = self.kubectl(&kubeconfig);
        let registry = &mut self.clusters.entry(kubeconfig).or_default().namespaces;

        let resolved = registry.resolve(
            &name_prefix(NAME_PREFIX, &opts.id),
            SUFFIX_LEN,
            || kubectl.object_names("namespaces", None),
            |name| kubectl.capture(&["create", "namespace", name]).map(drop),
        )?;

        Ok(KubernetesNamespace {
            name: resolved.into_name(),
        })
    }
}

impl KubernetesConfigMapProvider for KubectlProvider {
    fn kubernetes_config_map(&mut self, opts: &KubernetesConfigMapOptions) -> Result<KubernetesConfigMap> {
        let kubeconfig = self.kubeconfig_for(opts.kubeconfig_path.as_ref())?;
        let kubectl = self.kubectl(&kubeconfig);
        let namespace = opts
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let registry = self
            .clusters
            .entry(kubeconfig)
            .or_default()
            .config_maps
            .entry(namespace.clone())
            .or_default();

        let resolved = registry.resolve(
            &name_prefix(NAME_PREFIX, &opts.id),
            SUFFIX_LEN,
            || kubectl.object_names("configmaps", Some(&namespace)),
            |name| {
                kubectl
                    .capture(&["create", "configmap", name, "--namespace", &namespace])
                    .map(drop)
            },
        )?;

        Ok(KubernetesConfigMap {
            namespace,
            name: resolved.into_name(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::test_support::{fake_cli, fake_cli_calls};
    use tempfile::TempDir;

    fn provider(dir: &TempDir) -> KubectlProvider {
        let kubeconfig = dir.path().join("kubeconfig");
        std::fs::write(&kubeconfig, "").unwrap();
        let mut provider = KubectlProvider::new()
            .with_default_kubeconfig_path(kubeconfig)
            .with_kubectl_bin(fake_cli(dir.path(), "kubectl"));
        provider.setup().unwrap();
        provider
    }

    fn creates(dir: &TempDir) -> usize {
        fake_cli_calls(dir.path(), "kubectl")
            .iter()
            .filter(|c| c.starts_with("create"))
            .count()
    }

    #[test]
    fn setup_requires_existing_default_kubeconfig() {
        let mut provider = KubectlProvider::new().with_default_kubeconfig_path("/nonexistent/kubeconfig");
        assert!(matches!(provider.setup(), Err(Error::Precondition(_))));
    }

    #[test]
    fn same_id_yields_same_namespace_and_one_create() {
        let dir = TempDir::new().unwrap();
        let mut provider = provider(&dir);
        let opts = KubernetesNamespaceOptions {
            id: "app".to_string(),
            ..Default::default()
        };

        let first = provider.kubernetes_namespace(&opts).unwrap();
        let second = provider.kubernetes_namespace(&opts).unwrap();

        assert_eq!(first, second);
        assert!(first.name.starts_with("testkit-app-"));
        assert_eq!(first.name.len(), "testkit-app-".len() + SUFFIX_LEN);
        assert_eq!(creates(&dir), 1);
    }

    #[test]
    fn different_ids_get_different_namespaces() {
        let dir = TempDir::new().unwrap();
        let mut provider = provider(&dir);

        let a = provider.kubernetes_namespace(&Default::default()).unwrap();
        let b = provider
            .kubernetes_namespace(&KubernetesNamespaceOptions {
                id: "b".to_string(),
                ..Default::default()
            })
            .unwrap();

        assert_ne!(a.name, b.name);
        assert_eq!(creates(&dir), 2);
    }

    #[test]
    fn unmanaged_namespace_is_reused_and_never_deleted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("kubectl.get.out"),
            "namespace/default\nnamespace/testkit-ci-x1y2z\n",
        )
        .unwrap();
        let mut provider = provider(&dir);

        let ns = provider
            .kubernetes_namespace(&KubernetesNamespaceOptions {
                id: "ci".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ns.name, "testkit-ci-x1y2z");

        provider.cleanup().unwrap();
        let calls = fake_cli_calls(dir.path(), "kubectl");
        assert!(calls.iter().all(|c| !c.starts_with("create") && !c.starts_with("delete")));
    }

    #[test]
    fn config_map_defaults_to_default_namespace() {
        let dir = TempDir::new().unwrap();
        let mut provider = provider(&dir);

        let cm = provider.kubernetes_config_map(&Default::default()).unwrap();
        assert_eq!(cm.namespace, "default");

        let calls = fake_cli_calls(dir.path(), "kubectl");
        assert!(calls.contains(&"get configmaps -o name --namespace default".to_string()));
        assert!(calls.contains(&format!("create configmap {} --namespace default", cm.name)));
    }

    #[test]
    fn cleanup_deletes_config_maps_before_namespaces() {
        let dir = TempDir::new().unwrap();
        let mut provider = provider(&dir);

        let ns = provider.kubernetes_namespace(&Default::default()).unwrap();
        let cm = provider
            .kubernetes_config_map(&KubernetesConfigMapOptions {
                namespace: Some(ns.name.clone()),
                ..Default::default()
            })
            .unwrap();
        provider.cleanup().unwrap();

        let deletes: Vec<_> = fake_cli_calls(dir.path(), "kubectl")
            .into_iter()
            .filter(|c| c.starts_with("delete"))
            .collect();
        assert_eq!(
            deletes,
            vec![
                format!("delete configmap {} --namespace {}", cm.name, ns.name),
                format!("delete namespace {}", ns.name),
            ]
        );
    }

    #[test]
    fn request_without_any_kubeconfig_is_a_precondition_error() {
        let mut provider = KubectlProvider::new();
        provider.setup().unwrap();
        let err = provider.kubernetes_namespace(&Default::default()).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }
}
