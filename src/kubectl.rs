//! A `kubectl` bound to one kubeconfig.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::process::capture;

/// Runs `kubectl` with `KUBECONFIG` pointing at a fixed file.
#[derive(Debug, Clone)]
pub struct Kubectl {
    bin: OsString,
    kubeconfig_path: PathBuf,
    /// Log the error of commands run through [`Kubectl::failed`].
    pub log_error: bool,
}

impl Kubectl {
    pub fn new(kubeconfig_path: impl Into<PathBuf>) -> Self {
        Self {
            bin: OsString::from("kubectl"),
            kubeconfig_path: kubeconfig_path.into(),
            log_error: false,
        }
    }

    /// Uses a different binary, e.g. a wrapper script.
    pub fn with_bin(mut self, bin: impl Into<OsString>) -> Self {
        self.bin = bin.into();
        self
    }

    pub fn kubeconfig_path(&self) -> &Path {
        &self.kubeconfig_path
    }

    /// Runs kubectl and returns its stdout.
    pub fn capture(&self, args: &[&str]) -> Result<String> {
        let out = capture(&self.bin, None, &[("KUBECONFIG", self.kubeconfig_path.as_os_str())], args)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Runs kubectl and reports whether it failed, e.g. to assert a resource is absent.
    pub fn failed(&self, args: &[&str]) -> bool {
        match self.capture(args) {
            Ok(_) => false,
            Err(e) => {
                if self.log_error {
                    tracing::info!(error = %e, "kubectl failed");
                }
                true
            }
        }
    }

    /// Names of objects of `kind`, without the `<kind>/` prefix.
    pub fn object_names(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<String>> {
        let mut args = vec!["get", kind, "-o", "name"];
        if let Some(ns) = namespace {
            args.extend(["--namespace", ns]);
        }
        let out = self.capture(&args)?;
        Ok(parse_object_names(&out))
    }

    /// Nodes of the cluster as reported by `get nodes -o json`.
    pub fn nodes(&self) -> Result<Vec<KubernetesNode>> {
        let out = self.capture(&["get", "nodes", "-o", "json"])?;
        parse_nodes(&out)
    }

    /// Names of the nodes whose `Ready` condition is `True`.
    pub fn ready_node_names(&self) -> Result<Vec<String>> {
        Ok(self
            .nodes()?
            .into_iter()
            .filter(KubernetesNode::is_ready)
            .map(|n| n.metadata.name)
            .collect())
    }
}

/// The subset of a Node object needed to judge readiness.
#[derive(Debug, Clone, Deserialize)]
pub struct KubernetesNode {
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub status: NodeStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl KubernetesNode {
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True")
    }
}

#[derive(Deserialize)]
struct NodeList {
    #[serde(default)]
    items: Vec<KubernetesNode>,
}

fn parse_nodes(output: &str) -> Result<Vec<KubernetesNode>> {
    Ok(serde_json::from_str::<NodeList>(output)?.items)
}

fn parse_object_names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.rsplit_once('/').map_or(l, |(_, name)| name).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_names_strip_kind_prefix() {
        let out = "namespace/default\nnamespace/testkit-abcde\n\n";
        assert_eq!(parse_object_names(out), vec!["default", "testkit-abcde"]);
    }

    #[test]
    fn configmap_names_from_qualified_output() {
        assert_eq!(parse_object_names("configmap/kube-root-ca.crt\n"), vec!["kube-root-ca.crt"]);
    }

    #[test]
    fn only_nodes_with_true_ready_condition_are_ready() {
        let out = r#"{
            "apiVersion": "v1",
            "kind": "List",
            "items": [
                {"metadata": {"name": "cp"}, "status": {"conditions": [
                    {"type": "MemoryPressure", "status": "False"},
                    {"type": "Ready", "status": "True", "reason": "KubeletReady", "message": "kubelet is posting ready status"}
                ]}},
                {"metadata": {"name": "joining"}, "status": {"conditions": [
                    {"type": "Ready", "status": "False", "reason": "KubeletNotReady"}
                ]}},
                {"metadata": {"name": "fresh"}}
            ]
        }"#;
        let nodes = parse_nodes(out).unwrap();
        let ready: Vec<_> = nodes.iter().filter(|n| n.is_ready()).map(|n| n.metadata.name.as_str()).collect();

        assert_eq!(nodes.len(), 3);
        assert_eq!(ready, vec!["cp"]);
        assert_eq!(nodes[0].status.conditions[1].reason, "KubeletReady");
    }

    #[test]
    fn malformed_node_list_is_an_error() {
        assert!(matches!(parse_nodes("not json"), Err(crate::error::Error::Json(_))));
    }

    #[test]
    fn missing_binary_counts_as_failure() {
        let kubectl = Kubectl::new("/nonexistent/kubeconfig").with_bin("testkit-no-such-kubectl");
        assert!(kubectl.failed(&["get", "pods"]));
    }
}
