//! AWS resources provisioned by a terraform workspace.
//!
//! Setup applies the workspace and reads the resulting state through
//! `terraform show -json`. Requests are answered from that state; cleanup
//! destroys the workspace.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::TerraformConfig;
use crate::error::{Error, Result};
use crate::harness::{
    EcrImageRepository, EcrImageRepositoryOptions, EcrImageRepositoryProvider, EksCluster, EksClusterOptions,
    EksClusterProvider, KubernetesCluster, KubernetesClusterOptions, KubernetesClusterProvider, Provider, S3Bucket,
    S3BucketOptions, S3BucketProvider,
};
use crate::process::capture;

const S3_BUCKET_TYPE: &str = "aws_s3_bucket";
const EKS_CLUSTER_TYPE: &str = "aws_eks_cluster";
const ECR_REPOSITORY_TYPE: &str = "aws_ecr_repository";

/// Applies a terraform workspace at setup and destroys it at cleanup.
#[derive(Debug)]
pub struct TerraformProvider {
    workspace: Option<PathBuf>,
    vars: BTreeMap<String, String>,
    kubeconfig_dir: Option<PathBuf>,
    terraform_bin: OsString,
    resources: Vec<StateResource>,
}

impl TerraformProvider {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: Some(workspace.into()),
            vars: BTreeMap::new(),
            kubeconfig_dir: None,
            terraform_bin: OsString::from("terraform"),
            resources: Vec::new(),
        }
    }

    /// A provider without a workspace fails setup, so the harness skips it.
    pub fn from_config(config: &TerraformConfig) -> Self {
        Self {
            workspace: config.workspace.clone(),
            vars: config.vars.clone(),
            kubeconfig_dir: config.kubeconfig_dir.clone(),
            terraform_bin: OsString::from("terraform"),
            resources: Vec::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_kubeconfig_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.kubeconfig_dir = Some(dir.into());
        self
    }

    pub fn with_terraform_bin(mut self, bin: impl Into<OsString>) -> Self {
        self.terraform_bin = bin.into();
        self
    }

    fn workspace(&self) -> Result<&Path> {
        self.workspace
            .as_deref()
            .ok_or_else(|| Error::Precondition("terraform workspace path is not set".to_string()))
    }

    fn terraform(&self, args: &[&str]) -> Result<Vec<u8>> {
        let workspace = self.workspace()?;
        capture(&self.terraform_bin, Some(workspace), &[("TF_IN_AUTOMATION", "1")], args)
    }

    /// Runs `args` followed by a `-var` pair per configured variable.
    fn terraform_with_vars(&self, args: &[&str]) -> Result<Vec<u8>> {
        let pairs: Vec<String> = self.vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut full: Vec<&str> = args.to_vec();
        for pair in &pairs {
            full.extend(["-var", pair.as_str()]);
        }
        self.terraform(&full)
    }

    fn values_of<T: DeserializeOwned>(&self, resource_type: &str) -> Result<Vec<T>> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .map(|r| {
                serde_json::from_value(r.values.clone()).map_err(|e| Error::Decode {
                    what: format!("{resource_type} values ({e})"),
                    payload: r.values.to_string(),
                })
            })
            .collect()
    }

    fn first_of<T: DeserializeOwned>(&self, resource_type: &str) -> Result<T> {
        self.values_of(resource_type)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no {resource_type} resource in terraform state")))
    }

    fn eks_cluster_with_kubeconfig(&self) -> Result<(EksClusterValues, PathBuf)> {
        let cluster: EksClusterValues = self.first_of(EKS_CLUSTER_TYPE)?;
        let dir = self
            .kubeconfig_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("testkit_terraform_kubeconfigs"));
        let path = write_kubeconfig(&dir, &cluster)?;
        Ok((cluster, path))
    }
}

impl Provider for TerraformProvider {
    fn name(&self) -> &str {
        "terraform"
    }

    fn setup(&mut self) -> Result<()> {
        let workspace = self.workspace()?;
        std::fs::metadata(workspace).map_err(|e| {
            Error::Precondition(format!("unable to stat workspace path {}: {e}", workspace.display()))
        })?;

        self.terraform(&["init", "-input=false"])?;
        self.terraform_with_vars(&["apply", "-auto-approve", "-input=false"])?;
        let show = self.terraform(&["show", "-json"])?;
        self.resources = parse_state(&show)?;
        tracing::info!(workspace = ?self.workspace, resources = self.resources.len(), "applied terraform workspace");
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.terraform_with_vars(&["destroy", "-auto-approve", "-input=false"])?;
        tracing::info!(workspace = ?self.workspace, "destroyed terraform workspace");
        self.resources.clear();
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

    fn as_ecr_image_repository_provider(&mut self) -> Option<&mut dyn EcrImageRepositoryProvider> {
        Some(self)
    }
}

impl S3BucketProvider for TerraformProvider {
    fn s3_bucket(&mut self, _opts: &S3BucketOptions) -> Result<S3Bucket> {
        let bucket: S3BucketValues = self.first_of(S3_BUCKET_TYPE)?;
        Ok(S3Bucket {
            name: bucket.bucket,
            region: bucket.region,
            profile: None,
        })
    }
}

impl EksClusterProvider for TerraformProvider {
    fn eks_cluster(&mut self, _opts: &EksClusterOptions) -> Result<EksCluster> {
        let (cluster, kubeconfig_path) = self.eks_cluster_with_kubeconfig()?;
        Ok(EksCluster {
            endpoint: cluster.endpoint,
            kubeconfig_path,
        })
    }
}

impl KubernetesClusterProvider for TerraformProvider {
    fn kubernetes_cluster(&mut self, _opts: &KubernetesClusterOptions) -> Result<KubernetesCluster> {
        let (_, kubeconfig_path) = self.eks_cluster_with_kubeconfig()?;
        Ok(KubernetesCluster { kubeconfig_path })
    }
}

impl EcrImageRepositoryProvider for TerraformProvider {
    fn ecr_image_repository(&mut self, _opts: &EcrImageRepositoryOptions) -> Result<EcrImageRepository> {
        self.first_of(ECR_REPOSITORY_TYPE)
    }
}

// -- terraform show -json --

#[derive(Debug, Deserialize)]
struct ShowOutput {
    #[serde(default)]
    values: Option<ShowValues>,
}

#[derive(Debug, Deserialize)]
struct ShowValues {
    root_module: RootModule,
}

#[derive(Debug, Deserialize)]
struct RootModule {
    #[serde(default)]
    resources: Vec<StateResource>,
}

#[derive(Debug, Clone, Deserialize)]
struct StateResource {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    values: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct S3BucketValues {
    bucket: String,
    #[serde(default)]
    region: String,
}

#[derive(Debug, Deserialize)]
struct EksClusterValues {
    name: String,
    endpoint: String,
    arn: String,
    #[serde(default)]
    certificate_authority: Vec<CertificateAuthority>,
}

#[derive(Debug, Deserialize)]
struct CertificateAuthority {
    data: String,
}

/// Root module resources of a `terraform show -json` document. An empty state has none.
fn parse_state(raw: &[u8]) -> Result<Vec<StateResource>> {
    let output: ShowOutput = serde_json::from_slice(raw).map_err(|e| Error::Decode {
        what: format!("terraform show output ({e})"),
        payload: String::from_utf8_lossy(raw).into_owned(),
    })?;
    Ok(output.values.map(|v| v.root_module.resources).unwrap_or_default())
}

// -- kubeconfig --

#[derive(Debug, Serialize)]
struct Kubeconfig {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<NamedCluster>,
    contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    current_context: String,
    preferences: BTreeMap<String, String>,
    users: Vec<NamedUser>,
}

#[derive(Debug, Serialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Serialize)]
struct ClusterEntry {
    server: String,
    #[serde(rename = "certificate-authority-data")]
    certificate_authority_data: String,
}

#[derive(Debug, Serialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Serialize)]
struct ContextEntry {
    cluster: String,
    user: String,
}

#[derive(Debug, Serialize)]
struct NamedUser {
    name: String,
    user: UserEntry,
}

#[derive(Debug, Serialize)]
struct UserEntry {
    exec: ExecEntry,
}

#[derive(Debug, Serialize)]
struct ExecEntry {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    command: &'static str,
    args: Vec<String>,
}

fn kubeconfig_for(cluster: &EksClusterValues) -> Result<Kubeconfig> {
    let region = cluster.arn.split(':').nth(3).filter(|r| !r.is_empty()).ok_or_else(|| Error::Decode {
        what: "region of EKS cluster ARN".to_string(),
        payload: cluster.arn.clone(),
    })?;
    let ca = cluster.certificate_authority.first().ok_or_else(|| Error::Decode {
        what: format!("certificate authority of EKS cluster {}", cluster.name),
        payload: String::new(),
    })?;
    let entry = format!("testkit_{}", cluster.name);

    Ok(Kubeconfig {
        api_version: "v1",
        kind: "Config",
        clusters: vec![NamedCluster {
            name: entry.clone(),
            cluster: ClusterEntry {
                server: cluster.endpoint.clone(),
                certificate_authority_data: ca.data.clone(),
            },
        }],
        contexts: vec![NamedContext {
            name: entry.clone(),
            context: ContextEntry {
                cluster: entry.clone(),
                user: entry.clone(),
            },
        }],
        current_context: entry.clone(),
        preferences: BTreeMap::new(),
        users: vec![NamedUser {
            name: entry,
            user: UserEntry {
                exec: ExecEntry {
                    api_version: "client.authentication.k8s.io/v1beta1",
                    command: "aws",
                    args: [
                        "--region",
                        region,
                        "eks",
                        "get-token",
                        "--cluster-name",
                        cluster.name.as_str(),
                        "--output",
                        "json",
                    ]
                    .map(str::to_string)
                    .to_vec(),
                },
            },
        }],
    })
}

/// Writes `tfeks_<name>.kubeconfig` into `dir`, readable by the owner only.
fn write_kubeconfig(dir: &Path, cluster: &EksClusterValues) -> Result<PathBuf> {
    let yaml = serde_yaml::to_string(&kubeconfig_for(cluster)?).map_err(|e| Error::Decode {
        what: format!("kubeconfig for {}", cluster.name),
        payload: e.to_string(),
    })?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("tfeks_{}.kubeconfig", cluster.name));
    write_private(&path, yaml.as_bytes())?;
    Ok(path)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // An existing file keeps its mode on open.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}
