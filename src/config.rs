//! Harness configuration.
//!
//! Loaded from TOML or built in code, then optionally overridden from the
//! environment:
//! - `TESTKIT_RETAIN_RESOURCES=true` - never clean up
//! - `TESTKIT_RETAIN_RESOURCES_ON_FAILURE=true` - keep resources of failed tests
//! - `TESTKIT_TERRAFORM_WORKSPACE=<dir>` - enables the default terraform provider

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::github::GitHubRepositories;

pub const RETAIN_RESOURCES_ENV: &str = "TESTKIT_RETAIN_RESOURCES";
pub const RETAIN_RESOURCES_ON_FAILURE_ENV: &str = "TESTKIT_RETAIN_RESOURCES_ON_FAILURE";
pub const TERRAFORM_WORKSPACE_ENV: &str = "TESTKIT_TERRAFORM_WORKSPACE";

/// Settings of one harness instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Skip cleanup entirely.
    #[serde(default)]
    pub retain_resources: bool,
    /// Skip cleanup when the test failed.
    #[serde(default)]
    pub retain_resources_on_failure: bool,
    #[serde(default)]
    pub terraform: TerraformConfig,
    #[serde(default)]
    pub github: GitHubConfig,
}

/// Settings of the default terraform provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformConfig {
    /// Terraform working directory. The provider is skipped when unset.
    pub workspace: Option<PathBuf>,
    /// Passed as `-var key=value`.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
    /// Where generated kubeconfigs are written.
    pub kubeconfig_dir: Option<PathBuf>,
}

/// Settings of the repository façade built by providers and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Parent directory of ephemeral clones.
    pub temp_root: Option<PathBuf>,
    #[serde(default)]
    pub retain_cloned_repository: bool,
    /// Clone from `<remote_root>/<owner>/<repo>.git` instead of GitHub.
    pub remote_root: Option<String>,
    /// REST API root, e.g. for GitHub Enterprise.
    pub api_base_url: Option<String>,
}

impl GitHubConfig {
    /// Builds a façade with these settings and `token`, if any.
    pub fn repositories(&self, token: Option<&str>) -> GitHubRepositories {
        let mut repos = GitHubRepositories::new().retain_cloned_repository(self.retain_cloned_repository);
        if let Some(token) = token {
            repos = repos.with_token(token);
        }
        if let Some(dir) = &self.temp_root {
            repos = repos.with_temp_root(dir);
        }
        if let Some(root) = &self.remote_root {
            repos = repos.with_remote_root(root);
        }
        if let Some(url) = &self.api_base_url {
            repos = repos.with_api_base_url(url);
        }
        repos
    }
}

impl HarnessConfig {
    /// Reads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Applies the `TESTKIT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides looked up through `lookup`.
    ///
    /// Retention flags can only be switched on. The terraform workspace is taken
    /// from the environment only when the configuration has none.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if lookup(RETAIN_RESOURCES_ENV).is_some_and(|v| is_truthy(&v)) {
            self.retain_resources = true;
        }
        if lookup(RETAIN_RESOURCES_ON_FAILURE_ENV).is_some_and(|v| is_truthy(&v)) {
            self.retain_resources_on_failure = true;
        }
        if self.terraform.workspace.is_none() {
            self.terraform.workspace = lookup(TERRAFORM_WORKSPACE_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
        }
    }
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_deserializes_from_toml() {
        let toml = r#"
            retain_resources_on_failure = true

            [terraform]
            workspace = "infra/test"
            vars = { region = "ap-northeast-1" }

            [github]
            remote_root = "/srv/git"
        "#;

        let config: HarnessConfig = toml::from_str(toml).unwrap();
        assert!(!config.retain_resources);
        assert!(config.retain_resources_on_failure);
        assert_eq!(config.terraform.workspace, Some(PathBuf::from("infra/test")));
        assert_eq!(config.terraform.vars["region"], "ap-northeast-1");
        assert_eq!(config.github.remote_root.as_deref(), Some("/srv/git"));
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("testkit.toml");
        std::fs::write(&path, "retain_resources = \"yes please\"").unwrap();

        match HarnessConfig::load(&path).unwrap_err() {
            Error::Config { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn env_overrides_promote_retention_flags() {
        let mut config = HarnessConfig::default();
        config.apply_overrides_from(env(&[
            (RETAIN_RESOURCES_ENV, "true"),
            (RETAIN_RESOURCES_ON_FAILURE_ENV, "1"),
        ]));
        assert!(config.retain_resources);
        assert!(config.retain_resources_on_failure);
    }

    #[test]
    fn env_overrides_never_clear_flags() {
        let mut config = HarnessConfig {
            retain_resources: true,
            ..Default::default()
        };
        config.apply_overrides_from(env(&[(RETAIN_RESOURCES_ENV, "false")]));
        assert!(config.retain_resources);
    }

    #[test]
    fn terraform_workspace_from_env_does_not_override_file() {
        let mut from_env = HarnessConfig::default();
        from_env.apply_overrides_from(env(&[(TERRAFORM_WORKSPACE_ENV, "/tf")]));
        assert_eq!(from_env.terraform.workspace, Some(PathBuf::from("/tf")));

        let mut from_file = HarnessConfig::default();
        from_file.terraform.workspace = Some(PathBuf::from("/file"));
        from_file.apply_overrides_from(env(&[(TERRAFORM_WORKSPACE_ENV, "/tf")]));
        assert_eq!(from_file.terraform.workspace, Some(PathBuf::from("/file")));
    }
}
