//! Configuration file support for kdeploy
//!
//! A `.kdeploy.yaml` next to the rendered manifests supplies defaults for the
//! connection and for which resources are deployed. Command line flags win
//! over the file; `$KUBECONFIG` wins over both for the kubeconfig location.

use std::{
	collections::BTreeSet,
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::k8s::{client::ConnectParams, kind::ResourceKind};

/// The name of the config file kdeploy looks for
pub const CONFIG_FILE_NAME: &str = ".kdeploy.yaml";

/// Root configuration structure for .kdeploy.yaml
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
	/// Location of the kubeconfig file. Defaults to `~/.kube/config`.
	#[serde(default)]
	pub kubeconfig: Option<PathBuf>,

	/// Context to use instead of the kubeconfig's current context.
	#[serde(default)]
	pub context: Option<String>,

	/// Whether to list pods in kube-system before deploying. Defaults to true.
	#[serde(default)]
	pub check_connection: Option<bool>,

	#[serde(default)]
	pub deploy: DeployToggles,
}

/// Which manifests are deployed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeployToggles {
	/// Defaults to true.
	#[serde(default)]
	pub deployment: Option<bool>,
	/// Defaults to false.
	#[serde(default)]
	pub service: Option<bool>,
	/// Defaults to false.
	#[serde(default)]
	pub ingress: Option<bool>,
}

impl DeployConfig {
	/// Load `.kdeploy.yaml` from `dir`, if present
	pub fn load_from_directory(dir: &Path) -> Result<Option<Self>> {
		let path = dir.join(CONFIG_FILE_NAME);
		if !path.is_file() {
			return Ok(None);
		}
		Self::load_from_file(&path).map(Some)
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		let config: DeployConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}

	/// Overlay `overrides` on this config: every value set there wins.
	pub fn merged_with(mut self, overrides: DeployConfig) -> Self {
		if overrides.kubeconfig.is_some() {
			self.kubeconfig = overrides.kubeconfig;
		}
		if overrides.context.is_some() {
			self.context = overrides.context;
		}
		if overrides.check_connection.is_some() {
			self.check_connection = overrides.check_connection;
		}
		if overrides.deploy.deployment.is_some() {
			self.deploy.deployment = overrides.deploy.deployment;
		}
		if overrides.deploy.service.is_some() {
			self.deploy.service = overrides.deploy.service;
		}
		if overrides.deploy.ingress.is_some() {
			self.deploy.ingress = overrides.deploy.ingress;
		}
		self
	}

	pub fn connect_params(&self) -> ConnectParams {
		ConnectParams {
			kubeconfig: self.kubeconfig.clone(),
			context: self.context.clone(),
			verify_connectivity: self.check_connection.unwrap_or(true),
		}
	}

	pub fn enabled_kinds(&self) -> BTreeSet<ResourceKind> {
		[
			(ResourceKind::Workload, self.deploy.deployment.unwrap_or(true)),
			(ResourceKind::NetworkService, self.deploy.service.unwrap_or(false)),
			(ResourceKind::ExternalRoute, self.deploy.ingress.unwrap_or(false)),
		]
		.into_iter()
		.filter_map(|(kind, enabled)| enabled.then_some(kind))
		.collect()
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;

	use super::*;

	#[test]
	fn test_defaults() {
		let config = DeployConfig::default();
		assert_eq!(
			config.enabled_kinds(),
			BTreeSet::from([ResourceKind::Workload])
		);
		assert_eq!(
			config.connect_params(),
			ConnectParams {
				kubeconfig: None,
				context: None,
				verify_connectivity: true,
			}
		);
	}

	#[test]
	fn test_load_from_directory() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join(CONFIG_FILE_NAME),
			indoc! {"
				kubeconfig: /etc/kube/config
				context: staging
				checkConnection: false
				deploy:
				  service: true
				  ingress: true
			"},
		)
		.unwrap();

		let config = DeployConfig::load_from_directory(dir.path())
			.unwrap()
			.expect("config file should be found");

		assert_eq!(config.kubeconfig, Some(PathBuf::from("/etc/kube/config")));
		assert_eq!(config.context.as_deref(), Some("staging"));
		assert!(!config.connect_params().verify_connectivity);
		assert_eq!(
			config.enabled_kinds(),
			BTreeSet::from(ResourceKind::ORDERED)
		);
	}

	#[test]
	fn test_load_from_directory_without_file() {
		let dir = tempfile::tempdir().unwrap();
		assert_eq!(DeployConfig::load_from_directory(dir.path()).unwrap(), None);
	}

	#[test]
	fn test_overrides_win() {
		let file = DeployConfig {
			context: Some("from-file".to_string()),
			check_connection: Some(false),
			deploy: DeployToggles {
				deployment: Some(true),
				service: Some(true),
				ingress: None,
			},
			..Default::default()
		};
		let flags = DeployConfig {
			context: Some("from-flag".to_string()),
			deploy: DeployToggles {
				deployment: Some(false),
				..Default::default()
			},
			..Default::default()
		};

		let merged = file.merged_with(flags);
		assert_eq!(merged.context.as_deref(), Some("from-flag"));
		assert_eq!(merged.check_connection, Some(false));
		assert_eq!(
			merged.enabled_kinds(),
			BTreeSet::from([ResourceKind::NetworkService])
		);
	}
}
