//! Apply command handler.
//!
//! Reads the rendered deployment, service and ingress manifests from a
//! directory and reconciles the enabled ones against the cluster.

use std::{ffi::OsString, io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use super::args::ConnectionArgs;
use crate::{
	config::{DeployConfig, DeployToggles},
	deploy::{self, Manifests},
	k8s::{client::KUBECONFIG_ENV, reconcile::ReconciliationOutcome},
};

#[derive(Args)]
pub struct ApplyArgs {
	/// Directory containing deployment.yaml, service.yaml and ingress.yaml
	pub path: PathBuf,

	#[command(flatten)]
	pub connection: ConnectionArgs,

	/// Deploy deployment.yaml [default: true]
	#[arg(long, num_args = 0..=1, default_missing_value = "true")]
	pub deploy_deployment: Option<bool>,

	/// Deploy service.yaml [default: false]
	#[arg(long, num_args = 0..=1, default_missing_value = "true")]
	pub deploy_service: Option<bool>,

	/// Deploy ingress.yaml [default: false]
	#[arg(long, num_args = 0..=1, default_missing_value = "true")]
	pub deploy_ingress: Option<bool>,
}

impl ApplyArgs {
	fn as_config(&self) -> DeployConfig {
		DeployConfig {
			deploy: DeployToggles {
				deployment: self.deploy_deployment,
				service: self.deploy_service,
				ingress: self.deploy_ingress,
			},
			..self.connection.as_config()
		}
	}
}

/// Run the apply command.
pub fn run<W: Write>(args: ApplyArgs, writer: W) -> Result<()> {
	// Reconciliation is sequential; one thread is all it needs.
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime.block_on(run_async(
		args,
		writer,
		std::env::var_os(KUBECONFIG_ENV),
		dirs::home_dir(),
	))
}

async fn run_async<W: Write>(
	args: ApplyArgs,
	mut writer: W,
	env: Option<OsString>,
	home: Option<PathBuf>,
) -> Result<()> {
	let config = DeployConfig::load_from_directory(&args.path)?
		.unwrap_or_default()
		.merged_with(args.as_config());
	tracing::debug!(?config, "resolved configuration");

	let which = config.enabled_kinds();
	if which.is_empty() {
		tracing::warn!("nothing enabled for deployment, only connecting");
	}

	let manifests = Manifests::from_dir(&args.path);
	let outcomes = deploy::run(&config.connect_params(), env, home, &which, &manifests)
		.await
		.context("deploying to Kubernetes cluster")?;

	for outcome in &outcomes {
		write_outcome(&mut writer, outcome)?;
	}
	Ok(())
}

fn write_outcome<W: Write>(writer: &mut W, outcome: &ReconciliationOutcome) -> Result<()> {
	let resource = &outcome.resource;
	writeln!(
		writer,
		"{} {} {}/{}",
		outcome.action,
		resource.kind(),
		resource.namespace(),
		resource.name()
	)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use k8s_mock::HttpMockK8sServer;

	use super::*;
	use crate::{
		commands::args::ConnectionArgs,
		deploy::{DeployError, ErrorCategory},
	};

	fn nothing_enabled(path: PathBuf, connection: ConnectionArgs) -> ApplyArgs {
		ApplyArgs {
			path,
			connection,
			deploy_deployment: Some(false),
			deploy_service: None,
			deploy_ingress: None,
		}
	}

	fn category(err: &anyhow::Error) -> Option<ErrorCategory> {
		err.downcast_ref::<DeployError>().map(DeployError::category)
	}

	#[tokio::test]
	async fn test_nothing_enabled_still_loads_kubeconfig() {
		let dir = tempfile::tempdir().unwrap();
		let args = nothing_enabled(
			dir.path().to_path_buf(),
			ConnectionArgs {
				kubeconfig: Some(dir.path().join("missing")),
				..Default::default()
			},
		);

		let err = run_async(args, Vec::new(), None, None).await.unwrap_err();

		assert_eq!(category(&err), Some(ErrorCategory::Config));
	}

	#[tokio::test]
	async fn test_nothing_enabled_still_checks_connectivity() {
		let server = HttpMockK8sServer::builder()
			.system_pods(0)
			.build()
			.start()
			.await;
		let dir = tempfile::tempdir().unwrap();
		let kubeconfig = dir.path().join("config");
		std::fs::write(&kubeconfig, serde_json::to_string(&server.kubeconfig()).unwrap()).unwrap();

		let args = nothing_enabled(
			dir.path().to_path_buf(),
			ConnectionArgs {
				kubeconfig: Some(kubeconfig),
				..Default::default()
			},
		);
		let err = run_async(args, Vec::new(), None, None).await.unwrap_err();

		assert_eq!(category(&err), Some(ErrorCategory::Connectivity));
		assert_eq!(server.requests().await.len(), 1);
	}

	#[tokio::test]
	async fn test_connectivity_reported_before_missing_manifest() {
		let server = HttpMockK8sServer::builder()
			.system_pods(0)
			.build()
			.start()
			.await;
		let dir = tempfile::tempdir().unwrap();
		let kubeconfig = dir.path().join("config");
		std::fs::write(&kubeconfig, serde_json::to_string(&server.kubeconfig()).unwrap()).unwrap();

		// deployment.yaml is enabled by default but was never written.
		let args = ApplyArgs {
			deploy_deployment: None,
			..nothing_enabled(
				dir.path().to_path_buf(),
				ConnectionArgs {
					kubeconfig: Some(kubeconfig),
					..Default::default()
				},
			)
		};
		let err = run_async(args, Vec::new(), None, None).await.unwrap_err();

		assert_eq!(category(&err), Some(ErrorCategory::Connectivity));
	}

	#[tokio::test]
	async fn test_outcomes_are_written_one_per_line() {
		let server = HttpMockK8sServer::builder().build().start().await;
		let dir = tempfile::tempdir().unwrap();
		let kubeconfig = dir.path().join("config");
		std::fs::write(&kubeconfig, serde_json::to_string(&server.kubeconfig()).unwrap()).unwrap();
		std::fs::write(
			dir.path().join("deployment.yaml"),
			"apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: foo\n  namespace: thisisanamespace\n",
		)
		.unwrap();

		let args = ApplyArgs {
			deploy_deployment: None,
			..nothing_enabled(
				dir.path().to_path_buf(),
				ConnectionArgs {
					kubeconfig: Some(kubeconfig),
					..Default::default()
				},
			)
		};
		let mut output = Vec::new();
		run_async(args, &mut output, None, None).await.unwrap();

		assert_eq!(
			String::from_utf8(output).unwrap(),
			"created deployment thisisanamespace/foo\n"
		);
	}
}
