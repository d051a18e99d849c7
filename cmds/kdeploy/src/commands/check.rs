//! Check command handler.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;

use super::args::ConnectionArgs;
use crate::{
	config::DeployConfig,
	deploy::DeployError,
	k8s::client::{ClusterConnection, ConnectionError},
};

#[derive(Args)]
pub struct CheckArgs {
	#[command(flatten)]
	pub connection: ConnectionArgs,
}

/// Run the check command.
pub fn run<W: Write>(args: CheckArgs, mut writer: W) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	let mut params = DeployConfig::default()
		.merged_with(args.connection.as_config())
		.connect_params();
	params.verify_connectivity = false;

	runtime.block_on(async {
		let connection = ClusterConnection::connect(&params)
			.await
			.map_err(DeployError::from)
			.context("connecting to Kubernetes cluster")?;
		let pods = connection
			.verify()
			.await
			.map_err(|e| DeployError::from(ConnectionError::from(e)))
			.context("checking connection to cluster")?;
		writeln!(
			writer,
			"{}: reachable, {pods} pods in kube-system",
			connection.cluster_identifier()
		)?;
		Ok::<_, anyhow::Error>(())
	})
}
