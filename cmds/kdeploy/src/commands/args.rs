//! Arguments shared by every command.

use std::path::PathBuf;

use clap::Args;
use tracing::Level;

use crate::config::DeployConfig;

#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
	/// Location of the kubeconfig file. `$KUBECONFIG` takes precedence. Defaults to ~/.kube/config
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubernetes context to use to connect to the server
	#[arg(long)]
	pub context: Option<String>,

	/// Check the connection by listing pods in kube-system before deploying [default: true]
	#[arg(long, num_args = 0..=1, default_missing_value = "true")]
	pub check_connection: Option<bool>,

	/// Log level (trace, debug, info, warn, error). Falls back to RUST_LOG
	#[arg(long)]
	pub log_level: Option<Level>,

	/// Log every request and response exchanged with the API server
	#[arg(short, long)]
	pub verbose: bool,
}

impl ConnectionArgs {
	/// The flags that were given, as a config overlay.
	pub fn as_config(&self) -> DeployConfig {
		DeployConfig {
			kubeconfig: self.kubeconfig.clone(),
			context: self.context.clone(),
			check_connection: self.check_connection,
			..Default::default()
		}
	}
}
