use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kdeploy::{commands, deploy::DeployError, telemetry};

#[derive(Parser)]
#[command(name = "kdeploy")]
#[command(about = "Deploy rendered Kubernetes manifests", long_about = None)]
#[command(version)]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Create or update the deployment, service and ingress in the cluster
	Apply(commands::apply::ApplyArgs),

	/// Verify the cluster is reachable
	Check(commands::check::CheckArgs),
}

impl Commands {
	fn connection(&self) -> &commands::args::ConnectionArgs {
		match self {
			Commands::Apply(args) => &args.connection,
			Commands::Check(args) => &args.connection,
		}
	}
}

/// Failures of a run exit with their category's status, anything else with 1.
fn exit_code(err: &anyhow::Error) -> ExitCode {
	match err.downcast_ref::<DeployError>() {
		Some(deploy) => ExitCode::from(deploy.category().exit_code()),
		None => ExitCode::FAILURE,
	}
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	let connection = cli.command.connection();
	let _telemetry = match telemetry::init(connection.log_level, connection.verbose) {
		Ok(guard) => guard,
		Err(e) => {
			eprintln!("Error: {e:?}");
			return ExitCode::FAILURE;
		}
	};

	let stdout = std::io::stdout();

	let result = match cli.command {
		Commands::Apply(args) => commands::apply::run(args, stdout),
		Commands::Check(args) => commands::check::run(args, stdout),
	};

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			tracing::error!(error = %e, "run failed");
			eprintln!("Error: {e:?}");
			exit_code(&e)
		}
	}
}
