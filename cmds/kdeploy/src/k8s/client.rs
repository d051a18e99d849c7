//! Kubernetes cluster connection management.

use std::{
	ffi::OsString,
	fmt,
	path::{Path, PathBuf},
	time::Duration,
};

use k8s_openapi::api::core::v1::Pod;
use kube::{
	api::{Api, ListParams},
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Environment variable overriding every other kubeconfig location.
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Namespace listed by the connectivity probe.
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Upper bound on the connectivity probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(90);

/// The kubeconfig could not be loaded or does not describe a usable cluster.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("no home directory to look up the default kubeconfig in")]
	NoHomeDirectory,

	#[error("reading kubeconfig {}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: KubeconfigError,
	},

	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error("loading cluster configuration from kubeconfig")]
	Kubeconfig(#[source] KubeconfigError),

	#[error("building Kubernetes client")]
	Client(#[source] kube::Error),
}

/// The cluster did not prove reachable. No mutating call has been made.
#[derive(Debug, Error)]
pub enum ConnectivityError {
	#[error("unable to verify connection to the cluster: no pods found in namespace `{namespace}`")]
	NoSystemPods { namespace: &'static str },

	#[error("unable to verify connection to the cluster: listing pods in `{namespace}` failed")]
	Probe {
		namespace: &'static str,
		#[source]
		source: kube::Error,
	},

	#[error(
		"unable to verify connection to the cluster: listing pods in `{namespace}` took longer than {}s",
		.timeout.as_secs()
	)]
	TimedOut {
		namespace: &'static str,
		timeout: Duration,
	},
}

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Connectivity(#[from] ConnectivityError),
}

/// What to connect to and whether to prove it is reachable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
	/// Explicit kubeconfig path. Loses to `$KUBECONFIG`.
	pub kubeconfig: Option<PathBuf>,
	/// Context to select instead of the kubeconfig's current context.
	pub context: Option<String>,
	/// List pods in [`SYSTEM_NAMESPACE`] before returning the connection.
	pub verify_connectivity: bool,
}

/// Where the kubeconfig is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeconfigSource {
	/// `$KUBECONFIG`, possibly several paths joined by the platform separator.
	Env(OsString),
	Explicit(PathBuf),
	/// `~/.kube/config`.
	Default(PathBuf),
}

impl fmt::Display for KubeconfigSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			KubeconfigSource::Env(value) => {
				write!(f, "${KUBECONFIG_ENV} ({})", value.to_string_lossy())
			}
			KubeconfigSource::Explicit(path) | KubeconfigSource::Default(path) => {
				write!(f, "{}", path.display())
			}
		}
	}
}

impl KubeconfigSource {
	/// Read and, for `$KUBECONFIG` lists, merge the kubeconfig files.
	pub fn load(&self) -> Result<Kubeconfig, ConfigError> {
		match self {
			KubeconfigSource::Env(value) => std::env::split_paths(value)
				.filter(|path| !path.as_os_str().is_empty())
				.try_fold(Kubeconfig::default(), |merged, path| {
					let next = read_kubeconfig(&path)?;
					merged.merge(next).map_err(ConfigError::Kubeconfig)
				}),
			KubeconfigSource::Explicit(path) | KubeconfigSource::Default(path) => {
				read_kubeconfig(path)
			}
		}
	}
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig, ConfigError> {
	Kubeconfig::read_from(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})
}

/// Pick the kubeconfig location: `$KUBECONFIG`, then the explicit path,
/// then `~/.kube/config`. An empty `$KUBECONFIG` counts as unset.
pub fn resolve_kubeconfig_source(
	env: Option<OsString>,
	explicit: Option<&Path>,
	home: Option<PathBuf>,
) -> Result<KubeconfigSource, ConfigError> {
	if let Some(value) = env.filter(|v| !v.is_empty()) {
		return Ok(KubeconfigSource::Env(value));
	}
	if let Some(path) = explicit {
		return Ok(KubeconfigSource::Explicit(path.to_path_buf()));
	}
	let home = home.ok_or(ConfigError::NoHomeDirectory)?;
	Ok(KubeconfigSource::Default(home.join(".kube").join("config")))
}

/// Represents a connection to a Kubernetes cluster.
///
/// Created once per run and never mutated afterwards; every reconciliation
/// call receives it explicitly.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	/// Human-readable identifier for the cluster (API server URL and context).
	cluster_identifier: String,
}

impl fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using `$KUBECONFIG`, the explicit path, or `~/.kube/config`.
	#[instrument(skip_all)]
	pub async fn connect(params: &ConnectParams) -> Result<Self, ConnectionError> {
		Self::connect_with(params, std::env::var_os(KUBECONFIG_ENV), dirs::home_dir()).await
	}

	/// Like [`connect`](Self::connect) with the environment lookups supplied
	/// by the caller.
	#[instrument(skip_all)]
	pub async fn connect_with(
		params: &ConnectParams,
		env: Option<OsString>,
		home: Option<PathBuf>,
	) -> Result<Self, ConnectionError> {
		let source = resolve_kubeconfig_source(env, params.kubeconfig.as_deref(), home)?;
		tracing::info!(location = %source, "loading kubeconfig");

		let kubeconfig = source.load()?;
		Self::from_kubeconfig(
			kubeconfig,
			params.context.as_deref(),
			params.verify_connectivity,
		)
		.await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip(kubeconfig))]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
		verify_connectivity: bool,
	) -> Result<Self, ConnectionError> {
		if let Some(name) = context {
			if !kubeconfig.contexts.iter().any(|c| c.name == name) {
				return Err(ConfigError::ContextNotFound(name.to_string()).into());
			}
			tracing::info!(context = %name, "selecting context");
		}

		let config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: context.map(str::to_string),
				..Default::default()
			},
		)
		.await
		.map_err(ConfigError::Kubeconfig)?;

		let cluster_identifier = match context {
			Some(name) => format!("{}  (context:{})", config.cluster_url, name),
			None => config.cluster_url.to_string(),
		};
		let client = Client::try_from(config).map_err(ConfigError::Client)?;

		let connection = Self {
			client,
			cluster_identifier,
		};

		if verify_connectivity {
			tracing::debug!("checking connection to cluster");
			connection.verify().await?;
		}

		tracing::debug!(cluster = %connection.cluster_identifier, "cluster connection ready");
		Ok(connection)
	}

	/// List pods in [`SYSTEM_NAMESPACE`]; any pod is proof the cluster is
	/// reachable. Returns the number of pods seen.
	pub async fn verify(&self) -> Result<usize, ConnectivityError> {
		self.verify_within(PROBE_TIMEOUT).await
	}

	/// [`verify`](Self::verify) with a caller-chosen bound on the list call.
	#[instrument(skip(self), fields(cluster = %self.cluster_identifier))]
	pub async fn verify_within(&self, timeout: Duration) -> Result<usize, ConnectivityError> {
		let pods: Api<Pod> = Api::namespaced(self.client.clone(), SYSTEM_NAMESPACE);
		let list = tokio::time::timeout(timeout, pods.list(&ListParams::default()))
			.await
			.map_err(|_| ConnectivityError::TimedOut {
				namespace: SYSTEM_NAMESPACE,
				timeout,
			})?
			.map_err(|source| ConnectivityError::Probe {
				namespace: SYSTEM_NAMESPACE,
				source,
			})?;

		let count = list.items.len();
		tracing::info!(pods = count, namespace = SYSTEM_NAMESPACE, "connection check");

		if count == 0 {
			return Err(ConnectivityError::NoSystemPods {
				namespace: SYSTEM_NAMESPACE,
			});
		}
		Ok(count)
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the cluster identifier (API server URL and context name).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_env_wins_over_explicit_path() {
		let source = resolve_kubeconfig_source(
			Some(OsString::from("/env/config")),
			Some(Path::new("/explicit/config")),
			Some(PathBuf::from("/home/user")),
		)
		.unwrap();
		assert_eq!(source, KubeconfigSource::Env(OsString::from("/env/config")));
	}

	#[test]
	fn test_explicit_path_wins_over_default() {
		let source = resolve_kubeconfig_source(
			None,
			Some(Path::new("/explicit/config")),
			Some(PathBuf::from("/home/user")),
		)
		.unwrap();
		assert_eq!(
			source,
			KubeconfigSource::Explicit(PathBuf::from("/explicit/config"))
		);
	}

	#[test]
	fn test_empty_env_is_ignored() {
		let source =
			resolve_kubeconfig_source(Some(OsString::new()), None, Some(PathBuf::from("/home/user")))
				.unwrap();
		assert_eq!(
			source,
			KubeconfigSource::Default(PathBuf::from("/home/user/.kube/config"))
		);
	}

	#[test]
	fn test_no_home_directory() {
		let result = resolve_kubeconfig_source(None, None, None);
		assert_matches!(result, Err(ConfigError::NoHomeDirectory));
	}

	#[test]
	fn test_missing_file_is_config_error() {
		let source = KubeconfigSource::Explicit(PathBuf::from("/nonexistent/kubeconfig"));
		assert_matches!(
			source.load(),
			Err(ConfigError::Read { path, .. }) if path == Path::new("/nonexistent/kubeconfig")
		);
	}

	#[tokio::test]
	async fn test_connect_context_not_found() {
		let result =
			ClusterConnection::from_kubeconfig(Kubeconfig::default(), Some("nonexistent"), true)
				.await;
		assert_matches!(
			result,
			Err(ConnectionError::Config(ConfigError::ContextNotFound(name))) if name == "nonexistent"
		);
	}

	#[tokio::test]
	async fn test_connect_without_current_context_errors() {
		let result = ClusterConnection::from_kubeconfig(Kubeconfig::default(), None, false).await;
		assert_matches!(
			result,
			Err(ConnectionError::Config(ConfigError::Kubeconfig(_)))
		);
	}
}
