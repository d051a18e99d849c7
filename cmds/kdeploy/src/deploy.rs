//! Deployment orchestration: connect once, then reconcile the enabled kinds
//! in dependency order, stopping at the first failure.

use std::{
	borrow::Cow,
	collections::{BTreeSet, HashMap},
	ffi::OsString,
	path::PathBuf,
};

use thiserror::Error;
use tracing::instrument;

use crate::k8s::{
	client::{ClusterConnection, ConnectParams, ConnectionError},
	kind::ResourceKind,
	manifest::{locate, ManifestError},
	reconcile::{reconcile, ReconciliationOutcome},
	ApiError,
};

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum DeployError {
	#[error(transparent)]
	Connection(#[from] ConnectionError),

	#[error(transparent)]
	Manifest(#[from] ManifestError),

	#[error(transparent)]
	Api(#[from] ApiError),
}

/// Error taxonomy bucket, for callers deciding how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
	Config,
	Connectivity,
	MalformedManifest,
	Api,
}

impl DeployError {
	pub fn category(&self) -> ErrorCategory {
		match self {
			DeployError::Connection(ConnectionError::Config(_)) => ErrorCategory::Config,
			DeployError::Connection(ConnectionError::Connectivity(_)) => {
				ErrorCategory::Connectivity
			}
			DeployError::Manifest(_) => ErrorCategory::MalformedManifest,
			DeployError::Api(_) => ErrorCategory::Api,
		}
	}
}

impl ErrorCategory {
	/// Process exit status reported for a run that failed this way.
	pub fn exit_code(self) -> u8 {
		match self {
			ErrorCategory::Config => 2,
			ErrorCategory::Connectivity => 3,
			ErrorCategory::MalformedManifest => 4,
			ErrorCategory::Api => 5,
		}
	}
}

/// Rendered manifest text, keyed by the role it is deployed as.
///
/// Kinds without inline text are read from the manifest directory, if one is
/// set, when the orchestrator reaches them.
#[derive(Debug, Clone, Default)]
pub struct Manifests {
	by_kind: HashMap<ResourceKind, String>,
	dir: Option<PathBuf>,
}

impl Manifests {
	pub fn new() -> Self {
		Self::default()
	}

	/// Read each kind's [`manifest_file`](ResourceKind::manifest_file) from
	/// `dir` on demand.
	pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
		Self {
			by_kind: HashMap::new(),
			dir: Some(dir.into()),
		}
	}

	/// Builder-style method to add a manifest.
	pub fn with(mut self, kind: ResourceKind, text: impl Into<String>) -> Self {
		self.insert(kind, text);
		self
	}

	pub fn insert(&mut self, kind: ResourceKind, text: impl Into<String>) {
		self.by_kind.insert(kind, text.into());
	}

	/// Manifest text for `kind`, read from disk unless given inline.
	pub fn text(&self, kind: ResourceKind) -> Result<Cow<'_, str>, ManifestError> {
		if let Some(text) = self.by_kind.get(&kind) {
			return Ok(Cow::Borrowed(text));
		}
		let dir = self.dir.as_deref().ok_or(ManifestError::Missing(kind))?;
		let path = dir.join(kind.manifest_file());
		tracing::debug!(%kind, path = %path.display(), "reading manifest");
		std::fs::read_to_string(&path)
			.map(Cow::Owned)
			.map_err(|source| ManifestError::Read { kind, path, source })
	}
}

/// Connect (verifying connectivity if requested) and reconcile every kind in
/// `which`.
///
/// `env` is the value of `$KUBECONFIG` and `home` the directory holding the
/// default `.kube/config`. Config and connectivity failures are reported
/// before any manifest is read.
#[instrument(skip_all)]
pub async fn run(
	params: &ConnectParams,
	env: Option<OsString>,
	home: Option<PathBuf>,
	which: &BTreeSet<ResourceKind>,
	manifests: &Manifests,
) -> Result<Vec<ReconciliationOutcome>, DeployError> {
	let connection = ClusterConnection::connect_with(params, env, home).await?;
	run_with_connection(&connection, which, manifests).await
}

/// Reconcile every kind in `which` over an established connection.
///
/// Kinds are processed Workload, NetworkService, ExternalRoute regardless of
/// how `which` and `manifests` were assembled. Outcomes produced before a
/// failure are not rolled back.
#[instrument(skip_all, fields(cluster = %connection.cluster_identifier()))]
pub async fn run_with_connection(
	connection: &ClusterConnection,
	which: &BTreeSet<ResourceKind>,
	manifests: &Manifests,
) -> Result<Vec<ReconciliationOutcome>, DeployError> {
	let mut outcomes = Vec::with_capacity(which.len());

	for kind in ResourceKind::ORDERED
		.into_iter()
		.filter(|kind| which.contains(kind))
	{
		let text = manifests.text(kind)?;
		let resource = locate(kind, &text)?;
		outcomes.push(reconcile(connection, resource).await?);
	}

	tracing::info!(reconciled = outcomes.len(), "deployment finished");
	Ok(outcomes)
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;
	use crate::k8s::client::ConfigError;

	#[test]
	fn test_text_reads_manifest_file() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("deployment.yaml"), "kind: Deployment").unwrap();

		let manifests = Manifests::from_dir(dir.path());

		assert_eq!(
			manifests.text(ResourceKind::Workload).unwrap(),
			"kind: Deployment"
		);
	}

	#[test]
	fn test_inline_text_wins_over_dir() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("ingress.yaml"), "from: file").unwrap();

		let manifests =
			Manifests::from_dir(dir.path()).with(ResourceKind::ExternalRoute, "from: inline");

		assert_eq!(
			manifests.text(ResourceKind::ExternalRoute).unwrap(),
			"from: inline"
		);
	}

	#[test]
	fn test_text_missing_file() {
		let dir = tempfile::tempdir().unwrap();

		assert_matches!(
			Manifests::from_dir(dir.path()).text(ResourceKind::NetworkService),
			Err(ManifestError::Read { kind: ResourceKind::NetworkService, path, .. })
				if path.ends_with("service.yaml")
		);
	}

	#[test]
	fn test_text_without_dir() {
		assert_matches!(
			Manifests::new().text(ResourceKind::Workload),
			Err(ManifestError::Missing(ResourceKind::Workload))
		);
	}

	#[test]
	fn test_error_categories() {
		let config = DeployError::Connection(ConfigError::NoHomeDirectory.into());
		assert_eq!(config.category(), ErrorCategory::Config);

		let manifest: DeployError = ManifestError::Missing(ResourceKind::Workload).into();
		assert_eq!(manifest.category(), ErrorCategory::MalformedManifest);
	}

	#[test]
	fn test_exit_codes_are_distinct() {
		let codes: BTreeSet<u8> = [
			ErrorCategory::Config,
			ErrorCategory::Connectivity,
			ErrorCategory::MalformedManifest,
			ErrorCategory::Api,
		]
		.into_iter()
		.map(ErrorCategory::exit_code)
		.collect();

		assert_eq!(codes.len(), 4);
		assert!(!codes.contains(&0) && !codes.contains(&1));
	}
}
