//! Kubernetes reconciliation for the three managed resource kinds.
//!
//! Every call here takes an explicit [`client::ClusterConnection`]; nothing
//! reads a process-wide default client.

use std::fmt;

use thiserror::Error;

pub mod client;
pub mod kind;
pub mod manifest;
pub mod oracle;
pub mod reconcile;

/// Remote call attempted against the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiAction {
	List,
	Create,
	Replace,
	Delete,
}

impl fmt::Display for ApiAction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiAction::List => write!(f, "list"),
			ApiAction::Create => write!(f, "create"),
			ApiAction::Replace => write!(f, "replace"),
			ApiAction::Delete => write!(f, "delete"),
		}
	}
}

/// A remote call failed. Never retried.
#[derive(Debug, Error)]
#[error("{action} {kind} `{name}` in namespace `{namespace}`")]
pub struct ApiError {
	pub action: ApiAction,
	pub kind: kind::ResourceKind,
	pub namespace: String,
	pub name: String,
	#[source]
	pub source: Box<kube::Error>,
}

impl ApiError {
	pub(crate) fn new(
		action: ApiAction,
		kind: kind::ResourceKind,
		namespace: &str,
		name: &str,
		source: kube::Error,
	) -> Self {
		Self {
			action,
			kind,
			namespace: namespace.to_string(),
			name: name.to_string(),
			source: Box::new(source),
		}
	}

	/// HTTP status reported by the API server, if the call got that far.
	pub fn status_code(&self) -> Option<u16> {
		match self.source.as_ref() {
			kube::Error::Api(status) => Some(status.code),
			_ => None,
		}
	}
}
