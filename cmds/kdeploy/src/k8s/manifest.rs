//! Identity extraction from rendered manifests.

use std::path::PathBuf;

use kube::api::DynamicObject;
use serde_json::Value;
use thiserror::Error;

use super::kind::ResourceKind;

/// A manifest that cannot be reconciled.
#[derive(Debug, Error)]
pub enum ManifestError {
	#[error("no {0} manifest was supplied")]
	Missing(ResourceKind),

	#[error("reading {kind} manifest {}", .path.display())]
	Read {
		kind: ResourceKind,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("parsing {kind} manifest")]
	Parse {
		kind: ResourceKind,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},

	#[error("{kind} manifest is missing metadata.{field}")]
	MissingField {
		kind: ResourceKind,
		field: &'static str,
	},

	#[error("{kind} manifest is not a Kubernetes object")]
	NotAnObject {
		kind: ResourceKind,
		#[source]
		source: serde_json::Error,
	},
}

/// A resource to reconcile. Identity is `(kind, namespace, name)`.
#[derive(Debug, Clone)]
pub struct ManagedResource {
	kind: ResourceKind,
	name: String,
	namespace: String,
	manifest: DynamicObject,
}

impl ManagedResource {
	pub fn kind(&self) -> ResourceKind {
		self.kind
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// The parsed manifest, sent as-is on create and replace.
	pub fn manifest(&self) -> &DynamicObject {
		&self.manifest
	}
}

/// Parse a rendered manifest and extract its identity.
///
/// The kind is the role the manifest was loaded for; the document's own
/// `kind` field is only checked for consistency.
pub fn locate(kind: ResourceKind, text: &str) -> Result<ManagedResource, ManifestError> {
	let value: Value = serde_yaml_with_quirks::from_str(text)
		.map_err(|source| ManifestError::Parse { kind, source })?;

	let name = metadata_string(&value, "name")
		.ok_or(ManifestError::MissingField { kind, field: "name" })?;
	let namespace = metadata_string(&value, "namespace").ok_or(ManifestError::MissingField {
		kind,
		field: "namespace",
	})?;

	match value.get("kind").and_then(Value::as_str) {
		Some(declared) if declared != kind.object_kind() => tracing::warn!(
			%kind,
			declared,
			expected = kind.object_kind(),
			"manifest kind does not match its role"
		),
		_ => {}
	}

	let manifest: DynamicObject =
		serde_json::from_value(value).map_err(|source| ManifestError::NotAnObject { kind, source })?;

	tracing::debug!(%kind, %namespace, %name, "located resource");
	Ok(ManagedResource {
		kind,
		name,
		namespace,
		manifest,
	})
}

fn metadata_string(value: &Value, field: &str) -> Option<String> {
	value
		.get("metadata")?
		.get(field)?
		.as_str()
		.filter(|s| !s.is_empty())
		.map(str::to_string)
}
