//! Existence checks against the cluster.

use tracing::instrument;

use super::{client::ClusterConnection, kind::ResourceKind, ApiAction, ApiError};

/// What the cluster holds for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
	Absent,
	Present,
	/// More than one object matched the name filter. Treated as existing so a
	/// blind create is never attempted.
	Duplicated(usize),
}

impl Presence {
	pub fn from_count(count: usize) -> Self {
		match count {
			0 => Presence::Absent,
			1 => Presence::Present,
			n => Presence::Duplicated(n),
		}
	}
}

/// Number of `kind` objects named `name` in `namespace`.
#[instrument(skip(connection))]
pub async fn count(
	connection: &ClusterConnection,
	kind: ResourceKind,
	name: &str,
	namespace: &str,
) -> Result<usize, ApiError> {
	let list = kind
		.api(connection, namespace)
		.list_named(name)
		.await
		.map_err(|e| ApiError::new(ApiAction::List, kind, namespace, name, e))?;

	let found = list.items.len();
	tracing::info!(found, "found {found} {kind} `{name}` in namespace `{namespace}`");
	Ok(found)
}

/// Count and classify in one step.
pub async fn presence(
	connection: &ClusterConnection,
	kind: ResourceKind,
	name: &str,
	namespace: &str,
) -> Result<Presence, ApiError> {
	let presence = Presence::from_count(count(connection, kind, name, namespace).await?);
	if let Presence::Duplicated(n) = presence {
		tracing::warn!(%kind, namespace, name, matches = n, "name filter matched more than one object");
	}
	Ok(presence)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_presence_from_count() {
		assert_eq!(Presence::from_count(0), Presence::Absent);
		assert_eq!(Presence::from_count(1), Presence::Present);
		assert_eq!(Presence::from_count(3), Presence::Duplicated(3));
	}
}
