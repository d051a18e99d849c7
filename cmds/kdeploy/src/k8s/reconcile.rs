//! Create / replace / delete-then-create policy per resource kind.
//!
//! | Kind           | Absent | Present                    |
//! |----------------|--------|----------------------------|
//! | Workload       | create | replace                    |
//! | NetworkService | create | delete (90s grace), create |
//! | ExternalRoute  | create | replace                    |
//!
//! Presence always comes from the existence oracle; a conflict on create is
//! an error, never a hint that the object exists.

use std::fmt;

use tracing::instrument;

use super::{
	client::ClusterConnection,
	kind::{ResourceKind, UpdatePolicy},
	manifest::ManagedResource,
	oracle::{self, Presence},
	ApiAction, ApiError,
};

/// Mutating sequence chosen for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
	Create,
	Replace,
	DeleteThenCreate,
}

/// What reconciliation did to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	Created,
	Replaced,
	DeletedThenCreated,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Action::Created => write!(f, "created"),
			Action::Replaced => write!(f, "replaced"),
			Action::DeletedThenCreated => write!(f, "recreated"),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ReconciliationOutcome {
	pub resource: ManagedResource,
	pub action: Action,
}

/// The policy table.
pub fn plan(kind: ResourceKind, presence: Presence) -> Plan {
	match (presence, kind.update_policy()) {
		(Presence::Absent, _) => Plan::Create,
		(Presence::Present | Presence::Duplicated(_), UpdatePolicy::Replace) => Plan::Replace,
		(Presence::Present | Presence::Duplicated(_), UpdatePolicy::Recreate) => {
			Plan::DeleteThenCreate
		}
	}
}

/// Bring one resource to its manifest's state.
#[instrument(skip_all, fields(
	kind = %resource.kind(),
	namespace = resource.namespace(),
	name = resource.name(),
))]
pub async fn reconcile(
	connection: &ClusterConnection,
	resource: ManagedResource,
) -> Result<ReconciliationOutcome, ApiError> {
	let kind = resource.kind();
	let name = resource.name();
	let namespace = resource.namespace();

	let presence = oracle::presence(connection, kind, name, namespace).await?;
	let plan = plan(kind, presence);
	tracing::debug!(?presence, ?plan, "reconciling");

	let api = kind.api(connection, namespace);
	let failed =
		|action: ApiAction, e: kube::Error| ApiError::new(action, kind, namespace, name, e);

	let action = match plan {
		Plan::Create => {
			api.create(resource.manifest())
				.await
				.map_err(|e| failed(ApiAction::Create, e))?;
			Action::Created
		}
		Plan::Replace => {
			api.replace(name, resource.manifest())
				.await
				.map_err(|e| failed(ApiAction::Replace, e))?;
			Action::Replaced
		}
		Plan::DeleteThenCreate => {
			tracing::info!("deleting {kind} `{name}` before recreating it");
			api.delete(name).await.map_err(|e| failed(ApiAction::Delete, e))?;
			api.create(resource.manifest())
				.await
				.map_err(|e| failed(ApiAction::Create, e))?;
			Action::DeletedThenCreated
		}
	};

	tracing::info!(%action, "{kind} `{name}` @ namespace `{namespace}`");
	Ok(ReconciliationOutcome { resource, action })
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case(ResourceKind::Workload, Presence::Absent, Plan::Create)]
	#[case(ResourceKind::Workload, Presence::Present, Plan::Replace)]
	#[case(ResourceKind::NetworkService, Presence::Absent, Plan::Create)]
	#[case(ResourceKind::NetworkService, Presence::Present, Plan::DeleteThenCreate)]
	#[case(ResourceKind::ExternalRoute, Presence::Absent, Plan::Create)]
	#[case(ResourceKind::ExternalRoute, Presence::Present, Plan::Replace)]
	fn test_policy_table(
		#[case] kind: ResourceKind,
		#[case] presence: Presence,
		#[case] expected: Plan,
	) {
		assert_eq!(plan(kind, presence), expected);
	}

	#[rstest]
	#[case(ResourceKind::Workload, Plan::Replace)]
	#[case(ResourceKind::NetworkService, Plan::DeleteThenCreate)]
	#[case(ResourceKind::ExternalRoute, Plan::Replace)]
	fn test_duplicates_never_create(#[case] kind: ResourceKind, #[case] expected: Plan) {
		assert_eq!(plan(kind, Presence::Duplicated(2)), expected);
	}
}
