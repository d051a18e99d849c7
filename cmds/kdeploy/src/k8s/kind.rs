//! The closed set of resource kinds and the remote operations each supports.

use std::fmt;

use k8s_openapi::api::{apps::v1::Deployment, core::v1::Service, networking::v1::Ingress};
use kube::{
	api::{Api, DeleteParams, DynamicObject, ListParams, ObjectList, PostParams},
	discovery::ApiResource,
};
use serde::{Deserialize, Serialize};

use super::client::ClusterConnection;

/// Grace period handed to the API server when deleting a resource.
pub const DELETE_GRACE_PERIOD_SECS: u32 = 90;

/// Role a manifest plays in a deployment.
///
/// Variant order is the reconciliation order: the service selects the
/// workload's pods and the ingress routes to the service by name.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
	/// `apps/v1` Deployment.
	Workload,
	/// `v1` Service.
	NetworkService,
	/// `networking.k8s.io/v1` Ingress.
	ExternalRoute,
}

/// How an existing resource is brought to the manifest's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
	/// Full-object overwrite through `PUT`.
	Replace,
	/// Delete, then create from the manifest. Accepts a short unavailability
	/// window because the service's identity-bearing fields cannot be
	/// overwritten in place.
	Recreate,
}

impl ResourceKind {
	pub const ORDERED: [ResourceKind; 3] = [
		ResourceKind::Workload,
		ResourceKind::NetworkService,
		ResourceKind::ExternalRoute,
	];

	/// File the rendered manifest for this role is read from.
	pub fn manifest_file(self) -> &'static str {
		match self {
			ResourceKind::Workload => "deployment.yaml",
			ResourceKind::NetworkService => "service.yaml",
			ResourceKind::ExternalRoute => "ingress.yaml",
		}
	}

	/// Kubernetes `kind` expected in the manifest.
	pub fn object_kind(self) -> &'static str {
		match self {
			ResourceKind::Workload => "Deployment",
			ResourceKind::NetworkService => "Service",
			ResourceKind::ExternalRoute => "Ingress",
		}
	}

	pub fn api_resource(self) -> ApiResource {
		match self {
			ResourceKind::Workload => ApiResource::erase::<Deployment>(&()),
			ResourceKind::NetworkService => ApiResource::erase::<Service>(&()),
			ResourceKind::ExternalRoute => ApiResource::erase::<Ingress>(&()),
		}
	}

	pub fn update_policy(self) -> UpdatePolicy {
		match self {
			ResourceKind::Workload | ResourceKind::ExternalRoute => UpdatePolicy::Replace,
			ResourceKind::NetworkService => UpdatePolicy::Recreate,
		}
	}

	/// Bind this kind's operations to a namespace on the given connection.
	pub fn api(self, connection: &ClusterConnection, namespace: &str) -> KindApi {
		KindApi {
			api: Api::namespaced_with(
				connection.client().clone(),
				namespace,
				&self.api_resource(),
			),
		}
	}
}

impl fmt::Display for ResourceKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ResourceKind::Workload => write!(f, "deployment"),
			ResourceKind::NetworkService => write!(f, "service"),
			ResourceKind::ExternalRoute => write!(f, "ingress"),
		}
	}
}

/// List, create, replace and delete for one kind within one namespace.
pub struct KindApi {
	api: Api<DynamicObject>,
}

impl KindApi {
	/// List objects whose `metadata.name` equals `name`.
	pub async fn list_named(&self, name: &str) -> kube::Result<ObjectList<DynamicObject>> {
		let params = ListParams::default().fields(&format!("metadata.name={name}"));
		self.api.list(&params).await
	}

	pub async fn create(&self, object: &DynamicObject) -> kube::Result<DynamicObject> {
		self.api.create(&PostParams::default(), object).await
	}

	pub async fn replace(&self, name: &str, object: &DynamicObject) -> kube::Result<DynamicObject> {
		self.api.replace(name, &PostParams::default(), object).await
	}

	/// Delete with [`DELETE_GRACE_PERIOD_SECS`] grace period.
	pub async fn delete(&self, name: &str) -> kube::Result<()> {
		let params = DeleteParams::default().grace_period(DELETE_GRACE_PERIOD_SECS);
		self.api.delete(name, &params).await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_ordered_matches_variant_order() {
		let mut sorted = ResourceKind::ORDERED;
		sorted.sort();
		assert_eq!(sorted, ResourceKind::ORDERED);
	}

	#[test]
	fn test_api_resources() {
		let workload = ResourceKind::Workload.api_resource();
		assert_eq!(workload.api_version, "apps/v1");
		assert_eq!(workload.plural, "deployments");

		let service = ResourceKind::NetworkService.api_resource();
		assert_eq!(service.api_version, "v1");
		assert_eq!(service.plural, "services");

		let route = ResourceKind::ExternalRoute.api_resource();
		assert_eq!(route.api_version, "networking.k8s.io/v1");
		assert_eq!(route.plural, "ingresses");
	}

	#[test]
	fn test_only_service_is_recreated() {
		assert_eq!(ResourceKind::Workload.update_policy(), UpdatePolicy::Replace);
		assert_eq!(
			ResourceKind::NetworkService.update_policy(),
			UpdatePolicy::Recreate
		);
		assert_eq!(
			ResourceKind::ExternalRoute.update_policy(),
			UpdatePolicy::Replace
		);
	}
}
