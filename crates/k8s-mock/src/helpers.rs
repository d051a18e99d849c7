//! Path helpers for the mock Kubernetes API.

/// Kinds the mock knows how to store: (apiVersion, kind, plural, namespaced).
const KINDS: &[(&str, &str, &str, bool)] = &[
	("apps/v1", "Deployment", "deployments", true),
	("v1", "Service", "services", true),
	("networking.k8s.io/v1", "Ingress", "ingresses", true),
	("v1", "Pod", "pods", true),
	("v1", "Namespace", "namespaces", false),
];

/// Derive the (collection path, name) key for a manifest.
pub fn resource_key(manifest: &serde_json::Value) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?.to_string();
	let namespace = manifest
		.pointer("/metadata/namespace")
		.and_then(|n| n.as_str())
		.unwrap_or("default");

	let &(_, _, plural, namespaced) = KINDS
		.iter()
		.find(|(v, k, _, _)| *v == api_version && *k == kind)?;

	let prefix = if api_version.contains('/') {
		format!("/apis/{}", api_version)
	} else {
		format!("/api/{}", api_version)
	};
	let path = if namespaced {
		format!("{}/namespaces/{}/{}", prefix, namespace, plural)
	} else {
		format!("{}/{}", prefix, plural)
	};

	Some((path, name))
}

/// Whether a request path addresses a collection rather than a single object.
///
/// Only `<prefix>/<plural>` and `<prefix>/namespaces/<ns>/<plural>` are
/// collections; anything longer names an object, whatever the object is called.
pub fn is_collection(path: &str) -> bool {
	let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
	let rest = match segments.first() {
		Some(&"api") => segments.get(2..),
		Some(&"apis") => segments.get(3..),
		_ => None,
	};
	let plural = match rest {
		Some([plural]) | Some(["namespaces", _, plural]) => plural,
		_ => return false,
	};
	KINDS.iter().any(|(_, _, known, _)| known == plural)
}

/// Parse a Kubernetes API path into (collection path, resource name).
///
/// Examples:
/// - `/api/v1/namespaces/default/services/my-svc` -> (`/api/v1/namespaces/default/services`, `my-svc`)
/// - `/apis/apps/v1/namespaces/default/deployments/my-deploy` -> (`/apis/apps/v1/namespaces/default/deployments`, `my-deploy`)
pub fn split_resource_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => (collection.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

/// A `metav1.Status` failure body.
pub fn status(code: u16, reason: &str, message: &str) -> serde_json::Value {
	serde_json::json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	})
}

/// A `v1.List` body.
pub fn list(items: Vec<serde_json::Value>) -> serde_json::Value {
	serde_json::json!({
		"kind": "List",
		"apiVersion": "v1",
		"metadata": {"resourceVersion": "1"},
		"items": items
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_resource_key_namespaced_group() {
		let manifest = serde_json::json!({
			"apiVersion": "apps/v1",
			"kind": "Deployment",
			"metadata": {"name": "foo", "namespace": "ns"}
		});
		assert_eq!(
			resource_key(&manifest),
			Some((
				"/apis/apps/v1/namespaces/ns/deployments".to_string(),
				"foo".to_string()
			))
		);
	}

	#[test]
	fn test_resource_key_unknown_kind() {
		let manifest = serde_json::json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": "foo"}
		});
		assert_eq!(resource_key(&manifest), None);
	}

	#[test]
	fn test_is_collection() {
		assert!(is_collection("/api/v1/namespaces/kube-system/pods"));
		assert!(is_collection("/apis/networking.k8s.io/v1/namespaces/ns/ingresses"));
		assert!(!is_collection("/api/v1/namespaces/ns/services/foo-service"));
	}

	#[test]
	fn test_objects_named_like_collections() {
		assert!(!is_collection("/api/v1/namespaces/ns/services/services"));
		assert!(!is_collection("/api/v1/namespaces/kube-system/pods/pods"));
		assert!(!is_collection("/apis/apps/v1/namespaces/ns/deployments/deployments"));
		assert!(!is_collection("/api/v1/namespaces/pods"));
		assert!(is_collection("/api/v1/namespaces"));
	}
}
