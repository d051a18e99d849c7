//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections. Objects live in a shared map keyed by (collection path, name);
//! create, replace and delete mutate it the way the API server would.

use std::{
	collections::BTreeMap,
	sync::{Arc, RwLock},
	time::Duration,
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::helpers::{is_collection, list, resource_key, split_resource_path, status};

/// Type alias for the shared mutable resources map.
pub type SharedResources = Arc<RwLock<BTreeMap<(String, String), serde_json::Value>>>;

const API_PATHS: &str = r"^/api(s)?/.*";

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Objects present in the cluster at start.
	#[builder(default)]
	resources: Vec<serde_json::Value>,
	/// Pods reported in `kube-system`.
	#[builder(default = 1)]
	system_pods: usize,
	/// Answer every request with this HTTP method with a 500.
	#[builder(into)]
	reject_method: Option<String>,
	/// Repeat each match of a `metadata.name` field selector this many times.
	duplicate_matches: Option<usize>,
	/// Hold every GET response back this long.
	read_delay: Option<Duration>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
}

/// A request as received by the mock server.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
	pub body: Option<serde_json::Value>,
}

impl RecordedRequest {
	pub fn is_mutation(&self) -> bool {
		matches!(self.method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE")
	}
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "Started mock K8s server");

		let system_pods = (0..self.system_pods).map(|idx| {
			serde_json::json!({
				"apiVersion": "v1",
				"kind": "Pod",
				"metadata": {
					"name": format!("kube-proxy-{idx}"),
					"namespace": "kube-system"
				}
			})
		});

		let mut resources = BTreeMap::new();
		for manifest in self.resources.into_iter().chain(system_pods) {
			if let Some(key) = resource_key(&manifest) {
				trace!(collection = %key.0, name = %key.1, "Registered resource");
				resources.insert(key, manifest);
			}
		}
		let resources = Arc::new(RwLock::new(resources));

		if let Some(rejected) = self.reject_method {
			Mock::given(method(rejected.as_str()))
				.and(path_regex(API_PATHS))
				.respond_with(
					ResponseTemplate::new(500).set_body_json(status(
						500,
						"InternalError",
						"rejected by mock",
					)),
				)
				.with_priority(1)
				.mount(&server)
				.await;
		}

		mount_resources(
			&server,
			&resources,
			self.duplicate_matches.unwrap_or(1),
			self.read_delay.unwrap_or_default(),
		)
		.await;

		RunningHttpMockK8sServer { server, resources }
	}
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// Every request received so far, in arrival order.
	pub async fn requests(&self) -> Vec<RecordedRequest> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.map(|req| RecordedRequest {
				method: req.method.as_str().to_string(),
				path: req.url.path().to_string(),
				query: req.url.query().map(str::to_string),
				body: serde_json::from_slice(&req.body).ok(),
			})
			.collect()
	}

	/// Create, replace, patch and delete requests, in arrival order.
	pub async fn mutations(&self) -> Vec<RecordedRequest> {
		self.requests()
			.await
			.into_iter()
			.filter(RecordedRequest::is_mutation)
			.collect()
	}

	/// Current state of a stored object.
	pub fn resource(&self, collection: &str, name: &str) -> Option<serde_json::Value> {
		self.resources
			.read()
			.unwrap()
			.get(&(collection.to_string(), name.to_string()))
			.cloned()
	}
}

fn name_selector(req: &Request) -> Option<String> {
	req.url
		.query_pairs()
		.find(|(key, _)| key == "fieldSelector")
		.and_then(|(_, value)| value.strip_prefix("metadata.name=").map(str::to_string))
}

fn not_found(name: &str) -> ResponseTemplate {
	ResponseTemplate::new(404).set_body_json(status(
		404,
		"NotFound",
		&format!("\"{name}\" not found"),
	))
}

fn read(req: &Request, resources: &SharedResources, duplicates: usize) -> ResponseTemplate {
	let path_str = req.url.path().trim_end_matches('/');
	let resources = resources.read().unwrap();

	if is_collection(path_str) {
		let selector = name_selector(req);
		let copies = if selector.is_some() { duplicates } else { 1 };
		let items: Vec<_> = resources
			.iter()
			.filter(|((collection, name), _)| {
				collection == path_str && selector.as_ref().map_or(true, |s| s == name)
			})
			.flat_map(|(_, v)| std::iter::repeat(v.clone()).take(copies))
			.collect();
		return ResponseTemplate::new(200).set_body_json(list(items));
	}

	let (collection, name) = split_resource_path(path_str);
	match resources.get(&(collection, name.clone())) {
		Some(resource) => ResponseTemplate::new(200).set_body_json(resource.clone()),
		None => not_found(&name),
	}
}

async fn mount_resources(
	server: &MockServer,
	resources: &SharedResources,
	duplicates: usize,
	read_delay: Duration,
) {
	let get_resources = Arc::clone(resources);
	let post_resources = Arc::clone(resources);
	let put_resources = Arc::clone(resources);
	let delete_resources = Arc::clone(resources);

	// GET - list a collection (honouring a metadata.name field selector) or read one object
	Mock::given(method("GET"))
		.and(path_regex(API_PATHS))
		.respond_with(move |req: &Request| {
			read(req, &get_resources, duplicates).set_delay(read_delay)
		})
		.mount(server)
		.await;

	// POST - create, conflicting when the name is taken
	Mock::given(method("POST"))
		.and(path_regex(API_PATHS))
		.respond_with(move |req: &Request| {
			let collection = req.url.path().trim_end_matches('/').to_string();
			let body: serde_json::Value =
				serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);
			let name = body
				.pointer("/metadata/name")
				.and_then(|v| v.as_str())
				.unwrap_or("")
				.to_string();

			let mut resources = post_resources.write().unwrap();
			let key = (collection, name);
			if resources.contains_key(&key) {
				return ResponseTemplate::new(409).set_body_json(status(
					409,
					"AlreadyExists",
					&format!("\"{}\" already exists", key.1),
				));
			}
			resources.insert(key, body.clone());
			ResponseTemplate::new(201).set_body_json(body)
		})
		.mount(server)
		.await;

	// PUT - full replace of an existing object
	Mock::given(method("PUT"))
		.and(path_regex(API_PATHS))
		.respond_with(move |req: &Request| {
			let key = split_resource_path(req.url.path());
			let body: serde_json::Value =
				serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);

			let mut resources = put_resources.write().unwrap();
			if !resources.contains_key(&key) {
				return not_found(&key.1);
			}
			resources.insert(key, body.clone());
			ResponseTemplate::new(200).set_body_json(body)
		})
		.mount(server)
		.await;

	// DELETE - remove and echo the deleted object
	Mock::given(method("DELETE"))
		.and(path_regex(API_PATHS))
		.respond_with(move |req: &Request| {
			let key = split_resource_path(req.url.path());
			match delete_resources.write().unwrap().remove(&key) {
				Some(removed) => ResponseTemplate::new(200).set_body_json(removed),
				None => not_found(&key.1),
			}
		})
		.mount(server)
		.await;
}
