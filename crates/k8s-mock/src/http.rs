//! HTTP-based mock Kubernetes server using wiremock.
//!
//! This provides a real HTTP server that can be used with actual kubeconfig-based
//! connections. It answers the read-only calls a backup makes: `/version`,
//! paginated LIST and GET on core and group resources, and
//! SelfSubjectAccessReview creation.

use std::{collections::BTreeMap, sync::Arc};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use crate::resources::MockResourceTable;

const ACCESS_REVIEW_PATH: &str = "/apis/authorization.k8s.io/v1/selfsubjectaccessreviews";

/// Stored objects keyed by `(collection path, name)`.
type Store = Arc<BTreeMap<(String, String), Value>>;

/// An access review answer of "denied" for one resource.
#[derive(Debug, Clone)]
pub struct MockDenial {
	/// Plural resource name, e.g. `secrets`.
	pub resource: String,
	/// Namespace the denial applies to; `None` denies everywhere.
	pub namespace: Option<String>,
}

impl MockDenial {
	pub fn everywhere(resource: impl Into<String>) -> Self {
		Self {
			resource: resource.into(),
			namespace: None,
		}
	}

	pub fn in_namespace(resource: impl Into<String>, namespace: impl Into<String>) -> Self {
		Self {
			resource: resource.into(),
			namespace: Some(namespace.into()),
		}
	}

	fn matches(&self, resource: &str, namespace: Option<&str>) -> bool {
		self.resource == resource
			&& self
				.namespace
				.as_deref()
				.is_none_or(|ns| Some(ns) == namespace)
	}
}

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	/// Resources to serve as raw manifests. API paths are derived from
	/// apiVersion/kind using [`MockResourceTable`].
	#[builder(default)]
	resources: Vec<Value>,
	/// Namespaces that exist even without any objects in them.
	#[builder(default)]
	namespaces: Vec<String>,
	/// Access reviews that answer "denied".
	#[builder(default)]
	denials: Vec<MockDenial>,
	/// Answer every access review with a server error.
	#[builder(default)]
	access_review_unavailable: bool,
	/// Plural resource names whose LIST requests fail with a server error.
	#[builder(default)]
	failing_lists: Vec<String>,
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		let table = MockResourceTable::default();

		debug!(uri = %server.uri(), "Started mock K8s server");

		let mut store = BTreeMap::new();
		let mut namespaces = self.namespaces;
		namespaces.push("default".to_string());

		for manifest in self.resources {
			let Some((collection, name)) = table.key_for(&manifest) else {
				debug!(manifest = %manifest, "Ignoring manifest of unknown type");
				continue;
			};
			if let Some(ns) = namespace_of(&collection) {
				namespaces.push(ns.to_string());
			}
			trace!(collection = %collection, name = %name, "Registered resource");
			store.insert((collection, name), manifest);
		}

		for ns in namespaces {
			store
				.entry(("/api/v1/namespaces".to_string(), ns.clone()))
				.or_insert_with(|| {
					json!({
						"apiVersion": "v1",
						"kind": "Namespace",
						"metadata": {"name": ns}
					})
				});
		}

		mount_version(&server).await;
		mount_access_reviews(&server, self.denials, self.access_review_unavailable).await;
		mount_resources(&server, Arc::new(store), self.failing_lists).await;

		RunningHttpMockK8sServer { server }
	}
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// `METHOD path` of every request received so far, in arrival order.
	pub async fn requests(&self) -> Vec<String> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.map(|req| format!("{} {}", req.method, req.url.path()))
			.collect()
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
}

async fn mount_version(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path("/version"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"major": "1",
			"minor": "31",
			"gitVersion": "v1.31.0",
			"gitCommit": "fake",
			"gitTreeState": "clean",
			"buildDate": "2024-08-13T00:00:00Z",
			"goVersion": "go1.22.5",
			"compiler": "gc",
			"platform": "linux/amd64"
		})))
		.mount(server)
		.await;
}

async fn mount_access_reviews(server: &MockServer, denials: Vec<MockDenial>, unavailable: bool) {
	Mock::given(method("POST"))
		.and(path(ACCESS_REVIEW_PATH))
		.respond_with(move |req: &Request| {
			if unavailable {
				return status_response(503, "ServiceUnavailable", "authorizer unavailable");
			}

			let mut review: Value = serde_json::from_slice(&req.body).unwrap_or(Value::Null);
			let attributes = review.pointer("/spec/resourceAttributes");
			let resource = attributes
				.and_then(|a| a.get("resource"))
				.and_then(Value::as_str)
				.unwrap_or_default();
			let namespace = attributes
				.and_then(|a| a.get("namespace"))
				.and_then(Value::as_str)
				.filter(|ns| !ns.is_empty());

			let denied = denials.iter().any(|d| d.matches(resource, namespace));
			trace!(resource, ?namespace, denied, "Answered access review");

			let status = if denied {
				json!({
					"allowed": false,
					"denied": true,
					"reason": format!("mock denies list on {resource}")
				})
			} else {
				json!({"allowed": true})
			};

			if let Some(obj) = review.as_object_mut() {
				obj.entry("metadata").or_insert_with(|| json!({}));
				obj.insert("status".to_string(), status);
			}
			ResponseTemplate::new(201).set_body_json(review)
		})
		.mount(server)
		.await;
}

async fn mount_resources(server: &MockServer, store: Store, failing_lists: Vec<String>) {
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| match ApiPath::parse(req.url.path()) {
			Some(ApiPath::Collection { path: collection, plural }) => {
				if failing_lists.contains(&plural) {
					return status_response(500, "InternalError", "mock list failure");
				}
				list_response(&store, &collection, req)
			}
			Some(ApiPath::Item { collection, name }) => {
				match store.get(&(collection, name.clone())) {
					Some(object) => ResponseTemplate::new(200).set_body_json(object),
					None => status_response(404, "NotFound", &format!("\"{name}\" not found")),
				}
			}
			None => status_response(404, "NotFound", "the server could not find the requested resource"),
		})
		.mount(server)
		.await;
}

/// One page of the collection at `path`.
///
/// Items are ordered by name and stripped of apiVersion/kind the way a real
/// API server returns them. `continue` tokens are plain offsets.
fn list_response(store: &BTreeMap<(String, String), Value>, path: &str, req: &Request) -> ResponseTemplate {
	let mut items: Vec<(&String, &Value)> = store
		.iter()
		.filter(|((collection, _), _)| {
			collection == path || extract_cluster_wide_path(collection).as_deref() == Some(path)
		})
		.map(|((_, name), object)| (name, object))
		.collect();
	items.sort_by(|a, b| a.0.cmp(b.0));

	let mut limit = None;
	let mut offset = 0;
	for (key, value) in req.url.query_pairs() {
		match key.as_ref() {
			"limit" => limit = value.parse::<usize>().ok().filter(|l| *l > 0),
			"continue" => offset = value.parse::<usize>().unwrap_or(0),
			_ => {}
		}
	}

	let end = limit.map_or(items.len(), |l| (offset + l).min(items.len()));
	let page: Vec<Value> = items
		.get(offset.min(end)..end)
		.unwrap_or_default()
		.iter()
		.map(|(_, object)| {
			let mut object = (*object).clone();
			if let Some(obj) = object.as_object_mut() {
				obj.remove("apiVersion");
				obj.remove("kind");
			}
			object
		})
		.collect();

	let mut metadata = json!({"resourceVersion": "1"});
	if end < items.len() {
		metadata["continue"] = json!(end.to_string());
	}

	ResponseTemplate::new(200).set_body_json(json!({
		"kind": "List",
		"apiVersion": "v1",
		"metadata": metadata,
		"items": page
	}))
}

fn status_response(code: u16, reason: &str, message: &str) -> ResponseTemplate {
	ResponseTemplate::new(code).set_body_json(json!({
		"kind": "Status",
		"apiVersion": "v1",
		"metadata": {},
		"status": "Failure",
		"message": message,
		"reason": reason,
		"code": code
	}))
}

/// A request path split into collection and optional object name.
#[derive(Debug, PartialEq)]
enum ApiPath {
	Collection { path: String, plural: String },
	Item { collection: String, name: String },
}

impl ApiPath {
	/// Classify by the segments following `/api/<v>` or `/apis/<g>/<v>`.
	///
	/// Examples:
	/// - `/api/v1/namespaces` -> collection of namespaces
	/// - `/api/v1/namespaces/prod` -> the `prod` namespace
	/// - `/apis/apps/v1/namespaces/prod/deployments` -> collection
	/// - `/apis/apps/v1/namespaces/prod/deployments/api` -> item
	fn parse(path: &str) -> Option<Self> {
		let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
		let prefix_len = match segments.first() {
			Some(&"api") => 2,
			Some(&"apis") => 3,
			_ => return None,
		};
		if segments.len() <= prefix_len {
			return None;
		}
		let prefix = segments[..prefix_len].join("/");

		match &segments[prefix_len..] {
			[plural] => Some(Self::Collection {
				path: format!("/{prefix}/{plural}"),
				plural: plural.to_string(),
			}),
			[plural, name] => Some(Self::Item {
				collection: format!("/{prefix}/{plural}"),
				name: name.to_string(),
			}),
			["namespaces", ns, plural] => Some(Self::Collection {
				path: format!("/{prefix}/namespaces/{ns}/{plural}"),
				plural: plural.to_string(),
			}),
			["namespaces", ns, plural, name] => Some(Self::Item {
				collection: format!("/{prefix}/namespaces/{ns}/{plural}"),
				name: name.to_string(),
			}),
			_ => None,
		}
	}
}

/// Namespace segment of a namespaced collection path.
fn namespace_of(collection: &str) -> Option<&str> {
	let (_, after) = collection.split_once("/namespaces/")?;
	after.split('/').next()
}

/// Extract a cluster-wide path from a namespaced API path.
///
/// Examples:
/// - `/api/v1/namespaces/default/configmaps` -> Some(`/api/v1/configmaps`)
/// - `/apis/apps/v1/namespaces/default/deployments` -> Some(`/apis/apps/v1/deployments`)
/// - `/api/v1/namespaces` -> None (already cluster-wide for namespaces)
fn extract_cluster_wide_path(path: &str) -> Option<String> {
	let (before_ns, after_ns) = path.split_once("/namespaces/")?;
	let slash_idx = after_ns.find('/')?;
	Some(format!("{}{}", before_ns, &after_ns[slash_idx..]))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_collection_paths() {
		assert_eq!(
			ApiPath::parse("/api/v1/namespaces"),
			Some(ApiPath::Collection {
				path: "/api/v1/namespaces".to_string(),
				plural: "namespaces".to_string(),
			})
		);
		assert_eq!(
			ApiPath::parse("/apis/batch/v1/namespaces/prod/jobs"),
			Some(ApiPath::Collection {
				path: "/apis/batch/v1/namespaces/prod/jobs".to_string(),
				plural: "jobs".to_string(),
			})
		);
	}

	#[test]
	fn test_parse_item_paths() {
		assert_eq!(
			ApiPath::parse("/api/v1/namespaces/prod"),
			Some(ApiPath::Item {
				collection: "/api/v1/namespaces".to_string(),
				name: "prod".to_string(),
			})
		);
		assert_eq!(
			ApiPath::parse("/apis/apps/v1/namespaces/prod/deployments/api"),
			Some(ApiPath::Item {
				collection: "/apis/apps/v1/namespaces/prod/deployments".to_string(),
				name: "api".to_string(),
			})
		);
	}

	#[test]
	fn test_parse_rejects_bare_prefix() {
		assert_eq!(ApiPath::parse("/api/v1"), None);
		assert_eq!(ApiPath::parse("/apis/apps/v1"), None);
	}

	#[test]
	fn test_namespace_of() {
		assert_eq!(namespace_of("/api/v1/namespaces/prod/secrets"), Some("prod"));
		assert_eq!(namespace_of("/api/v1/persistentvolumes"), None);
	}

	#[test]
	fn test_denial_scope() {
		let everywhere = MockDenial::everywhere("secrets");
		assert!(everywhere.matches("secrets", Some("prod")));
		assert!(everywhere.matches("secrets", None));
		assert!(!everywhere.matches("configmaps", Some("prod")));

		let scoped = MockDenial::in_namespace("jobs", "prod");
		assert!(scoped.matches("jobs", Some("prod")));
		assert!(!scoped.matches("jobs", Some("dev")));
	}
}
