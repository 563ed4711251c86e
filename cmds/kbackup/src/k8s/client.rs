//! Kubernetes cluster connection management.

use std::{path::PathBuf, time::Duration};

use k8s_openapi::{api::core::v1::Namespace, apimachinery::pkg::version::Info};
use kube::{
	api::{ApiResource, DynamicObject, GroupVersionKind, ListParams},
	config::{InferConfigError, KubeConfigOptions, Kubeconfig, KubeconfigError},
	Api, Client, Config,
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use super::access::AccessGate;
use crate::registry::KindDescriptor;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Objects requested per list page.
const LIST_PAGE_SIZE: u32 = 500;

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error("could not find cluster credentials: {0}")]
	Infer(#[from] InferConfigError),

	#[error("cluster is not reachable: {0}")]
	Kube(#[from] kube::Error),
}

/// Errors from individual API calls made during a backup.
#[derive(Debug, Error)]
pub enum ClusterError {
	#[error("failed to list namespaces: {0}")]
	Namespaces(#[source] kube::Error),

	#[error("failed to list {resource}: {source}")]
	List {
		resource: &'static str,
		#[source]
		source: kube::Error,
	},

	#[error("failed to decode {resource} object: {source}")]
	Decode {
		resource: &'static str,
		#[source]
		source: serde_json::Error,
	},
}

/// How to locate cluster credentials.
#[derive(Debug, Clone, Default)]
pub struct ConnectOpts {
	/// Explicit kubeconfig file. Without it `$KUBECONFIG`/`~/.kube/config` is
	/// used, falling back to the in-cluster service account.
	pub kubeconfig: Option<PathBuf>,
	/// Context to use instead of the kubeconfig's current context.
	pub context: Option<String>,
}

/// Represents a connection to a Kubernetes cluster.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	server_version: Info,
	/// Human-readable identifier for the cluster (context name or API server URL).
	cluster_identifier: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("cluster_identifier", &self.cluster_identifier)
			.field("server_version", &self.server_version)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect and verify that the API server answers.
	#[instrument(skip_all)]
	pub async fn connect(opts: &ConnectOpts) -> Result<Self, ConnectionError> {
		if opts.kubeconfig.is_none() && opts.context.is_none() {
			let config = Config::infer().await?;
			let identifier = config.cluster_url.to_string();
			return Self::from_config(config, identifier).await;
		}

		let kubeconfig = match &opts.kubeconfig {
			Some(path) => Kubeconfig::read_from(path)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(kubeconfig, opts.context.as_deref()).await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip_all)]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		if let Some(name) = context {
			if !kubeconfig.contexts.iter().any(|c| c.name == name) {
				return Err(ConnectionError::ContextNotFound(name.to_string()));
			}
		}
		let context_name = context
			.map(str::to_string)
			.or_else(|| kubeconfig.current_context.clone());

		let config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: context_name.clone(),
				..Default::default()
			},
		)
		.await?;

		let identifier = match context_name {
			Some(name) => format!("{}  (context:{})", config.cluster_url, name),
			None => config.cluster_url.to_string(),
		};
		Self::from_config(config, identifier).await
	}

	async fn from_config(
		mut config: Config,
		cluster_identifier: String,
	) -> Result<Self, ConnectionError> {
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);
		let client = Client::try_from(config)?;

		let server_version = client.apiserver_version().await?;
		tracing::debug!(
			cluster = %cluster_identifier,
			version = %server_version.git_version,
			"connected to cluster"
		);

		Ok(Self {
			client,
			server_version,
			cluster_identifier,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Get the server version.
	pub fn server_version(&self) -> &Info {
		&self.server_version
	}

	/// Get the cluster identifier (context name or API server URL).
	pub fn cluster_identifier(&self) -> &str {
		&self.cluster_identifier
	}

	/// Access checks made with this connection's credentials.
	pub fn access_gate(&self) -> AccessGate {
		AccessGate::new(self.client.clone())
	}

	/// Names of every namespace in the cluster.
	#[instrument(skip_all)]
	pub async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
		let api: Api<Namespace> = Api::all(self.client.clone());
		let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
		let mut names = Vec::new();

		loop {
			let page = api.list(&params).await.map_err(ClusterError::Namespaces)?;
			names.extend(page.items.into_iter().filter_map(|ns| ns.metadata.name));

			match page.metadata.continue_ {
				Some(token) if !token.is_empty() => params = params.continue_token(&token),
				_ => break,
			}
		}

		Ok(names)
	}

	/// List every object of a kind, in one namespace or cluster-wide.
	///
	/// Items come back as plain JSON with `apiVersion` and `kind` filled in
	/// from the descriptor when the server leaves them out of list items.
	#[instrument(skip_all, fields(kind = desc.plural, namespace = namespace.unwrap_or_default()))]
	pub async fn list_objects(
		&self,
		desc: &KindDescriptor,
		namespace: Option<&str>,
	) -> Result<Vec<Value>, ClusterError> {
		let gvk = GroupVersionKind::gvk(desc.group, desc.version, desc.kind);
		let resource = ApiResource::from_gvk_with_plural(&gvk, desc.plural);
		let api: Api<DynamicObject> = match namespace {
			Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
			None => Api::all_with(self.client.clone(), &resource),
		};

		let mut params = ListParams::default().limit(LIST_PAGE_SIZE);
		let mut objects = Vec::new();

		loop {
			let page = api
				.list(&params)
				.await
				.map_err(|source| ClusterError::List {
					resource: desc.plural,
					source,
				})?;

			for item in page.items {
				let value = serde_json::to_value(&item).map_err(|source| ClusterError::Decode {
					resource: desc.plural,
					source,
				})?;
				objects.push(with_type_meta(value, desc));
			}

			match page.metadata.continue_ {
				Some(token) if !token.is_empty() => params = params.continue_token(&token),
				_ => break,
			}
		}

		tracing::debug!(count = objects.len(), "listed objects");
		Ok(objects)
	}
}

/// Ensure `apiVersion` and `kind` lead the object.
fn with_type_meta(value: Value, desc: &KindDescriptor) -> Value {
	let Value::Object(mut fields) = value else {
		return value;
	};

	let api_version = fields
		.remove("apiVersion")
		.unwrap_or_else(|| Value::String(desc.api_version()));
	let kind = fields
		.remove("kind")
		.unwrap_or_else(|| Value::String(desc.kind.to_string()));

	let mut object = Map::with_capacity(fields.len() + 2);
	object.insert("apiVersion".to_string(), api_version);
	object.insert("kind".to_string(), kind);
	object.extend(fields);
	Value::Object(object)
}
