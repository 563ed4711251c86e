//! Resource types known to the mock server.

/// API coordinates of a resource the mock server can store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResourceType {
	pub api_version: &'static str,
	pub kind: &'static str,
	pub plural: &'static str,
	pub namespaced: bool,
}

impl MockResourceType {
	pub const fn namespaced(api_version: &'static str, kind: &'static str, plural: &'static str) -> Self {
		Self {
			api_version,
			kind,
			plural,
			namespaced: true,
		}
	}

	pub const fn cluster_scoped(
		api_version: &'static str,
		kind: &'static str,
		plural: &'static str,
	) -> Self {
		Self {
			api_version,
			kind,
			plural,
			namespaced: false,
		}
	}

	/// `/api/v1` for the core group, `/apis/<group>/<version>` otherwise.
	pub fn api_prefix(&self) -> String {
		if self.api_version.contains('/') {
			format!("/apis/{}", self.api_version)
		} else {
			format!("/api/{}", self.api_version)
		}
	}

	/// Collection path holding objects of this type in `namespace`.
	pub fn collection_path(&self, namespace: Option<&str>) -> String {
		match (self.namespaced, namespace) {
			(true, Some(ns)) => format!("{}/namespaces/{}/{}", self.api_prefix(), ns, self.plural),
			_ => format!("{}/{}", self.api_prefix(), self.plural),
		}
	}
}

/// Lookup table from `(apiVersion, kind)` to resource paths.
pub struct MockResourceTable {
	types: Vec<MockResourceType>,
}

impl Default for MockResourceTable {
	fn default() -> Self {
		Self {
			types: vec![
				MockResourceType::cluster_scoped("v1", "Namespace", "namespaces"),
				MockResourceType::namespaced("v1", "ConfigMap", "configmaps"),
				MockResourceType::namespaced("v1", "Secret", "secrets"),
				MockResourceType::namespaced("v1", "Service", "services"),
				MockResourceType::namespaced("v1", "ServiceAccount", "serviceaccounts"),
				MockResourceType::namespaced("v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
				MockResourceType::namespaced("v1", "Pod", "pods"),
				MockResourceType::cluster_scoped("v1", "PersistentVolume", "persistentvolumes"),
				MockResourceType::namespaced("apps/v1", "Deployment", "deployments"),
				MockResourceType::namespaced("apps/v1", "StatefulSet", "statefulsets"),
				MockResourceType::namespaced("apps/v1", "DaemonSet", "daemonsets"),
				MockResourceType::namespaced("batch/v1", "Job", "jobs"),
				MockResourceType::namespaced("batch/v1", "CronJob", "cronjobs"),
				MockResourceType::namespaced(
					"autoscaling/v2",
					"HorizontalPodAutoscaler",
					"horizontalpodautoscalers",
				),
				MockResourceType::namespaced("networking.k8s.io/v1", "Ingress", "ingresses"),
				MockResourceType::namespaced(
					"networking.k8s.io/v1",
					"NetworkPolicy",
					"networkpolicies",
				),
				MockResourceType::namespaced("rbac.authorization.k8s.io/v1", "Role", "roles"),
				MockResourceType::namespaced(
					"rbac.authorization.k8s.io/v1",
					"RoleBinding",
					"rolebindings",
				),
				MockResourceType::namespaced("policy/v1", "PodDisruptionBudget", "poddisruptionbudgets"),
				MockResourceType::cluster_scoped("storage.k8s.io/v1", "StorageClass", "storageclasses"),
			],
		}
	}
}

impl MockResourceTable {
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockResourceType> {
		self.types
			.iter()
			.find(|t| t.api_version == api_version && t.kind == kind)
	}

	/// `(collection path, name)` under which a manifest is served.
	///
	/// Namespaced manifests without a namespace land in `default`.
	pub fn key_for(&self, manifest: &serde_json::Value) -> Option<(String, String)> {
		let api_version = manifest.get("apiVersion")?.as_str()?;
		let kind = manifest.get("kind")?.as_str()?;
		let name = manifest.pointer("/metadata/name")?.as_str()?;
		let resource = self.find(api_version, kind)?;

		let namespace = manifest
			.pointer("/metadata/namespace")
			.and_then(serde_json::Value::as_str)
			.unwrap_or("default");

		Some((resource.collection_path(Some(namespace)), name.to_string()))
	}
}
