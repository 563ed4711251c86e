//! Table of exportable resource kinds.
//!
//! The registry is an immutable value built once at startup and passed to the
//! backup driver. Tests construct reduced registries with [`KindRegistry::new`].

use crate::k8s::ResourceScope;

/// API coordinates of one exportable kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
	pub kind: &'static str,
	/// API group, empty for the core group.
	pub group: &'static str,
	pub version: &'static str,
	/// Plural resource name, also used as the on-disk directory name.
	pub plural: &'static str,
	pub scope: ResourceScope,
}

impl KindDescriptor {
	pub const fn namespaced(
		kind: &'static str,
		group: &'static str,
		version: &'static str,
		plural: &'static str,
	) -> Self {
		Self {
			kind,
			group,
			version,
			plural,
			scope: ResourceScope::Namespaced,
		}
	}

	pub const fn cluster(
		kind: &'static str,
		group: &'static str,
		version: &'static str,
		plural: &'static str,
	) -> Self {
		Self {
			kind,
			group,
			version,
			plural,
			scope: ResourceScope::ClusterWide,
		}
	}

	/// `apiVersion` as it appears in manifests (`v1`, `apps/v1`).
	pub fn api_version(&self) -> String {
		if self.group.is_empty() {
			self.version.to_string()
		} else {
			format!("{}/{}", self.group, self.version)
		}
	}

	pub fn is_namespaced(&self) -> bool {
		self.scope == ResourceScope::Namespaced
	}

	fn matches(&self, id: &str) -> bool {
		self.plural.eq_ignore_ascii_case(id) || self.kind.eq_ignore_ascii_case(id)
	}
}

const BUILTIN_KINDS: &[KindDescriptor] = &[
	KindDescriptor::namespaced("ConfigMap", "", "v1", "configmaps"),
	KindDescriptor::namespaced("Secret", "", "v1", "secrets"),
	KindDescriptor::namespaced("Service", "", "v1", "services"),
	KindDescriptor::namespaced("ServiceAccount", "", "v1", "serviceaccounts"),
	KindDescriptor::namespaced("PersistentVolumeClaim", "", "v1", "persistentvolumeclaims"),
	KindDescriptor::namespaced("Deployment", "apps", "v1", "deployments"),
	KindDescriptor::namespaced("StatefulSet", "apps", "v1", "statefulsets"),
	KindDescriptor::namespaced("DaemonSet", "apps", "v1", "daemonsets"),
	KindDescriptor::namespaced("Job", "batch", "v1", "jobs"),
	KindDescriptor::namespaced("CronJob", "batch", "v1", "cronjobs"),
	KindDescriptor::namespaced(
		"HorizontalPodAutoscaler",
		"autoscaling",
		"v2",
		"horizontalpodautoscalers",
	),
	KindDescriptor::namespaced("Ingress", "networking.k8s.io", "v1", "ingresses"),
	KindDescriptor::namespaced("NetworkPolicy", "networking.k8s.io", "v1", "networkpolicies"),
	KindDescriptor::namespaced("Role", "rbac.authorization.k8s.io", "v1", "roles"),
	KindDescriptor::namespaced(
		"RoleBinding",
		"rbac.authorization.k8s.io",
		"v1",
		"rolebindings",
	),
	KindDescriptor::namespaced("PodDisruptionBudget", "policy", "v1", "poddisruptionbudgets"),
	KindDescriptor::cluster("PersistentVolume", "", "v1", "persistentvolumes"),
	KindDescriptor::cluster("StorageClass", "storage.k8s.io", "v1", "storageclasses"),
];

/// Ordered set of kinds the backup can visit.
#[derive(Debug, Clone)]
pub struct KindRegistry {
	kinds: Vec<KindDescriptor>,
}

impl KindRegistry {
	/// Build a registry from an explicit list. Later duplicates of a plural are dropped.
	pub fn new(kinds: impl IntoIterator<Item = KindDescriptor>) -> Self {
		let mut unique: Vec<KindDescriptor> = Vec::new();
		for desc in kinds {
			if !unique.iter().any(|d| d.plural == desc.plural) {
				unique.push(desc);
			}
		}
		Self { kinds: unique }
	}

	/// The default table of kinds.
	pub fn builtin() -> Self {
		Self::new(BUILTIN_KINDS.iter().cloned())
	}

	/// Find a kind by plural (`deployments`) or kind name (`Deployment`), ignoring case.
	pub fn lookup(&self, id: &str) -> Option<&KindDescriptor> {
		let id = id.trim();
		self.kinds.iter().find(|d| d.matches(id))
	}

	/// Plural ids of every kind, in registry order.
	pub fn all_kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
		self.kinds.iter().map(|d| d.plural)
	}

	pub fn iter(&self) -> impl Iterator<Item = &KindDescriptor> {
		self.kinds.iter()
	}

	pub fn len(&self) -> usize {
		self.kinds.len()
	}

	pub fn is_empty(&self) -> bool {
		self.kinds.is_empty()
	}
}

impl Default for KindRegistry {
	fn default() -> Self {
		Self::builtin()
	}
}
