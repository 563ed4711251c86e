//! Kubernetes API access for the backup: connection, listing and access checks.

pub mod access;
pub mod client;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., PersistentVolume, StorageClass).
	ClusterWide,
}

/// Directory that holds cluster-scoped objects in a backup.
pub const GLOBAL_SCOPE_DIR: &str = "_global";

/// Where a unit of backup work lives: one namespace or the cluster itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
	Namespace(String),
	Cluster,
}

impl Scope {
	/// Namespace argument for API calls.
	pub fn namespace(&self) -> Option<&str> {
		match self {
			Self::Namespace(ns) => Some(ns),
			Self::Cluster => None,
		}
	}

	/// Name of the scope's directory under the backup root.
	pub fn dir_name(&self) -> &str {
		match self {
			Self::Namespace(ns) => ns,
			Self::Cluster => GLOBAL_SCOPE_DIR,
		}
	}
}

impl std::fmt::Display for Scope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Namespace(ns) => write!(f, "namespace {ns}"),
			Self::Cluster => f.write_str("cluster scope"),
		}
	}
}
