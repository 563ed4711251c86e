//! Configuration file support for kbackup
//!
//! A `.kbackup.yaml` file is looked up from the working directory upward to the
//! filesystem root, or given explicitly with `--config`. Command-line flags
//! override anything set in the file.

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::sanitize::{ReplicasPolicy, SanitizeOptions};

/// The name of the config file kbackup looks for
pub const CONFIG_FILE_NAME: &str = ".kbackup.yaml";

/// Namespaces skipped when backing up all namespaces and nothing else is configured.
pub const DEFAULT_EXCLUDED_NAMESPACES: &[&str] = &["kube-system"];

/// Root configuration structure for .kbackup.yaml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KbackupConfig {
	/// Namespaces left out of an all-namespaces backup.
	#[serde(default)]
	pub exclude_namespaces: Option<Vec<String>>,

	/// Kinds to back up when `--type` is not given.
	#[serde(default)]
	pub kinds: Option<Vec<String>>,

	#[serde(default)]
	pub skip_secrets: Option<bool>,

	#[serde(default)]
	pub skip_cluster_resources: Option<bool>,

	/// Write `_namespace.yaml` into every namespace directory.
	#[serde(default)]
	pub namespace_manifests: Option<bool>,

	#[serde(default)]
	pub sanitize: SanitizeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SanitizeConfig {
	/// `preserve` (default) or `strip`.
	#[serde(default)]
	pub replicas: Option<ReplicasPolicy>,

	/// Extra annotation keys to drop from every object.
	#[serde(default)]
	pub strip_annotations: Vec<String>,
}

impl KbackupConfig {
	/// Load config by searching from the given directory upward
	pub fn load_from_directory(start_dir: &Path) -> Result<Option<Self>> {
		match find_config_file(start_dir) {
			Some(path) => {
				tracing::debug!(path = %path.display(), "using config file");
				Self::load_from_file(&path).map(Some)
			}
			None => Ok(None),
		}
	}

	/// Load config from a specific file path
	pub fn load_from_file(path: &Path) -> Result<Self> {
		let content = fs::read_to_string(path)
			.with_context(|| format!("failed to read config file: {}", path.display()))?;
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		let config: KbackupConfig = serde_yaml_with_quirks::from_str(&content)
			.with_context(|| format!("failed to parse config file: {}", path.display()))?;
		Ok(config)
	}

	/// Explicit file if given, otherwise the nearest `.kbackup.yaml`, otherwise defaults.
	pub fn resolve(explicit: Option<&Path>, start_dir: &Path) -> Result<Self> {
		match explicit {
			Some(path) => Self::load_from_file(path),
			None => Ok(Self::load_from_directory(start_dir)?.unwrap_or_default()),
		}
	}

	pub fn excluded_namespaces(&self) -> Vec<String> {
		self.exclude_namespaces.clone().unwrap_or_else(|| {
			DEFAULT_EXCLUDED_NAMESPACES
				.iter()
				.map(|s| (*s).to_string())
				.collect()
		})
	}

	pub fn sanitize_options(&self) -> SanitizeOptions {
		SanitizeOptions {
			replicas: self.sanitize.replicas.unwrap_or_default(),
			extra_annotations: self.sanitize.strip_annotations.clone(),
		}
	}
}

/// Search for a config file starting from `start_dir` and walking up to the filesystem root
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
	let start = start_dir
		.canonicalize()
		.unwrap_or_else(|_| start_dir.to_path_buf());

	start
		.ancestors()
		.map(|dir| dir.join(CONFIG_FILE_NAME))
		.find(|candidate| candidate.is_file())
}
