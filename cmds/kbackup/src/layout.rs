//! On-disk layout of a backup.
//!
//! ```text
//! <output-dir>/k8s-backup-<YYYYmmddHHMMSS>/
//!   <namespace>/_namespace.yaml
//!   <namespace>/<kind-plural>/<name>.yaml
//!   _global/<kind-plural>/<name>.yaml
//! ```

use std::{
	fs,
	io::{BufWriter, Write},
	path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde_json::Value;
use thiserror::Error;

use crate::{k8s::Scope, yaml};

/// Prefix of every backup root directory.
pub const BACKUP_DIR_PREFIX: &str = "k8s-backup";

/// File holding the namespace declaration inside a namespace directory.
pub const NAMESPACE_MANIFEST_FILE: &str = "_namespace.yaml";

#[derive(Debug, Error)]
pub enum LayoutError {
	#[error("failed to create directory {}: {source}", path.display())]
	CreateDir {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to encode object as YAML: {0}")]
	Encode(#[from] serde_saphyr::ser_error::Error),

	#[error("failed to write {}: {source}", path.display())]
	Write {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Timestamped directory that receives everything written by one run.
#[derive(Debug, Clone)]
pub struct BackupRoot {
	path: PathBuf,
}

impl BackupRoot {
	/// Create `<output_dir>/k8s-backup-<now>`.
	pub fn create(output_dir: &Path) -> Result<Self, LayoutError> {
		Self::create_at(output_dir, Local::now())
	}

	pub fn create_at(output_dir: &Path, started: DateTime<Local>) -> Result<Self, LayoutError> {
		let path = output_dir.join(root_dir_name(started));
		create_dir(&path)?;
		Ok(Self { path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn writer(&self) -> LayoutWriter {
		LayoutWriter::new(self.path.clone())
	}
}

pub fn root_dir_name(started: DateTime<Local>) -> String {
	format!("{BACKUP_DIR_PREFIX}-{}", started.format("%Y%m%d%H%M%S"))
}

/// Maps `(scope, kind, name)` to files under a backup root and writes them.
#[derive(Debug, Clone)]
pub struct LayoutWriter {
	root: PathBuf,
}

impl LayoutWriter {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	pub fn scope_dir(&self, scope: &Scope) -> PathBuf {
		self.root.join(sanitize_path_component(scope.dir_name()))
	}

	/// `<root>/<scope>/<plural>/<name>.yaml`
	pub fn object_path(&self, scope: &Scope, plural: &str, name: &str) -> PathBuf {
		self.scope_dir(scope)
			.join(plural)
			.join(format!("{}.yaml", sanitize_path_component(name)))
	}

	/// Create the scope directory. Repeated calls are fine.
	pub fn ensure_scope_dir(&self, scope: &Scope) -> Result<PathBuf, LayoutError> {
		let dir = self.scope_dir(scope);
		create_dir(&dir)?;
		Ok(dir)
	}

	/// Write one object, replacing any previous file at the same path.
	pub fn write(
		&self,
		scope: &Scope,
		plural: &str,
		name: &str,
		object: &Value,
	) -> Result<PathBuf, LayoutError> {
		let path = self.object_path(scope, plural, name);
		write_document(&path, object)?;
		Ok(path)
	}

	/// Write the minimal Namespace object that lets a restore recreate the namespace first.
	pub fn write_namespace_manifest(&self, namespace: &str) -> Result<PathBuf, LayoutError> {
		let path = self
			.scope_dir(&Scope::Namespace(namespace.to_string()))
			.join(NAMESPACE_MANIFEST_FILE);
		let manifest = serde_json::json!({
			"apiVersion": "v1",
			"kind": "Namespace",
			"metadata": {"name": namespace},
		});
		write_document(&path, &manifest)?;
		Ok(path)
	}
}

fn write_document(path: &Path, object: &Value) -> Result<(), LayoutError> {
	let content = yaml::to_yaml(object)?;

	if let Some(parent) = path.parent() {
		create_dir(parent)?;
	}

	let write_err = |source| LayoutError::Write {
		path: path.to_path_buf(),
		source,
	};
	let file = fs::File::create(path).map_err(write_err)?;
	set_file_mode(&file).map_err(write_err)?;
	let mut writer = BufWriter::new(file);
	writer.write_all(content.as_bytes()).map_err(write_err)?;
	writer.flush().map_err(write_err)
}

#[cfg(unix)]
fn set_file_mode(file: &fs::File) -> std::io::Result<()> {
	use std::os::unix::fs::PermissionsExt;
	file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_file_mode(_file: &fs::File) -> std::io::Result<()> {
	Ok(())
}

fn create_dir(path: &Path) -> Result<(), LayoutError> {
	fs::create_dir_all(path).map_err(|source| LayoutError::CreateDir {
		path: path.to_path_buf(),
		source,
	})
}

/// Replace characters that are unsafe in a file name with `-`.
fn sanitize_path_component(s: &str) -> String {
	let cleaned: String = s
		.chars()
		.map(|c| {
			if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':') {
				c
			} else {
				'-'
			}
		})
		.collect();
	match cleaned.as_str() {
		"" | "." | ".." => cleaned.replace('.', "-") + "-",
		_ => cleaned,
	}
}
