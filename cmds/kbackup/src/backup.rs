//! Backup traversal.
//!
//! Walks every selected `(namespace, kind)` pair, then the cluster-scoped
//! kinds. Each step produces a tagged outcome which is folded into a
//! [`RunSummary`]; only failing to create the backup root aborts the run.
//! Everything is awaited in order, one API call at a time.

use std::{
	collections::{BTreeMap, BTreeSet},
	path::{Path, PathBuf},
	time::{Duration, Instant},
};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
	k8s::{
		access::{AccessDecision, AccessGate},
		client::ClusterConnection,
		Scope,
	},
	layout::{BackupRoot, LayoutError, LayoutWriter},
	registry::{KindDescriptor, KindRegistry},
	sanitize::{SanitizeOptions, Sanitizer},
	secrets,
};

/// Which namespaces to visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NamespaceSelection {
	/// Every namespace except the excluded ones.
	#[default]
	All,
	/// Exactly this namespace, exclusions do not apply.
	Only(String),
}

/// Which kinds to visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KindSelection {
	#[default]
	All,
	/// Kind ids as given by the user, resolved against the registry.
	Only(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct BackupOpts {
	pub namespaces: NamespaceSelection,
	pub kinds: KindSelection,
	pub output_dir: PathBuf,
	pub exclude_namespaces: Vec<String>,
	pub skip_secrets: bool,
	pub skip_cluster_resources: bool,
	/// Write `_namespace.yaml` into each namespace directory.
	pub namespace_manifests: bool,
	pub sanitize: SanitizeOptions,
}

impl Default for BackupOpts {
	fn default() -> Self {
		Self {
			namespaces: NamespaceSelection::All,
			kinds: KindSelection::All,
			output_dir: PathBuf::from("."),
			exclude_namespaces: vec!["kube-system".to_string()],
			skip_secrets: false,
			skip_cluster_resources: false,
			namespace_manifests: true,
			sanitize: SanitizeOptions::default(),
		}
	}
}

/// Conditions that abort the whole run.
#[derive(Debug, Error)]
pub enum BackupError {
	#[error("failed to create backup directory: {0}")]
	Root(#[source] LayoutError),
}

/// Why a unit of work was left out of the backup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
	#[error("unknown resource type")]
	UnknownKind,
	#[error("secret export is disabled")]
	SecretsDisabled,
	#[error("access denied: {reason}")]
	AccessDenied { reason: String },
	#[error("could not verify access: {error}")]
	AccessUnverifiable { error: String },
	#[error("{error}")]
	ListFailed { error: String },
	#[error("{error}")]
	NamespaceListFailed { error: String },
	#[error("object has no metadata.name")]
	MissingName,
	#[error("{error}")]
	Encode { error: String },
	#[error("{error}")]
	Write { error: String },
}

impl SkipReason {
	/// Skips the user asked for, not worth a warning.
	pub fn is_opt_out(&self) -> bool {
		matches!(self, Self::SecretsDisabled)
	}

	fn from_layout(error: &LayoutError) -> Self {
		match error {
			LayoutError::Encode(_) => Self::Encode {
				error: error.to_string(),
			},
			LayoutError::CreateDir { .. } | LayoutError::Write { .. } => Self::Write {
				error: error.to_string(),
			},
		}
	}
}

/// Result of backing up one object.
#[derive(Debug)]
pub enum ObjectOutcome {
	Written { name: String, path: PathBuf },
	Skipped {
		name: Option<String>,
		reason: SkipReason,
	},
}

/// Result of backing up one kind in one scope.
#[derive(Debug)]
pub enum KindOutcome {
	Written {
		count: usize,
		/// Secrets rejected by the eligibility filter.
		filtered: usize,
		failed: Vec<(Option<String>, SkipReason)>,
	},
	/// Nothing left to write; no directory is created.
	Empty { filtered: usize },
	Skipped(SkipReason),
}

/// A unit of work that did not make it into the backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUnit {
	pub scope: Option<Scope>,
	pub kind: Option<String>,
	pub name: Option<String>,
	pub reason: SkipReason,
}

impl std::fmt::Display for SkippedUnit {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut target = Vec::new();
		if let Some(kind) = &self.kind {
			match &self.name {
				Some(name) => target.push(format!("{kind}/{name}")),
				None => target.push(kind.clone()),
			}
		}
		if let Some(scope) = &self.scope {
			target.push(format!("in {scope}"));
		}
		if target.is_empty() {
			write!(f, "{}", self.reason)
		} else {
			write!(f, "{}: {}", target.join(" "), self.reason)
		}
	}
}

/// Namespaces and kinds visited by a run, fixed before traversal starts.
#[derive(Debug, Clone, Default)]
pub struct BackupScope {
	pub namespaces: Vec<String>,
	pub kinds: Vec<KindDescriptor>,
}

/// What a run did.
#[derive(Debug, Clone)]
pub struct RunSummary {
	pub root: PathBuf,
	/// Objects written per kind plural.
	pub per_kind: BTreeMap<&'static str, usize>,
	pub total: usize,
	pub filtered_secrets: usize,
	/// Namespaces whose directory exists in the backup, in order.
	pub namespaces: Vec<String>,
	/// Objects written under `_global`.
	pub cluster_objects: usize,
	pub skipped: Vec<SkippedUnit>,
	pub elapsed: Duration,
}

impl RunSummary {
	fn new(root: &Path) -> Self {
		Self {
			root: root.to_path_buf(),
			per_kind: BTreeMap::new(),
			total: 0,
			filtered_secrets: 0,
			namespaces: Vec::new(),
			cluster_objects: 0,
			skipped: Vec::new(),
			elapsed: Duration::ZERO,
		}
	}

	fn skip(
		&mut self,
		scope: Option<&Scope>,
		kind: Option<&str>,
		name: Option<String>,
		reason: SkipReason,
	) {
		let unit = SkippedUnit {
			scope: scope.cloned(),
			kind: kind.map(str::to_string),
			name,
			reason,
		};
		warn!(skipped = %unit, "skipping");
		self.skipped.push(unit);
	}

	/// Fold one kind's outcome into the totals.
	fn record(&mut self, scope: &Scope, desc: &KindDescriptor, outcome: KindOutcome) {
		match outcome {
			KindOutcome::Written {
				count,
				filtered,
				failed,
			} => {
				info!(scope = %scope, kind = desc.plural, count, "backed up");
				*self.per_kind.entry(desc.plural).or_default() += count;
				self.total += count;
				self.filtered_secrets += filtered;
				if *scope == Scope::Cluster {
					self.cluster_objects += count;
				}
				for (name, reason) in failed {
					self.skip(Some(scope), Some(desc.plural), name, reason);
				}
			}
			KindOutcome::Empty { filtered } => {
				debug!(scope = %scope, kind = desc.plural, "nothing to back up");
				self.filtered_secrets += filtered;
			}
			KindOutcome::Skipped(reason) if reason.is_opt_out() => {
				debug!(scope = %scope, kind = desc.plural, reason = %reason, "skipping");
			}
			KindOutcome::Skipped(reason) => self.skip(Some(scope), Some(desc.plural), None, reason),
		}
	}
}

/// One backup run against a connected cluster.
pub struct Backup<'a> {
	conn: &'a ClusterConnection,
	registry: &'a KindRegistry,
	opts: BackupOpts,
	gate: AccessGate,
	sanitizer: Sanitizer,
}

impl<'a> Backup<'a> {
	pub fn new(conn: &'a ClusterConnection, registry: &'a KindRegistry, opts: BackupOpts) -> Self {
		Self {
			conn,
			registry,
			gate: conn.access_gate(),
			sanitizer: Sanitizer::new(opts.sanitize.clone()),
			opts,
		}
	}

	/// Create the backup root and export everything in scope into it.
	#[instrument(skip_all)]
	pub async fn run(&self) -> Result<RunSummary, BackupError> {
		let started = Instant::now();
		let root = BackupRoot::create(&self.opts.output_dir).map_err(BackupError::Root)?;
		info!(root = %root.path().display(), "writing backup");

		let mut summary = RunSummary::new(root.path());
		let scope = self.resolve_scope(&mut summary).await;
		let writer = root.writer();

		for namespace in &scope.namespaces {
			self.backup_namespace(&writer, namespace, &scope.kinds, &mut summary)
				.await;
		}

		if self.opts.skip_cluster_resources {
			debug!("skipping cluster-scoped resources");
		} else {
			let cluster = Scope::Cluster;
			for desc in scope.kinds.iter().filter(|d| !d.is_namespaced()) {
				let outcome = self.backup_kind(&writer, &cluster, desc).await;
				summary.record(&cluster, desc, outcome);
			}
		}

		summary.elapsed = started.elapsed();
		Ok(summary)
	}

	/// Resolve namespaces and kinds. Problems here skip work, they never abort.
	async fn resolve_scope(&self, summary: &mut RunSummary) -> BackupScope {
		let kinds = self.resolve_kinds(summary);
		let namespaces = match &self.opts.namespaces {
			NamespaceSelection::Only(ns) => vec![ns.clone()],
			NamespaceSelection::All => match self.conn.list_namespaces().await {
				Ok(all) => filter_namespaces(all, &self.opts.exclude_namespaces),
				Err(e) => {
					summary.skip(
						None,
						None,
						None,
						SkipReason::NamespaceListFailed {
							error: e.to_string(),
						},
					);
					Vec::new()
				}
			},
		};
		debug!(namespaces = ?namespaces, kinds = kinds.len(), "resolved backup scope");

		BackupScope { namespaces, kinds }
	}

	fn resolve_kinds(&self, summary: &mut RunSummary) -> Vec<KindDescriptor> {
		let requested = match &self.opts.kinds {
			KindSelection::All => return self.registry.iter().cloned().collect(),
			KindSelection::Only(ids) => ids,
		};

		let mut wanted = BTreeSet::new();
		let mut unknown = BTreeSet::new();
		for id in requested {
			match self.registry.lookup(id) {
				Some(desc) => {
					wanted.insert(desc.plural);
				}
				None => {
					if unknown.insert(id.trim().to_ascii_lowercase()) {
						summary.skip(None, Some(id.trim()), None, SkipReason::UnknownKind);
					}
				}
			}
		}

		self.registry
			.iter()
			.filter(|d| wanted.contains(d.plural))
			.cloned()
			.collect()
	}

	#[instrument(skip_all, fields(namespace = %namespace))]
	async fn backup_namespace(
		&self,
		writer: &LayoutWriter,
		namespace: &str,
		kinds: &[KindDescriptor],
		summary: &mut RunSummary,
	) {
		let Some(scope) = open_namespace(writer, namespace, self.opts.namespace_manifests, summary)
		else {
			return;
		};

		for desc in kinds.iter().filter(|d| d.is_namespaced()) {
			let outcome = self.backup_kind(writer, &scope, desc).await;
			summary.record(&scope, desc, outcome);
		}
	}

	async fn backup_kind(
		&self,
		writer: &LayoutWriter,
		scope: &Scope,
		desc: &KindDescriptor,
	) -> KindOutcome {
		let is_secret = desc.kind == "Secret" && desc.group.is_empty();
		if is_secret && self.opts.skip_secrets {
			return KindOutcome::Skipped(SkipReason::SecretsDisabled);
		}

		match self.gate.can_list(desc, scope.namespace()).await {
			AccessDecision::Allowed => {}
			AccessDecision::Denied { reason } => {
				return KindOutcome::Skipped(SkipReason::AccessDenied { reason })
			}
			AccessDecision::Unverifiable { error } => {
				return KindOutcome::Skipped(SkipReason::AccessUnverifiable { error })
			}
		}

		let mut objects = match self.conn.list_objects(desc, scope.namespace()).await {
			Ok(objects) => objects,
			Err(e) => {
				return KindOutcome::Skipped(SkipReason::ListFailed {
					error: e.to_string(),
				})
			}
		};

		let mut filtered = 0;
		if is_secret {
			let before = objects.len();
			objects.retain(secrets::is_exportable);
			filtered = before - objects.len();
			if filtered > 0 {
				info!(scope = %scope, filtered, "filtered out internal secrets");
			}
		}

		if objects.is_empty() {
			return KindOutcome::Empty { filtered };
		}

		let mut count = 0;
		let mut failed = Vec::new();
		for object in objects {
			match self.backup_object(writer, scope, desc, object) {
				ObjectOutcome::Written { name, path } => {
					tracing::trace!(name = %name, path = %path.display(), "wrote object");
					count += 1;
				}
				ObjectOutcome::Skipped { name, reason } => failed.push((name, reason)),
			}
		}

		KindOutcome::Written {
			count,
			filtered,
			failed,
		}
	}

	fn backup_object(
		&self,
		writer: &LayoutWriter,
		scope: &Scope,
		desc: &KindDescriptor,
		object: Value,
	) -> ObjectOutcome {
		let Some(name) = object
			.pointer("/metadata/name")
			.and_then(Value::as_str)
			.filter(|n| !n.is_empty())
			.map(str::to_string)
		else {
			return ObjectOutcome::Skipped {
				name: None,
				reason: SkipReason::MissingName,
			};
		};

		let sanitized = self.sanitizer.sanitize(object);
		match writer.write(scope, desc.plural, &name, &sanitized) {
			Ok(path) => ObjectOutcome::Written { name, path },
			Err(e) => ObjectOutcome::Skipped {
				name: Some(name),
				reason: SkipReason::from_layout(&e),
			},
		}
	}
}

/// Create the namespace directory and its manifest.
///
/// The namespace is recorded in the summary only once its directory exists;
/// `None` means nothing can be written for it.
fn open_namespace(
	writer: &LayoutWriter,
	namespace: &str,
	write_manifest: bool,
	summary: &mut RunSummary,
) -> Option<Scope> {
	let scope = Scope::Namespace(namespace.to_string());
	if let Err(e) = writer.ensure_scope_dir(&scope) {
		summary.skip(Some(&scope), None, None, SkipReason::from_layout(&e));
		return None;
	}
	summary.namespaces.push(namespace.to_string());

	if write_manifest {
		if let Err(e) = writer.write_namespace_manifest(namespace) {
			summary.skip(
				Some(&scope),
				Some("namespaces"),
				Some(namespace.to_string()),
				SkipReason::from_layout(&e),
			);
		}
	}
	Some(scope)
}

/// Drop excluded namespaces and sort the rest.
pub fn filter_namespaces(namespaces: Vec<String>, excluded: &[String]) -> Vec<String> {
	let mut kept: Vec<String> = namespaces
		.into_iter()
		.filter(|ns| !excluded.contains(ns))
		.collect();
	kept.sort();
	kept.dedup();
	kept
}

/// Parse `--type` values: comma-separated kind ids, where `all` (or nothing) selects every kind.
pub fn parse_kind_selection(values: &[String]) -> KindSelection {
	let ids: Vec<String> = values
		.iter()
		.flat_map(|v| v.split(','))
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.collect();

	if ids.is_empty() || ids.iter().any(|id| id.eq_ignore_ascii_case("all")) {
		KindSelection::All
	} else {
		KindSelection::Only(ids)
	}
}

pub fn parse_namespace_selection(value: &str) -> NamespaceSelection {
	let value = value.trim();
	if value.is_empty() || value.eq_ignore_ascii_case("all") {
		NamespaceSelection::All
	} else {
		NamespaceSelection::Only(value.to_string())
	}
}
