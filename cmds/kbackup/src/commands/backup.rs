//! Backup command handler.
//!
//! Merges flags with the config file, connects to the cluster, runs the
//! backup and prints a report with restore instructions.

use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tabwriter::TabWriter;

use crate::{
	backup::{parse_kind_selection, parse_namespace_selection, Backup, BackupOpts, RunSummary},
	config::KbackupConfig,
	k8s::{
		client::{ClusterConnection, ConnectOpts},
		GLOBAL_SCOPE_DIR,
	},
	registry::KindRegistry,
};

#[derive(Args)]
pub struct BackupArgs {
	/// Namespace to back up, or "all"
	#[arg(short = 'n', long, default_value = "all")]
	pub namespace: String,

	/// Comma-separated resource types to back up (see `kbackup kinds`), or "all"
	#[arg(short = 't', long = "type", value_name = "TYPES")]
	pub types: Vec<String>,

	/// Directory that receives the timestamped backup directory
	#[arg(short = 'o', long, default_value = ".")]
	pub output_dir: PathBuf,

	/// Namespace to leave out when backing up all namespaces (default: kube-system)
	#[arg(long = "exclude-namespace", value_name = "NAMESPACE", value_delimiter = ',')]
	pub exclude_namespaces: Vec<String>,

	/// Do not export Secrets at all
	#[arg(long)]
	pub skip_secrets: bool,

	/// Do not export cluster-scoped resources
	#[arg(long)]
	pub skip_cluster_resources: bool,

	/// Do not write a _namespace.yaml into each namespace directory
	#[arg(long)]
	pub no_namespace_manifests: bool,

	/// Path to the kubeconfig file (default: $KUBECONFIG or ~/.kube/config, then in-cluster)
	#[arg(long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use instead of the current one
	#[arg(long)]
	pub context: Option<String>,

	/// Config file to use instead of searching for .kbackup.yaml
	#[arg(long)]
	pub config: Option<PathBuf>,
}

impl BackupArgs {
	fn connect_opts(&self) -> ConnectOpts {
		ConnectOpts {
			kubeconfig: self.kubeconfig.clone(),
			context: self.context.clone(),
		}
	}

	/// Flags win over the config file, the config file wins over defaults.
	pub fn backup_opts(&self, config: &KbackupConfig) -> BackupOpts {
		let kinds = if self.types.is_empty() {
			parse_kind_selection(config.kinds.as_deref().unwrap_or_default())
		} else {
			parse_kind_selection(&self.types)
		};

		let exclude_namespaces = if self.exclude_namespaces.is_empty() {
			config.excluded_namespaces()
		} else {
			self.exclude_namespaces.clone()
		};

		BackupOpts {
			namespaces: parse_namespace_selection(&self.namespace),
			kinds,
			output_dir: self.output_dir.clone(),
			exclude_namespaces,
			skip_secrets: self.skip_secrets || config.skip_secrets.unwrap_or(false),
			skip_cluster_resources: self.skip_cluster_resources
				|| config.skip_cluster_resources.unwrap_or(false),
			namespace_manifests: !self.no_namespace_manifests
				&& config.namespace_manifests.unwrap_or(true),
			sanitize: config.sanitize_options(),
		}
	}
}

/// Run the backup command.
pub fn run<W: Write>(args: BackupArgs, writer: W) -> Result<()> {
	let cwd = std::env::current_dir().context("resolving working directory")?;
	let config = KbackupConfig::resolve(args.config.as_deref(), &cwd)?;
	let opts = args.backup_opts(&config);

	// Calls are made strictly one after another, a single thread is enough.
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("creating tokio runtime")?;

	runtime
		.block_on(run_async(args.connect_opts(), opts, writer))
		.map(|_| ())
}

async fn run_async<W: Write>(
	connect: ConnectOpts,
	opts: BackupOpts,
	writer: W,
) -> Result<RunSummary> {
	tracing::debug!("connecting to Kubernetes cluster");
	let conn = ClusterConnection::connect(&connect)
		.await
		.context("connecting to Kubernetes cluster")?;
	tracing::info!(
		cluster = %conn.cluster_identifier(),
		server_version = %conn.server_version().git_version,
		"connected to cluster"
	);

	backup_with_connection(&conn, &KindRegistry::builtin(), opts, writer).await
}

/// Run a backup over an existing connection and print the report.
pub async fn backup_with_connection<W: Write>(
	conn: &ClusterConnection,
	registry: &KindRegistry,
	opts: BackupOpts,
	mut writer: W,
) -> Result<RunSummary> {
	let summary = Backup::new(conn, registry, opts).run().await?;
	write_report(&summary, &mut writer)?;
	Ok(summary)
}

/// Human-readable summary, including how to restore.
pub fn write_report<W: Write>(summary: &RunSummary, writer: &mut W) -> Result<()> {
	writeln!(
		writer,
		"Backup completed in {:.1}s: {} objects written",
		summary.elapsed.as_secs_f64(),
		summary.total
	)?;
	if summary.filtered_secrets > 0 {
		writeln!(
			writer,
			"Filtered out {} internal secrets",
			summary.filtered_secrets
		)?;
	}

	if !summary.per_kind.is_empty() {
		writeln!(writer)?;
		let mut table = TabWriter::new(&mut *writer);
		for (kind, count) in &summary.per_kind {
			writeln!(table, "  {kind}\t{count}")?;
		}
		table.flush()?;
	}

	if !summary.skipped.is_empty() {
		writeln!(writer, "\nSkipped:")?;
		for unit in &summary.skipped {
			writeln!(writer, "  {unit}")?;
		}
	}

	let root = summary.root.display();
	writeln!(writer, "\nBackup location: {root}")?;
	writeln!(writer, "\nTo restore:")?;
	if summary.cluster_objects > 0 {
		writeln!(writer, "  kubectl apply -R -f {root}/{GLOBAL_SCOPE_DIR}/")?;
	}
	for namespace in &summary.namespaces {
		writeln!(writer, "  kubectl apply -R -f {root}/{namespace}/")?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;
	use crate::{
		backup::{KindSelection, NamespaceSelection},
		sanitize::ReplicasPolicy,
	};

	#[derive(Parser)]
	struct TestCli {
		#[command(flatten)]
		args: BackupArgs,
	}

	fn parse(argv: &[&str]) -> BackupArgs {
		TestCli::parse_from(std::iter::once("kbackup").chain(argv.iter().copied())).args
	}

	#[test]
	fn test_defaults() {
		let opts = parse(&[]).backup_opts(&KbackupConfig::default());
		assert_eq!(opts.namespaces, NamespaceSelection::All);
		assert_eq!(opts.kinds, KindSelection::All);
		assert_eq!(opts.exclude_namespaces, vec!["kube-system"]);
		assert!(!opts.skip_secrets);
		assert!(!opts.skip_cluster_resources);
		assert!(opts.namespace_manifests);
		assert_eq!(opts.output_dir, PathBuf::from("."));
	}

	#[test]
	fn test_flags() {
		let opts = parse(&[
			"-n",
			"prod",
			"-t",
			"deployments,secrets",
			"-o",
			"/backups",
			"--exclude-namespace",
			"a,b",
			"--skip-secrets",
			"--skip-cluster-resources",
			"--no-namespace-manifests",
		])
		.backup_opts(&KbackupConfig::default());

		assert_eq!(opts.namespaces, NamespaceSelection::Only("prod".to_string()));
		assert_eq!(
			opts.kinds,
			KindSelection::Only(vec!["deployments".to_string(), "secrets".to_string()])
		);
		assert_eq!(opts.output_dir, PathBuf::from("/backups"));
		assert_eq!(opts.exclude_namespaces, vec!["a", "b"]);
		assert!(opts.skip_secrets);
		assert!(opts.skip_cluster_resources);
		assert!(!opts.namespace_manifests);
	}

	#[test]
	fn test_config_fills_unset_flags() {
		let config = KbackupConfig {
			exclude_namespaces: Some(vec!["monitoring".to_string()]),
			kinds: Some(vec!["configmaps".to_string()]),
			skip_secrets: Some(true),
			namespace_manifests: Some(false),
			sanitize: crate::config::SanitizeConfig {
				replicas: Some(ReplicasPolicy::Strip),
				strip_annotations: vec![],
			},
			..KbackupConfig::default()
		};

		let opts = parse(&[]).backup_opts(&config);
		assert_eq!(opts.kinds, KindSelection::Only(vec!["configmaps".to_string()]));
		assert_eq!(opts.exclude_namespaces, vec!["monitoring"]);
		assert!(opts.skip_secrets);
		assert!(!opts.namespace_manifests);
		assert_eq!(opts.sanitize.replicas, ReplicasPolicy::Strip);

		let opts = parse(&["-t", "all", "--exclude-namespace", "kube-public"]).backup_opts(&config);
		assert_eq!(opts.kinds, KindSelection::All);
		assert_eq!(opts.exclude_namespaces, vec!["kube-public"]);
	}

	#[test]
	fn test_report() {
		let summary = RunSummary {
			root: PathBuf::from("/backups/k8s-backup-20240309070501"),
			per_kind: [("configmaps", 2), ("persistentvolumes", 1)].into_iter().collect(),
			total: 3,
			filtered_secrets: 2,
			namespaces: vec!["prod".to_string()],
			cluster_objects: 1,
			skipped: vec![],
			elapsed: std::time::Duration::from_millis(1500),
		};

		let mut out = Vec::new();
		write_report(&summary, &mut out).unwrap();
		let text = String::from_utf8(out).unwrap();

		assert!(text.contains("3 objects written"));
		assert!(text.contains("Filtered out 2 internal secrets"));
		assert!(text.contains("kubectl apply -R -f /backups/k8s-backup-20240309070501/_global/"));
		assert!(text.contains("kubectl apply -R -f /backups/k8s-backup-20240309070501/prod/"));
		assert!(!text.contains("Skipped:"));
	}
}
