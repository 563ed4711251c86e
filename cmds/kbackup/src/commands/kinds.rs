//! Kinds command handler: prints the resource types a backup can include.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use tabwriter::TabWriter;

use crate::registry::KindRegistry;

#[derive(Args)]
pub struct KindsArgs {
	/// Print only plural names, one per line
	#[arg(long)]
	pub names: bool,
}

/// Run the kinds command.
pub fn run<W: Write>(args: KindsArgs, writer: W) -> Result<()> {
	write_kinds(&KindRegistry::builtin(), args.names, writer)
}

fn write_kinds<W: Write>(registry: &KindRegistry, names_only: bool, mut writer: W) -> Result<()> {
	if names_only {
		for plural in registry.all_kinds() {
			writeln!(writer, "{plural}")?;
		}
		return Ok(());
	}

	let mut table = TabWriter::new(writer);
	writeln!(table, "NAME\tKIND\tAPIVERSION\tSCOPE")?;
	for desc in registry.iter() {
		let scope = if desc.is_namespaced() {
			"Namespaced"
		} else {
			"Cluster"
		};
		writeln!(
			table,
			"{}\t{}\t{}\t{}",
			desc.plural,
			desc.kind,
			desc.api_version(),
			scope
		)?;
	}
	table.flush()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::commands::util::{tests::BrokenPipeWriter, BrokenPipeGuard};

	#[test]
	fn test_table_lists_every_kind() {
		let registry = KindRegistry::builtin();
		let mut out = Vec::new();
		write_kinds(&registry, false, &mut out).unwrap();
		let text = String::from_utf8(out).unwrap();

		let lines: Vec<_> = text.lines().collect();
		assert_eq!(lines.len(), registry.len() + 1);
		assert!(lines[0].starts_with("NAME"));
		assert!(text.contains("horizontalpodautoscalers"));
		let pv = lines.iter().find(|l| l.starts_with("persistentvolumes ")).unwrap();
		assert!(pv.ends_with("Cluster"));
	}

	#[test]
	fn test_names_only() {
		let mut out = Vec::new();
		write_kinds(&KindRegistry::builtin(), true, &mut out).unwrap();
		let text = String::from_utf8(out).unwrap();
		assert_eq!(text.lines().next(), Some("configmaps"));
	}

	#[test]
	fn test_kinds_exits_cleanly_on_broken_pipe() {
		let writer = BrokenPipeGuard::new(BrokenPipeWriter);
		assert!(run(KindsArgs { names: false }, writer).is_ok());
	}
}
