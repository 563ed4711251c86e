use anyhow::Result;
use clap::{Parser, Subcommand};
use kbackup::{
	commands::{self, util::BrokenPipeGuard},
	telemetry,
};

#[cfg(all(
	target_os = "linux",
	feature = "mimalloc",
	not(feature = "system-alloc")
))]
#[global_allocator]
static GLOBAL: mimallocator::Mimalloc = mimallocator::Mimalloc;

#[derive(Parser)]
#[command(name = "kbackup")]
#[command(about = "Back up Kubernetes objects as sanitized, re-appliable YAML", long_about = None)]
#[command(version = env!("KBACKUP_VERSION"))]
struct Cli {
	/// Log level (trace, debug, info, warn, error). Defaults to RUST_LOG, then info
	#[arg(long, global = true)]
	log_level: Option<tracing::Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Export cluster objects into a timestamped directory tree
	Backup(commands::backup::BackupArgs),

	/// List the resource types that can be backed up
	Kinds(commands::kinds::KindsArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	let _telemetry = telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	match cli.command {
		Commands::Backup(args) => commands::backup::run(args, stdout),
		Commands::Kinds(args) => commands::kinds::run(args, stdout),
	}
}
