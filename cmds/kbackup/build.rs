use std::process::Command;

fn main() {
	println!("cargo:rerun-if-changed=.git/HEAD");
	println!("cargo:rerun-if-changed=.git/refs/");

	println!("cargo:rustc-env=KBACKUP_VERSION={}", resolve_version());
}

/// Pick the version reported by `kbackup --version`.
///
/// Release builds stamp the package version; dev builds fall back to the
/// exact git tag on HEAD, then to the short commit hash.
fn resolve_version() -> String {
	let package_version = env!("CARGO_PKG_VERSION");
	if package_version != "0.1.0" {
		return package_version.to_string();
	}

	if let Some(tag) = git(&["describe", "--tags", "--exact-match", "HEAD"]) {
		return tag.trim_start_matches('v').to_string();
	}

	git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| package_version.to_string())
}

fn git(args: &[&str]) -> Option<String> {
	let output = Command::new("git").args(args).output().ok()?;
	if !output.status.success() {
		return None;
	}
	let text = String::from_utf8(output.stdout).ok()?;
	Some(text.trim().to_string())
}
