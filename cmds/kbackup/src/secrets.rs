//! Eligibility filter for Secret objects.
//!
//! Platform-generated credentials (service-account tokens, Helm release
//! storage, registry and TLS material bound to one cluster) are regenerated on
//! the target or are unsafe to replay, so they never leave the cluster.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Secret types that are never exported.
pub const EXCLUDED_TYPES: &[&str] = &[
	"kubernetes.io/service-account-token",
	"kubernetes.io/dockerconfigjson",
	"kubernetes.io/dockercfg",
	"kubernetes.io/basic-auth",
	"kubernetes.io/tls",
	"helm.sh/release.v1",
];

const HELM_RELEASE_PREFIX: &str = "sh.helm.release.v1.";

/// Legacy token secrets are named `<serviceaccount>-token-<suffix>`, where the
/// suffix is 5 characters from the API server's generated-name alphabet
/// (no vowels, no `0`, `1`, `3`).
static GENERATED_TOKEN_NAME: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"-token-[bcdfghjklmnpqrstvwxz2456789]{5}$").expect("valid regex")
});

/// Whether a secret name follows the service-account token naming convention.
pub fn is_generated_token_name(name: &str) -> bool {
	name.contains("default-token") || GENERATED_TOKEN_NAME.is_match(name)
}

/// Decide whether a Secret object may be written to the backup.
///
/// Objects without a name are rejected as well: they cannot be laid out on
/// disk and would be skipped later anyway.
pub fn is_exportable(secret: &Value) -> bool {
	let Some(name) = secret.pointer("/metadata/name").and_then(Value::as_str) else {
		return false;
	};

	if is_generated_token_name(name) || name.starts_with(HELM_RELEASE_PREFIX) {
		return false;
	}

	match secret.get("type").and_then(Value::as_str) {
		Some(ty) => !EXCLUDED_TYPES.contains(&ty),
		None => true,
	}
}
