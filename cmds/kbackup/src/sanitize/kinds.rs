//! Kind-specific normalization strategies.

use serde_json::{Map, Value};

use super::{
	metadata::{object_at_mut, remove_if_empty},
	ReplicasPolicy, SanitizeOptions,
};
use crate::secrets::is_generated_token_name;

/// Labels the job controller stamps onto pod templates together with the generated selector.
const JOB_CONTROLLER_LABELS: &[&str] = &["controller-uid", "batch.kubernetes.io/controller-uid"];

/// Normalization strategy, chosen once per object from its `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindPolicy {
	Service,
	/// Deployment and StatefulSet.
	Workload,
	Job,
	PersistentVolume,
	PersistentVolumeClaim,
	ServiceAccount,
	ConfigMap,
	Secret,
	PassThrough,
}

impl KindPolicy {
	pub fn for_kind(kind: &str) -> Self {
		match kind {
			"Service" => Self::Service,
			"Deployment" | "StatefulSet" => Self::Workload,
			"Job" => Self::Job,
			"PersistentVolume" => Self::PersistentVolume,
			"PersistentVolumeClaim" => Self::PersistentVolumeClaim,
			"ServiceAccount" => Self::ServiceAccount,
			"ConfigMap" => Self::ConfigMap,
			"Secret" => Self::Secret,
			_ => Self::PassThrough,
		}
	}

	/// Top-level keys holding free-form text that gets normalized.
	pub fn text_payload_keys(self) -> &'static [&'static str] {
		match self {
			Self::ConfigMap => &["data"],
			Self::Secret => &["stringData"],
			_ => &[],
		}
	}

	pub(super) fn apply(self, object: &mut Map<String, Value>, options: &SanitizeOptions) {
		match self {
			Self::Service => {
				if let Some(spec) = spec_mut(object) {
					normalize_service(spec);
				}
			}
			Self::Workload => {
				if options.replicas == ReplicasPolicy::Strip {
					if let Some(spec) = spec_mut(object) {
						spec.remove("replicas");
					}
				}
			}
			Self::Job => normalize_job(object),
			Self::PersistentVolume => {
				if let Some(spec) = spec_mut(object) {
					spec.remove("claimRef");
				}
			}
			Self::PersistentVolumeClaim => {
				if let Some(spec) = spec_mut(object) {
					spec.remove("volumeName");
				}
			}
			Self::ServiceAccount => normalize_service_account(object),
			Self::ConfigMap | Self::Secret | Self::PassThrough => {}
		}
	}
}

fn spec_mut(object: &mut Map<String, Value>) -> Option<&mut Map<String, Value>> {
	object.get_mut("spec").and_then(Value::as_object_mut)
}

fn normalize_service(spec: &mut Map<String, Value>) {
	// Headless services carry `clusterIP: None` as intent, not as an allocation.
	let headless = spec.get("clusterIP").and_then(Value::as_str) == Some("None");
	if !headless {
		spec.remove("clusterIP");
		spec.remove("clusterIPs");
	}
	spec.remove("ipFamilies");
	spec.remove("ipFamilyPolicy");

	if spec.get("type").and_then(Value::as_str) == Some("NodePort") {
		return;
	}
	if let Some(ports) = spec.get_mut("ports").and_then(Value::as_array_mut) {
		for port in ports.iter_mut().filter_map(Value::as_object_mut) {
			port.remove("nodePort");
		}
	}
}

fn normalize_job(object: &mut Map<String, Value>) {
	let Some(spec) = spec_mut(object) else {
		return;
	};
	if spec.get("manualSelector").and_then(Value::as_bool) == Some(true) {
		return;
	}
	spec.remove("selector");

	if let Some(template_meta) = object_at_mut(spec, &["template", "metadata"]) {
		if let Some(labels) = template_meta
			.get_mut("labels")
			.and_then(Value::as_object_mut)
		{
			for label in JOB_CONTROLLER_LABELS {
				labels.remove(*label);
			}
		}
		remove_if_empty(template_meta, "labels");
	}
}

fn normalize_service_account(object: &mut Map<String, Value>) {
	if let Some(secrets) = object.get_mut("secrets").and_then(Value::as_array_mut) {
		secrets.retain(|entry| {
			entry
				.get("name")
				.and_then(Value::as_str)
				.is_none_or(|name| !is_generated_token_name(name))
		});
	}
	remove_if_empty(object, "secrets");
}

#[cfg(test)]
mod tests {
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	fn apply(policy: KindPolicy, value: Value, options: &SanitizeOptions) -> Value {
		let Value::Object(mut map) = value else {
			panic!("fixture must be an object");
		};
		policy.apply(&mut map, options);
		Value::Object(map)
	}

	#[rstest]
	#[case("Service", KindPolicy::Service)]
	#[case("Deployment", KindPolicy::Workload)]
	#[case("StatefulSet", KindPolicy::Workload)]
	#[case("DaemonSet", KindPolicy::PassThrough)]
	#[case("service", KindPolicy::PassThrough)]
	#[case("", KindPolicy::PassThrough)]
	fn test_for_kind(#[case] kind: &str, #[case] expected: KindPolicy) {
		assert_eq!(KindPolicy::for_kind(kind), expected);
	}

	#[rstest]
	#[case("ClusterIP", false)]
	#[case("LoadBalancer", false)]
	#[case("NodePort", true)]
	fn test_service_node_port(#[case] service_type: &str, #[case] kept: bool) {
		let result = apply(
			KindPolicy::Service,
			json!({"spec": {
				"type": service_type,
				"clusterIP": "10.0.0.12",
				"clusterIPs": ["10.0.0.12"],
				"ipFamilies": ["IPv4"],
				"ipFamilyPolicy": "SingleStack",
				"ports": [{"port": 80, "targetPort": 8080, "nodePort": 31000}]
			}}),
			&SanitizeOptions::default(),
		);
		let port = &result["spec"]["ports"][0];
		assert_eq!(port.get("nodePort").is_some(), kept);
		assert_eq!(port["port"], json!(80));
		assert!(result["spec"].get("clusterIP").is_none());
		assert!(result["spec"].get("clusterIPs").is_none());
		assert!(result["spec"].get("ipFamilies").is_none());
		assert!(result["spec"].get("ipFamilyPolicy").is_none());
	}

	#[test]
	fn test_service_without_type_strips_node_port() {
		let result = apply(
			KindPolicy::Service,
			json!({"spec": {"ports": [{"port": 80, "nodePort": 31000}]}}),
			&SanitizeOptions::default(),
		);
		assert_eq!(result, json!({"spec": {"ports": [{"port": 80}]}}));
	}

	#[test]
	fn test_headless_service_keeps_cluster_ip() {
		let input = json!({"spec": {
			"clusterIP": "None",
			"clusterIPs": ["None"],
			"externalTrafficPolicy": "Local",
			"ports": [{"port": 5432}]
		}});
		let result = apply(KindPolicy::Service, input.clone(), &SanitizeOptions::default());
		assert_eq!(result, input);
	}

	#[rstest]
	#[case(ReplicasPolicy::Preserve, Some(3))]
	#[case(ReplicasPolicy::Strip, None)]
	fn test_workload_replicas(#[case] replicas: ReplicasPolicy, #[case] expected: Option<i64>) {
		let options = SanitizeOptions {
			replicas,
			..SanitizeOptions::default()
		};
		let result = apply(
			KindPolicy::Workload,
			json!({"spec": {
				"replicas": 3,
				"revisionHistoryLimit": 10,
				"selector": {"matchLabels": {"app": "api"}},
				"template": {"metadata": {"labels": {"app": "api"}}}
			}}),
			&options,
		);
		assert_eq!(result["spec"]["replicas"].as_i64(), expected);
		assert_eq!(result["spec"]["selector"], json!({"matchLabels": {"app": "api"}}));
		assert_eq!(result["spec"]["revisionHistoryLimit"], json!(10));
	}

	#[test]
	fn test_job_generated_selector_removed() {
		let result = apply(
			KindPolicy::Job,
			json!({"spec": {
				"selector": {"matchLabels": {"batch.kubernetes.io/controller-uid": "1f0c"}},
				"template": {"metadata": {"labels": {
					"controller-uid": "1f0c",
					"batch.kubernetes.io/controller-uid": "1f0c"
				}}}
			}}),
			&SanitizeOptions::default(),
		);
		assert_eq!(result, json!({"spec": {"template": {"metadata": {}}}}));
	}

	#[test]
	fn test_job_manual_selector_preserved() {
		let input = json!({"spec": {
			"manualSelector": true,
			"selector": {"matchLabels": {"controller-uid": "mine"}},
			"template": {"metadata": {"labels": {"controller-uid": "mine"}}}
		}});
		let result = apply(KindPolicy::Job, input.clone(), &SanitizeOptions::default());
		assert_eq!(result, input);
	}

	#[test]
	fn test_volume_bindings_removed() {
		let pv = apply(
			KindPolicy::PersistentVolume,
			json!({"spec": {"capacity": {"storage": "1Gi"}, "claimRef": {"name": "data"}}}),
			&SanitizeOptions::default(),
		);
		assert_eq!(pv, json!({"spec": {"capacity": {"storage": "1Gi"}}}));

		let pvc = apply(
			KindPolicy::PersistentVolumeClaim,
			json!({"spec": {"storageClassName": "ssd", "volumeName": "pvc-7a1e"}}),
			&SanitizeOptions::default(),
		);
		assert_eq!(pvc, json!({"spec": {"storageClassName": "ssd"}}));
	}

	#[test]
	fn test_service_account_token_references() {
		let result = apply(
			KindPolicy::ServiceAccount,
			json!({
				"metadata": {"name": "builder"},
				"secrets": [
					{"name": "builder-token-x2k9q"},
					{"name": "builder-extra"},
					{"name": "slack-token-admin"}
				]
			}),
			&SanitizeOptions::default(),
		);
		assert_eq!(
			result,
			json!({
				"metadata": {"name": "builder"},
				"secrets": [{"name": "builder-extra"}, {"name": "slack-token-admin"}]
			})
		);

		let result = apply(
			KindPolicy::ServiceAccount,
			json!({"metadata": {"name": "default"}, "secrets": [{"name": "default-token-abcde"}]}),
			&SanitizeOptions::default(),
		);
		assert_eq!(result, json!({"metadata": {"name": "default"}}));
	}
}
