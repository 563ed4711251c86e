//! Object sanitization.
//!
//! Turns a live object as returned by the API server into a manifest that can
//! be applied to another cluster. The transformation only removes or
//! normalizes well-known keys; everything else passes through untouched and in
//! its original order. Both [`Sanitizer::clean`] and [`Sanitizer::sanitize`]
//! are idempotent.

mod kinds;
mod metadata;
pub mod text;

pub use kinds::KindPolicy;
pub use metadata::NON_PORTABLE_ANNOTATIONS;
use serde::Deserialize;
use serde_json::Value;

/// What to do with `spec.replicas` on Deployments and StatefulSets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicasPolicy {
	/// Keep the observed replica count.
	#[default]
	Preserve,
	/// Drop it, leaving scaling to the target cluster (or its autoscaler).
	Strip,
}

#[derive(Debug, Clone, Default)]
pub struct SanitizeOptions {
	pub replicas: ReplicasPolicy,
	/// Annotation keys removed in addition to [`NON_PORTABLE_ANNOTATIONS`].
	pub extra_annotations: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
	options: SanitizeOptions,
}

impl Sanitizer {
	pub fn new(options: SanitizeOptions) -> Self {
		Self { options }
	}

	/// Remove runtime state, server bookkeeping and cluster-bound fields.
	///
	/// Non-object values are returned unchanged.
	pub fn clean(&self, object: Value) -> Value {
		let Value::Object(mut map) = object else {
			return object;
		};

		map.remove("status");
		metadata::normalize_all(&mut map, &self.options.extra_annotations);
		policy_of(&map).apply(&mut map, &self.options);

		Value::Object(map)
	}

	/// [`clean`](Self::clean) followed by text normalization of free-form payloads.
	pub fn sanitize(&self, object: Value) -> Value {
		let mut object = self.clean(object);
		if let Value::Object(map) = &mut object {
			for key in policy_of(map).text_payload_keys() {
				if let Some(payload) = map.get_mut(*key) {
					text::normalize_value(payload);
				}
			}
		}
		object
	}
}

fn policy_of(map: &serde_json::Map<String, Value>) -> KindPolicy {
	map.get("kind")
		.and_then(Value::as_str)
		.map_or(KindPolicy::PassThrough, KindPolicy::for_kind)
}

/// Clean with default options.
pub fn clean(object: Value) -> Value {
	Sanitizer::default().clean(object)
}

#[cfg(test)]
mod tests {
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	fn deployment() -> Value {
		json!({
			"apiVersion": "apps/v1",
			"kind": "Deployment",
			"metadata": {
				"name": "api",
				"namespace": "prod",
				"uid": "0b6f",
				"resourceVersion": "991",
				"generation": 4,
				"annotations": {
					"kubectl.kubernetes.io/last-applied-configuration": "{\"kind\":\"Deployment\"}",
					"deployment.kubernetes.io/revision": "4"
				},
				"labels": {"app": "api"}
			},
			"spec": {
				"replicas": 3,
				"selector": {"matchLabels": {"app": "api"}},
				"template": {
					"metadata": {"creationTimestamp": null, "labels": {"app": "api"}},
					"spec": {"containers": [{"name": "api", "image": "api:1.4"}]}
				}
			},
			"status": {"replicas": 3, "readyReplicas": 3}
		})
	}

	fn service() -> Value {
		json!({
			"apiVersion": "v1",
			"kind": "Service",
			"metadata": {"name": "api", "namespace": "prod", "annotations": {}},
			"spec": {
				"type": "LoadBalancer",
				"clusterIP": "10.96.0.4",
				"ports": [{"port": 443, "nodePort": 30443}]
			},
			"status": {"loadBalancer": {}}
		})
	}

	fn config_map() -> Value {
		json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": "nginx", "namespace": "prod"},
			"data": {"nginx.conf": "events {}\\nhttp {\r\n}\\n"}
		})
	}

	fn generated_job() -> Value {
		json!({
			"apiVersion": "batch/v1",
			"kind": "Job",
			"metadata": {"name": "migrate", "namespace": "prod", "uid": "1f0c"},
			"spec": {
				"selector": {"matchLabels": {"batch.kubernetes.io/controller-uid": "1f0c"}},
				"template": {
					"metadata": {
						"creationTimestamp": null,
						"labels": {
							"controller-uid": "1f0c",
							"batch.kubernetes.io/controller-uid": "1f0c"
						}
					},
					"spec": {"restartPolicy": "Never", "containers": [{"name": "migrate", "image": "migrate:2"}]}
				}
			},
			"status": {"succeeded": 1}
		})
	}

	fn service_account() -> Value {
		json!({
			"apiVersion": "v1",
			"kind": "ServiceAccount",
			"metadata": {"name": "builder", "namespace": "ci"},
			"secrets": [{"name": "builder-token-x2k9q"}]
		})
	}

	fn headless_service() -> Value {
		json!({
			"apiVersion": "v1",
			"kind": "Service",
			"metadata": {"name": "db", "namespace": "prod"},
			"spec": {"clusterIP": "None", "clusterIPs": ["None"], "ports": [{"port": 5432}]},
			"status": {"loadBalancer": {}}
		})
	}

	fn persistent_volume() -> Value {
		json!({
			"apiVersion": "v1",
			"kind": "PersistentVolume",
			"metadata": {"name": "pv-data"},
			"spec": {
				"capacity": {"storage": "10Gi"},
				"claimRef": {"name": "data", "namespace": "prod", "uid": "77aa"}
			},
			"status": {"phase": "Bound"}
		})
	}

	fn persistent_volume_claim() -> Value {
		json!({
			"apiVersion": "v1",
			"kind": "PersistentVolumeClaim",
			"metadata": {"name": "data", "namespace": "prod"},
			"spec": {"storageClassName": "ssd", "volumeName": "pv-data"},
			"status": {"phase": "Bound"}
		})
	}

	fn cron_job() -> Value {
		json!({
			"apiVersion": "batch/v1",
			"kind": "CronJob",
			"metadata": {"name": "nightly", "namespace": "prod"},
			"spec": {
				"schedule": "0 3 * * *",
				"jobTemplate": {"spec": {"template": {
					"metadata": {"creationTimestamp": null},
					"spec": {"restartPolicy": "OnFailure", "containers": [{"name": "report", "image": "report:1"}]}
				}}}
			},
			"status": {"lastScheduleTime": "2024-05-01T03:00:00Z"}
		})
	}

	#[test]
	fn test_clean_deployment() {
		let cleaned = clean(deployment());
		assert_eq!(
			cleaned,
			json!({
				"apiVersion": "apps/v1",
				"kind": "Deployment",
				"metadata": {"name": "api", "namespace": "prod", "labels": {"app": "api"}},
				"spec": {
					"replicas": 3,
					"selector": {"matchLabels": {"app": "api"}},
					"template": {
						"metadata": {"labels": {"app": "api"}},
						"spec": {"containers": [{"name": "api", "image": "api:1.4"}]}
					}
				}
			})
		);
	}

	#[test]
	fn test_clean_keeps_key_order() {
		let cleaned = clean(deployment());
		let keys: Vec<_> = cleaned.as_object().unwrap().keys().cloned().collect();
		assert_eq!(keys, vec!["apiVersion", "kind", "metadata", "spec"]);
	}

	#[rstest]
	#[case(deployment())]
	#[case(service())]
	#[case(config_map())]
	#[case(generated_job())]
	#[case(service_account())]
	#[case(headless_service())]
	#[case(persistent_volume())]
	#[case(persistent_volume_claim())]
	#[case(cron_job())]
	#[case(json!({"kind": "Widget", "status": {"phase": "Ready"}, "rules": []}))]
	#[case(json!({"metadata": null}))]
	#[case(json!("not an object"))]
	fn test_status_removed_and_idempotent(#[case] input: Value) {
		let sanitizer = Sanitizer::default();
		let once = sanitizer.sanitize(input);
		assert!(once.get("status").is_none());
		assert_eq!(sanitizer.sanitize(once.clone()), once);
		assert_eq!(sanitizer.clean(once.clone()), once);
	}

	#[test]
	fn test_kind_specific_fields_settle_after_one_pass() {
		let sanitizer = Sanitizer::default();

		let job = sanitizer.sanitize(generated_job());
		assert!(job.pointer("/spec/selector").is_none());
		assert_eq!(job.pointer("/spec/template/metadata"), Some(&json!({})));

		let account = sanitizer.sanitize(service_account());
		assert!(account.get("secrets").is_none());

		let headless = sanitizer.sanitize(headless_service());
		assert_eq!(headless["spec"]["clusterIP"], "None");

		let volume = sanitizer.sanitize(persistent_volume());
		assert!(volume.pointer("/spec/claimRef").is_none());

		let claim = sanitizer.sanitize(persistent_volume_claim());
		assert!(claim.pointer("/spec/volumeName").is_none());

		let cron = sanitizer.sanitize(cron_job());
		assert_eq!(
			cron.pointer("/spec/jobTemplate/spec/template/metadata"),
			Some(&json!({}))
		);
	}

	#[test]
	fn test_unknown_kind_keeps_other_keys() {
		let cleaned = clean(json!({
			"apiVersion": "example.com/v1",
			"kind": "Widget",
			"metadata": {"name": "w", "uid": "1"},
			"spec": {"clusterIP": "10.0.0.1"},
			"rules": [{"verbs": ["get"]}]
		}));
		assert_eq!(
			cleaned,
			json!({
				"apiVersion": "example.com/v1",
				"kind": "Widget",
				"metadata": {"name": "w"},
				"spec": {"clusterIP": "10.0.0.1"},
				"rules": [{"verbs": ["get"]}]
			})
		);
	}

	#[test]
	fn test_sanitize_normalizes_config_map_text() {
		let sanitized = Sanitizer::default().sanitize(config_map());
		assert_eq!(sanitized["data"]["nginx.conf"], json!("events {}\nhttp {\n}\n"));
	}

	#[test]
	fn test_clean_does_not_touch_text() {
		let cleaned = clean(config_map());
		assert_eq!(cleaned["data"]["nginx.conf"], json!("events {}\\nhttp {\r\n}\\n"));
	}

	#[test]
	fn test_secret_data_is_not_normalized() {
		let sanitized = Sanitizer::default().sanitize(json!({
			"kind": "Secret",
			"metadata": {"name": "s"},
			"data": {"raw": "YVxuYg=="},
			"stringData": {"script": "echo a\\nb"}
		}));
		assert_eq!(sanitized["data"]["raw"], json!("YVxuYg=="));
		assert_eq!(sanitized["stringData"]["script"], json!("echo a\nb"));
	}
}
