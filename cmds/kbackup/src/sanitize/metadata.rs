//! Metadata normalization shared by every kind.

use serde_json::{Map, Value};

/// Server-assigned bookkeeping fields.
const BOOKKEEPING_FIELDS: &[&str] = &[
	"creationTimestamp",
	"resourceVersion",
	"selfLink",
	"uid",
	"managedFields",
	"generation",
];

/// Annotations written by controllers and tools that mean nothing on another cluster.
pub const NON_PORTABLE_ANNOTATIONS: &[&str] = &[
	"kubectl.kubernetes.io/last-applied-configuration",
	"kubectl.kubernetes.io/restartedAt",
	"deployment.kubernetes.io/revision",
	"pv.kubernetes.io/bind-completed",
	"pv.kubernetes.io/bound-by-controller",
	"volume.beta.kubernetes.io/storage-provisioner",
	"volume.kubernetes.io/storage-provisioner",
];

/// Containers dropped when present but empty.
const ELIDE_WHEN_EMPTY: &[&str] = &["annotations", "labels", "finalizers"];

/// Embedded pod-template metadata, relative to the object root.
const TEMPLATE_METADATA_PATHS: &[&[&str]] = &[
	&["spec", "template", "metadata"],
	&["spec", "jobTemplate", "spec", "template", "metadata"],
];

/// Normalize the object's own metadata and any embedded pod-template metadata.
pub(super) fn normalize_all(object: &mut Map<String, Value>, extra_annotations: &[String]) {
	if let Some(meta) = object.get_mut("metadata").and_then(Value::as_object_mut) {
		normalize(meta, extra_annotations);
	}
	for path in TEMPLATE_METADATA_PATHS {
		if let Some(meta) = object_at_mut(object, path) {
			normalize(meta, extra_annotations);
		}
	}
}

fn normalize(meta: &mut Map<String, Value>, extra_annotations: &[String]) {
	for field in BOOKKEEPING_FIELDS {
		meta.remove(*field);
	}

	if let Some(annotations) = meta.get_mut("annotations").and_then(Value::as_object_mut) {
		annotations.retain(|key, _| {
			!NON_PORTABLE_ANNOTATIONS.contains(&key.as_str())
				&& !extra_annotations.iter().any(|extra| extra == key)
		});
	}

	for key in ELIDE_WHEN_EMPTY {
		remove_if_empty(meta, key);
	}
}

/// Remove `key` when it holds null, an empty map or an empty list.
pub(super) fn remove_if_empty(map: &mut Map<String, Value>, key: &str) {
	let empty = match map.get(key) {
		Some(Value::Null) => true,
		Some(Value::Object(inner)) => inner.is_empty(),
		Some(Value::Array(inner)) => inner.is_empty(),
		_ => false,
	};
	if empty {
		map.remove(key);
	}
}

/// Walk nested objects along `path`, stopping at the first non-object.
pub(super) fn object_at_mut<'a>(
	root: &'a mut Map<String, Value>,
	path: &[&str],
) -> Option<&'a mut Map<String, Value>> {
	let mut current = root;
	for segment in path {
		current = current.get_mut(*segment)?.as_object_mut()?;
	}
	Some(current)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn normalized(value: Value, extra: &[String]) -> Value {
		let Value::Object(mut map) = value else {
			panic!("fixture must be an object");
		};
		normalize_all(&mut map, extra);
		Value::Object(map)
	}

	#[test]
	fn test_bookkeeping_fields_removed() {
		let result = normalized(
			json!({"metadata": {
				"name": "web",
				"namespace": "prod",
				"uid": "8d3c",
				"resourceVersion": "4417",
				"generation": 7,
				"creationTimestamp": "2024-03-01T10:00:00Z",
				"selfLink": "/api/v1/namespaces/prod/configmaps/web",
				"managedFields": [{"manager": "kubectl"}]
			}}),
			&[],
		);
		assert_eq!(result, json!({"metadata": {"name": "web", "namespace": "prod"}}));
	}

	#[test]
	fn test_emptied_annotations_are_elided() {
		let result = normalized(
			json!({"metadata": {
				"name": "web",
				"annotations": {
					"kubectl.kubernetes.io/last-applied-configuration": "{}",
					"deployment.kubernetes.io/revision": "3"
				},
				"labels": {},
				"finalizers": []
			}}),
			&[],
		);
		assert_eq!(result, json!({"metadata": {"name": "web"}}));
	}

	#[test]
	fn test_user_annotations_survive() {
		let result = normalized(
			json!({"metadata": {
				"name": "web",
				"annotations": {
					"kubectl.kubernetes.io/last-applied-configuration": "{}",
					"team": "payments"
				},
				"labels": {"app": "web"}
			}}),
			&[],
		);
		assert_eq!(
			result,
			json!({"metadata": {
				"name": "web",
				"annotations": {"team": "payments"},
				"labels": {"app": "web"}
			}})
		);
	}

	#[test]
	fn test_extra_annotations_removed() {
		let result = normalized(
			json!({"metadata": {
				"name": "web",
				"annotations": {"argocd.argoproj.io/tracking-id": "x", "team": "payments"}
			}}),
			&["argocd.argoproj.io/tracking-id".to_string()],
		);
		assert_eq!(
			result,
			json!({"metadata": {"name": "web", "annotations": {"team": "payments"}}})
		);
	}

	#[test]
	fn test_pod_template_metadata() {
		let result = normalized(
			json!({
				"metadata": {"name": "nightly"},
				"spec": {"jobTemplate": {"spec": {"template": {"metadata": {
					"creationTimestamp": null,
					"annotations": {"kubectl.kubernetes.io/restartedAt": "2024-01-01T00:00:00Z"},
					"labels": {"app": "nightly"}
				}}}}}
			}),
			&[],
		);
		assert_eq!(
			result,
			json!({
				"metadata": {"name": "nightly"},
				"spec": {"jobTemplate": {"spec": {"template": {"metadata": {
					"labels": {"app": "nightly"}
				}}}}}
			})
		);
	}
}
