//! Permission checks before listing.
//!
//! Asking the authorization API up front keeps "forbidden" apart from
//! transport failures and avoids half-failed list calls.

use k8s_openapi::api::authorization::v1::{
	ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::{api::PostParams, Api, Client};
use tracing::instrument;

use crate::registry::KindDescriptor;

/// Result of asking whether a kind may be listed in a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
	Allowed,
	/// The review was answered and the verb is not permitted.
	Denied { reason: String },
	/// The review itself could not be performed.
	Unverifiable { error: String },
}

/// Answers `may I list <kind> in <namespace>` for the current credentials.
#[derive(Clone)]
pub struct AccessGate {
	client: Client,
}

impl AccessGate {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	#[instrument(skip_all, fields(kind = desc.plural, namespace = namespace.unwrap_or_default()))]
	pub async fn can_list(&self, desc: &KindDescriptor, namespace: Option<&str>) -> AccessDecision {
		let review = list_review(desc, namespace);
		let api: Api<SelfSubjectAccessReview> = Api::all(self.client.clone());

		let response = match api.create(&PostParams::default(), &review).await {
			Ok(response) => response,
			Err(e) => {
				return AccessDecision::Unverifiable {
					error: e.to_string(),
				}
			}
		};

		match response.status {
			Some(status) if status.allowed => AccessDecision::Allowed,
			Some(status) => AccessDecision::Denied {
				reason: status
					.reason
					.filter(|r| !r.is_empty())
					.or(status.evaluation_error)
					.unwrap_or_else(|| "list is not permitted".to_string()),
			},
			None => AccessDecision::Unverifiable {
				error: "access review returned no status".to_string(),
			},
		}
	}
}

fn list_review(desc: &KindDescriptor, namespace: Option<&str>) -> SelfSubjectAccessReview {
	SelfSubjectAccessReview {
		spec: SelfSubjectAccessReviewSpec {
			resource_attributes: Some(ResourceAttributes {
				verb: Some("list".to_string()),
				group: Some(desc.group.to_string()),
				version: Some(desc.version.to_string()),
				resource: Some(desc.plural.to_string()),
				namespace: namespace.map(str::to_string),
				..Default::default()
			}),
			..Default::default()
		},
		..Default::default()
	}
}
