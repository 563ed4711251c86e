//! Mock Kubernetes API server for testing.
//!
//! Serves list and get requests for a fixed set of objects over real HTTP, so
//! tests can connect through an ordinary kubeconfig. Access reviews can be
//! denied per resource, and individual resources can be made to fail.

pub mod http;
pub mod resources;

pub use http::{HttpMockK8sServer, MockDenial, RunningHttpMockK8sServer};
pub use resources::{MockResourceTable, MockResourceType};
