//! Resource Store boundary.
//!
//! Handlers depend on [`ResourceStore`] only. [`KubeResourceStore`] talks to
//! the cluster through one long-lived client; [`InMemoryResourceStore`] keeps
//! objects in process and can inject faults for tests.
//!
//! Absent objects surface as [`Error::NotFound`](crate::Error::NotFound) on
//! writes and deletes, and as `Ok(None)` on reads.

mod cluster;
mod memory;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use crate::error::Result;
use crate::types::KeyValuePair;

pub use self::cluster::{KubeResourceStore, DEFAULT_FIELD_MANAGER};
pub use self::memory::{InMemoryResourceStore, StoreOp};

/// Typed access to the objects the reconciler reads and writes.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Read a backing store, including its resource version.
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>>;

    /// Create a backing store.
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;

    /// Replace a backing store, conditioned on the resource version it carries.
    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()>;

    /// Delete a backing store.
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create an endpoint.
    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()>;

    /// Create or update an endpoint to match the given object.
    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<()>;

    /// Delete an endpoint.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()>;

    /// Create a deployment.
    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;

    /// Create or update a deployment to match the given object.
    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()>;

    /// Delete a deployment.
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()>;

    /// List the KeyValuePairs declared in a namespace.
    async fn list_key_value_pairs(&self, namespace: &str) -> Result<Vec<KeyValuePair>>;
}
