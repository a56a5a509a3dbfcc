//! Resource Store backed by the Kubernetes API.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::ResourceStore;
use crate::error::{Error, ObjectKind, Result};
use crate::types::KeyValuePair;

/// Default field manager for server-side apply.
pub const DEFAULT_FIELD_MANAGER: &str = "cfgsrv-operator";

/// [`ResourceStore`] issuing requests through a shared kube client.
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
    field_manager: String,
}

impl KubeResourceStore {
    /// Create a store over an existing client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }

    /// Set the field manager used for server-side apply.
    #[must_use]
    pub fn with_field_manager(mut self, field_manager: impl Into<String>) -> Self {
        self.field_manager = field_manager.into();
        self
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create<K>(&self, kind: ObjectKind, namespace: &str, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let name = obj.name_any();
        self.api::<K>(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| Error::from_kube(kind, &name, e))?;
        debug!(%kind, namespace, name, "Created object");
        Ok(())
    }

    async fn apply<K>(&self, kind: ObjectKind, namespace: &str, obj: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let name = obj.name_any();
        let params = PatchParams::apply(&self.field_manager).force();
        self.api::<K>(namespace)
            .patch(&name, &params, &Patch::Apply(obj))
            .await
            .map_err(|e| Error::from_kube(kind, &name, e))?;
        debug!(%kind, namespace, name, "Applied object");
        Ok(())
    }

    async fn delete<K>(&self, kind: ObjectKind, namespace: &str, name: &str) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(kind, name, e))?;
        debug!(%kind, namespace, name, "Deleted object");
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        self.api::<ConfigMap>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::from_kube(ObjectKind::ConfigMap, name, e))
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        self.create(ObjectKind::ConfigMap, namespace, config_map).await
    }

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        // metadata.resourceVersion makes the API server reject stale writes with 409
        let name = config_map.name_any();
        self.api::<ConfigMap>(namespace)
            .replace(&name, &PostParams::default(), config_map)
            .await
            .map_err(|e| Error::from_kube(ObjectKind::ConfigMap, &name, e))?;
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<ConfigMap>(ObjectKind::ConfigMap, namespace, name).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.create(ObjectKind::Service, namespace, service).await
    }

    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<()> {
        self.apply(ObjectKind::Service, namespace, service).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Service>(ObjectKind::Service, namespace, name).await
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        self.create(ObjectKind::Deployment, namespace, deployment).await
    }

    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        self.apply(ObjectKind::Deployment, namespace, deployment).await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        self.delete::<Deployment>(ObjectKind::Deployment, namespace, name).await
    }

    async fn list_key_value_pairs(&self, namespace: &str) -> Result<Vec<KeyValuePair>> {
        let list = self
            .api::<KeyValuePair>(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_kube(ObjectKind::KeyValuePair, namespace, e))?;
        Ok(list.items)
    }
}
