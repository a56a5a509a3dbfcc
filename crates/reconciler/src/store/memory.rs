//! In-process Resource Store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::ResourceExt;
use tokio::sync::Mutex;

use super::ResourceStore;
use crate::error::{Error, ObjectKind, Result};
use crate::types::{KeyValuePair, ObjectKey};

/// Store operation a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Any read.
    Get,
    /// Create.
    Create,
    /// Replace or apply.
    Update,
    /// Delete.
    Delete,
    /// List.
    List,
}

#[derive(Default)]
struct State {
    config_maps: BTreeMap<ObjectKey, ConfigMap>,
    services: BTreeMap<ObjectKey, Service>,
    deployments: BTreeMap<ObjectKey, Deployment>,
    key_value_pairs: BTreeMap<ObjectKey, KeyValuePair>,
    next_version: u64,
    faults: HashMap<(ObjectKind, StoreOp), Vec<Error>>,
    concurrent_writes: u32,
    replace_calls: u32,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version = self.next_version.saturating_add(1);
        self.next_version.to_string()
    }

    fn take_fault(&mut self, kind: ObjectKind, op: StoreOp) -> Result<()> {
        match self.faults.get_mut(&(kind, op)).and_then(Vec::pop) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// [`ResourceStore`] keeping objects in memory.
///
/// Backing stores carry resource versions and replaces are rejected with a
/// conflict when the version is stale, like the API server does.
#[derive(Default)]
pub struct InMemoryResourceStore {
    state: Mutex<State>,
}

impl InMemoryResourceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a KeyValuePair so enumeration can find it.
    pub async fn put_key_value_pair(&self, kvp: KeyValuePair) {
        let mut state = self.state.lock().await;
        state.key_value_pairs.insert(ObjectKey::of(&kvp), kvp);
    }

    /// Remove a declared KeyValuePair.
    pub async fn remove_key_value_pair(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().await;
        state.key_value_pairs.remove(&ObjectKey::new(namespace, name));
    }

    /// Make the next matching operation fail with `err`.
    ///
    /// Faults queued for the same operation are returned last-in first-out.
    pub async fn inject_fault(&self, kind: ObjectKind, op: StoreOp, err: Error) {
        let mut state = self.state.lock().await;
        state.faults.entry((kind, op)).or_default().push(err);
    }

    /// Simulate `count` writers that modify a backing store between the next
    /// reads and replaces.
    pub async fn inject_concurrent_writes(&self, count: u32) {
        self.state.lock().await.concurrent_writes = count;
    }

    /// Number of replace calls issued against backing stores.
    pub async fn replace_calls(&self) -> u32 {
        self.state.lock().await.replace_calls
    }

    /// Data of a backing store, if it exists.
    pub async fn config_map_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<BTreeMap<String, String>> {
        let state = self.state.lock().await;
        state
            .config_maps
            .get(&ObjectKey::new(namespace, name))
            .map(|cm| cm.data.clone().unwrap_or_default())
    }

    /// Stored endpoint, if it exists.
    pub async fn service(&self, namespace: &str, name: &str) -> Option<Service> {
        let state = self.state.lock().await;
        state.services.get(&ObjectKey::new(namespace, name)).cloned()
    }

    /// Stored deployment, if it exists.
    pub async fn deployment(&self, namespace: &str, name: &str) -> Option<Deployment> {
        let state = self.state.lock().await;
        state.deployments.get(&ObjectKey::new(namespace, name)).cloned()
    }
}

fn key_in(namespace: &str, obj: &impl ResourceExt) -> ObjectKey {
    ObjectKey::new(namespace, obj.name_any())
}

fn insert_new<K: ResourceExt + Clone>(
    map: &mut BTreeMap<ObjectKey, K>,
    kind: ObjectKind,
    namespace: &str,
    obj: &K,
) -> Result<()> {
    let key = key_in(namespace, obj);
    if map.contains_key(&key) {
        return Err(Error::already_exists(kind, key.name));
    }
    let mut stored = obj.clone();
    stored.meta_mut().namespace = Some(namespace.to_string());
    map.insert(key, stored);
    Ok(())
}

fn remove<K>(
    map: &mut BTreeMap<ObjectKey, K>,
    kind: ObjectKind,
    namespace: &str,
    name: &str,
) -> Result<()> {
    map.remove(&ObjectKey::new(namespace, name))
        .map(|_| ())
        .ok_or_else(|| Error::not_found(kind, name))
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::ConfigMap, StoreOp::Get)?;
        let key = ObjectKey::new(namespace, name);
        let found = state.config_maps.get(&key).cloned();

        if found.is_some() && state.concurrent_writes > 0 {
            // Another writer lands right after this read.
            state.concurrent_writes = state.concurrent_writes.saturating_sub(1);
            let version = state.bump_version();
            if let Some(cm) = state.config_maps.get_mut(&key) {
                cm.metadata.resource_version = Some(version);
            }
        }

        Ok(found)
    }

    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::ConfigMap, StoreOp::Create)?;
        let mut stored = config_map.clone();
        stored.metadata.resource_version = Some(state.bump_version());
        insert_new(&mut state.config_maps, ObjectKind::ConfigMap, namespace, &stored)
    }

    async fn replace_config_map(&self, namespace: &str, config_map: &ConfigMap) -> Result<()> {
        let mut state = self.state.lock().await;
        state.replace_calls = state.replace_calls.saturating_add(1);
        state.take_fault(ObjectKind::ConfigMap, StoreOp::Update)?;

        let key = key_in(namespace, config_map);
        let current = state
            .config_maps
            .get(&key)
            .ok_or_else(|| Error::not_found(ObjectKind::ConfigMap, key.name.clone()))?;

        if let Some(expected) = &config_map.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(expected) {
                return Err(Error::conflict(ObjectKind::ConfigMap, key.name));
            }
        }

        let mut stored = config_map.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.resource_version = Some(state.bump_version());
        state.config_maps.insert(key, stored);
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::ConfigMap, StoreOp::Delete)?;
        remove(&mut state.config_maps, ObjectKind::ConfigMap, namespace, name)
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::Service, StoreOp::Create)?;
        insert_new(&mut state.services, ObjectKind::Service, namespace, service)
    }

    async fn apply_service(&self, namespace: &str, service: &Service) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::Service, StoreOp::Update)?;
        state.services.insert(key_in(namespace, service), service.clone());
        Ok(())
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::Service, StoreOp::Delete)?;
        remove(&mut state.services, ObjectKind::Service, namespace, name)
    }

    async fn create_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::Deployment, StoreOp::Create)?;
        insert_new(&mut state.deployments, ObjectKind::Deployment, namespace, deployment)
    }

    async fn apply_deployment(&self, namespace: &str, deployment: &Deployment) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::Deployment, StoreOp::Update)?;
        state
            .deployments
            .insert(key_in(namespace, deployment), deployment.clone());
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::Deployment, StoreOp::Delete)?;
        remove(&mut state.deployments, ObjectKind::Deployment, namespace, name)
    }

    async fn list_key_value_pairs(&self, namespace: &str) -> Result<Vec<KeyValuePair>> {
        let mut state = self.state.lock().await;
        state.take_fault(ObjectKind::KeyValuePair, StoreOp::List)?;
        Ok(state
            .key_value_pairs
            .iter()
            .filter(|(key, _)| key.namespace == namespace)
            .map(|(_, kvp)| kvp.clone())
            .collect())
    }
}
