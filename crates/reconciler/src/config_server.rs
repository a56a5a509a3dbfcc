//! ConfigServer lifecycle: materialize and tear down the derived objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::error::{Error, ObjectKind, Result};
use crate::key_value::{modify_values, Modification, DEFAULT_CONFLICT_RETRIES};
use crate::resources;
use crate::router::EventHandler;
use crate::store::ResourceStore;
use crate::types::{values_name, ConfigServer};

/// Creates, updates and deletes the backing store, endpoint and deployment of
/// each ConfigServer.
pub struct ConfigServerLifecycle {
    store: Arc<dyn ResourceStore>,
}

/// Treat "already exists" as success.
fn tolerate_existing(kind: ObjectKind, name: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(err) if err.is_already_exists() => {
            debug!(%kind, name, "Already exists");
            Ok(())
        }
        other => other,
    }
}

fn identity(server: &ConfigServer) -> Result<(String, String)> {
    let namespace = server
        .namespace()
        .ok_or_else(|| Error::permanent("ConfigServer has no namespace"))?;
    Ok((namespace, server.name_any()))
}

impl ConfigServerLifecycle {
    /// Create a lifecycle manager over a store.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Materialize the derived objects of a new ConfigServer.
    ///
    /// Values already declared for the server are written into the backing
    /// store up front, so declaration order does not matter. A backing store
    /// that already exists gains the declared keys it lacks; keys it holds
    /// are left alone.
    ///
    /// # Errors
    ///
    /// Returns a permanent error for an invalid spec and propagates store failures
    /// other than "already exists".
    pub async fn create(&self, server: &ConfigServer) -> Result<()> {
        server.spec.validate()?;
        let (namespace, name) = identity(server)?;

        let data = self.declared_values(&namespace, &name).await?;
        let entries = data.len();
        let values_name = values_name(&name);
        let created = self
            .store
            .create_config_map(&namespace, &resources::backing_store(server, data.clone()))
            .await;
        match created {
            Ok(()) => {}
            Err(err) if err.is_already_exists() => {
                self.fill_missing(&namespace, &values_name, data).await?;
            }
            Err(err) => return Err(err),
        }

        tolerate_existing(
            ObjectKind::Service,
            &name,
            self.store
                .create_service(&namespace, &resources::endpoint(server))
                .await,
        )?;

        tolerate_existing(
            ObjectKind::Deployment,
            &name,
            self.store
                .create_deployment(&namespace, &resources::deployment(server))
                .await,
        )?;

        info!(namespace, name, entries, "ConfigServer materialized");
        Ok(())
    }

    /// Bring the derived objects in line with a changed spec.
    ///
    /// Existing values are never overwritten; a missing backing store is
    /// recreated from the declared KeyValuePairs.
    ///
    /// # Errors
    ///
    /// Returns a permanent error for an invalid spec and propagates store failures.
    pub async fn update(&self, server: &ConfigServer) -> Result<()> {
        server.spec.validate()?;
        let (namespace, name) = identity(server)?;

        let values_name = values_name(&name);
        if self.store.get_config_map(&namespace, &values_name).await?.is_none() {
            warn!(namespace, name, "Backing store missing, recreating");
            let data = self.declared_values(&namespace, &name).await?;
            tolerate_existing(
                ObjectKind::ConfigMap,
                &values_name,
                self.store
                    .create_config_map(&namespace, &resources::backing_store(server, data))
                    .await,
            )?;
        }

        self.store
            .apply_service(&namespace, &resources::endpoint(server))
            .await?;
        self.store
            .apply_deployment(&namespace, &resources::deployment(server))
            .await?;

        info!(namespace, name, "ConfigServer updated");
        Ok(())
    }

    /// Delete the derived objects, tolerating any that are already gone.
    ///
    /// Every deletion is attempted even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns one error naming the failed and the completed deletions. It is
    /// transient only if every failure was.
    pub async fn delete(&self, server: &ConfigServer) -> Result<()> {
        let (namespace, name) = identity(server)?;
        let values_name = values_name(&name);

        let results = [
            (
                ObjectKind::Deployment,
                self.store.delete_deployment(&namespace, &name).await,
            ),
            (
                ObjectKind::Service,
                self.store.delete_service(&namespace, &name).await,
            ),
            (
                ObjectKind::ConfigMap,
                self.store.delete_config_map(&namespace, &values_name).await,
            ),
        ];

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(()) => deleted.push(kind.to_string()),
                Err(err) if err.is_not_found() => debug!(%kind, namespace, name, "Already deleted"),
                Err(err) => failed.push((kind, err)),
            }
        }

        if failed.is_empty() {
            info!(namespace, name, deleted = ?deleted, "ConfigServer removed");
            return Ok(());
        }

        let all_transient = failed.iter().all(|(_, err)| err.is_transient());
        let failures = failed
            .iter()
            .map(|(kind, err)| format!("{kind}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        let message = format!(
            "failed to delete ConfigServer {namespace}/{name} ({failures}); deleted: [{}]",
            deleted.join(", ")
        );

        if all_transient {
            Err(Error::transient(message))
        } else {
            Err(Error::permanent(message))
        }
    }

    async fn fill_missing(
        &self,
        namespace: &str,
        values_name: &str,
        declared: BTreeMap<String, String>,
    ) -> Result<()> {
        let outcome = modify_values(
            self.store.as_ref(),
            namespace,
            values_name,
            DEFAULT_CONFLICT_RETRIES,
            |data| {
                let mut changed = false;
                for (key, value) in &declared {
                    if !data.contains_key(key) {
                        data.insert(key.clone(), value.clone());
                        changed = true;
                    }
                }
                changed
            },
        )
        .await?;

        match outcome {
            Modification::Written => {
                info!(namespace, name = values_name, "Declared values merged into existing backing store");
            }
            Modification::Unchanged => debug!(namespace, name = values_name, "Already exists"),
            Modification::Missing => {
                warn!(namespace, name = values_name, "Backing store vanished during create");
            }
        }
        Ok(())
    }

    /// Encoded values of every KeyValuePair targeting `server`.
    ///
    /// When several declare the same key, the most recently created wins.
    async fn declared_values(
        &self,
        namespace: &str,
        server: &str,
    ) -> Result<BTreeMap<String, String>> {
        let mut pairs: Vec<_> = self
            .store
            .list_key_value_pairs(namespace)
            .await?
            .into_iter()
            .filter(|kvp| kvp.spec.config == server)
            .collect();
        pairs.sort_by_key(|kvp| (kvp.creation_timestamp().map(|t| t.0), kvp.name_any()));

        let mut data = BTreeMap::new();
        for kvp in pairs {
            if let Err(err) = kvp.spec.validate() {
                warn!(namespace, kvp = %kvp.name_any(), error = %err, "Skipping invalid KeyValuePair");
                continue;
            }
            data.insert(kvp.spec.key.clone(), kvp.spec.encoded_value()?);
        }
        Ok(data)
    }
}

#[async_trait]
impl EventHandler<ConfigServer> for ConfigServerLifecycle {
    async fn on_create(&self, obj: &ConfigServer) -> Result<()> {
        self.create(obj).await
    }

    async fn on_update(&self, _old: &ConfigServer, new: &ConfigServer) -> Result<()> {
        self.update(new).await
    }

    async fn on_delete(&self, obj: &ConfigServer) -> Result<()> {
        self.delete(obj).await
    }
}
