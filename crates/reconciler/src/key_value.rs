//! KeyValuePair materialization into the owning ConfigServer's backing store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::error::{Error, ObjectKind, Result};
use crate::router::EventHandler;
use crate::store::ResourceStore;
use crate::types::KeyValuePair;

/// Default number of times a write is re-read and retried after a conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 5;

/// What a read-modify-write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    /// The backing store was written.
    Written,
    /// The backing store already held the desired data.
    Unchanged,
    /// The backing store does not exist.
    Missing,
}

/// Writes, overwrites and removes single entries of a backing store.
///
/// Every write is conditioned on the resource version that was read, so
/// concurrent writers to the same backing store never lose each other's
/// updates.
pub struct KeyValueMaterializer {
    store: Arc<dyn ResourceStore>,
    max_conflict_retries: u32,
}

impl KeyValueMaterializer {
    /// Create a materializer over a store.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self {
            store,
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Set how many conflicting writes are retried before giving up.
    #[must_use]
    pub const fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Write the entry's value under its key.
    ///
    /// A missing backing store is not an error: the ConfigServer picks the
    /// entry up when it is created.
    ///
    /// # Errors
    ///
    /// Returns a permanent error for an invalid key, a transient error when
    /// conflicts persist, and propagates store failures.
    pub async fn upsert(&self, namespace: &str, kvp: &KeyValuePair) -> Result<Modification> {
        kvp.spec.validate()?;
        let encoded = kvp.spec.encoded_value()?;
        let values_name = kvp.spec.values_name();
        let key = kvp.spec.key.as_str();

        let outcome = self
            .modify(namespace, &values_name, |data| {
                if data.get(key) == Some(&encoded) {
                    return false;
                }
                data.insert(key.to_string(), encoded.clone());
                true
            })
            .await?;

        match outcome {
            Modification::Written => {
                info!(namespace, config = %kvp.spec.config, key, "Value written");
            }
            Modification::Unchanged => debug!(namespace, config = %kvp.spec.config, key, "Value unchanged"),
            Modification::Missing => {
                warn!(
                    namespace,
                    config = %kvp.spec.config,
                    key,
                    "ConfigServer backing store missing, deferring until it is created"
                );
            }
        }
        Ok(outcome)
    }

    /// Remove the entry's key.
    ///
    /// # Errors
    ///
    /// Returns a transient error when conflicts persist and propagates store
    /// failures. A missing backing store or key is a no-op.
    pub async fn remove(&self, namespace: &str, kvp: &KeyValuePair) -> Result<Modification> {
        let values_name = kvp.spec.values_name();
        let key = kvp.spec.key.as_str();

        let outcome = self
            .modify(namespace, &values_name, |data| data.remove(key).is_some())
            .await?;

        match outcome {
            Modification::Written => info!(namespace, config = %kvp.spec.config, key, "Value removed"),
            Modification::Unchanged | Modification::Missing => {
                debug!(namespace, config = %kvp.spec.config, key, "Nothing to remove");
            }
        }
        Ok(outcome)
    }

    /// Apply a changed entry, moving it if its target or key changed.
    ///
    /// # Errors
    ///
    /// Same as [`upsert`](Self::upsert) and [`remove`](Self::remove).
    pub async fn update(
        &self,
        namespace: &str,
        old: &KeyValuePair,
        new: &KeyValuePair,
    ) -> Result<Modification> {
        new.spec.validate()?;
        if old.spec.config != new.spec.config || old.spec.key != new.spec.key {
            debug!(
                namespace,
                from = %format!("{}/{}", old.spec.config, old.spec.key),
                to = %format!("{}/{}", new.spec.config, new.spec.key),
                "Entry moved"
            );
            self.remove(namespace, old).await?;
        }
        self.upsert(namespace, new).await
    }

    async fn modify<F>(&self, namespace: &str, name: &str, mutate: F) -> Result<Modification>
    where
        F: FnMut(&mut BTreeMap<String, String>) -> bool + Send,
    {
        modify_values(
            self.store.as_ref(),
            namespace,
            name,
            self.max_conflict_retries,
            mutate,
        )
        .await
    }
}

/// Read-modify-write a backing store's data.
///
/// `mutate` returns whether it changed anything. The write carries the
/// version that was read and is retried from a fresh read on conflict.
pub(crate) async fn modify_values<F>(
    store: &dyn ResourceStore,
    namespace: &str,
    name: &str,
    max_conflict_retries: u32,
    mut mutate: F,
) -> Result<Modification>
where
    F: FnMut(&mut BTreeMap<String, String>) -> bool + Send,
{
    let mut conflicts = 0_u32;
    loop {
        let Some(mut config_map) = store.get_config_map(namespace, name).await? else {
            return Ok(Modification::Missing);
        };

        let data = config_map.data.get_or_insert_with(BTreeMap::new);
        if !mutate(data) {
            return Ok(Modification::Unchanged);
        }

        match store.replace_config_map(namespace, &config_map).await {
            Ok(()) => return Ok(Modification::Written),
            Err(err) if err.is_not_found() => return Ok(Modification::Missing),
            Err(err) if err.is_conflict() => {
                if conflicts >= max_conflict_retries {
                    return Err(Error::transient(format!(
                        "{} {namespace}/{name} kept changing after {conflicts} retries",
                        ObjectKind::ConfigMap
                    )));
                }
                conflicts = conflicts.saturating_add(1);
                debug!(namespace, name, attempt = conflicts, "Write conflicted, re-reading");
            }
            Err(err) => return Err(err),
        }
    }
}

fn namespace_of(kvp: &KeyValuePair) -> Result<String> {
    kvp.namespace()
        .ok_or_else(|| Error::permanent(format!("KeyValuePair {} has no namespace", kvp.name_any())))
}

/// A write that found no backing store is handed back to the router, which
/// dispatches the entry again when it reappears in a relist.
fn settle(kvp: &KeyValuePair, outcome: Modification) -> Result<()> {
    match outcome {
        Modification::Missing => Err(Error::deferred(format!(
            "ConfigServer {} has no backing store yet",
            kvp.spec.config
        ))),
        Modification::Written | Modification::Unchanged => Ok(()),
    }
}

#[async_trait]
impl EventHandler<KeyValuePair> for KeyValueMaterializer {
    async fn on_create(&self, obj: &KeyValuePair) -> Result<()> {
        let outcome = self.upsert(&namespace_of(obj)?, obj).await?;
        settle(obj, outcome)
    }

    async fn on_update(&self, old: &KeyValuePair, new: &KeyValuePair) -> Result<()> {
        let outcome = self.update(&namespace_of(new)?, old, new).await?;
        settle(new, outcome)
    }

    async fn on_delete(&self, obj: &KeyValuePair) -> Result<()> {
        self.remove(&namespace_of(obj)?, obj).await.map(|_| ())
    }
}
