//! Wiring of store, handlers and routers into the running controller.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client};
use tracing::info;

use crate::config_server::ConfigServerLifecycle;
use crate::key_value::{KeyValueMaterializer, DEFAULT_CONFLICT_RETRIES};
use crate::retry::RetryPolicy;
use crate::router::{EventRouter, RouterConfig, DEFAULT_HANDLER_TIMEOUT};
use crate::store::{KubeResourceStore, ResourceStore, DEFAULT_FIELD_MANAGER};
use crate::types::{ConfigServer, Declared, KeyValuePair};
use crate::watch::watch_events;

/// Controller settings.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces.
    pub namespace: Option<String>,
    /// Backoff for transient handler failures.
    pub retry: RetryPolicy,
    /// Upper bound for one handler invocation.
    pub handler_timeout: Duration,
    /// Conflicting backing store writes retried per event.
    pub max_conflict_retries: u32,
    /// Field manager for server-side apply.
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            retry: RetryPolicy::default(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl OperatorConfig {
    fn router_config(&self) -> RouterConfig {
        RouterConfig {
            retry: self.retry.clone(),
            handler_timeout: self.handler_timeout,
        }
    }

    fn api<K>(&self, client: &Client) -> Api<K>
    where
        K: Declared + kube::Resource<Scope = NamespaceResourceScope>,
    {
        match &self.namespace {
            Some(namespace) => Api::namespaced(client.clone(), namespace),
            None => Api::all(client.clone()),
        }
    }
}

/// Run both routers until their watches end.
///
/// Watches restart on their own, so in practice this runs until the future
/// is dropped.
pub async fn run_operator(client: Client, config: OperatorConfig) {
    info!(
        namespace = config.namespace.as_deref().unwrap_or("*"),
        field_manager = %config.field_manager,
        "Starting operator"
    );

    let store: Arc<dyn ResourceStore> = Arc::new(
        KubeResourceStore::new(client.clone()).with_field_manager(config.field_manager.clone()),
    );

    let lifecycle = Arc::new(ConfigServerLifecycle::new(store.clone()));
    let materializer = Arc::new(
        KeyValueMaterializer::new(store).with_conflict_retries(config.max_conflict_retries),
    );

    let servers = EventRouter::<ConfigServer>::new(lifecycle, config.router_config())
        .run(watch_events(config.api::<ConfigServer>(&client)));
    let entries = EventRouter::<KeyValuePair>::new(materializer, config.router_config())
        .run(watch_events(config.api::<KeyValuePair>(&client)));

    tokio::join!(servers, entries);
    info!("Operator stopped");
}
