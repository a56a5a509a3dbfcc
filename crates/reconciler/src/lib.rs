//! Controller for ConfigServer and KeyValuePair resources.
//!
//! A ConfigServer declares a config-serving endpoint. Its KeyValuePairs are
//! materialized into a backing ConfigMap that a Deployment mounts and a
//! Service exposes.
//!
//! # Key Concepts
//!
//! ## Event routing
//!
//! [`EventRouter`] turns a watch stream into create, update and delete calls
//! on an [`EventHandler`]. Events for one object are handled in order; other
//! objects proceed concurrently. Transient failures are retried with
//! [`RetryPolicy`].
//!
//! ## Handlers
//!
//! - [`ConfigServerLifecycle`] creates the backing store, Service and
//!   Deployment, pre-filled with the KeyValuePairs declared so far, and
//!   deletes them again.
//! - [`KeyValueMaterializer`] writes single entries with version-conditioned
//!   read-modify-write, retrying on conflicts.
//!
//! Both talk to the cluster only through [`ResourceStore`].
//!
//! # Example
//!
//! ```ignore
//! use cfgsrv_reconciler::{run_operator, OperatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kube::Error> {
//!     let client = kube::Client::try_default().await?;
//!     run_operator(client, OperatorConfig::default()).await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config_server;
pub mod error;
pub mod key_value;
pub mod operator;
pub mod resources;
pub mod retry;
pub mod router;
pub mod store;
pub mod types;
pub mod watch;

// Re-export main types
pub use config_server::ConfigServerLifecycle;
pub use error::{Error, ObjectKind, Result};
pub use key_value::{KeyValueMaterializer, Modification};
pub use operator::{run_operator, OperatorConfig};
pub use retry::{RetryPolicy, RetryState};
pub use router::{EventAction, EventHandler, EventOutcome, EventRouter, RouterConfig, WatchEvent};
pub use store::{InMemoryResourceStore, KubeResourceStore, ResourceStore, StoreOp};
pub use types::{
    decode_value, encode_value, values_name, ConfigServer, ConfigServerSpec, KeyValuePair,
    KeyValuePairSpec, ObjectKey,
};
pub use watch::watch_events;
