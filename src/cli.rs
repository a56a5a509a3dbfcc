//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use cfgsrv_reconciler::{OperatorConfig, RetryPolicy};
use cfgsrv_web::ServerConfig;

/// cfgsrv - ConfigServer operator and config value query server
#[derive(Parser, Debug)]
#[command(name = "cfgsrv")]
#[command(version)]
#[command(about = "Declare config endpoints as Kubernetes resources and serve their values")]
#[command(
    long_about = "cfgsrv materializes KeyValuePair resources into the backing store of their ConfigServer, deploys a query server per ConfigServer, and is that query server."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller for ConfigServer and KeyValuePair resources
    Operator(OperatorArgs),

    /// Serve the values of a mounted backing store over HTTP
    Serve(ServeArgs),

    /// Print the CustomResourceDefinitions as YAML
    Crd,
}

#[derive(Args, Debug)]
pub struct OperatorArgs {
    /// Namespace to watch (all namespaces when unset)
    #[arg(short, long, env = "WATCH_NAMESPACE")]
    pub namespace: Option<String>,

    /// Retries of a transiently failing event
    #[arg(long, env = "OPERATOR_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: u32,

    /// Retries of a conflicting backing store write
    #[arg(long, env = "OPERATOR_CONFLICT_RETRIES", default_value_t = 5)]
    pub conflict_retries: u32,

    /// Upper bound for one handler invocation, in seconds
    #[arg(long, env = "OPERATOR_HANDLER_TIMEOUT_SECS", default_value_t = 60)]
    pub handler_timeout_secs: u64,

    /// Field manager for server-side apply
    #[arg(long, env = "OPERATOR_FIELD_MANAGER", default_value = "cfgsrv-operator")]
    pub field_manager: String,
}

impl OperatorArgs {
    /// Controller settings for these arguments.
    pub fn into_config(self) -> OperatorConfig {
        let defaults = RetryPolicy::default();
        OperatorConfig {
            namespace: self.namespace,
            retry: RetryPolicy::new(self.max_retries, defaults.base_delay_ms, defaults.max_delay_ms),
            handler_timeout: Duration::from_secs(self.handler_timeout_secs),
            max_conflict_retries: self.conflict_retries,
            field_manager: self.field_manager,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory where the key/value pairs of the backing store are mounted
    #[arg(short = 'f', long, env = "CONFIG_SERVER_DIR", default_value = cfgsrv_web::DEFAULT_CONFIG_DIR)]
    pub config_dir: PathBuf,

    /// Port to listen on
    #[arg(short, long, env = "CONFIG_SERVER_PORT", default_value_t = 80)]
    pub port: u16,

    /// Address to listen on
    #[arg(long, env = "CONFIG_SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,
}

impl ServeArgs {
    /// Server settings for these arguments.
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            config_dir: self.config_dir,
            bind_address: format!("{}:{}", self.host, self.port),
        }
    }
}
