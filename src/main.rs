//! # cfgsrv
//!
//! One binary for both sides of a ConfigServer:
//!
//! - `cfgsrv operator` watches ConfigServer and KeyValuePair resources and
//!   keeps each server's backing store, Service and Deployment in sync.
//! - `cfgsrv serve` is the query server those Deployments run. It answers
//!   lookups and JMESPath queries over the mounted backing store.
//! - `cfgsrv crd` prints the CustomResourceDefinitions to install.
//!
//! ## Shutdown
//!
//! Ctrl+C / SIGINT stops the watches, or lets the HTTP server finish
//! in-flight requests before exiting.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use kube::CustomResourceExt;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cfgsrv_reconciler::{ConfigServer, KeyValuePair, run_operator};
use cli::{Cli, Commands, OperatorArgs, ServeArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Operator(args) => {
            init_tracing();
            operator(args).await
        }
        Commands::Serve(args) => {
            init_tracing();
            serve(args).await
        }
        Commands::Crd => print_crds(),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn operator(args: OperatorArgs) -> Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Check the kubeconfig or in-cluster service account")?;

    tokio::select! {
        () = run_operator(client, args.into_config()) => {
            info!("Watches ended");
        }
        () = wait_for_shutdown() => {}
    }

    info!("Operator shut down");
    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.into_config();
    info!(directory = %config.config_dir.display(), "Starting config server");

    cfgsrv_web::run_server(config, wait_for_shutdown())
        .await
        .context("Config server failed")
}

fn print_crds() -> Result<()> {
    let server = serde_yaml::to_string(&ConfigServer::crd())
        .context("Failed to render ConfigServer CRD")?;
    let entries = serde_yaml::to_string(&KeyValuePair::crd())
        .context("Failed to render KeyValuePair CRD")?;
    print!("{server}---\n{entries}");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
