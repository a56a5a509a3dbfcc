//! Server setup

use std::future::Future;

use tokio::net::TcpListener;
use tracing::info;

use crate::{Error, ServerConfig, create_router};

/// Serve until `shutdown` resolves, then finish in-flight requests.
///
/// # Errors
///
/// Returns an error if the value directory is missing or the address cannot
/// be bound.
pub async fn run_server<F>(config: ServerConfig, shutdown: F) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !tokio::fs::metadata(&config.config_dir)
        .await
        .is_ok_and(|meta| meta.is_dir())
    {
        return Err(Error::MissingDirectory(config.config_dir));
    }

    let app = create_router(&config);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!(
        address = %config.bind_address,
        directory = %config.config_dir.display(),
        "Config server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Config server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_directory_is_rejected() {
        let config = ServerConfig {
            config_dir: "/nonexistent/cfgsrv-values".into(),
            bind_address: "127.0.0.1:0".to_string(),
        };
        let result = run_server(config, async {}).await;
        assert!(matches!(result, Err(Error::MissingDirectory(_))));
    }
}
