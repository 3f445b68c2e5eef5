//! Serve command implementation.

use dosesync_server::{DataServer, ServerConfig};
use tracing::info;

/// Runs the data server until Ctrl-C, then shuts it down gracefully.
pub fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let data_dir = config.data_dir.clone();
        let server = DataServer::spawn(config).await?;
        println!(
            "Serving {} on {}",
            data_dir.display(),
            server.local_addr()
        );

        tokio::signal::ctrl_c().await?;
        info!("interrupt received, shutting down");
        server.shutdown().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
