//! Poll command implementation.

use dosesync_client::{
    ConnectionState, HttpTransport, PollerHandle, SyncApplier, SyncClient, SyncConfig, SyncError,
    SyncResult,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Prints every applied tracker as one JSON line and state changes to
/// stderr.
#[derive(Debug, Default)]
pub struct PrintApplier;

impl SyncApplier for PrintApplier {
    fn apply_tracker(&self, document: Value, mtime: f64) -> SyncResult<()> {
        let line = json!({ "mtime": mtime, "tracker": document });
        println!("{line}");
        Ok(())
    }

    fn connection_changed(&self, previous: ConnectionState, current: ConnectionState) {
        eprintln!("connection {previous} -> {current}");
    }

    fn teardown(&self, error: &SyncError) {
        eprintln!("host unreachable, giving up: {error}");
    }
}

/// Follows the host's tracker until Ctrl-C or teardown.
pub fn run(config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let transport = HttpTransport::new(&config);
    let client = Arc::new(SyncClient::new(config, transport, PrintApplier));

    runtime.block_on(async {
        let handle = client.spawn_poller();
        let interrupted = wait(handle).await?;
        if interrupted {
            info!("interrupt received, stopping poller");
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })?;

    let stats = client.stats();
    info!(
        applied = stats.polls_applied,
        unchanged = stats.polls_unchanged,
        failed = stats.polls_failed,
        "poller summary"
    );
    if client.is_closing() {
        return Err("lost connection to host".into());
    }
    Ok(())
}

/// Waits for the poller to end. Returns true if Ctrl-C stopped it.
async fn wait(handle: PollerHandle) -> std::io::Result<bool> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                handle.stop().await;
                return Ok(true);
            }
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                if handle.is_finished() {
                    return Ok(false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_applier_accepts_any_tracker() {
        let applier = PrintApplier;
        let doc = json!({"schema_version": 1, "logs": []});
        assert!(applier.apply_tracker(doc, 12.5).is_ok());
    }
}
