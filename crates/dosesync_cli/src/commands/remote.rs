//! One-shot commands against a host.

use dosesync_client::{HttpTransport, SyncClient, SyncConfig, SyncTransport};
use dosesync_protocol::DocumentKind;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;

/// Pings the host and prints the round trip.
pub fn ping(config: SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(&config);
    let started = Instant::now();
    let ts = transport.ping()?;
    println!(
        "{} is up (host time {:.3}, {} ms)",
        transport.base_url(),
        ts,
        started.elapsed().as_millis()
    );
    Ok(())
}

/// Prints a document as pretty JSON.
pub fn pull(config: SyncConfig, kind: DocumentKind) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(&config);
    let document = transport.fetch(kind)?;
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}

/// Replaces a document with the contents of `file`.
pub fn push(
    config: SyncConfig,
    kind: DocumentKind,
    file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let document: Value = serde_json::from_str(&contents)
        .map_err(|e| format!("{} is not valid JSON: {e}", file.display()))?;

    let transport = HttpTransport::new(&config);
    let client = SyncClient::new(config, transport, super::poll::PrintApplier::default());
    match kind {
        DocumentKind::Tracker => client.push_tracker(&document)?,
        DocumentKind::Library => client.push_library(&document)?,
    }
    println!("Stored {kind} on {}", client.transport().base_url());
    Ok(())
}
