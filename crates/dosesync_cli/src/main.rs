//! DoseSync CLI
//!
//! Hosts the shared documents on the LAN or talks to a host.
//!
//! # Commands
//!
//! - `serve` - Run the data server until Ctrl-C
//! - `ping` - Check that a host is reachable and accepts the key
//! - `pull` - Print a document from a host
//! - `push` - Replace a document on a host from a JSON file
//! - `poll` - Follow tracker changes and connection state

mod commands;

use clap::{Args, Parser, Subcommand};
use dosesync_client::SyncConfig;
use dosesync_protocol::DocumentKind;
use dosesync_server::{AccessConfig, ServerConfig, DEFAULT_PORT};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the access key.
const ACCESS_KEY_ENV: &str = "DOSESYNC_ACCESS_KEY";

/// DoseSync LAN host and client.
#[derive(Parser)]
#[command(name = "dosesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection settings for commands that talk to a host.
#[derive(Args)]
struct Remote {
    /// Host address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Host port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Access key
    #[arg(short = 'k', long, env = ACCESS_KEY_ENV, hide_env_values = true)]
    access_key: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

impl Remote {
    fn config(&self) -> SyncConfig {
        let config = SyncConfig::for_host(&self.host, self.port)
            .with_timeout(Duration::from_secs(self.timeout));
        match &self.access_key {
            Some(key) => config.with_access_key(key.as_str()),
            None => config,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the data server until Ctrl-C
    Serve {
        /// Directory holding the documents
        #[arg(short, long, default_value = "dosesync-data")]
        data_dir: PathBuf,

        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Preferred port; the next free one is used if taken
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Access key required from clients
        #[arg(short = 'k', long, env = ACCESS_KEY_ENV, hide_env_values = true)]
        access_key: Option<String>,

        /// Requests per caller per window (0 disables the limit)
        #[arg(long, default_value_t = 120)]
        rate_limit: u32,

        /// Rate-limit window in seconds
        #[arg(long, default_value_t = 60)]
        rate_window: u64,

        /// Audit lines per caller per window
        #[arg(long, default_value_t = 5)]
        audit_burst: u32,

        /// Audit window in seconds
        #[arg(long, default_value_t = 60)]
        audit_window: u64,
    },

    /// Check that a host is reachable and accepts the key
    Ping {
        #[command(flatten)]
        remote: Remote,
    },

    /// Print a document from a host
    Pull {
        /// Document to fetch (tracker, library)
        document: DocumentKind,

        #[command(flatten)]
        remote: Remote,
    },

    /// Replace a document on a host from a JSON file
    Push {
        /// Document to replace (tracker, library)
        document: DocumentKind,

        /// JSON file with the new document
        file: PathBuf,

        #[command(flatten)]
        remote: Remote,
    },

    /// Follow tracker changes and connection state until Ctrl-C
    Poll {
        /// Seconds between polls
        #[arg(short, long, default_value_t = 3)]
        interval: u64,

        /// Seconds of failed polls before giving up
        #[arg(long, default_value_t = 30)]
        disconnect_timeout: u64,

        /// Consecutive missed polls before giving up
        #[arg(long, default_value_t = 3)]
        max_missed: u32,

        /// Extra seconds allowed before the first successful poll
        #[arg(long, default_value_t = 30)]
        handshake_grace: u64,

        #[command(flatten)]
        remote: Remote,
    },
}

fn poll_config(
    remote: &Remote,
    interval: u64,
    disconnect_timeout: u64,
    max_missed: u32,
    handshake_grace: u64,
) -> SyncConfig {
    remote
        .config()
        .with_poll_interval(Duration::from_secs(interval))
        .with_disconnect_timeout(Duration::from_secs(disconnect_timeout))
        .with_max_missed_polls(max_missed)
        .with_handshake_grace(Duration::from_secs(handshake_grace))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries documents.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            data_dir,
            host,
            port,
            access_key,
            rate_limit,
            rate_window,
            audit_burst,
            audit_window,
        } => {
            let mut access = AccessConfig::new()
                .with_rate_limit(rate_limit, Duration::from_secs(rate_window))
                .with_audit_limit(audit_burst, Duration::from_secs(audit_window));
            if let Some(key) = access_key {
                access = access.with_access_key(key);
            }
            let config = ServerConfig::new(data_dir)
                .with_bind_host(host)
                .with_port(port)
                .with_access(access);
            commands::serve::run(config)?;
        }
        Commands::Ping { remote } => {
            commands::remote::ping(remote.config())?;
        }
        Commands::Pull { document, remote } => {
            commands::remote::pull(remote.config(), document)?;
        }
        Commands::Push {
            document,
            file,
            remote,
        } => {
            commands::remote::push(remote.config(), document, &file)?;
        }
        Commands::Poll {
            interval,
            disconnect_timeout,
            max_missed,
            handshake_grace,
            remote,
        } => {
            let config = poll_config(
                &remote,
                interval,
                disconnect_timeout,
                max_missed,
                handshake_grace,
            );
            commands::poll::run(config)?;
        }
    }

    Ok(())
}
