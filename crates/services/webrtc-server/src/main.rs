//! WebRTC signaling relay server
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:8080 with the default STUN server
//! cargo run -p webrtc-relay-server
//!
//! # Load a TOML config and override the port
//! cargo run -p webrtc-relay-server -- --config relay.toml --port 9000
//!
//! # Custom ICE servers, TURN credentials and session limits
//! cargo run -p webrtc-relay-server -- \
//!   --ice-servers stun:stun.example.com:3478,turn:turn.example.com:3478 \
//!   --turn-username relay --turn-credential secret \
//!   --max-sessions 100 \
//!   --negotiation-timeout-secs 30
//! ```

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webrtc_relay::{IceServerConfig, RelayConfig, RtcEngineFactory, WebSocketSignalingServer};

/// WebRTC signaling relay
///
/// Terminates WebSocket signaling connections in server-side WebRTC peer
/// connections.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "RELAY_HOST")]
    host: Option<String>,

    /// WebSocket port
    #[arg(short, long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// ICE server URLs (comma-separated)
    #[arg(long, value_delimiter = ',', env = "RELAY_ICE_SERVERS")]
    ice_servers: Option<Vec<String>>,

    /// Username for turn:/turns: entries in --ice-servers
    #[arg(long, env = "RELAY_TURN_USERNAME")]
    turn_username: Option<String>,

    /// Credential for turn:/turns: entries in --ice-servers
    #[arg(long, env = "RELAY_TURN_CREDENTIAL")]
    turn_credential: Option<String>,

    /// Maximum concurrent sessions (0 = unlimited)
    #[arg(long, env = "RELAY_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Close sessions that are not connected after this many seconds
    #[arg(long, env = "RELAY_NEGOTIATION_TIMEOUT_SECS")]
    negotiation_timeout_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "RELAY_LOG_JSON")]
    log_json: bool,
}

impl Args {
    /// Layer command line / environment overrides on top of the config file
    fn into_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(max_sessions) = self.max_sessions {
            config.server.max_sessions = max_sessions;
        }
        if let Some(secs) = self.negotiation_timeout_secs {
            config.signaling.negotiation_timeout_secs = Some(secs);
        }
        if let Some(urls) = self.ice_servers {
            let servers = urls
                .into_iter()
                .filter(|url| !url.trim().is_empty())
                .map(|url| {
                    let url = url.trim().to_string();
                    if url.starts_with("turn:") || url.starts_with("turns:") {
                        IceServerConfig {
                            urls: vec![url],
                            username: self.turn_username.clone(),
                            credential: self.turn_credential.clone(),
                        }
                    } else {
                        IceServerConfig::stun(url)
                    }
                })
                .collect();
            config.signaling.ice_servers = Some(servers);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }
        eprintln!("\nCtrl+C received, shutting down...");
    })
    .context("Failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("relay-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    init_tracing(args.log_json)?;

    let config = args.into_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.server.bind_address(),
        max_sessions = config.server.max_sessions,
        ice_servers = config.signaling.resolved_ice_servers().len(),
        negotiation_timeout_secs = ?config.signaling.negotiation_timeout_secs,
        "WebRTC signaling relay starting"
    );

    let factory = Arc::new(RtcEngineFactory::new()?);
    let handle = WebSocketSignalingServer::from_config(config, factory)
        .start()
        .await?;

    info!("Server running on ws://{}. Press Ctrl+C to shutdown.", handle.local_addr());

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let active_sessions = handle.registry().session_count().await;
    info!(
        active_sessions,
        "Shutdown signal received, closing sessions..."
    );
    handle.shutdown().await;
    info!("WebRTC signaling relay shut down gracefully");

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("webrtc-server").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).into_config().unwrap();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.server.max_sessions, 0);
        assert!(config.signaling.ice_servers.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let config = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--max-sessions",
            "4",
            "--negotiation-timeout-secs",
            "15",
            "--ice-servers",
            "stun:a.example.com:3478,turn:b.example.com:3478",
            "--turn-username",
            "u",
            "--turn-credential",
            "p",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.server.max_sessions, 4);
        assert_eq!(config.signaling.negotiation_timeout_secs, Some(15));
        assert_eq!(
            config.signaling.ice_servers,
            Some(vec![
                IceServerConfig::stun("stun:a.example.com:3478"),
                IceServerConfig::turn("turn:b.example.com:3478", "u", "p"),
            ])
        );
    }

    #[test]
    fn test_turn_without_credentials_is_rejected() {
        let result = parse(&["--ice-servers", "turn:b.example.com:3478"]).into_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_is_layered_under_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(
            &path,
            "[server]\nport = 7000\nmax_sessions = 8\n\n[signaling]\nnegotiation_timeout_secs = 20\n",
        )
        .unwrap();

        let config = parse(&["--config", path.to_str().unwrap(), "--port", "7001"])
            .into_config()
            .unwrap();

        assert_eq!(config.server.port, 7001);
        assert_eq!(config.server.max_sessions, 8);
        assert_eq!(config.signaling.negotiation_timeout_secs, Some(20));
    }
}
