//! Configuration types for the signaling relay
//!
//! Configuration can be loaded from a TOML file and then overridden by the
//! server binary's command line / environment.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// STUN server used when no ICE servers are configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Configuration shared by every signaling session
    #[serde(default)]
    pub signaling: SignalingConfig,
}

/// WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// WebSocket port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum number of concurrent sessions (0 = unlimited)
    #[serde(default)]
    pub max_sessions: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: 0,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Server-wide signaling configuration, shared read-only by all sessions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// ICE servers handed to every peer connection.
    ///
    /// `None` falls back to [`DEFAULT_STUN_SERVER`]. An explicit empty list
    /// disables STUN/TURN (host candidates only).
    #[serde(default)]
    pub ice_servers: Option<Vec<IceServerConfig>>,

    /// Close sessions that have not reached ICE connected within this many
    /// seconds. `None` keeps negotiations open until the transport or engine
    /// ends them.
    #[serde(default)]
    pub negotiation_timeout_secs: Option<u64>,
}

/// STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    /// Server URLs (`stun:`, `stuns:`, `turn:` or `turns:`). Accepts a single
    /// string or a list.
    #[serde(deserialize_with = "one_or_many")]
    pub urls: Vec<String>,

    /// Username for TURN authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Credential for TURN authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Urls {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Urls::deserialize(deserializer)? {
        Urls::One(url) => vec![url],
        Urls::Many(urls) => urls,
    })
}

impl IceServerConfig {
    /// STUN server entry (no credentials)
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// TURN server entry with credentials
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }

    fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|url| url.starts_with("turn:") || url.starts_with("turns:"))
    }

    fn validate(&self) -> Result<()> {
        if self.urls.is_empty() {
            return Err(Error::InvalidConfig(
                "ICE server entry must have at least one URL".to_string(),
            ));
        }

        for url in &self.urls {
            let known_scheme = ["stun:", "stuns:", "turn:", "turns:"]
                .iter()
                .any(|scheme| url.starts_with(scheme));
            if !known_scheme {
                return Err(Error::InvalidConfig(format!(
                    "ICE server URL must start with stun:, stuns:, turn: or turns:, got {}",
                    url
                )));
            }
        }

        if self.is_turn() && (self.username.is_none() || self.credential.is_none()) {
            return Err(Error::InvalidConfig(format!(
                "TURN server {} requires username and credential",
                self.urls.join(",")
            )));
        }

        Ok(())
    }
}

impl SignalingConfig {
    /// ICE servers to configure on a new peer connection
    pub fn resolved_ice_servers(&self) -> Vec<IceServerConfig> {
        match &self.ice_servers {
            Some(servers) => servers.clone(),
            None => vec![IceServerConfig::stun(DEFAULT_STUN_SERVER)],
        }
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - an ICE server entry has no URLs or an unknown URL scheme
    /// - a TURN entry is missing its username or credential
    /// - `negotiation_timeout_secs` is zero
    pub fn validate(&self) -> Result<()> {
        if let Some(servers) = &self.ice_servers {
            for server in servers {
                server.validate()?;
            }
        }

        if self.negotiation_timeout_secs == Some(0) {
            return Err(Error::InvalidConfig(
                "negotiation_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Replace the ICE server list
    pub fn with_ice_servers(mut self, ice_servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = Some(ice_servers);
        self
    }

    /// Set the negotiation deadline
    pub fn with_negotiation_timeout_secs(mut self, secs: u64) -> Self {
        self.negotiation_timeout_secs = Some(secs);
        self
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidConfig(msg) => {
                Error::InvalidConfig(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RelayConfig =
            toml::from_str(content).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".to_string()));
        }
        self.signaling.validate()
    }
}
