use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   relay.toml:      [relay]
//                    typing_ttl_ms = 3000
//
//   env var:         RELAY_RELAY__TYPING_TTL_MS=3000   (double underscore = nesting)
//
//   CLI:             --host / --port override [server]

pub const CONFIG_FILE_NAME: &str = "relay.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub relay: RelayFileConfig,
}

/// Listener settings (lives under `[server]` in relay.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Only this origin may open connections from a browser. Unset = permissive.
    #[serde(default)]
    pub cors_origin: Option<String>,
}

/// Relay tuning knobs (lives under `[relay]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayFileConfig {
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    /// 0 disables the server-side typing TTL. A client typing for longer
    /// than this must re-send `isTyping: true` within the TTL or the relay
    /// announces `false` on its behalf; `TypingDebouncer` refreshes every
    /// `DEFAULT_REFRESH_INTERVAL` (half the default TTL).
    #[serde(default = "default_typing_ttl_ms")]
    pub typing_ttl_ms: u64,
    #[serde(default = "default_typing_sweep_interval_ms")]
    pub typing_sweep_interval_ms: u64,
    /// 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for RelayFileConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: default_send_queue_capacity(),
            typing_ttl_ms: default_typing_ttl_ms(),
            typing_sweep_interval_ms: default_typing_sweep_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3001;

fn default_send_queue_capacity() -> usize {
    256
}
fn default_typing_ttl_ms() -> u64 {
    5000
}
fn default_typing_sweep_interval_ms() -> u64 {
    500
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    75
}

/// Build a figment that layers: defaults → relay.toml → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_SERVER__PORT=4000`  →  `server.port = 4000`
///   `RELAY_RELAY__TYPING_TTL_MS=3000`  →  `relay.typing_ttl_ms = 3000`
pub fn load_config(config_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_dir.join(CONFIG_FILE_NAME)))
        .merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig)
// =============================================================================

/// Listener configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub cors_origin: Option<String>,
}

impl ServerConfig {
    /// Precedence: CLI flag, then config file/env, then the deployment `PORT`
    /// variable (port only), then the built-in default.
    pub fn resolve(
        fc: &ServerFileConfig,
        cli_host: Option<&str>,
        cli_port: Option<u16>,
        env_port: Option<&str>,
    ) -> Result<Self> {
        let host = cli_host
            .or(fc.host.as_deref())
            .unwrap_or(DEFAULT_HOST);

        let port = match cli_port.or(fc.port) {
            Some(port) => port,
            None => match env_port {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid PORT value: {:?}", raw))?,
                None => DEFAULT_PORT,
            },
        };

        let bind_addr = format!("{}:{}", host, port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

        Ok(Self {
            bind_addr,
            cors_origin: fc.cors_origin.clone().filter(|o| !o.trim().is_empty()),
        })
    }
}

/// Relay behaviour (runtime view).
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Outbound queue capacity per connection
    pub send_queue_capacity: usize,
    /// Server-side typing TTL (None = disabled)
    pub typing_ttl: Option<Duration>,
    pub typing_sweep_interval: Duration,
    /// Ping interval (None = heartbeat disabled)
    pub heartbeat_interval: Option<Duration>,
    /// Silence after which a connection is considered half-closed
    pub idle_timeout: Duration,
}

impl RelayConfig {
    pub fn from_file(fc: &RelayFileConfig) -> Self {
        Self {
            send_queue_capacity: fc.send_queue_capacity.max(1),
            typing_ttl: non_zero(Duration::from_millis(fc.typing_ttl_ms)),
            typing_sweep_interval: Duration::from_millis(fc.typing_sweep_interval_ms.max(10)),
            heartbeat_interval: non_zero(Duration::from_secs(fc.heartbeat_interval_secs)),
            idle_timeout: Duration::from_secs(fc.idle_timeout_secs.max(1)),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&RelayFileConfig::default())
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    if d.is_zero() { None } else { Some(d) }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_relay_file_config_defaults() {
        let d = RelayFileConfig::default();
        assert_eq!(d.send_queue_capacity, 256);
        assert_eq!(d.typing_ttl_ms, 5000);
        assert_eq!(d.typing_sweep_interval_ms, 500);
        assert_eq!(d.heartbeat_interval_secs, 30);
        assert_eq!(d.idle_timeout_secs, 75);
    }

    #[test]
    fn test_server_file_config_defaults() {
        let d = ServerFileConfig::default();
        assert!(d.host.is_none());
        assert!(d.port.is_none());
        assert!(d.cors_origin.is_none());
    }

    // ── RelayConfig::from_file ──────────────────────────────────────────

    #[test]
    fn test_relay_config_from_defaults() {
        let rc = RelayConfig::default();
        assert_eq!(rc.send_queue_capacity, 256);
        assert_eq!(rc.typing_ttl, Some(Duration::from_secs(5)));
        assert_eq!(rc.typing_sweep_interval, Duration::from_millis(500));
        assert_eq!(rc.heartbeat_interval, Some(Duration::from_secs(30)));
        assert_eq!(rc.idle_timeout, Duration::from_secs(75));
    }

    #[test]
    fn test_relay_config_zero_disables_timers() {
        let fc = RelayFileConfig {
            typing_ttl_ms: 0,
            heartbeat_interval_secs: 0,
            ..Default::default()
        };
        let rc = RelayConfig::from_file(&fc);
        assert!(rc.typing_ttl.is_none());
        assert!(rc.heartbeat_interval.is_none());
    }

    #[test]
    fn test_relay_config_clamps_degenerate_values() {
        let fc = RelayFileConfig {
            send_queue_capacity: 0,
            typing_sweep_interval_ms: 0,
            idle_timeout_secs: 0,
            ..Default::default()
        };
        let rc = RelayConfig::from_file(&fc);
        assert_eq!(rc.send_queue_capacity, 1);
        assert_eq!(rc.typing_sweep_interval, Duration::from_millis(10));
        assert_eq!(rc.idle_timeout, Duration::from_secs(1));
    }

    // ── ServerConfig::resolve ───────────────────────────────────────────

    #[test]
    fn test_resolve_defaults() {
        let sc = ServerConfig::resolve(&ServerFileConfig::default(), None, None, None).unwrap();
        assert_eq!(sc.bind_addr, "127.0.0.1:3001".parse::<SocketAddr>().unwrap());
        assert!(sc.cors_origin.is_none());
    }

    #[test]
    fn test_resolve_cli_beats_file_beats_env_port() {
        let fc = ServerFileConfig {
            host: Some("0.0.0.0".into()),
            port: Some(4000),
            cors_origin: None,
        };
        let sc = ServerConfig::resolve(&fc, None, None, Some("5000")).unwrap();
        assert_eq!(sc.bind_addr, "0.0.0.0:4000".parse::<SocketAddr>().unwrap());

        let sc = ServerConfig::resolve(&fc, Some("127.0.0.1"), Some(6000), Some("5000")).unwrap();
        assert_eq!(sc.bind_addr, "127.0.0.1:6000".parse::<SocketAddr>().unwrap());

        let sc =
            ServerConfig::resolve(&ServerFileConfig::default(), None, None, Some("5000")).unwrap();
        assert_eq!(sc.bind_addr.port(), 5000);
    }

    #[test]
    fn test_resolve_rejects_bad_port_env() {
        let err = ServerConfig::resolve(&ServerFileConfig::default(), None, None, Some("http"))
            .unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }

    #[test]
    fn test_resolve_blank_cors_origin_is_unset() {
        let fc = ServerFileConfig {
            cors_origin: Some("  ".into()),
            ..Default::default()
        };
        let sc = ServerConfig::resolve(&fc, None, None, None).unwrap();
        assert!(sc.cors_origin.is_none());
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert!(fc.server.port.is_none());
        assert_eq!(fc.relay.typing_ttl_ms, 5000);
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[server]\nhost = \"0.0.0.0\"\nport = 8080\ncors_origin = \"https://chat.example.com\"\n\n[relay]\ntyping_ttl_ms = 1500\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(fc.server.port, Some(8080));
        assert_eq!(
            fc.server.cors_origin.as_deref(),
            Some("https://chat.example.com")
        );
        assert_eq!(fc.relay.typing_ttl_ms, 1500);
        // Untouched keys keep their defaults
        assert_eq!(fc.relay.send_queue_capacity, 256);
    }
}
