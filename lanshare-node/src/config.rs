//! Load config from file and environment.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Daemon configuration. File: ~/.config/lanshare/config.toml or /etc/lanshare/config.toml.
/// Env overrides: LANSHARE_DISCOVERY_PORT, LANSHARE_FILE_SERVER_PORT, LANSHARE_BRIDGE_PORT,
/// LANSHARE_SHARED_DIR, LANSHARE_DOWNLOAD_DIR, LANSHARE_ADVERTISE_IP, LANSHARE_LOG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Conventional discovery UDP port (default 5003). 0 binds an OS-assigned port.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// TCP file server port (default 5001). 0 binds an OS-assigned port.
    #[serde(default = "default_file_server_port")]
    pub file_server_port: u16,
    /// Loopback command bridge port (default 8765). 0 disables the bridge.
    #[serde(default = "default_bridge_port")]
    pub bridge_port: u16,
    #[serde(default = "default_shared_dir")]
    pub shared_dir: PathBuf,
    #[serde(default = "default_shared_dir")]
    pub download_dir: PathBuf,
    /// IP reported in file_found_response; detected when unset.
    #[serde(default)]
    pub advertise_ip: Option<IpAddr>,
    /// Broadcast targets; interface enumeration when unset.
    #[serde(default)]
    pub broadcast_addrs: Option<Vec<Ipv4Addr>>,
    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,
    #[serde(default = "default_broadcast_lookup_timeout_ms")]
    pub broadcast_lookup_timeout_ms: u64,
    #[serde(default = "default_peer_lookup_timeout_ms")]
    pub peer_lookup_timeout_ms: u64,
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,
    /// tracing filter directive (default "info"); RUST_LOG wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_discovery_port() -> u16 {
    lanshare_core::DEFAULT_DISCOVERY_PORT
}
fn default_file_server_port() -> u16 {
    5001
}
fn default_bridge_port() -> u16 {
    8765
}
fn default_shared_dir() -> PathBuf {
    PathBuf::from("publicFiles")
}
fn default_announce_interval_ms() -> u64 {
    2_000
}
fn default_broadcast_lookup_timeout_ms() -> u64 {
    3_000
}
fn default_peer_lookup_timeout_ms() -> u64 {
    2_000
}
fn default_transfer_timeout_ms() -> u64 {
    30_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            file_server_port: default_file_server_port(),
            bridge_port: default_bridge_port(),
            shared_dir: default_shared_dir(),
            download_dir: default_shared_dir(),
            advertise_ip: None,
            broadcast_addrs: None,
            announce_interval_ms: default_announce_interval_ms(),
            broadcast_lookup_timeout_ms: default_broadcast_lookup_timeout_ms(),
            peer_lookup_timeout_ms: default_peer_lookup_timeout_ms(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn broadcast_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_lookup_timeout_ms)
    }

    pub fn peer_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_lookup_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

/// Load config: merge default, then config file (if present), then env vars.
/// Problems with the file are returned, not logged, so the caller can report
/// them once logging is up.
pub fn load() -> (Config, Vec<String>) {
    let (file, problems) = load_file(&config_paths());
    (apply_env(file.unwrap_or_default(), |key| std::env::var(key).ok()), problems)
}

fn apply_env(mut c: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(p) = var("LANSHARE_DISCOVERY_PORT").and_then(|s| s.parse().ok()) {
        c.discovery_port = p;
    }
    if let Some(p) = var("LANSHARE_FILE_SERVER_PORT").and_then(|s| s.parse().ok()) {
        c.file_server_port = p;
    }
    if let Some(p) = var("LANSHARE_BRIDGE_PORT").and_then(|s| s.parse().ok()) {
        c.bridge_port = p;
    }
    if let Some(d) = var("LANSHARE_SHARED_DIR") {
        c.shared_dir = PathBuf::from(d);
    }
    if let Some(d) = var("LANSHARE_DOWNLOAD_DIR") {
        c.download_dir = PathBuf::from(d);
    }
    if let Some(ip) = var("LANSHARE_ADVERTISE_IP").and_then(|s| s.parse().ok()) {
        c.advertise_ip = Some(ip);
    }
    if let Some(level) = var("LANSHARE_LOG") {
        c.log_level = level;
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/lanshare/config.toml"));
    }
    out.push(PathBuf::from("/etc/lanshare/config.toml"));
    out
}

/// First existing path wins. A file that cannot be read or parsed falls back
/// to defaults and yields a problem message.
fn load_file(paths: &[PathBuf]) -> (Option<Config>, Vec<String>) {
    let Some(p) = paths.iter().find(|p| p.exists()) else {
        return (None, Vec::new());
    };
    let parsed = std::fs::read_to_string(p)
        .map_err(|e| format!("cannot read config file {}: {e}; using defaults", p.display()))
        .and_then(|s| {
            toml::from_str::<Config>(&s)
                .map_err(|e| format!("ignoring config file {}: {e}; using defaults", p.display()))
        });
    match parsed {
        Ok(c) => (Some(c), Vec::new()),
        Err(problem) => (None, vec![problem]),
    }
}
