//! Relay settings, read from `server_settings.json`.
use json::JsonValue;
use log::{info, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::common::{box_error::BoxError, config::Config};

use super::{
    liveness::DEFAULT_PING_INTERVAL, peer_list::MAX_PEER_IDS,
    relay_engine::DEFAULT_CLIENT_TIMEOUT,
};

pub const SETTINGS_FILE: &str = "server_settings.json";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub port: u16,
    pub bind_ip: IpAddr,
    pub ping_interval_ms: u128,
    pub client_timeout_ms: u128,
    pub max_peers: u32,
}

impl Default for RelaySettings {
    fn default() -> RelaySettings {
        RelaySettings {
            port: DEFAULT_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ping_interval_ms: DEFAULT_PING_INTERVAL,
            client_timeout_ms: DEFAULT_CLIENT_TIMEOUT,
            max_peers: MAX_PEER_IDS,
        }
    }
}

impl RelaySettings {
    pub fn defaults_json() -> JsonValue {
        let d = RelaySettings::default();
        let port = d.port;
        let ping_interval_ms = d.ping_interval_ms as u64;
        let client_timeout_ms = d.client_timeout_ms as u64;
        let max_peers = d.max_peers;
        json::object! {
            "port": port,
            "ping_interval_ms": ping_interval_ms,
            "client_timeout_ms": client_timeout_ms,
            "max_peers": max_peers,
        }
    }

    /// pull the settings out of a loaded config.  Out of range values fall back to defaults
    pub fn from_config(config: &Config) -> RelaySettings {
        let mut settings = RelaySettings::default();
        if let Ok(port) = config.get_u32_value("port", None) {
            match u16::try_from(port) {
                Ok(p) => settings.port = p,
                Err(_) => warn!("port {} in {} is out of range", port, config.get_filename()),
            }
        }
        if let Ok(ms) = config.get_u64_value("ping_interval_ms", None) {
            settings.ping_interval_ms = ms.max(1) as u128;
        }
        if let Ok(ms) = config.get_u64_value("client_timeout_ms", None) {
            settings.client_timeout_ms = ms as u128;
        }
        if let Ok(n) = config.get_u32_value("max_peers", None) {
            settings.max_peers = n.min(MAX_PEER_IDS);
        }
        settings
    }

    /// Load the settings file.  A port given on the command line wins and is written back
    /// so the next start uses it too.
    pub fn load(filename: &str, port_override: Option<u16>) -> Result<RelaySettings, BoxError> {
        let mut config = Config::build(filename, RelaySettings::defaults_json())?;
        let mut settings = RelaySettings::from_config(&config);
        match port_override {
            Some(port) => {
                settings.port = port;
                config.set_value("port", port)?;
                config.save_settings()?;
                info!("port {} saved to {}", port, filename);
            }
            None if !config.has_value("port") => {
                config.set_value("port", settings.port)?;
                config.save_settings()?;
            }
            None => {}
        }
        Ok(settings)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }
}
