//! Client settings: who we are and which relay we like, kept in `client_settings.json`.
use json::JsonValue;
use log::info;
use rand::Rng;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::common::{box_error::BoxError, config::Config};
use simple_error::bail;

pub const SETTINGS_FILE: &str = "client_settings.json";
pub const DEFAULT_HOST: &str = "127.0.0.1:5000";

/// a name for somebody who never picked one, e.g. `Guest#48213`
pub fn guest_name() -> String {
    let mut rng = rand::thread_rng();
    format!("Guest#{}", rng.gen_range(10000..100000))
}

pub struct ClientSettings {
    pub name: String,
    pub host: String,
    config: Config,
}

impl ClientSettings {
    pub fn defaults_json() -> JsonValue {
        json::object! { "host": DEFAULT_HOST }
    }

    /// Load the file.  Anything missing is filled in and saved back so the guest name sticks.
    pub fn load(filename: &str) -> Result<ClientSettings, BoxError> {
        let mut config = Config::build(filename, ClientSettings::defaults_json())?;
        let mut dirty = false;
        let name = match config.get_str_value("name", None) {
            Ok(n) => n,
            Err(_) => {
                let n = guest_name();
                info!("no name in {}, you are {}", filename, n);
                config.set_value("name", n.as_str())?;
                dirty = true;
                n
            }
        };
        if !config.has_value("host") {
            config.set_value("host", DEFAULT_HOST)?;
            dirty = true;
        }
        let host = config.get_str_value("host", None)?;
        if dirty {
            config.save_settings()?;
        }
        Ok(ClientSettings { name, host, config })
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), BoxError> {
        self.config.set_value("name", name)?;
        self.name = name.to_string();
        Ok(())
    }

    pub fn set_host(&mut self, host: &str) -> Result<(), BoxError> {
        self.config.set_value("host", host)?;
        self.host = host.to_string();
        Ok(())
    }

    pub fn save(&self) -> Result<(), BoxError> {
        self.config.save_settings()
    }

    /// resolve the favourite host
    pub fn server_addr(&self) -> Result<SocketAddr, BoxError> {
        match self.host.to_socket_addrs()?.next() {
            Some(addr) => Ok(addr),
            None => bail!("host {} did not resolve", self.host),
        }
    }
}
