//! Settings persisted as a small json file next to the executable.
//!
//! The relay keeps its port here and the client keeps the player name and the
//! favourite host.  Values are looked up in the file first, then in an explicit
//! default given to the getter, then in the defaults object the config was built with.
use json::JsonValue;
use log::{info, warn};
use regex::Regex;
use std::{
    error::Error,
    fmt,
    fs::File,
    io::{ErrorKind, Write},
};

use super::box_error::BoxError;

#[derive(Debug)]
pub struct MissingConfigError {
    key: String,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Required configuration value '{}' is missing", self.key)
    }
}

impl Error for MissingConfigError {}

pub struct Config {
    filename: String,
    settings: JsonValue,
    defaults: JsonValue,
}

impl Config {
    pub fn build(filename: &str, defaults: JsonValue) -> Result<Config, std::io::Error> {
        // Only plain file names in the working directory
        let filename_regex = Regex::new(r"^[a-zA-Z0-9_\-\.]+\.json$")
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        if !filename_regex.is_match(filename) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Invalid filename '{}' - must contain only letters, numbers, underscore, dash, dot and end in .json",
                    filename
                ),
            ));
        }

        let mut config = Config {
            filename: filename.to_string(),
            settings: json::object! {},
            defaults,
        };

        if let Err(err) = config.load_from_file() {
            warn!("{} not loaded, using default settings: {}", config.filename, err);
        }

        Ok(config)
    }

    fn load_from_file(&mut self) -> std::io::Result<()> {
        let raw_data = std::fs::read_to_string(&self.filename)?;
        match json::parse(&raw_data) {
            Ok(parsed) if parsed.is_object() => {
                self.settings = parsed;
                info!("Loaded settings from {}: {}", self.filename, self.settings.dump());
            }
            Ok(_) => {
                warn!("Settings file {} does not hold an object, ignoring it", self.filename);
            }
            Err(err) => {
                warn!("Failed to parse config file {}: {}", self.filename, err);
            }
        }
        Ok(())
    }

    pub fn get_filename(&self) -> &str {
        &self.filename
    }

    /// true if the value came from the file (or was set) rather than a default
    pub fn has_value(&self, key: &str) -> bool {
        !self.settings[key].is_null()
    }

    pub fn get_str_value(&self, key: &str, default: Option<String>) -> Result<String, MissingConfigError> {
        if let Some(val) = self.settings[key].as_str() {
            return Ok(val.to_string());
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_str() {
            return Ok(val.to_string());
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn get_u32_value(&self, key: &str, default: Option<u32>) -> Result<u32, MissingConfigError> {
        if let Some(val) = self.settings[key].as_u32() {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_u32() {
            return Ok(val);
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn get_u64_value(&self, key: &str, default: Option<u64>) -> Result<u64, MissingConfigError> {
        if let Some(val) = self.settings[key].as_u64() {
            return Ok(val);
        }
        if let Some(def) = default {
            return Ok(def);
        }
        if let Some(val) = self.defaults[key].as_u64() {
            return Ok(val);
        }
        Err(MissingConfigError { key: key.to_string() })
    }

    pub fn set_value(&mut self, key: &str, val: impl Into<JsonValue>) -> Result<(), String> {
        let json_val = val.into();
        match json_val {
            JsonValue::Short(_) | JsonValue::String(_) | JsonValue::Boolean(_) | JsonValue::Number(_) => {
                self.settings[key] = json_val;
                Ok(())
            }
            _ => Err(format!("Unsupported value type for key: {}", key)),
        }
    }

    /// write the current settings back to the file, creating it if needed
    pub fn save_settings(&self) -> Result<(), BoxError> {
        let mut f = File::create(self.filename.as_str())?;
        f.write_all(self.settings.pretty(2).as_bytes())?;
        f.sync_all()?;
        info!("settings saved to {}", self.filename);
        Ok(())
    }
}
