//! These modules are shared among both the client and relay executables for midijam.
use std::time::{SystemTime, UNIX_EPOCH};

pub mod box_error;
pub mod config;
pub mod sock_with_tos;
pub mod timer;
pub mod wire_message;

/// wall clock in milliseconds since the epoch.  This is what goes out in PING messages
pub fn get_milli_time() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
