//! midijam - networked MIDI jam sessions
//!
//! provides library elements to build a relay server that hosts a jam session
//! over UDP, and the client pieces that talk to it (chat, MIDI, chord names)
extern crate json;

pub mod chord;
pub mod client;
pub mod common;
pub mod server;
