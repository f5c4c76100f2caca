//! things used to make the jam client: the relay connection, the MIDI bridge and settings
pub mod jam_client;
pub mod midi_bridge;
pub mod settings;
