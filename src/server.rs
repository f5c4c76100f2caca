//! things used to make the relay server (UDP fan-out for a jam session)
pub mod liveness;
pub mod peer;
pub mod peer_list;
pub mod relay_engine;
pub mod relay_server;
pub mod settings;
pub mod transport;
