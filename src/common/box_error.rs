//! type alias used for errors that have to cross thread boundaries.
//!
//! The relay moves its socket and engine into threads, so anything those threads
//! hand back has to be Send + Sync.
pub type BoxError = std::boxed::Box<
    dyn std::error::Error // must implement Error to satisfy ?
        + std::marker::Send // needed for threads
        + std::marker::Sync, // needed for threads
>;
