//! Chord and interval naming for the notes a player is holding down.
//!
//! [`recognizer::detect_interval_or_chord`] is the entry point.  The rest of the
//! modules are the tables and the note set it works from.
pub mod active_notes;
pub mod catalog;
pub mod pitch;
pub mod recognizer;
