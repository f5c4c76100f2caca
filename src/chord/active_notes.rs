//! The set of keys currently held down on the local instrument.
//!
//! Only the midi bridge writes to this (one consumer thread), it exists so the
//! recognizer has something to name.
use std::collections::BTreeSet;
use std::fmt;

use super::recognizer::{detect_interval_or_chord, RecognizeOptions};

pub const MAX_NOTE: u8 = 127;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ActiveNoteSet {
    notes: BTreeSet<u8>,
}

impl ActiveNoteSet {
    pub fn new() -> ActiveNoteSet {
        ActiveNoteSet {
            notes: BTreeSet::new(),
        }
    }
    /// returns false for notes outside 0..=127 (they are ignored)
    pub fn note_on(&mut self, note: u8) -> bool {
        if note > MAX_NOTE {
            return false;
        }
        self.notes.insert(note);
        true
    }
    pub fn note_off(&mut self, note: u8) -> () {
        self.notes.remove(&note);
    }
    pub fn clear(&mut self) -> () {
        self.notes.clear();
    }
    pub fn contains(&self, note: u8) -> bool {
        self.notes.contains(&note)
    }
    pub fn len(&self) -> usize {
        self.notes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
    /// held notes, lowest first
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.notes.iter().copied()
    }
    /// interval or chord name for what is held right now
    pub fn label(&self, options: &RecognizeOptions) -> String {
        detect_interval_or_chord(self.iter(), options)
    }
}

impl fmt::Display for ActiveNoteSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (i, note) in self.notes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", note)?;
        }
        write!(f, "]")
    }
}
