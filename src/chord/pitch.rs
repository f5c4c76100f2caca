//! Pitch class names.  A pitch class is a midi note number modulo 12 (0 = C).
use std::fmt;

const SHARP_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const FLAT_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B"];

/// How black keys get spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accidentals {
    #[default]
    Sharps,
    Flats,
}

impl fmt::Display for Accidentals {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Accidentals::Sharps => write!(f, "sharps"),
            Accidentals::Flats => write!(f, "flats"),
        }
    }
}

pub fn pitch_class(note: u8) -> u8 {
    note % 12
}

pub fn pitch_class_name(note: u8, accidentals: Accidentals) -> &'static str {
    let pc = pitch_class(note) as usize;
    match accidentals {
        Accidentals::Sharps => SHARP_NAMES[pc],
        Accidentals::Flats => FLAT_NAMES[pc],
    }
}
