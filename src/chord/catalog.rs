//! Static lookup tables: interval names and chord qualities.
//!
//! A chord signature is the set of semitone offsets (mod 12) of every note above
//! the root, with the root itself left out, in ascending order.  `[4, 7]` is a
//! major triad no matter which octave the third or fifth sits in.
use once_cell::sync::Lazy;
use std::collections::HashMap;

const INTERVAL_NAMES: [&str; 22] = [
    "Unison",
    "Minor Second",
    "Major Second",
    "Minor Third",
    "Major Third",
    "Perfect Fourth",
    "Tritone",
    "Perfect Fifth",
    "Minor Sixth/Aug Fifth",
    "Major Sixth",
    "Minor Seventh",
    "Major Seventh",
    "Octave",
    "Flat Ninth",
    "Ninth",
    "Minor Tenth/Aug Ninth",
    "Major Tenth",
    "Eleventh",
    "Aug Eleventh",
    "Perfect Twelfth",
    "Flat Thirteenth",
    "Thirteenth",
];

pub const UNKNOWN_INTERVAL: &str = "Unknown Interval";

/// name for an interval that has already been folded into 0..=21 semitones
pub fn interval_name(semitones: u32) -> &'static str {
    INTERVAL_NAMES
        .get(semitones as usize)
        .copied()
        .unwrap_or(UNKNOWN_INTERVAL)
}

const CHORDS: [(&[u8], &str); 18] = [
    (&[4, 7], "Major"),
    (&[3, 7], "Minor"),
    (&[3, 6], "Diminished"),
    (&[4, 8], "Augmented"),
    (&[5, 7], "Sus4"),
    (&[2, 7], "Sus2"),
    (&[4, 7, 9], "Major 6th"),
    (&[3, 7, 9], "Minor 6th"),
    (&[4, 7, 10], "Dominant 7th"),
    (&[4, 7, 11], "Major 7th"),
    (&[3, 7, 10], "Minor 7th"),
    (&[3, 6, 9], "Diminished 7th"),
    (&[3, 6, 10], "Half-Diminished"),
    (&[4, 8, 10], "Augmented 7th"),
    (&[2, 4, 7, 10], "Dominant 9th"),
    (&[2, 4, 7, 11], "Major 9th"),
    (&[2, 3, 7, 10], "Minor 9th"),
    (&[2, 3, 6, 9], "Diminished 9th"),
];

/// signature -> chord quality.  Built once, never changes.
pub struct ChordCatalog {
    chords: HashMap<Vec<u8>, &'static str>,
}

static CATALOG: Lazy<ChordCatalog> = Lazy::new(ChordCatalog::build);

impl ChordCatalog {
    fn build() -> ChordCatalog {
        ChordCatalog {
            chords: CHORDS
                .iter()
                .map(|(sig, quality)| (sig.to_vec(), *quality))
                .collect(),
        }
    }
    /// the shared catalog
    pub fn get() -> &'static ChordCatalog {
        &CATALOG
    }
    pub fn lookup(&self, signature: &[u8]) -> Option<&'static str> {
        self.chords.get(signature).copied()
    }
    pub fn len(&self) -> usize {
        self.chords.len()
    }
}

#[cfg(test)]
mod test_catalog {
    use super::*;

    #[test]
    fn interval_table_edges() {
        assert_eq!(interval_name(0), "Unison");
        assert_eq!(interval_name(7), "Perfect Fifth");
        assert_eq!(interval_name(12), "Octave");
        assert_eq!(interval_name(21), "Thirteenth");
        assert_eq!(interval_name(22), UNKNOWN_INTERVAL);
    }

    #[test]
    fn catalog_lookups() {
        let catalog = ChordCatalog::get();
        assert_eq!(catalog.len(), 18);
        assert_eq!(catalog.lookup(&[4, 7]), Some("Major"));
        assert_eq!(catalog.lookup(&[2, 3, 6, 9]), Some("Diminished 9th"));
        assert_eq!(catalog.lookup(&[7, 4]), None);
        assert_eq!(catalog.lookup(&[1, 2]), None);
    }

    #[test]
    fn signatures_are_canonical() {
        // every key must already be sorted, unique and without the root
        for (sig, _) in CHORDS.iter() {
            assert!(sig.windows(2).all(|w| w[0] < w[1]));
            assert!(sig.iter().all(|s| *s > 0 && *s < 12));
        }
    }
}
