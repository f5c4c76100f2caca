//! Turn a set of held notes into something a musician can read.
//!
//! - nothing held: empty label
//! - one note: the note name in parentheses, e.g. `(C)`
//! - two notes: the interval name, e.g. `Perfect Fifth`
//! - three or more: a chord name like `C Major` or `C Major/E`, or the note names
//!   in parentheses when the shape isn't in the [`ChordCatalog`]
//!
//! Chords are found by stacking the notes in every rotation (lowest notes moved up
//! by octaves until they sit on top) and looking each rotation's signature up in the
//! catalog.  The rotation rooted on the bass wins if it is a known chord.  Otherwise
//! the most compact known rotation wins and the bass is written after a slash.
use super::{
    catalog::{interval_name, ChordCatalog},
    pitch::{pitch_class, pitch_class_name, Accidentals},
};

/// Knobs the caller gets to turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecognizeOptions {
    pub accidentals: Accidentals,
    /// treat notes an octave apart as the same note
    pub octave_insensitive: bool,
}

/// One way of stacking the notes.  `notes` is strictly ascending and `notes[0]` is the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub index: usize,
    pub notes: Vec<i32>,
    pub gaps: Vec<i32>,
    pub signature: Vec<u8>,
}

impl Rotation {
    fn stack(sorted: &[u8], index: usize) -> Rotation {
        let mut notes: Vec<i32> = sorted[index..].iter().map(|n| *n as i32).collect();
        for n in &sorted[..index] {
            let mut moved = *n as i32;
            let top = notes.last().copied().unwrap_or(moved - 1);
            while moved <= top {
                moved += 12;
            }
            notes.push(moved);
        }
        let gaps = notes.windows(2).map(|w| w[1] - w[0]).collect();
        let root = notes[0];
        let mut signature: Vec<u8> = notes[1..]
            .iter()
            .map(|n| ((n - root) % 12) as u8)
            .filter(|offset| *offset != 0)
            .collect();
        signature.sort_unstable();
        signature.dedup();
        Rotation {
            index,
            notes,
            gaps,
            signature,
        }
    }
    pub fn root(&self) -> i32 {
        self.notes[0]
    }
    pub fn root_pitch_class(&self) -> u8 {
        self.root().rem_euclid(12) as u8
    }
    /// sum of the gaps, i.e. distance from the root to the top note
    pub fn span(&self) -> i32 {
        self.gaps.iter().sum()
    }
}

/// every rotation of an ascending, duplicate free note list
pub fn rotations(sorted: &[u8]) -> Vec<Rotation> {
    (0..sorted.len()).map(|i| Rotation::stack(sorted, i)).collect()
}

/// Pick the rotation that names the chord, along with the chord quality.
///
/// Only rotations found in the catalog are candidates.  They are ranked by: rooted
/// on the bass pitch class first, then the smallest span, then the smallest gaps
/// compared in order, then the rotation index.
pub fn best_rotation(sorted: &[u8], bass_pitch_class: u8) -> Option<(Rotation, &'static str)> {
    let catalog = ChordCatalog::get();
    rotations(sorted)
        .into_iter()
        .filter_map(|r| catalog.lookup(&r.signature).map(|quality| (r, quality)))
        .min_by(|(a, _), (b, _)| {
            let a_key = (a.root_pitch_class() != bass_pitch_class, a.span());
            let b_key = (b.root_pitch_class() != bass_pitch_class, b.span());
            a_key
                .cmp(&b_key)
                .then_with(|| a.gaps.cmp(&b.gaps))
                .then_with(|| a.index.cmp(&b.index))
        })
}

fn note_list(notes: &[u8], accidentals: Accidentals) -> String {
    let names: Vec<&str> = notes
        .iter()
        .map(|n| pitch_class_name(*n, accidentals))
        .collect();
    format!("({})", names.join(", "))
}

fn detect_interval(low: u8, high: u8) -> String {
    let mut semitones = (high as u32 - low as u32) % 24;
    if semitones > 21 {
        semitones -= 12;
    }
    interval_name(semitones).to_string()
}

fn detect_chord(sorted: &[u8], bass: u8, accidentals: Accidentals) -> String {
    match best_rotation(sorted, pitch_class(bass)) {
        Some((rotation, quality)) => {
            let root = rotation.root_pitch_class();
            let mut label = format!("{} {}", pitch_class_name(root, accidentals), quality);
            if pitch_class(bass) != root {
                label.push('/');
                label.push_str(pitch_class_name(bass, accidentals));
            }
            label
        }
        None => note_list(sorted, accidentals),
    }
}

/// Name whatever is being held.  Duplicate notes count once.
pub fn detect_interval_or_chord<I>(notes: I, options: &RecognizeOptions) -> String
where
    I: IntoIterator<Item = u8>,
{
    let mut sorted: Vec<u8> = notes.into_iter().collect();
    sorted.sort_unstable();
    let bass = match sorted.first() {
        Some(b) => *b,
        None => return String::new(),
    };
    if options.octave_insensitive {
        for n in sorted.iter_mut() {
            *n = pitch_class(*n);
        }
        sorted.sort_unstable();
    }
    sorted.dedup();

    match sorted.len() {
        1 => note_list(&sorted, options.accidentals),
        2 => detect_interval(sorted[0], sorted[1]),
        _ => detect_chord(&sorted, bass, options.accidentals),
    }
}
