//! # Musical Tuning Module
//!
//! This module converts detected frequencies into the nearest chromatic note
//! and a signed cent deviation, relative to a configurable A4 reference pitch.
//!
//! ## Features
//! - Fixed 12-entry chromatic table indexed by MIDI number modulo 12
//! - Equal temperament conversion against any positive reference pitch
//! - Round-half-up snapping to the nearest semitone
//! - Correct octave numbers below MIDI 0 (floor division)

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// MIDI number of A4, the note the reference frequency is assigned to.
pub const A4_MIDI: i32 = 69;

/// Standard concert pitch in Hz.
pub const DEFAULT_REFERENCE_FREQUENCY_HZ: f32 = 440.0;

/// Display labels of the 12 pitch classes.
///
/// Index is the MIDI number modulo 12, so index 0 is C and index 9 is A.
pub const CHROMATIC_SCALE: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the 12 chromatic pitch classes, stored as its table index (0-11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchClass(u8);

impl PitchClass {
    /// Returns the pitch class of a (possibly negative) MIDI number.
    pub fn from_midi(midi: i32) -> Self {
        Self(midi.rem_euclid(12) as u8)
    }

    /// Returns the pitch class at `index`, or `None` outside 0-11.
    pub fn from_index(index: u8) -> Option<Self> {
        (usize::from(index) < CHROMATIC_SCALE.len()).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Display label, e.g. "C#".
    pub fn label(self) -> &'static str {
        CHROMATIC_SCALE[usize::from(self.0)]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A detected note: pitch class, octave and deviation from the nearest semitone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// Pitch class of the nearest semitone
    pub pitch_class: PitchClass,
    /// Scientific pitch notation octave (A4 is octave 4)
    pub octave: i32,
    /// Signed distance in cents from the nearest semitone, in [-50, +50)
    pub cents_off: f32,
}

impl Note {
    /// MIDI number of the semitone this note was snapped to.
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + i32::from(self.pitch_class.index())
    }

    /// Note name with octave, e.g. "A#4".
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

/// The frequency assigned to A4.
///
/// Any finite positive value is accepted here; narrower bounds for user
/// settings live in [`crate::settings`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningReference {
    frequency_hz: f32,
}

impl TuningReference {
    /// Creates a reference pitch.
    ///
    /// # Returns
    /// * `Err` - If `frequency_hz` is not a finite positive number
    pub fn new(frequency_hz: f32) -> Result<Self> {
        ensure!(
            frequency_hz.is_finite() && frequency_hz > 0.0,
            "reference frequency must be a finite positive number, got {frequency_hz}"
        );
        Ok(Self { frequency_hz })
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }
}

impl Default for TuningReference {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_REFERENCE_FREQUENCY_HZ,
        }
    }
}

/// Stateless frequency to [`Note`] converter bound to one reference pitch.
///
/// Re-tuning means building a new converter; an existing one never changes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PitchConverter {
    reference: TuningReference,
}

impl PitchConverter {
    pub fn new(reference: TuningReference) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> TuningReference {
        self.reference
    }

    /// Converts a frequency to the nearest note in equal temperament.
    ///
    /// This function:
    /// 1. Computes the continuous MIDI number `69 + 12 * log2(f / ref)`
    /// 2. Snaps it to the nearest integer (halves round up)
    /// 3. Derives pitch class, octave and cent offset from the snapped number
    ///
    /// # Arguments
    /// * `frequency_hz` - Detected frequency in Hz
    ///
    /// # Returns
    /// * `Some(note)` - Nearest note with its cent offset
    /// * `None` - The input is not a pitch (zero, negative, NaN or infinite)
    pub fn hz_to_note(&self, frequency_hz: f32) -> Option<Note> {
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return None;
        }

        let midi = continuous_midi(frequency_hz, self.reference.frequency_hz);
        let nearest = nearest_midi(midi);
        let cents_off = ((midi - f64::from(nearest)) * 100.0) as f32;

        Some(Note {
            pitch_class: PitchClass::from_midi(nearest),
            octave: nearest.div_euclid(12) - 1,
            cents_off,
        })
    }

    /// Equal temperament frequency of a MIDI number under this reference.
    pub fn midi_to_hz(&self, midi: i32) -> f32 {
        let semitones = f64::from(midi - A4_MIDI);
        (f64::from(self.reference.frequency_hz) * (semitones / 12.0).exp2()) as f32
    }

    /// Target frequency of the semitone a note was snapped to.
    pub fn target_frequency(&self, note: &Note) -> f32 {
        self.midi_to_hz(note.midi())
    }
}

/// Continuous MIDI pitch of a frequency, with A4 at `reference_hz`.
pub fn continuous_midi(frequency_hz: f32, reference_hz: f32) -> f64 {
    f64::from(A4_MIDI) + 12.0 * (f64::from(frequency_hz) / f64::from(reference_hz)).log2()
}

/// Snaps a continuous MIDI number to the nearest semitone.
///
/// Halves round toward positive infinity: 69.5 becomes 70 and -0.5 becomes 0.
pub fn nearest_midi(midi: f64) -> i32 {
    (midi + 0.5).floor() as i32
}
