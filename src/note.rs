// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Pitch strings such as `"c#4"`: a note name `a`-`g` (either case), an
//! optional sharp and a single octave digit. `"~"` is a rest.

/// The rest marker of a melodic pattern.
pub const REST: &str = "~";

/// Reference pitch of A4 in Hz. Malformed pitch strings resolve here.
pub const A4_FREQUENCY: f32 = 440.0;

const A4_MIDI: u8 = 69;

/// A parsed pitch: semitone within the octave (C = 0) and octave number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pitch {
    pub semitone: u8,
    pub octave: u8,
}

impl Pitch {
    /// Semitones above or below A4.
    pub fn semitones_from_a4(&self) -> i32 {
        (i32::from(self.octave) - 4) * 12 + i32::from(self.semitone) - 9
    }

    pub fn frequency(&self) -> f32 {
        A4_FREQUENCY * 2f32.powf(self.semitones_from_a4() as f32 / 12.0)
    }

    /// MIDI note number, saturating at 127.
    pub fn midi_note(&self) -> u8 {
        ((self.octave + 1) * 12 + self.semitone).min(127)
    }
}

pub fn is_rest(note: &str) -> bool {
    note == REST
}

/// Parses a pitch string. Returns `None` for anything malformed, rests included.
pub fn parse(note: &str) -> Option<Pitch> {
    let lower = note.to_ascii_lowercase();
    let mut chars = lower.chars();
    let base = match chars.next()? {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (sharp, octave) = match rest.strip_prefix('#') {
        Some(_) if base == 4 || base == 11 => return None,
        Some(octave) => (1, octave),
        None => (0, rest),
    };
    let mut digits = octave.chars();
    let octave = digits.next()?.to_digit(10)? as u8;
    if digits.next().is_some() {
        return None;
    }
    Some(Pitch {
        semitone: base + sharp,
        octave,
    })
}

/// Frequency of a pitch string. Rests yield `None`; malformed strings fall
/// back to A4.
pub fn frequency(note: &str) -> Option<f32> {
    if is_rest(note) {
        return None;
    }
    Some(parse(note).map_or(A4_FREQUENCY, |pitch| pitch.frequency()))
}

/// MIDI note number of a pitch string, with the same fallbacks as
/// [`frequency`].
pub fn midi_note(note: &str) -> Option<u8> {
    if is_rest(note) {
        return None;
    }
    Some(parse(note).map_or(A4_MIDI, |pitch| pitch.midi_note()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn test_frequency() {
        assert!(close(frequency("a4").unwrap(), 440.0));
        assert!(close(frequency("A4").unwrap(), 440.0));
        assert!(close(frequency("c4").unwrap(), 261.63));
        assert!(close(frequency("a#4").unwrap(), 466.16));
        assert!(close(frequency("a3").unwrap(), 220.0));
        assert!(close(frequency("c0").unwrap(), 16.35));
    }

    #[test]
    fn test_rest() {
        assert_eq!(frequency("~"), None);
        assert_eq!(midi_note("~"), None);
        assert!(is_rest("~"));
    }

    #[test]
    fn test_malformed_falls_back_to_a4() {
        for note in ["h9", "", "c", "c#", "c10", "db4", "4c", "e#4", "b#3"] {
            assert_eq!(frequency(note), Some(440.0), "{}", note);
            assert_eq!(midi_note(note), Some(69), "{}", note);
        }
    }

    #[test]
    fn test_midi_note() {
        assert_eq!(midi_note("c4"), Some(60));
        assert_eq!(midi_note("a4"), Some(69));
        assert_eq!(midi_note("f#2"), Some(42));
        assert_eq!(midi_note("g9"), Some(127));
        assert_eq!(midi_note("b9"), Some(127));
    }
}
