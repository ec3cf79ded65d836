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
//! The sequencer model the engine plays from. The host owns the tracks; the
//! engine reads them at step time and reports every fired step back.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::note;

/// Number of steps in a pattern (one bar of 16th notes).
pub const STEPS: usize = 16;

/// Number of notes in a melodic pattern (one per even step).
pub const NOTES: usize = STEPS / 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Drum,
    Synth,
    Bass,
}

/// Per-track sound parameters. Only `gain`, `pan`, `speed`, `lpf` and `hpf`
/// affect rendering; the rest are carried for the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackParams {
    pub gain: f32,
    pub pan: f32,
    pub speed: f32,
    pub lpf: f32,
    pub lpq: f32,
    pub hpf: f32,
    pub hpq: f32,
    pub delay: f32,
    pub delay_time: f32,
    pub delay_feedback: f32,
    pub reverb: f32,
    pub reverb_size: f32,
    pub distort: f32,
    pub crush: f32,
    pub phaser: f32,
    pub phaser_depth: f32,
    pub vowel: String,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for TrackParams {
    fn default() -> Self {
        TrackParams {
            gain: 0.8,
            pan: 0.5,
            speed: 1.0,
            lpf: 20_000.0,
            lpq: 0.0,
            hpf: 20.0,
            hpq: 0.0,
            delay: 0.0,
            delay_time: 0.25,
            delay_feedback: 0.5,
            reverb: 0.0,
            reverb_size: 0.5,
            distort: 0.0,
            crush: 16.0,
            phaser: 0.0,
            phaser_depth: 0.5,
            vowel: String::new(),
            attack: 0.001,
            decay: 0.1,
            sustain: 0.5,
            release: 0.1,
        }
    }
}

fn default_notes() -> [String; NOTES] {
    std::array::from_fn(|_| note::REST.to_string())
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TrackType,
    pub sound_id: String,
    #[serde(default)]
    pub pattern: [bool; STEPS],
    #[serde(default = "default_notes")]
    pub notes: [String; NOTES],
    #[serde(default)]
    pub params: TrackParams,
    #[serde(default)]
    pub drum_bank: Option<String>,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
}

impl Track {
    fn new(id: &str, kind: TrackType, sound_id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            sound_id: sound_id.to_string(),
            pattern: [false; STEPS],
            notes: default_notes(),
            params: TrackParams::default(),
            drum_bank: None,
            muted: false,
            solo: false,
        }
    }

    /// A drum track that hits on the given steps.
    pub fn drum(id: &str, sound_id: &str, steps: &[usize]) -> Track {
        let mut track = Track::new(id, TrackType::Drum, sound_id);
        for &step in steps {
            if let Some(hit) = track.pattern.get_mut(step) {
                *hit = true;
            }
        }
        track
    }

    /// A melodic track. Missing notes are rests; extra notes are ignored.
    pub fn melodic(id: &str, kind: TrackType, sound_id: &str, notes: &[&str]) -> Track {
        let mut track = Track::new(id, kind, sound_id);
        for (slot, note) in track.notes.iter_mut().zip(notes) {
            *slot = note.to_string();
        }
        track
    }

    pub fn with_drum_bank(mut self, drum_bank: &str) -> Track {
        self.drum_bank = Some(drum_bank.to_string());
        self
    }

    pub fn with_params(mut self, params: TrackParams) -> Track {
        self.params = params;
        self
    }

    pub fn is_drum(&self) -> bool {
        self.kind == TrackType::Drum
    }

    /// Whether this drum track hits on `step`.
    pub fn hits(&self, step: usize) -> bool {
        self.is_drum() && self.pattern.get(step).copied().unwrap_or(false)
    }

    /// The note a melodic track plays on `step`. Notes sit on even steps;
    /// rests and odd steps yield `None`.
    pub fn note_at(&self, step: usize) -> Option<&str> {
        if self.is_drum() || step % 2 != 0 {
            return None;
        }
        self.notes
            .get(step / 2)
            .map(String::as_str)
            .filter(|note| !note.is_empty() && !note::is_rest(note))
    }
}

/// Tracks that should sound: the soloed ones if any track is soloed,
/// otherwise every unmuted track.
pub fn active_tracks(tracks: &[Track]) -> Vec<&Track> {
    if tracks.iter().any(|track| track.solo) {
        tracks.iter().filter(|track| track.solo).collect()
    } else {
        tracks.iter().filter(|track| !track.muted).collect()
    }
}

/// What the engine needs from the host's sequencer state.
pub trait SequencerModel: Send + Sync {
    /// A snapshot of every track.
    fn tracks(&self) -> Vec<Track>;

    fn bpm(&self) -> f64;

    /// Master volume in `0..=1`.
    fn master_volume(&self) -> f32;

    /// Called once for every fired step.
    fn on_step(&self, step: usize);
}

struct SequenceState {
    tracks: Vec<Track>,
    bpm: f64,
    master_volume: f32,
    current_step: Option<usize>,
}

/// An in-memory sequencer model that can be shared with the engine and
/// edited while it plays.
pub struct SharedSequence {
    state: RwLock<SequenceState>,
}

impl SharedSequence {
    pub fn new(bpm: f64) -> SharedSequence {
        SharedSequence {
            state: RwLock::new(SequenceState {
                tracks: Vec::new(),
                bpm,
                master_volume: 0.8,
                current_step: None,
            }),
        }
    }

    pub fn with_tracks(self, tracks: Vec<Track>) -> SharedSequence {
        self.state.write().tracks = tracks;
        self
    }

    pub fn add_track(&self, track: Track) {
        self.state.write().tracks.push(track);
    }

    /// Removes a track. Returns false if no track has that id.
    pub fn remove_track(&self, id: &str) -> bool {
        let mut state = self.state.write();
        let before = state.tracks.len();
        state.tracks.retain(|track| track.id != id);
        state.tracks.len() != before
    }

    /// Applies `update` to the track with the given id. Returns false if no
    /// track has that id.
    pub fn update_track<F: FnOnce(&mut Track)>(&self, id: &str, update: F) -> bool {
        let mut state = self.state.write();
        match state.tracks.iter_mut().find(|track| track.id == id) {
            Some(track) => {
                update(track);
                true
            }
            None => false,
        }
    }

    pub fn toggle_mute(&self, id: &str) -> bool {
        self.update_track(id, |track| track.muted = !track.muted)
    }

    pub fn toggle_solo(&self, id: &str) -> bool {
        self.update_track(id, |track| track.solo = !track.solo)
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.state.write().bpm = bpm;
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.state.write().master_volume = volume.clamp(0.0, 1.0);
    }

    /// The last step reported by the engine.
    pub fn current_step(&self) -> Option<usize> {
        self.state.read().current_step
    }
}

impl SequencerModel for SharedSequence {
    fn tracks(&self) -> Vec<Track> {
        self.state.read().tracks.clone()
    }

    fn bpm(&self) -> f64 {
        self.state.read().bpm
    }

    fn master_volume(&self) -> f32 {
        self.state.read().master_volume
    }

    fn on_step(&self, step: usize) {
        self.state.write().current_step = Some(step);
    }
}

impl std::fmt::Debug for SharedSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SharedSequence")
            .field("tracks", &state.tracks.len())
            .field("bpm", &state.bpm)
            .field("master_volume", &state.master_volume)
            .field("current_step", &state.current_step)
            .finish()
    }
}
