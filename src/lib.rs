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
//! A lookahead step sequencer engine.
//!
//! [`Engine`] fires the steps of a 16-step pattern against an audio clock and
//! turns every hit into a voice: a synthesized drum, an oscillator note, a
//! drum machine sample or a General MIDI soundfont zone. The host pulls audio
//! out of the [`Renderer`] returned alongside the engine.

pub mod assets;
pub mod audio;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod note;
pub mod playsync;
pub mod scheduler;
pub mod sequencer;
pub mod synth;
#[cfg(test)]
mod testutil;

pub use assets::{Fetcher, FileFetcher, SampleLoader, SoundfontLoader};
pub use audio::{AudioClock, AudioContext, Renderer};
pub use config::EngineConfig;
pub use dispatch::{Dispatched, VoiceParams};
pub use engine::Engine;
pub use error::EngineError;
pub use sequencer::{SequencerModel, SharedSequence, Track, TrackParams, TrackType};
