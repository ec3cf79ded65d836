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
//! The rendering graph the engine drives.
//!
//! Voices are described as [`VoiceGraph`] values, submitted through an
//! [`AudioContext`] and rendered by the [`Renderer`] the host owns. The
//! renderer keeps every active voice in an arena and reclaims it once its
//! stop deadline has passed.

pub mod buffer;
pub mod clock;
pub mod context;
pub mod decode;
pub mod filter;
pub mod graph;
pub mod param;
pub mod renderer;

pub use buffer::AudioBuffer;
pub use clock::{AudioClock, FrameClock, ManualClock};
pub use context::{AudioContext, VoiceId};
pub use decode::{decode, DecodeError};
pub use filter::FilterKind;
pub use graph::{NodeId, VoiceBuilder, VoiceGraph, Waveform};
pub use param::{Param, ENVELOPE_FLOOR};
pub use renderer::Renderer;
