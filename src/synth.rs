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
//! Procedural voices.
//!
//! Every voice function is pure apart from drawing from the context's random
//! source: it builds a [`VoiceGraph`] scheduled at an absolute audio time and
//! leaves submission to the caller.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::audio::{AudioBuffer, Param, ENVELOPE_FLOOR};

pub mod drums;
pub mod noise;
pub mod sampler;
pub mod tonal;

pub use noise::{BrownNoise, Crackle, NoiseColor, PinkNoise, WhiteNoise};

/// Shared state for building voices: the output sample rate and the random
/// source noise is drawn from.
pub struct SynthContext {
    sample_rate: u32,
    rng: StdRng,
}

impl SynthContext {
    pub fn new(sample_rate: u32) -> SynthContext {
        SynthContext {
            sample_rate,
            rng: StdRng::from_entropy(),
        }
    }

    /// A context with a deterministic random source.
    pub fn seeded(sample_rate: u32, seed: u64) -> SynthContext {
        SynthContext {
            sample_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Renders `duration` seconds of noise of the given color into a mono
    /// buffer at the output sample rate.
    pub fn noise_buffer(&mut self, color: NoiseColor, duration: f64) -> Arc<AudioBuffer> {
        let frames = (f64::from(self.sample_rate) * duration.max(0.0)).ceil() as usize;
        let samples = noise::generate(color, frames, self.sample_rate, &mut self.rng);
        Arc::new(AudioBuffer::from_mono(samples, self.sample_rate))
    }
}

impl std::fmt::Debug for SynthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthContext")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// Tone shaping shared by the melodic voices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneParams {
    pub gain: f32,
    /// Low-pass cutoff in Hz.
    pub lpf: f32,
    /// High-pass cutoff in Hz, applied to noise voices only.
    pub hpf: f32,
    /// Stereo position, 0 is left, 0.5 centre and 1 right.
    pub pan: f32,
}

impl Default for ToneParams {
    fn default() -> Self {
        ToneParams {
            gain: 0.5,
            lpf: 20_000.0,
            hpf: 20.0,
            pan: 0.5,
        }
    }
}

/// A gain that starts at `gain` at `at` and decays exponentially to
/// [`ENVELOPE_FLOOR`] over `duration`.
pub(crate) fn decay(gain: f32, at: f64, duration: f64) -> Param {
    Param::constant(gain)
        .set_at(gain, at)
        .exponential_ramp_to(ENVELOPE_FLOOR, at + duration)
}

/// A frequency that sweeps exponentially from `from` to `to` over `duration`.
pub(crate) fn sweep(from: f32, to: f32, at: f64, duration: f64) -> Param {
    Param::constant(from)
        .set_at(from, at)
        .exponential_ramp_to(to, at + duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_buffer_length() {
        let mut ctx = SynthContext::seeded(8_000, 1);
        let buffer = ctx.noise_buffer(NoiseColor::White, 0.15);
        assert_eq!(buffer.frames(), 1_200);
        assert_eq!(buffer.sample_rate(), 8_000);
    }

    #[test]
    fn test_seeded_contexts_agree() {
        let mut a = SynthContext::seeded(8_000, 7);
        let mut b = SynthContext::seeded(8_000, 7);
        assert_eq!(
            a.noise_buffer(NoiseColor::Pink, 0.01),
            b.noise_buffer(NoiseColor::Pink, 0.01)
        );
    }

    #[test]
    fn test_decay_reaches_floor() {
        let envelope = decay(0.8, 1.0, 0.3);
        assert_eq!(envelope.value_at(1.0), 0.8);
        assert!((envelope.value_at(1.3) - ENVELOPE_FLOOR).abs() < 1e-6);
    }
}
