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
use crate::audio::graph::GraphError;
use crate::audio::{FilterKind, NodeId, Param, VoiceBuilder, VoiceGraph, Waveform};

use super::{decay, NoiseColor, SynthContext, ToneParams};

/// Detune offsets of the supersaw stack, in cents.
pub const SUPERSAW_DETUNE: [f32; 7] = [-40.0, -25.0, -15.0, 0.0, 15.0, 25.0, 40.0];

/// Detune offsets of the supersquare stack, in cents.
pub const SUPERSQUARE_DETUNE: [f32; 5] = [-30.0, -15.0, 0.0, 15.0, 30.0];

/// Ratio of the FM modulator to the carrier frequency.
pub const FM_RATIO: f32 = 2.0;

/// Modulation depth of the FM voice as a multiple of the carrier frequency.
pub const FM_DEPTH: f32 = 2.0;

/// Maps the 0..1 track pan to the -1..1 panner range.
fn pan_position(pan: f32) -> f32 {
    (pan.clamp(0.0, 1.0) - 0.5) * 2.0
}

/// Common tail of the melodic voices: low-pass, decaying gain and pan.
fn finish(
    mut builder: VoiceBuilder,
    input: NodeId,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    let lowpass = builder.filter(input, FilterKind::LowPass, Param::constant(params.lpf), None);
    let envelope = builder.gain(lowpass, decay(params.gain, at, duration));
    let panned = builder.panner(envelope, pan_position(params.pan));
    builder.output(panned);
    builder.build()
}

fn label(waveform: Waveform) -> &'static str {
    match waveform {
        Waveform::Sine => "sine",
        Waveform::Sawtooth => "sawtooth",
        Waveform::Square => "square",
        Waveform::Triangle => "triangle",
    }
}

/// A single oscillator, low-passed and panned, decaying over `duration`.
pub fn oscillator(
    waveform: Waveform,
    frequency: f32,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new(label(waveform));
    let osc = builder.oscillator(waveform, Param::constant(frequency), at, at + duration);
    finish(builder, osc, at, duration, params)
}

/// Two-operator FM: a sine modulator at twice the carrier frequency drives
/// the carrier's frequency with a depth of twice the carrier frequency.
pub fn fm(
    frequency: f32,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new("fm");
    let modulator = builder.oscillator(
        Waveform::Sine,
        Param::constant(frequency * FM_RATIO),
        at,
        at + duration,
    );
    let depth = builder.gain(modulator, Param::constant(frequency * FM_DEPTH));
    let carrier = builder.oscillator(Waveform::Sine, Param::constant(frequency), at, at + duration);
    builder.modulate_frequency(depth, carrier);
    finish(builder, carrier, at, duration, params)
}

/// A stack of detuned oscillators, each scaled by the stack size.
pub fn unison(
    label: &str,
    waveform: Waveform,
    detune: &[f32],
    frequency: f32,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new(label);
    let oscillators: Vec<NodeId> = detune
        .iter()
        .map(|cents| {
            builder.detuned_oscillator(
                waveform,
                Param::constant(frequency),
                *cents,
                at,
                at + duration,
            )
        })
        .collect();
    let mix = builder.mix(Param::constant(1.0 / detune.len().max(1) as f32));
    for osc in oscillators {
        builder.connect(osc, mix);
    }
    finish(builder, mix, at, duration, params)
}

pub fn supersaw(
    frequency: f32,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    unison(
        "supersaw",
        Waveform::Sawtooth,
        &SUPERSAW_DETUNE,
        frequency,
        at,
        duration,
        params,
    )
}

pub fn supersquare(
    frequency: f32,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    unison(
        "supersquare",
        Waveform::Square,
        &SUPERSQUARE_DETUNE,
        frequency,
        at,
        duration,
        params,
    )
}

/// Colored noise shaped like the oscillator voices, with an extra high-pass.
pub fn noise(
    ctx: &mut SynthContext,
    color: NoiseColor,
    at: f64,
    duration: f64,
    params: &ToneParams,
) -> Result<VoiceGraph, GraphError> {
    let label = match color {
        NoiseColor::White => "white",
        NoiseColor::Pink => "pink",
        NoiseColor::Brown => "brown",
        NoiseColor::Crackle { .. } => "crackle",
    };
    let mut builder = VoiceBuilder::new(label);
    let buffer = ctx.noise_buffer(color, duration);
    let source = builder.buffer_source(buffer, 1.0, None, at, at + duration);
    let highpass = builder.filter(source, FilterKind::HighPass, Param::constant(params.hpf), None);
    finish(builder, highpass, at, duration, params)
}
