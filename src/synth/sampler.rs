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
use std::sync::Arc;

use crate::assets::Zone;
use crate::audio::graph::GraphError;
use crate::audio::{AudioBuffer, Param, VoiceBuilder, VoiceGraph};

/// Length of the soundfont attack ramp in seconds.
pub const SOUNDFONT_ATTACK: f64 = 0.01;

/// Length of the soundfont release ramp in seconds.
pub const SOUNDFONT_RELEASE: f64 = 0.1;

/// Plays a decoded buffer once. `rate` scales both pitch and length.
pub fn sample(
    buffer: Arc<AudioBuffer>,
    at: f64,
    gain: f32,
    rate: f32,
) -> Result<VoiceGraph, GraphError> {
    let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
    let stop = at + buffer.duration() / f64::from(rate);

    let mut builder = VoiceBuilder::new("sample");
    let source = builder.buffer_source(buffer, rate, None, at, stop);
    let level = builder.gain(source, Param::constant(gain));
    builder.output(level);
    builder.build()
}

/// Playback rate that shifts a zone recorded at `original_pitch` (in MIDI
/// cents) to `midi_note`.
pub fn playback_rate(midi_note: u8, original_pitch: f32) -> f32 {
    let semitones = f32::from(midi_note) - original_pitch / 100.0;
    2f32.powf(semitones / 12.0)
}

/// Attack, sustain and release envelope sized to `duration`. Notes too short
/// for both ramps share the available time between them.
pub fn note_envelope(gain: f32, at: f64, duration: f64) -> Param {
    let duration = duration.max(0.0);
    let attack = SOUNDFONT_ATTACK.min(duration / 2.0);
    let release_start = (at + duration - SOUNDFONT_RELEASE).max(at + attack);

    Param::constant(0.0)
        .set_at(0.0, at)
        .linear_ramp_to(gain, at + attack)
        .set_at(gain, release_start)
        .linear_ramp_to(0.0, at + duration)
}

/// Plays `midi_note` from a soundfont zone. Returns `None` when the zone has
/// no decoded audio.
pub fn soundfont(
    zone: &Zone,
    midi_note: u8,
    at: f64,
    duration: f64,
    gain: f32,
) -> Option<Result<VoiceGraph, GraphError>> {
    let buffer = zone.buffer()?.clone();
    let rate = playback_rate(midi_note, zone.original_pitch());

    let mut builder = VoiceBuilder::new("soundfont");
    let source = builder.buffer_source(buffer, rate, zone.loop_region(), at, at + duration);
    let envelope = builder.gain(source, note_envelope(gain, at, duration));
    builder.output(envelope);
    Some(builder.build())
}
