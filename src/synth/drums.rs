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
use crate::audio::{FilterKind, Param, VoiceBuilder, VoiceGraph, Waveform};

use super::{decay, sweep, NoiseColor, SynthContext};

/// Reference frequencies of the low, mid and high toms.
pub const LOW_TOM: f32 = 80.0;
pub const MID_TOM: f32 = 120.0;
pub const HIGH_TOM: f32 = 180.0;

/// Adds a band-limited white noise burst to `builder`: buffer source,
/// high-pass, low-pass and a decaying gain stage routed to the output.
pub(crate) fn noise_burst(
    builder: &mut VoiceBuilder,
    ctx: &mut SynthContext,
    at: f64,
    duration: f64,
    gain: f32,
    hpf: f32,
    lpf: f32,
) {
    let buffer = ctx.noise_buffer(NoiseColor::White, duration);
    let source = builder.buffer_source(buffer, 1.0, None, at, at + duration);
    let highpass = builder.filter(source, FilterKind::HighPass, Param::constant(hpf), None);
    let lowpass = builder.filter(highpass, FilterKind::LowPass, Param::constant(lpf), None);
    let envelope = builder.gain(lowpass, decay(gain, at, duration));
    builder.output(envelope);
}

/// A single oscillator through a decaying gain stage.
fn blip(
    builder: &mut VoiceBuilder,
    waveform: Waveform,
    frequency: Param,
    at: f64,
    duration: f64,
    gain: f32,
) {
    let osc = builder.oscillator(waveform, frequency, at, at + duration);
    let envelope = builder.gain(osc, decay(gain, at, duration));
    builder.output(envelope);
}

fn noise_voice(
    label: &str,
    ctx: &mut SynthContext,
    at: f64,
    duration: f64,
    gain: f32,
    hpf: f32,
    lpf: f32,
) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new(label);
    noise_burst(&mut builder, ctx, at, duration, gain, hpf, lpf);
    builder.build()
}

/// Sine with a fast 150 to 40 Hz pitch drop.
pub fn kick(at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new("kick");
    blip(
        &mut builder,
        Waveform::Sine,
        sweep(150.0, 40.0, at, 0.1),
        at,
        0.3,
        gain,
    );
    builder.build()
}

/// Triangle body layered with a noise rattle, split evenly.
pub fn snare(ctx: &mut SynthContext, at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new("snare");
    blip(
        &mut builder,
        Waveform::Triangle,
        Param::constant(200.0),
        at,
        0.1,
        gain * 0.5,
    );
    noise_burst(&mut builder, ctx, at, 0.15, gain * 0.5, 3_000.0, 8_000.0);
    builder.build()
}

pub fn hihat(ctx: &mut SynthContext, at: f64, gain: f32, open: bool) -> Result<VoiceGraph, GraphError> {
    let (label, duration) = if open {
        ("open-hihat", 0.3)
    } else {
        ("hihat", 0.08)
    };
    noise_voice(label, ctx, at, duration, gain, 7_000.0, 14_000.0)
}

pub fn clap(ctx: &mut SynthContext, at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    noise_voice("clap", ctx, at, 0.15, gain, 1_500.0, 5_000.0)
}

/// Sine dropping from 1.5x to the target frequency.
pub fn tom(at: f64, frequency: f32, gain: f32) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new("tom");
    blip(
        &mut builder,
        Waveform::Sine,
        sweep(frequency * 1.5, frequency, at, 0.05),
        at,
        0.25,
        gain,
    );
    builder.build()
}

/// Two inharmonic squares through a resonant band-pass.
pub fn cowbell(at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    let duration = 0.4;
    let mut builder = VoiceBuilder::new("cowbell");
    let low = builder.oscillator(Waveform::Square, Param::constant(560.0), at, at + duration);
    let high = builder.oscillator(Waveform::Square, Param::constant(845.0), at, at + duration);
    let mix = builder.mix(Param::constant(1.0));
    builder.connect(low, mix).connect(high, mix);
    let bandpass = builder.filter(mix, FilterKind::BandPass, Param::constant(700.0), Some(3.0));
    let envelope = builder.gain(bandpass, decay(gain, at, duration));
    builder.output(envelope);
    builder.build()
}

pub fn crash(ctx: &mut SynthContext, at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    noise_voice("crash", ctx, at, 0.8, gain, 4_000.0, 16_000.0)
}

pub fn ride(ctx: &mut SynthContext, at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    noise_voice("ride", ctx, at, 0.4, gain, 6_000.0, 12_000.0)
}

pub fn shaker(ctx: &mut SynthContext, at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    noise_voice("shaker", ctx, at, 0.08, gain, 8_000.0, 14_000.0)
}

/// A short triangle click at 1800 Hz with a half-gain noise transient.
pub fn rimshot(ctx: &mut SynthContext, at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new("rimshot");
    blip(
        &mut builder,
        Waveform::Triangle,
        Param::constant(1_800.0),
        at,
        0.03,
        gain,
    );
    noise_burst(&mut builder, ctx, at, 0.02, gain * 0.5, 2_000.0, 8_000.0);
    builder.build()
}

/// Generic pitched click.
pub fn perc(at: f64, gain: f32) -> Result<VoiceGraph, GraphError> {
    let mut builder = VoiceBuilder::new("perc");
    blip(
        &mut builder,
        Waveform::Triangle,
        sweep(800.0, 400.0, at, 0.05),
        at,
        0.1,
        gain,
    );
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::graph::Node;
    use crate::audio::ENVELOPE_FLOOR;

    fn ctx() -> SynthContext {
        SynthContext::seeded(44_100, 11)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_kick_shape() {
        let graph = kick(2.0, 0.8).unwrap();
        assert_eq!(graph.label(), "kick");
        assert!(close(graph.start(), 2.0));
        assert!(close(graph.stop(), 2.3));

        let (waveform, frequency, _) = graph.oscillators().next().unwrap();
        assert_eq!(waveform, Waveform::Sine);
        assert_eq!(frequency.value_at(2.0), 150.0);
        assert!((frequency.value_at(2.1) - 40.0).abs() < 1e-3);

        let envelope = graph.gains().next().unwrap();
        assert_eq!(envelope.value_at(2.0), 0.8);
        assert!((envelope.value_at(2.3) - ENVELOPE_FLOOR).abs() < 1e-6);
    }

    #[test]
    fn test_snare_layers() {
        let graph = snare(&mut ctx(), 0.0, 0.6).unwrap();
        assert_eq!(graph.outputs().len(), 2);
        assert!(close(graph.stop(), 0.15));

        let gains: Vec<f32> = graph.gains().map(|g| g.value_at(0.0)).collect();
        assert_eq!(gains, vec![0.3, 0.3]);

        let filters: Vec<(FilterKind, f32)> =
            graph.filters().map(|(k, f, _)| (k, f.value_at(0.0))).collect();
        assert_eq!(
            filters,
            vec![(FilterKind::HighPass, 3_000.0), (FilterKind::LowPass, 8_000.0)]
        );
    }

    #[test]
    fn test_hihat_durations() {
        let closed = hihat(&mut ctx(), 1.0, 0.3, false).unwrap();
        let open = hihat(&mut ctx(), 1.0, 0.3, true).unwrap();
        assert!(close(closed.stop() - closed.start(), 0.08));
        assert!(close(open.stop() - open.start(), 0.3));
        assert_eq!(open.label(), "open-hihat");
    }

    #[test]
    fn test_noise_buffer_covers_burst() {
        let graph = crash(&mut ctx(), 0.0, 0.4).unwrap();
        let frames = graph
            .nodes()
            .iter()
            .find_map(|node| match node {
                Node::BufferSource { buffer, .. } => Some(buffer.frames()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frames, 35_280);
    }

    #[test]
    fn test_tom_sweep() {
        let graph = tom(0.0, MID_TOM, 0.7).unwrap();
        let (_, frequency, _) = graph.oscillators().next().unwrap();
        assert_eq!(frequency.value_at(0.0), 180.0);
        assert!((frequency.value_at(0.05) - 120.0).abs() < 1e-3);
        assert!(close(graph.stop(), 0.25));
    }

    #[test]
    fn test_cowbell_bandpass() {
        let graph = cowbell(0.0, 0.4).unwrap();
        let frequencies: Vec<f32> = graph
            .oscillators()
            .map(|(w, f, _)| {
                assert_eq!(w, Waveform::Square);
                f.value_at(0.0)
            })
            .collect();
        assert_eq!(frequencies, vec![560.0, 845.0]);

        let (kind, centre, q) = graph.filters().next().unwrap();
        assert_eq!(kind, FilterKind::BandPass);
        assert_eq!(centre.value_at(0.0), 700.0);
        assert_eq!(q, 3.0);
    }

    #[test]
    fn test_burst_durations() {
        let mut ctx = ctx();
        for (graph, duration) in [
            (clap(&mut ctx, 0.0, 0.5).unwrap(), 0.15),
            (ride(&mut ctx, 0.0, 0.3).unwrap(), 0.4),
            (shaker(&mut ctx, 0.0, 0.3).unwrap(), 0.08),
            (rimshot(&mut ctx, 0.0, 0.5).unwrap(), 0.03),
            (perc(0.0, 0.5).unwrap(), 0.1),
        ] {
            assert!(close(graph.stop(), duration), "{}", graph.label());
        }
    }

    #[test]
    fn test_rimshot_click() {
        let graph = rimshot(&mut ctx(), 0.0, 0.5).unwrap();
        let (waveform, frequency, _) = graph.oscillators().next().unwrap();
        assert_eq!(waveform, Waveform::Triangle);
        assert_eq!(frequency.value_at(0.0), 1_800.0);
        let gains: Vec<f32> = graph.gains().map(|g| g.value_at(0.0)).collect();
        assert_eq!(gains, vec![0.5, 0.25]);
    }
}
