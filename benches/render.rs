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
use std::hint::black_box;

use beatgrid::audio::{AudioContext, Renderer, Waveform};
use beatgrid::synth::{drums, tonal, SynthContext, ToneParams};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const SAMPLE_RATE: u32 = 44_100;
const STEP: f64 = 0.125;
const BLOCK_FRAMES: usize = 512;

/// Schedules a busy 120 BPM bar: four on the floor, offbeat hats, a backbeat
/// and a supersaw note on every other step.
fn dense_bar() -> (AudioContext, Renderer) {
    let (context, renderer) = AudioContext::new(SAMPLE_RATE);
    let mut synth = SynthContext::seeded(SAMPLE_RATE, 1);
    let params = ToneParams::default();

    for step in 0..16 {
        let at = step as f64 * STEP;
        if step % 4 == 0 {
            context.submit(drums::kick(at, 0.8).unwrap()).unwrap();
        }
        if step % 4 == 2 {
            context.submit(drums::hihat(&mut synth, at, 0.6, step == 14).unwrap()).unwrap();
        }
        if step == 4 || step == 12 {
            context.submit(drums::snare(&mut synth, at, 0.8).unwrap()).unwrap();
        }
        if step % 2 == 0 {
            let frequency = 110.0 * (1.0 + step as f32 / 16.0);
            context.submit(tonal::supersaw(frequency, at, 0.3, &params).unwrap()).unwrap();
            context
                .submit(tonal::oscillator(Waveform::Square, frequency * 2.0, at, 0.3, &params).unwrap())
                .unwrap();
        }
    }
    (context, renderer)
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    group.bench_function("dense_bar_block", |b| {
        let mut output = vec![0.0f32; BLOCK_FRAMES * 2];
        b.iter_batched(
            dense_bar,
            |(_context, mut renderer)| {
                renderer.render(black_box(&mut output));
                black_box(output[0])
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("dense_bar_full", |b| {
        let frames = (16.0 * STEP * SAMPLE_RATE as f64) as usize;
        let mut output = vec![0.0f32; BLOCK_FRAMES * 2];
        b.iter_batched(
            dense_bar,
            |(_context, mut renderer)| {
                for _ in 0..frames.div_ceil(BLOCK_FRAMES) {
                    renderer.render(black_box(&mut output));
                }
                black_box(renderer.position())
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, benchmark_render);
criterion_main!(benches);
