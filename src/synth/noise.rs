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
use rand::Rng;

/// The colors of noise the library can render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
    /// Sparse impulses, `density` per second on average.
    Crackle { density: f32 },
}

/// Uniform white noise in `[-1, 1)`.
pub struct WhiteNoise;

impl WhiteNoise {
    #[inline]
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> f32 {
        rng.gen::<f32>() * 2.0 - 1.0
    }
}

/// Paul Kellet's refined pink noise filter: six one-pole sections plus a
/// white term, approximating a -3 dB/octave rolloff.
#[derive(Clone, Debug, Default)]
pub struct PinkNoise {
    b: [f32; 7],
}

impl PinkNoise {
    pub fn new() -> PinkNoise {
        PinkNoise::default()
    }

    /// Filters one white sample.
    #[inline]
    pub fn next(&mut self, white: f32) -> f32 {
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let out = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115926;
        out * 0.11
    }
}

/// Leaky integrator over white noise.
#[derive(Clone, Debug, Default)]
pub struct BrownNoise {
    last: f32,
}

impl BrownNoise {
    pub fn new() -> BrownNoise {
        BrownNoise::default()
    }

    #[inline]
    pub fn next(&mut self, white: f32) -> f32 {
        self.last = (self.last + 0.02 * white) / 1.02;
        self.last * 3.5
    }
}

/// Longest tail following a crackle impulse, in samples.
pub const MAX_CRACKLE_TAIL: usize = 100;

/// Random impulses, each followed by a short linear decay.
#[derive(Clone, Debug)]
pub struct Crackle {
    chance: f32,
    amplitude: f32,
    remaining: usize,
    length: usize,
}

impl Crackle {
    /// `density` is the average number of impulses per second.
    pub fn new(density: f32, sample_rate: u32) -> Crackle {
        Crackle {
            chance: (density.max(0.0) / sample_rate.max(1) as f32).min(1.0),
            amplitude: 0.0,
            remaining: 0,
            length: 1,
        }
    }

    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f32 {
        if self.remaining == 0 && rng.gen::<f32>() < self.chance {
            self.amplitude = WhiteNoise::sample(rng);
            self.length = rng.gen_range(1..=MAX_CRACKLE_TAIL);
            self.remaining = self.length;
        }

        if self.remaining == 0 {
            return 0.0;
        }

        let out = self.amplitude * self.remaining as f32 / self.length as f32;
        self.remaining -= 1;
        out
    }
}

/// Renders `frames` samples of the given noise color.
pub fn generate<R: Rng + ?Sized>(
    color: NoiseColor,
    frames: usize,
    sample_rate: u32,
    rng: &mut R,
) -> Vec<f32> {
    match color {
        NoiseColor::White => (0..frames).map(|_| WhiteNoise::sample(rng)).collect(),
        NoiseColor::Pink => {
            let mut pink = PinkNoise::new();
            (0..frames)
                .map(|_| pink.next(WhiteNoise::sample(rng)))
                .collect()
        }
        NoiseColor::Brown => {
            let mut brown = BrownNoise::new();
            (0..frames)
                .map(|_| brown.next(WhiteNoise::sample(rng)))
                .collect()
        }
        NoiseColor::Crackle { density } => {
            let mut crackle = Crackle::new(density, sample_rate);
            (0..frames).map(|_| crackle.next(rng)).collect()
        }
    }
}
