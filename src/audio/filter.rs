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
use std::f64::consts::PI;

/// Default filter quality, a maximally flat response.
pub const DEFAULT_Q: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
}

/// Topology-preserving transform state-variable filter.
///
/// The band-pass output is scaled by `k` so its peak gain is unity at the
/// centre frequency.
#[derive(Clone, Debug)]
pub struct StateVariableFilter {
    kind: FilterKind,
    ic1eq: f32,
    ic2eq: f32,
    g: f32,
    k: f32,
    cutoff: f32,
    sample_rate: f32,
}

impl StateVariableFilter {
    pub fn new(kind: FilterKind, cutoff: f32, q: f32, sample_rate: u32) -> StateVariableFilter {
        let mut filter = StateVariableFilter {
            kind,
            ic1eq: 0.0,
            ic2eq: 0.0,
            g: 0.0,
            k: 1.0 / q.max(0.01),
            cutoff: f32::NAN,
            sample_rate: sample_rate as f32,
        };
        filter.set_cutoff(cutoff);
        filter
    }

    /// Updates the cutoff. Recomputes the integrator gain only when the
    /// value actually changes.
    pub fn set_cutoff(&mut self, cutoff: f32) {
        if cutoff == self.cutoff {
            return;
        }
        self.cutoff = cutoff;
        let nyquist = self.sample_rate * 0.5;
        let cutoff = cutoff.clamp(1.0, nyquist * 0.99);
        self.g = (PI * f64::from(cutoff) / f64::from(self.sample_rate)).tan() as f32;
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let g = self.g;
        let k = self.k;
        let h = 1.0 / (1.0 + g * (g + k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + g * v3);
        let v2 = self.ic2eq + g * v1;

        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.kind {
            FilterKind::LowPass => v2,
            FilterKind::HighPass => sample - k * v1 - v2,
            FilterKind::BandPass => k * v1,
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}
