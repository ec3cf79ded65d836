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
/// The smallest value an exponential ramp may start from or target. An
/// exponential curve can never reach zero, so decays to silence end here.
pub const ENVELOPE_FLOOR: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    Set { time: f64, value: f32 },
    Linear { time: f64, value: f32 },
    Exponential { time: f64, value: f32 },
}

impl Event {
    fn time(&self) -> f64 {
        match self {
            Event::Set { time, .. } | Event::Linear { time, .. } | Event::Exponential { time, .. } => {
                *time
            }
        }
    }

    fn value(&self) -> f32 {
        match self {
            Event::Set { value, .. }
            | Event::Linear { value, .. }
            | Event::Exponential { value, .. } => *value,
        }
    }
}

/// An automatable parameter: a default value plus an ordered list of
/// automation events in audio-clock seconds.
///
/// Ramps run from the previous event (its time and value) to the ramp's own
/// end point, after which the value holds until the next event.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    default: f32,
    events: Vec<Event>,
}

impl Param {
    /// A parameter that never changes.
    pub fn constant(value: f32) -> Param {
        Param {
            default: value,
            events: Vec::new(),
        }
    }

    /// Jumps to `value` at `time`.
    pub fn set_at(mut self, value: f32, time: f64) -> Param {
        self.insert(Event::Set { time, value });
        self
    }

    /// Ramps linearly from the previous event to `value`, arriving at `end`.
    pub fn linear_ramp_to(mut self, value: f32, end: f64) -> Param {
        self.insert(Event::Linear { time: end, value });
        self
    }

    /// Ramps exponentially from the previous event to `value`, arriving at
    /// `end`. Both endpoints are clamped to [`ENVELOPE_FLOOR`].
    pub fn exponential_ramp_to(mut self, value: f32, end: f64) -> Param {
        self.insert(Event::Exponential {
            time: end,
            value: value.max(ENVELOPE_FLOOR),
        });
        self
    }

    fn insert(&mut self, event: Event) {
        // Events at equal times keep their insertion order.
        let index = self.events.partition_point(|e| e.time() <= event.time());
        self.events.insert(index, event);
    }

    /// True when the value never changes over time.
    pub fn is_constant(&self) -> bool {
        self.events.is_empty()
    }

    /// The time of the last automation event, if any.
    pub fn last_event_time(&self) -> Option<f64> {
        self.events.last().map(Event::time)
    }

    /// Evaluates the parameter at the given time.
    pub fn value_at(&self, time: f64) -> f32 {
        let next_index = self.events.partition_point(|e| e.time() <= time);
        let (start_time, start_value) = match next_index.checked_sub(1) {
            Some(index) => (self.events[index].time(), self.events[index].value()),
            None => (0.0, self.default),
        };

        let Some(next) = self.events.get(next_index) else {
            return start_value;
        };

        let span = next.time() - start_time;
        if span <= 0.0 {
            return match next {
                Event::Set { .. } => start_value,
                _ => next.value(),
            };
        }
        let progress = ((time - start_time) / span).clamp(0.0, 1.0);

        match *next {
            Event::Set { .. } => start_value,
            Event::Linear { value, .. } => {
                start_value + (value - start_value) * progress as f32
            }
            Event::Exponential { value, .. } => {
                let from = f64::from(start_value.max(ENVELOPE_FLOOR));
                let to = f64::from(value);
                (from * (to / from).powf(progress)) as f32
            }
        }
    }
}

impl From<f32> for Param {
    fn from(value: f32) -> Param {
        Param::constant(value)
    }
}
