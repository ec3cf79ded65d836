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
// Shared handle to the rendering context. Carries the sample rate, the audio
// clock, the master gain stage and the channel voices are submitted through,
// so call sites don't thread many separate arguments.
//

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use super::clock::{AudioClock, FrameClock};
use super::renderer::Renderer;
use super::VoiceGraph;
use crate::error::EngineError;

/// Monotonic identifier of a submitted voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// A voice on its way to the renderer.
pub(crate) struct Submission {
    pub id: VoiceId,
    pub graph: VoiceGraph,
}

/// State shared between every context handle and the renderer.
pub(crate) struct Shared {
    pub sample_rate: u32,
    pub master_gain: AtomicU32,
    pub closed: AtomicBool,
    next_voice_id: AtomicU64,
}

impl Shared {
    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A clonable handle to the rendering context.
#[derive(Clone)]
pub struct AudioContext {
    shared: Arc<Shared>,
    clock: Arc<dyn AudioClock>,
    sender: Sender<Submission>,
}

impl AudioContext {
    /// Creates a context whose clock advances with the frames the returned
    /// renderer produces.
    pub fn new(sample_rate: u32) -> (AudioContext, Renderer) {
        let clock = Arc::new(FrameClock::new(sample_rate));
        let (context, receiver) = AudioContext::build(sample_rate, clock.clone());
        let renderer = Renderer::new(context.shared.clone(), receiver, Some(clock));
        (context, renderer)
    }

    /// Creates a context driven by an external clock. The renderer keeps its
    /// own frame position and does not advance the clock.
    pub fn with_clock(sample_rate: u32, clock: Arc<dyn AudioClock>) -> (AudioContext, Renderer) {
        let (context, receiver) = AudioContext::build(sample_rate, clock);
        let renderer = Renderer::new(context.shared.clone(), receiver, None);
        (context, renderer)
    }

    fn build(sample_rate: u32, clock: Arc<dyn AudioClock>) -> (AudioContext, Receiver<Submission>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let shared = Arc::new(Shared {
            sample_rate,
            master_gain: AtomicU32::new(1.0f32.to_bits()),
            closed: AtomicBool::new(false),
            next_voice_id: AtomicU64::new(1),
        });
        (
            AudioContext {
                shared,
                clock,
                sender,
            },
            receiver,
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// The current audio time in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    pub fn master_gain(&self) -> f32 {
        self.shared.master_gain()
    }

    /// Sets the master gain stage, clamped to `[0, 1]`.
    pub fn set_master_gain(&self, gain: f32) {
        let gain = if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) };
        self.shared.master_gain.store(gain.to_bits(), Ordering::Release);
    }

    /// Hands a voice to the renderer.
    pub fn submit(&self, graph: VoiceGraph) -> Result<VoiceId, EngineError> {
        if self.is_closed() {
            return Err(EngineError::ContextClosed);
        }

        let id = VoiceId(self.shared.next_voice_id.fetch_add(1, Ordering::SeqCst));
        debug!(
            voice = %id,
            label = graph.label(),
            start = graph.start(),
            stop = graph.stop(),
            "Voice scheduled"
        );
        self.sender
            .send(Submission { id, graph })
            .map_err(|_| EngineError::ContextClosed)?;
        Ok(id)
    }

    /// Closes the context. Pending and active voices are dropped by the
    /// renderer and all later submissions fail.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.shared.sample_rate)
            .field("now", &self.now())
            .field("master_gain", &self.master_gain())
            .field("closed", &self.is_closed())
            .finish()
    }
}
