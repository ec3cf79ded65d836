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
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, error};

use super::clock::FrameClock;
use super::context::{Shared, Submission, VoiceId};
use super::filter::StateVariableFilter;
use super::graph::{Node, NodeId};
use super::VoiceGraph;

/// Number of interleaved output channels.
pub const CHANNELS: usize = 2;

/// Per-node render state.
enum NodeState {
    Oscillator { phase: f64 },
    BufferSource { position: f64 },
    Filter { left: StateVariableFilter, right: StateVariableFilter },
    Stateless,
}

/// A voice in the renderer's arena.
struct ActiveVoice {
    id: VoiceId,
    graph: VoiceGraph,
    states: Vec<NodeState>,
    outputs: Vec<[f32; CHANNELS]>,
    /// Active frame range of each source node.
    windows: Vec<Option<(u64, u64)>>,
    start_frame: u64,
    stop_frame: u64,
}

impl ActiveVoice {
    fn new(id: VoiceId, graph: VoiceGraph, sample_rate: u32) -> ActiveVoice {
        let states = graph
            .nodes()
            .iter()
            .map(|node| match node {
                Node::Oscillator { .. } => NodeState::Oscillator { phase: 0.0 },
                Node::BufferSource { .. } => NodeState::BufferSource { position: 0.0 },
                Node::Filter {
                    kind, frequency, q, ..
                } => {
                    let cutoff = frequency.value_at(graph.start());
                    NodeState::Filter {
                        left: StateVariableFilter::new(*kind, cutoff, *q, sample_rate),
                        right: StateVariableFilter::new(*kind, cutoff, *q, sample_rate),
                    }
                }
                Node::Gain { .. } | Node::Panner { .. } => NodeState::Stateless,
            })
            .collect();
        let outputs = vec![[0.0; CHANNELS]; graph.nodes().len()];
        let windows = graph
            .nodes()
            .iter()
            .map(|node| {
                node.schedule().map(|(start, stop)| {
                    (
                        seconds_to_frame(start, sample_rate),
                        seconds_to_frame(stop, sample_rate),
                    )
                })
            })
            .collect();
        let start_frame = seconds_to_frame(graph.start(), sample_rate);
        let stop_frame = seconds_to_frame(graph.stop(), sample_rate);

        ActiveVoice {
            id,
            graph,
            states,
            outputs,
            windows,
            start_frame,
            stop_frame,
        }
    }

    /// Computes one output frame of this voice at absolute frame `frame`.
    fn render_frame(&mut self, frame: u64, sample_rate: u32) -> [f32; CHANNELS] {
        let step = 1.0 / f64::from(sample_rate);
        let t = frame as f64 / f64::from(sample_rate);
        for index in 0..self.graph.nodes().len() {
            let active = self.windows[index]
                .map(|(start, stop)| frame >= start && frame < stop)
                .unwrap_or(true);
            let node_id = NodeId::from_index(index);
            let (done, rest) = self.outputs.split_at_mut(index);
            let mut input = [0.0f32; CHANNELS];
            for source in self.graph.inputs(node_id) {
                let value = done[source.index()];
                input[0] += value[0];
                input[1] += value[1];
            }

            let output = match (&self.graph.nodes()[index], &mut self.states[index]) {
                (
                    Node::Oscillator {
                        waveform,
                        frequency,
                        detune_cents,
                        ..
                    },
                    NodeState::Oscillator { phase },
                ) => {
                    if !active {
                        [0.0; CHANNELS]
                    } else {
                        let modulation: f32 = self
                            .graph
                            .frequency_inputs(node_id)
                            .iter()
                            .map(|source| done[source.index()][0])
                            .sum();
                        let mut hz = frequency.value_at(t) + modulation;
                        if *detune_cents != 0.0 {
                            hz *= 2f32.powf(*detune_cents / 1200.0);
                        }
                        let value = waveform.sample(*phase);
                        *phase = (*phase + f64::from(hz) * step).rem_euclid(1.0);
                        [value; CHANNELS]
                    }
                }
                (
                    Node::BufferSource {
                        buffer,
                        playback_rate,
                        looping,
                        ..
                    },
                    NodeState::BufferSource { position },
                ) => {
                    if !active {
                        [0.0; CHANNELS]
                    } else {
                        let buffer_rate = f64::from(buffer.sample_rate());
                        if let Some(region) = looping {
                            let loop_start = region.start * buffer_rate;
                            let loop_end = region.end * buffer_rate;
                            if *position >= loop_end && loop_end > loop_start {
                                *position =
                                    loop_start + (*position - loop_end) % (loop_end - loop_start);
                            }
                        }
                        let value = [
                            buffer.sample_at(0, *position),
                            buffer.sample_at(1, *position),
                        ];
                        *position += f64::from(*playback_rate) * buffer_rate * step;
                        value
                    }
                }
                (
                    Node::Filter { frequency, .. },
                    NodeState::Filter { left, right },
                ) => {
                    if !frequency.is_constant() {
                        let cutoff = frequency.value_at(t);
                        left.set_cutoff(cutoff);
                        right.set_cutoff(cutoff);
                    }
                    [left.process(input[0]), right.process(input[1])]
                }
                (Node::Gain { gain }, _) => {
                    let gain = gain.value_at(t);
                    [input[0] * gain, input[1] * gain]
                }
                (Node::Panner { pan }, _) => {
                    let x = f64::from((pan + 1.0) * 0.5) * std::f64::consts::FRAC_PI_2;
                    [input[0] * x.cos() as f32, input[1] * x.sin() as f32]
                }
                _ => [0.0; CHANNELS],
            };
            rest[0] = output;
        }

        let mut mixed = [0.0f32; CHANNELS];
        for output in self.graph.outputs() {
            let value = self.outputs[output.index()];
            mixed[0] += value[0];
            mixed[1] += value[1];
        }
        mixed
    }
}

fn seconds_to_frame(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * f64::from(sample_rate)).ceil() as u64
}

/// Renders submitted voices into interleaved stereo blocks.
///
/// The renderer is owned by whatever drives audio output: a device callback,
/// an offline bounce or a test.
pub struct Renderer {
    shared: Arc<Shared>,
    receiver: Receiver<Submission>,
    clock: Option<Arc<FrameClock>>,
    voices: Vec<ActiveVoice>,
    position: u64,
    disconnected: bool,
}

impl Renderer {
    pub(crate) fn new(
        shared: Arc<Shared>,
        receiver: Receiver<Submission>,
        clock: Option<Arc<FrameClock>>,
    ) -> Renderer {
        Renderer {
            shared,
            receiver,
            clock,
            voices: Vec::new(),
            position: 0,
            disconnected: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Frames rendered so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves submitted voices into the arena without rendering.
    pub fn drain(&mut self) {
        let sample_rate = self.shared.sample_rate;
        loop {
            match self.receiver.try_recv() {
                Ok(Submission { id, graph }) => {
                    self.voices.push(ActiveVoice::new(id, graph, sample_rate));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.disconnected {
                        error!("Audio context dropped while the renderer is still running");
                        self.disconnected = true;
                    }
                    break;
                }
            }
        }
    }

    /// Number of voices in the arena.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Identifiers and graphs of the voices in the arena.
    pub fn voices(&self) -> impl Iterator<Item = (VoiceId, &VoiceGraph)> {
        self.voices.iter().map(|voice| (voice.id, &voice.graph))
    }

    /// Renders `output.len() / 2` interleaved stereo frames.
    pub fn render(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        let frames = (output.len() / CHANNELS) as u64;

        if self.shared.is_closed() {
            if !self.voices.is_empty() {
                debug!(voices = self.voices.len(), "Context closed, dropping voices");
                self.voices.clear();
            }
            while self.receiver.try_recv().is_ok() {}
            self.advance(frames);
            return;
        }

        self.drain();

        let sample_rate = self.shared.sample_rate;
        let master_gain = self.shared.master_gain();

        let block_end = self.position + frames;
        for voice in self.voices.iter_mut() {
            if voice.start_frame >= block_end || voice.stop_frame <= self.position {
                continue;
            }

            let first = voice.start_frame.saturating_sub(self.position) as usize;
            let last = (voice.stop_frame.min(block_end) - self.position) as usize;
            for (offset, frame) in output
                .chunks_exact_mut(CHANNELS)
                .enumerate()
                .take(last)
                .skip(first)
            {
                let value = voice.render_frame(self.position + offset as u64, sample_rate);
                frame[0] += value[0];
                frame[1] += value[1];
            }
        }

        if master_gain != 1.0 {
            output.iter_mut().for_each(|sample| *sample *= master_gain);
        }

        self.advance(frames);

        let position = self.position;
        self.voices.retain(|voice| {
            let keep = voice.stop_frame > position;
            if !keep {
                debug!(voice = %voice.id, label = voice.graph.label(), "Voice reclaimed");
            }
            keep
        });
    }

    fn advance(&mut self, frames: u64) {
        self.position += frames;
        if let Some(clock) = &self.clock {
            clock.advance(frames);
        }
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("sample_rate", &self.shared.sample_rate)
            .field("position", &self.position)
            .field("active_voices", &self.voices.len())
            .finish()
    }
}
