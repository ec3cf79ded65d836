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

use super::filter::{FilterKind, DEFAULT_Q};
use super::{AudioBuffer, Param};

/// Index of a node within a single [`VoiceGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn from_index(index: usize) -> NodeId {
        NodeId(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
    Square,
    Triangle,
}

impl Waveform {
    /// Evaluates the waveform at a phase in `[0, 1)`.
    #[inline]
    pub fn sample(&self, phase: f64) -> f32 {
        match self {
            Waveform::Sine => (std::f64::consts::TAU * phase).sin() as f32,
            Waveform::Sawtooth => (2.0 * phase - 1.0) as f32,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Triangle => (1.0 - 4.0 * (((phase + 0.25) % 1.0) - 0.5).abs()) as f32,
        }
    }
}

/// Loop region of a buffer source, in seconds of buffer time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

/// A processing node in a voice graph.
#[derive(Clone, Debug)]
pub enum Node {
    Oscillator {
        waveform: Waveform,
        frequency: Param,
        detune_cents: f32,
        start: f64,
        stop: f64,
    },
    BufferSource {
        buffer: Arc<AudioBuffer>,
        playback_rate: f32,
        looping: Option<LoopRegion>,
        start: f64,
        stop: f64,
    },
    Filter {
        kind: FilterKind,
        frequency: Param,
        q: f32,
    },
    Gain {
        gain: Param,
    },
    Panner {
        /// -1 is hard left, 1 is hard right.
        pan: f32,
    },
}

impl Node {
    /// The scheduled start and stop time of a source node.
    pub fn schedule(&self) -> Option<(f64, f64)> {
        match self {
            Node::Oscillator { start, stop, .. } | Node::BufferSource { start, stop, .. } => {
                Some((*start, *stop))
            }
            _ => None,
        }
    }
}

/// Errors raised while assembling a voice graph.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GraphError {
    #[error("voice '{0}' has no source nodes")]
    NoSources(String),

    #[error("voice '{0}' has no output nodes")]
    NoOutputs(String),

    #[error("voice '{label}' connects node {from} into earlier node {to}")]
    BackwardConnection {
        label: String,
        from: usize,
        to: usize,
    },

    #[error("voice '{label}' modulates the frequency of node {to}, which is not an oscillator")]
    NotModulatable { label: String, to: usize },
}

/// A self-contained description of one transient voice: its nodes, how
/// they connect, and when it starts and stops.
///
/// Nodes are evaluated in insertion order, so every connection runs from an
/// earlier node to a later one.
#[derive(Clone, Debug)]
pub struct VoiceGraph {
    label: String,
    nodes: Vec<Node>,
    inputs: Vec<Vec<NodeId>>,
    frequency_inputs: Vec<Vec<NodeId>>,
    outputs: Vec<NodeId>,
    start: f64,
    stop: f64,
}

impl VoiceGraph {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Audio inputs summed into the given node.
    pub fn inputs(&self, node: NodeId) -> &[NodeId] {
        &self.inputs[node.0]
    }

    /// Nodes whose output is added to the given oscillator's frequency.
    pub fn frequency_inputs(&self, node: NodeId) -> &[NodeId] {
        &self.frequency_inputs[node.0]
    }

    /// Nodes summed into the master stage.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Earliest start of any source.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Latest stop of any source. The voice is silent after this.
    pub fn stop(&self) -> f64 {
        self.stop
    }

    /// Iterates the nodes of a given shape, used mainly for inspection.
    pub fn oscillators(&self) -> impl Iterator<Item = (Waveform, &Param, f32)> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Oscillator {
                waveform,
                frequency,
                detune_cents,
                ..
            } => Some((*waveform, frequency, *detune_cents)),
            _ => None,
        })
    }

    pub fn filters(&self) -> impl Iterator<Item = (FilterKind, &Param, f32)> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Filter { kind, frequency, q } => Some((*kind, frequency, *q)),
            _ => None,
        })
    }

    pub fn gains(&self) -> impl Iterator<Item = &Param> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Gain { gain } => Some(gain),
            _ => None,
        })
    }
}

/// Assembles a [`VoiceGraph`].
pub struct VoiceBuilder {
    label: String,
    nodes: Vec<Node>,
    inputs: Vec<Vec<NodeId>>,
    frequency_inputs: Vec<Vec<NodeId>>,
    outputs: Vec<NodeId>,
    error: Option<GraphError>,
}

impl VoiceBuilder {
    pub fn new(label: &str) -> VoiceBuilder {
        VoiceBuilder {
            label: label.to_string(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            frequency_inputs: Vec::new(),
            outputs: Vec::new(),
            error: None,
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.inputs.push(Vec::new());
        self.frequency_inputs.push(Vec::new());
        NodeId(self.nodes.len() - 1)
    }

    pub fn oscillator(
        &mut self,
        waveform: Waveform,
        frequency: Param,
        start: f64,
        stop: f64,
    ) -> NodeId {
        self.detuned_oscillator(waveform, frequency, 0.0, start, stop)
    }

    pub fn detuned_oscillator(
        &mut self,
        waveform: Waveform,
        frequency: Param,
        detune_cents: f32,
        start: f64,
        stop: f64,
    ) -> NodeId {
        self.push(Node::Oscillator {
            waveform,
            frequency,
            detune_cents,
            start,
            stop,
        })
    }

    pub fn buffer_source(
        &mut self,
        buffer: Arc<AudioBuffer>,
        playback_rate: f32,
        looping: Option<LoopRegion>,
        start: f64,
        stop: f64,
    ) -> NodeId {
        self.push(Node::BufferSource {
            buffer,
            playback_rate,
            looping,
            start,
            stop,
        })
    }

    /// Adds a filter fed by `input`.
    pub fn filter(
        &mut self,
        input: NodeId,
        kind: FilterKind,
        frequency: Param,
        q: Option<f32>,
    ) -> NodeId {
        let node = self.push(Node::Filter {
            kind,
            frequency,
            q: q.unwrap_or(DEFAULT_Q),
        });
        self.connect(input, node);
        node
    }

    /// Adds a gain stage fed by `input`.
    pub fn gain(&mut self, input: NodeId, gain: Param) -> NodeId {
        let node = self.push(Node::Gain { gain });
        self.connect(input, node);
        node
    }

    /// Adds a gain stage with no inputs yet. Use [`VoiceBuilder::connect`] to
    /// sum several nodes into it.
    pub fn mix(&mut self, gain: Param) -> NodeId {
        self.push(Node::Gain { gain })
    }

    /// Adds an equal power stereo panner fed by `input`.
    pub fn panner(&mut self, input: NodeId, pan: f32) -> NodeId {
        let node = self.push(Node::Panner {
            pan: pan.clamp(-1.0, 1.0),
        });
        self.connect(input, node);
        node
    }

    /// Sums the output of `from` into `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> &mut VoiceBuilder {
        if from >= to {
            self.fail(GraphError::BackwardConnection {
                label: self.label.clone(),
                from: from.0,
                to: to.0,
            });
        } else {
            self.inputs[to.0].push(from);
        }
        self
    }

    /// Adds the output of `from` to the frequency of oscillator `to`, in Hz.
    pub fn modulate_frequency(&mut self, from: NodeId, to: NodeId) -> &mut VoiceBuilder {
        if from >= to {
            self.fail(GraphError::BackwardConnection {
                label: self.label.clone(),
                from: from.0,
                to: to.0,
            });
        } else if !matches!(self.nodes[to.0], Node::Oscillator { .. }) {
            self.fail(GraphError::NotModulatable {
                label: self.label.clone(),
                to: to.0,
            });
        } else {
            self.frequency_inputs[to.0].push(from);
        }
        self
    }

    /// Routes `node` to the master stage.
    pub fn output(&mut self, node: NodeId) -> &mut VoiceBuilder {
        self.outputs.push(node);
        self
    }

    fn fail(&mut self, error: GraphError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn build(self) -> Result<VoiceGraph, GraphError> {
        if let Some(error) = self.error {
            return Err(error);
        }

        let (start, stop) = self
            .nodes
            .iter()
            .filter_map(Node::schedule)
            .fold(None, |acc: Option<(f64, f64)>, (start, stop)| match acc {
                Some((s, e)) => Some((s.min(start), e.max(stop))),
                None => Some((start, stop)),
            })
            .ok_or_else(|| GraphError::NoSources(self.label.clone()))?;

        if self.outputs.is_empty() {
            return Err(GraphError::NoOutputs(self.label));
        }

        Ok(VoiceGraph {
            label: self.label,
            nodes: self.nodes,
            inputs: self.inputs,
            frequency_inputs: self.frequency_inputs,
            outputs: self.outputs,
            start,
            stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_schedule_spans_sources() {
        let mut builder = VoiceBuilder::new("snare");
        let tone = builder.oscillator(Waveform::Triangle, Param::constant(200.0), 1.0, 1.1);
        let noise = builder.oscillator(Waveform::Square, Param::constant(400.0), 1.0, 1.15);
        let mix = builder.mix(Param::constant(0.5));
        builder.connect(tone, mix).connect(noise, mix).output(mix);

        let graph = builder.build().unwrap();
        assert_eq!(graph.label(), "snare");
        assert_eq!(graph.start(), 1.0);
        assert_eq!(graph.stop(), 1.15);
        assert_eq!(graph.inputs(mix), &[tone, noise]);
    }

    #[test]
    fn test_build_requires_sources_and_outputs() {
        let mut builder = VoiceBuilder::new("empty");
        let gain = builder.mix(Param::constant(1.0));
        builder.output(gain);
        assert_eq!(
            builder.build().unwrap_err(),
            GraphError::NoSources("empty".to_string())
        );

        let mut builder = VoiceBuilder::new("silent");
        builder.oscillator(Waveform::Sine, Param::constant(440.0), 0.0, 1.0);
        assert_eq!(
            builder.build().unwrap_err(),
            GraphError::NoOutputs("silent".to_string())
        );
    }

    #[test]
    fn test_connections_must_run_forward() {
        let mut builder = VoiceBuilder::new("loop");
        let gain = builder.mix(Param::constant(1.0));
        let osc = builder.oscillator(Waveform::Sine, Param::constant(440.0), 0.0, 1.0);
        builder.connect(osc, gain).output(gain);
        assert!(matches!(
            builder.build(),
            Err(GraphError::BackwardConnection { from: 1, to: 0, .. })
        ));
    }

    #[test]
    fn test_only_oscillators_are_modulatable() {
        let mut builder = VoiceBuilder::new("fm");
        let modulator = builder.oscillator(Waveform::Sine, Param::constant(880.0), 0.0, 1.0);
        let gain = builder.gain(modulator, Param::constant(880.0));
        builder.modulate_frequency(modulator, gain).output(gain);
        assert!(matches!(
            builder.build(),
            Err(GraphError::NotModulatable { to: 1, .. })
        ));
    }

    #[test]
    fn test_waveforms() {
        assert!(Waveform::Sine.sample(0.0).abs() < 1e-6);
        assert!((Waveform::Sine.sample(0.25) - 1.0).abs() < 1e-6);
        assert_eq!(Waveform::Square.sample(0.1), 1.0);
        assert_eq!(Waveform::Square.sample(0.6), -1.0);
        assert_eq!(Waveform::Sawtooth.sample(0.0), -1.0);
        assert!(Waveform::Triangle.sample(0.0).abs() < 1e-6);
        assert!((Waveform::Triangle.sample(0.25) - 1.0).abs() < 1e-6);
        assert!((Waveform::Triangle.sample(0.75) + 1.0).abs() < 1e-6);
    }
}
