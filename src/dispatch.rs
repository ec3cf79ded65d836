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
//! Turns sound identifiers into voices.
//!
//! Drum tracks with a drum bank are played from decoded samples when the
//! bank has the sound. Everything else, and every sample or soundfont that
//! cannot be loaded, is synthesized. Loads never block the caller: a cache
//! miss is loaded on the runtime and played once it resolves.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::assets::{soundfont, Instrument, SampleLoader, SoundfontLoader};
use crate::audio::graph::GraphError;
use crate::audio::{AudioContext, VoiceGraph, VoiceId, Waveform};
use crate::error::EngineError;
use crate::playsync::CancelHandle;
use crate::sequencer::Track;
use crate::synth::{drums, sampler, tonal, NoiseColor, SynthContext, ToneParams};

/// Gain of drum voices when the caller gives none.
pub const DEFAULT_DRUM_GAIN: f32 = 0.8;

/// Gain and cutoff of melodic notes when the caller gives none.
pub const DEFAULT_NOTE_GAIN: f32 = 0.5;
pub const DEFAULT_NOTE_LPF: f32 = 5_000.0;

/// Length of a melodic note in seconds.
pub const NOTE_DURATION: f64 = 0.3;

/// Pitch and length of tonal voices triggered from a drum track.
pub const DRUM_TONE_FREQUENCY: f32 = 440.0;
pub const DRUM_TONE_DURATION: f64 = 0.3;

/// The voice played for identifiers nobody knows.
pub const FALLBACK_FREQUENCY: f32 = 220.0;
pub const FALLBACK_DURATION: f64 = 0.2;

const A4_MIDI: u8 = 69;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown sound id '{0}'")]
pub struct UnknownSound(pub String);

/// Every sound the dispatcher can synthesize, plus soundfont instruments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoundId {
    Kick,
    Snare,
    ClosedHihat,
    OpenHihat,
    Clap,
    Rimshot,
    LowTom,
    MidTom,
    HighTom,
    Cowbell,
    Crash,
    Ride,
    Shaker,
    Perc,
    Oscillator(Waveform),
    White,
    Pink,
    Brown,
    Crackle,
    Fm,
    Supersaw,
    Supersquare,
    Instrument(String),
}

impl FromStr for SoundId {
    type Err = UnknownSound;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bd" => SoundId::Kick,
            "sd" => SoundId::Snare,
            "hh" => SoundId::ClosedHihat,
            "oh" => SoundId::OpenHihat,
            "cp" => SoundId::Clap,
            "rim" => SoundId::Rimshot,
            "lt" => SoundId::LowTom,
            "mt" => SoundId::MidTom,
            "ht" => SoundId::HighTom,
            "cb" => SoundId::Cowbell,
            "cr" => SoundId::Crash,
            "rd" => SoundId::Ride,
            "sh" => SoundId::Shaker,
            "perc" => SoundId::Perc,
            "sine" => SoundId::Oscillator(Waveform::Sine),
            "sawtooth" => SoundId::Oscillator(Waveform::Sawtooth),
            "square" => SoundId::Oscillator(Waveform::Square),
            "triangle" => SoundId::Oscillator(Waveform::Triangle),
            "white" => SoundId::White,
            "pink" => SoundId::Pink,
            "brown" => SoundId::Brown,
            "crackle" => SoundId::Crackle,
            "fm" => SoundId::Fm,
            "supersaw" => SoundId::Supersaw,
            "supersquare" => SoundId::Supersquare,
            name if soundfont::gm_program(name).is_some() => SoundId::Instrument(name.to_string()),
            other => return Err(UnknownSound(other.to_string())),
        })
    }
}

impl SoundId {
    fn noise_color(&self, frequency: f32) -> Option<NoiseColor> {
        match self {
            SoundId::White => Some(NoiseColor::White),
            SoundId::Pink => Some(NoiseColor::Pink),
            SoundId::Brown => Some(NoiseColor::Brown),
            SoundId::Crackle => Some(NoiseColor::Crackle { density: frequency }),
            _ => None,
        }
    }
}

/// How a voice should sound. Unset gain and cutoff take the defaults of the
/// path that plays the voice.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceParams {
    pub gain: Option<f32>,
    pub lpf: Option<f32>,
    pub hpf: f32,
    pub pan: f32,
    /// Playback rate of sampled voices.
    pub speed: f32,
    pub drum_bank: Option<String>,
}

impl Default for VoiceParams {
    fn default() -> Self {
        VoiceParams {
            gain: None,
            lpf: None,
            hpf: 20.0,
            pan: 0.5,
            speed: 1.0,
            drum_bank: None,
        }
    }
}

impl VoiceParams {
    pub fn with_gain(mut self, gain: f32) -> VoiceParams {
        self.gain = Some(gain);
        self
    }

    pub fn with_lpf(mut self, lpf: f32) -> VoiceParams {
        self.lpf = Some(lpf);
        self
    }

    pub fn with_drum_bank(mut self, drum_bank: &str) -> VoiceParams {
        self.drum_bank = Some(drum_bank.to_string());
        self
    }

    fn tone(&self, gain: f32, lpf: f32) -> ToneParams {
        ToneParams {
            gain: self.gain.unwrap_or(gain),
            lpf: self.lpf.unwrap_or(lpf),
            hpf: self.hpf,
            pan: self.pan,
        }
    }
}

impl From<&Track> for VoiceParams {
    fn from(track: &Track) -> Self {
        VoiceParams {
            gain: Some(track.params.gain),
            lpf: Some(track.params.lpf),
            hpf: track.params.hpf,
            pan: track.params.pan,
            speed: track.params.speed,
            drum_bank: track.drum_bank.clone(),
        }
    }
}

/// A voice waiting on an asset load.
#[derive(Debug)]
pub struct PendingVoice(JoinHandle<Option<VoiceId>>);

impl PendingVoice {
    /// Waits for the load to resolve. Returns `None` when the voice was
    /// discarded or could not be scheduled.
    pub async fn wait(self) -> Option<VoiceId> {
        self.0.await.ok().flatten()
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// The outcome of a dispatch.
#[derive(Debug)]
pub enum Dispatched {
    /// A voice was scheduled right away.
    Voice(VoiceId),
    /// An asset is loading; the voice is scheduled when it resolves.
    Pending(PendingVoice),
    /// A rest, nothing to play.
    Rest,
    /// The session was cancelled; nothing was scheduled.
    Cancelled,
}

impl Dispatched {
    pub fn voice(&self) -> Option<VoiceId> {
        match self {
            Dispatched::Voice(id) => Some(*id),
            _ => None,
        }
    }
}

/// Builds and submits synthesized voices. Shared with background loads.
struct Voices {
    context: AudioContext,
    synth: Mutex<SynthContext>,
}

impl Voices {
    fn submit(&self, graph: Result<VoiceGraph, GraphError>) -> Result<VoiceId, EngineError> {
        self.context.submit(graph?)
    }

    /// Tonal voices shared by drum and melodic tracks. `None` for drums and
    /// instruments.
    fn tone(
        &self,
        sound: &SoundId,
        frequency: f32,
        duration: f64,
        params: &ToneParams,
        at: f64,
    ) -> Option<Result<VoiceGraph, GraphError>> {
        if let Some(color) = sound.noise_color(frequency) {
            return Some(tonal::noise(&mut self.synth.lock(), color, at, duration, params));
        }
        match sound {
            SoundId::Oscillator(waveform) => Some(tonal::oscillator(*waveform, frequency, at, duration, params)),
            SoundId::Fm => Some(tonal::fm(frequency, at, duration, params)),
            SoundId::Supersaw => Some(tonal::supersaw(frequency, at, duration, params)),
            SoundId::Supersquare => Some(tonal::supersquare(frequency, at, duration, params)),
            _ => None,
        }
    }

    /// The default voice for identifiers nobody knows.
    fn fallback(&self, params: &VoiceParams, at: f64) -> Result<VoiceId, EngineError> {
        let tone = ToneParams {
            gain: params.gain.unwrap_or(DEFAULT_DRUM_GAIN),
            ..ToneParams::default()
        };
        self.submit(tonal::oscillator(Waveform::Sine, FALLBACK_FREQUENCY, at, FALLBACK_DURATION, &tone))
    }

    fn drum(&self, sound: &SoundId, params: &VoiceParams, at: f64) -> Result<VoiceId, EngineError> {
        let gain = params.gain.unwrap_or(DEFAULT_DRUM_GAIN);
        let graph = match sound {
            SoundId::Kick => drums::kick(at, gain),
            SoundId::Snare => drums::snare(&mut self.synth.lock(), at, gain),
            SoundId::ClosedHihat => drums::hihat(&mut self.synth.lock(), at, gain, false),
            SoundId::OpenHihat => drums::hihat(&mut self.synth.lock(), at, gain, true),
            SoundId::Clap => drums::clap(&mut self.synth.lock(), at, gain),
            SoundId::Rimshot => drums::rimshot(&mut self.synth.lock(), at, gain),
            SoundId::LowTom => drums::tom(at, drums::LOW_TOM, gain),
            SoundId::MidTom => drums::tom(at, drums::MID_TOM, gain),
            SoundId::HighTom => drums::tom(at, drums::HIGH_TOM, gain),
            SoundId::Cowbell => drums::cowbell(at, gain),
            SoundId::Crash => drums::crash(&mut self.synth.lock(), at, gain),
            SoundId::Ride => drums::ride(&mut self.synth.lock(), at, gain),
            SoundId::Shaker => drums::shaker(&mut self.synth.lock(), at, gain),
            SoundId::Perc => drums::perc(at, gain),
            other => {
                let tone = params.tone(DEFAULT_DRUM_GAIN, ToneParams::default().lpf);
                match self.tone(other, DRUM_TONE_FREQUENCY, DRUM_TONE_DURATION, &tone, at) {
                    Some(graph) => graph,
                    None => return self.fallback(params, at),
                }
            }
        };
        self.submit(graph)
    }

    /// A melodic note synthesized by `sound`, or by a sawtooth when `sound`
    /// has no tonal voice.
    fn note(
        &self,
        sound: Option<&SoundId>,
        frequency: f32,
        params: &ToneParams,
        at: f64,
    ) -> Result<VoiceId, EngineError> {
        let graph = sound
            .and_then(|sound| self.tone(sound, frequency, NOTE_DURATION, params, at))
            .unwrap_or_else(|| tonal::oscillator(Waveform::Sawtooth, frequency, at, NOTE_DURATION, params));
        self.submit(graph)
    }

    fn instrument_note(
        &self,
        instrument: &Instrument,
        midi_note: u8,
        frequency: f32,
        params: &ToneParams,
        at: f64,
    ) -> Result<VoiceId, EngineError> {
        let graph = instrument
            .find_zone(midi_note)
            .and_then(|zone| sampler::soundfont(zone, midi_note, at, NOTE_DURATION, params.gain));
        match graph {
            Some(graph) => self.submit(graph),
            None => {
                warn!(instrument = instrument.name(), midi_note, "No playable zone, synthesizing note");
                self.note(None, frequency, params, at)
            }
        }
    }

    /// Start time for a voice whose asset just resolved: never before its
    /// step, never in the past.
    fn resolve_start(&self, at: f64) -> f64 {
        at.max(self.context.now())
    }
}

fn report(result: Result<VoiceId, EngineError>) -> Option<VoiceId> {
    match result {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(err = %e, "Failed to schedule voice");
            None
        }
    }
}

/// Resolves sound identifiers and notes into scheduled voices.
pub struct Dispatcher {
    voices: Arc<Voices>,
    samples: Arc<SampleLoader>,
    soundfonts: Arc<SoundfontLoader>,
    runtime: Handle,
    session: Arc<RwLock<CancelHandle>>,
}

impl Dispatcher {
    pub fn new(
        context: AudioContext,
        synth: SynthContext,
        samples: Arc<SampleLoader>,
        soundfonts: Arc<SoundfontLoader>,
        runtime: Handle,
    ) -> Dispatcher {
        Dispatcher {
            voices: Arc::new(Voices {
                context,
                synth: Mutex::new(synth),
            }),
            samples,
            soundfonts,
            runtime,
            session: Arc::new(RwLock::new(CancelHandle::new())),
        }
    }

    /// Cancels the current session and begins a fresh one. Once this returns
    /// no voice of the cancelled session is submitted, including voices still
    /// waiting on a load. Later dispatches are unaffected.
    pub fn cancel_pending(&self) {
        let mut session = self.session.write();
        session.cancel();
        *session = CancelHandle::new();
    }

    /// The session that dispatches without an explicit session belong to.
    pub fn session(&self) -> CancelHandle {
        self.session.read().clone()
    }

    /// Plays a sound at audio time `at`.
    pub fn dispatch(&self, sound_id: &str, params: &VoiceParams, at: f64) -> Result<Dispatched, EngineError> {
        self.dispatch_in(&self.session(), sound_id, params, at)
    }

    /// Plays a sound at audio time `at` on behalf of `session`. Nothing is
    /// scheduled once `session` has been cancelled.
    pub fn dispatch_in(
        &self,
        session: &CancelHandle,
        sound_id: &str,
        params: &VoiceParams,
        at: f64,
    ) -> Result<Dispatched, EngineError> {
        let _gate = self.session.read();
        if session.is_cancelled() {
            return Ok(Dispatched::Cancelled);
        }
        let sound = sound_id.parse::<SoundId>();

        if let Some(bank) = params.drum_bank.as_deref() {
            if self.samples.has_samples(bank, sound_id) {
                return self.dispatch_sample(session, bank, sound_id, sound, params, at);
            }
            debug!(bank, sound_id, "No sample for sound, synthesizing");
        }

        match sound {
            Ok(SoundId::Instrument(name)) => {
                let tone = params.tone(DEFAULT_NOTE_GAIN, DEFAULT_NOTE_LPF);
                self.dispatch_instrument(session, name, A4_MIDI, DRUM_TONE_FREQUENCY, tone, at)
            }
            Ok(sound) => Ok(Dispatched::Voice(self.voices.drum(&sound, params, at)?)),
            Err(e) => {
                warn!(err = %e, "Playing fallback voice");
                Ok(Dispatched::Voice(self.voices.fallback(params, at)?))
            }
        }
    }

    /// Plays a melodic note at audio time `at`. Rests play nothing.
    pub fn play_note(
        &self,
        note: &str,
        sound_id: &str,
        params: &VoiceParams,
        at: f64,
    ) -> Result<Dispatched, EngineError> {
        self.play_note_in(&self.session(), note, sound_id, params, at)
    }

    /// Plays a melodic note on behalf of `session`. Nothing is scheduled once
    /// `session` has been cancelled.
    pub fn play_note_in(
        &self,
        session: &CancelHandle,
        note: &str,
        sound_id: &str,
        params: &VoiceParams,
        at: f64,
    ) -> Result<Dispatched, EngineError> {
        let _gate = self.session.read();
        if session.is_cancelled() {
            return Ok(Dispatched::Cancelled);
        }
        let (Some(frequency), Some(midi_note)) = (crate::note::frequency(note), crate::note::midi_note(note)) else {
            return Ok(Dispatched::Rest);
        };
        let tone = params.tone(DEFAULT_NOTE_GAIN, DEFAULT_NOTE_LPF);

        match sound_id.parse::<SoundId>() {
            Ok(SoundId::Instrument(name)) => self.dispatch_instrument(session, name, midi_note, frequency, tone, at),
            Ok(sound) => Ok(Dispatched::Voice(self.voices.note(Some(&sound), frequency, &tone, at)?)),
            Err(_) => Ok(Dispatched::Voice(self.voices.note(None, frequency, &tone, at)?)),
        }
    }

    fn dispatch_sample(
        &self,
        session: &CancelHandle,
        bank: &str,
        sound_id: &str,
        sound: Result<SoundId, UnknownSound>,
        params: &VoiceParams,
        at: f64,
    ) -> Result<Dispatched, EngineError> {
        let gain = params.gain.unwrap_or(DEFAULT_DRUM_GAIN);
        if let Some(buffer) = self.samples.cached(bank, sound_id, 0) {
            let id = self.voices.submit(sampler::sample(buffer, at, gain, params.speed))?;
            return Ok(Dispatched::Voice(id));
        }

        let voices = self.voices.clone();
        let samples = self.samples.clone();
        let session = session.clone();
        let gate = self.session.clone();
        let bank = bank.to_string();
        let sound_id = sound_id.to_string();
        let params = params.clone();
        let handle = self.runtime.spawn(async move {
            let buffer = samples.load_sample(&bank, &sound_id, 0).await;
            let _gate = gate.read();
            if session.is_cancelled() {
                debug!(bank = %bank, sound_id = %sound_id, "Discarding sample voice of a stopped session");
                return None;
            }
            let at = voices.resolve_start(at);
            let result = match (buffer, sound) {
                (Some(buffer), _) => voices.submit(sampler::sample(buffer, at, gain, params.speed)),
                (None, Ok(sound)) => {
                    warn!(bank = %bank, sound_id = %sound_id, "Sample unavailable, synthesizing");
                    voices.drum(&sound, &params, at)
                }
                (None, Err(e)) => {
                    warn!(bank = %bank, err = %e, "Sample unavailable, playing fallback voice");
                    voices.fallback(&params, at)
                }
            };
            report(result)
        });
        Ok(Dispatched::Pending(PendingVoice(handle)))
    }

    fn dispatch_instrument(
        &self,
        session: &CancelHandle,
        name: String,
        midi_note: u8,
        frequency: f32,
        tone: ToneParams,
        at: f64,
    ) -> Result<Dispatched, EngineError> {
        if let Some(instrument) = self.soundfonts.cached(&name) {
            let id = self.voices.instrument_note(&instrument, midi_note, frequency, &tone, at)?;
            return Ok(Dispatched::Voice(id));
        }

        let voices = self.voices.clone();
        let soundfonts = self.soundfonts.clone();
        let session = session.clone();
        let gate = self.session.clone();
        let handle = self.runtime.spawn(async move {
            let instrument = soundfonts.load_instrument(&name).await;
            let _gate = gate.read();
            if session.is_cancelled() {
                debug!(instrument = %name, "Discarding note of a stopped session");
                return None;
            }
            let at = voices.resolve_start(at);
            let result = match instrument {
                Some(instrument) => voices.instrument_note(&instrument, midi_note, frequency, &tone, at),
                None => {
                    warn!(instrument = %name, "Instrument unavailable, synthesizing note");
                    voices.note(None, frequency, &tone, at)
                }
            };
            report(result)
        });
        Ok(Dispatched::Pending(PendingVoice(handle)))
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &self.voices.context)
            .field("samples", &self.samples)
            .field("soundfonts", &self.soundfonts)
            .finish()
    }
}
