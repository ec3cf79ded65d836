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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tracing::{debug, info, span, warn, Instrument, Level, Span};

use crate::assets::{Fetcher, SampleLoader, SoundfontLoader};
use crate::audio::{AudioClock, AudioContext, Renderer};
use crate::config::EngineConfig;
use crate::dispatch::{Dispatched, Dispatcher, VoiceParams};
use crate::error::EngineError;
use crate::playsync::CancelHandle;
use crate::scheduler::{StepEvent, StepScheduler};
use crate::sequencer::{active_tracks, SequencerModel};
use crate::synth::SynthContext;

#[cfg(test)]
mod tests;

/// The playback engine: one rendering context, its asset loaders, the step
/// scheduler and the dispatcher that turns fired steps into voices.
///
/// The engine is created alongside the [`Renderer`] that the host drives for
/// audio output. Nothing plays until [`Engine::init`] has run.
pub struct Engine {
    context: AudioContext,
    samples: Arc<SampleLoader>,
    soundfonts: Arc<SoundfontLoader>,
    scheduler: StepScheduler,
    dispatcher: OnceLock<Arc<Dispatcher>>,
    sample_rate: u32,
    disposed: AtomicBool,
    span: Span,
}

impl Engine {
    /// Creates an engine whose clock follows the frames the renderer produces.
    pub fn new(config: EngineConfig, fetcher: Arc<dyn Fetcher>) -> Result<(Engine, Renderer), EngineError> {
        let (context, renderer) = AudioContext::new(config.sample_rate());
        Ok((Engine::build(&config, fetcher, context)?, renderer))
    }

    /// Creates an engine driven by an external audio clock.
    pub fn with_clock(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn AudioClock>,
    ) -> Result<(Engine, Renderer), EngineError> {
        let (context, renderer) = AudioContext::with_clock(config.sample_rate(), clock);
        Ok((Engine::build(&config, fetcher, context)?, renderer))
    }

    fn build(config: &EngineConfig, fetcher: Arc<dyn Fetcher>, context: AudioContext) -> Result<Engine, EngineError> {
        let scheduler = StepScheduler::new(context.clock(), config.lookahead()?, config.tick_interval()?);
        Ok(Engine {
            samples: Arc::new(SampleLoader::new(fetcher.clone(), config.samples())),
            soundfonts: Arc::new(SoundfontLoader::new(fetcher, config.soundfonts())),
            scheduler,
            dispatcher: OnceLock::new(),
            sample_rate: config.sample_rate(),
            context,
            disposed: AtomicBool::new(false),
            span: span!(Level::INFO, "engine"),
        })
    }

    /// Loads the sample map and readies the dispatcher. Safe to call more
    /// than once. A failed sample map fetch is not an error: drum banks then
    /// fall back to synthesis.
    pub async fn init(&self) -> Result<(), EngineError> {
        self.check_disposed()?;
        if self.is_initialized() {
            return Ok(());
        }

        let runtime = Handle::try_current()?;
        let samples_available = self.samples.init().instrument(self.span.clone()).await;

        let _enter = self.span.enter();
        self.dispatcher.get_or_init(|| {
            Arc::new(Dispatcher::new(
                self.context.clone(),
                SynthContext::new(self.sample_rate),
                self.samples.clone(),
                self.soundfonts.clone(),
                runtime,
            ))
        });
        info!(
            sample_rate = self.sample_rate,
            samples = samples_available,
            "Engine initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.dispatcher.get().is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_running()
    }

    fn check_disposed(&self) -> Result<(), EngineError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(EngineError::Disposed);
        }
        Ok(())
    }

    fn dispatcher(&self) -> Result<&Arc<Dispatcher>, EngineError> {
        self.check_disposed()?;
        self.dispatcher.get().ok_or(EngineError::NotReady)
    }

    /// Starts playing `model` at its tempo. Returns false if already playing.
    pub fn start(&self, model: Arc<dyn SequencerModel>) -> Result<bool, EngineError> {
        let dispatcher = self.dispatcher()?.clone();
        let _enter = self.span.enter();

        self.context.set_master_gain(model.master_volume());
        let bpm = model.bpm();
        let session = dispatcher.session();
        self.scheduler
            .start(bpm, move |event| play_step(&dispatcher, &session, model.as_ref(), event))
    }

    /// Stops playback and discards voices still waiting on an asset. No voice
    /// of the stopped session is submitted once this returns, even from a
    /// step that is firing concurrently. Returns false if nothing was playing.
    pub fn stop(&self) -> bool {
        let _enter = self.span.enter();

        let stopped = self.scheduler.stop();
        if let Some(dispatcher) = self.dispatcher.get() {
            dispatcher.cancel_pending();
        }
        stopped
    }

    /// Stops playback and closes the rendering context. The engine cannot be
    /// used afterwards.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop();
        self.context.close();
        let _enter = self.span.enter();
        info!("Engine disposed");
    }

    pub fn set_master_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.check_disposed()?;
        self.context.set_master_gain(volume);
        Ok(())
    }

    /// Plays a sound right away.
    pub fn play_sound(&self, sound_id: &str, params: &VoiceParams) -> Result<Dispatched, EngineError> {
        self.dispatcher()?.dispatch(sound_id, params, self.context.now())
    }

    /// Plays a melodic note right away.
    pub fn play_note(&self, note: &str, sound_id: &str, params: &VoiceParams) -> Result<Dispatched, EngineError> {
        self.dispatcher()?.play_note(note, sound_id, params, self.context.now())
    }

    /// The last step fired by the running or last session.
    pub fn current_step(&self) -> Option<usize> {
        self.scheduler.current_step()
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn samples(&self) -> &Arc<SampleLoader> {
        &self.samples
    }

    pub fn soundfonts(&self) -> &Arc<SoundfontLoader> {
        &self.soundfonts
    }
}

/// Plays every active track of `model` for one fired step. Gives up as soon
/// as `session` is cancelled.
fn play_step(dispatcher: &Dispatcher, session: &CancelHandle, model: &dyn SequencerModel, event: StepEvent) {
    if session.is_cancelled() {
        return;
    }
    model.on_step(event.step);

    let tracks = model.tracks();
    for track in active_tracks(&tracks) {
        let params = VoiceParams::from(track);
        let result = if track.is_drum() {
            if !track.hits(event.step) {
                continue;
            }
            dispatcher.dispatch_in(session, &track.sound_id, &params, event.time)
        } else {
            let Some(note) = track.note_at(event.step) else {
                continue;
            };
            dispatcher.play_note_in(session, note, &track.sound_id, &params, event.time)
        };
        match result {
            Ok(Dispatched::Cancelled) => {
                debug!(step = event.step, "Session stopped during step");
                return;
            }
            Ok(_) => {}
            Err(e) => warn!(track = %track.id, step = event.step, err = %e, "Failed to play track"),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("context", &self.context)
            .field("scheduler", &self.scheduler)
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish()
    }
}
