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
use std::sync::{mpsc, Arc, OnceLock, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::{ManualClock, Renderer};
use crate::config::{ConfigError, EngineConfig};
use crate::dispatch::{Dispatched, VoiceParams};
use crate::error::EngineError;
use crate::sequencer::{SequencerModel, SharedSequence, Track, TrackType};
use crate::testutil::MockFetcher;

use super::Engine;

const MAP_URL: &str = "https://samples.test/map.json";

fn engine() -> (Engine, Renderer, Arc<ManualClock>) {
    let _ = tracing_subscriber::fmt::try_init();
    let clock = Arc::new(ManualClock::new());
    let config = EngineConfig::default()
        .with_sample_map_url(MAP_URL)
        .with_soundfont_base_url("https://fonts.test/");
    let (engine, renderer) = Engine::with_clock(config, Arc::new(MockFetcher::new()), clock.clone()).unwrap();
    (engine, renderer, clock)
}

async fn play(clock: &ManualClock, ticks: u64) {
    for _ in 0..ticks {
        tokio::time::sleep(Duration::from_millis(25)).await;
        clock.advance(0.025);
    }
}

fn voices(renderer: &mut Renderer, label: &str) -> Vec<f64> {
    renderer.drain();
    renderer
        .voices()
        .filter(|(_, graph)| graph.label() == label)
        .map(|(_, graph)| graph.start())
        .collect()
}

#[tokio::test]
async fn test_not_ready_before_init() {
    let (engine, _renderer, _clock) = engine();
    let model = Arc::new(SharedSequence::new(120.0));

    assert!(!engine.is_initialized());
    assert!(matches!(engine.start(model), Err(EngineError::NotReady)));
    assert!(matches!(
        engine.play_sound("bd", &VoiceParams::default()),
        Err(EngineError::NotReady)
    ));
    assert!(!engine.stop());
}

#[tokio::test]
async fn test_init_without_sample_map() {
    let (engine, mut renderer, _clock) = engine();
    engine.init().await.unwrap();
    engine.init().await.unwrap();

    assert!(engine.is_initialized());
    assert!(!engine.samples().is_initialized());
    assert_eq!(engine.samples().sample_count("RolandTR808", "bd"), 0);

    // Drum banks fall back to synthesis when no samples are known.
    let params = VoiceParams::default().with_drum_bank("RolandTR808");
    assert!(matches!(engine.play_sound("bd", &params).unwrap(), Dispatched::Voice(_)));
    assert!(matches!(
        engine.play_note("~", "sawtooth", &VoiceParams::default()).unwrap(),
        Dispatched::Rest
    ));
    assert_eq!(voices(&mut renderer, "kick").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_kick_plays_once_per_bar() {
    let (engine, mut renderer, clock) = engine();
    engine.init().await.unwrap();

    let sequence = Arc::new(SharedSequence::new(120.0).with_tracks(vec![Track::drum("kick", "bd", &[0])]));
    assert!(engine.start(sequence.clone()).unwrap());
    assert!(engine.is_playing());

    // Four bars at 120 BPM and a little more.
    play(&clock, 330).await;
    assert!(engine.stop());
    assert!(!engine.is_playing());

    let starts = voices(&mut renderer, "kick");
    assert_eq!(starts.len(), 5, "kick starts {:?}", starts);
    for (bar, start) in starts.iter().enumerate() {
        assert!((start - bar as f64 * 2.0).abs() < 1e-9, "bar {} started at {}", bar, start);
    }
    assert_eq!(sequence.current_step(), engine.current_step());
}

#[tokio::test(start_paused = true)]
async fn test_melodic_track_plays_even_steps() {
    let (engine, mut renderer, clock) = engine();
    engine.init().await.unwrap();

    let sequence = Arc::new(SharedSequence::new(120.0).with_tracks(vec![Track::melodic(
        "lead",
        TrackType::Synth,
        "square",
        &["C4", "~", "E4", "~", "G4", "~", "C5", "~"],
    )]));
    engine.start(sequence).unwrap();
    play(&clock, 70).await;
    engine.stop();

    // One bar: notes on steps 0, 4, 8 and 12.
    let starts = voices(&mut renderer, "square");
    assert_eq!(starts.len(), 4, "square starts {:?}", starts);
    for (i, start) in starts.iter().enumerate() {
        assert!((start - i as f64 * 0.5).abs() < 1e-9);
    }
}

#[tokio::test(start_paused = true)]
async fn test_solo_and_mute() {
    let (engine, mut renderer, clock) = engine();
    engine.init().await.unwrap();

    let sequence = Arc::new(SharedSequence::new(120.0).with_tracks(vec![
        Track::drum("kick", "bd", &[0, 4, 8, 12]),
        Track::drum("snare", "sd", &[4, 12]),
        Track::drum("clap", "cp", &[4, 12]),
    ]));
    assert!(sequence.toggle_mute("snare"));
    assert!(sequence.toggle_solo("clap"));
    assert!(sequence.toggle_mute("clap"));

    engine.start(sequence.clone()).unwrap();
    play(&clock, 70).await;
    engine.stop();

    assert!(voices(&mut renderer, "kick").is_empty());
    assert!(voices(&mut renderer, "snare").is_empty());
    assert_eq!(voices(&mut renderer, "clap").len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_master_volume_follows_model() {
    let (engine, _renderer, clock) = engine();
    engine.init().await.unwrap();

    let sequence = Arc::new(SharedSequence::new(90.0));
    sequence.set_master_volume(0.25);
    assert!(engine.start(sequence.clone()).unwrap());
    assert_eq!(engine.context().master_gain(), sequence.master_volume());
    assert!(!engine.start(sequence).unwrap());

    play(&clock, 4).await;
    engine.set_master_volume(0.5).unwrap();
    assert_eq!(engine.context().master_gain(), 0.5);
    engine.stop();
}

#[test]
fn test_zero_tick_interval_is_rejected() {
    let config = EngineConfig::from_yaml("tick_interval: 0ms").unwrap();
    let result = Engine::with_clock(config, Arc::new(MockFetcher::new()), Arc::new(ManualClock::new()));
    assert!(matches!(
        result,
        Err(EngineError::Config(ConfigError::ZeroDuration("tick_interval")))
    ));
}

#[tokio::test]
async fn test_invalid_tempo() {
    let (engine, _renderer, _clock) = engine();
    engine.init().await.unwrap();

    let sequence = Arc::new(SharedSequence::new(250.0));
    assert!(matches!(engine.start(sequence), Err(EngineError::InvalidTempo(_))));
    assert!(!engine.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_dispose() {
    let (engine, _renderer, clock) = engine();
    engine.init().await.unwrap();

    let sequence = Arc::new(SharedSequence::new(120.0).with_tracks(vec![Track::drum("kick", "bd", &[0])]));
    engine.start(sequence.clone()).unwrap();
    play(&clock, 4).await;

    engine.dispose();
    assert!(!engine.is_playing());
    assert!(engine.context().is_closed());
    assert!(matches!(engine.start(sequence), Err(EngineError::Disposed)));
    assert!(matches!(engine.init().await, Err(EngineError::Disposed)));
    assert!(matches!(engine.set_master_volume(1.0), Err(EngineError::Disposed)));

    // Disposing twice is harmless.
    engine.dispose();
}

/// Stops the engine from inside the step callback.
struct StopOnStep {
    sequence: SharedSequence,
    engine: OnceLock<Weak<Engine>>,
}

impl SequencerModel for StopOnStep {
    fn tracks(&self) -> Vec<Track> {
        self.sequence.tracks()
    }

    fn bpm(&self) -> f64 {
        self.sequence.bpm()
    }

    fn master_volume(&self) -> f32 {
        self.sequence.master_volume()
    }

    fn on_step(&self, step: usize) {
        self.sequence.on_step(step);
        if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
            assert!(engine.stop());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_from_step_plays_nothing() {
    let (engine, mut renderer, clock) = engine();
    let engine = Arc::new(engine);
    engine.init().await.unwrap();

    let model = Arc::new(StopOnStep {
        sequence: SharedSequence::new(120.0).with_tracks(vec![
            Track::drum("kick", "bd", &[0]),
            Track::drum("snare", "sd", &[0]),
        ]),
        engine: OnceLock::new(),
    });
    model.engine.set(Arc::downgrade(&engine)).unwrap();
    assert!(engine.start(model.clone()).unwrap());

    play(&clock, 10).await;
    assert!(!engine.is_playing());
    assert_eq!(model.sequence.current_step(), Some(0));
    assert!(voices(&mut renderer, "kick").is_empty());
    assert!(voices(&mut renderer, "snare").is_empty());
}

/// Holds the first step inside the callback until released.
struct HeldStep {
    sequence: SharedSequence,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl SequencerModel for HeldStep {
    fn tracks(&self) -> Vec<Track> {
        self.sequence.tracks()
    }

    fn bpm(&self) -> f64 {
        self.sequence.bpm()
    }

    fn master_volume(&self) -> f32 {
        self.sequence.master_volume()
    }

    fn on_step(&self, step: usize) {
        self.sequence.on_step(step);
        if let Some(entered) = self.entered.lock().take() {
            let _ = entered.send(());
            let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_during_firing_step_plays_nothing() {
    let (engine, mut renderer, _clock) = engine();
    engine.init().await.unwrap();

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let model = Arc::new(HeldStep {
        sequence: SharedSequence::new(120.0).with_tracks(vec![Track::drum("kick", "bd", &[0])]),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(release_rx),
    });
    assert!(engine.start(model).unwrap());

    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(engine.stop());
    release_tx.send(()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(voices(&mut renderer, "kick").is_empty());
}
