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
//! Lookahead step scheduling.
//!
//! A coarse timer wakes up every tick interval and fires every step whose
//! deadline falls within the lookahead window of the audio clock. Step
//! deadlines are kept in audio time as exact multiples of the step duration
//! from the session origin, so timer jitter changes when a step is fired but
//! never when it sounds.
//!
//! The tempo is fixed for a session. Changing it takes a stop and a start.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, span, Level, Span};

use crate::audio::AudioClock;
use crate::config::ConfigError;
use crate::error::EngineError;
use crate::playsync::CancelHandle;
use crate::sequencer::STEPS;

pub const MIN_BPM: f64 = 60.0;
pub const MAX_BPM: f64 = 200.0;

/// Length of one 16th-note step in seconds.
pub fn step_duration(bpm: f64) -> f64 {
    60.0 / bpm / 4.0
}

/// One fired step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepEvent {
    /// Position in the bar, `0..16`.
    pub step: usize,
    /// Steps fired before this one in the session.
    pub index: u64,
    /// Audio time the step sounds at.
    pub time: f64,
}

/// The lookahead core: which steps are due, and when they sound.
#[derive(Clone, Debug)]
pub struct StepClock {
    step_duration: f64,
    origin: f64,
    fired: u64,
}

impl StepClock {
    /// A clock whose first step sounds at `origin`.
    pub fn new(bpm: f64, origin: f64) -> StepClock {
        StepClock {
            step_duration: step_duration(bpm),
            origin,
            fired: 0,
        }
    }

    pub fn step_duration(&self) -> f64 {
        self.step_duration
    }

    /// Audio time of the next step to fire.
    pub fn next_deadline(&self) -> f64 {
        self.origin + self.fired as f64 * self.step_duration
    }

    /// Bar position of the next step to fire.
    pub fn next_step(&self) -> usize {
        (self.fired % STEPS as u64) as usize
    }

    /// Fires every step whose deadline is before `now + lookahead`, in order.
    /// Returns how many fired.
    pub fn poll<F: FnMut(StepEvent)>(&mut self, now: f64, lookahead: f64, mut fire: F) -> usize {
        let horizon = now + lookahead;
        let mut fired = 0;
        while self.next_deadline() < horizon {
            fire(StepEvent {
                step: self.next_step(),
                index: self.fired,
                time: self.next_deadline(),
            });
            self.fired += 1;
            fired += 1;
        }
        fired
    }
}

struct SessionHandles {
    join: JoinHandle<()>,
    cancel: CancelHandle,
    bpm: f64,
}

/// Runs a [`StepClock`] on a tokio interval for one session at a time.
pub struct StepScheduler {
    clock: Arc<dyn AudioClock>,
    lookahead: Duration,
    tick_interval: Duration,
    session: Mutex<Option<SessionHandles>>,
    last_step: Arc<Mutex<Option<usize>>>,
    span: Span,
}

impl StepScheduler {
    pub fn new(clock: Arc<dyn AudioClock>, lookahead: Duration, tick_interval: Duration) -> StepScheduler {
        StepScheduler {
            clock,
            lookahead,
            tick_interval,
            session: Mutex::new(None),
            last_step: Arc::new(Mutex::new(None)),
            span: span!(Level::INFO, "scheduler"),
        }
    }

    /// Starts firing `on_step` from step 0. Returns false without touching
    /// the running session if one is already running.
    pub fn start<F>(&self, bpm: f64, on_step: F) -> Result<bool, EngineError>
    where
        F: Fn(StepEvent) + Send + Sync + 'static,
    {
        let _enter = self.span.enter();

        if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(EngineError::InvalidTempo(bpm));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("tick_interval").into());
        }

        let mut session = self.session.lock();
        if let Some(running) = session.as_ref() {
            if !running.join.is_finished() {
                info!(bpm = running.bpm, "Scheduler is already running");
                return Ok(false);
            }
        }

        let runtime = Handle::try_current()?;
        let cancel = CancelHandle::new();
        let step_clock = StepClock::new(bpm, self.clock.now());
        *self.last_step.lock() = None;

        let join = runtime.spawn(run_session(
            self.clock.clone(),
            step_clock,
            self.lookahead,
            self.tick_interval,
            cancel.clone(),
            self.last_step.clone(),
            on_step,
        ));
        info!(
            bpm,
            step_ms = step_duration(bpm) * 1000.0,
            lookahead_ms = self.lookahead.as_millis() as u64,
            "Scheduler started"
        );
        *session = Some(SessionHandles { join, cancel, bpm });
        Ok(true)
    }

    /// Stops the running session. No step fires once this returns. Returns
    /// false if nothing was running.
    pub fn stop(&self) -> bool {
        let _enter = self.span.enter();

        let Some(session) = self.session.lock().take() else {
            return false;
        };
        session.cancel.cancel();
        session.join.abort();
        info!(bpm = session.bpm, "Scheduler stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| !session.join.is_finished())
    }

    /// Tempo of the running session.
    pub fn bpm(&self) -> Option<f64> {
        self.session.lock().as_ref().map(|session| session.bpm)
    }

    /// The last step fired in the current session.
    pub fn current_step(&self) -> Option<usize> {
        *self.last_step.lock()
    }
}

impl Drop for StepScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for StepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepScheduler")
            .field("lookahead", &self.lookahead)
            .field("tick_interval", &self.tick_interval)
            .field("bpm", &self.bpm())
            .finish()
    }
}

async fn run_session<F>(
    clock: Arc<dyn AudioClock>,
    mut step_clock: StepClock,
    lookahead: Duration,
    tick_interval: Duration,
    cancel: CancelHandle,
    last_step: Arc<Mutex<Option<usize>>>,
    on_step: F,
) where
    F: Fn(StepEvent) + Send + Sync + 'static,
{
    let lookahead = lookahead.as_secs_f64();
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if cancel.is_cancelled() {
            break;
        }
        let fired = step_clock.poll(clock.now(), lookahead, |event| {
            if cancel.is_cancelled() {
                return;
            }
            *last_step.lock() = Some(event.step);
            on_step(event);
        });
        if fired > 1 {
            debug!(fired, "Caught up on late steps");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ManualClock;

    fn assert_exact(events: &[StepEvent], origin: f64, bpm: f64) {
        let duration = step_duration(bpm);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.index, i as u64);
            assert_eq!(event.step, i % STEPS);
            let expected = origin + i as f64 * duration;
            assert!(
                (event.time - expected).abs() < 1e-9,
                "step {} at {} instead of {}",
                i,
                event.time,
                expected
            );
        }
        for pair in events.windows(2) {
            assert!((pair[1].time - pair[0].time - duration).abs() < 1e-9);
        }
    }

    #[test]
    fn test_step_duration() {
        assert_eq!(step_duration(120.0), 0.125);
        assert_eq!(step_duration(60.0), 0.25);
    }

    #[test]
    fn test_lookahead_window() {
        let mut clock = StepClock::new(120.0, 0.0);
        let mut events = Vec::new();

        assert_eq!(clock.poll(0.0, 0.1, |e| events.push(e)), 1);
        assert_eq!(clock.poll(0.02, 0.1, |e| events.push(e)), 0);
        assert_eq!(clock.poll(0.03, 0.1, |e| events.push(e)), 1);
        assert_eq!(clock.next_step(), 2);
        assert_eq!(clock.next_deadline(), 0.25);

        // A stalled timer catches up in one poll.
        assert_eq!(clock.poll(1.0, 0.1, |e| events.push(e)), 7);
        assert_exact(&events, 0.0, 120.0);
    }

    #[test]
    fn test_no_drift_under_jitter() {
        for bpm in [60.0, 97.0, 120.0, 173.0, 200.0] {
            let origin = 3.7;
            let mut clock = StepClock::new(bpm, origin);
            let mut events = Vec::new();
            let mut now = origin;
            let mut tick = 0u64;
            while events.len() < 80 {
                clock.poll(now, 0.1, |e| events.push(e));
                // 10 to 60 ms between ticks.
                now += 0.010 + (tick * 7 % 11) as f64 * 0.005;
                tick += 1;
            }
            assert_exact(&events, origin, bpm);
        }
    }

    #[test]
    fn test_start_without_runtime() {
        let scheduler = StepScheduler::new(
            Arc::new(ManualClock::new()),
            Duration::from_millis(100),
            Duration::from_millis(25),
        );
        assert!(matches!(scheduler.start(120.0, |_| {}), Err(EngineError::NoRuntime(_))));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_invalid_tempo() {
        let scheduler = StepScheduler::new(
            Arc::new(ManualClock::new()),
            Duration::from_millis(100),
            Duration::from_millis(25),
        );
        for bpm in [59.9, 200.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(scheduler.start(bpm, |_| {}), Err(EngineError::InvalidTempo(_))));
        }
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_zero_tick_interval() {
        let scheduler = StepScheduler::new(Arc::new(ManualClock::new()), Duration::from_millis(100), Duration::ZERO);
        assert!(matches!(
            scheduler.start(120.0, |_| {}),
            Err(EngineError::Config(ConfigError::ZeroDuration("tick_interval")))
        ));
        assert!(!scheduler.is_running());
    }

    /// Advances the audio clock alongside tokio's paused time, with jitter
    /// between the two.
    async fn play(clock: &ManualClock, ticks: u64) {
        for tick in 0..ticks {
            tokio::time::sleep(Duration::from_millis(25)).await;
            clock.advance(0.025 + ((tick % 5) as f64 - 2.0) * 0.004);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_session() {
        let _ = tracing_subscriber::fmt::try_init();
        let clock = Arc::new(ManualClock::new());
        clock.set(1.5);
        let scheduler = StepScheduler::new(clock.clone(), Duration::from_millis(100), Duration::from_millis(25));
        let events = Arc::new(Mutex::new(Vec::new()));

        let recorded = events.clone();
        assert!(scheduler.start(120.0, move |event| recorded.lock().push(event)).unwrap());
        assert!(scheduler.is_running());
        assert_eq!(scheduler.bpm(), Some(120.0));

        // Starting again is a no-op and does not reset the clock.
        play(&clock, 40).await;
        let recorded = events.clone();
        assert!(!scheduler.start(90.0, move |event| recorded.lock().push(event)).unwrap());
        assert_eq!(scheduler.bpm(), Some(120.0));

        play(&clock, 400).await;
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());

        let fired = events.lock().clone();
        assert!(fired.len() >= 64, "only {} steps fired", fired.len());
        assert_exact(&fired, 1.5, 120.0);
        assert_eq!(scheduler.current_step(), fired.last().map(|event| event.step));

        // Nothing fires after stop.
        play(&clock, 40).await;
        assert_eq!(events.lock().len(), fired.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_begins_at_step_zero() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = StepScheduler::new(clock.clone(), Duration::from_millis(100), Duration::from_millis(25));

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = events.clone();
        scheduler.start(150.0, move |event| recorded.lock().push(event)).unwrap();
        play(&clock, 30).await;
        scheduler.stop();
        assert!(events.lock().len() > 1);

        events.lock().clear();
        clock.set(10.0);
        let recorded = events.clone();
        scheduler.start(150.0, move |event| recorded.lock().push(event)).unwrap();
        play(&clock, 30).await;
        scheduler.stop();

        let fired = events.lock().clone();
        assert_eq!(fired[0].step, 0);
        assert_exact(&fired, 10.0, 150.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_step_callback() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Arc::new(StepScheduler::new(
            clock.clone(),
            Duration::from_millis(100),
            Duration::from_millis(25),
        ));
        let events = Arc::new(Mutex::new(Vec::new()));

        let recorded = events.clone();
        let handle = Arc::downgrade(&scheduler);
        scheduler
            .start(200.0, move |event| {
                recorded.lock().push(event);
                if event.step == 3 {
                    if let Some(scheduler) = handle.upgrade() {
                        scheduler.stop();
                    }
                }
            })
            .unwrap();
        play(&clock, 40).await;

        assert_eq!(events.lock().len(), 4);
        assert!(!scheduler.is_running());
    }
}
