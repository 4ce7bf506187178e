//! Workflow playback: a step sequencer and the timer that drives it.
//!
//! ```text
//!            tick (not last)                 toggle / seek / restart
//!   ┌────────────────────────┐        ┌──────────────────────────────┐
//!   ▼                        │        ▼                              │
//! Playing(i) ──tick──► Playing(i+1) ... ──tick──► Stopped(last)      │
//!   │  ▲                                                             │
//!   │  └──────── toggle / restart ─────── Stopped(i) ◄── seek(j) ────┘
//!   └──────────────── toggle ─────────────────►
//! ```
//!
//! [`Sequencer`] is the pure state machine. Every command that can cancel a
//! pending tick (load, toggle, seek, restart) bumps its generation, and a
//! tick carrying an older generation is discarded. [`PlaybackTimer`] owns
//! the tokio task that delivers ticks and tags each one with the generation
//! that was current when it was scheduled.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::logging::log_transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub current_step: usize,
    pub is_playing: bool,
    pub total_steps: usize,
}

impl PlaybackState {
    pub fn is_last_step(&self) -> bool {
        self.total_steps > 0 && self.current_step + 1 >= self.total_steps
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("step {requested} out of range for a workflow of {total} steps")]
    OutOfRange { requested: usize, total: usize },
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Scheduled under an older generation; ignored.
    Stale,
    /// Not playing; nothing to do.
    Idle,
    /// Moved to this step and keeps playing.
    Advanced(usize),
    /// Stopped on the final step.
    Finished(usize),
}

#[derive(Debug, Clone)]
pub struct Sequencer {
    state: PlaybackState,
    generation: u64,
}

impl Sequencer {
    /// Start at step 0, playing unless there is nothing to play.
    pub fn new(total_steps: usize) -> Self {
        Self {
            state: Self::initial(total_steps),
            generation: 0,
        }
    }

    fn initial(total_steps: usize) -> PlaybackState {
        PlaybackState {
            current_step: 0,
            is_playing: total_steps > 0,
            total_steps,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// New result or algorithm: back to step 0 and auto-play.
    pub fn reset(&mut self, total_steps: usize) -> u64 {
        self.state = Self::initial(total_steps);
        self.bump()
    }

    pub fn tick(&mut self, generation: u64) -> TickOutcome {
        if generation != self.generation {
            return TickOutcome::Stale;
        }
        if !self.state.is_playing {
            return TickOutcome::Idle;
        }
        let s = &mut self.state;
        if s.current_step + 1 < s.total_steps {
            s.current_step += 1;
            if s.current_step + 1 == s.total_steps {
                s.is_playing = false;
                TickOutcome::Finished(s.current_step)
            } else {
                TickOutcome::Advanced(s.current_step)
            }
        } else {
            s.is_playing = false;
            s.current_step = s.total_steps.saturating_sub(1);
            TickOutcome::Finished(s.current_step)
        }
    }

    /// Flip between playing and paused without moving.
    pub fn toggle(&mut self) -> u64 {
        self.state.is_playing = !self.state.is_playing && self.state.total_steps > 0;
        self.bump()
    }

    /// Jump to step `step` and pause. Out-of-range steps are refused and
    /// leave the state untouched.
    pub fn seek(&mut self, step: usize) -> Result<u64, PlaybackError> {
        if step >= self.state.total_steps {
            return Err(PlaybackError::OutOfRange {
                requested: step,
                total: self.state.total_steps,
            });
        }
        self.state.current_step = step;
        self.state.is_playing = false;
        Ok(self.bump())
    }

    pub fn restart(&mut self) -> u64 {
        self.state.current_step = 0;
        self.state.is_playing = self.state.total_steps > 0;
        self.bump()
    }
}

// =============================================================================
// Timer driver
// =============================================================================

/// Delivers ticks to a shared [`Sequencer`] on a fixed interval.
///
/// Must be used from within a tokio runtime. At most one tick task is alive
/// at a time; it is aborted on every command and on drop, and any tick that
/// still slips through is rejected by the generation check.
pub struct PlaybackTimer {
    sequencer: Arc<Mutex<Sequencer>>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
    frames: watch::Sender<PlaybackState>,
}

fn lock(seq: &Mutex<Sequencer>) -> MutexGuard<'_, Sequencer> {
    seq.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PlaybackTimer {
    pub fn new(interval: Duration) -> Self {
        let sequencer = Sequencer::new(0);
        let (frames, _) = watch::channel(sequencer.state());
        Self {
            sequencer: Arc::new(Mutex::new(sequencer)),
            interval,
            task: None,
            frames,
        }
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.sequencer).state()
    }

    /// Receives every state the sequencer passes through.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.frames.subscribe()
    }

    /// Start playback for a new workflow of `total_steps` steps.
    pub fn load(&mut self, total_steps: usize) {
        self.command("load", |s| Ok(s.reset(total_steps)))
            .unwrap_or_default();
    }

    pub fn toggle(&mut self) {
        self.command("toggle", |s| Ok(s.toggle())).unwrap_or_default();
    }

    pub fn seek(&mut self, step: usize) -> Result<(), PlaybackError> {
        self.command("seek", |s| s.seek(step))
    }

    pub fn restart(&mut self) {
        self.command("restart", |s| Ok(s.restart())).unwrap_or_default();
    }

    /// Cancel any pending tick. The sequencer keeps its current state.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn command<F>(&mut self, name: &str, apply: F) -> Result<(), PlaybackError>
    where
        F: FnOnce(&mut Sequencer) -> Result<u64, PlaybackError>,
    {
        // Frames are published under the lock so a tick that already read
        // the old generation cannot overwrite this frame afterwards.
        let (generation, state) = {
            let mut seq = lock(&self.sequencer);
            let generation = apply(&mut seq)?;
            let state = seq.state();
            self.frames.send_replace(state);
            (generation, state)
        };
        self.stop();
        log_transition(name, generation, state.current_step, state.total_steps, state.is_playing);
        if state.is_playing {
            self.schedule(generation);
        }
        Ok(())
    }

    fn schedule(&mut self, generation: u64) {
        let sequencer = Arc::clone(&self.sequencer);
        let frames = self.frames.clone();
        let interval = self.interval;
        self.task = Some(tokio::spawn(async move {
            loop {
                sleep(interval).await;
                let (outcome, state) = {
                    let mut seq = lock(&sequencer);
                    let outcome = seq.tick(generation);
                    let state = seq.state();
                    if matches!(outcome, TickOutcome::Advanced(_) | TickOutcome::Finished(_)) {
                        frames.send_replace(state);
                    }
                    (outcome, state)
                };
                match outcome {
                    TickOutcome::Stale | TickOutcome::Idle => break,
                    TickOutcome::Advanced(step) => {
                        log_transition("tick", generation, step, state.total_steps, true);
                    }
                    TickOutcome::Finished(step) => {
                        log_transition("finished", generation, step, state.total_steps, false);
                        break;
                    }
                }
            }
        }));
    }
}

impl Drop for PlaybackTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped_at(step: usize, total: usize) -> PlaybackState {
        PlaybackState {
            current_step: step,
            is_playing: false,
            total_steps: total,
        }
    }

    #[test]
    fn test_new_autoplays_from_zero() {
        let seq = Sequencer::new(7);
        assert_eq!(
            seq.state(),
            PlaybackState { current_step: 0, is_playing: true, total_steps: 7 }
        );
    }

    #[test]
    fn test_runs_to_last_step_and_stops() {
        let mut seq = Sequencer::new(7);
        let gen = seq.generation();
        for i in 1..6 {
            assert_eq!(seq.tick(gen), TickOutcome::Advanced(i));
        }
        assert_eq!(seq.tick(gen), TickOutcome::Finished(6));
        assert_eq!(seq.state(), stopped_at(6, 7));
        assert_eq!(seq.tick(gen), TickOutcome::Idle);
        assert_eq!(seq.state(), stopped_at(6, 7));
    }

    #[test]
    fn test_seek_always_pauses() {
        let mut seq = Sequencer::new(7);
        seq.seek(3).unwrap();
        assert_eq!(seq.state(), stopped_at(3, 7));

        seq.toggle();
        assert!(seq.state().is_playing);
        seq.seek(3).unwrap();
        assert_eq!(seq.state(), stopped_at(3, 7));
    }

    #[test]
    fn test_seek_out_of_range_is_refused() {
        let mut seq = Sequencer::new(7);
        let before = seq.state();
        let gen = seq.generation();
        assert_eq!(seq.seek(7), Err(PlaybackError::OutOfRange { requested: 7, total: 7 }));
        assert_eq!(seq.state(), before);
        assert_eq!(seq.generation(), gen);
    }

    #[test]
    fn test_toggle_keeps_index() {
        let mut seq = Sequencer::new(5);
        let gen = seq.generation();
        seq.tick(gen);
        seq.toggle();
        assert_eq!(seq.state(), stopped_at(1, 5));
        seq.toggle();
        assert_eq!(seq.state().current_step, 1);
        assert!(seq.state().is_playing);
    }

    #[test]
    fn test_toggle_at_last_step_stops_on_next_tick() {
        let mut seq = Sequencer::new(3);
        seq.seek(2).unwrap();
        let gen = seq.toggle();
        assert!(seq.state().is_playing);
        assert_eq!(seq.tick(gen), TickOutcome::Finished(2));
        assert_eq!(seq.state(), stopped_at(2, 3));
    }

    #[test]
    fn test_restart_plays_from_zero() {
        let mut seq = Sequencer::new(4);
        seq.seek(2).unwrap();
        seq.restart();
        assert_eq!(
            seq.state(),
            PlaybackState { current_step: 0, is_playing: true, total_steps: 4 }
        );
    }

    #[test]
    fn test_stale_tick_is_discarded() {
        let mut seq = Sequencer::new(7);
        let old = seq.generation();
        seq.reset(4);
        assert_eq!(seq.tick(old), TickOutcome::Stale);
        assert_eq!(
            seq.state(),
            PlaybackState { current_step: 0, is_playing: true, total_steps: 4 }
        );
    }

    #[test]
    fn test_empty_workflow_never_plays() {
        let mut seq = Sequencer::new(0);
        assert_eq!(seq.state(), stopped_at(0, 0));
        let gen = seq.toggle();
        assert!(!seq.state().is_playing);
        assert_eq!(seq.tick(gen), TickOutcome::Idle);
        seq.restart();
        assert!(!seq.state().is_playing);
        assert!(seq.seek(0).is_err());
    }

    #[test]
    fn test_single_step_workflow_finishes_on_first_tick() {
        let mut seq = Sequencer::new(1);
        let gen = seq.generation();
        assert!(seq.state().is_playing);
        assert_eq!(seq.tick(gen), TickOutcome::Finished(0));
        assert_eq!(seq.state(), stopped_at(0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_advances_every_interval() {
        let mut timer = PlaybackTimer::new(Duration::from_secs(3));
        timer.load(7);
        assert_eq!(timer.state().current_step, 0);

        sleep(Duration::from_millis(3_100)).await;
        assert_eq!(timer.state().current_step, 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(timer.state(), stopped_at(6, 7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_reload_cancels_pending_tick() {
        let mut timer = PlaybackTimer::new(Duration::from_secs(3));
        timer.load(7);
        sleep(Duration::from_secs(1)).await;
        timer.load(5);

        // The first load's tick would have landed at t=3s.
        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(
            timer.state(),
            PlaybackState { current_step: 0, is_playing: true, total_steps: 5 }
        );

        sleep(Duration::from_millis(600)).await;
        assert_eq!(timer.state().current_step, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_pause_and_seek_stop_ticking() {
        let mut timer = PlaybackTimer::new(Duration::from_secs(3));
        timer.load(7);
        timer.toggle();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(timer.state(), stopped_at(0, 7));

        timer.toggle();
        sleep(Duration::from_millis(3_100)).await;
        assert_eq!(timer.state().current_step, 1);

        timer.seek(4).unwrap();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(timer.state(), stopped_at(4, 7));
        assert!(timer.seek(9).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_publishes_frames() {
        let mut timer = PlaybackTimer::new(Duration::from_secs(3));
        let mut rx = timer.subscribe();
        timer.load(3);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().current_step, 0);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().current_step, 1);

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), stopped_at(2, 3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reload_frames_never_go_back_to_old_workflow() {
        let mut timer = PlaybackTimer::new(Duration::from_millis(1));
        let rx = timer.subscribe();
        for round in 0..200 {
            let total = 2 + round % 3;
            timer.load(total);
            assert_eq!(rx.borrow().total_steps, total);
            if round % 10 == 0 {
                sleep(Duration::from_millis(2)).await;
                assert_eq!(rx.borrow().total_steps, total, "round {}", round);
            }
        }
        sleep(Duration::from_millis(20)).await;
        let last = 2 + 199 % 3;
        assert_eq!(*rx.borrow(), timer.state());
        assert_eq!(timer.state(), stopped_at(last - 1, last));
    }
}
