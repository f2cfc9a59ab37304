//! Drivers that turn wall-clock time into engine ticks.
//!
//! The engine itself only knows fixed ticks. [`GameLoop`] owns the
//! accumulator, collects input before each tick and hands a snapshot to the
//! HUD after it. State mutation is never skipped; only the HUD notification
//! is, when a tick overruns its budget.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::constants::MAX_TICKS_PER_FRAME;
use crate::desktop::WindowAdapter;
use crate::engine::GameEngine;
use crate::error::EngineError;
use crate::types::{InputEvent, SessionSummary, Snapshot};

/// Supplies the discrete input for the next tick.
pub trait InputSource {
    fn poll(&mut self, view: &Snapshot) -> Vec<InputEvent>;
}

impl<F> InputSource for F
where
    F: FnMut(&Snapshot) -> Vec<InputEvent>,
{
    fn poll(&mut self, view: &Snapshot) -> Vec<InputEvent> {
        self(view)
    }
}

/// Receives a read-only snapshot after each completed tick.
pub trait FrameObserver {
    fn on_frame(&mut self, snapshot: &Snapshot);
}

impl<F> FrameObserver for F
where
    F: FnMut(&Snapshot),
{
    fn on_frame(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl FrameObserver for NullObserver {
    fn on_frame(&mut self, _snapshot: &Snapshot) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepPlan {
    pub ticks: u32,
    pub dropped: Duration,
}

/// Accumulates frame time and releases it in whole ticks.
#[derive(Clone, Debug)]
pub struct FixedTimestep {
    tick: Duration,
    accumulator: Duration,
    max_ticks: u32,
}

impl FixedTimestep {
    pub fn new(tick: Duration, max_ticks: u32) -> Self {
        Self {
            tick: if tick.is_zero() {
                Duration::from_millis(1)
            } else {
                tick
            },
            accumulator: Duration::ZERO,
            max_ticks: max_ticks.max(1),
        }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn accumulated(&self) -> Duration {
        self.accumulator
    }

    /// Backlog beyond `max_ticks` is dropped rather than replayed, so a long
    /// stall does not turn into a burst of catch-up ticks.
    pub fn advance(&mut self, elapsed: Duration) -> StepPlan {
        let mut accumulator = self.accumulator.saturating_add(elapsed);
        let mut ticks = 0u32;
        while accumulator >= self.tick && ticks < self.max_ticks {
            accumulator -= self.tick;
            ticks += 1;
        }

        let mut dropped = Duration::ZERO;
        if accumulator >= self.tick {
            dropped = accumulator;
            accumulator = Duration::ZERO;
        }
        self.accumulator = accumulator;
        StepPlan { ticks, dropped }
    }
}

pub struct GameLoop {
    engine: GameEngine,
    timestep: FixedTimestep,
    tick_budget: Duration,
    hud_skipped: u64,
}

impl GameLoop {
    pub fn new(engine: GameEngine) -> Self {
        let tick = Duration::from_millis(engine.config().tick_ms);
        Self {
            engine,
            timestep: FixedTimestep::new(tick, MAX_TICKS_PER_FRAME),
            tick_budget: tick,
            hud_skipped: 0,
        }
    }

    pub fn with_tick_budget(mut self, budget: Duration) -> Self {
        self.tick_budget = budget;
        self
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GameEngine {
        &mut self.engine
    }

    pub fn hud_skipped(&self) -> u64 {
        self.hud_skipped
    }

    /// One fixed tick: poll, step, notify. A tick that overruns its budget
    /// keeps its events queued for the next notification.
    pub fn run_tick(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        input: &mut dyn InputSource,
        observer: &mut dyn FrameObserver,
    ) -> Result<(), EngineError> {
        let inputs = input.poll(&self.engine.peek_snapshot());
        let started = Instant::now();
        self.engine.step(desktop, &inputs)?;

        let spent = started.elapsed();
        if spent > self.tick_budget && !self.engine.is_ended() {
            self.hud_skipped += 1;
            debug!(
                tick = self.engine.tick(),
                spent_ms = spent.as_millis() as u64,
                "tick over budget; hud frame skipped"
            );
            return Ok(());
        }
        let snapshot = self.engine.build_snapshot(true);
        observer.on_frame(&snapshot);
        Ok(())
    }

    /// Runs as many ticks as `elapsed` wall-clock time pays for.
    pub fn run_frame(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        input: &mut dyn InputSource,
        observer: &mut dyn FrameObserver,
        elapsed: Duration,
    ) -> Result<u32, EngineError> {
        let plan = self.timestep.advance(elapsed);
        if !plan.dropped.is_zero() {
            warn!(
                dropped_backlog_ms = plan.dropped.as_millis() as u64,
                max_ticks_per_frame = MAX_TICKS_PER_FRAME,
                "frame backlog dropped"
            );
        }

        let mut ran = 0;
        for _ in 0..plan.ticks {
            if self.engine.is_ended() {
                break;
            }
            self.run_tick(desktop, input, observer)?;
            ran += 1;
        }
        Ok(ran)
    }

    /// Headless driver: ticks back to back until the session ends or
    /// `max_ticks` is reached. Windows are closed on every exit path.
    pub fn run_to_end(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        input: &mut dyn InputSource,
        observer: &mut dyn FrameObserver,
        max_ticks: u64,
    ) -> Result<SessionSummary, EngineError> {
        let result = self.drive(desktop, input, observer, max_ticks);
        self.close(desktop, result)
    }

    fn drive(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        input: &mut dyn InputSource,
        observer: &mut dyn FrameObserver,
        max_ticks: u64,
    ) -> Result<(), EngineError> {
        while !self.engine.is_ended() && self.engine.tick() < max_ticks {
            let before = self.engine.tick();
            self.run_tick(desktop, input, observer)?;
            if self.engine.tick() == before && self.engine.is_paused() {
                // nothing else will unpause a headless run
                debug!(tick = before, "headless run left paused");
                break;
            }
        }
        Ok(())
    }

    /// Real-time driver paced by a tokio interval. Ctrl-C quits the session
    /// the same way the quit key does.
    pub async fn run_paced(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        input: &mut dyn InputSource,
        observer: &mut dyn FrameObserver,
        max_ticks: u64,
    ) -> Result<SessionSummary, EngineError> {
        let mut interval = tokio::time::interval(self.timestep.tick());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut last_frame = tokio::time::Instant::now();

        let result = loop {
            if self.engine.is_ended() || self.engine.tick() >= max_ticks {
                break Ok(());
            }
            tokio::select! {
                _ = interval.tick() => {
                    let now = tokio::time::Instant::now();
                    let elapsed = now.saturating_duration_since(last_frame);
                    last_frame = now;
                    if let Err(err) = self.run_frame(desktop, input, observer, elapsed) {
                        break Err(err);
                    }
                }
                _ = &mut ctrl_c => {
                    info!(tick = self.engine.tick(), "interrupted; quitting session");
                    break self.engine.step(desktop, &[InputEvent::Quit]);
                }
            }
        };
        self.close(desktop, result)
    }

    fn close(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        result: Result<(), EngineError>,
    ) -> Result<SessionSummary, EngineError> {
        let closed = self.engine.shutdown(desktop);
        match result {
            Ok(()) => {
                let summary = self.engine.build_summary();
                info!(
                    closed,
                    reason = ?summary.reason,
                    total_score = summary.total_score,
                    hud_skipped = self.hud_skipped,
                    "session finished"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(closed, error = %err, "session aborted");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LevelTable, SessionConfig};
    use crate::desktop::{ScreenRect, VirtualDesktop, WindowError, WindowHandle, WindowSpec};
    use crate::types::{Phase, Rect, RuntimeEvent};

    fn config() -> SessionConfig {
        SessionConfig {
            level_intro_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn game(desktop: &mut VirtualDesktop) -> GameLoop {
        let engine =
            GameEngine::new(config(), LevelTable::default(), 11, desktop).expect("engine");
        GameLoop::new(engine)
    }

    fn idle(_: &Snapshot) -> Vec<InputEvent> {
        Vec::new()
    }

    /// Wraps the virtual desktop and stalls on every bounds query.
    struct SlowDesktop {
        inner: VirtualDesktop,
        delay: Duration,
    }

    impl WindowAdapter for SlowDesktop {
        fn create(&mut self, spec: &WindowSpec) -> Result<WindowHandle, WindowError> {
            self.inner.create(spec)
        }

        fn move_to(&mut self, handle: WindowHandle, x: i32, y: i32) -> Result<(), WindowError> {
            self.inner.move_to(handle, x, y)
        }

        fn resize(&mut self, handle: WindowHandle, w: u32, h: u32) -> Result<(), WindowError> {
            self.inner.resize(handle, w, h)
        }

        fn close(&mut self, handle: WindowHandle) -> Result<(), WindowError> {
            self.inner.close(handle)
        }

        fn query_bounds(&self, handle: WindowHandle) -> Result<ScreenRect, WindowError> {
            std::thread::sleep(self.delay);
            self.inner.query_bounds(handle)
        }

        fn screen(&self) -> Rect {
            self.inner.screen()
        }
    }

    #[test]
    fn timestep_releases_whole_ticks_and_keeps_the_rest() {
        let mut timestep = FixedTimestep::new(Duration::from_millis(33), 5);
        let plan = timestep.advance(Duration::from_millis(80));
        assert_eq!(plan.ticks, 2);
        assert!(plan.dropped.is_zero());
        assert_eq!(timestep.accumulated(), Duration::from_millis(14));

        let plan = timestep.advance(Duration::from_millis(19));
        assert_eq!(plan.ticks, 1);
        assert_eq!(timestep.accumulated(), Duration::ZERO);
    }

    #[test]
    fn timestep_drops_backlog_beyond_the_frame_limit() {
        let mut timestep = FixedTimestep::new(Duration::from_millis(33), 5);
        let plan = timestep.advance(Duration::from_millis(1_000));
        assert_eq!(plan.ticks, 5);
        assert_eq!(plan.dropped, Duration::from_millis(835));
        assert_eq!(timestep.accumulated(), Duration::ZERO);
    }

    #[test]
    fn every_tick_notifies_the_observer() {
        let mut desktop = VirtualDesktop::default();
        let mut game = game(&mut desktop).with_tick_budget(Duration::from_secs(3_600));
        let mut frames = Vec::new();
        let mut record = |snapshot: &Snapshot| frames.push(snapshot.tick);
        let mut input = idle;

        let ran = game
            .run_frame(&mut desktop, &mut input, &mut record, Duration::from_millis(99))
            .expect("frame");
        assert_eq!(ran, 3);
        assert_eq!(frames, vec![1, 2, 3]);
        assert_eq!(game.hud_skipped(), 0);
    }

    #[test]
    fn overrun_tick_skips_hud_but_keeps_events() {
        let mut inner = VirtualDesktop::default();
        let engine = GameEngine::new(config(), LevelTable::default(), 5, &mut inner)
            .expect("engine");
        let mut desktop = SlowDesktop {
            inner,
            delay: Duration::from_millis(5),
        };
        let mut game = GameLoop::new(engine).with_tick_budget(Duration::from_millis(1));
        let mut frames: Vec<Snapshot> = Vec::new();
        let mut input = idle;

        {
            let mut record = |snapshot: &Snapshot| frames.push(snapshot.clone());
            game.run_tick(&mut desktop, &mut input, &mut record)
                .expect("tick");
        }
        assert!(frames.is_empty());
        assert_eq!(game.hud_skipped(), 1);
        assert_eq!(game.engine().tick(), 1);

        game.tick_budget = Duration::from_secs(3_600);
        {
            let mut record = |snapshot: &Snapshot| frames.push(snapshot.clone());
            game.run_tick(&mut desktop, &mut input, &mut record)
                .expect("tick");
        }
        assert_eq!(frames.len(), 1);
        assert!(frames[0]
            .events
            .iter()
            .any(|e| matches!(e, RuntimeEvent::LevelStarted { level: 1 })));
    }

    #[test]
    fn run_to_end_closes_every_window() {
        let mut desktop = VirtualDesktop::default();
        let mut game = game(&mut desktop);
        let mut input = idle;
        let summary = game
            .run_to_end(&mut desktop, &mut input, &mut NullObserver, 300)
            .expect("run");
        assert_eq!(summary.ticks, 300);
        assert_eq!(desktop.open_count(), 0);
        assert!(game.engine().is_ended());
    }

    #[test]
    fn quit_input_stops_the_headless_driver() {
        let mut desktop = VirtualDesktop::default();
        let mut game = game(&mut desktop);
        let mut input = |view: &Snapshot| {
            if view.tick >= 50 {
                vec![InputEvent::Quit]
            } else {
                Vec::new()
            }
        };
        let summary = game
            .run_to_end(&mut desktop, &mut input, &mut NullObserver, 10_000)
            .expect("run");
        assert_eq!(summary.ticks, 50);
        assert_eq!(game.engine().phase(), Phase::GameOver);
        assert_eq!(desktop.open_count(), 0);
    }

    #[test]
    fn paused_headless_run_does_not_spin() {
        let mut desktop = VirtualDesktop::default();
        let mut game = game(&mut desktop);
        let mut input = |view: &Snapshot| {
            if view.tick == 10 && !view.paused {
                vec![InputEvent::Pause]
            } else {
                Vec::new()
            }
        };
        let summary = game
            .run_to_end(&mut desktop, &mut input, &mut NullObserver, 10_000)
            .expect("run");
        assert_eq!(summary.ticks, 10);
        assert_eq!(desktop.open_count(), 0);
    }

    #[tokio::test]
    async fn paced_driver_runs_in_real_time() {
        let mut desktop = VirtualDesktop::default();
        let mut game = game(&mut desktop);
        let mut input = idle;
        let started = std::time::Instant::now();
        let summary = game
            .run_paced(&mut desktop, &mut input, &mut NullObserver, 6)
            .await
            .expect("paced run");
        assert!(summary.ticks >= 6);
        assert!(started.elapsed() >= Duration::from_millis(33 * 5));
        assert_eq!(desktop.open_count(), 0);
    }
}
