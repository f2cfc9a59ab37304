use tracing::info;

use crate::config::{LevelParams, LevelTable};
use crate::types::{GameOverReason, Phase};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    LevelCompleted { completed: u8, next: u8 },
    Ended(GameOverReason),
}

/// Level state machine and score bookkeeping for one session.
#[derive(Clone, Debug)]
pub struct DifficultyController {
    table: LevelTable,
    level: u8,
    phase: Phase,
    level_score: i32,
    total_score: i32,
    intro_ms: u64,
    intro_remaining_ms: u64,
    levels_completed: u32,
    end_reason: Option<GameOverReason>,
}

impl DifficultyController {
    pub fn new(table: LevelTable, intro_ms: u64) -> Self {
        Self {
            table,
            level: 1,
            phase: Phase::LevelIntro,
            level_score: 0,
            total_score: 0,
            intro_ms,
            intro_remaining_ms: intro_ms,
            levels_completed: 0,
            end_reason: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn params(&self) -> &LevelParams {
        self.table.level(self.level)
    }

    pub fn level_score(&self) -> i32 {
        self.level_score
    }

    pub fn total_score(&self) -> i32 {
        self.total_score
    }

    pub fn levels_completed(&self) -> u32 {
        self.levels_completed
    }

    pub fn end_reason(&self) -> Option<GameOverReason> {
        self.end_reason
    }

    pub fn add_score(&mut self, points: i32) {
        self.level_score += points;
        self.total_score += points;
    }

    /// Moves a completed level into its successor's intro.
    pub fn begin_next_level(&mut self) {
        if self.phase != Phase::LevelComplete {
            return;
        }
        self.phase = Phase::LevelIntro;
        self.intro_remaining_ms = self.intro_ms;
    }

    /// Counts down the intro. Returns true on the tick the level goes active.
    pub fn advance_intro(&mut self, dt_ms: u64) -> bool {
        if self.phase != Phase::LevelIntro {
            return false;
        }
        self.intro_remaining_ms = self.intro_remaining_ms.saturating_sub(dt_ms);
        if self.intro_remaining_ms > 0 {
            return false;
        }
        self.phase = Phase::Active;
        info!(level = self.level, "level started");
        true
    }

    pub fn evaluate(&mut self, player_health: i32) -> Verdict {
        if self.phase != Phase::Active {
            return Verdict::Continue;
        }
        if player_health <= 0 {
            return self.end(Phase::GameOver, GameOverReason::Defeated);
        }
        if self.level_score < self.params().threshold {
            return Verdict::Continue;
        }

        self.levels_completed += 1;
        let completed = self.level;
        if completed >= self.table.max_level() {
            return self.end(Phase::Win, GameOverReason::Victory);
        }
        self.level += 1;
        self.level_score = 0;
        self.phase = Phase::LevelComplete;
        info!(completed, next = self.level, total_score = self.total_score, "level complete");
        Verdict::LevelCompleted {
            completed,
            next: self.level,
        }
    }

    pub fn quit(&mut self) -> Verdict {
        if self.phase.is_terminal() {
            return Verdict::Continue;
        }
        self.end(Phase::GameOver, GameOverReason::Quit)
    }

    fn end(&mut self, phase: Phase, reason: GameOverReason) -> Verdict {
        self.phase = phase;
        self.end_reason = Some(reason);
        info!(?reason, level = self.level, total_score = self.total_score, "session ended");
        Verdict::Ended(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_controller() -> DifficultyController {
        let mut controller = DifficultyController::new(LevelTable::default(), 0);
        assert!(controller.advance_intro(33));
        controller
    }

    #[test]
    fn nine_standard_targets_do_not_complete_level_one() {
        let mut controller = active_controller();
        for _ in 0..9 {
            controller.add_score(10);
            assert_eq!(controller.evaluate(3), Verdict::Continue);
        }
        controller.add_score(10);
        assert_eq!(
            controller.evaluate(3),
            Verdict::LevelCompleted {
                completed: 1,
                next: 2
            }
        );
        assert_eq!(controller.phase(), Phase::LevelComplete);
        assert_eq!(controller.level_score(), 0);
        assert_eq!(controller.total_score(), 100);
    }

    #[test]
    fn intro_lasts_the_configured_delay() {
        let mut controller = DifficultyController::new(LevelTable::default(), 100);
        assert!(!controller.advance_intro(33));
        assert!(!controller.advance_intro(33));
        assert!(!controller.advance_intro(33));
        assert!(controller.advance_intro(33));
        assert_eq!(controller.phase(), Phase::Active);
        assert_eq!(controller.evaluate(3), Verdict::Continue);
    }

    #[test]
    fn completed_level_passes_through_intro() {
        let mut controller = active_controller();
        controller.add_score(100);
        controller.evaluate(3);
        controller.begin_next_level();
        assert_eq!(controller.phase(), Phase::LevelIntro);
        assert_eq!(controller.level(), 2);
        assert!(controller.advance_intro(33));
        assert_eq!(controller.params().level, 2);
    }

    #[test]
    fn zero_health_is_game_over_at_any_level() {
        let mut controller = active_controller();
        controller.add_score(500);
        assert_eq!(
            controller.evaluate(0),
            Verdict::Ended(GameOverReason::Defeated)
        );
        assert_eq!(controller.phase(), Phase::GameOver);
        assert_eq!(controller.evaluate(3), Verdict::Continue);
    }

    #[test]
    fn last_level_wins_instead_of_advancing() {
        let mut controller = active_controller();
        for _ in 1..10 {
            let threshold = controller.params().threshold;
            controller.add_score(threshold);
            assert!(matches!(
                controller.evaluate(1),
                Verdict::LevelCompleted { .. }
            ));
            controller.begin_next_level();
            controller.advance_intro(33);
        }
        assert_eq!(controller.level(), 10);
        controller.add_score(750);
        assert_eq!(
            controller.evaluate(1),
            Verdict::Ended(GameOverReason::Victory)
        );
        assert_eq!(controller.phase(), Phase::Win);
        assert_eq!(controller.levels_completed(), 10);
    }

    #[test]
    fn quit_ends_once() {
        let mut controller = active_controller();
        assert_eq!(controller.quit(), Verdict::Ended(GameOverReason::Quit));
        assert_eq!(controller.quit(), Verdict::Continue);
        assert_eq!(controller.end_reason(), Some(GameOverReason::Quit));
    }
}
