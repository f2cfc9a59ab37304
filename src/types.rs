use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

pub type EntityId = u64;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len <= f32::EPSILON {
            return Vec2::ZERO;
        }
        Vec2::new(self.x / len, self.y / len)
    }

    pub fn clamp_length(self, max: f32) -> Vec2 {
        let len = self.length();
        if len <= max || len <= f32::EPSILON {
            return self;
        }
        self * (max / len)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle in screen pixels, origin at the top-left corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn at(position: Vec2, size: Vec2) -> Self {
        Self::new(position.x, position.y, size.x, size.y)
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.w, self.h)
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Strict overlap; rectangles sharing only an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn inflate(&self, margin: f32) -> Rect {
        Rect::new(
            self.x - margin,
            self.y - margin,
            self.w + margin * 2.0,
            self.h + margin * 2.0,
        )
    }

    /// Moves the rectangle the least amount needed to sit inside `bounds`.
    pub fn clamped_inside(&self, bounds: &Rect) -> Rect {
        let max_x = (bounds.right() - self.w).max(bounds.x);
        let max_y = (bounds.bottom() - self.h).max(bounds.y);
        Rect::new(
            self.x.clamp(bounds.x, max_x),
            self.y.clamp(bounds.y, max_y),
            self.w,
            self.h,
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetVariant {
    Standard,
    Moving,
    Evasive,
    Boss,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleVariant {
    Barrier,
    Trap,
    Decoy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerupKind {
    Speed,
    Magnet,
    Shield,
    Time,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "variant", rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Target(TargetVariant),
    Obstacle(ObstacleVariant),
    Powerup(PowerupKind),
}

impl EntityKind {
    pub fn category(&self) -> Option<Category> {
        match self {
            EntityKind::Player => None,
            EntityKind::Target(_) => Some(Category::Target),
            EntityKind::Obstacle(_) => Some(Category::Obstacle),
            EntityKind::Powerup(_) => Some(Category::Powerup),
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self, EntityKind::Player)
    }
}

/// Spawn bucket; every non-player kind belongs to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Target,
    Obstacle,
    Powerup,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Target, Category::Obstacle, Category::Powerup];

    pub fn index(self) -> usize {
        match self {
            Category::Target => 0,
            Category::Obstacle => 1,
            Category::Powerup => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Speed,
    Magnet,
    Shield,
    Time,
    Freeze,
}

impl From<PowerupKind> for EffectKind {
    fn from(kind: PowerupKind) -> Self {
        match kind {
            PowerupKind::Speed => EffectKind::Speed,
            PowerupKind::Magnet => EffectKind::Magnet,
            PowerupKind::Shield => EffectKind::Shield,
            PowerupKind::Time => EffectKind::Time,
        }
    }
}

/// Discrete per-tick input. Movement is a direction vector; its length is
/// clamped to 1 by the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputEvent {
    Move(Vec2),
    Dash,
    Pause,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LevelIntro,
    Active,
    LevelComplete,
    GameOver,
    Win,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::GameOver | Phase::Win)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOverReason {
    Victory,
    Defeated,
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DespawnCause {
    Captured,
    Collected,
    Sprung,
    Expired,
    LevelTransition,
}

#[derive(Clone, Debug, Serialize)]
pub struct EntityView {
    pub id: EntityId,
    pub kind: EntityKind,
    pub rect: Rect,
    pub velocity: Vec2,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(rename = "expiresAtMs", skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EffectView {
    pub kind: EffectKind,
    #[serde(rename = "remainingMs")]
    pub remaining_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PlayerView {
    pub id: EntityId,
    pub rect: Rect,
    pub velocity: Vec2,
    pub health: i32,
    #[serde(rename = "maxHealth")]
    pub max_health: i32,
    #[serde(rename = "dashCooldownMs")]
    pub dash_cooldown_ms: u64,
    pub dashing: bool,
    pub effects: Vec<EffectView>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    EntitySpawned {
        id: EntityId,
        kind: EntityKind,
    },
    SpawnSkipped {
        kind: EntityKind,
        reason: String,
    },
    EntityDespawned {
        id: EntityId,
        kind: EntityKind,
        cause: DespawnCause,
    },
    TargetCaptured {
        id: EntityId,
        variant: TargetVariant,
        points: i32,
    },
    BossHit {
        id: EntityId,
        hp: i32,
    },
    PlayerBlocked {
        by: EntityId,
    },
    PlayerFrozen {
        by: EntityId,
        #[serde(rename = "untilMs")]
        until_ms: u64,
    },
    PlayerDamaged {
        by: EntityId,
        health: i32,
    },
    EffectApplied {
        kind: EffectKind,
        #[serde(rename = "untilMs")]
        until_ms: u64,
        refreshed: bool,
    },
    EffectExpired {
        kind: EffectKind,
    },
    DashStarted,
    LevelCompleted {
        level: u8,
    },
    LevelStarted {
        level: u8,
    },
    GameOver {
        reason: GameOverReason,
    },
}

/// Read-only view handed to the HUD after a tick completes.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    pub phase: Phase,
    pub paused: bool,
    pub level: u8,
    #[serde(rename = "levelScore")]
    pub level_score: i32,
    #[serde(rename = "levelThreshold")]
    pub level_threshold: i32,
    #[serde(rename = "totalScore")]
    pub total_score: i32,
    pub player: PlayerView,
    pub entities: Vec<EntityView>,
    pub events: Vec<RuntimeEvent>,
}

/// What the persistence collaborator may read at any time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub level: u8,
    #[serde(rename = "totalScore")]
    pub total_score: i32,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub reason: GameOverReason,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub ticks: u64,
    #[serde(rename = "levelReached")]
    pub level_reached: u8,
    #[serde(rename = "levelsCompleted")]
    pub levels_completed: u32,
    #[serde(rename = "totalScore")]
    pub total_score: i32,
    #[serde(rename = "targetsCaptured")]
    pub targets_captured: u32,
    #[serde(rename = "bossesDefeated")]
    pub bosses_defeated: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(100.0, 0.0, 50.0, 50.0);
        assert!(!a.overlaps(&b));
        let c = Rect::new(99.0, 99.0, 50.0, 50.0);
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&a));
    }

    #[test]
    fn clamped_inside_keeps_rect_on_screen() {
        let screen = Rect::new(0.0, 0.0, 1920.0, 1080.0);
        let off = Rect::new(1900.0, -40.0, 100.0, 100.0);
        let fixed = off.clamped_inside(&screen);
        assert_eq!(fixed.position(), Vec2::new(1820.0, 0.0));
        assert_eq!(fixed.size(), off.size());
    }

    #[test]
    fn clamp_length_only_shrinks() {
        let v = Vec2::new(30.0, 40.0);
        assert_eq!(v.clamp_length(100.0), v);
        let short = v.clamp_length(5.0);
        assert!((short.length() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn entity_kind_maps_to_spawn_category() {
        assert_eq!(EntityKind::Player.category(), None);
        assert_eq!(
            EntityKind::Target(TargetVariant::Boss).category(),
            Some(Category::Target)
        );
        assert_eq!(
            EntityKind::Powerup(PowerupKind::Time).category(),
            Some(Category::Powerup)
        );
    }
}
