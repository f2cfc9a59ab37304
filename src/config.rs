use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DASH_COOLDOWN_MS, DASH_MULTIPLIER, DASH_TICKS, LEVEL_INTRO_MS, MAGNET_EFFECT_MS, MAGNET_FORCE,
    MAGNET_RADIUS, MAX_LEVEL, PLAYER_INVULNERABLE_MS, SHIELD_EFFECT_MS, SPEED_EFFECT_MS,
    SPEED_EFFECT_MULTIPLIER, TICK_MS, TIME_EFFECT_MS, TIME_SLOWDOWN, TRAP_FREEZE_MS,
};
use crate::types::{Category, EffectKind, ObstacleVariant, PowerupKind, TargetVariant};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse level table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("level table must list exactly {expected} levels, found {actual}")]
    LevelCount { expected: usize, actual: usize },
    #[error("level entry {index} declares level {declared}; levels must be listed 1..=10 in order")]
    LevelOrder { index: usize, declared: u8 },
    #[error("level {level}: {field} must be {requirement}")]
    InvalidValue {
        level: u8,
        field: &'static str,
        requirement: &'static str,
    },
    #[error("level {level}: {field} decreases from the previous level")]
    NotMonotonic { level: u8, field: &'static str },
    #[error("level {level}: {category:?} cap is positive but every weight is zero")]
    EmptyMix { level: u8, category: Category },
    #[error("session setting {field} must be {requirement}")]
    InvalidSetting {
        field: &'static str,
        requirement: &'static str,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetMix {
    pub standard: f32,
    pub moving: f32,
    pub evasive: f32,
    pub boss: f32,
}

impl TargetMix {
    pub fn weighted(&self) -> [(TargetVariant, f32); 4] {
        [
            (TargetVariant::Standard, self.standard),
            (TargetVariant::Moving, self.moving),
            (TargetVariant::Evasive, self.evasive),
            (TargetVariant::Boss, self.boss),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleMix {
    pub barrier: f32,
    pub trap: f32,
    pub decoy: f32,
}

impl ObstacleMix {
    pub fn weighted(&self) -> [(ObstacleVariant, f32); 3] {
        [
            (ObstacleVariant::Barrier, self.barrier),
            (ObstacleVariant::Trap, self.trap),
            (ObstacleVariant::Decoy, self.decoy),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PowerupMix {
    pub speed: f32,
    pub magnet: f32,
    pub shield: f32,
    pub time: f32,
}

impl PowerupMix {
    pub fn weighted(&self) -> [(PowerupKind, f32); 4] {
        [
            (PowerupKind::Speed, self.speed),
            (PowerupKind::Magnet, self.magnet),
            (PowerupKind::Shield, self.shield),
            (PowerupKind::Time, self.time),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub cap: usize,
    #[serde(rename = "intervalMs")]
    pub interval_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelParams {
    pub level: u8,
    pub threshold: i32,
    #[serde(rename = "speedMultiplier")]
    pub speed_multiplier: f32,
    pub targets: CategoryRule,
    pub obstacles: CategoryRule,
    pub powerups: CategoryRule,
    #[serde(rename = "targetMix")]
    pub target_mix: TargetMix,
    #[serde(rename = "obstacleMix")]
    pub obstacle_mix: ObstacleMix,
    #[serde(rename = "powerupMix")]
    pub powerup_mix: PowerupMix,
}

impl LevelParams {
    pub fn rule(&self, category: Category) -> CategoryRule {
        match category {
            Category::Target => self.targets,
            Category::Obstacle => self.obstacles,
            Category::Powerup => self.powerups,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct LevelTableFile {
    levels: Vec<LevelParams>,
}

/// Validated, immutable per-level parameters. The only way to obtain one is
/// through a constructor that runs [`LevelTable::validate`].
#[derive(Clone, Debug, PartialEq)]
pub struct LevelTable {
    levels: Vec<LevelParams>,
}

impl LevelTable {
    pub fn new(levels: Vec<LevelParams>) -> Result<Self, ConfigError> {
        let table = Self { levels };
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let file: LevelTableFile = serde_json::from_str(text)?;
        Self::new(file.levels)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&LevelTableFile {
            levels: self.levels.clone(),
        })?)
    }

    /// Parameters for a 1-based level; out-of-range ordinals clamp.
    pub fn level(&self, level: u8) -> &LevelParams {
        let idx = (level.max(1) as usize - 1).min(self.levels.len() - 1);
        &self.levels[idx]
    }

    pub fn max_level(&self) -> u8 {
        self.levels.len() as u8
    }

    pub fn levels(&self) -> &[LevelParams] {
        &self.levels
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.levels.len() != MAX_LEVEL as usize {
            return Err(ConfigError::LevelCount {
                expected: MAX_LEVEL as usize,
                actual: self.levels.len(),
            });
        }

        let mut previous: Option<&LevelParams> = None;
        for (index, params) in self.levels.iter().enumerate() {
            if params.level as usize != index + 1 {
                return Err(ConfigError::LevelOrder {
                    index,
                    declared: params.level,
                });
            }
            validate_level(params)?;
            if let Some(prev) = previous {
                validate_progression(prev, params)?;
            }
            previous = Some(params);
        }
        Ok(())
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            levels: default_levels(),
        }
    }
}

fn invalid(level: u8, field: &'static str, requirement: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        level,
        field,
        requirement,
    }
}

fn validate_level(params: &LevelParams) -> Result<(), ConfigError> {
    let level = params.level;
    if params.threshold <= 0 {
        return Err(invalid(level, "threshold", "positive"));
    }
    if !params.speed_multiplier.is_finite() || params.speed_multiplier <= 0.0 {
        return Err(invalid(level, "speedMultiplier", "a positive number"));
    }
    for category in Category::ALL {
        let rule = params.rule(category);
        if rule.cap > 0 && rule.interval_ms == 0 {
            return Err(invalid(level, "intervalMs", "positive when cap > 0"));
        }
    }

    let target_weights: Vec<f32> = params.target_mix.weighted().iter().map(|e| e.1).collect();
    let obstacle_weights: Vec<f32> = params.obstacle_mix.weighted().iter().map(|e| e.1).collect();
    let powerup_weights: Vec<f32> = params.powerup_mix.weighted().iter().map(|e| e.1).collect();
    for (category, weights) in [
        (Category::Target, target_weights),
        (Category::Obstacle, obstacle_weights),
        (Category::Powerup, powerup_weights),
    ] {
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid(level, "mix weight", "finite and non-negative"));
        }
        if params.rule(category).cap > 0 && weights.iter().all(|w| *w == 0.0) {
            return Err(ConfigError::EmptyMix { level, category });
        }
    }
    Ok(())
}

fn validate_progression(prev: &LevelParams, next: &LevelParams) -> Result<(), ConfigError> {
    let level = next.level;
    if next.threshold < prev.threshold {
        return Err(ConfigError::NotMonotonic {
            level,
            field: "threshold",
        });
    }
    if next.speed_multiplier < prev.speed_multiplier {
        return Err(ConfigError::NotMonotonic {
            level,
            field: "speedMultiplier",
        });
    }
    for (category, field_cap, field_interval) in [
        (Category::Target, "targets.cap", "targets.intervalMs"),
        (Category::Obstacle, "obstacles.cap", "obstacles.intervalMs"),
        (Category::Powerup, "powerups.cap", "powerups.intervalMs"),
    ] {
        let (a, b) = (prev.rule(category), next.rule(category));
        if b.cap < a.cap {
            return Err(ConfigError::NotMonotonic {
                level,
                field: field_cap,
            });
        }
        // a category that was disabled may start at any interval
        if a.cap > 0 && b.interval_ms > a.interval_ms {
            return Err(ConfigError::NotMonotonic {
                level,
                field: field_interval,
            });
        }
    }
    Ok(())
}

const THRESHOLDS: [i32; 10] = [100, 150, 200, 260, 330, 400, 480, 560, 650, 750];
const TARGET_CAPS: [usize; 10] = [3, 4, 5, 6, 6, 7, 8, 8, 9, 10];
const TARGET_INTERVALS: [u64; 10] = [2000, 1900, 1800, 1700, 1600, 1500, 1400, 1300, 1200, 1100];
const OBSTACLE_CAPS: [usize; 10] = [0, 1, 2, 2, 3, 3, 4, 4, 5, 5];
const OBSTACLE_INTERVALS: [u64; 10] = [4000, 4000, 3800, 3600, 3400, 3200, 3000, 2800, 2600, 2500];
const POWERUP_CAPS: [usize; 10] = [1, 1, 1, 1, 2, 2, 2, 2, 2, 2];
const POWERUP_INTERVALS: [u64; 10] = [8000, 8000, 7800, 7600, 7400, 7200, 7000, 6600, 6300, 6000];
const TARGET_MIXES: [[f32; 4]; 10] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.7, 0.3, 0.0, 0.0],
    [0.5, 0.4, 0.1, 0.0],
    [0.4, 0.4, 0.2, 0.0],
    [0.3, 0.4, 0.2, 0.1],
    [0.2, 0.3, 0.4, 0.1],
    [0.1, 0.3, 0.4, 0.2],
    [0.1, 0.2, 0.4, 0.3],
    [0.0, 0.2, 0.5, 0.3],
    [0.0, 0.1, 0.4, 0.5],
];
const OBSTACLE_MIXES: [[f32; 3]; 10] = [
    [0.0, 0.0, 0.0],
    [0.7, 0.0, 0.3],
    [0.6, 0.1, 0.3],
    [0.5, 0.2, 0.3],
    [0.4, 0.3, 0.3],
    [0.4, 0.4, 0.2],
    [0.3, 0.5, 0.2],
    [0.3, 0.6, 0.1],
    [0.2, 0.7, 0.1],
    [0.2, 0.8, 0.0],
];

fn default_levels() -> Vec<LevelParams> {
    (0..MAX_LEVEL as usize)
        .map(|idx| {
            let t = TARGET_MIXES[idx];
            let o = OBSTACLE_MIXES[idx];
            LevelParams {
                level: idx as u8 + 1,
                threshold: THRESHOLDS[idx],
                speed_multiplier: 1.0 + idx as f32 * 0.05,
                targets: CategoryRule {
                    cap: TARGET_CAPS[idx],
                    interval_ms: TARGET_INTERVALS[idx],
                },
                obstacles: CategoryRule {
                    cap: OBSTACLE_CAPS[idx],
                    interval_ms: OBSTACLE_INTERVALS[idx],
                },
                powerups: CategoryRule {
                    cap: POWERUP_CAPS[idx],
                    interval_ms: POWERUP_INTERVALS[idx],
                },
                target_mix: TargetMix {
                    standard: t[0],
                    moving: t[1],
                    evasive: t[2],
                    boss: t[3],
                },
                obstacle_mix: ObstacleMix {
                    barrier: o[0],
                    trap: o[1],
                    decoy: o[2],
                },
                powerup_mix: PowerupMix {
                    speed: 0.3,
                    magnet: 0.3,
                    shield: 0.2,
                    time: 0.2,
                },
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }

    pub fn player_health(self) -> i32 {
        match self {
            Difficulty::Easy => 5,
            Difficulty::Medium => 3,
            Difficulty::Hard => 2,
            Difficulty::Expert => 1,
        }
    }

    /// (entity speed multiplier, score multiplier)
    pub fn multipliers(self) -> (f32, f32) {
        match self {
            Difficulty::Easy => (0.8, 0.8),
            Difficulty::Medium => (1.0, 1.0),
            Difficulty::Hard => (1.2, 1.2),
            Difficulty::Expert => (1.5, 1.5),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityConfig {
    pub dash_multiplier: f32,
    pub dash_ticks: u32,
    pub dash_cooldown_ms: u64,
    pub invulnerable_ms: u64,
    pub speed_multiplier: f32,
    pub speed_ms: u64,
    pub magnet_radius: f32,
    pub magnet_force: f32,
    pub magnet_ms: u64,
    pub shield_ms: u64,
    pub time_slowdown: f32,
    pub time_ms: u64,
    pub freeze_ms: u64,
}

impl AbilityConfig {
    pub fn duration_ms(&self, kind: EffectKind) -> u64 {
        match kind {
            EffectKind::Speed => self.speed_ms,
            EffectKind::Magnet => self.magnet_ms,
            EffectKind::Shield => self.shield_ms,
            EffectKind::Time => self.time_ms,
            EffectKind::Freeze => self.freeze_ms,
        }
    }
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            dash_multiplier: DASH_MULTIPLIER,
            dash_ticks: DASH_TICKS,
            dash_cooldown_ms: DASH_COOLDOWN_MS,
            invulnerable_ms: PLAYER_INVULNERABLE_MS,
            speed_multiplier: SPEED_EFFECT_MULTIPLIER,
            speed_ms: SPEED_EFFECT_MS,
            magnet_radius: MAGNET_RADIUS,
            magnet_force: MAGNET_FORCE,
            magnet_ms: MAGNET_EFFECT_MS,
            shield_ms: SHIELD_EFFECT_MS,
            time_slowdown: TIME_SLOWDOWN,
            time_ms: TIME_EFFECT_MS,
            freeze_ms: TRAP_FREEZE_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub difficulty: Difficulty,
    pub tick_ms: u64,
    pub level_intro_ms: u64,
    pub abilities: AbilityConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            tick_ms: TICK_MS,
            level_intro_ms: LEVEL_INTRO_MS,
            abilities: AbilityConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.abilities;
        if self.tick_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "tick_ms",
                requirement: "positive",
            });
        }
        if a.dash_ticks == 0 || !(a.dash_multiplier >= 1.0) {
            return Err(ConfigError::InvalidSetting {
                field: "dash",
                requirement: "at least one tick with a multiplier >= 1",
            });
        }
        for (field, value) in [
            ("speed_multiplier", a.speed_multiplier),
            ("magnet_radius", a.magnet_radius),
            ("magnet_force", a.magnet_force),
            ("time_slowdown", a.time_slowdown),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidSetting {
                    field,
                    requirement: "a positive number",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid_and_monotonic() {
        let table = LevelTable::default();
        table.validate().expect("default table validates");
        assert_eq!(table.max_level(), 10);
        assert_eq!(table.level(1).threshold, 100);
        assert_eq!(table.level(1).obstacles.cap, 0);
        assert_eq!(table.level(42).level, 10);
    }

    #[test]
    fn json_round_trip_preserves_table() {
        let table = LevelTable::default();
        let text = table.to_json_pretty().expect("serialize");
        let parsed = LevelTable::from_json_str(&text).expect("parse");
        assert_eq!(parsed, table);
    }

    #[test]
    fn rejects_decreasing_caps() {
        let mut levels = default_levels();
        levels[4].targets.cap = 1;
        let err = LevelTable::new(levels).expect_err("cap drop must fail");
        assert!(matches!(
            err,
            ConfigError::NotMonotonic {
                level: 5,
                field: "targets.cap"
            }
        ));
    }

    #[test]
    fn rejects_negative_threshold() {
        let mut levels = default_levels();
        levels[0].threshold = -5;
        assert!(matches!(
            LevelTable::new(levels),
            Err(ConfigError::InvalidValue {
                level: 1,
                field: "threshold",
                ..
            })
        ));
    }

    #[test]
    fn rejects_out_of_order_levels() {
        let mut levels = default_levels();
        levels.swap(2, 3);
        assert!(matches!(
            LevelTable::new(levels),
            Err(ConfigError::LevelOrder { index: 2, .. })
        ));
    }

    #[test]
    fn rejects_wrong_level_count() {
        let mut levels = default_levels();
        levels.pop();
        assert!(matches!(
            LevelTable::new(levels),
            Err(ConfigError::LevelCount {
                expected: 10,
                actual: 9
            })
        ));
    }

    #[test]
    fn rejects_enabled_category_without_weights() {
        let mut levels = default_levels();
        levels[0].obstacles.cap = 1;
        assert!(matches!(
            LevelTable::new(levels),
            Err(ConfigError::EmptyMix {
                level: 1,
                category: Category::Obstacle
            })
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            LevelTable::from_json_str("{\"levels\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn session_defaults_validate_and_partial_json_fills_defaults() {
        SessionConfig::default().validate().expect("defaults");
        let parsed: SessionConfig =
            serde_json::from_str(r#"{"difficulty":"hard","abilities":{"shield_ms":9000}}"#)
                .expect("parse");
        assert_eq!(parsed.difficulty, Difficulty::Hard);
        assert_eq!(parsed.abilities.shield_ms, 9000);
        assert_eq!(parsed.abilities.dash_ticks, DASH_TICKS);
        assert_eq!(parsed.tick_ms, TICK_MS);
    }

    #[test]
    fn session_rejects_zero_tick() {
        let config = SessionConfig {
            tick_ms: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
