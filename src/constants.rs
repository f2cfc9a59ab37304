use crate::types::{ObstacleVariant, PowerupKind, TargetVariant, Vec2};

pub const TICK_RATE: u32 = 30;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;
pub const MAX_TICKS_PER_FRAME: u32 = 5;

pub const MAX_LEVEL: u8 = 10;
pub const LEVEL_INTRO_MS: u64 = 2_000;

pub const DEFAULT_ARENA_WIDTH: f32 = 1920.0;
pub const DEFAULT_ARENA_HEIGHT: f32 = 1080.0;

pub const PLAYER_SIZE: Vec2 = Vec2::new(100.0, 100.0);
pub const TARGET_SIZE: Vec2 = Vec2::new(200.0, 150.0);
pub const BOSS_SIZE: Vec2 = Vec2::new(300.0, 225.0);
pub const OBSTACLE_SIZE: Vec2 = Vec2::new(150.0, 150.0);
pub const POWERUP_SIZE: Vec2 = Vec2::new(75.0, 75.0);

pub const PLAYER_BASE_SPEED: f32 = 300.0;
pub const PLAYER_INVULNERABLE_MS: u64 = 2_000;

pub const DASH_MULTIPLIER: f32 = 3.0;
pub const DASH_TICKS: u32 = 6;
pub const DASH_COOLDOWN_MS: u64 = 2_000;

pub const SPEED_EFFECT_MULTIPLIER: f32 = 2.0;
pub const SPEED_EFFECT_MS: u64 = 5_000;
pub const MAGNET_RADIUS: f32 = 300.0;
pub const MAGNET_FORCE: f32 = 200.0;
pub const MAGNET_EFFECT_MS: u64 = 7_000;
pub const SHIELD_EFFECT_MS: u64 = 5_000;
pub const TIME_SLOWDOWN: f32 = 0.5;
pub const TIME_EFFECT_MS: u64 = 5_000;
pub const TRAP_FREEZE_MS: u64 = 3_000;

pub const BOSS_HEALTH: i32 = 3;
pub const BOSS_STUN_MS: u64 = 1_000;
pub const BOSS_KNOCKBACK_GAP: f32 = 24.0;
/// Pursuers never exceed this fraction of the player's base speed.
pub const PURSUIT_SPEED_RATIO: f32 = 0.6;

pub const MOVING_TURN_CHANCE: f32 = 0.02;
pub const EVADE_FALLOFF: f32 = 180.0;

pub const POWERUP_LIFETIME_MS: u64 = 10_000;

pub const SPAWN_PLAYER_CLEARANCE: f32 = 80.0;
pub const SPAWN_ATTEMPTS: usize = 24;

pub fn target_points(variant: TargetVariant) -> i32 {
    match variant {
        TargetVariant::Standard => 10,
        TargetVariant::Moving => 20,
        TargetVariant::Evasive => 30,
        TargetVariant::Boss => 50,
    }
}

pub fn target_base_speed(variant: TargetVariant) -> f32 {
    match variant {
        TargetVariant::Standard => 0.0,
        TargetVariant::Moving => 150.0,
        TargetVariant::Evasive => 220.0,
        TargetVariant::Boss => 160.0,
    }
}

pub fn target_size(variant: TargetVariant) -> Vec2 {
    if variant == TargetVariant::Boss {
        BOSS_SIZE
    } else {
        TARGET_SIZE
    }
}

pub fn obstacle_title(variant: ObstacleVariant) -> &'static str {
    match variant {
        ObstacleVariant::Barrier => "Barrier",
        ObstacleVariant::Trap => "Trap",
        // decoys wear a target's title on purpose
        ObstacleVariant::Decoy => "Target",
    }
}

pub fn powerup_title(kind: PowerupKind) -> &'static str {
    match kind {
        PowerupKind::Speed => "Power-Up: Speed",
        PowerupKind::Magnet => "Power-Up: Magnet",
        PowerupKind::Shield => "Power-Up: Shield",
        PowerupKind::Time => "Power-Up: Time",
    }
}
