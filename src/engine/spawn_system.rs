use crate::config::LevelParams;
use crate::constants::{
    target_size, OBSTACLE_SIZE, PLAYER_SIZE, POWERUP_SIZE, SPAWN_ATTEMPTS,
    SPAWN_PLAYER_CLEARANCE,
};
use crate::rng::Rng;
use crate::types::{Category, EntityKind, Rect, Vec2};

/// Inputs for one round of spawn decisions.
pub struct SpawnContext<'a> {
    pub level: &'a LevelParams,
    /// Live plus queued entities, indexed by [`Category::index`].
    pub counts: [usize; 3],
    pub player: Rect,
    pub occupied: &'a [Rect],
    pub arena: Rect,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SpawnOutcome {
    Planned { kind: EntityKind, rect: Rect },
    NoRoom { kind: EntityKind },
}

/// Per-category spawn timers for the active level. Created fresh for every
/// session and reset on every level transition.
#[derive(Clone, Debug, Default)]
pub struct SpawnDirector {
    timers_ms: [u64; 3],
}

impl SpawnDirector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.timers_ms = [0; 3];
    }

    pub fn timer_ms(&self, category: Category) -> u64 {
        self.timers_ms[category.index()]
    }

    /// A captured target is replaced on the normal timer, not immediately.
    pub fn request_replacement(&mut self, category: Category) {
        self.timers_ms[category.index()] = 0;
    }

    pub fn advance(&mut self, dt_ms: u64) {
        for timer in &mut self.timers_ms {
            *timer = timer.saturating_add(dt_ms);
        }
    }

    /// At most one attempt per category. An attempt restarts the category
    /// timer whether or not it finds room.
    pub fn plan(&mut self, ctx: &SpawnContext<'_>, rng: &mut Rng) -> Vec<SpawnOutcome> {
        let mut outcomes = Vec::new();
        let mut occupied: Vec<Rect> = ctx.occupied.to_vec();

        for category in Category::ALL {
            let rule = ctx.level.rule(category);
            let idx = category.index();
            if rule.cap == 0 || ctx.counts[idx] >= rule.cap {
                continue;
            }
            if self.timers_ms[idx] < rule.interval_ms {
                continue;
            }
            self.timers_ms[idx] = 0;

            let Some(kind) = pick_kind(category, ctx.level, rng) else {
                continue;
            };
            let size = spawn_size(kind);
            match find_position(size, ctx.player, &occupied, ctx.arena, rng) {
                Some(rect) => {
                    occupied.push(rect);
                    outcomes.push(SpawnOutcome::Planned { kind, rect });
                }
                None => outcomes.push(SpawnOutcome::NoRoom { kind }),
            }
        }
        outcomes
    }
}

pub fn spawn_size(kind: EntityKind) -> Vec2 {
    match kind {
        EntityKind::Target(variant) => target_size(variant),
        EntityKind::Obstacle(_) => OBSTACLE_SIZE,
        EntityKind::Powerup(_) => POWERUP_SIZE,
        EntityKind::Player => PLAYER_SIZE,
    }
}

fn pick_kind(category: Category, level: &LevelParams, rng: &mut Rng) -> Option<EntityKind> {
    match category {
        Category::Target => rng
            .pick_weighted(&level.target_mix.weighted())
            .map(EntityKind::Target),
        Category::Obstacle => rng
            .pick_weighted(&level.obstacle_mix.weighted())
            .map(EntityKind::Obstacle),
        Category::Powerup => rng
            .pick_weighted(&level.powerup_mix.weighted())
            .map(EntityKind::Powerup),
    }
}

fn random_rect(size: Vec2, arena: Rect, rng: &mut Rng) -> Rect {
    let x = rng.range(arena.x, (arena.right() - size.x).max(arena.x));
    let y = rng.range(arena.y, (arena.bottom() - size.y).max(arena.y));
    Rect::at(Vec2::new(x.floor(), y.floor()), size)
}

fn find_position(
    size: Vec2,
    player: Rect,
    occupied: &[Rect],
    arena: Rect,
    rng: &mut Rng,
) -> Option<Rect> {
    let clearance = player.inflate(SPAWN_PLAYER_CLEARANCE);

    for _ in 0..SPAWN_ATTEMPTS {
        let rect = random_rect(size, arena, rng);
        if rect.overlaps(&clearance) {
            continue;
        }
        if occupied.iter().any(|other| other.overlaps(&rect)) {
            continue;
        }
        return Some(rect);
    }

    // crowded screen: only the player is off limits
    for _ in 0..SPAWN_ATTEMPTS {
        let rect = random_rect(size, arena, rng);
        if !rect.overlaps(&clearance) {
            return Some(rect);
        }
    }

    None
}
