use tracing::{debug, info};

use crate::config::{LevelTable, SessionConfig};
use crate::constants::{
    target_base_speed, target_points, BOSS_HEALTH, BOSS_KNOCKBACK_GAP, BOSS_STUN_MS,
    PLAYER_BASE_SPEED, PLAYER_SIZE, POWERUP_LIFETIME_MS,
};
use crate::desktop::{WindowAdapter, WindowHandle};
use crate::error::EngineError;
use crate::rng::Rng;
use crate::types::{
    Category, DespawnCause, EffectKind, EntityId, EntityKind, GameOverReason, InputEvent,
    ObstacleVariant, Phase, PlayerView, PowerupKind, Progress, Rect, RuntimeEvent,
    SessionSummary, Snapshot, TargetVariant, Vec2,
};

mod ability;
mod behavior;
mod collision;
mod difficulty;
mod registry;
mod resolution;
mod spawn_system;
mod utils;
mod window_sync;

pub use self::ability::{AbilityManager, DashOutcome};
pub use self::behavior::{Behavior, PolicyContext};
pub use self::collision::Contact;
pub use self::difficulty::{DifficultyController, Verdict};
pub use self::registry::{Entity, EntityInit, EntityRegistry};
pub use self::spawn_system::{SpawnDirector, SpawnOutcome};
pub use self::window_sync::{Drift, WindowSync};

use self::registry::CommitReport;
use self::spawn_system::SpawnContext;
use self::utils::{integrate, knockback, scaled_points};
use self::window_sync::Bind;

#[derive(Clone, Debug, Default)]
struct SessionStats {
    targets_captured: u32,
    bosses_defeated: u32,
}

/// One game session: the player window, everything spawned around it, and
/// the level state machine. All OS window traffic goes through the adapter
/// passed into each call.
#[derive(Debug)]
pub struct GameEngine {
    config: SessionConfig,
    rng: Rng,
    registry: EntityRegistry,
    sync: WindowSync,
    player: Entity,
    max_health: i32,
    abilities: AbilityManager,
    spawner: SpawnDirector,
    difficulty: DifficultyController,
    arena: Rect,
    movement: Vec2,
    paused: bool,
    shut_down: bool,
    events: Vec<RuntimeEvent>,
    contacts: Vec<Contact>,
    stats: SessionStats,
    tick_counter: u64,
    elapsed_ms: u64,
}

impl GameEngine {
    /// Opens the player window. Failing to get even that one window means
    /// the desktop cannot host a session at all.
    pub fn new(
        config: SessionConfig,
        table: LevelTable,
        seed: u32,
        desktop: &mut dyn WindowAdapter,
    ) -> Result<Self, EngineError> {
        let arena = desktop.screen();
        let mut registry = EntityRegistry::new();
        let mut sync = WindowSync::default();
        let max_health = config.difficulty.player_health();

        let start =
            Rect::at(arena.center() - PLAYER_SIZE * 0.5, PLAYER_SIZE).clamped_inside(&arena);
        let player = Entity::new(
            registry.reserve_id(),
            EntityInit {
                kind: EntityKind::Player,
                rect: start,
                velocity: Vec2::ZERO,
                health: Some(max_health),
                expires_at_ms: None,
            },
        );
        match sync.create(&player, desktop)? {
            Bind::Bound(handle) => {
                info!(?handle, seed, difficulty = ?config.difficulty, "session started")
            }
            Bind::Refused(error) => return Err(EngineError::WindowingUnavailable(error)),
        }

        Ok(Self {
            abilities: AbilityManager::new(config.abilities.clone()),
            difficulty: DifficultyController::new(table, config.level_intro_ms),
            config,
            rng: Rng::new(seed),
            registry,
            sync,
            player,
            max_health,
            spawner: SpawnDirector::new(),
            arena,
            movement: Vec2::ZERO,
            paused: false,
            shut_down: false,
            events: Vec::new(),
            contacts: Vec::new(),
            stats: SessionStats::default(),
            tick_counter: 0,
            elapsed_ms: 0,
        })
    }

    pub fn is_ended(&self) -> bool {
        self.shut_down || self.difficulty.phase().is_terminal()
    }

    pub fn phase(&self) -> Phase {
        self.difficulty.phase()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn progress(&self) -> Progress {
        Progress {
            level: self.difficulty.level(),
            total_score: self.difficulty.total_score(),
        }
    }

    pub fn player(&self) -> &Entity {
        &self.player
    }

    pub fn player_health(&self) -> i32 {
        self.player.health.unwrap_or(0)
    }

    pub fn player_window(&self) -> Option<WindowHandle> {
        self.sync.handle_of(self.player.id)
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Overlaps resolved during the most recent tick.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn tick(&self) -> u64 {
        self.tick_counter
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn window_count(&self) -> usize {
        self.sync.len()
    }

    pub fn drift(&self, desktop: &dyn WindowAdapter, tolerance: i32) -> Vec<Drift> {
        self.sync.drift(desktop, tolerance)
    }

    pub fn step(
        &mut self,
        desktop: &mut dyn WindowAdapter,
        inputs: &[InputEvent],
    ) -> Result<(), EngineError> {
        if self.is_ended() {
            return Ok(());
        }

        let mut dash_requested = false;
        for input in inputs {
            match *input {
                InputEvent::Move(direction) => self.movement = direction.clamp_length(1.0),
                InputEvent::Dash => dash_requested = true,
                InputEvent::Pause => {
                    self.paused = !self.paused;
                    info!(paused = self.paused, "pause toggled");
                }
                InputEvent::Quit => {
                    let verdict = self.difficulty.quit();
                    self.finish(verdict);
                    return Ok(());
                }
            }
        }
        if self.paused {
            return Ok(());
        }

        let dt_ms = self.config.tick_ms;
        self.tick_counter += 1;
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);
        self.contacts.clear();
        let now_ms = self.elapsed_ms;

        if self.difficulty.phase() == Phase::LevelComplete {
            self.difficulty.begin_next_level();
        }
        if self.difficulty.phase() == Phase::LevelIntro {
            if !self.difficulty.advance_intro(dt_ms) {
                return Ok(());
            }
            self.events.push(RuntimeEvent::LevelStarted {
                level: self.difficulty.level(),
            });
        }

        self.update_player(now_ms, dt_ms, dash_requested);
        self.update_entities(now_ms, dt_ms);
        self.sync_windows(desktop)?;
        self.resolve_contacts(now_ms)?;
        self.sweep_expiry(now_ms, dt_ms)?;
        self.run_spawner(now_ms, dt_ms);
        self.evaluate_progress()?;
        self.commit(desktop)
    }

    /// Read-only view for input collaborators; leaves pending events alone.
    pub fn peek_snapshot(&self) -> Snapshot {
        self.snapshot_with(Vec::new())
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let events = if include_events {
            std::mem::take(&mut self.events)
        } else {
            Vec::new()
        };
        self.snapshot_with(events)
    }

    pub fn build_summary(&self) -> SessionSummary {
        SessionSummary {
            reason: self
                .difficulty
                .end_reason()
                .unwrap_or(GameOverReason::Quit),
            duration_ms: self.elapsed_ms,
            ticks: self.tick_counter,
            level_reached: self.difficulty.level(),
            levels_completed: self.difficulty.levels_completed(),
            total_score: self.difficulty.total_score(),
            targets_captured: self.stats.targets_captured,
            bosses_defeated: self.stats.bosses_defeated,
        }
    }

    /// Closes every window the session still owns. Later steps are no-ops.
    pub fn shutdown(&mut self, desktop: &mut dyn WindowAdapter) -> usize {
        if self.shut_down {
            return 0;
        }
        self.shut_down = true;
        let closed = self.sync.close_all(desktop);
        info!(closed, ticks = self.tick_counter, "session windows closed");
        closed
    }

    fn snapshot_with(&self, events: Vec<RuntimeEvent>) -> Snapshot {
        let now_ms = self.elapsed_ms;
        Snapshot {
            tick: self.tick_counter,
            elapsed_ms: now_ms,
            phase: self.difficulty.phase(),
            paused: self.paused,
            level: self.difficulty.level(),
            level_score: self.difficulty.level_score(),
            level_threshold: self.difficulty.params().threshold,
            total_score: self.difficulty.total_score(),
            player: PlayerView {
                id: self.player.id,
                rect: self.player.rect,
                velocity: self.player.velocity,
                health: self.player_health(),
                max_health: self.max_health,
                dash_cooldown_ms: self.abilities.dash_cooldown_ms(),
                dashing: self.abilities.is_dashing(),
                effects: self.abilities.effect_views(now_ms),
            },
            entities: self.registry.iter().map(Entity::view).collect(),
            events,
        }
    }

    fn update_player(&mut self, now_ms: u64, dt_ms: u64, dash_requested: bool) {
        self.abilities.face(self.movement);
        if dash_requested {
            match self.abilities.try_dash(now_ms) {
                DashOutcome::Started => self.events.push(RuntimeEvent::DashStarted),
                rejected => debug!(?rejected, "dash ignored"),
            }
        }
        let velocity = self
            .abilities
            .player_velocity(self.movement, PLAYER_BASE_SPEED, now_ms);
        self.player.velocity = velocity;
        self.player.rect = integrate(&self.player.rect, velocity, dt_ms, &self.arena);
    }

    fn update_entities(&mut self, now_ms: u64, dt_ms: u64) {
        let ctx = PolicyContext {
            player_center: self.player.center(),
            player_base_speed: PLAYER_BASE_SPEED,
            arena: self.arena,
            now_ms,
        };
        let (preset_speed, _) = self.config.difficulty.multipliers();
        let level_speed = self.difficulty.params().speed_multiplier;
        let time_scale = self.abilities.world_time_scale(now_ms);
        let magnet = self.abilities.magnet(now_ms);

        for entity in self.registry.iter_mut() {
            let max_speed = match entity.kind {
                EntityKind::Target(variant) => {
                    target_base_speed(variant) * level_speed * preset_speed
                }
                _ => 0.0,
            };
            let policy = Behavior::for_kind(entity.kind);
            let velocity =
                behavior::next_velocity(policy, entity, &ctx, max_speed, &mut self.rng);
            entity.velocity = velocity;

            let mut motion = velocity;
            if let Some((radius, force)) = magnet {
                let pulled = matches!(entity.kind, EntityKind::Target(v) if v != TargetVariant::Boss);
                let toward = ctx.player_center - entity.center();
                if pulled && toward.length() <= radius {
                    motion += toward.normalized() * force;
                }
            }
            entity.rect = integrate(&entity.rect, motion * time_scale, dt_ms, &ctx.arena);
        }
    }

    fn sync_windows(&mut self, desktop: &mut dyn WindowAdapter) -> Result<(), EngineError> {
        self.sync.push(&self.player, desktop)?;
        for entity in self.registry.iter() {
            self.sync.push(entity, desktop)?;
        }
        self.sync.pull(&mut self.player, desktop)?;
        for entity in self.registry.iter_mut() {
            self.sync.pull(entity, desktop)?;
        }
        Ok(())
    }

    fn sweep_expiry(&mut self, now_ms: u64, dt_ms: u64) -> Result<(), EngineError> {
        for kind in self.abilities.sweep(now_ms, dt_ms) {
            debug!(?kind, "effect expired");
            self.events.push(RuntimeEvent::EffectExpired { kind });
        }

        let expired: Vec<EntityId> = self
            .registry
            .iter()
            .filter(|entity| entity.expires_at_ms.is_some_and(|at| now_ms >= at))
            .map(|entity| entity.id)
            .filter(|id| !self.registry.is_pending_destroy(*id))
            .collect();
        for id in expired {
            self.registry.queue_destroy(id, DespawnCause::Expired)?;
        }
        Ok(())
    }

    fn run_spawner(&mut self, now_ms: u64, dt_ms: u64) {
        self.spawner.advance(dt_ms);
        let counts = Category::ALL.map(|category| self.registry.count(category));
        let occupied = self.registry.occupied_rects();
        let ctx = SpawnContext {
            level: self.difficulty.params(),
            counts,
            player: self.player.rect,
            occupied: &occupied,
            arena: self.arena,
        };
        let outcomes = self.spawner.plan(&ctx, &mut self.rng);

        for outcome in outcomes {
            match outcome {
                SpawnOutcome::Planned { kind, rect } => {
                    let init = self.entity_init(kind, rect, now_ms);
                    let id = self.registry.queue_create(init);
                    debug!(id, ?kind, "spawn queued");
                }
                SpawnOutcome::NoRoom { kind } => {
                    debug!(?kind, "no free position; spawn skipped");
                    self.events.push(RuntimeEvent::SpawnSkipped {
                        kind,
                        reason: "no free position".to_string(),
                    });
                }
            }
        }
    }

    fn entity_init(&self, kind: EntityKind, rect: Rect, now_ms: u64) -> EntityInit {
        let mut init = EntityInit::new(kind, rect);
        match kind {
            EntityKind::Target(TargetVariant::Boss) => init.health = Some(BOSS_HEALTH),
            EntityKind::Powerup(_) => init.expires_at_ms = Some(now_ms + POWERUP_LIFETIME_MS),
            _ => {}
        }
        init
    }

    fn evaluate_progress(&mut self) -> Result<(), EngineError> {
        match self.difficulty.evaluate(self.player_health()) {
            Verdict::Continue => {}
            Verdict::LevelCompleted { completed, next } => {
                self.clear_level()?;
                debug!(completed, next, "level transition queued");
                self.events
                    .push(RuntimeEvent::LevelCompleted { level: completed });
            }
            verdict @ Verdict::Ended(_) => self.finish(verdict),
        }
        Ok(())
    }

    /// Queues every non-player entity for destruction and restarts spawn
    /// timers, so the next level begins on an empty desktop.
    fn clear_level(&mut self) -> Result<(), EngineError> {
        let cancelled = self.registry.cancel_pending_creates();
        for id in self.registry.ids() {
            if !self.registry.is_pending_destroy(id) {
                self.registry
                    .queue_destroy(id, DespawnCause::LevelTransition)?;
            }
        }
        self.spawner.reset();
        debug!(cancelled, "level cleared");
        Ok(())
    }

    fn finish(&mut self, verdict: Verdict) {
        if let Verdict::Ended(reason) = verdict {
            self.events.push(RuntimeEvent::GameOver { reason });
        }
    }

    fn commit(&mut self, desktop: &mut dyn WindowAdapter) -> Result<(), EngineError> {
        let CommitReport {
            despawned,
            spawned,
            refused,
        } = self.registry.commit(&mut self.sync, desktop)?;

        for despawn in despawned {
            self.events.push(RuntimeEvent::EntityDespawned {
                id: despawn.id,
                kind: despawn.kind,
                cause: despawn.cause,
            });
        }
        for (id, kind) in spawned {
            self.events.push(RuntimeEvent::EntitySpawned { id, kind });
        }
        for (kind, error) in refused {
            self.events.push(RuntimeEvent::SpawnSkipped {
                kind,
                reason: error.to_string(),
            });
        }
        Ok(())
    }
}
