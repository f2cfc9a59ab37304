use crate::game_loop::InputSource;
use crate::rng::Rng;
use crate::types::{
    EffectKind, EntityKind, EntityView, InputEvent, ObstacleVariant, Phase, Snapshot,
    TargetVariant, Vec2,
};

const LOOKAHEAD: f32 = 60.0;
const HAZARD_RADIUS: f32 = 260.0;
const POWERUP_DETOUR: f32 = 420.0;
const DASH_RANGE: f32 = 360.0;
const BOSS_PANIC_RANGE: f32 = 180.0;

fn headings() -> [Vec2; 8] {
    let d = std::f32::consts::FRAC_1_SQRT_2;
    [
        Vec2::new(0.0, -1.0),
        Vec2::new(d, -d),
        Vec2::new(1.0, 0.0),
        Vec2::new(d, d),
        Vec2::new(0.0, 1.0),
        Vec2::new(-d, d),
        Vec2::new(-1.0, 0.0),
        Vec2::new(-d, -d),
    ]
}

fn distance(a: Vec2, b: Vec2) -> f32 {
    (a - b).length()
}

/// Scripted player for headless runs. Re-plans a few times per second and
/// holds its heading in between.
#[derive(Clone, Debug)]
pub struct Autopilot {
    rng: Rng,
    think_at_ms: u64,
    heading: Vec2,
}

struct Plan {
    heading: Vec2,
    dash: bool,
}

impl Autopilot {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed),
            think_at_ms: 0,
            heading: Vec2::ZERO,
        }
    }

    pub fn heading(&self) -> Vec2 {
        self.heading
    }

    fn plan(&mut self, view: &Snapshot) -> Plan {
        let me = view.player.rect.center();
        let shielded = view
            .player
            .effects
            .iter()
            .any(|effect| effect.kind == EffectKind::Shield);
        let dash_ready = view.player.dash_cooldown_ms == 0 && !view.player.dashing;
        let engage_boss = shielded || dash_ready;

        let hazards: Vec<(&EntityView, f32)> = view
            .entities
            .iter()
            .filter_map(|entity| match entity.kind {
                EntityKind::Target(TargetVariant::Boss) if !engage_boss => Some((entity, 2.5)),
                EntityKind::Obstacle(ObstacleVariant::Trap) if !shielded => Some((entity, 2.0)),
                EntityKind::Obstacle(ObstacleVariant::Barrier) => Some((entity, 0.8)),
                _ => None,
            })
            .collect();

        let nearest_target = view
            .entities
            .iter()
            .filter(|entity| match entity.kind {
                EntityKind::Target(TargetVariant::Boss) => engage_boss,
                EntityKind::Target(_) => true,
                _ => false,
            })
            .min_by(|a, b| {
                distance(me, a.rect.center()).total_cmp(&distance(me, b.rect.center()))
            });
        let nearby_powerup = view
            .entities
            .iter()
            .filter(|entity| matches!(entity.kind, EntityKind::Powerup(_)))
            .filter(|entity| distance(me, entity.rect.center()) <= POWERUP_DETOUR)
            .min_by(|a, b| {
                distance(me, a.rect.center()).total_cmp(&distance(me, b.rect.center()))
            });
        let goal = nearby_powerup.or(nearest_target);

        let mut best = Vec2::ZERO;
        let mut best_score = f32::NEG_INFINITY;
        for dir in headings() {
            let probe = me + dir * LOOKAHEAD;
            let mut score = 0.0;
            if let Some(goal) = goal {
                let center = goal.rect.center();
                score += distance(me, center) - distance(probe, center);
            }
            for (hazard, weight) in &hazards {
                let center = hazard.rect.center();
                let now = distance(me, center);
                if now > HAZARD_RADIUS {
                    continue;
                }
                let falloff = 1.0 - now / HAZARD_RADIUS;
                score += (distance(probe, center) - now) * weight * (0.5 + falloff);
            }
            score += self.rng.next_f32() * 0.4;
            if score > best_score {
                best_score = score;
                best = dir;
            }
        }

        let boss_close = hazards.iter().any(|(hazard, _)| {
            matches!(hazard.kind, EntityKind::Target(TargetVariant::Boss))
                && distance(me, hazard.rect.center()) <= BOSS_PANIC_RANGE
        });
        let goal_in_range = goal.is_some_and(|goal| {
            matches!(goal.kind, EntityKind::Target(_))
                && distance(me, goal.rect.center()) <= DASH_RANGE
        });

        Plan {
            heading: if goal.is_none() && hazards.is_empty() {
                self.wander()
            } else {
                best
            },
            dash: dash_ready && (goal_in_range || boss_close),
        }
    }

    fn wander(&mut self) -> Vec2 {
        if self.heading.is_zero() || self.rng.bool(0.3) {
            self.rng.unit_vector()
        } else {
            self.heading
        }
    }
}

impl InputSource for Autopilot {
    fn poll(&mut self, view: &Snapshot) -> Vec<InputEvent> {
        if view.phase != Phase::Active || view.paused {
            return Vec::new();
        }
        if view.elapsed_ms < self.think_at_ms {
            return vec![InputEvent::Move(self.heading)];
        }

        self.think_at_ms = view.elapsed_ms + self.rng.range(120.0, 260.0) as u64;
        let plan = self.plan(view);
        self.heading = plan.heading;
        let mut inputs = vec![InputEvent::Move(plan.heading)];
        if plan.dash {
            inputs.push(InputEvent::Dash);
        }
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LevelTable, SessionConfig};
    use crate::desktop::VirtualDesktop;
    use crate::engine::GameEngine;
    use crate::game_loop::{GameLoop, NullObserver};
    use crate::types::{EffectView, EntityId, PlayerView, PowerupKind, Rect};

    fn view(entities: Vec<EntityView>, shielded: bool, cooldown_ms: u64) -> Snapshot {
        let effects = if shielded {
            vec![EffectView {
                kind: EffectKind::Shield,
                remaining_ms: 3_000,
            }]
        } else {
            Vec::new()
        };
        Snapshot {
            tick: 10,
            elapsed_ms: 330,
            phase: Phase::Active,
            paused: false,
            level: 1,
            level_score: 0,
            level_threshold: 100,
            total_score: 0,
            player: PlayerView {
                id: 1,
                rect: Rect::new(900.0, 500.0, 100.0, 100.0),
                velocity: Vec2::ZERO,
                health: 3,
                max_health: 3,
                dash_cooldown_ms: cooldown_ms,
                dashing: false,
                effects,
            },
            entities,
            events: Vec::new(),
        }
    }

    fn entity(id: EntityId, kind: EntityKind, rect: Rect) -> EntityView {
        EntityView {
            id,
            kind,
            rect,
            velocity: Vec2::ZERO,
            health: None,
            expires_at_ms: None,
        }
    }

    fn heading_of(inputs: &[InputEvent]) -> Vec2 {
        inputs
            .iter()
            .find_map(|input| match input {
                InputEvent::Move(dir) => Some(*dir),
                _ => None,
            })
            .expect("move input")
    }

    #[test]
    fn heads_for_the_nearest_target() {
        let mut pilot = Autopilot::new(1);
        let snapshot = view(
            vec![
                entity(
                    2,
                    EntityKind::Target(TargetVariant::Standard),
                    Rect::new(1400.0, 475.0, 200.0, 150.0),
                ),
                entity(
                    3,
                    EntityKind::Target(TargetVariant::Standard),
                    Rect::new(10.0, 10.0, 200.0, 150.0),
                ),
            ],
            false,
            2_000,
        );
        let inputs = pilot.poll(&snapshot);
        assert!(heading_of(&inputs).x > 0.0);
        assert!(!inputs.contains(&InputEvent::Dash));
    }

    #[test]
    fn backs_away_from_a_boss_without_protection() {
        let mut pilot = Autopilot::new(2);
        let boss = entity(
            2,
            EntityKind::Target(TargetVariant::Boss),
            Rect::new(1050.0, 440.0, 300.0, 225.0),
        );
        let inputs = pilot.poll(&view(vec![boss], false, 1_500));
        assert!(heading_of(&inputs).x < 0.0);
    }

    #[test]
    fn charges_the_boss_while_shielded() {
        let mut pilot = Autopilot::new(3);
        let boss = entity(
            2,
            EntityKind::Target(TargetVariant::Boss),
            Rect::new(1050.0, 440.0, 300.0, 225.0),
        );
        let inputs = pilot.poll(&view(vec![boss], true, 1_500));
        assert!(heading_of(&inputs).x > 0.0);
    }

    #[test]
    fn dashes_at_close_targets_when_ready() {
        let mut pilot = Autopilot::new(4);
        let target = entity(
            2,
            EntityKind::Target(TargetVariant::Evasive),
            Rect::new(1100.0, 475.0, 200.0, 150.0),
        );
        let inputs = pilot.poll(&view(vec![target], false, 0));
        assert!(inputs.contains(&InputEvent::Dash));
    }

    #[test]
    fn prefers_a_nearby_powerup() {
        let mut pilot = Autopilot::new(5);
        let snapshot = view(
            vec![
                entity(
                    2,
                    EntityKind::Target(TargetVariant::Standard),
                    Rect::new(1400.0, 475.0, 200.0, 150.0),
                ),
                entity(
                    3,
                    EntityKind::Powerup(PowerupKind::Speed),
                    Rect::new(700.0, 512.0, 75.0, 75.0),
                ),
            ],
            false,
            2_000,
        );
        assert!(heading_of(&pilot.poll(&snapshot)).x < 0.0);
    }

    #[test]
    fn idle_outside_active_play() {
        let mut pilot = Autopilot::new(6);
        let mut snapshot = view(Vec::new(), false, 0);
        snapshot.phase = Phase::LevelIntro;
        assert!(pilot.poll(&snapshot).is_empty());
    }

    #[test]
    fn scores_in_a_headless_session() {
        let mut desktop = VirtualDesktop::default();
        let engine = GameEngine::new(
            SessionConfig::default(),
            LevelTable::default(),
            21,
            &mut desktop,
        )
        .expect("engine");
        let mut game = GameLoop::new(engine);
        let mut pilot = Autopilot::new(21);
        let summary = game
            .run_to_end(&mut desktop, &mut pilot, &mut NullObserver, 3_000)
            .expect("run");
        assert!(summary.total_score > 0);
        assert!(summary.targets_captured > 0);
    }
}
