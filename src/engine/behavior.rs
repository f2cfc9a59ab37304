use super::registry::Entity;
use crate::constants::{EVADE_FALLOFF, MOVING_TURN_CHANCE, PURSUIT_SPEED_RATIO};
use crate::rng::Rng;
use crate::types::{EntityKind, Rect, TargetVariant, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    Static,
    Moving,
    Evasive,
    Pursuit,
}

impl Behavior {
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Target(TargetVariant::Moving) => Behavior::Moving,
            EntityKind::Target(TargetVariant::Evasive) => Behavior::Evasive,
            EntityKind::Target(TargetVariant::Boss) => Behavior::Pursuit,
            _ => Behavior::Static,
        }
    }
}

/// Read-only view of the world a policy may look at.
#[derive(Clone, Copy, Debug)]
pub struct PolicyContext {
    pub player_center: Vec2,
    pub player_base_speed: f32,
    pub arena: Rect,
    pub now_ms: u64,
}

/// Velocity in px/s for the coming tick. Policies never touch anything but
/// the returned value and the injected random source.
pub fn next_velocity(
    behavior: Behavior,
    entity: &Entity,
    ctx: &PolicyContext,
    max_speed: f32,
    rng: &mut Rng,
) -> Vec2 {
    match behavior {
        Behavior::Static => Vec2::ZERO,
        Behavior::Moving => wander(entity, ctx, max_speed, rng),
        Behavior::Evasive => evade(entity, ctx, max_speed),
        Behavior::Pursuit => pursue(entity, ctx, max_speed),
    }
}

fn wander(entity: &Entity, ctx: &PolicyContext, max_speed: f32, rng: &mut Rng) -> Vec2 {
    let turn = rng.bool(MOVING_TURN_CHANCE);
    let mut velocity = entity.velocity;
    if turn || velocity.is_zero() {
        let speed = rng.range(0.5, 1.0) * max_speed;
        velocity = rng.unit_vector() * speed;
    }
    velocity = velocity.clamp_length(max_speed);

    // bounce
    let rect = &entity.rect;
    if (rect.x <= ctx.arena.x && velocity.x < 0.0)
        || (rect.right() >= ctx.arena.right() && velocity.x > 0.0)
    {
        velocity.x = -velocity.x;
    }
    if (rect.y <= ctx.arena.y && velocity.y < 0.0)
        || (rect.bottom() >= ctx.arena.bottom() && velocity.y > 0.0)
    {
        velocity.y = -velocity.y;
    }
    velocity
}

fn evade(entity: &Entity, ctx: &PolicyContext, max_speed: f32) -> Vec2 {
    let away = entity.center() - ctx.player_center;
    let distance = away.length();
    let direction = if distance <= f32::EPSILON {
        Vec2::new(1.0, 0.0)
    } else {
        away.normalized()
    };
    let urgency = (EVADE_FALLOFF / distance.max(1.0)).min(1.0);
    let mut velocity = direction * (max_speed * urgency);
    without_wall_push(&mut velocity, &entity.rect, &ctx.arena);
    velocity
}

fn pursue(entity: &Entity, ctx: &PolicyContext, max_speed: f32) -> Vec2 {
    if ctx.now_ms < entity.behavior.stunned_until_ms {
        return Vec2::ZERO;
    }
    let toward = ctx.player_center - entity.center();
    let speed = max_speed.min(ctx.player_base_speed * PURSUIT_SPEED_RATIO);
    toward.normalized() * speed
}

fn without_wall_push(velocity: &mut Vec2, rect: &Rect, arena: &Rect) {
    if (rect.x <= arena.x && velocity.x < 0.0) || (rect.right() >= arena.right() && velocity.x > 0.0)
    {
        velocity.x = 0.0;
    }
    if (rect.y <= arena.y && velocity.y < 0.0)
        || (rect.bottom() >= arena.bottom() && velocity.y > 0.0)
    {
        velocity.y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::EntityInit;
    use crate::types::{ObstacleVariant, PowerupKind};

    fn ctx(player_center: Vec2) -> PolicyContext {
        PolicyContext {
            player_center,
            player_base_speed: 300.0,
            arena: Rect::new(0.0, 0.0, 1920.0, 1080.0),
            now_ms: 1_000,
        }
    }

    fn target(variant: TargetVariant, x: f32, y: f32) -> Entity {
        Entity::new(
            1,
            EntityInit::new(EntityKind::Target(variant), Rect::new(x, y, 200.0, 150.0)),
        )
    }

    #[test]
    fn kinds_map_to_policies() {
        assert_eq!(
            Behavior::for_kind(EntityKind::Target(TargetVariant::Standard)),
            Behavior::Static
        );
        assert_eq!(
            Behavior::for_kind(EntityKind::Obstacle(ObstacleVariant::Decoy)),
            Behavior::Static
        );
        assert_eq!(
            Behavior::for_kind(EntityKind::Powerup(PowerupKind::Magnet)),
            Behavior::Static
        );
        assert_eq!(
            Behavior::for_kind(EntityKind::Target(TargetVariant::Boss)),
            Behavior::Pursuit
        );
    }

    #[test]
    fn moving_policy_is_deterministic_and_bounded() {
        let entity = target(TargetVariant::Moving, 800.0, 400.0);
        let context = ctx(Vec2::new(100.0, 100.0));
        let mut a = Rng::new(11);
        let mut b = Rng::new(11);
        let va = next_velocity(Behavior::Moving, &entity, &context, 150.0, &mut a);
        let vb = next_velocity(Behavior::Moving, &entity, &context, 150.0, &mut b);
        assert_eq!(va, vb);
        assert!(va.length() <= 150.0 + 1e-3);
        assert!(va.length() >= 75.0 - 1e-3);
    }

    #[test]
    fn moving_policy_bounces_off_the_left_edge() {
        let mut entity = target(TargetVariant::Moving, 0.0, 400.0);
        entity.velocity = Vec2::new(-100.0, 0.0);
        let mut rng = Rng::new(5);
        let mut bounced = false;
        for _ in 0..20 {
            let v = next_velocity(Behavior::Moving, &entity, &ctx(Vec2::ZERO), 150.0, &mut rng);
            assert!(v.x >= 0.0);
            bounced |= v == Vec2::new(100.0, 0.0);
        }
        assert!(bounced);
    }

    #[test]
    fn evasive_flees_faster_when_close() {
        let context = ctx(Vec2::new(500.0, 500.0));
        let near = target(TargetVariant::Evasive, 560.0, 425.0);
        let far = target(TargetVariant::Evasive, 1500.0, 425.0);
        let mut rng = Rng::new(1);
        let v_near = next_velocity(Behavior::Evasive, &near, &context, 220.0, &mut rng);
        let v_far = next_velocity(Behavior::Evasive, &far, &context, 220.0, &mut rng);
        assert!(v_near.x > 0.0);
        assert!(v_near.length() > v_far.length());
        assert!(v_near.length() <= 220.0 + 1e-3);
    }

    #[test]
    fn evasive_slides_along_walls() {
        let context = ctx(Vec2::new(1500.0, 500.0));
        let cornered = target(TargetVariant::Evasive, 1720.0, 400.0);
        let mut rng = Rng::new(1);
        let v = next_velocity(Behavior::Evasive, &cornered, &context, 220.0, &mut rng);
        assert_eq!(v.x, 0.0);
    }

    #[test]
    fn pursuit_is_slower_than_player_and_stops_when_stunned() {
        let context = ctx(Vec2::new(100.0, 100.0));
        let mut boss = target(TargetVariant::Boss, 1000.0, 800.0);
        let mut rng = Rng::new(1);
        let v = next_velocity(Behavior::Pursuit, &boss, &context, 400.0, &mut rng);
        assert!(v.x < 0.0 && v.y < 0.0);
        assert!((v.length() - 180.0).abs() < 1e-3);

        boss.behavior.stunned_until_ms = 2_000;
        let stunned = next_velocity(Behavior::Pursuit, &boss, &context, 400.0, &mut rng);
        assert_eq!(stunned, Vec2::ZERO);
    }
}
