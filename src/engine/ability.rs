use std::collections::BTreeMap;

use crate::config::AbilityConfig;
use crate::types::{EffectKind, EffectView, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DashOutcome {
    Started,
    OnCooldown,
    AlreadyDashing,
    Frozen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Applied {
    pub until_ms: u64,
    pub refreshed: bool,
}

/// Dash and timed effects on the player. Effects live in one map keyed by
/// kind, so a kind is either active once or not at all.
#[derive(Clone, Debug)]
pub struct AbilityManager {
    config: AbilityConfig,
    effects: BTreeMap<EffectKind, u64>,
    facing: Vec2,
    dash_ticks_left: u32,
    dash_cooldown_ms: u64,
    invulnerable_until_ms: u64,
}

impl AbilityManager {
    pub fn new(config: AbilityConfig) -> Self {
        Self {
            config,
            effects: BTreeMap::new(),
            facing: Vec2::new(1.0, 0.0),
            dash_ticks_left: 0,
            dash_cooldown_ms: 0,
            invulnerable_until_ms: 0,
        }
    }

    pub fn config(&self) -> &AbilityConfig {
        &self.config
    }

    pub fn facing(&self) -> Vec2 {
        self.facing
    }

    pub fn face(&mut self, movement: Vec2) {
        if !movement.is_zero() {
            self.facing = movement.normalized();
        }
    }

    pub fn is_dashing(&self) -> bool {
        self.dash_ticks_left > 0
    }

    pub fn dash_cooldown_ms(&self) -> u64 {
        self.dash_cooldown_ms
    }

    pub fn try_dash(&mut self, now_ms: u64) -> DashOutcome {
        if self.is_dashing() {
            return DashOutcome::AlreadyDashing;
        }
        if self.dash_cooldown_ms > 0 {
            return DashOutcome::OnCooldown;
        }
        if self.is_active(EffectKind::Freeze, now_ms) {
            return DashOutcome::Frozen;
        }
        self.dash_ticks_left = self.config.dash_ticks;
        DashOutcome::Started
    }

    pub fn apply(&mut self, kind: EffectKind, now_ms: u64) -> Applied {
        let until_ms = now_ms + self.config.duration_ms(kind);
        let refreshed = self.is_active(kind, now_ms);
        self.effects.insert(kind, until_ms);
        Applied {
            until_ms,
            refreshed,
        }
    }

    pub fn is_active(&self, kind: EffectKind, now_ms: u64) -> bool {
        self.effects
            .get(&kind)
            .is_some_and(|until| now_ms < *until)
    }

    pub fn remaining_ms(&self, kind: EffectKind, now_ms: u64) -> u64 {
        self.effects
            .get(&kind)
            .map(|until| until.saturating_sub(now_ms))
            .unwrap_or(0)
    }

    pub fn is_frozen(&self, now_ms: u64) -> bool {
        self.is_active(EffectKind::Freeze, now_ms)
    }

    /// Player velocity in px/s for this tick.
    pub fn player_velocity(&self, movement: Vec2, base_speed: f32, now_ms: u64) -> Vec2 {
        if self.is_frozen(now_ms) {
            return Vec2::ZERO;
        }
        let mut speed = base_speed;
        if self.is_active(EffectKind::Speed, now_ms) {
            speed *= self.config.speed_multiplier;
        }
        if self.is_dashing() {
            return self.facing * (speed * self.config.dash_multiplier);
        }
        movement.clamp_length(1.0) * speed
    }

    /// Scale applied to every non-player entity's movement.
    pub fn world_time_scale(&self, now_ms: u64) -> f32 {
        if self.is_active(EffectKind::Time, now_ms) {
            self.config.time_slowdown
        } else {
            1.0
        }
    }

    /// (radius, force) while the magnet is on.
    pub fn magnet(&self, now_ms: u64) -> Option<(f32, f32)> {
        self.is_active(EffectKind::Magnet, now_ms)
            .then_some((self.config.magnet_radius, self.config.magnet_force))
    }

    pub fn shielded(&self, now_ms: u64) -> bool {
        self.is_active(EffectKind::Shield, now_ms)
    }

    pub fn can_take_damage(&self, now_ms: u64) -> bool {
        !self.shielded(now_ms) && !self.is_dashing() && now_ms >= self.invulnerable_until_ms
    }

    pub fn mark_damaged(&mut self, now_ms: u64) {
        self.invulnerable_until_ms = now_ms + self.config.invulnerable_ms;
    }

    /// End-of-tick bookkeeping. Returns every effect that expired, each
    /// exactly once.
    pub fn sweep(&mut self, now_ms: u64, dt_ms: u64) -> Vec<EffectKind> {
        let expired: Vec<EffectKind> = self
            .effects
            .iter()
            .filter(|(_, until)| now_ms >= **until)
            .map(|(kind, _)| *kind)
            .collect();
        for kind in &expired {
            self.effects.remove(kind);
        }

        if self.dash_ticks_left > 0 {
            self.dash_ticks_left -= 1;
            if self.dash_ticks_left == 0 {
                self.dash_cooldown_ms = self.config.dash_cooldown_ms;
            }
        } else {
            self.dash_cooldown_ms = self.dash_cooldown_ms.saturating_sub(dt_ms);
        }
        expired
    }

    pub fn effect_views(&self, now_ms: u64) -> Vec<EffectView> {
        self.effects
            .iter()
            .filter(|(_, until)| now_ms < **until)
            .map(|(kind, until)| EffectView {
                kind: *kind,
                remaining_ms: until - now_ms,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: u64 = 33;

    fn manager() -> AbilityManager {
        AbilityManager::new(AbilityConfig::default())
    }

    #[test]
    fn dash_runs_for_fixed_ticks_then_cools_down() {
        let mut abilities = manager();
        let mut now = 0;
        assert_eq!(abilities.try_dash(now), DashOutcome::Started);
        for _ in 0..6 {
            assert!(abilities.is_dashing());
            now += DT;
            abilities.sweep(now, DT);
        }
        assert!(!abilities.is_dashing());
        assert_eq!(abilities.dash_cooldown_ms(), 2_000);
    }

    #[test]
    fn second_dash_within_cooldown_changes_nothing() {
        let mut abilities = manager();
        let mut now = 0;
        abilities.face(Vec2::new(0.0, -1.0));
        abilities.try_dash(now);
        for _ in 0..7 {
            now += DT;
            abilities.sweep(now, DT);
        }
        let cooldown = abilities.dash_cooldown_ms();
        assert_eq!(cooldown, 2_000 - DT);
        let before = abilities.player_velocity(Vec2::new(1.0, 0.0), 300.0, now);

        assert_eq!(abilities.try_dash(now), DashOutcome::OnCooldown);
        assert_eq!(abilities.dash_cooldown_ms(), cooldown);
        let after = abilities.player_velocity(Vec2::new(1.0, 0.0), 300.0, now);
        assert_eq!(before, after);
        assert_eq!(after, Vec2::new(300.0, 0.0));
    }

    #[test]
    fn dash_uses_facing_and_multiplier() {
        let mut abilities = manager();
        abilities.face(Vec2::new(0.0, 1.0));
        abilities.try_dash(0);
        let v = abilities.player_velocity(Vec2::ZERO, 300.0, 0);
        assert_eq!(v, Vec2::new(0.0, 900.0));
    }

    #[test]
    fn frozen_player_cannot_move_or_dash() {
        let mut abilities = manager();
        abilities.apply(EffectKind::Freeze, 0);
        assert_eq!(abilities.player_velocity(Vec2::new(1.0, 0.0), 300.0, 10), Vec2::ZERO);
        assert_eq!(abilities.try_dash(10), DashOutcome::Frozen);
        assert!(!abilities.is_frozen(3_000));
    }

    #[test]
    fn reapplying_refreshes_without_stacking() {
        let mut abilities = manager();
        let first = abilities.apply(EffectKind::Speed, 0);
        assert!(!first.refreshed);
        let second = abilities.apply(EffectKind::Speed, 4_000);
        assert!(second.refreshed);
        assert_eq!(second.until_ms, 9_000);
        assert_eq!(abilities.effect_views(4_000).len(), 1);
        assert_eq!(
            abilities.player_velocity(Vec2::new(1.0, 0.0), 300.0, 4_000),
            Vec2::new(600.0, 0.0)
        );
    }

    #[test]
    fn expiry_is_reported_once_and_reverts_modifiers() {
        let mut abilities = manager();
        abilities.apply(EffectKind::Time, 0);
        abilities.apply(EffectKind::Shield, 0);
        assert_eq!(abilities.world_time_scale(4_999), 0.5);

        let expired = abilities.sweep(5_000, DT);
        assert_eq!(expired, vec![EffectKind::Shield, EffectKind::Time]);
        assert!(abilities.sweep(5_033, DT).is_empty());
        assert_eq!(abilities.world_time_scale(5_033), 1.0);
        assert!(!abilities.shielded(5_033));
    }

    #[test]
    fn damage_is_blocked_by_shield_dash_and_invulnerability() {
        let mut abilities = manager();
        assert!(abilities.can_take_damage(0));
        abilities.mark_damaged(0);
        assert!(!abilities.can_take_damage(1_999));
        assert!(abilities.can_take_damage(2_000));

        abilities.apply(EffectKind::Shield, 2_000);
        assert!(!abilities.can_take_damage(2_500));

        let mut dashing = manager();
        dashing.try_dash(0);
        assert!(!dashing.can_take_damage(0));
    }
}
