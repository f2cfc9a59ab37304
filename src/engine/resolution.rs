use super::*;

impl GameEngine {
    /// Detects overlaps against the player's position at the start of the
    /// pass, then resolves them in id order.
    pub(super) fn resolve_contacts(&mut self, now_ms: u64) -> Result<(), EngineError> {
        let player_rect = self.player.rect;
        let contacts = collision::detect(&player_rect, self.registry.iter());

        for contact in &contacts {
            match contact.kind {
                EntityKind::Target(TargetVariant::Boss) => self.hit_boss(contact.other, now_ms)?,
                EntityKind::Target(variant) => self.capture_target(contact.other, variant)?,
                EntityKind::Obstacle(ObstacleVariant::Barrier) => self.block_player(contact.other),
                EntityKind::Obstacle(ObstacleVariant::Trap) => {
                    self.spring_trap(contact.other, now_ms)?
                }
                EntityKind::Obstacle(ObstacleVariant::Decoy) => {
                    debug!(id = contact.other, "decoy touched")
                }
                EntityKind::Powerup(kind) => self.collect_powerup(contact.other, kind, now_ms)?,
                EntityKind::Player => {}
            }
        }

        self.contacts = contacts;
        Ok(())
    }

    fn award(&mut self, variant: TargetVariant) -> i32 {
        let (_, score_multiplier) = self.config.difficulty.multipliers();
        let points = scaled_points(target_points(variant), score_multiplier);
        self.difficulty.add_score(points);
        points
    }

    fn capture_target(&mut self, id: EntityId, variant: TargetVariant) -> Result<(), EngineError> {
        let points = self.award(variant);
        self.registry.queue_destroy(id, DespawnCause::Captured)?;
        self.spawner.request_replacement(Category::Target);
        self.stats.targets_captured += 1;
        debug!(id, ?variant, points, "target captured");
        self.events
            .push(RuntimeEvent::TargetCaptured { id, variant, points });
        Ok(())
    }

    fn hit_boss(&mut self, id: EntityId, now_ms: u64) -> Result<(), EngineError> {
        let player_rect = self.player.rect;
        let arena = self.arena;
        let Some(boss) = self.registry.get_mut(id) else {
            return Ok(());
        };
        let hp = boss.health.unwrap_or(1) - 1;
        boss.health = Some(hp);

        if hp <= 0 {
            self.events.push(RuntimeEvent::BossHit { id, hp: 0 });
            self.stats.bosses_defeated += 1;
            return self.capture_target(id, TargetVariant::Boss);
        }

        boss.behavior.stunned_until_ms = now_ms + BOSS_STUN_MS;
        let offset = knockback(&boss.rect, &player_rect, BOSS_KNOCKBACK_GAP);
        boss.rect =
            Rect::at(boss.rect.position() + offset, boss.rect.size()).clamped_inside(&arena);
        let boss_rect = boss.rect;
        if boss_rect.overlaps(&player_rect) {
            // pinned against a screen edge; the player gives way instead
            let offset = knockback(&player_rect, &boss_rect, BOSS_KNOCKBACK_GAP);
            self.player.rect =
                Rect::at(player_rect.position() + offset, player_rect.size()).clamped_inside(&arena);
        }
        self.events.push(RuntimeEvent::BossHit { id, hp });

        if self.abilities.can_take_damage(now_ms) {
            self.damage_player(id, now_ms);
        }
        Ok(())
    }

    fn damage_player(&mut self, by: EntityId, now_ms: u64) {
        let health = self.player_health() - 1;
        self.player.health = Some(health);
        self.abilities.mark_damaged(now_ms);
        info!(by, health, "player damaged");
        self.events.push(RuntimeEvent::PlayerDamaged { by, health });
    }

    fn block_player(&mut self, id: EntityId) {
        let Some(barrier) = self.registry.get(id) else {
            return;
        };
        let offset = collision::min_translation(&self.player.rect, &barrier.rect);
        if offset.is_zero() {
            return;
        }
        self.player.rect = Rect::at(self.player.rect.position() + offset, self.player.rect.size())
            .clamped_inside(&self.arena);
        self.events.push(RuntimeEvent::PlayerBlocked { by: id });
    }

    fn spring_trap(&mut self, id: EntityId, now_ms: u64) -> Result<(), EngineError> {
        if self.abilities.shielded(now_ms) {
            debug!(id, "trap contact absorbed by shield");
            return Ok(());
        }
        let applied = self.abilities.apply(EffectKind::Freeze, now_ms);
        debug!(id, until_ms = applied.until_ms, "player frozen");
        self.events.push(RuntimeEvent::PlayerFrozen {
            by: id,
            until_ms: applied.until_ms,
        });
        self.registry.queue_destroy(id, DespawnCause::Sprung)
    }

    fn collect_powerup(
        &mut self,
        id: EntityId,
        kind: PowerupKind,
        now_ms: u64,
    ) -> Result<(), EngineError> {
        let effect = EffectKind::from(kind);
        let applied = self.abilities.apply(effect, now_ms);
        debug!(id, ?effect, refreshed = applied.refreshed, "powerup collected");
        self.events.push(RuntimeEvent::EffectApplied {
            kind: effect,
            until_ms: applied.until_ms,
            refreshed: applied.refreshed,
        });
        self.registry.queue_destroy(id, DespawnCause::Collected)
    }
}
