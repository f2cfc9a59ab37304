use std::collections::BTreeMap;

use tracing::warn;

use super::registry::Entity;
use crate::constants::{obstacle_title, powerup_title};
use crate::desktop::{ScreenRect, WindowAdapter, WindowError, WindowHandle, WindowSpec};
use crate::error::EngineError;
use crate::types::{EntityId, EntityKind, TargetVariant};

/// Pulls a window may keep reporting its pre-move bounds before the
/// reading is taken as real.
const STALE_PULL_LIMIT: u32 = 3;

#[derive(Clone, Copy, Debug)]
struct Binding {
    handle: WindowHandle,
    /// Geometry most recently sent to the window manager.
    pushed: ScreenRect,
    /// What `pushed` was before the latest move. A window manager that
    /// applies moves late keeps reporting this for a while.
    previous: ScreenRect,
    last_reported: ScreenRect,
    unchanged_pulls: u32,
    /// Set when a push failed; the next pull takes the reported bounds.
    resync: bool,
}

impl Binding {
    fn new(handle: WindowHandle, bounds: ScreenRect) -> Self {
        Self {
            handle,
            pushed: bounds,
            previous: bounds,
            last_reported: bounds,
            unchanged_pulls: 0,
            resync: false,
        }
    }

    fn adopt(&mut self, reported: ScreenRect) {
        self.pushed = reported;
        self.previous = reported;
        self.resync = false;
    }
}

/// Outcome of asking the window manager for a window.
#[derive(Debug)]
pub enum Bind {
    Bound(WindowHandle),
    Refused(WindowError),
}

/// Reported geometry that disagrees with what was last pushed.
#[derive(Clone, Debug, PartialEq)]
pub struct Drift {
    pub id: EntityId,
    pub pushed: ScreenRect,
    pub reported: Option<ScreenRect>,
}

/// Entity id to window map, kept in step with the logical geometry.
#[derive(Debug, Default)]
pub struct WindowSync {
    bindings: BTreeMap<EntityId, Binding>,
}

pub fn window_title(kind: EntityKind) -> String {
    match kind {
        EntityKind::Player => "Hunter".to_string(),
        EntityKind::Target(TargetVariant::Boss) => "Boss Target".to_string(),
        EntityKind::Target(_) => "Target".to_string(),
        EntityKind::Obstacle(variant) => obstacle_title(variant).to_string(),
        EntityKind::Powerup(kind) => powerup_title(kind).to_string(),
    }
}

impl WindowSync {
    pub fn create(
        &mut self,
        entity: &Entity,
        desktop: &mut dyn WindowAdapter,
    ) -> Result<Bind, EngineError> {
        let bounds = ScreenRect::from_rect(&entity.rect);
        let spec = WindowSpec {
            title: window_title(entity.kind),
            bounds,
            kind: entity.kind,
        };
        if self.bindings.contains_key(&entity.id) {
            return Err(EngineError::DuplicateId(entity.id));
        }
        let handle = match desktop.create(&spec) {
            Ok(handle) => handle,
            Err(error) => return Ok(Bind::Refused(error)),
        };
        // a reused handle is still owned by `first`, which closes it later
        if let Some((&first, _)) = self
            .bindings
            .iter()
            .find(|(_, binding)| binding.handle == handle)
        {
            return Err(EngineError::SharedWindow {
                handle,
                first,
                second: entity.id,
            });
        }
        // the window manager may have clamped the initial placement
        let placed = desktop.query_bounds(handle).unwrap_or(bounds);
        self.bindings.insert(entity.id, Binding::new(handle, placed));
        Ok(Bind::Bound(handle))
    }

    /// Sends geometry that changed since the last push. Move and resize
    /// failures are transient: logged, and the next pull falls back to the
    /// window's real bounds.
    pub fn push(
        &mut self,
        entity: &Entity,
        desktop: &mut dyn WindowAdapter,
    ) -> Result<(), EngineError> {
        let binding = self
            .bindings
            .get_mut(&entity.id)
            .ok_or(EngineError::UnboundEntity(entity.id))?;
        let target = ScreenRect::from_rect(&entity.rect);
        if target == binding.pushed {
            return Ok(());
        }
        if (target.w, target.h) != (binding.pushed.w, binding.pushed.h) {
            if let Err(error) = desktop.resize(binding.handle, target.w, target.h) {
                warn!(id = entity.id, %error, "window resize failed");
                binding.resync = true;
                return Ok(());
            }
        }
        if (target.x, target.y) != (binding.pushed.x, binding.pushed.y) {
            if let Err(error) = desktop.move_to(binding.handle, target.x, target.y) {
                warn!(id = entity.id, %error, "window move failed");
                binding.resync = true;
                return Ok(());
            }
        }
        binding.previous = binding.pushed;
        binding.pushed = target;
        binding.unchanged_pulls = 0;
        Ok(())
    }

    /// Adopts the window manager's bounds when they differ from the last
    /// push. A window still reporting its pre-move bounds is treated as a
    /// move in flight, up to `STALE_PULL_LIMIT` unchanged readings since that
    /// push. Returns
    /// true when the logical rectangle was changed.
    pub fn pull(
        &mut self,
        entity: &mut Entity,
        desktop: &dyn WindowAdapter,
    ) -> Result<bool, EngineError> {
        let binding = self
            .bindings
            .get_mut(&entity.id)
            .ok_or(EngineError::UnboundEntity(entity.id))?;
        let reported = match desktop.query_bounds(binding.handle) {
            Ok(bounds) => bounds,
            Err(error) => {
                warn!(id = entity.id, %error, "window bounds query failed");
                return Ok(false);
            }
        };
        if reported == binding.last_reported {
            binding.unchanged_pulls = binding.unchanged_pulls.saturating_add(1);
        } else {
            binding.unchanged_pulls = 0;
            binding.last_reported = reported;
        }

        if binding.resync {
            binding.adopt(reported);
            if ScreenRect::from_rect(&entity.rect) == reported {
                return Ok(false);
            }
            entity.rect = reported.to_rect();
            return Ok(true);
        }
        if reported == binding.pushed {
            binding.previous = reported;
            return Ok(false);
        }
        if reported == binding.previous && binding.unchanged_pulls < STALE_PULL_LIMIT {
            return Ok(false);
        }
        entity.rect = reported.to_rect();
        binding.adopt(reported);
        Ok(true)
    }

    /// Closes the entity's window. Safe to call for ids that have none.
    pub fn destroy(&mut self, id: EntityId, desktop: &mut dyn WindowAdapter) {
        let Some(binding) = self.bindings.remove(&id) else {
            return;
        };
        if let Err(error) = desktop.close(binding.handle) {
            warn!(id, %error, "window close failed");
        }
    }

    pub fn close_all(&mut self, desktop: &mut dyn WindowAdapter) -> usize {
        let ids: Vec<EntityId> = self.bindings.keys().copied().collect();
        for id in &ids {
            self.destroy(*id, desktop);
        }
        ids.len()
    }

    pub fn handle_of(&self, id: EntityId) -> Option<WindowHandle> {
        self.bindings.get(&id).map(|binding| binding.handle)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Windows whose reported bounds are more than `tolerance` pixels away
    /// from the last pushed bounds.
    pub fn drift(&self, desktop: &dyn WindowAdapter, tolerance: i32) -> Vec<Drift> {
        self.bindings
            .iter()
            .filter_map(|(&id, binding)| {
                let reported = desktop.query_bounds(binding.handle).ok();
                let within = reported.is_some_and(|r| {
                    (r.x - binding.pushed.x).abs() <= tolerance
                        && (r.y - binding.pushed.y).abs() <= tolerance
                });
                (!within).then_some(Drift {
                    id,
                    pushed: binding.pushed,
                    reported,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::VirtualDesktop;
    use crate::engine::registry::EntityInit;
    use crate::types::{ObstacleVariant, Rect, Vec2};

    fn barrier(id: EntityId, x: f32, y: f32) -> Entity {
        Entity::new(
            id,
            EntityInit::new(
                EntityKind::Obstacle(ObstacleVariant::Barrier),
                Rect::new(x, y, 150.0, 150.0),
            ),
        )
    }

    #[test]
    fn push_skips_unchanged_geometry() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");

        sync.push(&entity, &mut desktop).expect("push");
        assert_eq!(desktop.move_calls, 0);

        entity.rect = Rect::at(Vec2::new(140.4, 100.0), entity.rect.size());
        sync.push(&entity, &mut desktop).expect("push");
        sync.push(&entity, &mut desktop).expect("push again");
        assert_eq!(desktop.move_calls, 1);
        assert_eq!(desktop.resize_calls, 0);
        assert!(sync.drift(&desktop, 1).is_empty());
    }

    #[test]
    fn pull_adopts_window_manager_clamping() {
        let mut desktop = VirtualDesktop::new(800, 600);
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");

        entity.rect = Rect::at(Vec2::new(760.0, 100.0), entity.rect.size());
        sync.push(&entity, &mut desktop).expect("push");
        let changed = sync.pull(&mut entity, &desktop).expect("pull");
        assert!(changed);
        assert_eq!(entity.rect.x, 650.0);
        assert!(sync.drift(&desktop, 1).is_empty());
    }

    #[test]
    fn pull_keeps_subpixel_position_when_window_agrees() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");
        entity.rect.x = 100.3;
        sync.push(&entity, &mut desktop).expect("push");
        assert!(!sync.pull(&mut entity, &desktop).expect("pull"));
        assert_eq!(entity.rect.x, 100.3);
    }

    #[test]
    fn user_drag_shows_up_as_drift_until_pulled() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        let Bind::Bound(handle) = sync.create(&entity, &mut desktop).expect("create") else {
            panic!("window refused");
        };
        desktop.drag(handle, 500, 500);
        assert_eq!(sync.drift(&desktop, 1).len(), 1);
        sync.pull(&mut entity, &desktop).expect("pull");
        assert_eq!(entity.rect.position(), Vec2::new(500.0, 500.0));
        assert!(sync.drift(&desktop, 1).is_empty());
    }

    #[test]
    fn late_moves_are_not_pulled_back() {
        let mut desktop = VirtualDesktop::default();
        desktop.set_lagging_moves(true);
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");

        for step in 1..=10 {
            entity.rect.x = 100.0 + 10.0 * step as f32;
            sync.push(&entity, &mut desktop).expect("push");
            assert!(!sync.pull(&mut entity, &desktop).expect("pull"));
            assert_eq!(entity.rect.x, 100.0 + 10.0 * step as f32);
        }
        desktop.settle();
        assert!(!sync.pull(&mut entity, &desktop).expect("pull"));
        assert_eq!(entity.rect.x, 200.0);
        assert!(sync.drift(&desktop, 1).is_empty());
    }

    #[test]
    fn late_move_after_a_long_rest_is_not_pulled_back() {
        let mut desktop = VirtualDesktop::default();
        desktop.set_lagging_moves(true);
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");
        for _ in 0..10 {
            sync.push(&entity, &mut desktop).expect("push");
            assert!(!sync.pull(&mut entity, &desktop).expect("pull"));
        }

        entity.rect.x = 140.0;
        sync.push(&entity, &mut desktop).expect("push");
        assert!(!sync.pull(&mut entity, &desktop).expect("pull"));
        assert_eq!(entity.rect.x, 140.0);
    }

    #[test]
    fn window_stuck_at_its_old_bounds_is_adopted_eventually() {
        let mut desktop = VirtualDesktop::default();
        desktop.set_lagging_moves(true);
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");

        entity.rect.x = 140.0;
        sync.push(&entity, &mut desktop).expect("push");
        assert!(!sync.pull(&mut entity, &desktop).expect("first pull"));
        assert!(!sync.pull(&mut entity, &desktop).expect("second pull"));
        assert!(sync.pull(&mut entity, &desktop).expect("third pull"));
        assert_eq!(entity.rect.x, 100.0);
    }

    #[test]
    fn failed_move_falls_back_to_real_bounds() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let mut entity = barrier(1, 100.0, 100.0);
        sync.create(&entity, &mut desktop).expect("create");

        desktop.set_fail_moves(true);
        entity.rect.x = 140.0;
        sync.push(&entity, &mut desktop).expect("move failure is transient");
        assert!(sync.pull(&mut entity, &desktop).expect("pull"));
        assert_eq!(entity.rect.x, 100.0);

        desktop.set_fail_moves(false);
        entity.rect.x = 120.0;
        sync.push(&entity, &mut desktop).expect("push");
        assert!(!sync.pull(&mut entity, &desktop).expect("pull"));
        assert_eq!(entity.rect.x, 120.0);
    }

    #[test]
    fn duplicate_id_is_rejected_before_opening_a_window() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let entity = barrier(1, 0.0, 0.0);
        sync.create(&entity, &mut desktop).expect("create");
        assert!(matches!(
            sync.create(&entity, &mut desktop),
            Err(EngineError::DuplicateId(1))
        ));
        assert_eq!(desktop.create_calls, 1);
        assert_eq!(desktop.open_count(), 1);
        assert_eq!(sync.close_all(&mut desktop), 1);
        assert_eq!(desktop.open_count(), 0);
    }

    #[test]
    fn push_without_binding_is_an_invariant_violation() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let entity = barrier(7, 0.0, 0.0);
        assert!(matches!(
            sync.push(&entity, &mut desktop),
            Err(EngineError::UnboundEntity(7))
        ));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut desktop = VirtualDesktop::default();
        let mut sync = WindowSync::default();
        let entity = barrier(1, 0.0, 0.0);
        sync.create(&entity, &mut desktop).expect("create");
        sync.destroy(1, &mut desktop);
        sync.destroy(1, &mut desktop);
        assert_eq!(desktop.open_count(), 0);
        assert_eq!(desktop.close_calls, 1);
    }

    #[test]
    fn refused_create_leaves_no_binding() {
        let mut desktop = VirtualDesktop::default();
        desktop.set_fail_all_creates(true);
        let mut sync = WindowSync::default();
        let entity = barrier(1, 0.0, 0.0);
        let outcome = sync.create(&entity, &mut desktop).expect("no invariant error");
        assert!(matches!(outcome, Bind::Refused(WindowError::Exhausted)));
        assert!(sync.is_empty());
    }
}
