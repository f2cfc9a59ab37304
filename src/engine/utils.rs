use crate::types::{Rect, Vec2};

use super::collision::min_translation;

pub(super) fn dt_secs(dt_ms: u64) -> f32 {
    dt_ms as f32 / 1000.0
}

/// Advances a rectangle by `velocity` px/s and keeps it inside the arena.
pub(super) fn integrate(rect: &Rect, velocity: Vec2, dt_ms: u64, arena: &Rect) -> Rect {
    Rect::at(rect.position() + velocity * dt_secs(dt_ms), rect.size()).clamped_inside(arena)
}

pub(super) fn scaled_points(points: i32, multiplier: f32) -> i32 {
    (points as f32 * multiplier).round() as i32
}

/// Offset that pushes `mover` out of `fixed` and then `gap` pixels further.
pub(super) fn knockback(mover: &Rect, fixed: &Rect, gap: f32) -> Vec2 {
    let escape = min_translation(mover, fixed);
    if escape.is_zero() {
        return Vec2::ZERO;
    }
    escape + escape.normalized() * gap
}
