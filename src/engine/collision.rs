use std::collections::BTreeSet;

use super::registry::Entity;
use crate::types::{EntityId, EntityKind, Rect, Vec2};

/// One player-vs-entity overlap observed during a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Contact {
    pub other: EntityId,
    pub kind: EntityKind,
}

/// Overlaps between the player rectangle and every other entity, at most one
/// per entity, in id order.
pub fn detect<'a, I>(player: &Rect, entities: I) -> Vec<Contact>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut seen = BTreeSet::new();
    let mut contacts: Vec<Contact> = entities
        .into_iter()
        .filter(|entity| !entity.kind.is_player() && player.overlaps(&entity.rect))
        .filter(|entity| seen.insert(entity.id))
        .map(|entity| Contact {
            other: entity.id,
            kind: entity.kind,
        })
        .collect();
    contacts.sort_by_key(|contact| contact.other);
    contacts
}

/// Smallest single-axis offset that moves `mover` out of `fixed`. Zero when
/// they do not overlap.
pub fn min_translation(mover: &Rect, fixed: &Rect) -> Vec2 {
    if !mover.overlaps(fixed) {
        return Vec2::ZERO;
    }
    let push_left = fixed.x - mover.right();
    let push_right = fixed.right() - mover.x;
    let push_up = fixed.y - mover.bottom();
    let push_down = fixed.bottom() - mover.y;

    let dx = if push_right < -push_left {
        push_right
    } else {
        push_left
    };
    let dy = if push_down < -push_up {
        push_down
    } else {
        push_up
    };

    if dx.abs() <= dy.abs() {
        Vec2::new(dx, 0.0)
    } else {
        Vec2::new(0.0, dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::registry::EntityInit;
    use crate::types::{ObstacleVariant, PowerupKind, TargetVariant};

    fn entity(id: EntityId, kind: EntityKind, rect: Rect) -> Entity {
        Entity::new(id, EntityInit::new(kind, rect))
    }

    #[test]
    fn one_contact_per_overlapping_entity() {
        let player = Rect::new(100.0, 100.0, 100.0, 100.0);
        let target = entity(
            3,
            EntityKind::Target(TargetVariant::Standard),
            Rect::new(150.0, 150.0, 200.0, 150.0),
        );
        let far = entity(
            4,
            EntityKind::Powerup(PowerupKind::Speed),
            Rect::new(900.0, 900.0, 75.0, 75.0),
        );
        let edge = entity(
            5,
            EntityKind::Obstacle(ObstacleVariant::Barrier),
            Rect::new(200.0, 100.0, 150.0, 150.0),
        );
        let contacts = detect(&player, [&target, &far, &edge, &target]);
        assert_eq!(
            contacts,
            vec![Contact {
                other: 3,
                kind: EntityKind::Target(TargetVariant::Standard)
            }]
        );
    }

    #[test]
    fn translation_picks_the_shallow_axis() {
        let barrier = Rect::new(200.0, 200.0, 150.0, 150.0);
        let from_left = Rect::new(120.0, 220.0, 100.0, 100.0);
        assert_eq!(min_translation(&from_left, &barrier), Vec2::new(-20.0, 0.0));

        let from_below = Rect::new(230.0, 340.0, 100.0, 100.0);
        assert_eq!(min_translation(&from_below, &barrier), Vec2::new(0.0, 10.0));

        let resolved = Rect::at(
            from_left.position() + min_translation(&from_left, &barrier),
            from_left.size(),
        );
        assert!(!resolved.overlaps(&barrier));
    }

    #[test]
    fn no_translation_without_overlap() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        assert_eq!(min_translation(&a, &b), Vec2::ZERO);
    }
}
