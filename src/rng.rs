use crate::types::Vec2;

/// Seedable mulberry32 source. Every random decision in a session is drawn
/// from one of these, passed in explicitly.
#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (out as f64 / 4_294_967_296.0) as f32
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        min + self.next_f32() * (max - min)
    }

    pub fn bool(&mut self, probability: f32) -> bool {
        self.next_f32() < probability
    }

    pub fn unit_vector(&mut self) -> Vec2 {
        let angle = self.range(0.0, std::f32::consts::TAU);
        Vec2::new(angle.cos(), angle.sin())
    }

    /// Weighted choice. Returns `None` when no entry has a positive weight.
    pub fn pick_weighted<T: Copy>(&mut self, entries: &[(T, f32)]) -> Option<T> {
        let total: f32 = entries.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        let mut roll = self.next_f32() * total;
        let mut last = None;
        for (value, weight) in entries {
            if *weight <= 0.0 {
                continue;
            }
            if roll < *weight {
                return Some(*value);
            }
            roll -= weight;
            last = Some(*value);
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Rng::new(7);
        let mut b = Rng::new(7);
        for _ in 0..32 {
            assert_eq!(a.next_f32().to_bits(), b.next_f32().to_bits());
        }
    }

    #[test]
    fn weighted_pick_skips_zero_weights() {
        let mut rng = Rng::new(99);
        for _ in 0..500 {
            let picked = rng.pick_weighted(&[('a', 0.0), ('b', 1.0), ('c', 0.0)]);
            assert_eq!(picked, Some('b'));
        }
        assert_eq!(rng.pick_weighted::<char>(&[('a', 0.0)]), None);
    }

    #[test]
    fn weighted_pick_roughly_follows_weights() {
        let mut rng = Rng::new(2024);
        let mut heavy = 0;
        for _ in 0..4_000 {
            if rng.pick_weighted(&[(0u8, 0.8), (1u8, 0.2)]) == Some(0) {
                heavy += 1;
            }
        }
        assert!((2_900..3_500).contains(&heavy), "heavy={heavy}");
    }

    #[test]
    fn unit_vector_has_unit_length() {
        let mut rng = Rng::new(3);
        for _ in 0..64 {
            let v = rng.unit_vector();
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }
}
