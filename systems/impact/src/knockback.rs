//! Knockback vectors for each weapon technique.

use horde_core::{finite_or_zero, KnockbackVariant, Vec2};
use rand::Rng;

/// Smallest share of the force a radial push keeps at or past its falloff.
pub const RADIAL_MIN_SCALE: f32 = 0.25;

/// Computes the knockback velocity imparted on `target` by a hit from `instigator`.
///
/// The push points away from the instigator. Coincident positions and
/// non-positive or non-finite magnitudes yield [`Vec2::ZERO`]; every other
/// input yields a finite vector of strictly positive length.
pub fn compute_knockback<R: Rng + ?Sized>(
    variant: KnockbackVariant,
    instigator: Vec2,
    target: Vec2,
    magnitude: f32,
    rng: &mut R,
) -> Vec2 {
    if !magnitude.is_finite() || magnitude <= 0.0 {
        return Vec2::ZERO;
    }
    let delta = target - instigator;
    let Some(direction) = delta.try_normalize() else {
        return Vec2::ZERO;
    };

    let (direction, magnitude) = match variant {
        KnockbackVariant::Basic => (direction, magnitude),
        KnockbackVariant::Arc { vertical_bias } => {
            let bias = if vertical_bias.is_finite() {
                vertical_bias
            } else {
                0.0
            };
            let lifted = (direction + Vec2::new(0.0, -bias))
                .try_normalize()
                .unwrap_or(direction);
            (lifted, magnitude)
        }
        KnockbackVariant::Radial { falloff } => {
            let scale = if falloff.is_finite() && falloff > 0.0 {
                (1.0 - delta.length() / falloff).max(RADIAL_MIN_SCALE)
            } else {
                1.0
            };
            (direction, magnitude * scale)
        }
        KnockbackVariant::Ground { jitter } => {
            let jitter = jitter.abs();
            let angle = if jitter.is_finite() && jitter > 0.0 {
                rng.gen_range(-jitter..=jitter)
            } else {
                0.0
            };
            (Vec2::from_angle(angle).rotate(direction), magnitude)
        }
    };

    finite_or_zero(direction * magnitude)
}
