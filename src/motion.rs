//! Per-frame swimming: heading drift, straight-line advance, and wraparound
//! at a padded viewport edge.

use crate::stage::{SpriteId, Stage, Vec2};
use rand::Rng;
use std::f32::consts::{FRAC_PI_2, TAU};

/// Margin outside the visible area where a fish is still considered on stage.
pub const STAGE_PADDING: f32 = 100.0;
/// Scales `turn_rate` into the per-frame heading change.
pub const TURN_DAMPING: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

/// A swimming fish. The sprite itself lives in the [`Stage`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fish {
    pub sprite: SpriteId,
    /// Radians; travel direction is `(sin, cos)` of this.
    pub heading: f32,
    pub speed: f32,
    pub turn_rate: f32,
}

/// Randomised starting traits for a new fish.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwimTraits {
    pub heading: f32,
    pub speed: f32,
    pub turn_rate: f32,
    pub scale: f32,
}

impl SwimTraits {
    pub fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            heading: rng.gen::<f32>() * TAU,
            speed: 2.0 + rng.gen::<f32>() * 2.0,
            turn_rate: rng.gen::<f32>() - 0.8,
            scale: 0.5 + rng.gen::<f32>() * 0.2,
        }
    }
}

/// Sprite rotation that points a left-facing texture along `heading`.
pub fn facing_rotation(heading: f32) -> f32 {
    -heading - FRAC_PI_2
}

/// Wraps one coordinate through the padded band `[-pad, dim + pad]`.
pub fn wrap_axis(value: f32, dim: f32) -> f32 {
    let bound = dim + STAGE_PADDING * 2.0;
    let mut v = value;
    if v < -STAGE_PADDING {
        v += bound;
    }
    if v > dim + STAGE_PADDING {
        v -= bound;
    }
    v
}

/// Maps a coordinate that may be several bounds away back into `[-pad, dim + pad]`.
/// Values already inside are returned unchanged.
pub fn fold_into_band(value: f32, dim: f32) -> f32 {
    if (-STAGE_PADDING..=dim + STAGE_PADDING).contains(&value) {
        return value;
    }
    -STAGE_PADDING + (value + STAGE_PADDING).rem_euclid(dim + STAGE_PADDING * 2.0)
}

/// Advances every fish by one frame. Fish whose sprite no longer exists are
/// dropped first (order of the rest is kept); returns how many were dropped.
pub fn animate_fishes(stage: &mut Stage, fishes: &mut Vec<Fish>, viewport: Viewport) -> usize {
    let before = fishes.len();
    fishes.retain(|f| stage.sprite(f.sprite).is_some());
    let dropped = before - fishes.len();
    if dropped > 0 {
        log::debug!("dropped {dropped} fish without a live sprite");
    }

    for fish in fishes.iter_mut() {
        let Some(sprite) = stage.sprite_mut(fish.sprite) else {
            continue;
        };
        fish.heading += fish.turn_rate * TURN_DAMPING;

        sprite.position.x += fish.heading.sin() * fish.speed;
        sprite.position.y += fish.heading.cos() * fish.speed;
        sprite.rotation = facing_rotation(fish.heading);

        sprite.position.x = wrap_axis(sprite.position.x, viewport.width);
        sprite.position.y = wrap_axis(sprite.position.y, viewport.height);
    }
    dropped
}
