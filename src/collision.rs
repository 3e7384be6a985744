//! Sensor result structures.
//!
//! These structures hold the results of the physics queries (raycasts) the
//! backend runs for ground and wall proximity.

use bevy::prelude::*;

/// Information about a raycast hit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionData {
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
    /// Normal of the surface at the hit point.
    pub normal: Vec3,
    /// World position of the hit point.
    pub point: Vec3,
    /// Entity that was hit (if known).
    pub entity: Option<Entity>,
}

impl CollisionData {
    /// Create a collision result.
    pub fn new(distance: f32, normal: Vec3, point: Vec3, entity: Option<Entity>) -> Self {
        Self {
            distance,
            normal,
            point,
            entity,
        }
    }
}

/// Which side of the character a wall was detected on.
///
/// Sides are relative to the character model's heading, not world axes.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WallSide {
    Left,
    #[default]
    Right,
}

impl WallSide {
    /// The side a lateral push of `x` points to, if any.
    pub fn from_push(x: f32) -> Option<Self> {
        if x > 0.0 {
            Some(Self::Right)
        } else if x < 0.0 {
            Some(Self::Left)
        } else {
            None
        }
    }

    /// Direction along a wall with surface `normal` that keeps the character
    /// travelling forward while the wall is on this side.
    pub fn run_direction(self, normal: Vec3, up: Vec3) -> Vec3 {
        match self {
            Self::Right => normal.cross(up),
            Self::Left => up.cross(normal),
        }
        .normalize_or_zero()
    }
}
