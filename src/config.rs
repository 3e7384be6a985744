//! Controller configuration and runtime signal components.
//!
//! [`LocomotionConfig`] holds the tuning values (speeds, gravity curve, drag,
//! jump and wall-run parameters). [`MovementController`] holds the runtime
//! signals the input layer, the locomotion states and the physics pipeline
//! share every tick.

use bevy::prelude::*;

use crate::collision::{CollisionData, WallSide};

/// Minimum move-vector magnitude that counts as "moving".
pub const MOVE_THRESHOLD: f32 = 0.1;

/// Phase of the custom gravity curve, keyed by vertical velocity.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GravityBand {
    /// Vertical velocity above the apex threshold.
    Rising,
    /// Vertical velocity within the apex threshold (inclusive on both ends).
    Apex,
    /// Vertical velocity below the negated apex threshold.
    Falling,
}

/// Configuration parameters for the locomotion controller.
///
/// Values are not validated here; presets and builders only set fields.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct LocomotionConfig {
    // === Gravity Settings ===
    /// Signed gravity acceleration along up (negative pulls down).
    pub gravity: f32,
    /// Gravity multiplier while rising.
    pub rising_multiplier: f32,
    /// Gravity multiplier around the apex of a jump (floaty hang).
    pub apex_multiplier: f32,
    /// Gravity multiplier while falling (snappier descent).
    pub falling_multiplier: f32,
    /// Symmetric vertical-velocity band treated as the apex.
    pub apex_threshold: f32,

    // === Movement Settings ===
    /// Speed used by the Move state.
    pub walk_speed: f32,
    /// Speed used by the Sprint state.
    pub sprint_speed: f32,
    /// Fraction of the movement force applied while airborne.
    pub air_move_multiplier: f32,
    /// Cap on total speed, enforced every frame.
    pub max_velocity: f32,
    /// Per-frame slerp factor toward the velocity heading.
    pub rotation_blend: f32,

    // === Drag Settings ===
    /// Horizontal drag coefficient while grounded (set by Land).
    pub grounded_drag: f32,
    /// Horizontal drag coefficient while airborne (set by Jump).
    pub airborne_drag: f32,
    /// Horizontal speed below which horizontal velocity is zeroed.
    pub drag_epsilon: f32,

    // === Jump Settings ===
    /// Vertical jump impulse.
    pub jump_force: f32,
    /// Vertical impulse multiplier when jumping at sprint speed.
    pub sprint_jump_boost: f32,
    /// Impulse along the move direction when jumping with input held.
    pub jump_forward_push: f32,
    /// Delay in seconds before the Jump state starts checking for ground.
    pub landing_check_delay: f32,

    // === Wall Run Settings ===
    /// Speed along the wall while wall running.
    pub wall_run_speed: f32,
    /// Constant downward velocity that keeps the character against the wall.
    pub wall_run_down_bias: f32,
    /// Grace period in seconds before wall-run exit conditions are evaluated.
    pub wall_run_grace: f32,

    // === Sensor Settings ===
    /// Length of the downward ground raycast.
    pub ground_check_distance: f32,
    /// Length of the lateral wall raycasts.
    pub wall_check_distance: f32,
    /// Collision layers counted as ground.
    pub ground_layers: u32,
    /// Collision layers counted as wall-runnable walls.
    pub wall_layers: u32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            // Gravity settings
            gravity: -25.0,
            rising_multiplier: 1.0,
            apex_multiplier: 0.6,
            falling_multiplier: 2.5,
            apex_threshold: 0.5,

            // Movement settings
            walk_speed: 100.0,
            sprint_speed: 145.0,
            air_move_multiplier: 0.05,
            max_velocity: 12.0,
            rotation_blend: 0.1,

            // Drag settings
            grounded_drag: 5.0,
            airborne_drag: 0.4,
            drag_epsilon: 0.1,

            // Jump settings
            jump_force: 5.0,
            sprint_jump_boost: 1.2,
            jump_forward_push: 2.0,
            landing_check_delay: 0.2,

            // Wall run settings
            wall_run_speed: 10.0,
            wall_run_down_bias: 2.0,
            wall_run_grace: 0.5,

            // Sensor settings
            ground_check_distance: 1.1,
            wall_check_distance: 0.6,
            ground_layers: u32::MAX,
            wall_layers: u32::MAX,
        }
    }
}

impl LocomotionConfig {
    /// Create a config tuned for responsive player control.
    pub fn player() -> Self {
        Self {
            jump_force: 6.0,
            air_move_multiplier: 0.08,
            ..default()
        }
    }

    /// Create a config for a heavier, slower character.
    pub fn heavy() -> Self {
        Self {
            walk_speed: 70.0,
            sprint_speed: 100.0,
            jump_force: 4.0,
            falling_multiplier: 3.0,
            max_velocity: 9.0,
            ..default()
        }
    }

    /// Which gravity band a vertical velocity falls into.
    pub fn gravity_band(&self, vertical_velocity: f32) -> GravityBand {
        if vertical_velocity > self.apex_threshold {
            GravityBand::Rising
        } else if vertical_velocity >= -self.apex_threshold {
            GravityBand::Apex
        } else {
            GravityBand::Falling
        }
    }

    /// Gravity multiplier for a vertical velocity.
    pub fn gravity_multiplier(&self, vertical_velocity: f32) -> f32 {
        match self.gravity_band(vertical_velocity) {
            GravityBand::Rising => self.rising_multiplier,
            GravityBand::Apex => self.apex_multiplier,
            GravityBand::Falling => self.falling_multiplier,
        }
    }

    /// Builder: set gravity and the three band multipliers.
    pub fn with_gravity_curve(mut self, gravity: f32, rising: f32, apex: f32, falling: f32) -> Self {
        self.gravity = gravity;
        self.rising_multiplier = rising;
        self.apex_multiplier = apex;
        self.falling_multiplier = falling;
        self
    }

    /// Builder: set apex threshold.
    pub fn with_apex_threshold(mut self, threshold: f32) -> Self {
        self.apex_threshold = threshold;
        self
    }

    /// Builder: set walk and sprint speeds.
    pub fn with_speeds(mut self, walk: f32, sprint: f32) -> Self {
        self.walk_speed = walk;
        self.sprint_speed = sprint;
        self
    }

    /// Builder: set max velocity.
    pub fn with_max_velocity(mut self, max_velocity: f32) -> Self {
        self.max_velocity = max_velocity;
        self
    }

    /// Builder: set air move multiplier.
    pub fn with_air_move_multiplier(mut self, multiplier: f32) -> Self {
        self.air_move_multiplier = multiplier;
        self
    }

    /// Builder: set grounded and airborne drag.
    pub fn with_drag(mut self, grounded: f32, airborne: f32) -> Self {
        self.grounded_drag = grounded;
        self.airborne_drag = airborne;
        self
    }

    /// Builder: set jump force and forward push.
    pub fn with_jump(mut self, force: f32, forward_push: f32) -> Self {
        self.jump_force = force;
        self.jump_forward_push = forward_push;
        self
    }

    /// Builder: set landing check delay in seconds.
    pub fn with_landing_check_delay(mut self, seconds: f32) -> Self {
        self.landing_check_delay = seconds;
        self
    }

    /// Builder: set wall-run speed and grace period.
    pub fn with_wall_run(mut self, speed: f32, grace: f32) -> Self {
        self.wall_run_speed = speed;
        self.wall_run_grace = grace;
        self
    }

    /// Builder: set sensor distances.
    pub fn with_sensor_distances(mut self, ground: f32, wall: f32) -> Self {
        self.ground_check_distance = ground;
        self.wall_check_distance = wall;
        self
    }

    /// Builder: set ground and wall collision layers.
    pub fn with_layers(mut self, ground: u32, wall: u32) -> Self {
        self.ground_layers = ground;
        self.wall_layers = wall;
        self
    }

    /// Builder: set rotation blend factor.
    pub fn with_rotation_blend(mut self, blend: f32) -> Self {
        self.rotation_blend = blend;
        self
    }
}

/// Core movement controller component.
///
/// This is the **signal hub** between the input layer, the locomotion states
/// and the physics pipeline. Input systems write the move vector and sprint
/// flag; states write speed, drag and the gravity/movement toggles; the
/// backend's sensor systems write the cached raycast hits.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct MovementController {
    // === Sensor Cache ===
    /// Ground hit below the character. None when airborne.
    #[reflect(ignore)]
    pub floor: Option<CollisionData>,
    /// Wall hit to the model's left. None when no wall is in range.
    #[reflect(ignore)]
    pub left_wall: Option<CollisionData>,
    /// Wall hit to the model's right. None when no wall is in range.
    #[reflect(ignore)]
    pub right_wall: Option<CollisionData>,

    // === Input Signals ===
    /// Move vector from input (x = strafe right, y = forward).
    pub move_vector: Vec2,
    /// Whether sprint is held.
    pub sprinting: bool,
    /// A jump requested while airborne, waiting for ground.
    pub jump_queued: bool,

    // === State Signals ===
    /// Current movement speed, set by Move and Sprint.
    pub speed: f32,
    /// Current horizontal drag coefficient, set by Jump and Land.
    pub ground_drag: f32,
    /// Whether custom gravity is applied.
    pub gravity_enabled: bool,
    /// Whether the movement force is applied.
    pub movement_enabled: bool,

    // === View Basis ===
    /// Camera forward, copied from [`LocomotionCamera`] each frame.
    pub view_forward: Vec3,
    /// Camera right, copied from [`LocomotionCamera`] each frame.
    pub view_right: Vec3,
}

impl Default for MovementController {
    fn default() -> Self {
        Self::from_config(&LocomotionConfig::default())
    }
}

impl MovementController {
    /// Create a controller with default config values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller whose speed and drag start at `config`'s grounded values.
    pub fn from_config(config: &LocomotionConfig) -> Self {
        Self {
            floor: None,
            left_wall: None,
            right_wall: None,
            move_vector: Vec2::ZERO,
            sprinting: false,
            jump_queued: false,
            speed: config.walk_speed,
            ground_drag: config.grounded_drag,
            gravity_enabled: true,
            movement_enabled: true,
            view_forward: Vec3::NEG_Z,
            view_right: Vec3::X,
        }
    }

    /// Check if grounded (the ground raycast hit something).
    pub fn is_grounded(&self) -> bool {
        self.floor.is_some()
    }

    /// Check if the move vector counts as moving.
    pub fn is_moving(&self) -> bool {
        self.move_vector.length() >= MOVE_THRESHOLD
    }

    /// Get the cached wall hit on a side.
    pub fn wall(&self, side: WallSide) -> Option<&CollisionData> {
        match side {
            WallSide::Left => self.left_wall.as_ref(),
            WallSide::Right => self.right_wall.as_ref(),
        }
    }

    /// Check if touching a wall on a side.
    pub fn touching_wall(&self, side: WallSide) -> bool {
        self.wall(side).is_some()
    }

    /// Check if touching any wall.
    pub fn touching_any_wall(&self) -> bool {
        self.left_wall.is_some() || self.right_wall.is_some()
    }

    /// The side of the wall the lateral input pushes toward, if it is in contact.
    pub fn pushed_wall_side(&self) -> Option<WallSide> {
        WallSide::from_push(self.move_vector.x).filter(|&side| self.touching_wall(side))
    }

    /// Camera forward projected onto the horizontal plane.
    pub fn flat_forward(&self) -> Vec3 {
        Vec3::new(self.view_forward.x, 0.0, self.view_forward.z).normalize_or_zero()
    }

    /// Camera right projected onto the horizontal plane.
    pub fn flat_right(&self) -> Vec3 {
        Vec3::new(self.view_right.x, 0.0, self.view_right.z).normalize_or_zero()
    }

    /// World-space horizontal direction for the current move vector (not normalized).
    pub fn wish_direction(&self) -> Vec3 {
        self.flat_forward() * self.move_vector.y + self.flat_right() * self.move_vector.x
    }

    /// Queue a jump to run on the next grounded frame.
    pub fn queue_jump(&mut self) {
        self.jump_queued = true;
    }

    /// Take the queued jump if the character is grounded.
    ///
    /// Returns true at most once per queued jump.
    pub fn take_queued_jump(&mut self) -> bool {
        if self.jump_queued && self.is_grounded() {
            self.jump_queued = false;
            true
        } else {
            false
        }
    }

    /// Reset cached sensor hits (called by backends before raycasting).
    pub fn reset_detection_state(&mut self) {
        self.floor = None;
        self.left_wall = None;
        self.right_wall = None;
    }
}

/// Points a character at the camera whose basis drives movement.
///
/// Without this component the world basis (-Z forward, +X right) is used.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct LocomotionCamera(pub Entity);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gravity_band_boundaries_are_inclusive_for_apex() {
        let config = LocomotionConfig::default().with_apex_threshold(0.5);

        assert_eq!(config.gravity_band(0.51), GravityBand::Rising);
        assert_eq!(config.gravity_band(0.5), GravityBand::Apex);
        assert_eq!(config.gravity_band(0.0), GravityBand::Apex);
        assert_eq!(config.gravity_band(-0.5), GravityBand::Apex);
        assert_eq!(config.gravity_band(-0.51), GravityBand::Falling);
    }

    #[test]
    fn gravity_multiplier_per_band() {
        let config = LocomotionConfig::default().with_gravity_curve(-25.0, 1.0, 0.6, 2.5);

        assert_eq!(config.gravity_multiplier(3.0), 1.0);
        assert_eq!(config.gravity_multiplier(0.1), 0.6);
        assert_eq!(config.gravity_multiplier(-3.0), 2.5);
    }

    #[test]
    fn controller_starts_with_grounded_values() {
        let config = LocomotionConfig::default().with_drag(7.0, 0.2);
        let controller = MovementController::from_config(&config);

        assert_eq!(controller.speed, config.walk_speed);
        assert_eq!(controller.ground_drag, 7.0);
        assert!(controller.gravity_enabled);
        assert!(controller.movement_enabled);
        assert!(!controller.is_grounded());
    }

    #[test]
    fn moving_threshold_is_inclusive() {
        let mut controller = MovementController::new();
        controller.move_vector = Vec2::new(0.0, 0.0999);
        assert!(!controller.is_moving());

        controller.move_vector = Vec2::new(0.0, 0.1);
        assert!(controller.is_moving());
    }

    #[test]
    fn queued_jump_is_taken_once_on_ground() {
        let mut controller = MovementController::new();
        controller.queue_jump();

        // Still airborne: nothing to take.
        assert!(!controller.take_queued_jump());
        assert!(controller.jump_queued);

        controller.floor = Some(CollisionData::new(1.0, Vec3::Y, Vec3::ZERO, None));
        assert!(controller.take_queued_jump());
        assert!(!controller.jump_queued);
        assert!(!controller.take_queued_jump());
    }

    #[test]
    fn pushed_wall_side_requires_contact() {
        let mut controller = MovementController::new();
        controller.move_vector = Vec2::new(1.0, 0.0);
        assert_eq!(controller.pushed_wall_side(), None);

        controller.right_wall = Some(CollisionData::new(0.3, Vec3::NEG_X, Vec3::ZERO, None));
        assert_eq!(controller.pushed_wall_side(), Some(WallSide::Right));

        controller.move_vector = Vec2::new(-1.0, 0.0);
        assert_eq!(controller.pushed_wall_side(), None);
    }

    #[test]
    fn wish_direction_is_flattened() {
        let mut controller = MovementController::new();
        controller.view_forward = Vec3::new(0.0, -0.7, -0.7);
        controller.view_right = Vec3::X;
        controller.move_vector = Vec2::new(0.0, 1.0);

        let wish = controller.wish_direction();
        assert!(wish.y.abs() < 1e-6);
        assert!((wish - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn config_presets() {
        let heavy = LocomotionConfig::heavy();
        let default = LocomotionConfig::default();
        assert!(heavy.walk_speed < default.walk_speed);
        assert!(LocomotionConfig::player().jump_force > default.jump_force);
    }
}
