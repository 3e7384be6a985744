//! Input intent component.
//!
//! Intents carry what the player (or AI) wants: a move vector, whether sprint
//! is held, and whether jump is pressed. The input layer writes these every
//! frame from whatever device it uses; the controller turns them into signals
//! on [`MovementController`](crate::config::MovementController).

use bevy::prelude::*;

/// Desired locomotion from input.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use locomotion_controller::prelude::*;
///
/// let mut intent = LocomotionIntent::new();
/// intent.set_move(Vec2::new(0.0, 1.0));
/// assert!(intent.is_moving());
///
/// intent.set_jump_pressed(true);
/// assert!(intent.has_jump_request());
///
/// intent.clear_move();
/// assert!(!intent.is_moving());
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct LocomotionIntent {
    /// Move vector (x = strafe right, y = forward), within the unit disk.
    pub move_vector: Vec2,
    /// Whether sprint is held.
    pub sprint: bool,
    /// Whether jump is currently held.
    ///
    /// Use [`set_jump_pressed`](Self::set_jump_pressed) so the rising edge is
    /// turned into a jump request.
    pub jump_pressed: bool,
    /// Jump request created on the rising edge of `jump_pressed`, waiting to
    /// be handled by the controller.
    pub(crate) jump_request: bool,
}

impl LocomotionIntent {
    /// Create a new empty intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the move vector. Longer vectors are clamped to length 1.
    pub fn set_move(&mut self, direction: Vec2) {
        self.move_vector = direction.clamp_length_max(1.0);
    }

    /// Zero the move vector (input released).
    pub fn clear_move(&mut self) {
        self.move_vector = Vec2::ZERO;
    }

    /// Set whether sprint is held.
    pub fn set_sprint(&mut self, held: bool) {
        self.sprint = held;
    }

    /// Set the jump button state.
    ///
    /// Call this every frame with the current state. Going from released to
    /// pressed creates one jump request; holding the button does not repeat it.
    pub fn set_jump_pressed(&mut self, pressed: bool) {
        if pressed && !self.jump_pressed {
            self.jump_request = true;
        }
        self.jump_pressed = pressed;
    }

    /// Request a jump directly, bypassing edge detection.
    pub fn request_jump(&mut self) {
        self.jump_request = true;
    }

    /// Check if there's a pending jump request.
    pub fn has_jump_request(&self) -> bool {
        self.jump_request
    }

    /// Take and consume the pending jump request.
    pub fn take_jump_request(&mut self) -> bool {
        std::mem::take(&mut self.jump_request)
    }

    /// Check if there is any movement input.
    pub fn is_moving(&self) -> bool {
        self.move_vector != Vec2::ZERO
    }
}
