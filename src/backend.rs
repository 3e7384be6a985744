//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement
//! to work with the locomotion controller. The controller never talks to a
//! physics engine directly: it reads and writes velocity, applies forces and
//! reads the model heading through this trait, and relies on the backend's
//! plugin to keep the cached sensor results on
//! [`MovementController`](crate::config::MovementController) current.

use bevy::prelude::*;

/// How a vector passed to [`LocomotionPhysicsBackend::apply_force`] is applied.
///
/// Mirrors the four modes common to rigid-body engines.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceMode {
    /// Continuous force, mass dependent, integrated over the physics step.
    Force,
    /// Instantaneous change in momentum, mass dependent.
    Impulse,
    /// Instantaneous change in velocity, mass independent.
    VelocityChange,
    /// Continuous acceleration, mass independent, integrated over the fixed step.
    Acceleration,
}

/// Trait for physics backend implementations.
///
/// Implement this trait to integrate a physics engine with the locomotion
/// controller. All methods are static and operate on the ECS world, so
/// backends can be swapped without touching the controller systems.
///
/// Besides these methods a backend is expected to install, through
/// [`plugin`](Self::plugin), systems in
/// [`LocomotionSet::Sensors`](crate::LocomotionSet::Sensors) that perform the
/// ground and wall raycasts and store the hits on the controller.
///
/// # Example
///
/// For an example implementation, see the `rapier` module's `Rapier3dBackend`.
pub trait LocomotionPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Get the current linear velocity of an entity.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of an entity.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Apply `vector` to an entity using the given [`ForceMode`].
    fn apply_force(world: &mut World, entity: Entity, vector: Vec3, mode: ForceMode);

    /// Get the current world position of an entity.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Get the current model heading of an entity.
    fn get_rotation(world: &World, entity: Entity) -> Quat;

    /// Set the model heading of an entity.
    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat);

    /// Get the fixed timestep delta time.
    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

/// Helper struct for describing a sensor raycast.
#[derive(Debug, Clone, Copy)]
pub struct RaycastRequest {
    /// Origin point of the ray.
    pub origin: Vec3,
    /// Direction of the ray (normalized on construction).
    pub direction: Vec3,
    /// Maximum distance to cast.
    pub max_distance: f32,
    /// Layer mask the hit collider must belong to.
    pub layers: u32,
    /// Entity to exclude from results.
    pub exclude: Option<Entity>,
}

impl RaycastRequest {
    /// Create a new raycast request against all layers.
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
            layers: u32::MAX,
            exclude: None,
        }
    }

    /// Restrict the raycast to colliders in `layers`.
    pub fn on_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }

    /// Exclude an entity from the raycast.
    pub fn excluding(mut self, entity: Entity) -> Self {
        self.exclude = Some(entity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raycast_request_normalizes_direction() {
        let request = RaycastRequest::new(Vec3::ZERO, Vec3::new(0.0, -3.0, 0.0), 1.1);
        assert_eq!(request.direction, Vec3::NEG_Y);
        assert_eq!(request.layers, u32::MAX);
        assert!(request.exclude.is_none());
    }

    #[test]
    fn raycast_request_builders() {
        let entity = Entity::from_raw(3);
        let request = RaycastRequest::new(Vec3::ZERO, Vec3::X, 0.6)
            .on_layers(0b10)
            .excluding(entity);
        assert_eq!(request.layers, 0b10);
        assert_eq!(request.exclude, Some(entity));
    }
}
