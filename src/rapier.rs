//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use bevy::prelude::*;
use bevy_rapier3d::geometry::Group;
use bevy_rapier3d::prelude::*;

use crate::backend::{ForceMode, LocomotionPhysicsBackend, RaycastRequest};
use crate::collision::CollisionData;
use crate::config::{LocomotionConfig, MovementController};
use crate::LocomotionSet;

/// Rapier3D physics backend for the locomotion controller.
///
/// This backend uses `bevy_rapier3d` for velocity manipulation and force
/// application. Ground and wall raycasts are performed by dedicated Rapier
/// systems that receive `RapierContext` as a system parameter.
pub struct Rapier3dBackend;

impl LocomotionPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn apply_force(world: &mut World, entity: Entity, vector: Vec3, mode: ForceMode) {
        match mode {
            ForceMode::Force => {
                if let Some(mut ext_force) = world.get_mut::<ExternalForce>(entity) {
                    ext_force.force += vector;
                }
                // Remember our share so it can be taken out again next tick.
                if let Some(mut applied) = world.get_mut::<AppliedForce>(entity) {
                    applied.0 += vector;
                }
            }
            ForceMode::Impulse => {
                if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
                    ext_impulse.impulse += vector;
                } else if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
                    // Fallback: apply as velocity change if no ExternalImpulse component
                    vel.linvel += vector;
                }
            }
            ForceMode::VelocityChange => {
                if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
                    vel.linvel += vector;
                }
            }
            ForceMode::Acceleration => {
                let dt = Self::get_fixed_timestep(world);
                if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
                    vel.linvel += vector * dt;
                }
            }
        }
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| world.get::<GlobalTransform>(entity).map(|t| t.translation()))
            .unwrap_or(Vec3::ZERO)
    }

    fn get_rotation(world: &World, entity: Entity) -> Quat {
        world
            .get::<Transform>(entity)
            .map(|t| t.rotation)
            .or_else(|| {
                world.get::<GlobalTransform>(entity).map(|t| {
                    let (_, rotation, _) = t.to_scale_rotation_translation();
                    rotation
                })
            })
            .unwrap_or(Quat::IDENTITY)
    }

    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = rotation;
        }
    }
}

/// Continuous force the controller added to [`ExternalForce`] this tick.
///
/// Rapier keeps `ExternalForce` between steps, so the controller's share is
/// removed at the start of every tick while user forces stay in place.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct AppliedForce(pub Vec3);

/// Plugin that sets up Rapier3D-specific systems for the locomotion controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            clear_applied_forces.in_set(LocomotionSet::Preparation),
        );

        // Ground detection resets the cached hits, so it runs first.
        app.add_systems(
            FixedUpdate,
            (rapier_ground_detection, rapier_wall_detection)
                .chain()
                .in_set(LocomotionSet::Sensors),
        );
    }
}

/// Take last tick's controller force back out of [`ExternalForce`].
pub fn clear_applied_forces(mut q: Query<(&mut ExternalForce, &mut AppliedForce)>) {
    for (mut ext_force, mut applied) in &mut q {
        ext_force.force -= applied.0;
        applied.0 = Vec3::ZERO;
    }
}

/// Perform a raycast using RapierContext.
fn rapier_raycast(context: &RapierContext, request: &RaycastRequest) -> Option<CollisionData> {
    let mut filter = QueryFilter::default()
        .exclude_sensors()
        .groups(CollisionGroups::new(
            Group::ALL,
            Group::from_bits_truncate(request.layers),
        ));

    if let Some(entity) = request.exclude {
        filter = filter.exclude_rigid_body(entity);
    }

    context
        .cast_ray_and_get_normal(
            request.origin,
            request.direction,
            request.max_distance,
            true, // solid = true for solid hits
            filter,
        )
        .map(|(hit_entity, hit)| {
            CollisionData::new(hit.time_of_impact, hit.normal, hit.point, Some(hit_entity))
        })
}

/// Rapier-specific ground detection system.
///
/// Casts straight down from the body center for `ground_check_distance`
/// against `ground_layers`.
fn rapier_ground_detection(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(
        Entity,
        &GlobalTransform,
        &LocomotionConfig,
        &mut MovementController,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, config, mut controller) in &mut q_controllers {
        controller.reset_detection_state();

        let request = RaycastRequest::new(
            transform.translation(),
            Vec3::NEG_Y,
            config.ground_check_distance,
        )
        .on_layers(config.ground_layers)
        .excluding(entity);

        controller.floor = rapier_raycast(&context, &request);
    }
}

/// Rapier-specific wall detection system.
///
/// Casts along the model's left and right for `wall_check_distance` against
/// `wall_layers`. Sides follow the model heading, not the camera.
fn rapier_wall_detection(
    rapier_context: ReadRapierContext,
    mut q_controllers: Query<(
        Entity,
        &GlobalTransform,
        &LocomotionConfig,
        &mut MovementController,
    )>,
) {
    let Ok(context) = rapier_context.single() else {
        return;
    };

    for (entity, transform, config, mut controller) in &mut q_controllers {
        let origin = transform.translation();
        let right = *transform.right();

        let cast = |direction: Vec3| {
            let request = RaycastRequest::new(origin, direction, config.wall_check_distance)
                .on_layers(config.wall_layers)
                .excluding(entity);
            rapier_raycast(&context, &request)
        };

        controller.left_wall = cast(-right);
        controller.right_wall = cast(right);
    }
}

/// Bundle for creating a character with Rapier3D physics.
///
/// Provides the rigid body, velocity tracking, external forces and impulses,
/// axis locking and mass properties the controller expects. Rapier's own
/// gravity is disabled and linear damping is zero, because the controller
/// applies its own gravity and drag.
///
/// # Example
///
/// ```ignore
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use locomotion_controller::prelude::*;
///
/// fn spawn_player(mut commands: Commands) {
///     let config = LocomotionConfig::player();
///     commands.spawn((
///         Transform::from_xyz(0.0, 2.0, 0.0),
///         MovementController::from_config(&config),
///         config,
///         LocomotionStateMachine::new(),
///         LocomotionIntent::default(),
///         Rapier3dCharacterBundle::rotation_locked(),
///         Collider::capsule_y(0.5, 0.5),
///     ));
/// }
/// ```
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    pub velocity: Velocity,
    pub external_force: ExternalForce,
    pub external_impulse: ExternalImpulse,
    pub applied_force: AppliedForce,
    /// Which axes are locked. Physics rotation is normally locked and the
    /// heading is driven by the controller instead.
    pub locked_axes: LockedAxes,
    pub damping: Damping,
    pub gravity_scale: GravityScale,
    /// Computed mass properties. Rapier updates this based on the entity's collider.
    pub mass_properties: ReadMassProperties,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Rapier3dCharacterBundle {
    /// Create a new character bundle with rotation enabled.
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            velocity: Velocity::default(),
            external_force: ExternalForce::default(),
            external_impulse: ExternalImpulse::default(),
            applied_force: AppliedForce::default(),
            locked_axes: LockedAxes::empty(),
            damping: Damping {
                linear_damping: 0.0,
                angular_damping: 1.0,
            },
            gravity_scale: GravityScale(0.0),
            // Rapier will update this based on collider after first physics step
            mass_properties: ReadMassProperties::default(),
        }
    }

    /// Create a character bundle with physics rotation locked.
    ///
    /// The usual choice: collisions never tip the character over, and
    /// `rotate_towards_velocity` still turns the model through its transform.
    pub fn rotation_locked() -> Self {
        Self {
            locked_axes: LockedAxes::ROTATION_LOCKED,
            ..Self::new()
        }
    }

    /// Set the rigid body type for the character.
    pub fn with_body(mut self, body: RigidBody) -> Self {
        self.rigid_body = body;
        self
    }

    /// Set which axes should be locked for the rigid body.
    pub fn with_locked_axes(mut self, axes: LockedAxes) -> Self {
        self.locked_axes = axes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins);
        app.add_plugins(RapierPhysicsPlugin::<NoUserData>::default());
        app.insert_resource(Time::<Fixed>::from_hz(50.0));
        app
    }

    #[test]
    fn rapier_backend_get_position() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((Transform::from_xyz(1.0, 2.0, 3.0), RigidBody::Dynamic))
            .id();

        let pos = Rapier3dBackend::get_position(app.world(), entity);
        assert_eq!(pos, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn rapier_backend_velocity_roundtrip() {
        let mut app = create_test_app();

        let entity = app.world_mut().spawn(Velocity::default()).id();

        Rapier3dBackend::set_velocity(app.world_mut(), entity, Vec3::new(1.0, -2.0, 3.0));
        assert_eq!(
            Rapier3dBackend::get_velocity(app.world(), entity),
            Vec3::new(1.0, -2.0, 3.0)
        );
    }

    #[test]
    fn missing_velocity_reads_zero() {
        let mut app = create_test_app();
        let entity = app.world_mut().spawn_empty().id();

        assert_eq!(Rapier3dBackend::get_velocity(app.world(), entity), Vec3::ZERO);
        Rapier3dBackend::set_velocity(app.world_mut(), entity, Vec3::ONE);
    }

    #[test]
    fn force_modes_map_to_rapier_components() {
        let mut app = create_test_app();
        let entity = app.world_mut().spawn(Rapier3dCharacterBundle::new()).id();
        let world = app.world_mut();

        Rapier3dBackend::apply_force(world, entity, Vec3::X, ForceMode::Force);
        Rapier3dBackend::apply_force(world, entity, Vec3::Y, ForceMode::Impulse);
        Rapier3dBackend::apply_force(world, entity, Vec3::Z, ForceMode::VelocityChange);

        assert_eq!(world.get::<ExternalForce>(entity).unwrap().force, Vec3::X);
        assert_eq!(world.get::<AppliedForce>(entity).unwrap().0, Vec3::X);
        assert_eq!(world.get::<ExternalImpulse>(entity).unwrap().impulse, Vec3::Y);
        assert_eq!(world.get::<Velocity>(entity).unwrap().linvel, Vec3::Z);
    }

    #[test]
    fn acceleration_scales_by_fixed_timestep() {
        let mut app = create_test_app();
        let entity = app.world_mut().spawn(Rapier3dCharacterBundle::new()).id();
        let dt = Rapier3dBackend::get_fixed_timestep(app.world());

        Rapier3dBackend::apply_force(
            app.world_mut(),
            entity,
            Vec3::new(0.0, -25.0, 0.0),
            ForceMode::Acceleration,
        );

        let linvel = app.world().get::<Velocity>(entity).unwrap().linvel;
        assert!((linvel.y + 25.0 * dt).abs() < 1e-5);
    }

    #[test]
    fn rotation_roundtrip() {
        let mut app = create_test_app();
        let entity = app.world_mut().spawn(Transform::default()).id();
        let yaw = Quat::from_rotation_y(1.0);

        Rapier3dBackend::set_rotation(app.world_mut(), entity, yaw);
        assert_eq!(Rapier3dBackend::get_rotation(app.world(), entity), yaw);
    }

    #[test]
    fn clear_applied_forces_keeps_user_force() {
        let mut app = create_test_app();
        app.add_systems(Update, clear_applied_forces);

        let entity = app
            .world_mut()
            .spawn((
                ExternalForce {
                    force: Vec3::new(0.0, 0.0, 5.0),
                    torque: Vec3::ZERO,
                },
                AppliedForce::default(),
            ))
            .id();
        Rapier3dBackend::apply_force(app.world_mut(), entity, Vec3::X, ForceMode::Force);

        app.update();

        let force = app.world().get::<ExternalForce>(entity).unwrap().force;
        assert_eq!(force, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(app.world().get::<AppliedForce>(entity).unwrap().0, Vec3::ZERO);
    }

    #[test]
    fn bundle_disables_rapier_gravity_and_damping() {
        let bundle = Rapier3dCharacterBundle::rotation_locked();
        assert_eq!(bundle.gravity_scale.0, 0.0);
        assert_eq!(bundle.damping.linear_damping, 0.0);
        assert_eq!(bundle.locked_axes, LockedAxes::ROTATION_LOCKED);
        assert_eq!(bundle.rigid_body, RigidBody::Dynamic);
    }

    #[test]
    fn rapier_bundle_components() {
        let mut app = create_test_app();

        let entity = app
            .world_mut()
            .spawn((
                Transform::default(),
                Rapier3dCharacterBundle::new(),
                Collider::capsule_y(0.5, 0.5),
            ))
            .id();

        app.update();

        assert!(app.world().get::<RigidBody>(entity).is_some());
        assert!(app.world().get::<Velocity>(entity).is_some());
        assert!(app.world().get::<ExternalForce>(entity).is_some());
        assert!(app.world().get::<LockedAxes>(entity).is_some());
    }
}
