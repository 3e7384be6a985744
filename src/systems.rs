//! Core controller systems.
//!
//! The fixed-tick systems (state machine tick, gravity, drag, movement) and
//! the frame systems (rotation, clamping, queued jumps, wall-run entry) that
//! make up the locomotion pipeline. They are generic over the physics backend
//! so a different engine can be swapped in.

use std::time::Duration;

use bevy::prelude::*;

use crate::backend::{ForceMode, LocomotionPhysicsBackend};
use crate::config::{LocomotionCamera, LocomotionConfig, MovementController};
use crate::intent::LocomotionIntent;
use crate::state::{LocomotionContext, LocomotionStateKind, LocomotionStateMachine};
use crate::LocomotionStateChanged;

// ==================== Pure helpers ====================

/// Damp the horizontal components of `velocity` by `factor`, leaving the
/// vertical component untouched. Horizontal speed below `epsilon` snaps to zero.
pub fn damp_horizontal(velocity: Vec3, factor: f32, epsilon: f32) -> Vec3 {
    let horizontal_speed = Vec2::new(velocity.x, velocity.z).length();
    if horizontal_speed < epsilon {
        return Vec3::new(0.0, velocity.y, 0.0);
    }
    let scale = (1.0 - factor).max(0.0);
    Vec3::new(velocity.x * scale, velocity.y, velocity.z * scale)
}

/// Scale `velocity` down to `max` and put the incoming vertical component back.
pub fn clamp_preserving_vertical(velocity: Vec3, max: f32) -> Vec3 {
    if velocity.length() <= max {
        return velocity;
    }
    let mut clamped = velocity.clamp_length_max(max);
    clamped.y = velocity.y;
    clamped
}

/// Yaw rotation that points the model's forward (-Z) along `direction`.
pub fn heading_rotation(direction: Vec3) -> Quat {
    Quat::from_rotation_y(f32::atan2(-direction.x, -direction.z))
}

/// Velocity change the movement force applies this tick.
///
/// Airborne input is scaled by `air_move_multiplier`, except while jumping.
pub fn movement_velocity_change(
    controller: &MovementController,
    config: &LocomotionConfig,
    jumping: bool,
    dt: f32,
) -> Vec3 {
    let control = if controller.is_grounded() || jumping {
        1.0
    } else {
        config.air_move_multiplier
    };
    controller.wish_direction() * controller.speed * control * dt
}

/// Whether the controller satisfies the wall-run entry precondition.
///
/// Airborne, lateral input toward a wall in contact, and falling.
pub fn wall_run_ready(controller: &MovementController, vertical_velocity: f32) -> bool {
    !controller.is_grounded()
        && controller.pushed_wall_side().is_some()
        && vertical_velocity < 0.0
}

// ==================== State machine plumbing ====================

/// Run `f` against an entity's state machine with a fresh [`LocomotionContext`].
///
/// The machine is taken out of the world for the duration of the call. After
/// it returns, the controller snapshot is written back, the velocity is
/// applied if a state set one, and recorded transitions are sent as
/// [`LocomotionStateChanged`] events.
fn run_machine<B: LocomotionPhysicsBackend, R>(
    world: &mut World,
    entity: Entity,
    f: impl FnOnce(&mut LocomotionStateMachine, &mut LocomotionContext) -> R,
) -> Option<R> {
    let controller = world.get::<MovementController>(entity)?.clone();
    let config = *world.get::<LocomotionConfig>(entity)?;
    let mut machine = std::mem::replace(
        &mut *world.get_mut::<LocomotionStateMachine>(entity)?,
        LocomotionStateMachine::empty(LocomotionStateKind::Idle),
    );

    let velocity = B::get_velocity(world, entity);
    let delta = Duration::from_secs_f32(B::get_fixed_timestep(world));
    let mut ctx = LocomotionContext::new(controller, config, velocity, delta);

    let result = f(&mut machine, &mut ctx);

    let records: Vec<_> = machine.drain_transitions().collect();
    if let Some(mut slot) = world.get_mut::<LocomotionStateMachine>(entity) {
        *slot = machine;
    }
    let (controller, velocity) = ctx.into_parts();
    if let Some(mut slot) = world.get_mut::<MovementController>(entity) {
        *slot = controller;
    }
    if let Some(velocity) = velocity {
        B::set_velocity(world, entity, velocity);
    }
    for record in records {
        world.send_event(LocomotionStateChanged {
            entity,
            from: record.from,
            to: record.to,
        });
    }
    Some(result)
}

/// Force an entity's state machine into `kind`, logging failures.
pub fn force_transition<B: LocomotionPhysicsBackend>(
    world: &mut World,
    entity: Entity,
    kind: LocomotionStateKind,
) {
    let result = run_machine::<B, _>(world, entity, |machine, ctx| machine.transition(ctx, kind));
    if let Some(Err(err)) = result {
        warn!("{entity}: forced transition to {kind:?} failed: {err}");
    }
}

// ==================== Fixed tick ====================

/// Tick every locomotion state machine.
///
/// A machine that has not run yet enters its initial state first.
pub fn tick_state_machines<B: LocomotionPhysicsBackend>(world: &mut World) {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, (
            With<LocomotionStateMachine>,
            With<MovementController>,
            With<LocomotionConfig>,
        )>()
        .iter(world)
        .collect();

    for entity in entities {
        let result = run_machine::<B, _>(world, entity, |machine, ctx| {
            let result = machine.start(ctx).and_then(|()| machine.tick(ctx));
            trace!("{entity}: locomotion state {:?}", machine.current());
            result
        });
        if let Some(Err(err)) = result {
            warn!("{entity}: locomotion tick failed: {err}");
        }
    }
}

/// Apply the three-band custom gravity.
///
/// Skipped while a state has gravity disabled.
pub fn apply_custom_gravity<B: LocomotionPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, LocomotionConfig)> = world
        .query::<(Entity, &LocomotionConfig, &MovementController)>()
        .iter(world)
        .filter(|(_, _, controller)| controller.gravity_enabled)
        .map(|(e, config, _)| (e, *config))
        .collect();

    for (entity, config) in entities {
        let velocity = B::get_velocity(world, entity);
        let multiplier = config.gravity_multiplier(velocity.y);
        let acceleration = Vec3::Y * config.gravity * multiplier;
        B::apply_force(world, entity, acceleration, ForceMode::Acceleration);
    }
}

/// Apply the state-dependent horizontal drag.
pub fn apply_ground_drag<B: LocomotionPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, f32, f32)> = world
        .query::<(Entity, &LocomotionConfig, &MovementController)>()
        .iter(world)
        .map(|(e, config, controller)| (e, controller.ground_drag, config.drag_epsilon))
        .collect();

    let dt = B::get_fixed_timestep(world);

    for (entity, drag, epsilon) in entities {
        let velocity = B::get_velocity(world, entity);
        B::set_velocity(world, entity, damp_horizontal(velocity, drag * dt, epsilon));
    }
}

/// Apply the camera-relative movement force as a velocity change.
pub fn apply_movement_force<B: LocomotionPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, LocomotionConfig, MovementController, bool)> = world
        .query::<(
            Entity,
            &LocomotionConfig,
            &MovementController,
            Option<&LocomotionStateMachine>,
        )>()
        .iter(world)
        .filter(|(_, _, controller, _)| {
            controller.movement_enabled && controller.move_vector != Vec2::ZERO
        })
        .map(|(e, config, controller, machine)| {
            let jumping = machine.is_some_and(|m| m.is_currently(LocomotionStateKind::Jump));
            (e, *config, controller.clone(), jumping)
        })
        .collect();

    let dt = B::get_fixed_timestep(world);

    for (entity, config, controller, jumping) in entities {
        let change = movement_velocity_change(&controller, &config, jumping, dt);
        B::apply_force(world, entity, change, ForceMode::VelocityChange);
    }
}

// ==================== Frame tick ====================

/// Copy the camera basis into the controller.
pub fn sync_view_basis(
    mut q_controllers: Query<(&LocomotionCamera, &mut MovementController)>,
    q_cameras: Query<&GlobalTransform>,
) {
    for (camera, mut controller) in &mut q_controllers {
        let Ok(transform) = q_cameras.get(camera.0) else {
            continue;
        };
        controller.view_forward = *transform.forward();
        controller.view_right = *transform.right();
    }
}

/// Copy move and sprint input into the controller signals.
pub fn apply_intents(mut q: Query<(&LocomotionIntent, &mut MovementController)>) {
    for (intent, mut controller) in &mut q {
        controller.move_vector = intent.move_vector;
        controller.sprinting = intent.sprint;
    }
}

/// Jump now if grounded, otherwise queue the jump until landing.
pub fn handle_jump_requests<B: LocomotionPhysicsBackend>(world: &mut World) {
    let requests: Vec<(Entity, bool)> = world
        .query::<(Entity, &mut LocomotionIntent, &MovementController)>()
        .iter_mut(world)
        .filter_map(|(e, mut intent, controller)| {
            intent
                .take_jump_request()
                .then(|| (e, controller.is_grounded()))
        })
        .collect();

    for (entity, grounded) in requests {
        if grounded {
            execute_jump::<B>(world, entity);
        } else if let Some(mut controller) = world.get_mut::<MovementController>(entity) {
            debug!("{entity}: jump queued until landing");
            controller.queue_jump();
        }
    }
}

/// Turn the model toward its horizontal velocity.
///
/// Uses a fixed blend per frame, so turn rate depends on frame rate.
pub fn rotate_towards_velocity<B: LocomotionPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, f32)> = world
        .query::<(Entity, &LocomotionConfig, &MovementController)>()
        .iter(world)
        .filter(|(_, _, controller)| controller.move_vector != Vec2::ZERO)
        .map(|(e, config, _)| (e, config.rotation_blend))
        .collect();

    for (entity, blend) in entities {
        let velocity = B::get_velocity(world, entity);
        let horizontal = Vec3::new(velocity.x, 0.0, velocity.z);
        if horizontal == Vec3::ZERO {
            continue;
        }
        let current = B::get_rotation(world, entity);
        let target = heading_rotation(horizontal);
        if current != target {
            B::set_rotation(world, entity, current.slerp(target, blend));
        }
    }
}

/// Cap speed at `max_velocity` while keeping the vertical component.
pub fn clamp_velocity<B: LocomotionPhysicsBackend>(world: &mut World) {
    let entities: Vec<(Entity, f32)> = world
        .query::<(Entity, &LocomotionConfig)>()
        .iter(world)
        .map(|(e, config)| (e, config.max_velocity))
        .collect();

    for (entity, max_velocity) in entities {
        let velocity = B::get_velocity(world, entity);
        if velocity.length() > max_velocity {
            B::set_velocity(world, entity, clamp_preserving_vertical(velocity, max_velocity));
        }
    }
}

/// Execute a jump queued while airborne on the first grounded frame.
pub fn consume_queued_jump<B: LocomotionPhysicsBackend>(world: &mut World) {
    let ready: Vec<Entity> = world
        .query::<(Entity, &mut MovementController)>()
        .iter_mut(world)
        .filter_map(|(e, mut controller)| controller.take_queued_jump().then_some(e))
        .collect();

    for entity in ready {
        execute_jump::<B>(world, entity);
    }
}

/// Force WallRun when the entry precondition holds.
pub fn check_wall_run<B: LocomotionPhysicsBackend>(world: &mut World) {
    let candidates: Vec<(Entity, MovementController)> = world
        .query::<(Entity, &MovementController, &LocomotionStateMachine)>()
        .iter(world)
        .filter(|(_, _, machine)| !machine.is_currently(LocomotionStateKind::WallRun))
        .map(|(e, controller, _)| (e, controller.clone()))
        .collect();

    for (entity, controller) in candidates {
        let velocity = B::get_velocity(world, entity);
        if wall_run_ready(&controller, velocity.y) {
            force_transition::<B>(world, entity, LocomotionStateKind::WallRun);
        }
    }
}

/// Transition to Jump, then apply the jump impulses.
///
/// The state machine is already in Jump when the impulses land.
pub fn execute_jump<B: LocomotionPhysicsBackend>(world: &mut World, entity: Entity) {
    force_transition::<B>(world, entity, LocomotionStateKind::Jump);

    let Some(controller) = world.get::<MovementController>(entity).cloned() else {
        return;
    };
    let Some(config) = world.get::<LocomotionConfig>(entity).copied() else {
        return;
    };

    let boost = if controller.speed == config.sprint_speed {
        config.sprint_jump_boost
    } else {
        1.0
    };
    B::apply_force(world, entity, Vec3::Y * config.jump_force * boost, ForceMode::Impulse);

    if controller.move_vector != Vec2::ZERO {
        let push = controller.wish_direction() * config.jump_forward_push;
        B::apply_force(world, entity, push, ForceMode::Impulse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::CollisionData;

    #[test]
    fn damp_snaps_slow_horizontal_to_zero() {
        let v = damp_horizontal(Vec3::new(0.05, -3.0, 0.05), 0.1, 0.1);
        assert_eq!(v, Vec3::new(0.0, -3.0, 0.0));
    }

    #[test]
    fn damp_scales_horizontal_only() {
        let v = damp_horizontal(Vec3::new(10.0, 4.0, -2.0), 0.1, 0.1);
        assert!((v - Vec3::new(9.0, 4.0, -1.8)).length() < 1e-5);
    }

    #[test]
    fn damp_never_reverses_direction() {
        let v = damp_horizontal(Vec3::new(10.0, 0.0, 0.0), 3.0, 0.1);
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn clamp_leaves_slow_velocity_alone() {
        let v = Vec3::new(3.0, -2.0, 1.0);
        assert_eq!(clamp_preserving_vertical(v, 12.0), v);
    }

    #[test]
    fn clamp_restores_vertical_component() {
        let v = Vec3::new(30.0, -5.0, 0.0);
        let clamped = clamp_preserving_vertical(v, 12.0);

        assert_eq!(clamped.y, -5.0);
        assert!(Vec2::new(clamped.x, clamped.z).length() <= 12.0);
    }

    #[test]
    fn heading_points_forward_along_direction() {
        for dir in [Vec3::NEG_Z, Vec3::X, Vec3::Z, Vec3::new(-1.0, 0.0, 1.0).normalize()] {
            let forward = heading_rotation(dir) * Vec3::NEG_Z;
            assert!((forward - dir).length() < 1e-5, "{dir:?} -> {forward:?}");
        }
    }

    #[test]
    fn movement_is_scaled_in_air() {
        let config = LocomotionConfig::default();
        let mut controller = MovementController::from_config(&config);
        controller.move_vector = Vec2::new(0.0, 1.0);

        let airborne = movement_velocity_change(&controller, &config, false, 0.02);
        controller.floor = Some(CollisionData::new(1.0, Vec3::Y, Vec3::ZERO, None));
        let grounded = movement_velocity_change(&controller, &config, false, 0.02);

        assert!((grounded - Vec3::NEG_Z * config.walk_speed * 0.02).length() < 1e-4);
        assert!((airborne - grounded * config.air_move_multiplier).length() < 1e-4);
    }

    #[test]
    fn jumping_keeps_full_air_control() {
        let config = LocomotionConfig::default();
        let mut controller = MovementController::from_config(&config);
        controller.move_vector = Vec2::new(0.0, 1.0);

        let jumping = movement_velocity_change(&controller, &config, true, 0.02);

        assert!((jumping - Vec3::NEG_Z * config.walk_speed * 0.02).length() < 1e-4);
    }

    #[test]
    fn wall_run_precondition() {
        let mut controller = MovementController::new();
        controller.move_vector = Vec2::new(1.0, 0.0);
        controller.right_wall = Some(CollisionData::new(0.3, Vec3::NEG_X, Vec3::ZERO, None));

        assert!(wall_run_ready(&controller, -1.0));
        assert!(!wall_run_ready(&controller, 0.0), "rising or level blocks entry");

        controller.move_vector = Vec2::new(0.0, 1.0);
        assert!(!wall_run_ready(&controller, -1.0), "needs lateral push");

        controller.move_vector = Vec2::new(1.0, 0.0);
        controller.floor = Some(CollisionData::new(1.0, Vec3::Y, Vec3::ZERO, None));
        assert!(!wall_run_ready(&controller, -1.0), "grounded blocks entry");
    }
}
