//! # `locomotion_controller`
//!
//! A 3D rigidbody locomotion controller driven by a finite state machine,
//! with a physics backend abstraction.
//!
//! This crate provides a third-person character controller that:
//! - Runs Idle, Move, Sprint, Jump, Land, Slide and WallRun as states of a
//!   generic [`fsm::StateMachine`]
//! - Applies its own three-band gravity, horizontal drag and camera-relative
//!   movement on the fixed tick
//! - Detects ground and side walls with raycasts
//! - Queues jumps pressed in the air and runs along walls
//! - Abstracts the physics backend (Rapier3D included)
//!
//! ## Architecture
//!
//! Each fixed tick runs, in order:
//! 1. [`LocomotionSet::Preparation`]: backend housekeeping
//! 2. [`LocomotionSet::Sensors`]: ground and wall raycasts
//! 3. [`LocomotionSet::States`]: the state machine tick
//! 4. [`LocomotionSet::Physics`]: gravity, drag, then movement
//!
//! Each frame runs [`LocomotionSet::Input`] (camera basis, intents, jump
//! presses) followed by [`LocomotionSet::Frame`] (rotation, velocity clamp,
//! queued jumps, wall-run entry).
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use locomotion_controller::prelude::*;
//!
//! // Components for a player character
//! let config = LocomotionConfig::player();
//! let controller = MovementController::from_config(&config);
//! let machine = LocomotionStateMachine::new();
//! let intent = LocomotionIntent::default();
//!
//! // Spawn these together with a physics bundle and a LocomotionCamera
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod config;
pub mod fsm;
pub mod intent;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::{ForceMode, LocomotionPhysicsBackend};
    pub use crate::collision::{CollisionData, WallSide};
    pub use crate::config::{LocomotionCamera, LocomotionConfig, MovementController};
    pub use crate::intent::LocomotionIntent;
    pub use crate::state::{LocomotionContext, LocomotionStateKind, LocomotionStateMachine};
    pub use crate::{LocomotionPlugin, LocomotionSet, LocomotionStateChanged};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// System sets of the locomotion pipeline.
///
/// The first four run chained in `FixedUpdate`, the last two chained in
/// `Update`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocomotionSet {
    /// Backend housekeeping before the tick.
    Preparation,
    /// Ground and wall detection.
    Sensors,
    /// State machine tick.
    States,
    /// Gravity, drag and movement forces.
    Physics,
    /// Input to controller signals.
    Input,
    /// Per-frame velocity shaping and forced transitions.
    Frame,
}

/// Sent for every completed state transition.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocomotionStateChanged {
    /// Character whose machine transitioned.
    pub entity: Entity,
    /// State that was exited, `None` for the first transition.
    pub from: Option<state::LocomotionStateKind>,
    /// State that was entered.
    pub to: state::LocomotionStateKind,
}

/// Main plugin for the locomotion controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (velocity access, forces, sensor raycasts).
///
/// # Examples
///
/// With the Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use locomotion_controller::prelude::*;
///
/// App::new()
///     .add_plugins(DefaultPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
///     .add_plugins(LocomotionPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct LocomotionPlugin<B: backend::LocomotionPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::LocomotionPhysicsBackend> Default for LocomotionPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::LocomotionPhysicsBackend> Plugin for LocomotionPlugin<B> {
    fn build(&self, app: &mut App) {
        app.register_type::<config::LocomotionConfig>();
        app.register_type::<config::MovementController>();
        app.register_type::<config::LocomotionCamera>();
        app.register_type::<intent::LocomotionIntent>();
        app.register_type::<state::LocomotionStateKind>();

        app.add_event::<LocomotionStateChanged>();

        app.configure_sets(
            FixedUpdate,
            (
                LocomotionSet::Preparation,
                LocomotionSet::Sensors,
                LocomotionSet::States,
                LocomotionSet::Physics,
            )
                .chain(),
        );
        app.configure_sets(Update, (LocomotionSet::Input, LocomotionSet::Frame).chain());

        app.add_plugins(B::plugin());

        app.add_systems(
            FixedUpdate,
            systems::tick_state_machines::<B>.in_set(LocomotionSet::States),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::apply_custom_gravity::<B>,
                systems::apply_ground_drag::<B>,
                systems::apply_movement_force::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Physics),
        );

        app.add_systems(
            Update,
            (
                systems::sync_view_basis,
                systems::apply_intents,
                systems::handle_jump_requests::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Input),
        );
        app.add_systems(
            Update,
            (
                systems::rotate_towards_velocity::<B>,
                systems::clamp_velocity::<B>,
                systems::consume_queued_jump::<B>,
                systems::check_wall_run::<B>,
            )
                .chain()
                .in_set(LocomotionSet::Frame),
        );
    }
}
