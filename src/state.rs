//! Locomotion states.
//!
//! The seven locomotion states plug into the generic [`StateMachine`] with a
//! [`LocomotionContext`] as owner context. Each state only sees the signals
//! the context exposes, so every side effect a state can have is visible in
//! the context's setter list.
//!
//! Timed waits (Jump's landing check, WallRun's grace period) are countdown
//! timers stored on the state, ticked by the fixed delta in `update` and
//! cleared in `exit`, so a state that is left early never acts later.

use std::time::Duration;

use bevy::prelude::*;

use crate::collision::{CollisionData, WallSide};
use crate::config::{LocomotionConfig, MovementController};
use crate::fsm::{State, StateMachine, Transition, TransitionError, TransitionRecord};

/// Discriminant of each locomotion state.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocomotionStateKind {
    #[default]
    Idle,
    Move,
    Sprint,
    Jump,
    Land,
    Slide,
    WallRun,
}

/// Explicit owner context handed to locomotion states.
///
/// Holds a snapshot of the controller signals, the config, the body velocity
/// and the fixed delta. The ECS layer builds one per tick, runs the machine,
/// and writes the snapshot (and the velocity, if a state set it) back.
#[derive(Debug, Clone)]
pub struct LocomotionContext {
    controller: MovementController,
    config: LocomotionConfig,
    velocity: Vec3,
    velocity_written: bool,
    delta: Duration,
}

impl LocomotionContext {
    pub fn new(
        controller: MovementController,
        config: LocomotionConfig,
        velocity: Vec3,
        delta: Duration,
    ) -> Self {
        Self {
            controller,
            config,
            velocity,
            velocity_written: false,
            delta,
        }
    }

    /// Consume the context, returning the controller snapshot and the
    /// velocity if a state wrote one.
    pub fn into_parts(self) -> (MovementController, Option<Vec3>) {
        let velocity = self.velocity_written.then_some(self.velocity);
        (self.controller, velocity)
    }

    /// Read-only view of the controller signals.
    pub fn controller(&self) -> &MovementController {
        &self.controller
    }

    pub fn config(&self) -> &LocomotionConfig {
        &self.config
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn move_vector(&self) -> Vec2 {
        self.controller.move_vector
    }

    pub fn is_moving(&self) -> bool {
        self.controller.is_moving()
    }

    pub fn is_sprinting(&self) -> bool {
        self.controller.sprinting
    }

    pub fn is_grounded(&self) -> bool {
        self.controller.is_grounded()
    }

    pub fn wall(&self, side: WallSide) -> Option<CollisionData> {
        self.controller.wall(side).copied()
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.controller.speed = speed;
    }

    pub fn set_ground_drag(&mut self, drag: f32) {
        self.controller.ground_drag = drag;
    }

    pub fn set_gravity_enabled(&mut self, enabled: bool) {
        self.controller.gravity_enabled = enabled;
    }

    pub fn set_movement_enabled(&mut self, enabled: bool) {
        self.controller.movement_enabled = enabled;
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
        self.velocity_written = true;
    }
}

type Next = Transition<LocomotionStateKind>;

/// Stands still until the move vector counts as moving.
#[derive(Debug, Default)]
pub struct IdleState;

impl IdleState {
    fn check(ctx: &LocomotionContext) -> Next {
        if ctx.is_moving() {
            Transition::To(LocomotionStateKind::Move)
        } else {
            Transition::Stay
        }
    }
}

impl State<LocomotionContext> for IdleState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::Idle
    }

    fn enter(&mut self, ctx: &mut LocomotionContext) -> Next {
        Self::check(ctx)
    }

    fn update(&mut self, ctx: &mut LocomotionContext) -> Next {
        Self::check(ctx)
    }

    fn exit(&mut self, _ctx: &mut LocomotionContext) {}
}

/// Walks at walk speed; hands off to Sprint or Idle.
#[derive(Debug, Default)]
pub struct MoveState;

impl MoveState {
    fn check(ctx: &mut LocomotionContext) -> Next {
        if !ctx.is_moving() {
            Transition::To(LocomotionStateKind::Idle)
        } else if ctx.is_sprinting() {
            Transition::To(LocomotionStateKind::Sprint)
        } else {
            let speed = ctx.config().walk_speed;
            ctx.set_speed(speed);
            Transition::Stay
        }
    }
}

impl State<LocomotionContext> for MoveState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::Move
    }

    fn enter(&mut self, ctx: &mut LocomotionContext) -> Next {
        Self::check(ctx)
    }

    fn update(&mut self, ctx: &mut LocomotionContext) -> Next {
        Self::check(ctx)
    }

    fn exit(&mut self, _ctx: &mut LocomotionContext) {}
}

/// Runs at sprint speed. Losing movement input wins over the sprint flag.
#[derive(Debug, Default)]
pub struct SprintState;

impl SprintState {
    fn check(ctx: &mut LocomotionContext) -> Next {
        if !ctx.is_moving() {
            Transition::To(LocomotionStateKind::Idle)
        } else if !ctx.is_sprinting() {
            Transition::To(LocomotionStateKind::Move)
        } else {
            let speed = ctx.config().sprint_speed;
            ctx.set_speed(speed);
            Transition::Stay
        }
    }
}

impl State<LocomotionContext> for SprintState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::Sprint
    }

    fn enter(&mut self, ctx: &mut LocomotionContext) -> Next {
        Self::check(ctx)
    }

    fn update(&mut self, ctx: &mut LocomotionContext) -> Next {
        Self::check(ctx)
    }

    fn exit(&mut self, _ctx: &mut LocomotionContext) {}
}

/// Airborne after a jump. Checks for ground once the landing delay elapses.
#[derive(Debug, Default)]
pub struct JumpState {
    landing_check: Option<Timer>,
}

impl JumpState {
    /// Whether a landing check countdown is in flight.
    pub fn landing_check_pending(&self) -> bool {
        self.landing_check.is_some()
    }
}

impl State<LocomotionContext> for JumpState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::Jump
    }

    fn enter(&mut self, _ctx: &mut LocomotionContext) -> Next {
        debug!("entered jump state");
        Transition::Stay
    }

    fn update(&mut self, ctx: &mut LocomotionContext) -> Next {
        let drag = ctx.config().airborne_drag;
        ctx.set_ground_drag(drag);

        let delay = ctx.config().landing_check_delay.max(0.0);
        let timer = self
            .landing_check
            .get_or_insert_with(|| Timer::from_seconds(delay, TimerMode::Once));
        timer.tick(ctx.delta());
        if !timer.finished() {
            return Transition::Stay;
        }

        self.landing_check = None;
        if ctx.is_grounded() {
            Transition::To(LocomotionStateKind::Land)
        } else {
            Transition::Stay
        }
    }

    fn exit(&mut self, _ctx: &mut LocomotionContext) {
        self.landing_check = None;
    }
}

/// One-tick pass-through: restores grounded drag and hands off to Idle.
#[derive(Debug, Default)]
pub struct LandState;

impl State<LocomotionContext> for LandState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::Land
    }

    fn enter(&mut self, ctx: &mut LocomotionContext) -> Next {
        let drag = ctx.config().grounded_drag;
        ctx.set_ground_drag(drag);
        Transition::To(LocomotionStateKind::Idle)
    }

    fn update(&mut self, _ctx: &mut LocomotionContext) -> Next {
        Transition::Stay
    }

    fn exit(&mut self, _ctx: &mut LocomotionContext) {}
}

/// Placeholder for sliding; registered but never entered by the built-in graph.
#[derive(Debug, Default)]
pub struct SlideState;

impl State<LocomotionContext> for SlideState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::Slide
    }

    fn enter(&mut self, _ctx: &mut LocomotionContext) -> Next {
        Transition::Stay
    }

    fn update(&mut self, _ctx: &mut LocomotionContext) -> Next {
        Transition::Stay
    }

    fn exit(&mut self, _ctx: &mut LocomotionContext) {}
}

/// Data for one wall-run, from `enter` to `exit`.
#[derive(Debug, Clone)]
pub struct WallRunEpisode {
    /// Side the wall is on, fixed at entry.
    pub side: WallSide,
    /// Wall surface normal at entry.
    pub normal: Vec3,
    /// Unit direction of travel along the wall.
    pub direction: Vec3,
    /// Set once the grace period has elapsed.
    pub cancellable: bool,
    grace: Timer,
}

impl WallRunEpisode {
    fn velocity(&self, config: &LocomotionConfig) -> Vec3 {
        self.direction * config.wall_run_speed - Vec3::Y * config.wall_run_down_bias
    }
}

/// Runs along a wall with gravity and free movement suspended.
#[derive(Debug, Default)]
pub struct WallRunState {
    episode: Option<WallRunEpisode>,
}

impl WallRunState {
    /// The active episode, if wall running.
    pub fn episode(&self) -> Option<&WallRunEpisode> {
        self.episode.as_ref()
    }

    /// Prefer the side the input pushes toward, else whichever side has a hit.
    fn pick_side(ctx: &LocomotionContext) -> Option<(WallSide, CollisionData)> {
        let pushed = WallSide::from_push(ctx.move_vector().x);
        pushed
            .into_iter()
            .chain([WallSide::Right, WallSide::Left])
            .find_map(|side| ctx.wall(side).map(|hit| (side, hit)))
    }
}

impl State<LocomotionContext> for WallRunState {
    type Kind = LocomotionStateKind;

    fn kind(&self) -> LocomotionStateKind {
        LocomotionStateKind::WallRun
    }

    fn enter(&mut self, ctx: &mut LocomotionContext) -> Next {
        let Some((side, hit)) = Self::pick_side(ctx) else {
            debug!("wall run refused: no wall contact on either side");
            return Transition::To(LocomotionStateKind::Idle);
        };

        ctx.set_gravity_enabled(false);
        ctx.set_movement_enabled(false);

        let episode = WallRunEpisode {
            side,
            normal: hit.normal,
            direction: side.run_direction(hit.normal, Vec3::Y),
            cancellable: false,
            grace: Timer::from_seconds(ctx.config().wall_run_grace.max(0.0), TimerMode::Once),
        };
        let velocity = episode.velocity(ctx.config());
        ctx.set_velocity(velocity);
        debug!("wall run started on {side:?} side, direction {:?}", episode.direction);
        self.episode = Some(episode);
        Transition::Stay
    }

    fn update(&mut self, ctx: &mut LocomotionContext) -> Next {
        let Some(episode) = self.episode.as_mut() else {
            return Transition::Stay;
        };

        let velocity = episode.velocity(ctx.config());
        ctx.set_velocity(velocity);

        if !episode.cancellable {
            episode.grace.tick(ctx.delta());
            episode.cancellable = episode.grace.finished();
        }
        if episode.cancellable && (ctx.wall(episode.side).is_none() || ctx.is_grounded()) {
            return Transition::To(LocomotionStateKind::Idle);
        }
        Transition::Stay
    }

    fn exit(&mut self, ctx: &mut LocomotionContext) {
        self.episode = None;
        ctx.set_gravity_enabled(true);
        ctx.set_movement_enabled(true);
    }
}

/// The locomotion state machine attached to a character.
///
/// Starts in [`LocomotionStateKind::Idle`] on its first fixed tick.
#[derive(Component)]
pub struct LocomotionStateMachine {
    machine: StateMachine<LocomotionStateKind, LocomotionContext>,
    initial: LocomotionStateKind,
    started: bool,
}

impl Default for LocomotionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocomotionStateMachine {
    /// Create a machine with all seven locomotion states registered.
    pub fn new() -> Self {
        let mut machine = Self::empty(LocomotionStateKind::Idle);
        machine.register(IdleState);
        machine.register(MoveState);
        machine.register(SprintState);
        machine.register(JumpState::default());
        machine.register(LandState);
        machine.register(SlideState);
        machine.register(WallRunState::default());
        machine
    }

    /// Create a machine with no registered states.
    pub fn empty(initial: LocomotionStateKind) -> Self {
        Self {
            machine: StateMachine::new(),
            initial,
            started: false,
        }
    }

    /// Builder: set the state entered on the first tick.
    pub fn starting_in(mut self, initial: LocomotionStateKind) -> Self {
        self.initial = initial;
        self
    }

    /// Register (or replace) a state.
    pub fn register(&mut self, state: impl State<LocomotionContext, Kind = LocomotionStateKind>) {
        self.machine.register(state);
    }

    pub fn current(&self) -> Option<LocomotionStateKind> {
        self.machine.current()
    }

    pub fn is_currently(&self, kind: LocomotionStateKind) -> bool {
        self.machine.is_currently(kind)
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Enter the initial state if not done yet.
    pub fn start(
        &mut self,
        ctx: &mut LocomotionContext,
    ) -> Result<(), TransitionError<LocomotionStateKind>> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        self.machine.transition(ctx, self.initial)
    }

    pub fn transition(
        &mut self,
        ctx: &mut LocomotionContext,
        kind: LocomotionStateKind,
    ) -> Result<(), TransitionError<LocomotionStateKind>> {
        self.started = true;
        self.machine.transition(ctx, kind)
    }

    pub fn tick(
        &mut self,
        ctx: &mut LocomotionContext,
    ) -> Result<(), TransitionError<LocomotionStateKind>> {
        self.machine.tick(ctx)
    }

    pub fn drain_transitions(
        &mut self,
    ) -> impl Iterator<Item = TransitionRecord<LocomotionStateKind>> + '_ {
        self.machine.drain_transitions()
    }
}
