//! Wall Run Course Example
//!
//! A playable example with a character on a floor lined with two long walls
//! and a raised platform to jump from.
//!
//! ## Controls
//! - **WASD** or **Arrows**: Move relative to the camera
//! - **Shift** (hold): Sprint
//! - **Space**: Jump (pressed in the air, it fires on landing)
//! - **Q/E**: Orbit the camera
//!
//! Jump off the platform and hold A or D toward a wall while falling to start
//! a wall run. The current locomotion state is logged on every transition.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use locomotion_controller::prelude::*;

// ==================== Constants ====================

const PLAYER_HALF_HEIGHT: f32 = 0.5;
const PLAYER_RADIUS: f32 = 0.5;

const COURSE_LENGTH: f32 = 60.0;
const COURSE_WIDTH: f32 = 8.0;
const WALL_HEIGHT: f32 = 8.0;

const CAMERA_DISTANCE: f32 = 8.0;
const CAMERA_HEIGHT: f32 = 3.0;
const CAMERA_ORBIT_SPEED: f32 = 1.5;

#[derive(Component)]
struct Player;

#[derive(Component, Default)]
struct FollowCamera {
    yaw: f32,
}

// ==================== Main ====================

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Wall Run Course - Locomotion Controller Example".into(),
                resolution: (1280.0, 720.0).into(),
                ..default()
            }),
            ..default()
        }))
        // Physics
        .add_plugins(RapierPhysicsPlugin::<NoUserData>::default())
        .add_plugins(RapierDebugRenderPlugin::default())
        // Locomotion controller
        .add_plugins(LocomotionPlugin::<Rapier3dBackend>::default())
        .add_systems(Startup, setup)
        .add_systems(Update, handle_input.before(LocomotionSet::Input))
        .add_systems(Update, camera_follow.after(LocomotionSet::Frame))
        .add_systems(Update, log_transitions)
        .run();
}

// ==================== Setup ====================

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(10.0, 20.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let stone = materials.add(Color::srgb(0.45, 0.45, 0.5));
    let floor_size = Vec3::new(COURSE_WIDTH * 3.0, 1.0, COURSE_LENGTH);
    spawn_block(
        &mut commands,
        &mut meshes,
        stone.clone(),
        Vec3::new(0.0, -0.5, -COURSE_LENGTH / 2.0 + 5.0),
        floor_size,
    );

    let wall_size = Vec3::new(0.5, WALL_HEIGHT, COURSE_LENGTH);
    for x in [-COURSE_WIDTH / 2.0, COURSE_WIDTH / 2.0] {
        spawn_block(
            &mut commands,
            &mut meshes,
            stone.clone(),
            Vec3::new(x, WALL_HEIGHT / 2.0, -COURSE_LENGTH / 2.0 + 5.0),
            wall_size,
        );
    }

    let platform = materials.add(Color::srgb(0.7, 0.5, 0.3));
    spawn_block(
        &mut commands,
        &mut meshes,
        platform,
        Vec3::new(0.0, 1.5, -4.0),
        Vec3::new(3.0, 3.0, 3.0),
    );

    let camera = commands
        .spawn((
            Camera3d::default(),
            Transform::from_xyz(0.0, CAMERA_HEIGHT, CAMERA_DISTANCE).looking_at(Vec3::ZERO, Vec3::Y),
            FollowCamera::default(),
        ))
        .id();

    let config = LocomotionConfig::player();
    commands.spawn((
        Player,
        Mesh3d(meshes.add(Capsule3d::new(PLAYER_RADIUS, PLAYER_HALF_HEIGHT * 2.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.2, 0.6, 0.9))),
        Transform::from_xyz(0.0, 2.0, 2.0),
        MovementController::from_config(&config),
        config,
        LocomotionStateMachine::new(),
        LocomotionIntent::default(),
        LocomotionCamera(camera),
        Rapier3dCharacterBundle::rotation_locked(),
        Collider::capsule_y(PLAYER_HALF_HEIGHT, PLAYER_RADIUS),
    ));
}

fn spawn_block(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    material: Handle<StandardMaterial>,
    position: Vec3,
    size: Vec3,
) {
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::from_size(size))),
        MeshMaterial3d(material),
        Transform::from_translation(position),
        RigidBody::Fixed,
        Collider::cuboid(size.x / 2.0, size.y / 2.0, size.z / 2.0),
    ));
}

// ==================== Input ====================

fn handle_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut q_intents: Query<&mut LocomotionIntent, With<Player>>,
) {
    let pressed = |keys: [KeyCode; 2]| keys.iter().any(|k| keyboard.pressed(*k));

    for mut intent in &mut q_intents {
        let mut direction = Vec2::ZERO;
        if pressed([KeyCode::KeyW, KeyCode::ArrowUp]) {
            direction.y += 1.0;
        }
        if pressed([KeyCode::KeyS, KeyCode::ArrowDown]) {
            direction.y -= 1.0;
        }
        if pressed([KeyCode::KeyD, KeyCode::ArrowRight]) {
            direction.x += 1.0;
        }
        if pressed([KeyCode::KeyA, KeyCode::ArrowLeft]) {
            direction.x -= 1.0;
        }

        intent.set_move(direction);
        intent.set_sprint(pressed([KeyCode::ShiftLeft, KeyCode::ShiftRight]));
        intent.set_jump_pressed(keyboard.pressed(KeyCode::Space));
    }
}

// ==================== Camera ====================

fn camera_follow(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    q_player: Query<&Transform, (With<Player>, Without<FollowCamera>)>,
    mut q_camera: Query<(&mut Transform, &mut FollowCamera)>,
) {
    let Ok(player) = q_player.single() else {
        return;
    };
    let Ok((mut transform, mut follow)) = q_camera.single_mut() else {
        return;
    };

    if keyboard.pressed(KeyCode::KeyQ) {
        follow.yaw += CAMERA_ORBIT_SPEED * time.delta_secs();
    }
    if keyboard.pressed(KeyCode::KeyE) {
        follow.yaw -= CAMERA_ORBIT_SPEED * time.delta_secs();
    }

    let offset = Quat::from_rotation_y(follow.yaw) * Vec3::new(0.0, CAMERA_HEIGHT, CAMERA_DISTANCE);
    *transform = Transform::from_translation(player.translation + offset)
        .looking_at(player.translation + Vec3::Y, Vec3::Y);
}

fn log_transitions(mut events: EventReader<LocomotionStateChanged>) {
    for event in events.read() {
        info!("{:?} -> {:?}", event.from, event.to);
    }
}
