//! Demo world setup: component registration, archetypes and the initial
//! population.

use std::f32::consts::TAU;

use components::{
    AiController, Animation, Health, Name, Perception, Position, Sprite, Transform3D, Velocity,
};
use engine_component::Entity;
use engine_storage::{Archetype, Overrides, Storage, StorageError};
use tracing::info;

pub const PLAYER: &str = "player";
pub const ENEMY: &str = "enemy";

/// Register every demo component type so snapshots containing them can be
/// restored even before a system touches them.
///
/// # Errors
///
/// [`StorageError::ComponentTypeConflict`] if a name is already taken.
pub fn register_components(storage: &Storage) -> Result<(), StorageError> {
    storage.register_component::<Position>()?;
    storage.register_component::<Velocity>()?;
    storage.register_component::<Health>()?;
    storage.register_component::<Sprite>()?;
    storage.register_component::<Animation>()?;
    storage.register_component::<AiController>()?;
    storage.register_component::<Perception>()?;
    storage.register_component::<Name>()?;
    storage.register_component::<Transform3D>()?;
    Ok(())
}

/// Register the `player` and `enemy` archetypes.
///
/// # Errors
///
/// [`StorageError::DuplicateArchetype`] if either is already registered.
pub fn register_archetypes(storage: &Storage) -> Result<(), StorageError> {
    storage.register_archetype(
        Archetype::builder(PLAYER)
            .with(Position::default())
            .with(Velocity::ZERO)
            .with(Health::full(150.0))
            .with(Sprite::new("player.png", 32, 32).on_layer(1))
            .with(Animation::new("idle", 4, 8.0))
            .with(Transform3D::IDENTITY)
            .build(),
    )?;
    storage.register_archetype(
        Archetype::builder(ENEMY)
            .with(Position::default())
            .with(Velocity::ZERO)
            .with(Health::full(50.0))
            .with(Sprite::new("enemy.png", 24, 24))
            .with(AiController::new(0.7))
            .with(Perception::new(12.0))
            .build(),
    )?;
    Ok(())
}

/// Spawn `players` players at the origin and `enemies` enemies on a ring
/// around it, orbiting.
///
/// # Errors
///
/// Any error from entity creation; a partially built entity aborts the
/// spawn.
pub fn spawn_population(
    storage: &Storage,
    players: usize,
    enemies: usize,
) -> Result<Vec<Entity>, StorageError> {
    let mut spawned = Vec::with_capacity(players + enemies);

    for i in 0..players {
        let player = storage.create_entity(Some(PLAYER))?;
        storage.add_component(player, Name::new(format!("player-{}", i + 1)))?;
        spawned.push(player);
    }

    for i in 0..enemies {
        let angle = TAU * i as f32 / enemies as f32;
        let (sin, cos) = angle.sin_cos();
        let radius = 20.0;
        let speed = 1.5;
        let overrides = Overrides::new()
            .with(Position::new(cos * radius, sin * radius, 0.0))
            .with(Velocity::new(-sin * speed, cos * speed, 0.0))
            .with(AiController::new(if i % 3 == 0 { 0.2 } else { 0.8 }));
        spawned.push(storage.create_entity_with(ENEMY, &overrides)?);
    }

    info!(players, enemies, "population spawned");
    Ok(spawned)
}
