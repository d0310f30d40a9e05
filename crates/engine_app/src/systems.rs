//! Simulation systems.
//!
//! A [`System`] declares its component access with a [`QueryDescriptor`] and
//! runs once per tick against the shared [`Storage`]. The scheduler relies on
//! the declaration being honest: a system must not write components it did
//! not list in its writes.

use std::collections::HashMap;

use components::{AiController, Health, Perception, Position, Velocity};
use engine_component::{Entity, QueryDescriptor};
use engine_storage::{Storage, StorageError};

/// Seconds between AI state changes.
const AI_DECISION_INTERVAL: f32 = 0.5;

/// One unit of per-tick simulation logic.
pub trait System: Send + Sync {
    fn name(&self) -> &str;

    /// Components this system reads and writes.
    fn query(&self) -> QueryDescriptor;

    /// Run one tick. Returns the number of entities updated.
    ///
    /// # Errors
    ///
    /// Any storage error other than an entity or component disappearing
    /// mid-tick.
    fn run(&self, storage: &Storage, dt: f32) -> Result<usize, StorageError>;
}

/// Entities destroyed or stripped by a concurrent caller are skipped.
fn tolerate_missing(result: Result<(), StorageError>) -> Result<bool, StorageError> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Integrates velocity into position.
#[derive(Debug, Default)]
pub struct MovementSystem;

impl System for MovementSystem {
    fn name(&self) -> &str {
        "movement"
    }

    fn query(&self) -> QueryDescriptor {
        QueryDescriptor::new().read::<Velocity>().write::<Position>()
    }

    fn run(&self, storage: &Storage, dt: f32) -> Result<usize, StorageError> {
        let entities = storage.query(&self.query())?;
        let velocities = storage.get_many::<Velocity>(&entities);
        let mut updated = 0;
        for (entity, velocity) in velocities {
            if velocity.linear == Velocity::ZERO.linear {
                continue;
            }
            let moved = storage
                .modify_component::<Position, _>(entity, |p| *p = velocity.integrate(*p, dt));
            if tolerate_missing(moved)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Refreshes each perceiver's visible set from current positions.
#[derive(Debug, Default)]
pub struct SensingSystem;

impl System for SensingSystem {
    fn name(&self) -> &str {
        "sensing"
    }

    fn query(&self) -> QueryDescriptor {
        QueryDescriptor::new().read::<Position>().write::<Perception>()
    }

    fn run(&self, storage: &Storage, _dt: f32) -> Result<usize, StorageError> {
        let perceivers = storage.query(&self.query())?;
        let all = storage.query_entities(&["position"])?;
        let positions: HashMap<Entity, Position> = storage.get_many::<Position>(&all);

        let mut updated = 0;
        for entity in perceivers {
            let Some(&origin) = positions.get(&entity) else {
                continue;
            };
            let sensed = storage.modify_component::<Perception, _>(entity, |p| {
                let radius = p.radius;
                let mut seen: Vec<(f32, Entity)> = positions
                    .iter()
                    .filter(|&(&other, _)| other != entity)
                    .map(|(&other, &pos)| (origin.distance(pos), other))
                    .filter(|&(d, _)| d <= radius)
                    .collect();
                seen.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                p.visible = seen.into_iter().map(|(_, e)| e).collect();
            });
            if tolerate_missing(sensed)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Updates AI decisions from perception.
#[derive(Debug, Default)]
pub struct AiSystem;

impl System for AiSystem {
    fn name(&self) -> &str {
        "ai"
    }

    fn query(&self) -> QueryDescriptor {
        QueryDescriptor::new()
            .read::<Perception>()
            .write::<AiController>()
    }

    fn run(&self, storage: &Storage, dt: f32) -> Result<usize, StorageError> {
        let entities = storage.query(&self.query())?;
        let perceptions = storage.get_many::<Perception>(&entities);
        let mut updated = 0;
        for (entity, perception) in perceptions {
            let decided = storage.modify_component::<AiController, _>(entity, |ai| {
                ai.decide(&perception, dt, AI_DECISION_INTERVAL);
            });
            if tolerate_missing(decided)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// Heals living entities at a fixed rate. The dead stay dead.
#[derive(Debug)]
pub struct RegenSystem {
    /// Hit points per second.
    pub rate: f32,
}

impl Default for RegenSystem {
    fn default() -> Self {
        Self { rate: 2.0 }
    }
}

impl System for RegenSystem {
    fn name(&self) -> &str {
        "regen"
    }

    fn query(&self) -> QueryDescriptor {
        QueryDescriptor::new()
            .write::<Health>()
            .without::<AiController>()
    }

    fn run(&self, storage: &Storage, dt: f32) -> Result<usize, StorageError> {
        let mut updated = 0;
        for entity in storage.query(&self.query())? {
            let healed = storage.modify_component::<Health, _>(entity, |h| {
                if h.is_alive() {
                    h.heal(self.rate * dt);
                }
            });
            if tolerate_missing(healed)? {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

/// The default system set, in registration order.
#[must_use]
pub fn default_systems() -> Vec<Box<dyn System>> {
    vec![
        Box::new(MovementSystem),
        Box::new(SensingSystem),
        Box::new(AiSystem),
        Box::new(RegenSystem::default()),
    ]
}

#[cfg(test)]
mod tests {
    use engine_component::{Component, QueryFilter};
    use engine_storage::StorageConfig;

    use super::*;

    fn storage() -> Storage {
        Storage::new(StorageConfig::default())
    }

    #[test]
    fn test_movement_integrates_velocity() {
        let storage = storage();
        let moving = storage.create_entity(None).unwrap();
        storage.add_component(moving, Position::default()).unwrap();
        storage
            .add_component(moving, Velocity::new(2.0, 0.0, 0.0))
            .unwrap();
        let still = storage.create_entity(None).unwrap();
        storage.add_component(still, Position::new(5.0, 5.0, 5.0)).unwrap();

        let updated = MovementSystem.run(&storage, 0.5).unwrap();
        assert_eq!(updated, 1);
        assert_eq!(
            storage.get_component::<Position>(moving).unwrap(),
            Position::new(1.0, 0.0, 0.0)
        );
        assert_eq!(
            storage.get_component::<Position>(still).unwrap(),
            Position::new(5.0, 5.0, 5.0)
        );
    }

    #[test]
    fn test_sensing_orders_by_distance() {
        let storage = storage();
        let watcher = storage.create_entity(None).unwrap();
        storage.add_component(watcher, Position::default()).unwrap();
        storage.add_component(watcher, Perception::new(10.0)).unwrap();
        let far = storage.create_entity(None).unwrap();
        storage.add_component(far, Position::new(8.0, 0.0, 0.0)).unwrap();
        let near = storage.create_entity(None).unwrap();
        storage.add_component(near, Position::new(0.0, 3.0, 0.0)).unwrap();
        let outside = storage.create_entity(None).unwrap();
        storage.add_component(outside, Position::new(50.0, 0.0, 0.0)).unwrap();

        SensingSystem.run(&storage, 0.1).unwrap();
        assert_eq!(
            storage.get_component::<Perception>(watcher).unwrap().visible,
            vec![near, far]
        );
    }

    #[test]
    fn test_ai_chases_what_it_sees() {
        let storage = storage();
        let hunter = storage.create_entity(None).unwrap();
        let prey = storage.create_entity(None).unwrap();
        storage
            .add_component(
                hunter,
                Perception {
                    radius: 5.0,
                    visible: vec![prey],
                },
            )
            .unwrap();
        storage.add_component(hunter, AiController::new(1.0)).unwrap();

        assert_eq!(AiSystem.run(&storage, 0.1).unwrap(), 1);
        let ai = storage.get_component::<AiController>(hunter).unwrap();
        assert_eq!(ai.target, Some(prey));
    }

    #[test]
    fn test_regen_skips_dead_and_ai_entities() {
        let storage = storage();
        let hurt = storage.create_entity(None).unwrap();
        storage
            .add_component(hurt, Health { current: 5.0, max: 10.0 })
            .unwrap();
        let dead = storage.create_entity(None).unwrap();
        storage
            .add_component(dead, Health { current: 0.0, max: 10.0 })
            .unwrap();
        let npc = storage.create_entity(None).unwrap();
        storage
            .add_component(npc, Health { current: 5.0, max: 10.0 })
            .unwrap();
        storage.add_component(npc, AiController::new(0.2)).unwrap();

        let regen = RegenSystem { rate: 2.0 };
        assert_eq!(
            regen.query().filters,
            vec![QueryFilter::Without(AiController::type_name().to_string())]
        );
        regen.run(&storage, 1.0).unwrap();
        assert_eq!(storage.get_component::<Health>(hurt).unwrap().current, 7.0);
        assert_eq!(storage.get_component::<Health>(dead).unwrap().current, 0.0);
        assert_eq!(storage.get_component::<Health>(npc).unwrap().current, 5.0);
    }
}
