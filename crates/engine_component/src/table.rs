//! Keyed storage for one component type.
//!
//! A [`ComponentTable`] maps [`Entity`] to a single value of its component
//! type. Rows live in a sharded concurrent map, so a write to one entity's
//! row only contends with operations that hash to the same shard, and reads
//! never block each other.
//!
//! [`ErasedTable`] is the object-safe view the storage engine keeps for every
//! registered type, used by code paths that work across component types
//! (destroy, queries, batch reads, snapshots).

use std::any::Any;
use std::collections::HashMap;

use dashmap::DashMap;
use serde_json::Value;

use crate::component::{Component, ComponentRecord, ComponentTypeId};
use crate::entity::Entity;
use crate::error::ComponentError;

/// Homogeneous storage for components of type `T`.
#[derive(Debug)]
pub struct ComponentTable<T: Component> {
    rows: DashMap<Entity, T>,
}

impl<T: Component> ComponentTable<T> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Validate `value` and store it for `entity`, replacing any prior value.
    ///
    /// Returns the replaced value, if any. A rejected value leaves the row
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::Validation`] if `T::validate` rejects `value`.
    pub fn insert(&self, entity: Entity, value: T) -> Result<Option<T>, ComponentError> {
        value.check()?;
        Ok(self.rows.insert(entity, value))
    }

    /// Returns a copy of the value stored for `entity`.
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<T> {
        self.rows.get(&entity).map(|row| row.value().clone())
    }

    /// Returns copies of the values stored for each of `entities`.
    ///
    /// Entities without a row are simply absent from the result.
    #[must_use]
    pub fn get_many(&self, entities: &[Entity]) -> HashMap<Entity, T> {
        entities
            .iter()
            .filter_map(|&e| self.get(e).map(|v| (e, v)))
            .collect()
    }

    /// Edit the value for `entity` in place while holding its row lock.
    ///
    /// The edited value is validated; if it is rejected the edit is rolled
    /// back. Returns `None` when the entity has no row.
    pub fn modify<F>(&self, entity: Entity, f: F) -> Option<Result<(), ComponentError>>
    where
        F: FnOnce(&mut T),
    {
        let mut row = self.rows.get_mut(&entity)?;
        let before = row.value().clone();
        f(row.value_mut());
        if let Err(e) = row.value().check() {
            *row.value_mut() = before;
            return Some(Err(e));
        }
        Some(Ok(()))
    }

    /// Remove and return the value for `entity`.
    pub fn remove(&self, entity: Entity) -> Option<T> {
        self.rows.remove(&entity).map(|(_, v)| v)
    }

    /// Returns `true` if `entity` has a row in this table.
    #[must_use]
    pub fn has(&self, entity: Entity) -> bool {
        self.rows.contains_key(&entity)
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build a table from snapshot records, decoding and validating each one.
    ///
    /// # Errors
    ///
    /// Fails on the first record that does not decode or validate.
    pub fn from_records(records: Vec<ComponentRecord>) -> Result<Self, ComponentError> {
        let table = Self::new();
        for ComponentRecord { entity, record } in records {
            table.rows.insert(entity, T::from_record(record)?);
        }
        Ok(table)
    }
}

impl<T: Component> Default for ComponentTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Object-safe view over a [`ComponentTable`] of any component type.
pub trait ErasedTable: Send + Sync {
    /// Name of the stored component type.
    fn type_name(&self) -> &'static str;

    /// ID of the stored component type.
    fn component_type_id(&self) -> ComponentTypeId;

    /// Returns `true` if `entity` has a row.
    fn has(&self, entity: Entity) -> bool;

    /// Number of rows.
    fn len(&self) -> usize;

    /// Returns `true` if there are no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the row for `entity`; returns `true` if one existed.
    fn remove_row(&self, entity: Entity) -> bool;

    /// Drop every row.
    fn clear(&self);

    /// All entities with a row, in no particular order.
    fn entities(&self) -> Vec<Entity>;

    /// The row for `entity` as a keyed record.
    fn get_record(&self, entity: Entity) -> Option<Result<Value, ComponentError>>;

    /// Every row as a snapshot record, sorted by entity.
    fn records(&self) -> Result<Vec<ComponentRecord>, ComponentError>;

    /// Decode `records` into a fresh detached table of the same type.
    fn stage(&self, records: Vec<ComponentRecord>) -> Result<Box<dyn ErasedTable>, ComponentError>;

    /// Replace this table's rows with those of a table produced by
    /// [`stage`](ErasedTable::stage). Returns `false` (and changes nothing)
    /// if `staged` holds a different component type.
    fn replace_with(&self, staged: Box<dyn ErasedTable>) -> bool;

    /// Downcasting support for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Owned downcasting support.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: Component> ErasedTable for ComponentTable<T> {
    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn component_type_id(&self) -> ComponentTypeId {
        T::component_type_id()
    }

    fn has(&self, entity: Entity) -> bool {
        ComponentTable::has(self, entity)
    }

    fn len(&self) -> usize {
        ComponentTable::len(self)
    }

    fn remove_row(&self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn clear(&self) {
        self.rows.clear();
    }

    fn entities(&self) -> Vec<Entity> {
        self.rows.iter().map(|row| *row.key()).collect()
    }

    fn get_record(&self, entity: Entity) -> Option<Result<Value, ComponentError>> {
        self.rows.get(&entity).map(|row| row.value().to_record())
    }

    fn records(&self) -> Result<Vec<ComponentRecord>, ComponentError> {
        let mut records = self
            .rows
            .iter()
            .map(|row| -> Result<ComponentRecord, ComponentError> {
                Ok(ComponentRecord {
                    entity: *row.key(),
                    record: row.value().to_record()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.entity);
        Ok(records)
    }

    fn stage(&self, records: Vec<ComponentRecord>) -> Result<Box<dyn ErasedTable>, ComponentError> {
        Ok(Box::new(Self::from_records(records)?))
    }

    fn replace_with(&self, staged: Box<dyn ErasedTable>) -> bool {
        let Ok(staged) = staged.into_any().downcast::<Self>() else {
            return false;
        };
        self.rows.clear();
        for (entity, value) in staged.rows {
            self.rows.insert(entity, value);
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sprite {
        texture_id: String,
    }

    impl Component for Sprite {
        fn type_name() -> &'static str {
            "sprite"
        }

        fn validate(&self) -> Result<(), String> {
            if self.texture_id.is_empty() {
                return Err("texture_id must not be empty".into());
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    impl Component for Counter {
        fn type_name() -> &'static str {
            "counter"
        }
    }

    fn sprite(id: &str) -> Sprite {
        Sprite {
            texture_id: id.to_string(),
        }
    }

    #[test]
    fn test_insert_is_upsert() {
        let table = ComponentTable::new();
        let e = Entity::from_raw(1);
        assert_eq!(table.insert(e, sprite("a")).unwrap(), None);
        assert_eq!(table.insert(e, sprite("b")).unwrap(), Some(sprite("a")));
        assert_eq!(table.get(e), Some(sprite("b")));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rejected_insert_keeps_prior_value() {
        let table = ComponentTable::new();
        let e = Entity::from_raw(1);
        table.insert(e, sprite("hero")).unwrap();
        let err = table.insert(e, sprite("")).unwrap_err();
        assert!(matches!(err, ComponentError::Validation { .. }));
        assert_eq!(table.get(e), Some(sprite("hero")));
    }

    #[test]
    fn test_get_many_is_partial() {
        let table = ComponentTable::new();
        table.insert(Entity::from_raw(1), sprite("a")).unwrap();
        table.insert(Entity::from_raw(3), sprite("c")).unwrap();
        let got = table.get_many(&[Entity::from_raw(1), Entity::from_raw(2), Entity::from_raw(3)]);
        assert_eq!(got.len(), 2);
        assert!(!got.contains_key(&Entity::from_raw(2)));
    }

    #[test]
    fn test_modify_rolls_back_invalid_edit() {
        let table = ComponentTable::new();
        let e = Entity::from_raw(7);
        table.insert(e, sprite("hero")).unwrap();

        let result = table.modify(e, |s| s.texture_id.clear()).unwrap();
        assert!(result.is_err());
        assert_eq!(table.get(e), Some(sprite("hero")));

        table
            .modify(e, |s| s.texture_id.push_str("_v2"))
            .unwrap()
            .unwrap();
        assert_eq!(table.get(e), Some(sprite("hero_v2")));

        assert!(table.modify(Entity::from_raw(8), |_| {}).is_none());
    }

    #[test]
    fn test_remove_and_has() {
        let table = ComponentTable::new();
        let e = Entity::from_raw(2);
        table.insert(e, sprite("x")).unwrap();
        assert!(table.has(e));
        assert_eq!(table.remove(e), Some(sprite("x")));
        assert!(!table.has(e));
        assert_eq!(table.remove(e), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_records_sorted_and_staged_back() {
        let table = ComponentTable::new();
        for id in [5, 1, 3] {
            table
                .insert(Entity::from_raw(id), Counter { value: id as u32 * 10 })
                .unwrap();
        }
        let records = ErasedTable::records(&table).unwrap();
        let ids: Vec<u64> = records.iter().map(|r| r.entity.id()).collect();
        assert_eq!(ids, vec![1, 3, 5]);

        let staged = table.stage(records).unwrap();
        table.clear();
        assert!(table.replace_with(staged));
        assert_eq!(table.get(Entity::from_raw(3)), Some(Counter { value: 30 }));
        assert_eq!(ComponentTable::len(&table), 3);
    }

    #[test]
    fn test_stage_rejects_invalid_record() {
        let table: ComponentTable<Sprite> = ComponentTable::new();
        let records = vec![ComponentRecord {
            entity: Entity::from_raw(1),
            record: serde_json::json!({"texture_id": ""}),
        }];
        assert!(table.stage(records).is_err());
    }

    #[test]
    fn test_replace_with_rejects_other_type() {
        let sprites: ComponentTable<Sprite> = ComponentTable::new();
        sprites.insert(Entity::from_raw(1), sprite("keep")).unwrap();
        let counters: ComponentTable<Counter> = ComponentTable::new();
        let staged = counters.stage(Vec::new()).unwrap();
        assert!(!sprites.replace_with(staged));
        assert_eq!(sprites.get(Entity::from_raw(1)), Some(sprite("keep")));
    }

    #[test]
    fn test_erased_downcast() {
        let table: Box<dyn ErasedTable> = Box::new(ComponentTable::<Sprite>::new());
        assert_eq!(table.type_name(), "sprite");
        assert_eq!(table.component_type_id(), Sprite::component_type_id());
        assert!(table.as_any().downcast_ref::<ComponentTable<Sprite>>().is_some());
        assert!(table.as_any().downcast_ref::<ComponentTable<Counter>>().is_none());
    }

    #[test]
    fn test_concurrent_inserts_to_distinct_rows() {
        let table: ComponentTable<Counter> = ComponentTable::new();
        std::thread::scope(|s| {
            for t in 0..8u64 {
                let table = &table;
                s.spawn(move || {
                    for i in 0..500u64 {
                        let id = t * 1000 + i + 1;
                        table
                            .insert(Entity::from_raw(id), Counter { value: id as u32 })
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(ComponentTable::len(&table), 4000);
        assert_eq!(table.get(Entity::from_raw(7500)), Some(Counter { value: 7500 }));
    }
}
