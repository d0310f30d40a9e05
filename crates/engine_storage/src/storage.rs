//! The storage context.
//!
//! [`Storage`] owns the entity registry, one [`ComponentTable`] per
//! registered component type, the archetype catalog and the performance
//! monitor. It is an ordinary value: build one per simulation (or per test)
//! and share it by reference or `Arc`.
//!
//! ## Locking
//!
//! - Row operations lock one shard of one table.
//! - Component writes run under the target entity's registry read guard, and
//!   `destroy_entity` purges rows under the same entry's write guard (see
//!   [`EntityRegistry`]). Lock order is always registry, then table.
//! - A storage-wide snapshot gate is taken shared by every operation and
//!   exclusively only while a backup captures state or a restore swaps it in.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use engine_component::{Component, ComponentTable, Entity, ErasedTable, QueryDescriptor};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::archetype::{Archetype, ArchetypeCatalog, Overrides};
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::monitor::{
    self, ComponentStats, EntityStats, HealthReport, HealthStatus, OpKind, PerformanceMonitor,
    StorageStats,
};
use crate::persistence::{self, CancelToken, EntitySnapshot, SnapshotHandle, SnapshotImage};
use crate::query;
use crate::registry::EntityRegistry;

/// An explicitly constructed, self-contained entity-component store.
pub struct Storage {
    config: StorageConfig,
    gate: RwLock<()>,
    registry: EntityRegistry,
    tables: DashMap<&'static str, Arc<dyn ErasedTable>>,
    archetypes: ArchetypeCatalog,
    monitor: PerformanceMonitor,
}

impl Storage {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        let monitor = PerformanceMonitor::new(config.slow_op_threshold);
        Self {
            config,
            gate: RwLock::new(()),
            registry: EntityRegistry::new(),
            tables: DashMap::new(),
            archetypes: ArchetypeCatalog::new(),
            monitor,
        }
    }

    /// The configuration this store was built with.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The archetype catalog.
    #[must_use]
    pub fn archetypes(&self) -> &ArchetypeCatalog {
        &self.archetypes
    }

    // -- Component types --

    /// Create the table for `T` if it does not exist yet.
    ///
    /// Typed operations register their table on first use; explicit
    /// registration is needed so a restore can decode a type that has not
    /// been touched yet in this process.
    ///
    /// # Errors
    ///
    /// [`StorageError::ComponentTypeConflict`] if another type already uses
    /// `T::type_name()`.
    pub fn register_component<T: Component>(&self) -> Result<(), StorageError> {
        self.table::<T>().map(|_| ())
    }

    /// Registered component type names, sorted.
    #[must_use]
    pub fn component_types(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tables.iter().map(|t| *t.key()).collect();
        names.sort_unstable();
        names
    }

    fn table<T: Component>(&self) -> Result<Arc<dyn ErasedTable>, StorageError> {
        let table = match self.tables.get(T::type_name()) {
            Some(existing) => Arc::clone(existing.value()),
            None => {
                let slot = self.tables.entry(T::type_name()).or_insert_with(|| {
                    debug!(component = T::type_name(), "component table created");
                    let created: Arc<dyn ErasedTable> = Arc::new(ComponentTable::<T>::new());
                    created
                });
                Arc::clone(slot.value())
            }
        };
        if table.as_any().is::<ComponentTable<T>>() {
            Ok(table)
        } else {
            Err(StorageError::ComponentTypeConflict(T::type_name().to_string()))
        }
    }

    fn table_named(&self, name: &str) -> Option<Arc<dyn ErasedTable>> {
        self.tables.get(name).map(|t| Arc::clone(t.value()))
    }

    fn typed<T: Component>(table: &Arc<dyn ErasedTable>) -> &ComponentTable<T> {
        match table.as_any().downcast_ref::<ComponentTable<T>>() {
            Some(typed) => typed,
            // `table::<T>` only hands out tables it has checked.
            None => unreachable!("table for '{}' holds another type", T::type_name()),
        }
    }

    // -- Entity lifecycle --

    /// Register an archetype template, creating tables for its types.
    ///
    /// # Errors
    ///
    /// [`StorageError::DuplicateArchetype`], [`StorageError::Validation`] for
    /// an invalid default, or [`StorageError::ComponentTypeConflict`].
    pub fn register_archetype(&self, archetype: Archetype) -> Result<(), StorageError> {
        archetype.register_types(self)?;
        self.archetypes.register(archetype)?;
        Ok(())
    }

    /// Create an entity, optionally populated from an archetype's defaults.
    ///
    /// # Errors
    ///
    /// [`StorageError::UnknownArchetype`] (no entity is created) or
    /// [`StorageError::PartialArchetype`] (the entity exists with the
    /// components added before the failure).
    pub fn create_entity(&self, archetype: Option<&str>) -> Result<Entity, StorageError> {
        self.create(archetype, &Overrides::new())
    }

    /// Create an entity from `archetype`, replacing defaults with `overrides`.
    ///
    /// # Errors
    ///
    /// Same as [`create_entity`](Self::create_entity).
    pub fn create_entity_with(
        &self,
        archetype: &str,
        overrides: &Overrides,
    ) -> Result<Entity, StorageError> {
        self.create(Some(archetype), overrides)
    }

    fn create(&self, archetype: Option<&str>, overrides: &Overrides) -> Result<Entity, StorageError> {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::CreateEntity, || {
            if let Some(name) = archetype
                && !self.archetypes.contains(name)
            {
                return Err(StorageError::UnknownArchetype(name.to_string()));
            }
            let entity = self.registry.create(archetype);
            debug!(%entity, archetype, "entity created");
            if let Some(name) = archetype {
                self.archetypes.instantiate(self, name, entity, overrides)?;
            }
            Ok(entity)
        })
    }

    /// Destroy an entity and drop all of its components.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] if it is unknown or already destroyed.
    pub fn destroy_entity(&self, entity: Entity) -> Result<(), StorageError> {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::DestroyEntity, || {
            let mut removed = 0usize;
            self.registry
                .destroy_with(entity, || {
                    for table in self.tables.iter() {
                        if table.value().remove_row(entity) {
                            removed += 1;
                        }
                    }
                })
                .ok_or(StorageError::EntityNotFound(entity))?;
            debug!(%entity, components = removed, "entity destroyed");
            Ok(())
        })
    }

    /// Returns `true` if the entity exists and has not been destroyed.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let start = Instant::now();
        let alive = self.registry.is_alive(entity);
        self.monitor.record(OpKind::IsAlive, start.elapsed(), true);
        alive
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.registry.live_count()
    }

    /// All live entities, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.registry
            .live_entries()
            .into_iter()
            .map(|(e, _)| e)
            .collect()
    }

    /// The archetype tag an entity was created with.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] for unknown or dead entities.
    pub fn archetype_of(&self, entity: Entity) -> Result<Option<String>, StorageError> {
        self.registry
            .archetype_of(entity)
            .ok_or(StorageError::EntityNotFound(entity))
    }

    // -- Component operations --

    /// Validate and store a component without taking the gate or recording
    /// timing. Callers must already hold the gate.
    pub(crate) fn insert_row<T: Component>(&self, entity: Entity, value: T) -> Result<(), StorageError> {
        let table = self.table::<T>()?;
        let table = Self::typed::<T>(&table);
        self.registry
            .with_live(entity, |_| table.insert(entity, value))
            .ok_or(StorageError::EntityNotFound(entity))??;
        Ok(())
    }

    /// Attach (or overwrite) a component.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] or [`StorageError::Validation`]; a
    /// rejected value leaves any prior value in place.
    pub fn add_component<T: Component>(&self, entity: Entity, value: T) -> Result<(), StorageError> {
        let _gate = self.gate.read();
        self.monitor
            .time(OpKind::AddComponent, || self.insert_row(entity, value))
    }

    /// Replace a component value. Same upsert semantics as
    /// [`add_component`](Self::add_component).
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] or [`StorageError::Validation`].
    pub fn update_component<T: Component>(&self, entity: Entity, value: T) -> Result<(), StorageError> {
        let _gate = self.gate.read();
        self.monitor
            .time(OpKind::UpdateComponent, || self.insert_row(entity, value))
    }

    /// Edit a component in place under its row lock. The edit is validated
    /// and rolled back if rejected.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`], [`StorageError::ComponentNotFound`]
    /// or [`StorageError::Validation`].
    pub fn modify_component<T, F>(&self, entity: Entity, f: F) -> Result<(), StorageError>
    where
        T: Component,
        F: FnOnce(&mut T),
    {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::UpdateComponent, || {
            let table = self.table::<T>()?;
            let table = Self::typed::<T>(&table);
            self.registry
                .with_live(entity, |_| table.modify(entity, f))
                .ok_or(StorageError::EntityNotFound(entity))?
                .ok_or_else(|| missing::<T>(entity))??;
            Ok(())
        })
    }

    /// Detach a component.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] or [`StorageError::ComponentNotFound`].
    pub fn remove_component<T: Component>(&self, entity: Entity) -> Result<(), StorageError> {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::RemoveComponent, || {
            let table = self.table::<T>()?;
            let table = Self::typed::<T>(&table);
            self.registry
                .with_live(entity, |_| table.remove(entity))
                .ok_or(StorageError::EntityNotFound(entity))?
                .ok_or_else(|| missing::<T>(entity))?;
            Ok(())
        })
    }

    /// Read a copy of a component.
    ///
    /// # Errors
    ///
    /// [`StorageError::EntityNotFound`] or [`StorageError::ComponentNotFound`].
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<T, StorageError> {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::GetComponent, || {
            let table = self.table::<T>()?;
            let table = Self::typed::<T>(&table);
            self.registry
                .with_live(entity, |_| table.get(entity))
                .ok_or(StorageError::EntityNotFound(entity))?
                .ok_or_else(|| missing::<T>(entity))
        })
    }

    /// Typed batch read: copies of `T` for each live entity that has one.
    #[must_use]
    pub fn get_many<T: Component>(&self, entities: &[Entity]) -> HashMap<Entity, T> {
        let _gate = self.gate.read();
        let result = self.monitor.time(OpKind::GetComponents, || {
            let table = self.table::<T>()?;
            let table = Self::typed::<T>(&table);
            let mut found = table.get_many(entities);
            found.retain(|&e, _| self.registry.is_alive(e));
            Ok::<_, StorageError>(found)
        });
        result.unwrap_or_default()
    }

    /// Batch read across component types, as keyed records.
    ///
    /// Partial: dead entities, unknown type names and missing
    /// components are simply absent from the result. Live entities with none
    /// of the requested components map to an empty record set.
    #[must_use]
    pub fn get_components(
        &self,
        entities: &[Entity],
        type_names: &[&str],
    ) -> HashMap<Entity, HashMap<String, Value>> {
        let _gate = self.gate.read();
        let result = self.monitor.time(OpKind::GetComponents, || {
            let tables: Vec<Arc<dyn ErasedTable>> = type_names
                .iter()
                .filter_map(|name| self.table_named(name))
                .collect();
            let mut out = HashMap::with_capacity(entities.len());
            for &entity in entities {
                let Some(records) = self.registry.with_live(entity, |_| {
                    let mut records = HashMap::new();
                    for table in &tables {
                        match table.get_record(entity) {
                            Some(Ok(record)) => {
                                records.insert(table.type_name().to_string(), record);
                            }
                            Some(Err(e)) => {
                                warn!(%entity, component = table.type_name(), error = %e, "skipping unencodable component");
                            }
                            None => {}
                        }
                    }
                    records
                }) else {
                    continue;
                };
                out.insert(entity, records);
            }
            Ok::<_, StorageError>(out)
        });
        result.unwrap_or_default()
    }

    /// Returns `true` if a live entity has a `T` component.
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.has_component_named(entity, T::type_name())
    }

    /// Returns `true` if a live entity has a component with this type name.
    #[must_use]
    pub fn has_component_named(&self, entity: Entity, type_name: &str) -> bool {
        let start = Instant::now();
        let found = {
            let _gate = self.gate.read();
            self.table_named(type_name).is_some_and(|table| {
                self.registry
                    .with_live(entity, |_| table.has(entity))
                    .unwrap_or(false)
            })
        };
        self.monitor.record(OpKind::HasComponent, start.elapsed(), true);
        found
    }

    /// Number of entities holding a `T` component.
    #[must_use]
    pub fn component_count<T: Component>(&self) -> usize {
        self.table_named(T::type_name()).map_or(0, |t| t.len())
    }

    // -- Queries --

    /// Entities holding every named component type, sorted.
    ///
    /// # Errors
    ///
    /// [`StorageError::EmptyQuery`] if `type_names` is empty.
    pub fn query_entities(&self, type_names: &[&str]) -> Result<Vec<Entity>, StorageError> {
        let _gate = self.gate.read();
        self.monitor
            .time(OpKind::Query, || self.resolve(type_names.iter().copied(), std::iter::empty()))
    }

    /// Entities matching a [`QueryDescriptor`], sorted.
    ///
    /// # Errors
    ///
    /// [`StorageError::EmptyQuery`] if the descriptor requires nothing.
    pub fn query(&self, descriptor: &QueryDescriptor) -> Result<Vec<Entity>, StorageError> {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::Query, || {
            self.resolve(
                descriptor.required_types().into_iter(),
                descriptor.excluded_types().into_iter(),
            )
        })
    }

    fn resolve<'a>(
        &self,
        required: impl Iterator<Item = &'a str>,
        excluded: impl Iterator<Item = &'a str>,
    ) -> Result<Vec<Entity>, StorageError> {
        let mut names: Vec<&str> = required.collect();
        if names.is_empty() {
            return Err(StorageError::EmptyQuery);
        }
        names.sort_unstable();
        names.dedup();

        let mut required_tables = Vec::with_capacity(names.len());
        for name in names {
            match self.table_named(name) {
                Some(table) => required_tables.push(table),
                None => return Ok(Vec::new()),
            }
        }
        let excluded_tables: Vec<_> = excluded.filter_map(|n| self.table_named(n)).collect();
        Ok(query::intersect(&required_tables, &excluded_tables))
    }

    /// Live entities created from `archetype`, sorted. Independent of the
    /// components they hold now.
    ///
    /// # Errors
    ///
    /// [`StorageError::ArchetypeNotFound`] if no such archetype is registered.
    pub fn get_entities_by_archetype(&self, archetype: &str) -> Result<Vec<Entity>, StorageError> {
        let _gate = self.gate.read();
        self.monitor.time(OpKind::QueryByArchetype, || {
            if !self.archetypes.contains(archetype) {
                return Err(StorageError::ArchetypeNotFound(archetype.to_string()));
            }
            Ok(self.registry.by_archetype(archetype))
        })
    }

    // -- Diagnostics --

    /// Entity counts, per-table row counts and operation metrics.
    #[must_use]
    pub fn get_storage_stats(&self) -> StorageStats {
        let mut component_stats: Vec<ComponentStats> = self
            .tables
            .iter()
            .map(|t| ComponentStats {
                component_type: t.key().to_string(),
                count: t.value().len(),
            })
            .collect();
        component_stats.sort_by(|a, b| a.component_type.cmp(&b.component_type));

        StorageStats {
            entity_stats: EntityStats {
                live: self.registry.live_count(),
                created: self.registry.created_count(),
                destroyed: self.registry.destroyed_count(),
                archetypes: self.archetypes.len(),
            },
            component_stats,
            performance_metrics: self.monitor.metrics(),
        }
    }

    /// Advisory health assessment. Never fails.
    #[must_use]
    pub fn health_report(&self) -> HealthReport {
        let report = monitor::assess(&self.get_storage_stats(), &self.config.health);
        if report.overall_health != HealthStatus::Healthy {
            warn!(
                health = ?report.overall_health,
                recommendations = report.recommendations.len(),
                "storage health degraded"
            );
        }
        report
    }

    // -- Backup / restore --

    /// Write a snapshot of the full store into the configured backup directory.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] / [`StorageError::Encode`] on write failure.
    pub fn create_backup(&self) -> Result<SnapshotHandle, StorageError> {
        self.create_backup_with(&CancelToken::new())
    }

    /// Cancellable form of [`create_backup`](Self::create_backup).
    ///
    /// # Errors
    ///
    /// As `create_backup`, plus [`StorageError::Cancelled`].
    pub fn create_backup_with(&self, cancel: &CancelToken) -> Result<SnapshotHandle, StorageError> {
        self.monitor.time(OpKind::Backup, || {
            let image = self.capture()?;
            persistence::write_image(&self.config.backup_dir, &image, cancel)
        })
    }

    fn capture(&self) -> Result<SnapshotImage, StorageError> {
        let _gate = self.gate.write();
        let entities = self
            .registry
            .live_entries()
            .into_iter()
            .map(|(id, archetype)| EntitySnapshot { id, archetype })
            .collect();
        let mut tables = BTreeMap::new();
        for table in self.tables.iter() {
            tables.insert(table.key().to_string(), table.value().records()?);
        }
        Ok(SnapshotImage::new(self.registry.next_id(), entities, tables))
    }

    /// Replace the whole store with a snapshot's contents.
    ///
    /// All records are decoded and validated before anything is touched; on
    /// any error the live store is unchanged.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if the file cannot be read and
    /// [`StorageError::CorruptSnapshot`] if anything in it is invalid.
    pub fn restore_backup(&self, handle: &SnapshotHandle) -> Result<(), StorageError> {
        self.restore_backup_with(handle, &CancelToken::new())
    }

    /// Cancellable form of [`restore_backup`](Self::restore_backup).
    ///
    /// # Errors
    ///
    /// As `restore_backup`, plus [`StorageError::Cancelled`] if cancelled
    /// before the swap.
    pub fn restore_backup_with(
        &self,
        handle: &SnapshotHandle,
        cancel: &CancelToken,
    ) -> Result<(), StorageError> {
        self.monitor.time(OpKind::Restore, || {
            let image = persistence::read_image(handle)?;
            cancel.check()?;

            let mut staged = Vec::with_capacity(image.tables.len());
            for (type_name, records) in image.tables {
                let table = self.table_named(&type_name).ok_or_else(|| {
                    StorageError::CorruptSnapshot(format!("unknown component type '{type_name}'"))
                })?;
                let rows = table.stage(records).map_err(|e| {
                    StorageError::CorruptSnapshot(format!("{handle}: {e}"))
                })?;
                staged.push((table, rows));
                cancel.check()?;
            }

            let entities: Vec<_> = image
                .entities
                .into_iter()
                .map(|e| (e.id, e.archetype))
                .collect();
            let entity_count = entities.len();

            let _gate = self.gate.write();
            cancel.check()?;
            self.registry.replace(entities, image.next_entity_id);
            for table in self.tables.iter() {
                table.value().clear();
            }
            for (table, rows) in staged {
                if !table.replace_with(rows) {
                    // Staged from this very table, so the types always agree.
                    warn!(component = table.type_name(), "staged rows did not match their table");
                }
            }
            info!(snapshot = %handle, entities = entity_count, "snapshot restored");
            Ok(())
        })
    }

    /// Snapshot files in the backup directory, oldest first.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if the directory cannot be read.
    pub fn list_backups(&self) -> Result<Vec<SnapshotHandle>, StorageError> {
        persistence::list(&self.config.backup_dir)
    }

    /// Delete one snapshot file.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if it cannot be removed.
    pub fn delete_backup(&self, handle: &SnapshotHandle) -> Result<(), StorageError> {
        persistence::delete(handle)
    }

    /// Delete the oldest snapshots so at most `keep` remain. Returns how many
    /// were deleted.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] on the first listing or deletion failure.
    pub fn prune_backups(&self, keep: usize) -> Result<usize, StorageError> {
        let handles = self.list_backups()?;
        let excess = handles.len().saturating_sub(keep);
        for handle in &handles[..excess] {
            self.delete_backup(handle)?;
        }
        Ok(excess)
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(StorageConfig::default())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("entities", &self.registry.live_count())
            .field("component_types", &self.component_types())
            .field("archetypes", &self.archetypes.names())
            .finish_non_exhaustive()
    }
}

fn missing<T: Component>(entity: Entity) -> StorageError {
    StorageError::ComponentNotFound {
        entity,
        component: T::type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
    }

    impl Component for Pos {
        fn type_name() -> &'static str {
            "pos"
        }

        fn validate(&self) -> Result<(), String> {
            if !self.x.is_finite() || !self.y.is_finite() {
                return Err("coordinates must be finite".into());
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hp(i32);

    impl Component for Hp {
        fn type_name() -> &'static str {
            "hp"
        }

        fn validate(&self) -> Result<(), String> {
            if self.0 < 0 {
                return Err("negative hp".into());
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Imposter(String);

    impl Component for Imposter {
        fn type_name() -> &'static str {
            "hp"
        }
    }

    fn storage() -> Storage {
        Storage::new(StorageConfig::default())
    }

    #[test]
    fn test_add_get_update_remove() {
        let storage = storage();
        let e = storage.create_entity(None).unwrap();

        storage.add_component(e, Pos { x: 1.0, y: 2.0 }).unwrap();
        assert_eq!(storage.get_component::<Pos>(e).unwrap(), Pos { x: 1.0, y: 2.0 });

        storage.update_component(e, Pos { x: 3.0, y: 4.0 }).unwrap();
        assert_eq!(storage.get_component::<Pos>(e).unwrap().x, 3.0);

        storage.remove_component::<Pos>(e).unwrap();
        assert!(!storage.has_component::<Pos>(e));
        let err = storage.remove_component::<Pos>(e).unwrap_err();
        assert!(matches!(err, StorageError::ComponentNotFound { .. }));
    }

    #[test]
    fn test_rejected_value_keeps_prior() {
        let storage = storage();
        let e = storage.create_entity(None).unwrap();
        storage.add_component(e, Hp(10)).unwrap();

        let err = storage.update_component(e, Hp(-5)).unwrap_err();
        assert!(matches!(err, StorageError::Validation { ref component, .. } if component == "hp"));
        assert_eq!(storage.get_component::<Hp>(e).unwrap(), Hp(10));
    }

    #[test]
    fn test_modify_rolls_back_invalid_edit() {
        let storage = storage();
        let e = storage.create_entity(None).unwrap();
        storage.add_component(e, Hp(10)).unwrap();

        storage.modify_component::<Hp, _>(e, |hp| hp.0 += 5).unwrap();
        assert_eq!(storage.get_component::<Hp>(e).unwrap(), Hp(15));

        let err = storage
            .modify_component::<Hp, _>(e, |hp| hp.0 = -1)
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
        assert_eq!(storage.get_component::<Hp>(e).unwrap(), Hp(15));

        let other = storage.create_entity(None).unwrap();
        let err = storage
            .modify_component::<Hp, _>(other, |hp| hp.0 = 1)
            .unwrap_err();
        assert!(matches!(err, StorageError::ComponentNotFound { .. }));
    }

    #[test]
    fn test_operations_on_dead_entity_fail() {
        let storage = storage();
        let e = storage.create_entity(None).unwrap();
        storage.add_component(e, Hp(1)).unwrap();
        storage.destroy_entity(e).unwrap();

        assert!(!storage.is_alive(e));
        assert!(matches!(
            storage.add_component(e, Hp(2)),
            Err(StorageError::EntityNotFound(x)) if x == e
        ));
        assert!(matches!(
            storage.get_component::<Hp>(e),
            Err(StorageError::EntityNotFound(_))
        ));
        assert!(matches!(
            storage.destroy_entity(e),
            Err(StorageError::EntityNotFound(_))
        ));
        assert_eq!(storage.component_count::<Hp>(), 0);
    }

    #[test]
    fn test_name_conflict_between_types() {
        let storage = storage();
        storage.register_component::<Hp>().unwrap();
        let err = storage.register_component::<Imposter>().unwrap_err();
        assert!(matches!(err, StorageError::ComponentTypeConflict(ref n) if n == "hp"));
    }

    #[test]
    fn test_unknown_archetype_creates_nothing() {
        let storage = storage();
        let err = storage.create_entity(Some("ghost")).unwrap_err();
        assert!(matches!(err, StorageError::UnknownArchetype(ref n) if n == "ghost"));
        assert_eq!(storage.entity_count(), 0);
    }

    #[test]
    fn test_archetype_overrides() {
        let storage = storage();
        storage
            .register_archetype(
                Archetype::builder("unit")
                    .with(Hp(100))
                    .with(Pos { x: 0.0, y: 0.0 })
                    .build(),
            )
            .unwrap();

        let e = storage
            .create_entity_with("unit", &Overrides::new().with(Hp(7)))
            .unwrap();
        assert_eq!(storage.get_component::<Hp>(e).unwrap(), Hp(7));
        assert_eq!(storage.get_component::<Pos>(e).unwrap(), Pos { x: 0.0, y: 0.0 });
        assert_eq!(storage.archetype_of(e).unwrap().as_deref(), Some("unit"));
    }

    #[test]
    fn test_partial_archetype_keeps_earlier_components() {
        let storage = storage();
        storage
            .register_archetype(
                Archetype::builder("unit")
                    .with(Pos { x: 0.0, y: 0.0 })
                    .with(Hp(100))
                    .build(),
            )
            .unwrap();

        let err = storage
            .create_entity_with("unit", &Overrides::new().with(Hp(-3)))
            .unwrap_err();
        let (entity, applied, failed) = match err {
            StorageError::PartialArchetype {
                entity,
                applied,
                failed,
                ..
            } => (entity, applied, failed),
            other => panic!("expected partial archetype, got {other:?}"),
        };
        assert_eq!(applied, vec!["pos".to_string()]);
        assert_eq!(failed, "hp");
        assert!(storage.is_alive(entity));
        assert!(storage.has_component::<Pos>(entity));
        assert!(!storage.has_component::<Hp>(entity));
    }

    #[test]
    fn test_query_and_exclusion() {
        let storage = storage();
        let a = storage.create_entity(None).unwrap();
        let b = storage.create_entity(None).unwrap();
        let c = storage.create_entity(None).unwrap();
        for e in [a, b, c] {
            storage.add_component(e, Pos { x: 0.0, y: 0.0 }).unwrap();
        }
        storage.add_component(b, Hp(1)).unwrap();

        assert_eq!(storage.query_entities(&["pos"]).unwrap(), vec![a, b, c]);
        assert_eq!(storage.query_entities(&["pos", "hp"]).unwrap(), vec![b]);
        assert!(storage.query_entities(&["pos", "mana"]).unwrap().is_empty());
        assert!(matches!(
            storage.query_entities(&[]),
            Err(StorageError::EmptyQuery)
        ));

        let descriptor = QueryDescriptor::new().read::<Pos>().without::<Hp>();
        assert_eq!(storage.query(&descriptor).unwrap(), vec![a, c]);
    }

    #[test]
    fn test_get_components_is_partial() {
        let storage = storage();
        let a = storage.create_entity(None).unwrap();
        let b = storage.create_entity(None).unwrap();
        let dead = storage.create_entity(None).unwrap();
        storage.destroy_entity(dead).unwrap();
        storage.add_component(a, Hp(3)).unwrap();
        storage.add_component(a, Pos { x: 1.0, y: 1.0 }).unwrap();

        let out = storage.get_components(&[a, b, dead], &["hp", "pos", "mana"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[&a].len(), 2);
        assert_eq!(out[&a]["hp"], serde_json::json!(3));
        assert!(out[&b].is_empty());
        assert!(!out.contains_key(&dead));

        let typed = storage.get_many::<Hp>(&[a, b]);
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[&a], Hp(3));
    }

    #[test]
    fn test_entities_by_archetype() {
        let storage = storage();
        storage
            .register_archetype(Archetype::builder("enemy").with(Hp(5)).build())
            .unwrap();
        let e1 = storage.create_entity(Some("enemy")).unwrap();
        let e2 = storage.create_entity(Some("enemy")).unwrap();
        storage.create_entity(None).unwrap();
        storage.remove_component::<Hp>(e2).unwrap();

        assert_eq!(storage.get_entities_by_archetype("enemy").unwrap(), vec![e1, e2]);
        storage.destroy_entity(e1).unwrap();
        assert_eq!(storage.get_entities_by_archetype("enemy").unwrap(), vec![e2]);
        assert!(matches!(
            storage.get_entities_by_archetype("boss"),
            Err(StorageError::ArchetypeNotFound(_))
        ));
    }

    #[test]
    fn test_stats_count_operations_and_errors() {
        let storage = storage();
        let e = storage.create_entity(None).unwrap();
        storage.add_component(e, Hp(1)).unwrap();
        let _ = storage.add_component(e, Hp(-1));

        let stats = storage.get_storage_stats();
        assert_eq!(stats.entity_stats.live, 1);
        assert_eq!(stats.entity_stats.created, 1);
        assert_eq!(stats.component_stats.len(), 1);
        assert_eq!(stats.component_stats[0].count, 1);
        let adds = stats.performance_metrics.op(OpKind::AddComponent).unwrap();
        assert_eq!(adds.count, 2);
        assert_eq!(adds.errors, 1);
        assert_eq!(stats.performance_metrics.total_operations, 3);

        assert!(storage.is_alive(e));
        assert!(storage.has_component::<Hp>(e));
        assert!(!storage.has_component_named(e, "mana"));
        let metrics = storage.get_storage_stats().performance_metrics;
        assert_eq!(metrics.op(OpKind::IsAlive).unwrap().count, 1);
        assert_eq!(metrics.op(OpKind::HasComponent).unwrap().count, 2);
        assert_eq!(metrics.total_operations, 6);
    }

    #[test]
    fn test_backup_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(StorageConfig::default().with_backup_dir(dir.path()));
        let a = storage.create_entity(None).unwrap();
        storage.add_component(a, Hp(9)).unwrap();
        storage.add_component(a, Pos { x: 1.5, y: -2.0 }).unwrap();

        let handle = storage.create_backup().unwrap();

        storage.update_component(a, Hp(1)).unwrap();
        let b = storage.create_entity(None).unwrap();
        storage.add_component(b, Hp(2)).unwrap();

        storage.restore_backup(&handle).unwrap();
        assert_eq!(storage.get_component::<Hp>(a).unwrap(), Hp(9));
        assert_eq!(storage.get_component::<Pos>(a).unwrap(), Pos { x: 1.5, y: -2.0 });
        assert!(!storage.is_alive(b));
        assert_eq!(storage.component_count::<Hp>(), 1);

        let fresh = storage.create_entity(None).unwrap();
        assert!(fresh.id() > b.id());
    }

    #[test]
    fn test_restore_rejects_top_entity_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(StorageConfig::default().with_backup_dir(dir.path()));
        let keep = storage.create_entity(None).unwrap();
        storage.add_component(keep, Hp(4)).unwrap();

        let top = Entity::from_raw(u64::MAX);
        let mut tables = BTreeMap::new();
        tables.insert(
            "hp".to_string(),
            vec![engine_component::ComponentRecord {
                entity: top,
                record: serde_json::json!(1),
            }],
        );
        let image = SnapshotImage::new(
            u64::MAX,
            vec![EntitySnapshot {
                id: top,
                archetype: None,
            }],
            tables,
        );
        let handle = persistence::write_image(dir.path(), &image, &CancelToken::new()).unwrap();

        let err = storage.restore_backup(&handle).unwrap_err();
        assert!(matches!(err, StorageError::CorruptSnapshot(_)), "got {err:?}");
        assert!(storage.is_alive(keep));
        assert!(!storage.is_alive(top));
        assert_eq!(storage.entity_count(), 1);
        assert_eq!(storage.get_component::<Hp>(keep).unwrap(), Hp(4));
        assert_eq!(storage.create_entity(None).unwrap().id(), keep.id() + 1);
    }

    #[test]
    fn test_cancelled_backup_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(StorageConfig::default().with_backup_dir(dir.path()));
        storage.create_entity(None).unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            storage.create_backup_with(&cancel),
            Err(StorageError::Cancelled)
        ));
        assert!(storage.list_backups().unwrap().is_empty());
    }

    #[test]
    fn test_prune_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(StorageConfig::default().with_backup_dir(dir.path()));
        let written: Vec<SnapshotHandle> =
            (0..4).map(|_| storage.create_backup().unwrap()).collect();
        assert_eq!(storage.prune_backups(2).unwrap(), 2);
        assert_eq!(storage.list_backups().unwrap(), written[2..]);
        assert_eq!(storage.prune_backups(5).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_writers_to_distinct_entities() {
        let storage = Arc::new(storage());
        let entities: Vec<Entity> = (0..8).map(|_| storage.create_entity(None).unwrap()).collect();

        std::thread::scope(|s| {
            for (i, &e) in entities.iter().enumerate() {
                let storage = Arc::clone(&storage);
                s.spawn(move || {
                    for n in 0..100 {
                        storage.update_component(e, Hp(i as i32 * 1000 + n)).unwrap();
                    }
                });
            }
        });

        for (i, &e) in entities.iter().enumerate() {
            assert_eq!(storage.get_component::<Hp>(e).unwrap(), Hp(i as i32 * 1000 + 99));
        }
    }

    #[test]
    fn test_destroy_races_with_writers() {
        let storage = Arc::new(storage());
        let e = storage.create_entity(None).unwrap();

        std::thread::scope(|s| {
            let writer = Arc::clone(&storage);
            s.spawn(move || {
                for n in 0..500 {
                    if writer.add_component(e, Hp(n)).is_err() {
                        break;
                    }
                }
            });
            let destroyer = Arc::clone(&storage);
            s.spawn(move || destroyer.destroy_entity(e).unwrap());
        });

        assert!(!storage.is_alive(e));
        assert_eq!(storage.component_count::<Hp>(), 0);
    }
}
