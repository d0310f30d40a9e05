//! Archetype catalog: named templates for batch entity construction.
//!
//! An [`Archetype`] is an immutable, ordered set of component defaults.
//! Instantiating one adds each default (or its override) to a freshly created
//! entity, one component at a time, in registration order.
//!
//! Instantiation is **not** atomic. If a component is rejected, the entity
//! keeps the components added before it and nothing after it, and the caller
//! receives [`StorageError::PartialArchetype`] naming both sides of the
//! boundary.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use engine_component::{Component, ComponentError, Entity};
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::storage::Storage;

/// One typed default value inside an archetype or override set.
trait ComponentSpec: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn check(&self) -> Result<(), ComponentError>;

    fn register(&self, storage: &Storage) -> Result<(), StorageError>;

    fn apply(&self, storage: &Storage, entity: Entity) -> Result<(), StorageError>;
}

struct Spec<T>(T);

impl<T: Component> ComponentSpec for Spec<T> {
    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn check(&self) -> Result<(), ComponentError> {
        self.0.check()
    }

    fn register(&self, storage: &Storage) -> Result<(), StorageError> {
        storage.register_component::<T>()
    }

    fn apply(&self, storage: &Storage, entity: Entity) -> Result<(), StorageError> {
        storage.insert_row(entity, self.0.clone())
    }
}

/// A named, immutable component template.
pub struct Archetype {
    name: String,
    specs: Vec<Box<dyn ComponentSpec>>,
}

impl Archetype {
    /// Start building an archetype called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ArchetypeBuilder {
        ArchetypeBuilder::new(name)
    }

    /// The archetype's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Component type names in instantiation order.
    #[must_use]
    pub fn component_types(&self) -> Vec<&'static str> {
        self.specs.iter().map(|s| s.type_name()).collect()
    }

    /// Returns `true` if the template includes the named component type.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.specs.iter().any(|s| s.type_name() == type_name)
    }

    pub(crate) fn register_types(&self, storage: &Storage) -> Result<(), StorageError> {
        for spec in &self.specs {
            spec.register(storage)?;
        }
        Ok(())
    }

    fn check_defaults(&self) -> Result<(), StorageError> {
        for spec in &self.specs {
            spec.check()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("name", &self.name)
            .field("components", &self.component_types())
            .finish()
    }
}

/// Builder for [`Archetype`].
pub struct ArchetypeBuilder {
    name: String,
    specs: Vec<Box<dyn ComponentSpec>>,
}

impl ArchetypeBuilder {
    /// Start an empty template called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: Vec::new(),
        }
    }

    /// Add a component default. Adding the same type twice keeps the later
    /// value in the earlier position.
    #[must_use]
    pub fn with<T: Component>(mut self, default: T) -> Self {
        let spec: Box<dyn ComponentSpec> = Box::new(Spec(default));
        match self
            .specs
            .iter()
            .position(|s| s.type_name() == T::type_name())
        {
            Some(i) => self.specs[i] = spec,
            None => self.specs.push(spec),
        }
        self
    }

    /// Finish the template.
    #[must_use]
    pub fn build(self) -> Archetype {
        Archetype {
            name: self.name,
            specs: self.specs,
        }
    }
}

/// Per-entity replacements for archetype defaults, keyed by component type.
#[derive(Default)]
pub struct Overrides {
    values: HashMap<&'static str, Box<dyn ComponentSpec>>,
}

impl Overrides {
    /// An empty override set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default for `T`.
    #[must_use]
    pub fn with<T: Component>(mut self, value: T) -> Self {
        self.values.insert(T::type_name(), Box::new(Spec(value)));
        self
    }

    /// Returns `true` if no overrides are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn get(&self, type_name: &str) -> Option<&dyn ComponentSpec> {
        self.values.get(type_name).map(|b| b.as_ref())
    }
}

impl fmt::Debug for Overrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().copied().collect();
        keys.sort_unstable();
        f.debug_struct("Overrides").field("components", &keys).finish()
    }
}

/// Registry of archetype templates.
#[derive(Debug, Default)]
pub struct ArchetypeCatalog {
    templates: DashMap<String, Arc<Archetype>>,
}

impl ArchetypeCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template.
    ///
    /// # Errors
    ///
    /// [`StorageError::Validation`] if a default fails its validator, and
    /// [`StorageError::DuplicateArchetype`] if the name is taken.
    pub fn register(&self, archetype: Archetype) -> Result<Arc<Archetype>, StorageError> {
        archetype.check_defaults()?;
        match self.templates.entry(archetype.name.clone()) {
            Entry::Occupied(_) => Err(StorageError::DuplicateArchetype(archetype.name)),
            Entry::Vacant(slot) => {
                info!(
                    archetype = %archetype.name,
                    components = ?archetype.component_types(),
                    "registered archetype"
                );
                let archetype = Arc::new(archetype);
                slot.insert(Arc::clone(&archetype));
                Ok(archetype)
            }
        }
    }

    /// Look up a template by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Archetype>> {
        self.templates.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Returns `true` if a template with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Registered template names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.iter().map(|t| t.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if no templates are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Add every component of template `name` to `entity`, preferring values
    /// from `overrides`.
    ///
    /// # Errors
    ///
    /// [`StorageError::UnknownArchetype`] if the template does not exist (no
    /// component is added). [`StorageError::PartialArchetype`] if a component
    /// is rejected part-way; see the module docs.
    pub fn instantiate(
        &self,
        storage: &Storage,
        name: &str,
        entity: Entity,
        overrides: &Overrides,
    ) -> Result<(), StorageError> {
        let archetype = self
            .get(name)
            .ok_or_else(|| StorageError::UnknownArchetype(name.to_string()))?;

        for type_name in overrides.values.keys().copied() {
            if !archetype.contains(type_name) {
                debug!(
                    archetype = name,
                    component = type_name,
                    "override ignored: not part of archetype"
                );
            }
        }

        let mut applied = Vec::with_capacity(archetype.specs.len());
        for spec in &archetype.specs {
            let source = overrides.get(spec.type_name()).unwrap_or(spec.as_ref());
            if let Err(e) = source.apply(storage, entity) {
                warn!(
                    archetype = name,
                    %entity,
                    applied = ?applied,
                    failed = spec.type_name(),
                    error = %e,
                    "archetype instantiation stopped part-way"
                );
                return Err(StorageError::PartialArchetype {
                    archetype: name.to_string(),
                    entity,
                    applied,
                    failed: spec.type_name().to_string(),
                    reason: e.to_string(),
                });
            }
            applied.push(spec.type_name().to_string());
        }
        Ok(())
    }
}
