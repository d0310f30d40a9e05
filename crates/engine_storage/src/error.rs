//! Storage-level error types.

use engine_component::{ComponentError, Entity};

/// Errors returned by [`Storage`](crate::Storage) operations.
///
/// Every storage operation returns one of these instead of panicking; the
/// engine never retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The entity was never created or has been destroyed.
    #[error("entity {0} not found")]
    EntityNotFound(Entity),

    /// The entity is alive but has no component of this type.
    #[error("component '{component}' not found on {entity}")]
    ComponentNotFound {
        /// The entity that was looked up.
        entity: Entity,
        /// The missing component type.
        component: String,
    },

    /// No archetype is registered under this name.
    #[error("archetype '{0}' not found")]
    ArchetypeNotFound(String),

    /// A component payload was rejected by its type's validator.
    #[error("validation error on '{component}': {reason}")]
    Validation {
        /// The component type that rejected the payload.
        component: String,
        /// The validator's reason.
        reason: String,
    },

    /// An archetype with this name is already registered.
    #[error("archetype '{0}' is already registered")]
    DuplicateArchetype(String),

    /// `create_entity` named an archetype that does not exist.
    #[error("unknown archetype '{0}'")]
    UnknownArchetype(String),

    /// A query was issued without any required component types.
    #[error("query requires at least one component type")]
    EmptyQuery,

    /// Two different Rust types were registered under the same component name.
    #[error("component name '{0}' is already bound to a different type")]
    ComponentTypeConflict(String),

    /// A component could not be converted into a keyed record.
    #[error("failed to encode '{component}' record: {reason}")]
    Record {
        /// The component type.
        component: String,
        /// Why encoding failed.
        reason: String,
    },

    /// Archetype instantiation stopped part-way through.
    ///
    /// The entity exists and holds exactly the components listed in
    /// `applied`; nothing from `failed` onwards was added.
    #[error(
        "archetype '{archetype}' only partially applied to {entity}: '{failed}' rejected ({reason})"
    )]
    PartialArchetype {
        /// The archetype being instantiated.
        archetype: String,
        /// The entity that was created.
        entity: Entity,
        /// Component types added before the failure, in order.
        applied: Vec<String>,
        /// The component type whose insert failed.
        failed: String,
        /// Why it failed.
        reason: String,
    },

    /// Backup or restore I/O failed.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot image could not be encoded.
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The snapshot image is unreadable or contains an invalid record.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// A backup or restore was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Returns `true` for the three "not found" forms (entity, component,
    /// archetype).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntityNotFound(_) | Self::ComponentNotFound { .. } | Self::ArchetypeNotFound(_)
        )
    }
}

impl From<ComponentError> for StorageError {
    fn from(err: ComponentError) -> Self {
        match err {
            ComponentError::Validation { component, reason } => {
                Self::Validation { component, reason }
            }
            ComponentError::Encode { component, source } => Self::Record {
                component,
                reason: source.to_string(),
            },
            ComponentError::Decode { component, reason } => {
                Self::CorruptSnapshot(format!("cannot decode '{component}' record: {reason}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_grouping() {
        assert!(StorageError::EntityNotFound(Entity::from_raw(1)).is_not_found());
        assert!(StorageError::ArchetypeNotFound("x".into()).is_not_found());
        assert!(
            StorageError::ComponentNotFound {
                entity: Entity::from_raw(1),
                component: "health".into(),
            }
            .is_not_found()
        );
        assert!(!StorageError::EmptyQuery.is_not_found());
    }

    #[test]
    fn test_component_error_mapping() {
        let err: StorageError = ComponentError::Validation {
            component: "sprite".into(),
            reason: "empty texture".into(),
        }
        .into();
        assert!(matches!(err, StorageError::Validation { ref component, .. } if component == "sprite"));

        let err: StorageError = ComponentError::Decode {
            component: "health".into(),
            reason: "missing field".into(),
        }
        .into();
        assert!(matches!(err, StorageError::CorruptSnapshot(_)));
    }
}
