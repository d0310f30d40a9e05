//! System registry: the systems the tick loop runs, in registration order.

use std::fmt;

use crate::systems::System;

/// Registered systems, unique by name.
#[derive(Default)]
pub struct SystemRegistry {
    systems: Vec<Box<dyn System>>,
}

impl SystemRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system. Returns `false` (and drops `system`) if one with
    /// the same name is already registered.
    pub fn register(&mut self, system: Box<dyn System>) -> bool {
        if self.get(system.name()).is_some() {
            return false;
        }
        self.systems.push(system);
        true
    }

    /// Remove a system by name. Returns `true` if it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|s| s.name() != name);
        self.systems.len() != before
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Systems in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn System> {
        self.systems.iter().map(|s| s.as_ref())
    }

    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }
}

impl fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.systems.iter().map(|s| s.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::systems::{MovementSystem, RegenSystem};

    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = SystemRegistry::new();
        assert!(registry.register(Box::new(MovementSystem)));
        assert!(registry.register(Box::new(RegenSystem::default())));
        assert_eq!(registry.system_count(), 2);
        assert_eq!(registry.get("movement").map(|s| s.name()), Some("movement"));
        assert!(registry.get("physics").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = SystemRegistry::new();
        assert!(registry.register(Box::new(MovementSystem)));
        assert!(!registry.register(Box::new(MovementSystem)));
        assert_eq!(registry.system_count(), 1);
    }

    #[test]
    fn test_unregister_keeps_order() {
        let mut registry = SystemRegistry::new();
        for system in crate::systems::default_systems() {
            registry.register(system);
        }
        assert!(registry.unregister("sensing"));
        assert!(!registry.unregister("sensing"));
        let names: Vec<&str> = registry.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["movement", "ai", "regen"]);
    }
}
