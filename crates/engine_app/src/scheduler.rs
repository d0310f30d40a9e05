//! System scheduler: conflict detection and stage computation.
//!
//! Systems are grouped into **stages** based on their read/write access sets.
//! Systems within a stage have no conflicts and run in parallel. Stages run
//! one after another.

use engine_component::QueryDescriptor;

/// A system's name and access declaration, as seen by the scheduler.
#[derive(Debug, Clone)]
pub struct RegisteredSystem {
    pub name: String,
    pub query: QueryDescriptor,
}

/// A group of systems that can run in parallel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// Indices into the system list the stages were computed from.
    pub system_indices: Vec<usize>,
}

/// Computes execution stages with a greedy graph colouring:
/// each system goes into the first stage where it conflicts with nobody,
/// or into a new stage if there is none.
///
/// The assignment is valid (no two conflicting systems share a stage) but not
/// necessarily minimal. Registration order decides ties, so the result is
/// deterministic.
#[must_use]
pub fn compute_stages(systems: &[RegisteredSystem]) -> Vec<Stage> {
    let mut stages: Vec<Stage> = Vec::new();

    for (sys_idx, system) in systems.iter().enumerate() {
        let slot = stages.iter_mut().find(|stage| {
            !stage
                .system_indices
                .iter()
                .any(|&existing| system.query.conflicts_with(&systems[existing].query))
        });
        match slot {
            Some(stage) => stage.system_indices.push(sys_idx),
            None => stages.push(Stage {
                system_indices: vec![sys_idx],
            }),
        }
    }

    stages
}
