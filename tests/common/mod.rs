//! Shared helpers for the integration test suites.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use session_planner::PlanManager;
use session_planner::catalog::Catalog;
use session_planner::plan::PlanState;

/// Manager over `catalog` starting with the pack of `sessions` slots.
pub fn manager_with(catalog: Catalog, sessions: u16) -> PlanManager {
    let pack = catalog
        .session_pack(sessions)
        .expect("fixture catalog offers this pack");
    PlanManager::new(catalog, pack)
}

/// Render the slot table as one character per slot: `.` for empty, else the
/// first letter of the topic key.
pub fn layout(state: &PlanState) -> String {
    state
        .slots()
        .iter()
        .map(|(_, slot)| match slot {
            None => '.',
            Some(o) => o.topic.as_str().chars().next().unwrap_or('?'),
        })
        .collect()
}

/// Check every plan invariant, panicking with context on failure.
pub fn assert_consistent(state: &PlanState) {
    state.validate().expect("plan invariants hold");
    let placed: u32 = state.roster().iter().map(|e| u32::from(e.sessions)).sum();
    assert_eq!(placed, u32::from(state.occupied_count()));
}
