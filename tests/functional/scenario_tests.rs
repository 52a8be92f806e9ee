//! Multi-step plan scenarios.
//!
//! Each test drives a `PlanManager` through a sequence of user actions and
//! checks the resulting slot layout plus the plan invariants after every
//! step.

use session_planner::PlanError;
use session_planner::plan::{AddOutcome, SlotEvent};
use session_planner::slots::SlotRange;

use crate::common::{assert_consistent, key, layout, manager_with, scenario_catalog};

fn committed(outcome: AddOutcome) -> session_planner::PlanChange {
    match outcome {
        AddOutcome::Committed { change } => change,
        other => panic!("expected a committed add, got {:?}", other),
    }
}

// ============================================================================
// Allocation and compaction
// ============================================================================

/// Fragmented free space is compacted before the add is retried.
#[test]
fn test_fragmented_add_triggers_compaction() {
    let mut m = manager_with(scenario_catalog(), 5);

    m.propose_add(&key("a")).unwrap();
    m.propose_add(&key("b")).unwrap();
    assert_eq!(layout(m.state()), "aab..");

    m.remove(0).unwrap();
    assert_eq!(layout(m.state()), "..b..");

    let change = committed(m.propose_add(&key("c")).unwrap());
    assert!(change.compacted());
    let compaction = change.compaction.as_ref().unwrap();
    assert_eq!(compaction.moves.len(), 1);
    assert_eq!(compaction.moves[0].from, SlotRange::single(2));
    assert_eq!(compaction.moves[0].to, SlotRange::single(0));
    assert_eq!(compaction.free_start, 1);

    assert_eq!(layout(m.state()), "bccc.");
    assert_eq!(m.state().instance_at(1).unwrap().topic, key("c"));
    assert_eq!(m.state().next_free(), Some(4));
    assert_consistent(m.state());
}

/// Every successful add writes offsets 0..n-1 across one run.
#[test]
fn test_add_writes_consecutive_offsets() {
    let mut m = manager_with(scenario_catalog(), 10);
    m.propose_add(&key("b")).unwrap();
    m.propose_add(&key("c")).unwrap();

    let offsets: Vec<u16> = (1..=3)
        .map(|i| m.state().slots().get(i).unwrap().unwrap().offset)
        .collect();
    assert_eq!(offsets, vec![0, 1, 2]);
    assert_consistent(m.state());
}

/// Adding a non-repeatable topic twice fails and leaves the table untouched.
#[test]
fn test_duplicate_add_leaves_table_unchanged() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("a")).unwrap();
    let before = m.state().clone();

    let err = m.propose_add(&key("a")).unwrap_err();
    assert_eq!(err, PlanError::DuplicateTopic { key: key("a") });
    assert_eq!(m.state(), &before);
}

/// Running out of sessions reports how many more are needed.
#[test]
fn test_insufficient_capacity_reports_shortfall() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("a")).unwrap();
    m.propose_add(&key("b")).unwrap();

    let err = m.propose_add(&key("c")).unwrap_err();
    assert_eq!(
        err,
        PlanError::InsufficientCapacity {
            key: key("c"),
            required: 3,
            available: 2
        }
    );
    assert_eq!(err.sessions_short(), Some(1));
    assert!(err.is_capacity_error());
    assert_eq!(layout(m.state()), "aab..");
}

/// A topic larger than the whole plan is a plain capacity error.
#[test]
fn test_topic_larger_than_plan() {
    let mut m = manager_with(scenario_catalog(), 5);
    let err = m.propose_add(&key("big")).unwrap_err();
    assert!(matches!(
        err,
        PlanError::InsufficientCapacity {
            required: 6,
            available: 5,
            ..
        }
    ));
}

// ============================================================================
// Pathways
// ============================================================================

/// A pathway that does not fit is rejected without touching the plan.
#[test]
fn test_pathway_exceeding_capacity_keeps_prior_state() {
    let mut m = manager_with(scenario_catalog(), 1);
    m.propose_add(&key("b")).unwrap();
    let before = m.state().clone();

    let err = m.apply_pathway("Three Up").unwrap_err();
    assert_eq!(
        err,
        PlanError::PathwayExceedsCapacity {
            pathway: "Three Up".into(),
            required: 6,
            capacity: 1
        }
    );
    assert_eq!(m.state(), &before);
    assert!(m.pathway().is_none());
}

/// Pathways replace the plan and pack topics from slot 0 in list order.
#[test]
fn test_pathway_replaces_plan_in_order() {
    let mut m = manager_with(scenario_catalog(), 10);
    m.propose_add(&key("c")).unwrap();

    let change = m.apply_pathway("Pair").unwrap();
    assert_eq!(change.cleared().count(), 1);
    assert_eq!(change.placed().count(), 2);
    assert_eq!(layout(m.state()), "baa.......");
    assert!(m.state().roster().iter().all(|e| !e.repeatable));
    assert_consistent(m.state());
}

/// Repeated keys in a pathway are placed once.
#[test]
fn test_pathway_duplicates_collapse() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.apply_pathway("Echo").unwrap();
    assert_eq!(layout(m.state()), "baa..");
    assert_eq!(m.state().roster().len(), 2);
}

// ============================================================================
// Repeatable topics
// ============================================================================

/// A confirmed repeat creates a second instance; each is removable alone.
#[test]
fn test_repeatable_topic_with_confirmation() {
    let mut m = manager_with(scenario_catalog(), 5);
    committed(m.propose_add(&key("fb")).unwrap());

    let outcome = m.propose_add(&key("fb")).unwrap();
    assert_eq!(
        outcome,
        AddOutcome::NeedsConfirmation {
            key: key("fb"),
            existing: 1
        }
    );
    assert_eq!(layout(m.state()), "f....");

    m.confirm_add().unwrap();
    assert_eq!(layout(m.state()), "ff...");
    assert_eq!(m.state().instances_of(&key("fb")).count(), 2);

    m.remove(0).unwrap();
    assert_eq!(layout(m.state()), ".f...");
    assert!(m.state().instance_at(1).is_some());
    assert_consistent(m.state());

    m.remove(1).unwrap();
    assert!(m.state().is_empty());
}

/// Declining the repeat changes nothing.
#[test]
fn test_repeatable_topic_declined() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("fb")).unwrap();
    m.propose_add(&key("fb")).unwrap();
    let before = m.state().clone();

    m.cancel_add().unwrap();
    assert_eq!(m.state(), &before);
    assert!(m.pending().is_none());
}

// ============================================================================
// Move and swap
// ============================================================================

/// Swapping runs of different length leaves no orphaned records.
#[test]
fn test_swap_one_and_two_session_instances() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("b")).unwrap();
    m.propose_add(&key("a")).unwrap();
    assert_eq!(layout(m.state()), "baa..");

    let change = m.swap(0, 1).unwrap();
    assert_eq!(layout(m.state()), "aab..");
    assert_eq!(change.events.len(), 2);
    assert!(
        change
            .events
            .iter()
            .all(|e| matches!(e, SlotEvent::Moved { .. }))
    );
    assert_consistent(m.state());
    assert_eq!(m.state().occupied_count(), 3);
}

/// When both runs fit at each other's former start they trade starts exactly.
#[test]
fn test_swap_trades_starts_when_both_fit() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("b")).unwrap();
    m.propose_add(&key("a")).unwrap();
    m.move_instance(1, 3).unwrap();
    assert_eq!(layout(m.state()), "b..aa");

    let change = m.swap(0, 3).unwrap();
    assert_eq!(layout(m.state()), "aa.b.");
    assert_eq!(m.state().instance_at(3).unwrap().topic, key("b"));
    assert_eq!(change.events.len(), 2);
    assert_consistent(m.state());
}

/// Instances between two swapped runs shift with them when a direct
/// exchange would collide.
#[test]
fn test_swap_across_gap_and_middle_instance() {
    let mut m = manager_with(scenario_catalog(), 10);
    m.propose_add(&key("b")).unwrap();
    m.propose_add(&key("fb")).unwrap();
    m.propose_add(&key("c")).unwrap();
    m.move_instance(2, 4).unwrap();
    assert_eq!(layout(m.state()), "bf..ccc...");

    m.swap(4, 0).unwrap();
    assert_eq!(layout(m.state()), "cccf..b...");
    assert_consistent(m.state());
}

/// Moves validate bounds and occupancy before changing anything.
#[test]
fn test_move_rules() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("a")).unwrap();
    m.propose_add(&key("b")).unwrap();

    assert_eq!(
        m.move_instance(0, 2).unwrap_err(),
        PlanError::TargetOccupied {
            range: SlotRange::new(2, 3)
        }
    );
    assert!(matches!(
        m.move_instance(2, 5).unwrap_err(),
        PlanError::OutOfBounds { index: 5, .. }
    ));
    assert_eq!(
        m.move_instance(1, 3).unwrap_err(),
        PlanError::InstanceNotFound { start: 1 }
    );
    assert_eq!(layout(m.state()), "aab..");

    m.move_instance(2, 4).unwrap();
    m.move_instance(0, 1).unwrap();
    assert_eq!(layout(m.state()), ".aa.b");
    assert_consistent(m.state());
}

// ============================================================================
// Capacity changes
// ============================================================================

/// Shrinking compacts first when runs sit past the new end.
#[test]
fn test_shrink_pack_compacts_then_truncates() {
    let mut m = manager_with(scenario_catalog(), 10);
    m.propose_add(&key("a")).unwrap();
    m.move_instance(0, 7).unwrap();
    m.propose_add(&key("b")).unwrap();
    assert_eq!(layout(m.state()), "b......aa.");

    let change = m.select_pack(5).unwrap();
    assert!(change.compacted());
    assert_eq!(layout(m.state()), "baa..");
    assert_eq!(m.pack().discount_percent, 10);
    assert_consistent(m.state());
}

/// Shrinking below the placed sessions is refused.
#[test]
fn test_shrink_below_occupied_rejected() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("a")).unwrap();
    let before = m.state().clone();

    assert_eq!(
        m.select_pack(1).unwrap_err(),
        PlanError::CapacityBelowOccupied {
            occupied: 2,
            requested: 1
        }
    );
    assert_eq!(m.state(), &before);
    assert_eq!(m.pack().sessions, 5);
}

/// Growing keeps the layout and appends empty slots.
#[test]
fn test_grow_pack_keeps_layout() {
    let mut m = manager_with(scenario_catalog(), 5);
    m.propose_add(&key("c")).unwrap();
    let change = m.select_pack(10).unwrap();
    assert!(!change.compacted());
    assert_eq!(layout(m.state()), "ccc.......");
}
