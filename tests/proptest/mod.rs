// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for session-planner.
//!
//! Random operation sequences are replayed against a `PlanManager` and the
//! plan invariants are checked after every step.

#[path = "../common/mod.rs"]
mod common;

use proptest::prelude::*;

use session_planner::PlanManager;
use session_planner::plan::PlanState;
use session_planner::slots::{SlotRange, compact, find_run, plan_compaction};

use common::{key, manager_with, scenario_catalog};

const TOPICS: [&str; 5] = ["a", "b", "c", "big", "fb"];
const PATHWAYS: [&str; 3] = ["Three Up", "Pair", "Echo"];
const PACKS: [u16; 3] = [1, 5, 10];

/// One user action. Instance indices pick from the current roster.
#[derive(Debug, Clone)]
enum Op {
    Add(usize),
    Confirm,
    Cancel,
    Remove(usize),
    Move(usize, u16),
    Swap(usize, usize),
    Pathway(usize),
    Pack(usize),
    Reset,
}

/// Strategy for generating random operations, weighted toward adds.
fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..TOPICS.len()).prop_map(Op::Add),
        1 => Just(Op::Confirm),
        1 => Just(Op::Cancel),
        2 => any::<usize>().prop_map(Op::Remove),
        2 => (any::<usize>(), 0..12u16).prop_map(|(i, to)| Op::Move(i, to)),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Swap(a, b)),
        1 => (0..PATHWAYS.len()).prop_map(Op::Pathway),
        1 => (0..PACKS.len()).prop_map(Op::Pack),
        1 => Just(Op::Reset),
    ]
}

/// Start of the `pick`-th roster entry, or an unused index when empty.
fn start_of(state: &PlanState, pick: usize) -> u16 {
    let roster = state.roster();
    if roster.is_empty() {
        return u16::MAX;
    }
    roster[pick % roster.len()].start
}

/// Apply `op`, returning whether it succeeded.
fn apply(m: &mut PlanManager, op: &Op) -> bool {
    match op {
        Op::Add(i) => m.propose_add(&key(TOPICS[*i])).is_ok(),
        Op::Confirm => m.confirm_add().is_ok(),
        Op::Cancel => m.cancel_add().is_ok(),
        Op::Remove(i) => {
            let start = start_of(m.state(), *i);
            m.remove(start).is_ok()
        }
        Op::Move(i, to) => {
            let start = start_of(m.state(), *i);
            m.move_instance(start, *to).is_ok()
        }
        Op::Swap(a, b) => {
            let first = start_of(m.state(), *a);
            let second = start_of(m.state(), *b);
            m.swap(first, second).is_ok()
        }
        Op::Pathway(i) => m.apply_pathway(PATHWAYS[*i]).is_ok(),
        Op::Pack(i) => m.select_pack(PACKS[*i]).is_ok(),
        Op::Reset => {
            m.reset();
            true
        }
    }
}

/// Build a plan by replaying `ops` from an empty 10-slot plan.
fn replay(ops: &[Op]) -> PlanManager {
    let mut m = manager_with(scenario_catalog(), 10);
    for op in ops {
        apply(&mut m, op);
    }
    m
}

proptest! {
    /// Property: Contiguity and conservation hold after every operation.
    #[test]
    fn test_invariants_hold(ops in prop::collection::vec(any_op(), 1..60)) {
        let mut m = manager_with(scenario_catalog(), 10);
        for op in &ops {
            apply(&mut m, op);
            prop_assert!(m.state().validate().is_ok(), "invariants broken after {:?}", op);

            let placed: u32 = m.state().roster().iter().map(|e| u32::from(e.sessions)).sum();
            prop_assert_eq!(placed, u32::from(m.state().occupied_count()));
            prop_assert_eq!(m.state().capacity(), m.pack().sessions);
        }
    }

    /// Property: A rejected operation leaves the plan exactly as it was.
    #[test]
    fn test_failures_are_atomic(ops in prop::collection::vec(any_op(), 1..60)) {
        let mut m = manager_with(scenario_catalog(), 10);
        for op in &ops {
            let before = m.state().clone();
            let pack = m.pack();
            if !apply(&mut m, op) {
                prop_assert_eq!(m.state(), &before, "state changed by failed {:?}", op);
                prop_assert_eq!(m.pack(), pack);
            }
        }
    }

    /// Property: Compaction is idempotent and preserves run order.
    #[test]
    fn test_compaction_idempotent_and_ordered(ops in prop::collection::vec(any_op(), 1..40)) {
        let m = replay(&ops);
        let mut table = m.state().slots().clone();
        let order_before: Vec<_> = table
            .runs()
            .into_iter()
            .map(|r| (r.topic.clone(), r.sessions()))
            .collect();

        let plan = compact(&mut table).unwrap();
        let order_after: Vec<_> = table
            .runs()
            .into_iter()
            .map(|r| (r.topic.clone(), r.sessions()))
            .collect();
        prop_assert_eq!(&order_before, &order_after);
        prop_assert_eq!(Some(plan.free_start), table.first_free().or(Some(table.capacity())));
        prop_assert!(table.check_contiguity().is_ok());

        let again = plan_compaction(&table);
        prop_assert!(again.is_empty());
    }

    /// Property: find_run returns the lowest start with enough free slots.
    #[test]
    fn test_find_run_is_first_fit(
        ops in prop::collection::vec(any_op(), 1..40),
        sessions in 1..=4u16,
    ) {
        let m = replay(&ops);
        let table = m.state().slots();
        let fits = |start: u16| {
            SlotRange::from_len(start, sessions).is_some_and(|r| table.range_is_free(&r))
        };
        match find_run(table, sessions) {
            Some(start) => {
                prop_assert!(fits(start));
                prop_assert!((0..start).all(|s| !fits(s)));
            }
            None => {
                prop_assert!((0..table.capacity()).all(|s| !fits(s)));
            }
        }
    }

    /// Property: Swapping two instances never changes the occupied total.
    #[test]
    fn test_swap_conserves_sessions(
        ops in prop::collection::vec(any_op(), 1..40),
        a in any::<usize>(),
        b in any::<usize>(),
    ) {
        let mut m = replay(&ops);
        let occupied = m.state().occupied_count();
        let first = start_of(m.state(), a);
        let second = start_of(m.state(), b);
        if m.swap(first, second).is_ok() {
            prop_assert_eq!(m.state().occupied_count(), occupied);
            prop_assert!(m.state().validate().is_ok());
        }
    }
}
