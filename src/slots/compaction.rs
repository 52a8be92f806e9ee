//! Defragmentation of the slot table.
//!
//! Compaction pulls every run toward slot 0, back to back, in the order the
//! runs already appear. Runs are relocated but never reordered. Planning
//! (what moves where) is separated from applying the plan, the same split the
//! allocation path uses.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::table::{Run, SlotRange, SlotTable};
use crate::catalog::TopicKey;
use crate::error::PlanResult;

/// One run relocated by compaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMove {
    pub topic: TopicKey,
    pub from: SlotRange,
    pub to: SlotRange,
}

/// Complete compaction plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionPlan {
    /// Runs that change position, in ascending original start order.
    pub moves: Vec<RunMove>,
    /// First free index once the plan is applied.
    pub free_start: u16,
}

impl CompactionPlan {
    /// Check if the table is already compact.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Total number of slots rewritten.
    pub fn slots_moved(&self) -> usize {
        self.moves.iter().map(|m| usize::from(m.to.count())).sum()
    }

    /// New start of the run that began at `old_start`.
    ///
    /// Runs not listed in the plan keep their position.
    pub fn relocated_start(&self, old_start: u16) -> u16 {
        self.moves
            .iter()
            .find(|m| m.from.start == old_start)
            .map_or(old_start, |m| m.to.start)
    }
}

/// Compute where every run lands after compaction.
///
/// This is pure computation over the current layout.
pub fn plan_compaction(table: &SlotTable) -> CompactionPlan {
    // Runs keep their relative order.
    let mut runs: Vec<Run> = table.runs();
    runs.sort_by_key(Run::start);

    let mut next: u16 = 0;
    let mut moves = Vec::new();
    for run in runs {
        let sessions = run.sessions();
        let target = SlotRange::new(next, next + sessions - 1);
        if target != run.range {
            moves.push(RunMove {
                topic: run.topic,
                from: run.range,
                to: target,
            });
        }
        next += sessions;
    }

    CompactionPlan {
        moves,
        free_start: next,
    }
}

/// Apply a plan computed for `table`.
///
/// All sources are cleared before any destination is written, so overlapping
/// source and destination ranges are safe.
pub fn apply_compaction(table: &mut SlotTable, plan: &CompactionPlan) -> PlanResult<()> {
    for m in &plan.moves {
        table.clear_range(&m.from)?;
    }
    for m in &plan.moves {
        debug!(topic = %m.topic, from = %m.from, to = %m.to, "compacting run");
        table.write_run(&m.topic, &m.to)?;
    }
    Ok(())
}

/// Compact `table` in place and return the applied plan.
///
/// `plan.free_start` is the first free index afterwards, so a failed
/// first-fit search can be retried immediately.
pub fn compact(table: &mut SlotTable) -> PlanResult<CompactionPlan> {
    let plan = plan_compaction(table);
    apply_compaction(table, &plan)?;
    Ok(plan)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::get_unwrap
)]
mod tests {
    use super::*;

    fn key(k: &str) -> TopicKey {
        TopicKey::new(k).unwrap()
    }

    fn layout(table: &SlotTable) -> String {
        table
            .iter()
            .map(|(_, s)| match s {
                None => '.',
                Some(o) => o.topic.as_str().chars().next().unwrap_or('?'),
            })
            .collect()
    }

    #[test]
    fn test_compact_empty_table() {
        let mut table = SlotTable::new(4);
        let plan = compact(&mut table).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.free_start, 0);
    }

    #[test]
    fn test_compact_already_compact_is_noop() {
        let mut table = SlotTable::new(5);
        table.write_run(&key("a"), &SlotRange::new(0, 1)).unwrap();
        table.write_run(&key("b"), &SlotRange::single(2)).unwrap();
        let before = table.clone();

        let plan = compact(&mut table).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.free_start, 3);
        assert_eq!(table, before);
    }

    #[test]
    fn test_compact_pulls_runs_left_in_order() {
        let mut table = SlotTable::new(8);
        table.write_run(&key("a"), &SlotRange::new(1, 2)).unwrap();
        table.write_run(&key("b"), &SlotRange::single(4)).unwrap();
        table.write_run(&key("c"), &SlotRange::new(6, 7)).unwrap();
        assert_eq!(layout(&table), ".aa.b.cc");

        let plan = compact(&mut table).unwrap();
        assert_eq!(layout(&table), "aabcc...");
        assert_eq!(plan.free_start, 5);
        assert_eq!(plan.moves.len(), 3);
        assert_eq!(plan.slots_moved(), 5);
        table.check_contiguity().unwrap();
    }

    #[test]
    fn test_compact_handles_overlapping_source_and_target() {
        // "a" moves from 1-3 to 0-2: ranges overlap
        let mut table = SlotTable::new(4);
        table.write_run(&key("a"), &SlotRange::new(1, 3)).unwrap();
        compact(&mut table).unwrap();

        let offsets: Vec<Option<u16>> = table.iter().map(|(_, s)| s.map(|o| o.offset)).collect();
        assert_eq!(offsets, vec![Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn test_compact_keeps_adjacent_same_topic_runs_apart() {
        let fb = key("feedback-session");
        let mut table = SlotTable::new(6);
        table.write_run(&fb, &SlotRange::single(1)).unwrap();
        table.write_run(&fb, &SlotRange::new(3, 4)).unwrap();

        compact(&mut table).unwrap();
        let runs = table.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].range, SlotRange::single(0));
        assert_eq!(runs[1].range, SlotRange::new(1, 2));
    }

    #[test]
    fn test_compact_is_idempotent() {
        let mut table = SlotTable::new(6);
        table.write_run(&key("a"), &SlotRange::single(2)).unwrap();
        table.write_run(&key("b"), &SlotRange::new(4, 5)).unwrap();

        compact(&mut table).unwrap();
        let once = table.clone();
        let second = compact(&mut table).unwrap();
        assert!(second.is_empty());
        assert_eq!(table, once);
    }

    #[test]
    fn test_relocated_start() {
        let mut table = SlotTable::new(5);
        table.write_run(&key("a"), &SlotRange::single(0)).unwrap();
        table.write_run(&key("b"), &SlotRange::single(3)).unwrap();
        let plan = plan_compaction(&table);
        assert_eq!(plan.relocated_start(0), 0);
        assert_eq!(plan.relocated_start(3), 1);
    }
}
