//! Plan state and its transitions.
//!
//! `PlanState` pairs the slot table with the roster of committed topic
//! instances. Every operation here is a pure function of the current state:
//! it works on a copy and returns a [`Transition`] holding the new state and
//! the [`PlanChange`] that produced it, or an error with the original state
//! untouched.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::change::{CapacityChange, PlanChange, SlotEvent};
use crate::catalog::{Topic, TopicKey};
use crate::error::{PlanError, PlanResult};
use crate::slots::{SlotRange, SlotTable, compact, find_run, largest_free_run};

/// One committed topic instance.
///
/// Instances are addressed by the start slot of their run, since a repeatable
/// topic key can appear more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub topic: TopicKey,
    pub sessions: u16,
    pub start: u16,
    /// Whether other instances of the same key may coexist with this one.
    #[serde(default)]
    pub repeatable: bool,
}

impl RosterEntry {
    /// The slots this instance occupies.
    pub fn range(&self) -> SlotRange {
        SlotRange::new(
            self.start,
            self.start.saturating_add(self.sessions.saturating_sub(1)),
        )
    }
}

/// Result of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: PlanState,
    pub change: PlanChange,
}

/// Roster plus slot table, kept mutually consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanState {
    roster: Vec<RosterEntry>,
    slots: SlotTable,
}

impl PlanState {
    /// Create an empty plan with `capacity` slots.
    pub fn empty(capacity: u16) -> Self {
        Self {
            roster: Vec::new(),
            slots: SlotTable::new(capacity),
        }
    }

    /// Rebuild a state from stored parts, checking every invariant.
    pub fn from_parts(roster: Vec<RosterEntry>, slots: SlotTable) -> PlanResult<Self> {
        let state = Self { roster, slots };
        state.validate()?;
        Ok(state)
    }

    pub fn capacity(&self) -> u16 {
        self.slots.capacity()
    }

    /// Instances in the order they were added or loaded.
    pub fn roster(&self) -> &[RosterEntry] {
        &self.roster
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn occupied_count(&self) -> u16 {
        self.slots.occupied_count()
    }

    pub fn free_count(&self) -> u16 {
        self.slots.free_count()
    }

    /// Lowest empty slot, if any.
    pub fn next_free(&self) -> Option<u16> {
        self.slots.first_free()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    /// Check if any instance of `key` is in the roster.
    pub fn contains(&self, key: &TopicKey) -> bool {
        self.roster.iter().any(|e| &e.topic == key)
    }

    pub fn instances_of<'a>(&'a self, key: &'a TopicKey) -> impl Iterator<Item = &'a RosterEntry> {
        self.roster.iter().filter(move |e| &e.topic == key)
    }

    /// The instance whose run starts at `start`.
    pub fn instance_at(&self, start: u16) -> Option<&RosterEntry> {
        self.roster.iter().find(|e| e.start == start)
    }

    fn entry_index(&self, start: u16) -> PlanResult<usize> {
        self.roster
            .iter()
            .position(|e| e.start == start)
            .ok_or(PlanError::InstanceNotFound { start })
    }

    fn entry(&self, index: usize) -> PlanResult<&RosterEntry> {
        self.roster
            .get(index)
            .ok_or_else(|| PlanError::InvalidState(format!("roster index {} vanished", index)))
    }

    fn entry_mut(&mut self, index: usize) -> PlanResult<&mut RosterEntry> {
        self.roster
            .get_mut(index)
            .ok_or_else(|| PlanError::InvalidState(format!("roster index {} vanished", index)))
    }

    /// Compact the table and carry roster starts along.
    fn compact_in_place(&mut self, change: &mut PlanChange) -> PlanResult<u16> {
        let plan = compact(&mut self.slots)?;
        for entry in &mut self.roster {
            entry.start = plan.relocated_start(entry.start);
        }
        debug!(
            moves = plan.moves.len(),
            free_start = plan.free_start,
            "compacted slot table"
        );
        let free_start = plan.free_start;
        change.record_compaction(plan);
        Ok(free_start)
    }

    /// Place one instance of `topic` at the first contiguous run that fits.
    ///
    /// Falls back to compaction when the free sessions suffice but are
    /// fragmented. Repeatable topics are accepted even when already present;
    /// asking the user first is the caller's job.
    pub fn add(&self, topic: &Topic) -> PlanResult<Transition> {
        let key = &topic.key;
        let required = topic.sessions_required;
        if !topic.is_repeatable() && self.contains(key) {
            return Err(PlanError::DuplicateTopic { key: key.clone() });
        }

        let mut next = self.clone();
        let mut change = PlanChange::new();

        let start = match find_run(&next.slots, required) {
            Some(start) => start,
            None => {
                let free = next.slots.free_count();
                if free < required {
                    return Err(PlanError::InsufficientCapacity {
                        key: key.clone(),
                        required,
                        available: free,
                    });
                }
                debug!(topic = %key, required, free, "no contiguous run, compacting");
                next.compact_in_place(&mut change)?;
                find_run(&next.slots, required).ok_or_else(|| {
                    PlanError::InsufficientContiguousCapacity {
                        key: key.clone(),
                        required,
                        free: next.slots.free_count(),
                        largest_run: largest_free_run(&next.slots),
                    }
                })?
            }
        };

        let range = SlotRange::from_len(start, required).ok_or(PlanError::OutOfBounds {
            index: usize::from(start) + usize::from(required),
            capacity: next.capacity(),
        })?;
        next.slots.write_run(key, &range)?;
        next.roster.push(RosterEntry {
            topic: key.clone(),
            sessions: required,
            start,
            repeatable: topic.is_repeatable(),
        });
        change.push(SlotEvent::Placed {
            topic: key.clone(),
            range,
        });

        Ok(Transition {
            state: next,
            change,
        })
    }

    /// Release the instance starting at `start`.
    ///
    /// Other instances of the same topic keep their slots.
    pub fn remove(&self, start: u16) -> PlanResult<Transition> {
        let index = self.entry_index(start)?;
        let mut next = self.clone();
        let entry = next.roster.remove(index);
        let range = entry.range();
        next.slots.clear_range(&range)?;

        let mut change = PlanChange::new();
        change.push(SlotEvent::Cleared {
            topic: entry.topic,
            range,
        });
        Ok(Transition {
            state: next,
            change,
        })
    }

    /// Relocate the instance at `start` so its run begins at `to`.
    ///
    /// The destination must lie inside the table and be empty apart from
    /// slots the instance itself is vacating.
    pub fn move_instance(&self, start: u16, to: u16) -> PlanResult<Transition> {
        let index = self.entry_index(start)?;
        if to == start {
            return Err(PlanError::UnchangedPosition { start });
        }
        let entry = self.entry(index)?;
        let source = entry.range();
        let target = SlotRange::from_len(to, entry.sessions).ok_or(PlanError::OutOfBounds {
            index: usize::from(to) + usize::from(entry.sessions) - 1,
            capacity: self.capacity(),
        })?;
        self.slots.check_bounds(&target)?;
        let blocked = target
            .iter()
            .any(|i| !source.contains(i) && !self.slots.is_free(i));
        if blocked {
            return Err(PlanError::TargetOccupied { range: target });
        }

        let topic = entry.topic.clone();
        let mut next = self.clone();
        next.slots.clear_range(&source)?;
        next.slots.write_run(&topic, &target)?;
        next.entry_mut(index)?.start = to;

        let mut change = PlanChange::new();
        change.push(SlotEvent::Moved {
            topic,
            from: source,
            to: target,
        });
        Ok(Transition {
            state: next,
            change,
        })
    }

    /// Exchange the positions of the instances starting at `a` and `b`.
    ///
    /// Each instance is written at the other's former start when both runs
    /// fit there without touching any slot but their own vacated ones.
    /// Otherwise the later instance moves to the earlier one's start, the
    /// earlier instance ends where the later one ended, and whatever lies
    /// between them shifts by the difference in length. Either way the
    /// occupied total is unchanged.
    pub fn swap(&self, a: u16, b: u16) -> PlanResult<Transition> {
        let index_a = self.entry_index(a)?;
        let index_b = self.entry_index(b)?;
        if index_a == index_b {
            return Err(PlanError::SameInstance { start: a });
        }
        if let Some(transition) = self.swap_starts(index_a, index_b)? {
            return Ok(transition);
        }
        debug!(a, b, "runs do not fit at each other's start, shifting span");

        let (first_idx, second_idx) = if a < b {
            (index_a, index_b)
        } else {
            (index_b, index_a)
        };
        let first = self.entry(first_idx)?.clone();
        let second = self.entry(second_idx)?.clone();
        let first_range = first.range();
        let second_range = second.range();
        let span = SlotRange::new(first_range.start, second_range.end);
        let shift = i32::from(second.sessions) - i32::from(first.sessions);

        let mut next = self.clone();
        next.slots.clear_range(&span)?;
        let mut change = PlanChange::new();

        let new_second = SlotRange::new(
            first_range.start,
            first_range.start + second.sessions - 1,
        );
        next.slots.write_run(&second.topic, &new_second)?;
        next.entry_mut(second_idx)?.start = new_second.start;
        change.push(SlotEvent::Moved {
            topic: second.topic.clone(),
            from: second_range,
            to: new_second,
        });

        let between: Vec<usize> = self
            .roster
            .iter()
            .enumerate()
            .filter(|(_, e)| e.start > first_range.end && e.start < second_range.start)
            .map(|(i, _)| i)
            .collect();
        for index in between {
            let entry = self.entry(index)?;
            let from = entry.range();
            let new_start = u16::try_from(i32::from(entry.start) + shift).map_err(|_| {
                PlanError::InvalidState(format!("swap shifted slot {} out of range", entry.start))
            })?;
            let to = SlotRange::new(new_start, new_start + entry.sessions - 1);
            next.slots.write_run(&entry.topic, &to)?;
            next.entry_mut(index)?.start = new_start;
            if from != to {
                change.push(SlotEvent::Moved {
                    topic: entry.topic.clone(),
                    from,
                    to,
                });
            }
        }

        let new_first = SlotRange::new(second_range.end + 1 - first.sessions, second_range.end);
        next.slots.write_run(&first.topic, &new_first)?;
        next.entry_mut(first_idx)?.start = new_first.start;
        change.push(SlotEvent::Moved {
            topic: first.topic.clone(),
            from: first_range,
            to: new_first,
        });

        Ok(Transition {
            state: next,
            change,
        })
    }

    /// Swap start slots outright, or `None` if either run would leave the
    /// table or land on a slot neither instance is vacating.
    fn swap_starts(&self, index_a: usize, index_b: usize) -> PlanResult<Option<Transition>> {
        let a = self.entry(index_a)?.clone();
        let b = self.entry(index_b)?.clone();
        let (a_from, b_from) = (a.range(), b.range());
        let (Some(a_to), Some(b_to)) = (
            SlotRange::from_len(b.start, a.sessions),
            SlotRange::from_len(a.start, b.sessions),
        ) else {
            return Ok(None);
        };

        let fits = |target: &SlotRange| {
            self.slots.check_bounds(target).is_ok()
                && target
                    .iter()
                    .all(|i| a_from.contains(i) || b_from.contains(i) || self.slots.is_free(i))
        };
        if a_to.overlaps(&b_to) || !fits(&a_to) || !fits(&b_to) {
            return Ok(None);
        }

        let mut next = self.clone();
        next.slots.clear_range(&a_from)?;
        next.slots.clear_range(&b_from)?;
        next.slots.write_run(&a.topic, &a_to)?;
        next.slots.write_run(&b.topic, &b_to)?;
        next.entry_mut(index_a)?.start = a_to.start;
        next.entry_mut(index_b)?.start = b_to.start;

        let mut change = PlanChange::new();
        change.push(SlotEvent::Moved {
            topic: a.topic,
            from: a_from,
            to: a_to,
        });
        change.push(SlotEvent::Moved {
            topic: b.topic,
            from: b_from,
            to: b_to,
        });
        Ok(Some(Transition {
            state: next,
            change,
        }))
    }

    /// Replace the whole plan with `topics` packed back to back from slot 0.
    ///
    /// Repeated keys collapse to their first occurrence and every instance is
    /// committed as non-repeatable. If the total does not fit, nothing
    /// changes.
    pub fn apply_pathway(&self, pathway: &str, topics: &[Topic]) -> PlanResult<Transition> {
        let mut seen = HashSet::new();
        let unique: Vec<&Topic> = topics.iter().filter(|t| seen.insert(&t.key)).collect();

        let required: u32 = unique
            .iter()
            .map(|t| u32::from(t.sessions_required))
            .sum();
        if required > u32::from(self.capacity()) {
            return Err(PlanError::PathwayExceedsCapacity {
                pathway: pathway.to_string(),
                required,
                capacity: self.capacity(),
            });
        }

        let mut change = PlanChange::new();
        for entry in &self.roster {
            change.push(SlotEvent::Cleared {
                topic: entry.topic.clone(),
                range: entry.range(),
            });
        }

        let mut next = Self::empty(self.capacity());
        let mut start: u16 = 0;
        for topic in unique {
            let range = SlotRange::from_len(start, topic.sessions_required).ok_or(
                PlanError::OutOfBounds {
                    index: usize::from(start),
                    capacity: self.capacity(),
                },
            )?;
            next.slots.write_run(&topic.key, &range)?;
            next.roster.push(RosterEntry {
                topic: topic.key.clone(),
                sessions: topic.sessions_required,
                start,
                repeatable: false,
            });
            change.push(SlotEvent::Placed {
                topic: topic.key.clone(),
                range,
            });
            start += topic.sessions_required;
        }

        Ok(Transition {
            state: next,
            change,
        })
    }

    /// Release every instance, keeping the capacity.
    pub fn clear(&self) -> Transition {
        let mut change = PlanChange::new();
        for entry in &self.roster {
            change.push(SlotEvent::Cleared {
                topic: entry.topic.clone(),
                range: entry.range(),
            });
        }
        Transition {
            state: Self::empty(self.capacity()),
            change,
        }
    }

    /// Change the number of slots.
    ///
    /// Growing appends empty slots. Shrinking is refused when more sessions
    /// are placed than the new size holds; otherwise the table is compacted
    /// first if any run reaches past the new end, then truncated.
    pub fn resize(&self, capacity: u16) -> PlanResult<Transition> {
        if capacity == 0 {
            return Err(PlanError::OutOfBounds {
                index: 0,
                capacity: 0,
            });
        }
        let old = self.capacity();
        let mut next = self.clone();
        let mut change = PlanChange::new();
        if capacity == old {
            return Ok(Transition {
                state: next,
                change,
            });
        }

        let occupied = self.occupied_count();
        if capacity < occupied {
            return Err(PlanError::CapacityBelowOccupied {
                occupied,
                requested: capacity,
            });
        }
        if capacity < old && self.roster.iter().any(|e| e.range().end >= capacity) {
            next.compact_in_place(&mut change)?;
        }
        next.slots.set_capacity(capacity);
        change.capacity = Some(CapacityChange {
            from: old,
            to: capacity,
        });

        Ok(Transition {
            state: next,
            change,
        })
    }

    /// Check the contiguity, roster and conservation invariants.
    pub fn validate(&self) -> PlanResult<()> {
        self.slots.check_contiguity()?;

        let mut runs: HashMap<u16, _> = self
            .slots
            .runs()
            .into_iter()
            .map(|r| (r.start(), r))
            .collect();
        for entry in &self.roster {
            if entry.sessions == 0 {
                return Err(PlanError::InvalidState(format!(
                    "instance of {} at slot {} has no sessions",
                    entry.topic, entry.start
                )));
            }
            let run = runs.remove(&entry.start).ok_or_else(|| {
                PlanError::InvalidState(format!(
                    "no run starts at slot {} for {}",
                    entry.start, entry.topic
                ))
            })?;
            if run.topic != entry.topic || run.sessions() != entry.sessions {
                return Err(PlanError::InvalidState(format!(
                    "slot {} holds {} x{} but roster expects {} x{}",
                    entry.start,
                    run.topic,
                    run.sessions(),
                    entry.topic,
                    entry.sessions
                )));
            }
        }
        if let Some(orphan) = runs.values().next() {
            return Err(PlanError::InvalidState(format!(
                "run of {} at {} is not in the roster",
                orphan.topic, orphan.range
            )));
        }

        let mut single = HashSet::new();
        for entry in self.roster.iter().filter(|e| !e.repeatable) {
            if !single.insert(&entry.topic) {
                return Err(PlanError::InvalidState(format!(
                    "non-repeatable topic {} appears twice",
                    entry.topic
                )));
            }
        }

        let placed: u32 = self.roster.iter().map(|e| u32::from(e.sessions)).sum();
        if placed != u32::from(self.occupied_count()) {
            return Err(PlanError::InvalidState(format!(
                "{} sessions in roster but {} slots occupied",
                placed,
                self.occupied_count()
            )));
        }
        Ok(())
    }
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

    fn topic(key: &str, sessions: u16) -> Topic {
        Topic {
            key: TopicKey::new(key).unwrap(),
            name: key.to_string(),
            kind: "Mini-course".into(),
            description: String::new(),
            sessions_required: sessions,
            tags: Vec::new(),
        }
    }

    fn feedback(sessions: u16) -> Topic {
        let mut t = topic("feedback-session", sessions);
        t.tags.push("Feedback".into());
        t
    }

    fn add(state: &PlanState, t: &Topic) -> PlanState {
        let next = state.add(t).unwrap().state;
        next.validate().unwrap();
        next
    }

    #[test]
    fn test_add_first_fit() {
        let state = PlanState::empty(5);
        let state = add(&state, &topic("a", 2));
        let state = add(&state, &topic("b", 1));
        assert_eq!(state.roster()[0].range(), SlotRange::new(0, 1));
        assert_eq!(state.roster()[1].range(), SlotRange::single(2));
        assert_eq!(state.occupied_count(), 3);
    }

    #[test]
    fn test_add_duplicate_rejected_and_state_unchanged() {
        let state = add(&PlanState::empty(5), &topic("a", 1));
        let err = state.add(&topic("a", 1)).unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateTopic {
                key: TopicKey::new("a").unwrap()
            }
        );
        assert_eq!(state.occupied_count(), 1);
    }

    #[test]
    fn test_add_insufficient_capacity() {
        let state = add(&PlanState::empty(2), &topic("a", 1));
        let err = state.add(&topic("b", 2)).unwrap_err();
        assert!(matches!(
            err,
            PlanError::InsufficientCapacity {
                required: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(err.sessions_short(), Some(1));
    }

    #[test]
    fn test_add_compacts_fragmented_table() {
        let state = add(&PlanState::empty(5), &topic("a", 2));
        let state = add(&state, &topic("b", 1));
        let state = state.remove(0).unwrap().state;

        let transition = state.add(&topic("c", 3)).unwrap();
        assert!(transition.change.compacted());
        let next = transition.state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(0).unwrap().topic.as_str(), "b");
        assert_eq!(next.instance_at(1).unwrap().range(), SlotRange::new(1, 3));
        assert_eq!(next.next_free(), Some(4));
    }

    #[test]
    fn test_repeatable_topic_may_repeat() {
        let state = add(&PlanState::empty(3), &feedback(1));
        let state = add(&state, &feedback(1));
        assert_eq!(
            state
                .instances_of(&TopicKey::new("feedback-session").unwrap())
                .count(),
            2
        );
    }

    #[test]
    fn test_remove_unknown_start() {
        let state = add(&PlanState::empty(3), &topic("a", 2));
        assert_eq!(
            state.remove(1).unwrap_err(),
            PlanError::InstanceNotFound { start: 1 }
        );
    }

    #[test]
    fn test_move_to_free_slots() {
        let state = add(&PlanState::empty(5), &topic("a", 2));
        let next = state.move_instance(0, 3).unwrap().state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(3).unwrap().range(), SlotRange::new(3, 4));
        assert!(next.slots().is_free(0));
    }

    #[test]
    fn test_move_may_overlap_own_run() {
        let state = add(&PlanState::empty(4), &topic("a", 3));
        let next = state.move_instance(0, 1).unwrap().state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(1).unwrap().range(), SlotRange::new(1, 3));
    }

    #[test]
    fn test_move_errors() {
        let state = add(&PlanState::empty(4), &topic("a", 2));
        let state = add(&state, &topic("b", 1));
        assert_eq!(
            state.move_instance(0, 0).unwrap_err(),
            PlanError::UnchangedPosition { start: 0 }
        );
        assert!(matches!(
            state.move_instance(0, 3).unwrap_err(),
            PlanError::OutOfBounds { index: 4, .. }
        ));
        assert_eq!(
            state.move_instance(0, 1).unwrap_err(),
            PlanError::TargetOccupied {
                range: SlotRange::new(1, 2)
            }
        );
    }

    #[test]
    fn test_swap_unequal_lengths() {
        let state = add(&PlanState::empty(4), &topic("a", 1));
        let state = add(&state, &topic("b", 2));
        let transition = state.swap(0, 1).unwrap();
        let next = transition.state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(0).unwrap().topic.as_str(), "b");
        assert_eq!(next.instance_at(2).unwrap().topic.as_str(), "a");
        assert_eq!(transition.change.events.len(), 2);
    }

    #[test]
    fn test_swap_exchanges_starts_when_runs_fit() {
        // b(0) a(3-4) -> a(0-1) b(3)
        let state = add(&PlanState::empty(5), &topic("b", 1));
        let state = add(&state, &topic("a", 2));
        let state = state.move_instance(1, 3).unwrap().state;

        let transition = state.swap(0, 3).unwrap();
        let next = transition.state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(0).unwrap().range(), SlotRange::new(0, 1));
        assert_eq!(next.instance_at(3).unwrap().topic.as_str(), "b");
        assert!(next.slots().is_free(2));
        assert!(next.slots().is_free(4));
        assert_eq!(transition.change.events.len(), 2);
    }

    #[test]
    fn test_swap_starts_past_middle_instance() {
        // a(0) c(1) b(2): equal lengths swap in place, c stays put
        let state = add(&PlanState::empty(3), &topic("a", 1));
        let state = add(&state, &topic("c", 1));
        let state = add(&state, &topic("b", 1));
        let transition = state.swap(0, 2).unwrap();
        assert_eq!(transition.state.instance_at(0).unwrap().topic.as_str(), "b");
        assert_eq!(transition.state.instance_at(1).unwrap().topic.as_str(), "c");
        assert_eq!(transition.state.instance_at(2).unwrap().topic.as_str(), "a");
        assert_eq!(transition.change.events.len(), 2);
    }

    #[test]
    fn test_swap_shifts_instances_between() {
        // a(0) c(1) b(2-3) -> b(0-1) c(2) a(3)
        let state = add(&PlanState::empty(5), &topic("a", 1));
        let state = add(&state, &topic("c", 1));
        let state = add(&state, &topic("b", 2));
        let next = state.swap(2, 0).unwrap().state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(0).unwrap().topic.as_str(), "b");
        assert_eq!(next.instance_at(2).unwrap().topic.as_str(), "c");
        assert_eq!(next.instance_at(3).unwrap().topic.as_str(), "a");
        assert!(next.slots().is_free(4));
    }

    #[test]
    fn test_swap_same_instance() {
        let state = add(&PlanState::empty(2), &topic("a", 1));
        assert_eq!(
            state.swap(0, 0).unwrap_err(),
            PlanError::SameInstance { start: 0 }
        );
        assert_eq!(
            state.swap(0, 1).unwrap_err(),
            PlanError::InstanceNotFound { start: 1 }
        );
    }

    #[test]
    fn test_apply_pathway_packs_in_list_order() {
        let state = PlanState::empty(5);
        let next = state
            .apply_pathway("Mix", &[topic("b", 2), topic("a", 1)])
            .unwrap()
            .state;
        next.validate().unwrap();
        assert_eq!(next.instance_at(0).unwrap().topic.as_str(), "b");
        assert_eq!(next.instance_at(2).unwrap().topic.as_str(), "a");
    }

    #[test]
    fn test_apply_pathway_collapses_duplicates() {
        let state = PlanState::empty(5);
        let next = state
            .apply_pathway("Dup", &[feedback(1), feedback(1)])
            .unwrap()
            .state;
        assert_eq!(next.roster().len(), 1);
        assert!(!next.roster()[0].repeatable);
    }

    #[test]
    fn test_apply_pathway_too_large() {
        let state = add(&PlanState::empty(1), &topic("a", 1));
        let err = state
            .apply_pathway("Big", &[topic("b", 1), topic("c", 2)])
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::PathwayExceedsCapacity {
                pathway: "Big".into(),
                required: 3,
                capacity: 1
            }
        );
    }

    #[test]
    fn test_resize_grow_and_shrink() {
        let state = add(&PlanState::empty(5), &topic("a", 1));
        let state = state.move_instance(0, 4).unwrap().state;

        let grown = state.resize(8).unwrap();
        assert_eq!(grown.state.capacity(), 8);
        assert!(!grown.change.compacted());

        let shrunk = state.resize(2).unwrap();
        assert!(shrunk.change.compacted());
        assert_eq!(shrunk.state.capacity(), 2);
        assert_eq!(shrunk.state.instance_at(0).unwrap().topic.as_str(), "a");
        shrunk.state.validate().unwrap();
    }

    #[test]
    fn test_resize_truncates_without_compaction_when_possible() {
        let state = add(&PlanState::empty(5), &topic("a", 2));
        let shrunk = state.resize(3).unwrap();
        assert!(!shrunk.change.compacted());
        assert_eq!(
            shrunk.change.capacity,
            Some(CapacityChange { from: 5, to: 3 })
        );
    }

    #[test]
    fn test_resize_rejects_losing_sessions() {
        let state = add(&PlanState::empty(5), &topic("a", 3));
        assert_eq!(
            state.resize(2).unwrap_err(),
            PlanError::CapacityBelowOccupied {
                occupied: 3,
                requested: 2
            }
        );
        assert!(state.resize(0).is_err());
    }

    #[test]
    fn test_from_parts_rejects_mismatched_roster() {
        let mut slots = SlotTable::new(3);
        slots
            .write_run(&TopicKey::new("a").unwrap(), &SlotRange::new(0, 1))
            .unwrap();
        let roster = vec![RosterEntry {
            topic: TopicKey::new("a").unwrap(),
            sessions: 1,
            start: 0,
            repeatable: false,
        }];
        assert!(matches!(
            PlanState::from_parts(roster, slots.clone()),
            Err(PlanError::InvalidState(_))
        ));
        assert!(PlanState::from_parts(Vec::new(), slots).is_err());
    }
}
