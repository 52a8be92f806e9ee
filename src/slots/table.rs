//! The slot table: ground truth of what sits where.
//!
//! A table is a fixed-size sequence of slots. Each slot is empty or holds an
//! [`Occupancy`] record `(topic, offset)`. A topic instance of `n` sessions
//! occupies a contiguous [`SlotRange`] whose offsets read `0..n` in order.

use serde::{Deserialize, Serialize};

use crate::catalog::TopicKey;
use crate::error::{PlanError, PlanResult};

/// A contiguous range of slots [start, end] inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    /// Start of the slot range (inclusive).
    pub start: u16,
    /// End of the slot range (inclusive).
    pub end: u16,
}

impl SlotRange {
    /// Create a new slot range.
    ///
    /// # Panics
    /// Debug-only assertion checks that start <= end.
    pub fn new(start: u16, end: u16) -> Self {
        debug_assert!(start <= end, "start ({}) must be <= end ({})", start, end);
        Self { start, end }
    }

    /// Create a single-slot range.
    pub fn single(slot: u16) -> Self {
        Self {
            start: slot,
            end: slot,
        }
    }

    /// Range of `len` slots beginning at `start`.
    ///
    /// Returns `None` for an empty length or when the end would overflow.
    pub fn from_len(start: u16, len: u16) -> Option<Self> {
        let end = start.checked_add(len.checked_sub(1)?)?;
        Some(Self { start, end })
    }

    /// Get the number of slots in this range.
    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }

    /// Check if this range contains a specific slot.
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    pub fn overlaps(&self, other: &SlotRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Iterate over all slots in this range.
    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl std::fmt::Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// What a single occupied slot holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occupancy {
    pub topic: TopicKey,
    /// Position of this slot within its instance's run, starting at 0.
    pub offset: u16,
}

impl Occupancy {
    pub fn new(topic: TopicKey, offset: u16) -> Self {
        Self { topic, offset }
    }

    /// Whether this slot opens a run.
    pub fn is_run_start(&self) -> bool {
        self.offset == 0
    }
}

/// One placed topic instance as seen in the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub topic: TopicKey,
    pub range: SlotRange,
}

impl Run {
    pub fn start(&self) -> u16 {
        self.range.start
    }

    pub fn sessions(&self) -> u16 {
        self.range.count()
    }
}

/// Fixed-capacity table of optional occupancy records.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotTable {
    slots: Vec<Option<Occupancy>>,
}

impl SlotTable {
    /// Create an empty table with `capacity` slots.
    pub fn new(capacity: u16) -> Self {
        Self {
            slots: vec![None; usize::from(capacity)],
        }
    }

    pub fn capacity(&self) -> u16 {
        u16::try_from(self.slots.len()).unwrap_or(u16::MAX)
    }

    fn out_of_bounds(&self, index: usize) -> PlanError {
        PlanError::OutOfBounds {
            index,
            capacity: self.capacity(),
        }
    }

    /// Get the record at `index`, `None` when the slot is empty.
    pub fn get(&self, index: u16) -> PlanResult<Option<&Occupancy>> {
        self.slots
            .get(usize::from(index))
            .map(Option::as_ref)
            .ok_or_else(|| self.out_of_bounds(usize::from(index)))
    }

    pub fn set(&mut self, index: u16, occupancy: Occupancy) -> PlanResult<()> {
        let err = self.out_of_bounds(usize::from(index));
        let slot = self.slots.get_mut(usize::from(index)).ok_or(err)?;
        *slot = Some(occupancy);
        Ok(())
    }

    /// Empty the slot at `index`, returning what was there.
    pub fn clear(&mut self, index: u16) -> PlanResult<Option<Occupancy>> {
        let err = self.out_of_bounds(usize::from(index));
        let slot = self.slots.get_mut(usize::from(index)).ok_or(err)?;
        Ok(slot.take())
    }

    /// Check if a slot is empty. Out-of-range slots are never free.
    pub fn is_free(&self, index: u16) -> bool {
        matches!(self.slots.get(usize::from(index)), Some(None))
    }

    /// Check that every slot of `range` exists and is empty.
    pub fn range_is_free(&self, range: &SlotRange) -> bool {
        range.iter().all(|i| self.is_free(i))
    }

    /// Check that `range` lies inside the table.
    pub fn check_bounds(&self, range: &SlotRange) -> PlanResult<()> {
        if usize::from(range.end) >= self.slots.len() {
            return Err(self.out_of_bounds(usize::from(range.end)));
        }
        Ok(())
    }

    pub fn occupied_count(&self) -> u16 {
        let occupied = self.slots.iter().filter(|s| s.is_some()).count();
        u16::try_from(occupied).unwrap_or(u16::MAX)
    }

    pub fn free_count(&self) -> u16 {
        self.capacity() - self.occupied_count()
    }

    /// Lowest empty slot, if any.
    pub fn first_free(&self) -> Option<u16> {
        self.slots
            .iter()
            .position(Option::is_none)
            .and_then(|i| u16::try_from(i).ok())
    }

    /// Write offsets `0..n` for `topic` across `range`.
    pub fn write_run(&mut self, topic: &TopicKey, range: &SlotRange) -> PlanResult<()> {
        self.check_bounds(range)?;
        for (offset, index) in range.iter().enumerate() {
            let offset = u16::try_from(offset).unwrap_or(u16::MAX);
            self.set(index, Occupancy::new(topic.clone(), offset))?;
        }
        Ok(())
    }

    /// Empty every slot of `range`.
    pub fn clear_range(&mut self, range: &SlotRange) -> PlanResult<()> {
        self.check_bounds(range)?;
        for index in range.iter() {
            self.clear(index)?;
        }
        Ok(())
    }

    /// The run beginning at `start`, if a run starts there.
    pub fn run_at(&self, start: u16) -> Option<Run> {
        let first = self.slots.get(usize::from(start))?.as_ref()?;
        if !first.is_run_start() {
            return None;
        }
        let mut end = start;
        while let Some(Some(next)) = self.slots.get(usize::from(end) + 1) {
            if next.topic != first.topic || next.offset != end - start + 1 {
                break;
            }
            end += 1;
        }
        Some(Run {
            topic: first.topic.clone(),
            range: SlotRange::new(start, end),
        })
    }

    /// All runs in ascending start order.
    pub fn runs(&self) -> Vec<Run> {
        (0..self.capacity())
            .filter_map(|start| self.run_at(start))
            .collect()
    }

    /// Iterate over `(index, record)` for every slot.
    pub fn iter(&self) -> impl Iterator<Item = (u16, Option<&Occupancy>)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, s)| (u16::try_from(i).unwrap_or(u16::MAX), s.as_ref()))
    }

    /// Change the table size. Slots past the new end are dropped.
    pub(crate) fn set_capacity(&mut self, capacity: u16) {
        self.slots.resize(usize::from(capacity), None);
    }

    /// Verify that every occupied slot belongs to a well-formed run.
    ///
    /// Each record must either open a run (offset 0) or continue the record
    /// immediately before it (same topic, offset + 1).
    pub fn check_contiguity(&self) -> PlanResult<()> {
        let mut previous: Option<&Occupancy> = None;
        for (index, slot) in self.iter() {
            if let Some(current) = slot.filter(|c| !c.is_run_start()) {
                let continues = previous.is_some_and(|prev| {
                    prev.topic == current.topic && prev.offset + 1 == current.offset
                });
                if !continues {
                    return Err(PlanError::InvalidState(format!(
                        "slot {} holds offset {} of {} without the preceding session",
                        index, current.offset, current.topic
                    )));
                }
            }
            previous = slot;
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

    fn key(k: &str) -> TopicKey {
        TopicKey::new(k).unwrap()
    }

    #[test]
    fn test_slot_range_from_len() {
        assert_eq!(SlotRange::from_len(2, 3), Some(SlotRange::new(2, 4)));
        assert_eq!(SlotRange::from_len(0, 1), Some(SlotRange::single(0)));
        assert_eq!(SlotRange::from_len(0, 0), None);
        assert_eq!(SlotRange::from_len(u16::MAX, 2), None);
    }

    #[test]
    fn test_slot_range_count_and_contains() {
        let range = SlotRange::new(1, 3);
        assert_eq!(range.count(), 3);
        assert!(range.contains(1));
        assert!(range.contains(3));
        assert!(!range.contains(0));
        assert!(!range.contains(4));
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_slot_range_overlaps() {
        let a = SlotRange::new(0, 2);
        assert!(a.overlaps(&SlotRange::new(2, 4)));
        assert!(a.overlaps(&SlotRange::single(1)));
        assert!(!a.overlaps(&SlotRange::new(3, 4)));
    }

    #[test]
    fn test_slot_range_display() {
        assert_eq!(SlotRange::new(0, 1).to_string(), "0-1");
        assert_eq!(SlotRange::single(4).to_string(), "4");
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = SlotTable::new(5);
        assert_eq!(table.capacity(), 5);
        assert_eq!(table.occupied_count(), 0);
        assert_eq!(table.free_count(), 5);
        assert_eq!(table.first_free(), Some(0));
        assert!(table.runs().is_empty());
    }

    #[test]
    fn test_get_set_clear() {
        let mut table = SlotTable::new(3);
        table.set(1, Occupancy::new(key("fmod-basics"), 0)).unwrap();
        assert_eq!(table.get(1).unwrap().unwrap().topic, key("fmod-basics"));
        assert_eq!(table.get(0).unwrap(), None);
        assert_eq!(table.occupied_count(), 1);

        let cleared = table.clear(1).unwrap();
        assert!(cleared.is_some());
        assert_eq!(table.occupied_count(), 0);
        assert_eq!(table.clear(1).unwrap(), None);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut table = SlotTable::new(2);
        assert_eq!(
            table.get(2),
            Err(PlanError::OutOfBounds {
                index: 2,
                capacity: 2
            })
        );
        assert!(table.set(5, Occupancy::new(key("a"), 0)).is_err());
        assert!(table.clear(2).is_err());
        assert!(!table.is_free(2));
        assert!(table.write_run(&key("a"), &SlotRange::new(1, 2)).is_err());
        // Failed write leaves the table untouched
        assert_eq!(table.occupied_count(), 0);
    }

    #[test]
    fn test_write_run_offsets() {
        let mut table = SlotTable::new(5);
        table
            .write_run(&key("portfolio-film"), &SlotRange::new(1, 3))
            .unwrap();
        let offsets: Vec<Option<u16>> = table
            .iter()
            .map(|(_, s)| s.map(|o| o.offset))
            .collect();
        assert_eq!(offsets, vec![None, Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn test_runs_split_adjacent_instances_of_same_topic() {
        let mut table = SlotTable::new(4);
        let fb = key("feedback-session");
        table.write_run(&fb, &SlotRange::new(0, 1)).unwrap();
        table.write_run(&fb, &SlotRange::new(2, 3)).unwrap();

        let runs = table.runs();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].range, SlotRange::new(0, 1));
        assert_eq!(runs[1].range, SlotRange::new(2, 3));
        assert_eq!(runs[1].sessions(), 2);
    }

    #[test]
    fn test_run_at_requires_run_start() {
        let mut table = SlotTable::new(3);
        table.write_run(&key("a"), &SlotRange::new(0, 2)).unwrap();
        assert!(table.run_at(0).is_some());
        assert!(table.run_at(1).is_none());
        assert!(table.run_at(7).is_none());
    }

    #[test]
    fn test_check_contiguity_detects_orphan() {
        let mut table = SlotTable::new(3);
        table.write_run(&key("a"), &SlotRange::new(0, 1)).unwrap();
        table.check_contiguity().unwrap();

        table.clear(0).unwrap();
        assert!(matches!(
            table.check_contiguity(),
            Err(PlanError::InvalidState(_))
        ));
    }

    #[test]
    fn test_check_contiguity_detects_interleaving() {
        let mut table = SlotTable::new(3);
        table.set(0, Occupancy::new(key("a"), 0)).unwrap();
        table.set(1, Occupancy::new(key("b"), 1)).unwrap();
        assert!(table.check_contiguity().is_err());
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let mut table = SlotTable::new(2);
        table.write_run(&key("a"), &SlotRange::single(1)).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"[null,{"topic":"a","offset":0}]"#);
        let back: SlotTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
