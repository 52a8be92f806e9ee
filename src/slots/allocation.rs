//! First-fit contiguous allocation.
//!
//! All functions in this module are pure and side-effect free.

use super::table::{SlotRange, SlotTable};

/// Find the lowest start index with `sessions` consecutive empty slots.
///
/// Candidates are scanned from 0 to `capacity - sessions` inclusive. Returns
/// `None` when no run fits, even if the total free count would suffice; the
/// caller uses that distinction to decide whether compaction can help.
///
/// # Examples
///
/// ```
/// use session_planner::catalog::TopicKey;
/// use session_planner::slots::{SlotRange, SlotTable, find_run};
///
/// let mut table = SlotTable::new(5);
/// let key = TopicKey::new("spotting-a-film").unwrap();
/// table.write_run(&key, &SlotRange::single(1)).unwrap();
///
/// assert_eq!(find_run(&table, 1), Some(0));
/// assert_eq!(find_run(&table, 3), Some(2));
/// assert_eq!(find_run(&table, 4), None);
/// ```
pub fn find_run(table: &SlotTable, sessions: u16) -> Option<u16> {
    if sessions == 0 || sessions > table.capacity() {
        return None;
    }
    let last_start = table.capacity() - sessions;
    (0..=last_start).find(|&start| {
        SlotRange::from_len(start, sessions).is_some_and(|range| table.range_is_free(&range))
    })
}

/// Length of the longest run of empty slots.
pub fn largest_free_run(table: &SlotTable) -> u16 {
    let mut best = 0u16;
    let mut current = 0u16;
    for (_, slot) in table.iter() {
        if slot.is_none() {
            current += 1;
            best = best.max(current);
        } else {
            current = 0;
        }
    }
    best
}

/// Whether free space exists but is split across several gaps.
pub fn is_fragmented(table: &SlotTable) -> bool {
    largest_free_run(table) < table.free_count()
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
    use crate::catalog::TopicKey;

    fn key(k: &str) -> TopicKey {
        TopicKey::new(k).unwrap()
    }

    /// Build a table from a layout string: `.` is empty, a letter is a run slot.
    fn table_from(layout: &str) -> SlotTable {
        let mut table = SlotTable::new(layout.len() as u16);
        let bytes = layout.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'.' {
                i += 1;
                continue;
            }
            let start = i;
            while i < bytes.len() && bytes[i] == bytes[start] {
                i += 1;
            }
            let name = (bytes[start] as char).to_ascii_lowercase().to_string();
            table
                .write_run(
                    &key(&name),
                    &SlotRange::new(start as u16, (i - 1) as u16),
                )
                .unwrap();
        }
        table
    }

    #[test]
    fn test_find_run_empty_table() {
        let table = SlotTable::new(5);
        assert_eq!(find_run(&table, 1), Some(0));
        assert_eq!(find_run(&table, 5), Some(0));
        assert_eq!(find_run(&table, 6), None);
    }

    #[test]
    fn test_find_run_zero_sessions() {
        let table = SlotTable::new(5);
        assert_eq!(find_run(&table, 0), None);
    }

    #[test]
    fn test_find_run_is_first_fit_not_best_fit() {
        // Gaps of 3 (0-2) and 1 (4): a single session goes to the first gap
        let table = table_from("...a.");
        assert_eq!(find_run(&table, 1), Some(0));
    }

    #[test]
    fn test_find_run_skips_too_small_gaps() {
        let table = table_from(".a..b...");
        assert_eq!(find_run(&table, 2), Some(2));
        assert_eq!(find_run(&table, 3), Some(5));
        assert_eq!(find_run(&table, 4), None);
    }

    #[test]
    fn test_find_run_fragmented_returns_none() {
        let table = table_from("..b..");
        assert_eq!(table.free_count(), 4);
        assert_eq!(find_run(&table, 3), None);
        assert!(is_fragmented(&table));
    }

    #[test]
    fn test_find_run_full_table() {
        let table = table_from("aab");
        assert_eq!(find_run(&table, 1), None);
        assert!(!is_fragmented(&table));
    }

    #[test]
    fn test_largest_free_run() {
        assert_eq!(largest_free_run(&table_from(".....")), 5);
        assert_eq!(largest_free_run(&table_from("a..b...")), 3);
        assert_eq!(largest_free_run(&table_from("ab")), 0);
    }
}
