//! Pure slot management logic for session plans.
//!
//! This module provides testable, pure functions over a fixed-size slot table.
//! It separates computing "where a run goes" from the plan bookkeeping that
//! decides whether it may go there at all.
//!
//! ## Module Structure
//!
//! - [`table`]: `SlotTable`, `Occupancy` records and `SlotRange`
//! - [`allocation`]: First-fit contiguous run search
//! - [`compaction`]: Order-preserving defragmentation with `CompactionPlan`

pub mod allocation;
pub mod compaction;
pub mod table;

// Re-export commonly used types
pub use allocation::{find_run, is_fragmented, largest_free_run};
pub use compaction::{CompactionPlan, RunMove, compact, plan_compaction};
pub use table::{Occupancy, Run, SlotRange, SlotTable};
