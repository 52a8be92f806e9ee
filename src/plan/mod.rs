//! Session plan engine.
//!
//! ## Module Structure
//!
//! - [`state`]: `PlanState` and its pure transitions
//! - [`change`]: `PlanChange` describing what a transition did
//! - [`manager`]: `PlanManager`, the stateful session wrapper
//! - [`view`]: Presentation projections, usage and pricing
//! - [`snapshot`]: Snapshots and snapshot stores

pub mod change;
pub mod manager;
pub mod snapshot;
pub mod state;
pub mod view;

pub use change::{CapacityChange, PlanChange, SlotEvent};
pub use manager::{AddOutcome, PlanManager, ToggleOutcome};
pub use snapshot::{
    FileSnapshotStore, MemorySnapshotStore, PlanSnapshot, SNAPSHOT_VERSION, SnapshotStore,
    StoreError,
};
pub use state::{PlanState, RosterEntry, Transition};
pub use view::{PlanView, Price, RosterView, SlotOccupancy, SlotView, Usage, price_minor};
