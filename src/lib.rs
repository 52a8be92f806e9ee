//! session-planner library crate
//!
//! A fixed-capacity session plan: topics from a catalog are placed as
//! contiguous runs of slots, first-fit, with order-preserving compaction when
//! free space is fragmented. The engine lives in [`plan`] and [`slots`]; the
//! rest wraps one plan session in a small JSON service.

pub mod catalog;
pub mod config;
pub mod error;
pub mod health;
pub mod plan;
pub mod server;
pub mod slots;

pub use catalog::{Catalog, Topic, TopicKey};
pub use error::{PlanError, PlanResult};
pub use health::HealthState;
pub use plan::{AddOutcome, PlanChange, PlanManager, PlanState};
pub use server::{AppState, create_router, run_server};
