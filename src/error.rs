//! Error types for the plan engine.
//!
//! Every engine operation returns one of these as a structured value. A
//! failed operation never leaves a partially mutated plan behind.

use thiserror::Error;

use crate::catalog::TopicKey;
use crate::slots::SlotRange;

/// Error type for plan operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A non-repeatable topic is already in the plan
    #[error("Topic {key} is already in the plan")]
    DuplicateTopic { key: TopicKey },

    /// Not enough free sessions in total
    #[error("Topic {key} needs {required} sessions but only {available} are free")]
    InsufficientCapacity {
        key: TopicKey,
        required: u16,
        available: u16,
    },

    /// Enough free sessions, but no contiguous run even after compaction
    #[error(
        "Topic {key} needs {required} contiguous sessions; {free} are free but the largest run is {largest_run}"
    )]
    InsufficientContiguousCapacity {
        key: TopicKey,
        required: u16,
        free: u16,
        largest_run: u16,
    },

    /// Destination run overlaps another instance
    #[error("Slots {range} are not free")]
    TargetOccupied { range: SlotRange },

    /// Slot index outside the table
    #[error("Slot {index} is outside the plan capacity of {capacity}")]
    OutOfBounds { index: usize, capacity: u16 },

    /// Pathway needs more sessions than the current capacity
    #[error("Pathway {pathway:?} needs {required} sessions but the plan holds {capacity}")]
    PathwayExceedsCapacity {
        pathway: String,
        required: u32,
        capacity: u16,
    },

    #[error("Unknown topic: {key}")]
    UnknownTopic { key: TopicKey },

    #[error("Unknown pathway: {name:?}")]
    UnknownPathway { name: String },

    #[error("No {sessions}-session pack is offered")]
    UnknownSessionPack { sessions: u16 },

    /// No instance starts at the given slot
    #[error("No topic instance starts at slot {start}")]
    InstanceNotFound { start: u16 },

    #[error("Cannot swap the instance at slot {start} with itself")]
    SameInstance { start: u16 },

    #[error("Instance is already at slot {start}")]
    UnchangedPosition { start: u16 },

    #[error("No add is waiting for confirmation")]
    NoPendingConfirmation,

    /// Shrinking the plan would drop placed sessions
    #[error("Cannot shrink plan to {requested} slots while {occupied} are occupied")]
    CapacityBelowOccupied { occupied: u16, requested: u16 },

    /// Plan state violates the contiguity or roster invariants
    #[error("Invalid plan state: {0}")]
    InvalidState(String),
}

impl PlanError {
    /// Stable machine-readable error code
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::DuplicateTopic { .. } => "duplicate_topic",
            PlanError::InsufficientCapacity { .. } => "insufficient_capacity",
            PlanError::InsufficientContiguousCapacity { .. } => {
                "insufficient_contiguous_capacity"
            }
            PlanError::TargetOccupied { .. } => "target_occupied",
            PlanError::OutOfBounds { .. } => "out_of_bounds",
            PlanError::PathwayExceedsCapacity { .. } => "pathway_exceeds_capacity",
            PlanError::UnknownTopic { .. } => "unknown_topic",
            PlanError::UnknownPathway { .. } => "unknown_pathway",
            PlanError::UnknownSessionPack { .. } => "unknown_session_pack",
            PlanError::InstanceNotFound { .. } => "instance_not_found",
            PlanError::SameInstance { .. } => "same_instance",
            PlanError::UnchangedPosition { .. } => "unchanged_position",
            PlanError::NoPendingConfirmation => "no_pending_confirmation",
            PlanError::CapacityBelowOccupied { .. } => "capacity_below_occupied",
            PlanError::InvalidState(_) => "invalid_state",
        }
    }

    /// Check if this error means the plan is too small for the request
    pub fn is_capacity_error(&self) -> bool {
        matches!(
            self,
            PlanError::InsufficientCapacity { .. }
                | PlanError::InsufficientContiguousCapacity { .. }
                | PlanError::PathwayExceedsCapacity { .. }
                | PlanError::CapacityBelowOccupied { .. }
        )
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PlanError::UnknownTopic { .. }
                | PlanError::UnknownPathway { .. }
                | PlanError::UnknownSessionPack { .. }
                | PlanError::InstanceNotFound { .. }
        )
    }

    /// How many more free sessions the request would need, when known
    pub fn sessions_short(&self) -> Option<u32> {
        match self {
            PlanError::InsufficientCapacity {
                required,
                available,
                ..
            } => Some(u32::from(required.saturating_sub(*available))),
            PlanError::PathwayExceedsCapacity {
                required, capacity, ..
            } => Some(required.saturating_sub(u32::from(*capacity))),
            PlanError::CapacityBelowOccupied {
                occupied,
                requested,
            } => Some(u32::from(occupied.saturating_sub(*requested))),
            _ => None,
        }
    }

    /// HTTP status the service layer reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            e if e.is_not_found() => 404,
            PlanError::DuplicateTopic { .. }
            | PlanError::TargetOccupied { .. }
            | PlanError::NoPendingConfirmation => 409,
            e if e.is_capacity_error() => 422,
            PlanError::InvalidState(_) => 500,
            _ => 400,
        }
    }
}

/// Result type alias for plan operations
pub type PlanResult<T> = std::result::Result<T, PlanError>;

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
    fn test_insufficient_capacity_reports_shortfall() {
        let err = PlanError::InsufficientCapacity {
            key: key("portfolio-film"),
            required: 3,
            available: 1,
        };
        assert_eq!(err.sessions_short(), Some(2));
        assert_eq!(
            err.to_string(),
            "Topic portfolio-film needs 3 sessions but only 1 are free"
        );
        assert!(err.is_capacity_error());
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_pathway_shortfall() {
        let err = PlanError::PathwayExceedsCapacity {
            pathway: "Film Portfolio".into(),
            required: 3,
            capacity: 1,
        };
        assert_eq!(err.sessions_short(), Some(2));
        assert_eq!(err.kind(), "pathway_exceeds_capacity");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PlanError::DuplicateTopic { key: key("a") }.status_code(),
            409
        );
        assert_eq!(
            PlanError::TargetOccupied {
                range: SlotRange::new(1, 2)
            }
            .status_code(),
            409
        );
        assert_eq!(PlanError::InstanceNotFound { start: 4 }.status_code(), 404);
        assert_eq!(
            PlanError::OutOfBounds {
                index: 9,
                capacity: 5
            }
            .status_code(),
            400
        );
        assert_eq!(PlanError::InvalidState("x".into()).status_code(), 500);
    }

    #[test]
    fn test_not_found_classification() {
        assert!(PlanError::UnknownPathway { name: "x".into() }.is_not_found());
        assert!(!PlanError::NoPendingConfirmation.is_not_found());
        assert_eq!(PlanError::NoPendingConfirmation.sessions_short(), None);
    }

    #[test]
    fn test_target_occupied_display_uses_range() {
        let err = PlanError::TargetOccupied {
            range: SlotRange::new(3, 4),
        };
        assert_eq!(err.to_string(), "Slots 3-4 are not free");
    }
}
