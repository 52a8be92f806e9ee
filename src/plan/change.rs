//! Value-level description of what an operation changed.
//!
//! The engine decides the new plan first and then reports the transition as
//! data. Presentation layers replay these events to animate; nothing in the
//! engine depends on how (or whether) they are rendered.

use serde::{Deserialize, Serialize};

use crate::catalog::TopicKey;
use crate::slots::{CompactionPlan, SlotRange};

/// A single run-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotEvent {
    /// A new instance now occupies `range`.
    Placed { topic: TopicKey, range: SlotRange },
    /// An instance was released from `range`.
    Cleared { topic: TopicKey, range: SlotRange },
    /// An instance was relocated.
    Moved {
        topic: TopicKey,
        from: SlotRange,
        to: SlotRange,
    },
}

impl SlotEvent {
    pub fn topic(&self) -> &TopicKey {
        match self {
            SlotEvent::Placed { topic, .. }
            | SlotEvent::Cleared { topic, .. }
            | SlotEvent::Moved { topic, .. } => topic,
        }
    }
}

impl std::fmt::Display for SlotEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotEvent::Placed { topic, range } => write!(f, "placed {} at {}", topic, range),
            SlotEvent::Cleared { topic, range } => write!(f, "cleared {} from {}", topic, range),
            SlotEvent::Moved { topic, from, to } => {
                write!(f, "moved {} from {} to {}", topic, from, to)
            }
        }
    }
}

/// Capacity before and after a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityChange {
    pub from: u16,
    pub to: u16,
}

/// Everything one operation did to the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanChange {
    /// Run-level events in the order they were applied.
    pub events: Vec<SlotEvent>,
    /// Compaction performed as part of the operation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityChange>,
}

impl PlanChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the operation changed nothing.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.compaction.is_none() && self.capacity.is_none()
    }

    pub fn push(&mut self, event: SlotEvent) {
        self.events.push(event);
    }

    pub fn record_compaction(&mut self, plan: CompactionPlan) {
        self.compaction = Some(plan);
    }

    /// Check if compaction ran as part of this change.
    pub fn compacted(&self) -> bool {
        self.compaction.is_some()
    }

    /// Ranges of newly placed instances.
    pub fn placed(&self) -> impl Iterator<Item = (&TopicKey, &SlotRange)> {
        self.events.iter().filter_map(|e| match e {
            SlotEvent::Placed { topic, range } => Some((topic, range)),
            _ => None,
        })
    }

    /// Ranges of released instances.
    pub fn cleared(&self) -> impl Iterator<Item = (&TopicKey, &SlotRange)> {
        self.events.iter().filter_map(|e| match e {
            SlotEvent::Cleared { topic, range } => Some((topic, range)),
            _ => None,
        })
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
    fn test_empty_change() {
        let change = PlanChange::new();
        assert!(change.is_empty());
        assert!(!change.compacted());
    }

    #[test]
    fn test_placed_and_cleared_filters() {
        let mut change = PlanChange::new();
        change.push(SlotEvent::Cleared {
            topic: key("a"),
            range: SlotRange::single(0),
        });
        change.push(SlotEvent::Placed {
            topic: key("b"),
            range: SlotRange::new(0, 1),
        });
        assert_eq!(change.placed().count(), 1);
        assert_eq!(change.cleared().count(), 1);
        assert_eq!(change.placed().next().unwrap().0, &key("b"));
    }

    #[test]
    fn test_event_display() {
        let event = SlotEvent::Moved {
            topic: key("portfolio-film"),
            from: SlotRange::new(0, 1),
            to: SlotRange::new(3, 4),
        };
        assert_eq!(event.to_string(), "moved portfolio-film from 0-1 to 3-4");
        assert_eq!(event.topic(), &key("portfolio-film"));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SlotEvent::Placed {
            topic: key("fmod-basics"),
            range: SlotRange::single(2),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "placed");
        assert_eq!(json["range"]["start"], 2);
    }

    #[test]
    fn test_change_omits_absent_compaction() {
        let json = serde_json::to_value(PlanChange::new()).unwrap();
        assert!(json.get("compaction").is_none());
        assert!(json.get("capacity").is_none());
    }
}
