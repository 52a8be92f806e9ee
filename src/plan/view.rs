//! Read-only projections of a plan for the presentation layer.

use serde::{Deserialize, Serialize};

use super::state::PlanState;
use crate::catalog::{Catalog, SessionPack, TopicKey};

/// What sits in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupancy {
    pub topic: TopicKey,
    pub name: String,
    /// Position of this slot within its run, starting at 0.
    pub offset: u16,
    pub total_sessions: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotView {
    pub index: u16,
    /// `None` for an empty slot.
    pub occupancy: Option<SlotOccupancy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterView {
    pub topic: TopicKey,
    pub name: String,
    pub start: u16,
    pub sessions: u16,
    pub repeatable: bool,
}

/// Aggregate slot usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub occupied: u16,
    pub capacity: u16,
    pub free: u16,
}

impl Usage {
    pub fn of(state: &PlanState) -> Self {
        Self {
            occupied: state.occupied_count(),
            capacity: state.capacity(),
            free: state.free_count(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.free == 0
    }
}

/// Price of the selected pack, in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub sessions: u16,
    pub unit_price_minor: u64,
    pub discount_percent: u8,
    pub total_minor: u64,
}

impl Price {
    pub fn for_pack(pack: SessionPack, unit_price_minor: u64) -> Self {
        Self {
            sessions: pack.sessions,
            unit_price_minor,
            discount_percent: pack.discount_percent,
            total_minor: price_minor(pack.sessions, unit_price_minor, pack.discount_percent),
        }
    }
}

/// `capacity * unit_price * (1 - discount)`, rounded down to a whole minor unit.
///
/// Discounts above 100% are treated as 100%.
pub fn price_minor(capacity: u16, unit_price_minor: u64, discount_percent: u8) -> u64 {
    let discount = u64::from(discount_percent.min(100));
    let gross = u64::from(capacity).saturating_mul(unit_price_minor);
    gross.saturating_mul(100 - discount) / 100
}

/// Everything a client needs to render the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanView {
    pub slots: Vec<SlotView>,
    pub roster: Vec<RosterView>,
    pub usage: Usage,
    pub price: Price,
    pub next_free: Option<u16>,
    pub pathway: Option<String>,
    /// Repeatable topic waiting for the user to confirm another instance.
    pub pending_confirmation: Option<TopicKey>,
}

impl PlanView {
    pub fn build(
        state: &PlanState,
        catalog: &Catalog,
        pack: SessionPack,
        unit_price_minor: u64,
        pathway: Option<&str>,
        pending: Option<&TopicKey>,
    ) -> Self {
        let name_of = |key: &TopicKey| {
            catalog
                .topic(key)
                .map_or_else(|| key.to_string(), |t| t.name.clone())
        };

        let mut slots: Vec<SlotView> = state
            .slots()
            .iter()
            .map(|(index, _)| SlotView {
                index,
                occupancy: None,
            })
            .collect();
        for entry in state.roster() {
            let name = name_of(&entry.topic);
            for (offset, index) in entry.range().iter().enumerate() {
                if let Some(slot) = slots.get_mut(usize::from(index)) {
                    slot.occupancy = Some(SlotOccupancy {
                        topic: entry.topic.clone(),
                        name: name.clone(),
                        offset: u16::try_from(offset).unwrap_or(u16::MAX),
                        total_sessions: entry.sessions,
                    });
                }
            }
        }

        let roster = state
            .roster()
            .iter()
            .map(|e| RosterView {
                topic: e.topic.clone(),
                name: name_of(&e.topic),
                start: e.start,
                sessions: e.sessions,
                repeatable: e.repeatable,
            })
            .collect();

        Self {
            slots,
            roster,
            usage: Usage::of(state),
            price: Price::for_pack(pack, unit_price_minor),
            next_free: state.next_free(),
            pathway: pathway.map(str::to_string),
            pending_confirmation: pending.cloned(),
        }
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

    #[test]
    fn test_price_minor() {
        assert_eq!(price_minor(1, 5000, 0), 5000);
        assert_eq!(price_minor(5, 5000, 10), 22500);
        assert_eq!(price_minor(20, 5000, 30), 70000);
        assert_eq!(price_minor(3, 333, 10), 899);
        assert_eq!(price_minor(4, 100, 150), 0);
    }

    #[test]
    fn test_view_reports_offsets_and_totals() {
        let catalog = Catalog::builtin();
        let film = catalog
            .topic(&TopicKey::new("portfolio-film").unwrap())
            .unwrap()
            .clone();
        let state = PlanState::empty(5).add(&film).unwrap().state;
        let pack = catalog.session_pack(5).unwrap();

        let view = PlanView::build(&state, &catalog, pack, 5000, None, None);
        assert_eq!(view.slots.len(), 5);
        let second = view.slots[1].occupancy.as_ref().unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(second.total_sessions, 2);
        assert_eq!(second.name, "Portfolio Assignment: Film");
        assert!(view.slots[2].occupancy.is_none());
        assert_eq!(
            view.usage,
            Usage {
                occupied: 2,
                capacity: 5,
                free: 3
            }
        );
        assert_eq!(view.price.total_minor, 22500);
        assert_eq!(view.next_free, Some(2));
    }
}
