//! Plan manager: one user's plan session.
//!
//! The manager owns the current [`PlanState`] together with the catalog it
//! resolves topic keys against, the selected session pack and the last
//! applied pathway. Operations delegate to the pure transitions on
//! `PlanState` and only replace the stored state when a transition succeeds.
//!
//! Adding a repeatable topic that is already present is a two-phase
//! operation: [`PlanManager::propose_add`] parks the request and reports
//! [`AddOutcome::NeedsConfirmation`], then [`PlanManager::confirm_add`] or
//! [`PlanManager::cancel_add`] resolves it. Any other mutation discards a
//! parked request.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::change::PlanChange;
use super::snapshot::PlanSnapshot;
use super::state::{PlanState, Transition};
use super::view::PlanView;
use crate::catalog::{Catalog, SessionPack, Topic, TopicKey};
use crate::error::{PlanError, PlanResult};

/// Result of proposing an add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddOutcome {
    /// The topic was placed.
    Committed { change: PlanChange },
    /// A repeatable topic is already present; confirm or cancel to continue.
    NeedsConfirmation { key: TopicKey, existing: usize },
}

/// Result of toggling a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Removed { change: PlanChange },
    Proposed { outcome: AddOutcome },
}

fn rejected(operation: &'static str, err: PlanError) -> PlanError {
    warn!(operation, kind = err.kind(), error = %err, "operation rejected");
    err
}

#[derive(Debug, Clone)]
pub struct PlanManager {
    catalog: Catalog,
    state: PlanState,
    pack: SessionPack,
    unit_price_minor: u64,
    pathway: Option<String>,
    pending: Option<TopicKey>,
}

impl PlanManager {
    /// Start an empty plan sized to `pack`.
    pub fn new(catalog: Catalog, pack: SessionPack) -> Self {
        Self {
            catalog,
            state: PlanState::empty(pack.sessions),
            pack,
            unit_price_minor: 0,
            pathway: None,
            pending: None,
        }
    }

    /// Start an empty plan sized to the catalog's smallest pack.
    pub fn with_default_pack(catalog: Catalog) -> PlanResult<Self> {
        let pack = catalog
            .default_pack()
            .ok_or_else(|| PlanError::InvalidState("catalog offers no session packs".into()))?;
        Ok(Self::new(catalog, pack))
    }

    /// Set the per-session price used in [`PlanView`].
    pub fn with_unit_price(mut self, unit_price_minor: u64) -> Self {
        self.unit_price_minor = unit_price_minor;
        self
    }

    /// Rebuild a plan from a snapshot.
    ///
    /// The snapshot must satisfy every plan invariant and only reference
    /// topics and packs the catalog offers. Session counts and the
    /// repeatable flag must agree with the catalog; the pack discount is
    /// taken from the catalog.
    pub fn restore(catalog: Catalog, snapshot: PlanSnapshot) -> PlanResult<Self> {
        let PlanSnapshot {
            pathway,
            pack: saved_pack,
            capacity,
            state,
            ..
        } = snapshot;
        state.validate()?;
        let pack = catalog
            .session_pack(saved_pack.sessions)
            .ok_or(PlanError::UnknownSessionPack {
                sessions: saved_pack.sessions,
            })?;
        if pack != saved_pack {
            debug!(
                sessions = pack.sessions,
                saved_discount = saved_pack.discount_percent,
                discount = pack.discount_percent,
                "session pack discount changed since snapshot"
            );
        }
        if state.capacity() != capacity || pack.sessions != capacity {
            return Err(PlanError::InvalidState(format!(
                "snapshot capacity {} does not match table size {} and pack of {}",
                capacity,
                state.capacity(),
                pack.sessions
            )));
        }
        for entry in state.roster() {
            let topic = catalog.topic(&entry.topic).ok_or_else(|| PlanError::UnknownTopic {
                key: entry.topic.clone(),
            })?;
            if topic.sessions_required != entry.sessions {
                return Err(PlanError::InvalidState(format!(
                    "{} needs {} sessions but snapshot placed {}",
                    entry.topic, topic.sessions_required, entry.sessions
                )));
            }
            // Pathways may commit a repeatable topic as single, never the reverse.
            if entry.repeatable && !topic.is_repeatable() {
                return Err(PlanError::InvalidState(format!(
                    "{} at slot {} is marked repeatable but the catalog does not allow repeats",
                    entry.topic, entry.start
                )));
            }
        }
        info!(
            capacity,
            instances = state.roster().len(),
            "restored plan from snapshot"
        );
        Ok(Self {
            catalog,
            state,
            pack,
            unit_price_minor: 0,
            pathway,
            pending: None,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn pack(&self) -> SessionPack {
        self.pack
    }

    pub fn pathway(&self) -> Option<&str> {
        self.pathway.as_deref()
    }

    /// Topic waiting for confirmation, if any.
    pub fn pending(&self) -> Option<&TopicKey> {
        self.pending.as_ref()
    }

    fn resolve(&self, key: &TopicKey) -> PlanResult<Topic> {
        self.catalog
            .topic(key)
            .cloned()
            .ok_or_else(|| PlanError::UnknownTopic { key: key.clone() })
    }

    fn commit(&mut self, transition: Transition) -> PlanChange {
        self.state = transition.state;
        transition.change
    }

    fn place(&mut self, topic: &Topic) -> PlanResult<PlanChange> {
        let transition = self.state.add(topic).map_err(|e| rejected("add", e))?;
        let change = self.commit(transition);
        info!(
            topic = %topic.key,
            sessions = topic.sessions_required,
            compacted = change.compacted(),
            occupied = self.state.occupied_count(),
            "placed topic"
        );
        Ok(change)
    }

    /// Add one instance of `key`, or park the request if it needs confirming.
    pub fn propose_add(&mut self, key: &TopicKey) -> PlanResult<AddOutcome> {
        self.pending = None;
        let topic = self.resolve(key).map_err(|e| rejected("add", e))?;

        if topic.is_repeatable() && self.state.contains(key) {
            let existing = self.state.instances_of(key).count();
            debug!(topic = %key, existing, "repeatable topic already present, asking");
            self.pending = Some(key.clone());
            return Ok(AddOutcome::NeedsConfirmation {
                key: key.clone(),
                existing,
            });
        }

        let change = self.place(&topic)?;
        Ok(AddOutcome::Committed { change })
    }

    /// Complete a parked add.
    ///
    /// The request is consumed whether or not the placement succeeds.
    pub fn confirm_add(&mut self) -> PlanResult<PlanChange> {
        let key = self
            .pending
            .take()
            .ok_or_else(|| rejected("confirm", PlanError::NoPendingConfirmation))?;
        let topic = self.resolve(&key).map_err(|e| rejected("confirm", e))?;
        self.place(&topic)
    }

    /// Drop a parked add, returning the topic it was for.
    pub fn cancel_add(&mut self) -> PlanResult<TopicKey> {
        let key = self
            .pending
            .take()
            .ok_or_else(|| rejected("cancel", PlanError::NoPendingConfirmation))?;
        debug!(topic = %key, "add cancelled");
        Ok(key)
    }

    /// Remove a present non-repeatable topic, otherwise propose adding it.
    pub fn toggle(&mut self, key: &TopicKey) -> PlanResult<ToggleOutcome> {
        let topic = self.resolve(key).map_err(|e| rejected("toggle", e))?;
        let sole = if topic.is_repeatable() {
            None
        } else {
            self.state.instances_of(key).next().map(|e| e.start)
        };
        match sole {
            Some(start) => Ok(ToggleOutcome::Removed {
                change: self.remove(start)?,
            }),
            None => Ok(ToggleOutcome::Proposed {
                outcome: self.propose_add(key)?,
            }),
        }
    }

    /// Remove the instance whose run starts at `start`.
    pub fn remove(&mut self, start: u16) -> PlanResult<PlanChange> {
        self.pending = None;
        let transition = self.state.remove(start).map_err(|e| rejected("remove", e))?;
        let change = self.commit(transition);
        info!(start, occupied = self.state.occupied_count(), "removed topic");
        Ok(change)
    }

    pub fn move_instance(&mut self, start: u16, to: u16) -> PlanResult<PlanChange> {
        self.pending = None;
        let transition = self
            .state
            .move_instance(start, to)
            .map_err(|e| rejected("move", e))?;
        let change = self.commit(transition);
        info!(from = start, to, "moved topic");
        Ok(change)
    }

    pub fn swap(&mut self, a: u16, b: u16) -> PlanResult<PlanChange> {
        self.pending = None;
        let transition = self.state.swap(a, b).map_err(|e| rejected("swap", e))?;
        let change = self.commit(transition);
        info!(a, b, moved = change.events.len(), "swapped topics");
        Ok(change)
    }

    /// Replace the plan with the topics of the named pathway.
    pub fn apply_pathway(&mut self, name: &str) -> PlanResult<PlanChange> {
        self.pending = None;
        let pathway = self
            .catalog
            .pathway(name)
            .ok_or_else(|| {
                rejected(
                    "pathway",
                    PlanError::UnknownPathway {
                        name: name.to_string(),
                    },
                )
            })?
            .clone();
        let topics = pathway
            .topics
            .iter()
            .map(|key| self.resolve(key))
            .collect::<PlanResult<Vec<_>>>()
            .map_err(|e| rejected("pathway", e))?;

        let transition = self
            .state
            .apply_pathway(&pathway.name, &topics)
            .map_err(|e| rejected("pathway", e))?;
        let change = self.commit(transition);
        self.pathway = Some(pathway.name);
        info!(
            pathway = name,
            instances = self.state.roster().len(),
            occupied = self.state.occupied_count(),
            "applied pathway"
        );
        Ok(change)
    }

    /// Switch to the pack offering `sessions` slots, resizing the plan.
    pub fn select_pack(&mut self, sessions: u16) -> PlanResult<PlanChange> {
        self.pending = None;
        let pack = self
            .catalog
            .session_pack(sessions)
            .ok_or_else(|| rejected("pack", PlanError::UnknownSessionPack { sessions }))?;
        let transition = self
            .state
            .resize(pack.sessions)
            .map_err(|e| rejected("pack", e))?;
        let change = self.commit(transition);
        self.pack = pack;
        info!(
            sessions,
            discount_percent = pack.discount_percent,
            compacted = change.compacted(),
            "selected session pack"
        );
        Ok(change)
    }

    /// Clear every instance and forget the applied pathway.
    pub fn reset(&mut self) -> PlanChange {
        self.pending = None;
        let transition = self.state.clear();
        self.pathway = None;
        info!(cleared = transition.change.events.len(), "reset plan");
        self.commit(transition)
    }

    pub fn view(&self) -> PlanView {
        PlanView::build(
            &self.state,
            &self.catalog,
            self.pack,
            self.unit_price_minor,
            self.pathway.as_deref(),
            self.pending.as_ref(),
        )
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot::new(self.state.clone(), self.pack, self.pathway.clone())
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

    fn manager(sessions: u16) -> PlanManager {
        let catalog = Catalog::builtin();
        let pack = catalog.session_pack(sessions).unwrap();
        PlanManager::new(catalog, pack)
    }

    #[test]
    fn test_propose_add_commits_new_topic() {
        let mut m = manager(5);
        let outcome = m.propose_add(&key("portfolio-film")).unwrap();
        assert!(matches!(outcome, AddOutcome::Committed { .. }));
        assert_eq!(m.state().occupied_count(), 2);
    }

    #[test]
    fn test_unknown_topic() {
        let mut m = manager(5);
        assert_eq!(
            m.propose_add(&key("no-such-topic")).unwrap_err(),
            PlanError::UnknownTopic {
                key: key("no-such-topic")
            }
        );
    }

    #[test]
    fn test_repeatable_needs_confirmation() {
        let mut m = manager(5);
        m.propose_add(&key("feedback-session")).unwrap();
        let outcome = m.propose_add(&key("feedback-session")).unwrap();
        assert_eq!(
            outcome,
            AddOutcome::NeedsConfirmation {
                key: key("feedback-session"),
                existing: 1
            }
        );
        assert_eq!(m.pending(), Some(&key("feedback-session")));
        assert_eq!(m.state().occupied_count(), 1);

        m.confirm_add().unwrap();
        assert_eq!(m.state().occupied_count(), 2);
        assert!(m.pending().is_none());
    }

    #[test]
    fn test_cancel_is_noop() {
        let mut m = manager(5);
        m.propose_add(&key("feedback-session")).unwrap();
        m.propose_add(&key("feedback-session")).unwrap();
        let before = m.state().clone();
        assert_eq!(m.cancel_add().unwrap(), key("feedback-session"));
        assert_eq!(m.state(), &before);
        assert_eq!(
            m.confirm_add().unwrap_err(),
            PlanError::NoPendingConfirmation
        );
    }

    #[test]
    fn test_other_mutation_discards_pending() {
        let mut m = manager(5);
        m.propose_add(&key("feedback-session")).unwrap();
        m.propose_add(&key("feedback-session")).unwrap();
        m.propose_add(&key("fmod-basics")).unwrap();
        assert!(m.pending().is_none());
    }

    #[test]
    fn test_toggle_removes_then_adds() {
        let mut m = manager(5);
        m.toggle(&key("spotting-a-film")).unwrap();
        assert!(m.state().contains(&key("spotting-a-film")));
        let outcome = m.toggle(&key("spotting-a-film")).unwrap();
        assert!(matches!(outcome, ToggleOutcome::Removed { .. }));
        assert!(m.state().is_empty());
    }

    #[test]
    fn test_apply_pathway_records_name() {
        let mut m = manager(5);
        m.apply_pathway("Film Portfolio").unwrap();
        assert_eq!(m.pathway(), Some("Film Portfolio"));
        assert_eq!(m.state().occupied_count(), 3);

        assert!(matches!(
            m.apply_pathway("Nope").unwrap_err(),
            PlanError::UnknownPathway { .. }
        ));
        assert_eq!(m.pathway(), Some("Film Portfolio"));
    }

    #[test]
    fn test_select_pack_resizes() {
        let mut m = manager(5);
        m.apply_pathway("Film Portfolio").unwrap();
        m.select_pack(10).unwrap();
        assert_eq!(m.state().capacity(), 10);
        assert_eq!(m.pack().discount_percent, 20);

        assert_eq!(
            m.select_pack(1).unwrap_err(),
            PlanError::CapacityBelowOccupied {
                occupied: 3,
                requested: 1
            }
        );
        assert_eq!(m.pack().sessions, 10);
        assert_eq!(
            m.select_pack(7).unwrap_err(),
            PlanError::UnknownSessionPack { sessions: 7 }
        );
    }

    #[test]
    fn test_reset_clears_pathway() {
        let mut m = manager(5);
        m.apply_pathway("Entrance Exam Prep").unwrap();
        let change = m.reset();
        assert_eq!(change.cleared().count(), 2);
        assert!(m.state().is_empty());
        assert!(m.pathway().is_none());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut m = manager(5);
        m.apply_pathway("Film Portfolio").unwrap();
        m.move_instance(0, 4).unwrap();
        let snapshot = m.snapshot();

        let restored = PlanManager::restore(Catalog::builtin(), snapshot).unwrap();
        assert_eq!(restored.state(), m.state());
        assert_eq!(restored.pathway(), Some("Film Portfolio"));
    }

    #[test]
    fn test_restore_rejects_pack_mismatch() {
        let m = manager(5);
        let mut snapshot = m.snapshot();
        snapshot.pack = SessionPack::new(10, 20);
        assert!(matches!(
            PlanManager::restore(Catalog::builtin(), snapshot),
            Err(PlanError::InvalidState(_))
        ));
    }

    #[test]
    fn test_restore_rejects_pack_no_longer_offered() {
        let m = manager(5);
        let snapshot = m.snapshot();
        let mut catalog = Catalog::builtin();
        catalog.session_packs.retain(|p| p.sessions != 5);
        assert_eq!(
            PlanManager::restore(catalog, snapshot).unwrap_err(),
            PlanError::UnknownSessionPack { sessions: 5 }
        );
    }

    #[test]
    fn test_restore_takes_discount_from_catalog() {
        let m = manager(5);
        let snapshot = m.snapshot();
        let mut catalog = Catalog::builtin();
        for pack in &mut catalog.session_packs {
            if pack.sessions == 5 {
                pack.discount_percent = 25;
            }
        }
        let restored = PlanManager::restore(catalog, snapshot).unwrap();
        assert_eq!(restored.pack(), SessionPack::new(5, 25));
    }

    #[test]
    fn test_view_uses_unit_price() {
        let m = manager(5).with_unit_price(5000);
        assert_eq!(m.view().price.total_minor, 22500);
    }
}
