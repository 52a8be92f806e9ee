// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for session-planner.
//!
//! These tests exercise the public API of individual components in
//! isolation.

mod catalog_tests {
    use session_planner::catalog::{Catalog, CatalogError, TopicKey};

    #[test]
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin();
        catalog.validate().unwrap();
        assert_eq!(catalog.topics.len(), 4);
        assert_eq!(catalog.pathways.len(), 4);
        assert_eq!(catalog.default_pack().unwrap().sessions, 1);
    }

    #[test]
    fn test_only_feedback_is_repeatable() {
        let catalog = Catalog::builtin();
        let repeatable: Vec<&str> = catalog
            .topics
            .iter()
            .filter(|t| t.is_repeatable())
            .map(|t| t.key.as_str())
            .collect();
        assert_eq!(repeatable, vec!["feedback-session"]);
    }

    #[test]
    fn test_catalog_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_string(&Catalog::builtin()).unwrap()).unwrap();

        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(loaded, Catalog::builtin());
    }

    #[test]
    fn test_catalog_json_uses_type_field() {
        let json = r#"{
            "topics": [
                {"key": "orchestration", "name": "Orchestration", "type": "Mini-course", "sessions_required": 2}
            ],
            "session_packs": [{"sessions": 4}]
        }"#;
        let catalog = Catalog::from_json_str(json).unwrap();
        let topic = catalog
            .topic(&TopicKey::new("orchestration").unwrap())
            .unwrap();
        assert_eq!(topic.kind, "Mini-course");
        assert!(topic.tags.is_empty());
        assert_eq!(catalog.session_pack(4).unwrap().discount_percent, 0);
    }

    #[test]
    fn test_catalog_rejects_bad_pathway() {
        let json = r#"{
            "topics": [{"key": "a", "name": "A", "type": "x", "sessions_required": 1}],
            "pathways": [{"name": "P", "topics": ["missing"]}],
            "session_packs": [{"sessions": 1}]
        }"#;
        assert!(matches!(
            Catalog::from_json_str(json),
            Err(CatalogError::UnknownPathwayTopic { .. })
        ));
    }

    #[test]
    fn test_catalog_rejects_invalid_key() {
        let json = r#"{
            "topics": [{"key": "Bad Key", "name": "A", "type": "x", "sessions_required": 1}],
            "session_packs": [{"sessions": 1}]
        }"#;
        assert!(Catalog::from_json_str(json).is_err());
    }
}

mod error_tests {
    use session_planner::PlanError;
    use session_planner::catalog::TopicKey;
    use session_planner::slots::SlotRange;

    #[test]
    fn test_status_codes() {
        let key = TopicKey::new("a").unwrap();
        assert_eq!(PlanError::DuplicateTopic { key: key.clone() }.status_code(), 409);
        assert_eq!(PlanError::UnknownTopic { key: key.clone() }.status_code(), 404);
        assert_eq!(
            PlanError::InsufficientCapacity {
                key,
                required: 3,
                available: 1
            }
            .status_code(),
            422
        );
        assert_eq!(
            PlanError::TargetOccupied {
                range: SlotRange::new(1, 2)
            }
            .status_code(),
            409
        );
        assert_eq!(PlanError::SameInstance { start: 0 }.status_code(), 400);
        assert_eq!(PlanError::InvalidState("x".into()).status_code(), 500);
    }

    #[test]
    fn test_messages_carry_numbers() {
        let err = PlanError::InsufficientCapacity {
            key: TopicKey::new("portfolio-film").unwrap(),
            required: 2,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "Topic portfolio-film needs 2 sessions but only 1 are free"
        );
        assert_eq!(err.kind(), "insufficient_capacity");
    }
}

mod view_tests {
    use session_planner::catalog::{Catalog, TopicKey};
    use session_planner::plan::{PlanState, PlanView, price_minor};

    #[test]
    fn test_price_matches_pack_discounts() {
        let catalog = Catalog::builtin();
        let prices: Vec<u64> = catalog
            .session_packs
            .iter()
            .map(|p| price_minor(p.sessions, 5000, p.discount_percent))
            .collect();
        assert_eq!(prices, vec![5000, 22500, 40000, 70000]);
    }

    #[test]
    fn test_view_serializes_empty_slots_as_null() {
        let catalog = Catalog::builtin();
        let topic = catalog
            .topic(&TopicKey::new("fmod-basics").unwrap())
            .unwrap();
        let state = PlanState::empty(2).add(topic).unwrap().state;
        let pack = catalog.default_pack().unwrap();

        let view = PlanView::build(&state, &catalog, pack, 5000, None, None);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["slots"][0]["occupancy"]["name"], "FMOD Basics");
        assert!(json["slots"][1]["occupancy"].is_null());
        assert_eq!(json["roster"][0]["start"], 0);
    }
}

mod slot_tests {
    use session_planner::catalog::TopicKey;
    use session_planner::slots::{SlotRange, SlotTable, is_fragmented, largest_free_run};

    #[test]
    fn test_table_serializes_as_array() {
        let mut table = SlotTable::new(3);
        table
            .write_run(&TopicKey::new("a").unwrap(), &SlotRange::new(1, 2))
            .unwrap();
        let json = serde_json::to_value(&table).unwrap();
        assert!(json[0].is_null());
        assert_eq!(json[2]["topic"], "a");
        assert_eq!(json[2]["offset"], 1);
    }

    #[test]
    fn test_fragmentation_helpers() {
        let mut table = SlotTable::new(5);
        table
            .write_run(&TopicKey::new("a").unwrap(), &SlotRange::single(2))
            .unwrap();
        assert_eq!(largest_free_run(&table), 2);
        assert!(is_fragmented(&table));
    }
}
