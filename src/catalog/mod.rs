//! Read-only topic catalog, pathway presets and session packs.
//!
//! The catalog is loaded once at startup, either from the built-in course
//! builder data or from a JSON file, and validated before the plan engine
//! ever sees it.
//!
//! ## Module Structure
//!
//! - [`topic`]: `TopicKey` and `Topic`

pub mod topic;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use topic::{FEEDBACK_TAG, Topic, TopicKey};

/// Errors raised while loading or validating a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("invalid topic key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("duplicate topic key in catalog: {0}")]
    DuplicateKey(TopicKey),

    #[error("topic {0} must require at least one session")]
    ZeroSessions(TopicKey),

    #[error("pathway {pathway:?} references unknown topic {key}")]
    UnknownPathwayTopic { pathway: String, key: TopicKey },

    #[error("duplicate pathway name: {0:?}")]
    DuplicatePathway(String),

    #[error("invalid session pack: {0}")]
    InvalidPack(String),

    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A named preset: an ordered list of topics applied as a whole plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pathway {
    pub name: String,
    pub topics: Vec<TopicKey>,
}

/// A purchasable capacity option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPack {
    pub sessions: u16,
    /// Whole-percent discount applied to the pack price.
    #[serde(default)]
    pub discount_percent: u8,
}

impl SessionPack {
    pub const fn new(sessions: u16, discount_percent: u8) -> Self {
        Self {
            sessions,
            discount_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub pathways: Vec<Pathway>,
    pub session_packs: Vec<SessionPack>,
}

impl Catalog {
    /// The course builder's built-in catalog.
    pub fn builtin() -> Self {
        let topic = |key: &str, name: &str, kind: &str, description: &str, sessions, tags: &[&str]| {
            Topic {
                key: TopicKey(key.to_string()),
                name: name.to_string(),
                kind: kind.to_string(),
                description: description.to_string(),
                sessions_required: sessions,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            }
        };
        let key = |k: &str| TopicKey(k.to_string());

        Self {
            topics: vec![
                topic(
                    "spotting-a-film",
                    "Spotting a Film",
                    "Mini-course",
                    "Learn the 5 crucial decisions when spotting a film.",
                    1,
                    &["Film", "Technique"],
                ),
                topic(
                    "fmod-basics",
                    "FMOD Basics",
                    "Mini-course",
                    "Understand the essentials of FMOD for game music.",
                    1,
                    &["Game", "Tech"],
                ),
                topic(
                    "portfolio-film",
                    "Portfolio Assignment: Film",
                    "Assignment",
                    "Create a portfolio piece for film scoring. Requires 2 sessions.",
                    2,
                    &["Film", "Portfolio"],
                ),
                topic(
                    "feedback-session",
                    "Feedback Session",
                    "1:1 lesson",
                    "One-to-one review of your latest work.",
                    1,
                    &[FEEDBACK_TAG],
                ),
            ],
            pathways: vec![
                Pathway {
                    name: "Film Portfolio".into(),
                    topics: vec![key("spotting-a-film"), key("portfolio-film")],
                },
                Pathway {
                    name: "Game Portfolio".into(),
                    topics: vec![key("fmod-basics")],
                },
                Pathway {
                    name: "Game Music Essentials".into(),
                    topics: vec![key("fmod-basics")],
                },
                Pathway {
                    name: "Entrance Exam Prep".into(),
                    topics: vec![key("spotting-a-film"), key("fmod-basics")],
                },
            ],
            session_packs: vec![
                SessionPack::new(1, 0),
                SessionPack::new(5, 10),
                SessionPack::new(10, 20),
                SessionPack::new(20, 30),
            ],
        }
    }

    /// Parse and validate a catalog from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load and validate a catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        debug!(?path, "loading catalog from file");
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check keys, session counts, pathway references and packs.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut keys = HashSet::new();
        for topic in &self.topics {
            if !keys.insert(&topic.key) {
                return Err(CatalogError::DuplicateKey(topic.key.clone()));
            }
            if topic.sessions_required == 0 {
                return Err(CatalogError::ZeroSessions(topic.key.clone()));
            }
        }

        let mut names = HashSet::new();
        for pathway in &self.pathways {
            if !names.insert(pathway.name.as_str()) {
                return Err(CatalogError::DuplicatePathway(pathway.name.clone()));
            }
            if let Some(missing) = pathway.topics.iter().find(|k| !keys.contains(k)) {
                return Err(CatalogError::UnknownPathwayTopic {
                    pathway: pathway.name.clone(),
                    key: missing.clone(),
                });
            }
        }

        if self.session_packs.is_empty() {
            return Err(CatalogError::InvalidPack(
                "catalog must offer at least one session pack".into(),
            ));
        }
        let mut sizes = HashSet::new();
        for pack in &self.session_packs {
            if pack.sessions == 0 {
                return Err(CatalogError::InvalidPack(
                    "pack size must be at least one session".into(),
                ));
            }
            if pack.discount_percent > 100 {
                return Err(CatalogError::InvalidPack(format!(
                    "{}-session pack has discount above 100%",
                    pack.sessions
                )));
            }
            if !sizes.insert(pack.sessions) {
                return Err(CatalogError::InvalidPack(format!(
                    "duplicate {}-session pack",
                    pack.sessions
                )));
            }
        }

        Ok(())
    }

    pub fn topic(&self, key: &TopicKey) -> Option<&Topic> {
        self.topics.iter().find(|t| &t.key == key)
    }

    pub fn pathway(&self, name: &str) -> Option<&Pathway> {
        self.pathways.iter().find(|p| p.name == name)
    }

    pub fn session_pack(&self, sessions: u16) -> Option<SessionPack> {
        self.session_packs
            .iter()
            .copied()
            .find(|p| p.sessions == sessions)
    }

    /// The smallest pack, used when nothing else is configured.
    pub fn default_pack(&self) -> Option<SessionPack> {
        self.session_packs.iter().copied().min_by_key(|p| p.sessions)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
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
    fn test_builtin_catalog_is_valid() {
        let catalog = Catalog::builtin();
        catalog.validate().unwrap();
        assert_eq!(catalog.topics.len(), 4);
        assert_eq!(catalog.pathways.len(), 4);
        assert_eq!(catalog.session_packs.len(), 4);
    }

    #[test]
    fn test_builtin_feedback_topic_is_the_only_repeatable() {
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
    fn test_lookup_helpers() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.topic(&key("portfolio-film")).unwrap().sessions_required,
            2
        );
        assert!(catalog.topic(&key("missing")).is_none());
        assert_eq!(catalog.pathway("Film Portfolio").unwrap().topics.len(), 2);
        assert!(catalog.pathway("film portfolio").is_none());
        assert_eq!(catalog.session_pack(10), Some(SessionPack::new(10, 20)));
        assert_eq!(catalog.session_pack(7), None);
        assert_eq!(catalog.default_pack(), Some(SessionPack::new(1, 0)));
    }

    #[test]
    fn test_validate_rejects_duplicate_key() {
        let mut catalog = Catalog::builtin();
        let dup = catalog.topics.first().unwrap().clone();
        catalog.topics.push(dup);
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_sessions() {
        let mut catalog = Catalog::builtin();
        catalog.topics.get_mut(0).unwrap().sessions_required = 0;
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::ZeroSessions(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_pathway_topic() {
        let mut catalog = Catalog::builtin();
        catalog.pathways.push(Pathway {
            name: "Broken".into(),
            topics: vec![key("does-not-exist")],
        });
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::UnknownPathwayTopic { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_packs() {
        let mut catalog = Catalog::builtin();
        catalog.session_packs.clear();
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::InvalidPack(_))
        ));

        let mut catalog = Catalog::builtin();
        catalog.session_packs.push(SessionPack::new(5, 50));
        assert!(matches!(
            catalog.validate(),
            Err(CatalogError::InvalidPack(_))
        ));

        let mut catalog = Catalog::builtin();
        catalog.session_packs.push(SessionPack::new(3, 101));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_from_json_str() {
        let json = r#"{
            "topics": [
                {"key": "mixing", "name": "Mixing", "type": "Mini-course", "sessions_required": 3, "tags": ["Tech"]}
            ],
            "pathways": [{"name": "Mix", "topics": ["mixing"]}],
            "session_packs": [{"sessions": 4}]
        }"#;
        let catalog = Catalog::from_json_str(json).unwrap();
        assert_eq!(catalog.topics.first().unwrap().description, "");
        assert_eq!(catalog.session_packs.first().unwrap().discount_percent, 0);
    }

    #[test]
    fn test_from_json_str_rejects_invalid_key() {
        let json = r#"{
            "topics": [{"key": "Bad Key", "name": "x", "type": "y", "sessions_required": 1}],
            "session_packs": [{"sessions": 1}]
        }"#;
        assert!(matches!(
            Catalog::from_json_str(json),
            Err(CatalogError::Json(_))
        ));
    }
}
