//! Topic identity and catalog entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CatalogError;

/// Tag that marks a topic as repeatable.
pub const FEEDBACK_TAG: &str = "Feedback";

/// Unique, stable identifier for a catalog topic.
///
/// Keys are short kebab-case strings (`[a-z0-9-]`). They are stored in slot
/// occupancy records and snapshots, so they must stay stable across catalog
/// revisions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicKey(pub(super) String);

impl TopicKey {
    /// Create a new key, rejecting empty keys and characters outside `[a-z0-9-]`.
    pub fn new(key: impl Into<String>) -> Result<Self, CatalogError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CatalogError::InvalidKey {
                key,
                reason: "topic key must not be empty".into(),
            });
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(CatalogError::InvalidKey {
                key,
                reason: "topic key must contain only [a-z0-9-]".into(),
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TopicKey {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TopicKey> for String {
    fn from(key: TopicKey) -> Self {
        key.0
    }
}

/// A plannable topic from the catalog.
///
/// Only `key`, `sessions_required` and the feedback tag matter to the
/// allocation engine; the rest is display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub key: TopicKey,
    pub name: String,
    /// Category shown to the user ("Mini-course", "Assignment", "1:1 lesson").
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    pub sessions_required: u16,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Topic {
    /// Whether several instances of this topic may sit in one plan.
    pub fn is_repeatable(&self) -> bool {
        self.tags.iter().any(|t| t == FEEDBACK_TAG)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
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

    fn topic(tags: &[&str]) -> Topic {
        Topic {
            key: TopicKey::new("fmod-basics").unwrap(),
            name: "FMOD Basics".into(),
            kind: "Mini-course".into(),
            description: String::new(),
            sessions_required: 1,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn test_topic_key_accepts_kebab_case() {
        let key = TopicKey::new("portfolio-film-2").unwrap();
        assert_eq!(key.as_str(), "portfolio-film-2");
        assert_eq!(key.to_string(), "portfolio-film-2");
    }

    #[test]
    fn test_topic_key_rejects_empty() {
        assert!(matches!(
            TopicKey::new(""),
            Err(CatalogError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_topic_key_rejects_uppercase_and_spaces() {
        assert!(TopicKey::new("FMOD").is_err());
        assert!(TopicKey::new("fmod basics").is_err());
    }

    #[test]
    fn test_topic_key_deserialize_validates() {
        let ok: TopicKey = serde_json::from_str("\"spotting-a-film\"").unwrap();
        assert_eq!(ok.as_str(), "spotting-a-film");
        assert!(serde_json::from_str::<TopicKey>("\"Not Valid\"").is_err());
    }

    #[test]
    fn test_repeatable_only_with_feedback_tag() {
        assert!(!topic(&["Game", "Tech"]).is_repeatable());
        assert!(topic(&["Feedback"]).is_repeatable());
        // Tag matching is case-sensitive
        assert!(!topic(&["feedback"]).is_repeatable());
    }

    #[test]
    fn test_topic_type_field_renamed() {
        let json = serde_json::to_value(topic(&[])).unwrap();
        assert_eq!(json["type"], "Mini-course");
        assert!(json.get("kind").is_none());
    }
}
