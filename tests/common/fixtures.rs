//! Test fixtures and builder patterns for catalogs and topics.

use session_planner::catalog::{Catalog, FEEDBACK_TAG, Pathway, SessionPack, Topic, TopicKey};

/// Shorthand for a known-valid topic key.
pub fn key(k: &str) -> TopicKey {
    TopicKey::new(k).expect("fixture keys are valid")
}

/// Builder for creating Topic test fixtures.
///
/// # Example
/// ```
/// let topic = TopicBuilder::new("mixing-basics")
///     .sessions(2)
///     .tag("Tech")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct TopicBuilder {
    key: String,
    name: Option<String>,
    kind: String,
    sessions: u16,
    tags: Vec<String>,
}

impl TopicBuilder {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            kind: "Mini-course".to_string(),
            sessions: 1,
            tags: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the number of sessions the topic requires.
    pub fn sessions(mut self, sessions: u16) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Mark the topic repeatable.
    pub fn repeatable(self) -> Self {
        self.tag(FEEDBACK_TAG)
    }

    pub fn build(self) -> Topic {
        Topic {
            key: key(&self.key),
            name: self.name.unwrap_or_else(|| self.key.clone()),
            kind: self.kind,
            description: String::new(),
            sessions_required: self.sessions,
            tags: self.tags,
        }
    }
}

/// Builder for creating Catalog test fixtures.
#[derive(Clone, Debug, Default)]
pub struct CatalogBuilder {
    topics: Vec<Topic>,
    pathways: Vec<Pathway>,
    packs: Vec<SessionPack>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic(mut self, topic: TopicBuilder) -> Self {
        self.topics.push(topic.build());
        self
    }

    /// Add a pathway listing topic keys in order.
    pub fn pathway(mut self, name: impl Into<String>, topics: &[&str]) -> Self {
        self.pathways.push(Pathway {
            name: name.into(),
            topics: topics.iter().map(|k| key(k)).collect(),
        });
        self
    }

    pub fn pack(mut self, sessions: u16, discount_percent: u8) -> Self {
        self.packs.push(SessionPack::new(sessions, discount_percent));
        self
    }

    /// Build and validate the catalog. Adds a single 5-session pack if none
    /// was given.
    pub fn build(mut self) -> Catalog {
        if self.packs.is_empty() {
            self.packs.push(SessionPack::new(5, 0));
        }
        let catalog = Catalog {
            topics: self.topics,
            pathways: self.pathways,
            session_packs: self.packs,
        };
        catalog.validate().expect("fixture catalog is valid");
        catalog
    }
}

/// Catalog used by the scenario tests: topics `a` (2 sessions), `b` (1),
/// `c` (3), `big` (6) and repeatable `fb` (1), with packs of 1, 5 and 10.
pub fn scenario_catalog() -> Catalog {
    CatalogBuilder::new()
        .topic(TopicBuilder::new("a").sessions(2))
        .topic(TopicBuilder::new("b").sessions(1))
        .topic(TopicBuilder::new("c").sessions(3))
        .topic(TopicBuilder::new("big").sessions(6))
        .topic(TopicBuilder::new("fb").kind("1:1 lesson").repeatable())
        .pathway("Three Up", &["a", "b", "c"])
        .pathway("Pair", &["b", "a"])
        .pathway("Echo", &["b", "a", "b"])
        .pack(1, 0)
        .pack(5, 10)
        .pack(10, 20)
        .build()
}
