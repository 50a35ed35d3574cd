use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retrieval tags: free-form keys mapped to exact-match JSON values.
pub type Tags = BTreeMap<String, Value>;

/// An atomic fact stored in a vault.
///
/// Claims are immutable once built; identity is the `id`, which defaults to a
/// random UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    id: String,
    content: String,
    #[serde(default)]
    tags: Tags,
}

impl Claim {
    pub fn new(content: impl Into<String>) -> Self {
        Self::with_tags(content, Tags::new())
    }

    pub fn with_tags(content: impl Into<String>, tags: Tags) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            tags,
        }
    }

    /// Builds a claim with a caller-supplied identifier.
    pub fn with_id(id: impl Into<String>, content: impl Into<String>, tags: Tags) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            tags,
        }
    }

    /// Adds one tag while the claim is still being built.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Returns true when every `(key, value)` in `tag_query` is present with an equal value.
    pub fn matches(&self, tag_query: &Tags) -> bool {
        tag_query
            .iter()
            .all(|(key, expected)| self.tags.get(key) == Some(expected))
    }
}
