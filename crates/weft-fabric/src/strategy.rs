//! Pluggable decision points of the fabric pipeline.
//!
//! Each contract has one operation and is expected to be pure. Closures with
//! the matching signature implement the traits directly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::claim::Tags;

/// Registered agents keyed by id.
pub type AgentRegistry = BTreeMap<String, Agent>;

pub trait Selector: Send + Sync {
    /// Returns the participating agents in the order they should contribute.
    fn select(&self, query: &str, agents: &AgentRegistry) -> Vec<Agent>;
}

pub trait TagDeriver: Send + Sync {
    fn derive_tags(&self, query: &str) -> Tags;
}

pub trait TagAugmenter: Send + Sync {
    fn augment_tags(&self, agent: &Agent, base_tags: &Tags) -> Tags;
}

impl<F> Selector for F
where
    F: Fn(&str, &AgentRegistry) -> Vec<Agent> + Send + Sync,
{
    fn select(&self, query: &str, agents: &AgentRegistry) -> Vec<Agent> {
        self(query, agents)
    }
}

impl<F> TagDeriver for F
where
    F: Fn(&str) -> Tags + Send + Sync,
{
    fn derive_tags(&self, query: &str) -> Tags {
        self(query)
    }
}

impl<F> TagAugmenter for F
where
    F: Fn(&Agent, &Tags) -> Tags + Send + Sync,
{
    fn augment_tags(&self, agent: &Agent, base_tags: &Tags) -> Tags {
        self(agent, base_tags)
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Selects every registered agent in id order.
pub struct SelectAll;

impl Selector for SelectAll {
    fn select(&self, _query: &str, agents: &AgentRegistry) -> Vec<Agent> {
        agents.values().cloned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub agent_id: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Selects agents whose keywords occur in the query (case-insensitive).
///
/// Matching agents keep rule order and appear once. When nothing matches the
/// registered fallback agents are used instead.
pub struct KeywordSelector {
    pub rules: Vec<KeywordRule>,
    pub fallback: Vec<String>,
}

impl KeywordSelector {
    pub fn new(rules: Vec<KeywordRule>, fallback: Vec<String>) -> Self {
        Self { rules, fallback }
    }
}

impl Selector for KeywordSelector {
    fn select(&self, query: &str, agents: &AgentRegistry) -> Vec<Agent> {
        let query = query.to_lowercase();
        let mut selected_ids: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if contains_any_keyword(&query, &rule.keywords)
                && !selected_ids.contains(&rule.agent_id.as_str())
            {
                selected_ids.push(rule.agent_id.as_str());
            }
        }

        let mut selected = collect_registered(&selected_ids, agents);
        if selected.is_empty() {
            let fallback = self.fallback.iter().map(String::as_str).collect::<Vec<_>>();
            selected = collect_registered(&fallback, agents);
        }
        selected
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRule {
    pub keywords: Vec<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Merges the tags of every rule whose keywords occur in the query.
pub struct KeywordTagDeriver {
    pub rules: Vec<TagRule>,
}

impl KeywordTagDeriver {
    pub fn new(rules: Vec<TagRule>) -> Self {
        Self { rules }
    }
}

impl TagDeriver for KeywordTagDeriver {
    fn derive_tags(&self, query: &str) -> Tags {
        let query = query.to_lowercase();
        let mut tags = Tags::new();
        for rule in &self.rules {
            if contains_any_keyword(&query, &rule.keywords) {
                tags.extend(rule.tags.clone());
            }
        }
        tags
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoTags;

impl TagDeriver for NoTags {
    fn derive_tags(&self, _query: &str) -> Tags {
        Tags::new()
    }
}

#[derive(Debug, Clone, Copy, Default)]
/// Uses the base tags unchanged for every agent.
pub struct PassThrough;

impl TagAugmenter for PassThrough {
    fn augment_tags(&self, _agent: &Agent, base_tags: &Tags) -> Tags {
        base_tags.clone()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Extends or overrides base tags with a per-agent overlay.
pub struct AgentTagOverlay {
    pub overlays: BTreeMap<String, Tags>,
}

impl AgentTagOverlay {
    pub fn new(overlays: BTreeMap<String, Tags>) -> Self {
        Self { overlays }
    }
}

impl TagAugmenter for AgentTagOverlay {
    fn augment_tags(&self, agent: &Agent, base_tags: &Tags) -> Tags {
        let mut tags = base_tags.clone();
        if let Some(overlay) = self.overlays.get(agent.id()) {
            tags.extend(overlay.clone());
        }
        tags
    }
}

fn contains_any_keyword(lowercase_query: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|keyword| {
        let keyword = keyword.trim().to_lowercase();
        !keyword.is_empty() && lowercase_query.contains(keyword.as_str())
    })
}

fn collect_registered(ids: &[&str], agents: &AgentRegistry) -> Vec<Agent> {
    let mut selected = Vec::new();
    for id in ids {
        match agents.get(*id) {
            Some(agent) if !selected.contains(agent) => selected.push(agent.clone()),
            Some(_) => {}
            None => tracing::debug!(agent_id = %id, "selection skipped unregistered agent"),
        }
    }
    selected
}
