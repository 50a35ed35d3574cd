use std::fmt;
use std::ops::Index;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::claim::Claim;
use crate::generator::Generator;

type SliceEntry = (String, Vec<Claim>);

/// Claims retrieved per vault id for one agent invocation.
///
/// Entries keep insertion order, which the fabric fills in the agent's own
/// vault order. Serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slices {
    entries: Vec<SliceEntry>,
}

impl Slices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a slice. A replaced slice keeps its original position.
    pub fn insert(
        &mut self,
        vault_id: impl Into<String>,
        claims: Vec<Claim>,
    ) -> Option<Vec<Claim>> {
        let vault_id = vault_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == vault_id) {
            Some((_, existing)) => Some(std::mem::replace(existing, claims)),
            None => {
                self.entries.push((vault_id, claims));
                None
            }
        }
    }

    pub fn get(&self, vault_id: &str) -> Option<&Vec<Claim>> {
        self.entries
            .iter()
            .find(|(id, _)| id == vault_id)
            .map(|(_, claims)| claims)
    }

    pub fn contains_key(&self, vault_id: &str) -> bool {
        self.get(vault_id).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> SlicesIter<'_> {
        SlicesIter {
            inner: self.entries.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct SlicesIter<'a> {
    inner: std::slice::Iter<'a, SliceEntry>,
}

impl<'a> Iterator for SlicesIter<'a> {
    type Item = (&'a String, &'a Vec<Claim>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(vault_id, claims)| (vault_id, claims))
    }
}

impl<'a> IntoIterator for &'a Slices {
    type Item = (&'a String, &'a Vec<Claim>);
    type IntoIter = SlicesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Index<&str> for Slices {
    type Output = Vec<Claim>;

    fn index(&self, vault_id: &str) -> &Self::Output {
        match self.get(vault_id) {
            Some(claims) => claims,
            None => panic!("no slice for vault '{vault_id}'"),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<Claim>)> for Slices {
    fn from_iter<T: IntoIterator<Item = (K, Vec<Claim>)>>(iter: T) -> Self {
        let mut slices = Slices::new();
        for (vault_id, claims) in iter {
            slices.insert(vault_id, claims);
        }
        slices
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Vec<Claim>); N]> for Slices {
    fn from(entries: [(K, Vec<Claim>); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl Serialize for Slices {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (vault_id, claims) in &self.entries {
            map.serialize_entry(vault_id, claims)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Slices {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SlicesVisitor;

        impl<'de> Visitor<'de> for SlicesVisitor {
            type Value = Slices;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of vault id to claims")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Slices, A::Error> {
                let mut slices = Slices::new();
                while let Some((vault_id, claims)) = access.next_entry::<String, Vec<Claim>>()? {
                    slices.insert(vault_id, claims);
                }
                Ok(slices)
            }
        }

        deserializer.deserialize_map(SlicesVisitor)
    }
}

pub const NO_CONTEXT_MARKER: &str = "--- No relevant information found in memory vaults. ---";

/// A named role that answers from the vaults it can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    id: String,
    role: String,
    vault_ids: Vec<String>,
}

impl Agent {
    /// Builds an agent; repeated vault ids keep their first position.
    pub fn new<I, S>(id: impl Into<String>, role: impl Into<String>, vault_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique = Vec::new();
        for vault_id in vault_ids {
            let vault_id = vault_id.into();
            if !unique.contains(&vault_id) {
                unique.push(vault_id);
            }
        }
        Self {
            id: id.into(),
            role: role.into(),
            vault_ids: unique,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn vault_ids(&self) -> &[String] {
        &self.vault_ids
    }

    pub fn build_prompt(&self, query: &str, slices: &Slices) -> String {
        let sections = slices
            .iter()
            .filter(|(_, claims)| !claims.is_empty())
            .map(|(vault_id, claims)| render_slice(vault_id, claims))
            .collect::<Vec<_>>();
        let context = if sections.is_empty() {
            NO_CONTEXT_MARKER.to_string()
        } else {
            sections.join("\n")
        };

        format!(
            "Your Role: {role}\nUser's Query: \"{query}\"\nRelevant Information:\n{context}\nBased on your role and the provided information, generate a concise, partial response.",
            role = self.role,
        )
    }

    /// Produces this agent's partial result. Generation failures come back as marker text.
    pub async fn run(&self, query: &str, slices: &Slices, generator: &dyn Generator) -> String {
        let prompt = self.build_prompt(query, slices);
        tracing::debug!(
            agent_id = %self.id,
            slices = slices.len(),
            prompt_chars = prompt.chars().count(),
            "agent generating partial result"
        );
        generator.generate(&prompt).await.into_text()
    }
}

fn render_slice(vault_id: &str, claims: &[Claim]) -> String {
    let mut section = format!("--- Context from {vault_id} ---");
    for claim in claims {
        section.push_str("\n- ");
        section.push_str(claim.content());
    }
    section
}
