use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::claim::{Claim, Tags};
use crate::fabric::Fabric;
use crate::generator::Generator;
use crate::strategy::{
    AgentTagOverlay, KeywordRule, KeywordSelector, KeywordTagDeriver, TagRule,
};
use crate::vault::{Vault, DEFAULT_RETRIEVE_LIMIT};

pub const FABRIC_MANIFEST_SCHEMA_VERSION: u32 = 1;

fn default_retrieve_limit() -> i64 {
    DEFAULT_RETRIEVE_LIMIT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestClaim {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestVault {
    pub id: String,
    #[serde(default)]
    pub claims: Vec<ManifestClaim>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAgent {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub vault_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    All,
    Keywords,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ManifestSelection {
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default)]
    pub rules: Vec<KeywordRule>,
    #[serde(default)]
    pub fallback_agents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Declarative fabric setup: vaults with seed claims, agents, and strategy rules.
pub struct FabricManifest {
    schema_version: u32,
    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: i64,
    #[serde(default)]
    pub vaults: Vec<ManifestVault>,
    #[serde(default)]
    pub agents: Vec<ManifestAgent>,
    #[serde(default)]
    pub selection: ManifestSelection,
    #[serde(default)]
    pub tag_rules: Vec<TagRule>,
    #[serde(default)]
    pub agent_tag_overlays: BTreeMap<String, Tags>,
}

impl FabricManifest {
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Builds a fabric with the manifest's strategies, vaults, and agents registered.
    pub fn build_fabric(&self, generator: Arc<dyn Generator>) -> Fabric {
        let mut builder = Fabric::builder(generator).retrieve_limit(self.retrieve_limit);
        if self.selection.mode == SelectionMode::Keywords {
            builder = builder.selector(KeywordSelector::new(
                self.selection.rules.clone(),
                self.selection.fallback_agents.clone(),
            ));
        }
        if !self.tag_rules.is_empty() {
            builder = builder.tag_deriver(KeywordTagDeriver::new(self.tag_rules.clone()));
        }
        if !self.agent_tag_overlays.is_empty() {
            builder =
                builder.tag_augmenter(AgentTagOverlay::new(self.agent_tag_overlays.clone()));
        }

        let mut fabric = builder.build();
        for vault in &self.vaults {
            let claims = vault
                .claims
                .iter()
                .map(|claim| match &claim.id {
                    Some(id) => {
                        Claim::with_id(id.as_str(), claim.content.as_str(), claim.tags.clone())
                    }
                    None => Claim::with_tags(claim.content.as_str(), claim.tags.clone()),
                })
                .collect();
            fabric.register_vault(Vault::with_claims(vault.id.as_str(), claims));
        }
        for agent in &self.agents {
            fabric.register_agent(Agent::new(
                agent.id.as_str(),
                agent.role.as_str(),
                agent.vault_ids.iter().map(String::as_str),
            ));
        }
        tracing::debug!(
            vaults = self.vaults.len(),
            agents = self.agents.len(),
            selection = ?self.selection.mode,
            "built fabric from manifest"
        );
        fabric
    }
}

pub fn load_fabric_manifest(path: &Path) -> Result<FabricManifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fabric manifest {}", path.display()))?;
    parse_fabric_manifest_with_source(&raw, &path.display().to_string())
}

pub fn parse_fabric_manifest(raw: &str) -> Result<FabricManifest> {
    parse_fabric_manifest_with_source(raw, "<inline-manifest>")
}

fn parse_fabric_manifest_with_source(raw: &str, source_label: &str) -> Result<FabricManifest> {
    let mut parsed = serde_json::from_str::<FabricManifest>(raw)
        .with_context(|| format!("failed to parse fabric manifest {}", source_label))?;
    normalize_and_validate_manifest(source_label, &mut parsed)?;
    Ok(parsed)
}

fn normalize_and_validate_manifest(
    source_label: &str,
    manifest: &mut FabricManifest,
) -> Result<()> {
    if manifest.schema_version != FABRIC_MANIFEST_SCHEMA_VERSION {
        bail!(
            "unsupported fabric manifest schema_version {} in {} (expected {})",
            manifest.schema_version,
            source_label,
            FABRIC_MANIFEST_SCHEMA_VERSION
        );
    }
    if manifest.retrieve_limit <= 0 {
        bail!(
            "retrieve_limit must be positive in {} (got {})",
            source_label,
            manifest.retrieve_limit
        );
    }

    let mut vault_ids = HashSet::new();
    for vault in &mut manifest.vaults {
        vault.id = normalize_id(&vault.id, "vault")
            .with_context(|| format!("invalid vault in {}", source_label))?;
        if !vault_ids.insert(vault.id.clone()) {
            bail!("duplicate vault '{}' in {}", vault.id, source_label);
        }
    }

    let mut agent_ids = HashSet::new();
    for agent in &mut manifest.agents {
        agent.id = normalize_id(&agent.id, "agent")
            .with_context(|| format!("invalid agent in {}", source_label))?;
        if !agent_ids.insert(agent.id.clone()) {
            bail!("duplicate agent '{}' in {}", agent.id, source_label);
        }
        let mut normalized_vault_ids = Vec::with_capacity(agent.vault_ids.len());
        for raw_vault_id in &agent.vault_ids {
            normalized_vault_ids.push(normalize_id(raw_vault_id, "vault").with_context(|| {
                format!("invalid vault reference for agent '{}' in {}", agent.id, source_label)
            })?);
        }
        agent.vault_ids = normalized_vault_ids;
    }

    for rule in &mut manifest.selection.rules {
        rule.agent_id = normalize_id(&rule.agent_id, "agent")
            .with_context(|| format!("invalid selection rule in {}", source_label))?;
        ensure_declared_agent(&agent_ids, &rule.agent_id, "selection rule", source_label)?;
        rule.keywords = normalize_keywords(&rule.keywords).with_context(|| {
            format!(
                "invalid keywords for selection rule '{}' in {}",
                rule.agent_id, source_label
            )
        })?;
    }

    let mut seen_fallbacks = HashSet::new();
    let mut normalized_fallbacks = Vec::new();
    for raw_agent_id in std::mem::take(&mut manifest.selection.fallback_agents) {
        let agent_id = normalize_id(&raw_agent_id, "agent")
            .with_context(|| format!("invalid fallback agent in {}", source_label))?;
        ensure_declared_agent(&agent_ids, &agent_id, "fallback", source_label)?;
        if seen_fallbacks.insert(agent_id.clone()) {
            normalized_fallbacks.push(agent_id);
        }
    }
    manifest.selection.fallback_agents = normalized_fallbacks;

    if manifest.selection.mode == SelectionMode::Keywords
        && manifest.selection.rules.is_empty()
        && manifest.selection.fallback_agents.is_empty()
    {
        bail!(
            "keyword selection needs at least one rule or fallback agent in {}",
            source_label
        );
    }

    for (index, rule) in manifest.tag_rules.iter_mut().enumerate() {
        rule.keywords = normalize_keywords(&rule.keywords)
            .with_context(|| format!("invalid keywords for tag_rules[{index}] in {source_label}"))?;
    }

    let mut normalized_overlays = BTreeMap::new();
    for (raw_agent_id, tags) in std::mem::take(&mut manifest.agent_tag_overlays) {
        let agent_id = normalize_id(&raw_agent_id, "agent")
            .with_context(|| format!("invalid tag overlay in {}", source_label))?;
        ensure_declared_agent(&agent_ids, &agent_id, "tag overlay", source_label)?;
        if normalized_overlays.contains_key(&agent_id) {
            bail!("duplicate tag overlay for agent '{}' in {}", agent_id, source_label);
        }
        normalized_overlays.insert(agent_id, tags);
    }
    manifest.agent_tag_overlays = normalized_overlays;

    Ok(())
}

fn normalize_id(raw: &str, kind: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("{kind} id cannot be empty");
    }
    Ok(trimmed.to_string())
}

fn normalize_keywords(raw: &[String]) -> Result<Vec<String>> {
    let keywords = raw
        .iter()
        .map(|keyword| keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    if keywords.is_empty() {
        bail!("keyword list cannot be empty");
    }
    Ok(keywords)
}

fn ensure_declared_agent(
    agent_ids: &HashSet<String>,
    agent_id: &str,
    field_name: &str,
    source_label: &str,
) -> Result<()> {
    if !agent_ids.contains(agent_id) {
        bail!(
            "{} references unknown agent '{}' in {}",
            field_name,
            agent_id,
            source_label
        );
    }
    Ok(())
}
