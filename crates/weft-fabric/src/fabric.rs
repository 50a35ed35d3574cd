use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, Slices};
use crate::claim::Tags;
use crate::generator::Generator;
use crate::strategy::{
    AgentRegistry, NoTags, PassThrough, SelectAll, Selector, TagAugmenter, TagDeriver,
};
use crate::trace::FabricTrace;
use crate::vault::{Vault, DEFAULT_RETRIEVE_LIMIT};

pub const NO_AGENT_RESPONSE: &str = "No relevant agent could be found to handle this request.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Final text of a request together with the trace that produced it.
pub struct FabricResponse {
    pub response: String,
    pub trace: FabricTrace,
}

/// Assembles a [`Fabric`] from its strategies and generator.
pub struct FabricBuilder {
    generator: Arc<dyn Generator>,
    selector: Arc<dyn Selector>,
    tag_deriver: Arc<dyn TagDeriver>,
    tag_augmenter: Arc<dyn TagAugmenter>,
    retrieve_limit: i64,
}

impl FabricBuilder {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            selector: Arc::new(SelectAll),
            tag_deriver: Arc::new(NoTags),
            tag_augmenter: Arc::new(PassThrough),
            retrieve_limit: DEFAULT_RETRIEVE_LIMIT,
        }
    }

    pub fn selector(mut self, selector: impl Selector + 'static) -> Self {
        self.selector = Arc::new(selector);
        self
    }

    pub fn tag_deriver(mut self, tag_deriver: impl TagDeriver + 'static) -> Self {
        self.tag_deriver = Arc::new(tag_deriver);
        self
    }

    pub fn tag_augmenter(mut self, tag_augmenter: impl TagAugmenter + 'static) -> Self {
        self.tag_augmenter = Arc::new(tag_augmenter);
        self
    }

    /// Per-vault claim limit used for every retrieval.
    pub fn retrieve_limit(mut self, limit: i64) -> Self {
        self.retrieve_limit = limit;
        self
    }

    pub fn build(self) -> Fabric {
        Fabric {
            agents: AgentRegistry::new(),
            vaults: BTreeMap::new(),
            selector: self.selector,
            tag_deriver: self.tag_deriver,
            tag_augmenter: self.tag_augmenter,
            generator: self.generator,
            retrieve_limit: self.retrieve_limit,
        }
    }
}

/// Owns the agent and vault registries and runs the select, retrieve, generate pipeline.
///
/// A `Fabric` keeps no per-request state, so one instance can serve concurrent
/// requests behind an `Arc`.
pub struct Fabric {
    agents: AgentRegistry,
    vaults: BTreeMap<String, Arc<Vault>>,
    selector: Arc<dyn Selector>,
    tag_deriver: Arc<dyn TagDeriver>,
    tag_augmenter: Arc<dyn TagAugmenter>,
    generator: Arc<dyn Generator>,
    retrieve_limit: i64,
}

struct AgentRun {
    agent_id: String,
    slices: Slices,
    partial: String,
}

impl Fabric {
    pub fn builder(generator: Arc<dyn Generator>) -> FabricBuilder {
        FabricBuilder::new(generator)
    }

    /// Registers an agent, returning the one previously registered under the same id.
    pub fn register_agent(&mut self, agent: Agent) -> Option<Agent> {
        self.agents.insert(agent.id().to_string(), agent)
    }

    /// Registers a vault, returning the one previously registered under the same id.
    pub fn register_vault(&mut self, vault: impl Into<Arc<Vault>>) -> Option<Arc<Vault>> {
        let vault = vault.into();
        self.vaults.insert(vault.id().to_string(), vault)
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn vaults(&self) -> &BTreeMap<String, Arc<Vault>> {
        &self.vaults
    }

    pub fn vault(&self, vault_id: &str) -> Option<&Arc<Vault>> {
        self.vaults.get(vault_id)
    }

    pub fn retrieve_limit(&self) -> i64 {
        self.retrieve_limit
    }

    /// Handles one query, running selected agents one after another.
    #[tracing::instrument(
        name = "weft_fabric.fabric.handle_request",
        skip(self, query),
        fields(query_chars = query.chars().count())
    )]
    pub async fn handle_request(&self, query: &str) -> FabricResponse {
        let trace = match self.begin_request(query) {
            Ok(trace) => trace,
            Err(response) => return response,
        };
        let mut runs = Vec::with_capacity(trace.selected_agents.len());
        for agent in &trace.selected_agents {
            runs.push(self.run_agent(query, agent, &trace.base_tags).await);
        }
        finish_request(trace, runs)
    }

    /// Handles one query with selected agents running concurrently.
    ///
    /// Contributions are still assembled in selection order, so the result
    /// matches [`Fabric::handle_request`] for the same inputs.
    #[tracing::instrument(
        name = "weft_fabric.fabric.handle_request_concurrent",
        skip(self, query),
        fields(query_chars = query.chars().count())
    )]
    pub async fn handle_request_concurrent(&self, query: &str) -> FabricResponse {
        let trace = match self.begin_request(query) {
            Ok(trace) => trace,
            Err(response) => return response,
        };
        let runs = join_all(
            trace
                .selected_agents
                .iter()
                .map(|agent| self.run_agent(query, agent, &trace.base_tags)),
        )
        .await;
        finish_request(trace, runs)
    }

    fn begin_request(&self, query: &str) -> Result<FabricTrace, FabricResponse> {
        let mut trace = FabricTrace::new(query);
        trace.selected_agents = self.selector.select(query, &self.agents);
        if trace.selected_agents.is_empty() {
            tracing::info!(registered_agents = self.agents.len(), "no agent selected");
            return Err(FabricResponse {
                response: NO_AGENT_RESPONSE.to_string(),
                trace,
            });
        }
        trace.base_tags = self.tag_deriver.derive_tags(query);
        tracing::info!(
            selected_agents = trace.selected_agents.len(),
            base_tags = trace.base_tags.len(),
            "agents selected"
        );
        Ok(trace)
    }

    async fn run_agent(&self, query: &str, agent: &Agent, base_tags: &Tags) -> AgentRun {
        let tags = self.tag_augmenter.augment_tags(agent, base_tags);
        let mut slices = Slices::new();
        for vault_id in agent.vault_ids() {
            let Some(vault) = self.vaults.get(vault_id) else {
                tracing::debug!(
                    agent_id = %agent.id(),
                    vault_id = %vault_id,
                    "skipping unregistered vault"
                );
                continue;
            };
            let claims = vault.retrieve(&tags, self.retrieve_limit);
            tracing::debug!(
                agent_id = %agent.id(),
                vault_id = %vault_id,
                claims = claims.len(),
                "retrieved vault slice"
            );
            slices.insert(vault_id.clone(), claims);
        }
        let partial = agent.run(query, &slices, self.generator.as_ref()).await;
        AgentRun {
            agent_id: agent.id().to_string(),
            slices,
            partial,
        }
    }
}

fn finish_request(mut trace: FabricTrace, runs: Vec<AgentRun>) -> FabricResponse {
    let mut contributions = Vec::with_capacity(runs.len());
    for run in runs {
        contributions.push(format!(
            "--- Contribution from {} ---\n{}",
            run.agent_id, run.partial
        ));
        trace.slices_per_agent.insert(run.agent_id.clone(), run.slices);
        trace.partial_results.insert(run.agent_id, run.partial);
    }
    tracing::info!(contributions = contributions.len(), "request finished");
    FabricResponse {
        response: contributions.join("\n\n"),
        trace,
    }
}
