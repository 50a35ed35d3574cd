//! Graphviz DOT rendering of one fabric request.
//!
//! The diagram shows the static agent to vault wiring, which agents the
//! request woke, and the claims each agent pulled from each vault.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use regex::Regex;
use thiserror::Error;
use weft_core::{write_artifact, ArtifactKind};
use weft_fabric::{AgentRegistry, Fabric, FabricTrace, Vault};

const SLICE_PREVIEW_CHARS: usize = 30;
const OUTPUT_STEM_CHARS: usize = 50;
const FABRIC_NODE: &str = "fabric";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VizError {
    #[error("trace has no query; handle a request before rendering")]
    EmptyTrace,
}

pub fn render_fabric_trace_dot(fabric: &Fabric, trace: &FabricTrace) -> Result<String, VizError> {
    render_trace_dot(fabric.agents(), fabric.vaults(), trace)
}

/// Renders the registries and a completed trace as a DOT digraph.
pub fn render_trace_dot(
    agents: &AgentRegistry,
    vaults: &BTreeMap<String, Arc<Vault>>,
    trace: &FabricTrace,
) -> Result<String, VizError> {
    if trace.query.is_empty() {
        return Err(VizError::EmptyTrace);
    }

    let mut lines = vec![
        "digraph fabric {".to_string(),
        format!(
            "  graph [rankdir=LR, splines=ortho, labelloc=t, fontsize=20, label=\"Query: {}\"];",
            escape_graph_label(&trace.query)
        ),
        "  subgraph cluster_agents {".to_string(),
        "    label=\"Agents\"; style=filled; color=lightgrey;".to_string(),
    ];
    for agent_id in agents.keys() {
        let style = if trace.is_selected(agent_id) {
            "style=filled, fillcolor=lightblue, penwidth=2"
        } else {
            "style=filled, fillcolor=whitesmoke"
        };
        lines.push(format!(
            "    {} [label=\"{}\", shape=box, {style}];",
            agent_node(agent_id),
            escape_graph_label(&format!("Agent:\n{agent_id}"))
        ));
    }
    lines.push("  }".to_string());

    lines.push("  subgraph cluster_vaults {".to_string());
    lines.push("    label=\"Memory Vaults\"; style=filled; color=lightgrey;".to_string());
    for vault_id in vaults.keys() {
        lines.push(format!(
            "    {} [label=\"{}\", shape=cylinder];",
            vault_node(vault_id),
            escape_graph_label(&format!("Vault:\n{vault_id}"))
        ));
    }
    lines.push("  }".to_string());

    for agent in agents.values() {
        for vault_id in agent.vault_ids() {
            lines.push(format!(
                "  {} -> {} [style=dashed, arrowhead=none, label=\"can access\"];",
                agent_node(agent.id()),
                vault_node(vault_id)
            ));
        }
    }

    lines.push(format!(
        "  {FABRIC_NODE} [label=\"Fabric\\n(Orchestrator)\", shape=doublecircle, style=filled, fillcolor=gold];"
    ));

    for agent_id in trace.selected_agent_ids() {
        lines.push(format!(
            "  {FABRIC_NODE} -> {} [label=\"wakes\", color=green, penwidth=2];",
            agent_node(agent_id)
        ));
    }

    for (agent_id, slices) in &trace.slices_per_agent {
        for (vault_id, claims) in slices {
            if claims.is_empty() {
                continue;
            }
            let mut label = "Gets Slice:".to_string();
            for claim in claims {
                let preview = claim
                    .content()
                    .chars()
                    .take(SLICE_PREVIEW_CHARS)
                    .collect::<String>();
                label.push_str(&format!("\n- {preview}..."));
            }
            lines.push(format!(
                "  {} -> {} [label=\"{}\", color=blue, fontcolor=blue, penwidth=2];",
                vault_node(vault_id),
                agent_node(agent_id),
                escape_graph_label(&label)
            ));
        }
    }

    lines.push("}".to_string());
    Ok(lines.join("\n"))
}

/// File stem for a query's diagram: `flow_` plus the sanitized, truncated query.
pub fn trace_output_stem(query: &str) -> String {
    static NON_WORD: OnceLock<Option<Regex>> = OnceLock::new();
    let sanitized = match NON_WORD.get_or_init(|| Regex::new(r"[\W_]+").ok()) {
        Some(pattern) => pattern.replace_all(query, "_").into_owned(),
        None => query.to_string(),
    };
    let truncated = sanitized.chars().take(OUTPUT_STEM_CHARS).collect::<String>();
    format!("flow_{truncated}")
}

/// Writes `<stem>.dot` for the trace into `dir` and returns its path.
pub fn write_trace_dot(
    dir: &Path,
    agents: &AgentRegistry,
    vaults: &BTreeMap<String, Arc<Vault>>,
    trace: &FabricTrace,
) -> Result<PathBuf> {
    let dot = render_trace_dot(agents, vaults, trace)?;
    let path = dir.join(format!("{}.dot", trace_output_stem(&trace.query)));
    write_artifact(ArtifactKind::TraceDiagram, &path, &dot)?;
    Ok(path)
}

fn escape_graph_label(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn agent_node(agent_id: &str) -> String {
    format!("\"agent:{}\"", escape_graph_label(agent_id))
}

fn vault_node(vault_id: &str) -> String {
    format!("\"vault:{}\"", escape_graph_label(vault_id))
}
