use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use weft_core::unix_time_ms;

use crate::agent::{Agent, Slices};
use crate::claim::Tags;

pub const FABRIC_TRACE_RECORD_TYPE: &str = "fabric_trace_v1";
pub const FABRIC_TRACE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Decision path of one request: who was woken, what they read, what they said.
pub struct FabricTrace {
    pub query: String,
    pub selected_agents: Vec<Agent>,
    pub base_tags: Tags,
    pub slices_per_agent: BTreeMap<String, Slices>,
    pub partial_results: BTreeMap<String, String>,
}

impl FabricTrace {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn selected_agent_ids(&self) -> Vec<&str> {
        self.selected_agents.iter().map(Agent::id).collect()
    }

    pub fn is_selected(&self, agent_id: &str) -> bool {
        self.selected_agents.iter().any(|agent| agent.id() == agent_id)
    }

    pub fn slices_for(&self, agent_id: &str) -> Option<&Slices> {
        self.slices_per_agent.get(agent_id)
    }
}

/// Builds the compact JSONL summary of a trace.
pub fn trace_record_json(trace: &FabricTrace) -> Value {
    let slice_counts = trace
        .slices_per_agent
        .iter()
        .map(|(agent_id, slices)| {
            let counts = slices
                .iter()
                .map(|(vault_id, claims)| (vault_id.clone(), json!(claims.len())))
                .collect::<serde_json::Map<_, _>>();
            (agent_id.clone(), Value::Object(counts))
        })
        .collect::<serde_json::Map<_, _>>();
    let partial_result_chars = trace
        .partial_results
        .iter()
        .map(|(agent_id, text)| (agent_id.clone(), json!(text.chars().count())))
        .collect::<serde_json::Map<_, _>>();

    json!({
        "record_type": FABRIC_TRACE_RECORD_TYPE,
        "schema_version": FABRIC_TRACE_SCHEMA_VERSION,
        "timestamp_unix_ms": unix_time_ms(),
        "query": trace.query,
        "selected_agents": trace.selected_agent_ids(),
        "base_tags": trace.base_tags,
        "slice_counts": slice_counts,
        "partial_result_chars": partial_result_chars,
    })
}

#[derive(Clone)]
/// Appends one JSON line per request trace.
pub struct TraceLogger {
    path: PathBuf,
    file: Arc<Mutex<std::fs::File>>,
}

impl TraceLogger {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create trace log directory {}", parent.display())
                })?;
            }
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open trace log {}", path.display()))?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_trace(&self, trace: &FabricTrace) -> Result<()> {
        let line = serde_json::to_string(&trace_record_json(trace))
            .context("failed to encode fabric trace record")?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow!("trace log file lock is poisoned"))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to write trace log {}", self.path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush trace log {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{trace_record_json, FabricTrace, TraceLogger, FABRIC_TRACE_RECORD_TYPE};
    use crate::agent::{Agent, Slices};
    use crate::claim::{Claim, Tags};

    fn sample_trace() -> FabricTrace {
        let mut trace = FabricTrace::new("refund for parcel");
        trace.selected_agents = vec![Agent::new("billing", "Billing desk", ["V1", "V2"])];
        trace.base_tags = Tags::from([("topic".to_string(), json!("billing"))]);
        trace.slices_per_agent.insert(
            "billing".to_string(),
            Slices::from([(
                "V1".to_string(),
                vec![Claim::new("a"), Claim::new("b")],
            )]),
        );
        trace
            .partial_results
            .insert("billing".to_string(), "refund issued".to_string());
        trace
    }

    #[test]
    fn unit_trace_helpers_report_selection() {
        let trace = sample_trace();
        assert_eq!(trace.selected_agent_ids(), vec!["billing"]);
        assert!(trace.is_selected("billing"));
        assert!(!trace.is_selected("shipping"));
        assert!(trace.slices_for("billing").is_some());
        assert!(FabricTrace::new("q").selected_agents.is_empty());
    }

    #[test]
    fn unit_trace_record_json_summarizes_counts() {
        let record = trace_record_json(&sample_trace());
        assert_eq!(record["record_type"], FABRIC_TRACE_RECORD_TYPE);
        assert_eq!(record["schema_version"], 1);
        assert!(record["timestamp_unix_ms"].as_u64().unwrap_or(0) > 0);
        assert_eq!(record["selected_agents"], json!(["billing"]));
        assert_eq!(record["base_tags"]["topic"], "billing");
        assert_eq!(record["slice_counts"]["billing"]["V1"], 2);
        assert_eq!(record["partial_result_chars"]["billing"], 13);
    }

    #[test]
    fn integration_trace_logger_appends_jsonl_records() {
        let temp = tempdir().expect("tempdir");
        let log_path = temp.path().join("logs").join("fabric-trace.jsonl");
        let logger = TraceLogger::open(log_path.clone()).expect("logger opens");
        logger.log_trace(&sample_trace()).expect("first record");
        logger
            .log_trace(&FabricTrace::new("hello"))
            .expect("second record");

        let raw = std::fs::read_to_string(&log_path).expect("read trace log");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("parse second");
        assert_eq!(second["query"], "hello");
        assert_eq!(second["selected_agents"], json!([]));
        assert_eq!(logger.path(), log_path.as_path());
    }

    #[test]
    fn functional_trace_serializes_full_slices() {
        let value = serde_json::to_value(sample_trace()).expect("serialize trace");
        assert_eq!(value["slices_per_agent"]["billing"]["V1"][1]["content"], "b");
        let restored: FabricTrace = serde_json::from_value(value).expect("deserialize trace");
        assert_eq!(restored.query, "refund for parcel");
        assert_eq!(restored.selected_agent_ids(), vec!["billing"]);
        assert_eq!(restored.slices_per_agent["billing"]["V1"].len(), 2);
    }
}
