use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use weft_ai::{
    ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, WeftAiError,
};
use weft_fabric::{
    parse_fabric_manifest, Claim, Fabric, LlmGenerator, TraceLogger, GENERATION_FAILED_MARKER,
    NO_AGENT_RESPONSE,
};
use weft_viz::{trace_output_stem, write_trace_dot};

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

enum Scripted {
    Reply(&'static str),
    Status(u16),
}

struct ScriptedClient {
    responses: AsyncMutex<VecDeque<Scripted>>,
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: AsyncMutex::new(VecDeque::from(responses)),
            requests: AsyncMutex::new(Vec::new()),
        }
    }

    async fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .await
            .iter()
            .map(|request| request.messages[0].content.clone())
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, WeftAiError> {
        self.requests.lock().await.push(request);
        let next = self.responses.lock().await.pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(ChatResponse {
                message: Message::assistant(text),
                finish_reason: Some("stop".to_string()),
                usage: ChatUsage::default(),
            }),
            Some(Scripted::Status(status)) => Err(WeftAiError::HttpStatus {
                status,
                body: "scripted failure".to_string(),
            }),
            None => Err(WeftAiError::InvalidResponse(
                "scripted response queue exhausted".into(),
            )),
        }
    }
}

struct IsolatedWorkspace {
    root: PathBuf,
}

impl IsolatedWorkspace {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "weft-fabric-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create isolated workspace root");
        Self { root }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for IsolatedWorkspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

const SUPPORT_MANIFEST: &str = r#"{
  "schema_version": 1,
  "vaults": [
    {
      "id": "V1",
      "claims": [
        { "content": "Refunds post within 5 business days", "tags": { "topic": "billing" } },
        { "content": "Chargebacks need a phone call", "tags": { "topic": "billing", "urgent": true } },
        { "content": "Parcels ship in 2 days", "tags": { "topic": "shipping" } }
      ]
    }
  ],
  "agents": [
    { "id": "billing", "role": "Billing specialist", "vault_ids": ["V1"] },
    { "id": "shipping", "role": "Shipping specialist", "vault_ids": ["V1", "V2"] }
  ],
  "selection": {
    "mode": "keywords",
    "rules": [
      { "agent_id": "billing", "keywords": ["refund", "charge"] },
      { "agent_id": "shipping", "keywords": ["parcel", "refund"] }
    ]
  },
  "tag_rules": [
    { "keywords": ["refund"], "tags": { "topic": "billing" } },
    { "keywords": ["urgent"], "tags": { "urgent": true } }
  ],
  "agent_tag_overlays": {
    "shipping": { "topic": "shipping" }
  }
}"#;

fn build_fabric(client: Arc<ScriptedClient>) -> Fabric {
    let manifest = parse_fabric_manifest(SUPPORT_MANIFEST).expect("manifest parses");
    let generator = LlmGenerator::new(client, "gemini-pro").with_max_tokens(Some(200));
    manifest.build_fabric(Arc::new(generator))
}

#[tokio::test]
async fn integration_fabric_routes_query_through_llm_client_with_degraded_agent() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::Status(503),
        Scripted::Reply("  Your parcel ships in 2 days.  "),
    ]));
    let fabric = build_fabric(client.clone());

    let result = fabric.handle_request("Refund for my parcel").await;

    assert_eq!(
        result.response,
        format!(
            "--- Contribution from billing ---\n{GENERATION_FAILED_MARKER}\n\n\
             --- Contribution from shipping ---\nYour parcel ships in 2 days."
        )
    );
    assert_eq!(result.trace.selected_agent_ids(), vec!["billing", "shipping"]);
    assert_eq!(result.trace.base_tags.get("topic"), Some(&json!("billing")));

    let billing_slice = &result.trace.slices_per_agent["billing"]["V1"];
    assert_eq!(billing_slice.len(), 2);
    assert_eq!(billing_slice[1].content(), "Chargebacks need a phone call");
    let shipping_slices = &result.trace.slices_per_agent["shipping"];
    assert!(!shipping_slices.contains_key("V2"));
    assert_eq!(shipping_slices["V1"][0].content(), "Parcels ship in 2 days");

    let requests = client.requests.lock().await;
    assert_eq!(requests.len(), 2);
    for request in requests.iter() {
        assert_eq!(request.model, "gemini-pro");
        assert_eq!(request.max_tokens, Some(200));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, MessageRole::User);
    }
    drop(requests);

    let prompts = client.prompts().await;
    assert!(prompts[0].starts_with("Your Role: Billing specialist\n"));
    assert!(prompts[0].contains("User's Query: \"Refund for my parcel\""));
    assert!(prompts[0].contains("--- Context from V1 ---\n- Refunds post within 5 business days"));
    assert!(prompts[1].contains("- Parcels ship in 2 days"));
    assert!(!prompts[1].contains("Refunds post"));
}

#[tokio::test]
async fn integration_concurrent_request_matches_sequential_output() {
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::Reply("answer"),
        Scripted::Reply("answer"),
        Scripted::Reply("answer"),
        Scripted::Reply("answer"),
    ]));
    let fabric = build_fabric(client);

    let sequential = fabric.handle_request("refund").await;
    let concurrent = fabric.handle_request_concurrent("refund").await;

    assert_eq!(concurrent.response, sequential.response);
    assert_eq!(
        concurrent.trace.selected_agent_ids(),
        sequential.trace.selected_agent_ids()
    );
    assert_eq!(
        concurrent.trace.slices_per_agent,
        sequential.trace.slices_per_agent
    );
    assert!(concurrent
        .response
        .starts_with("--- Contribution from billing ---\n"));
}

#[tokio::test]
async fn integration_runtime_appends_reach_later_requests_and_artifacts() {
    let workspace = IsolatedWorkspace::new("artifacts");
    let client = Arc::new(ScriptedClient::new(vec![
        Scripted::Reply("first"),
        Scripted::Reply("second"),
    ]));
    let fabric = build_fabric(client.clone());

    let unmatched = fabric.handle_request("hello there").await;
    assert_eq!(unmatched.response, NO_AGENT_RESPONSE);
    assert!(client.prompts().await.is_empty());

    fabric
        .vault("V1")
        .expect("V1 registered")
        .append(
            Claim::new("Urgent charge disputes escalate to tier 2")
                .tag("topic", "billing")
                .tag("urgent", true),
        );
    let urgent = fabric.handle_request("urgent charge dispute").await;
    assert_eq!(urgent.trace.selected_agent_ids(), vec!["billing"]);
    let slice = &urgent.trace.slices_per_agent["billing"]["V1"];
    let contents = slice.iter().map(Claim::content).collect::<Vec<_>>();
    assert_eq!(
        contents,
        vec![
            "Chargebacks need a phone call",
            "Urgent charge disputes escalate to tier 2"
        ]
    );

    let logger = TraceLogger::open(workspace.root().join("trace.jsonl")).expect("open trace log");
    logger.log_trace(&unmatched.trace).expect("log unmatched");
    logger.log_trace(&urgent.trace).expect("log urgent");
    let raw = fs::read_to_string(workspace.root().join("trace.jsonl")).expect("read trace log");
    let records = raw
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("record parses"))
        .collect::<Vec<_>>();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["selected_agents"], json!([]));
    assert_eq!(records[1]["slice_counts"]["billing"]["V1"], 2);

    let diagram_path = write_trace_dot(
        workspace.root(),
        fabric.agents(),
        fabric.vaults(),
        &urgent.trace,
    )
    .expect("write diagram");
    assert_eq!(
        diagram_path,
        workspace
            .root()
            .join(format!("{}.dot", trace_output_stem("urgent charge dispute")))
    );
    let diagram = fs::read_to_string(&diagram_path).expect("read diagram");
    assert!(diagram.contains("fillcolor=whitesmoke"));
    assert!(diagram.contains("\"vault:V1\" -> \"agent:billing\""));
}
