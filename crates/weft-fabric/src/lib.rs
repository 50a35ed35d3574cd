//! Agent fabric: routes a query to selected agents, each reading tag-filtered
//! slices of shared vaults, and joins their partial answers with a trace.

pub mod agent;
pub mod claim;
pub mod fabric;
pub mod generator;
pub mod manifest;
pub mod strategy;
pub mod trace;
pub mod vault;

pub use agent::{Agent, Slices, SlicesIter, NO_CONTEXT_MARKER};
pub use claim::{Claim, Tags};
pub use fabric::{Fabric, FabricBuilder, FabricResponse, NO_AGENT_RESPONSE};
pub use generator::{GenerationOutcome, Generator, LlmGenerator, GENERATION_FAILED_MARKER};
pub use manifest::{
    load_fabric_manifest, parse_fabric_manifest, FabricManifest, ManifestAgent, ManifestClaim,
    ManifestSelection, ManifestVault, SelectionMode, FABRIC_MANIFEST_SCHEMA_VERSION,
};
pub use strategy::{
    AgentRegistry, AgentTagOverlay, KeywordRule, KeywordSelector, KeywordTagDeriver, NoTags,
    PassThrough, SelectAll, Selector, TagAugmenter, TagDeriver, TagRule,
};
pub use trace::{
    trace_record_json, FabricTrace, TraceLogger, FABRIC_TRACE_RECORD_TYPE,
    FABRIC_TRACE_SCHEMA_VERSION,
};
pub use vault::{Vault, DEFAULT_RETRIEVE_LIMIT};
