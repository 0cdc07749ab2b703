mod agent_runner;
mod asset_provider;
mod chat_client;
mod content_extractor;
mod diagram_pipeline;
mod diagram_repair;
mod file_cache;
mod placeholder_locator;
mod refinement_loop;
mod replacement;

pub use agent_runner::{
    AgentModelRegistry, AgentRegistry, AgentRunner, AgentRunnerError, AgentSpecification,
    ExecutionError, ExecutionResult, GenerationService, Model, PopulateError,
};
pub use asset_provider::{AgentAssetProvider, AssetProvider, NOT_FOUND, resolve_assets};
pub use chat_client::{ChatCompletionClient, DEFAULT_API_BASE, DEFAULT_TIMEOUT_SECS, ServiceSettings};
pub use content_extractor::{extract_fenced, extract_tagged};
pub use diagram_pipeline::{
    DiagramPipeline, GenerationOutcome, PipelineError, PipelineOptions, ReplacementOutcome,
};
pub use diagram_repair::{DiagramRepair, RepairError, RepairRule, escape_attribute_values, repair_diagram};
pub use file_cache::{CachedGenerationService, DEFAULT_CACHE_FOLDER, FileCache};
pub use placeholder_locator::{IMAGE_MARKER, find_placeholders, find_placeholders_in};
pub use refinement_loop::{DECISION_TAG, DEFAULT_MAX_TURNS, LoopOutcome, Phase, RefinementLoop};
pub use replacement::{apply_asset, apply_assets, filter_plan, image_style};
