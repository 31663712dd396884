//! The asset pipeline: per-asset context, the stage sequence, map
//! processing, merges, and the orchestrator that drives them.

pub mod context;
pub mod map_processor;
pub mod merge;
pub mod orchestrator;
pub mod stages;

pub use context::{AssetContext, AssetMetadata, AssetStatus, MapDetail, MapStatus};
pub use orchestrator::{PipelineOrchestrator, RunSummary};
