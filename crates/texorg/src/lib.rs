//! texorg processes texture asset deliveries into an organized output
//! library.
//!
//! A run takes a [`SourceRule`] describing one extracted delivery, walks
//! each of its assets through a fixed stage sequence (supplier
//! resolution, skip logic, per-map processing, conversions, channel
//! merges, output organization, metadata save) and returns a
//! [`RunSummary`] of processed, skipped and failed assets. Work happens
//! in a run-scoped temp directory; only organized outputs and metadata
//! land under the output base path.

pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod imaging;
pub mod pattern;
pub mod pipeline;
pub mod rules;
pub mod storage;

pub use config::{load_config, load_config_from_str, Config, FileTypeDefinition};
pub use engine::{ProcessOptions, ProcessingEngine};
pub use error::{Result, TexorgError};
pub use pipeline::RunSummary;
pub use rules::{AssetRule, FileRule, MergeInput, MergeInstructions, SourceRule};
