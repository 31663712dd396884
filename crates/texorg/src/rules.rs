//! Declarative rule structures describing how source files map to assets.
//!
//! A `SourceRule` covers one input (an extracted archive or folder) and owns
//! a list of `AssetRule`s; each asset owns the `FileRule`s for its maps.
//! Rules are plain data, produced by whatever front end builds them and
//! consumed by the pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRule {
    pub input_path: String,

    #[serde(default)]
    pub supplier_identifier: Option<String>,

    /// User override; wins over the detected identifier.
    #[serde(default)]
    pub supplier_override: Option<String>,

    #[serde(default)]
    pub preset_name: Option<String>,

    #[serde(default)]
    pub assets: Vec<AssetRule>,
}

impl SourceRule {
    pub fn effective_supplier(&self) -> Option<&str> {
        self.supplier_override
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self
                .supplier_identifier
                .as_deref()
                .filter(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessStatus {
    Skip,
    Processed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRule {
    pub asset_name: String,

    #[serde(default)]
    pub asset_type: Option<String>,

    #[serde(default)]
    pub asset_type_override: Option<String>,

    /// Set by a previous run or by the user to exclude the asset.
    #[serde(default)]
    pub process_status: Option<ProcessStatus>,

    #[serde(default)]
    pub files: Vec<FileRule>,

    /// Free-form metadata carried verbatim into the asset's metadata file.
    #[serde(default)]
    pub common_metadata: serde_json::Map<String, serde_json::Value>,
}

impl AssetRule {
    pub fn effective_type(&self) -> Option<&str> {
        self.asset_type_override.as_deref().or(self.asset_type.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    #[default]
    Fit,
    Stretch,
}

/// Channel order of the decoded source pixels. Sources exported by
/// OpenCV-style tooling store BGR and need a red/blue swap after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorOrder {
    #[default]
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRule {
    #[serde(default = "new_rule_id")]
    pub id: String,

    /// Filename or glob pattern relative to the workspace root.
    pub file_path: String,

    /// Internal item type, e.g. "MAP_COL", "EXTRA", "FILE_IGNORE".
    pub item_type: String,

    #[serde(default)]
    pub item_type_override: Option<String>,

    /// Set by rule-building front ends when a file is moved to another
    /// asset; the pipeline expects rules already grouped under their
    /// final asset and carries the field through untouched.
    #[serde(default)]
    pub target_asset_name_override: Option<String>,

    /// Target (width, height); None keeps source dimensions.
    #[serde(default)]
    pub resolution_override: Option<(u32, u32)>,

    #[serde(default)]
    pub resize_mode: ResizeMode,

    #[serde(default)]
    pub ensure_pot: bool,

    #[serde(default)]
    pub allow_upscale: bool,

    #[serde(default)]
    pub source_color_order: ColorOrder,

    /// Output file extension without dot; None keeps the source extension.
    #[serde(default)]
    pub output_format_override: Option<String>,

    #[serde(default)]
    pub merge_instructions: Option<MergeInstructions>,
}

fn new_rule_id() -> String {
    Uuid::new_v4().to_string()
}

impl FileRule {
    pub fn new(file_path: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self {
            id: new_rule_id(),
            file_path: file_path.into(),
            item_type: item_type.into(),
            item_type_override: None,
            target_asset_name_override: None,
            resolution_override: None,
            resize_mode: ResizeMode::default(),
            ensure_pot: false,
            allow_upscale: false,
            source_color_order: ColorOrder::default(),
            output_format_override: None,
            merge_instructions: None,
        }
    }

    pub fn effective_type(&self) -> &str {
        self.item_type_override
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.item_type)
    }

    pub fn is_ignore(&self) -> bool {
        self.effective_type() == "FILE_IGNORE"
    }

    pub fn is_extra(&self) -> bool {
        self.effective_type() == "EXTRA"
    }

    pub fn is_merge(&self) -> bool {
        self.effective_type() == "MAP_MERGE" || self.merge_instructions.is_some()
    }

    /// True for map rules handled by per-map processing. Merge rules have
    /// their own pass, EXTRA files are copied verbatim.
    pub fn is_processable(&self) -> bool {
        self.effective_type().starts_with("MAP_") && !self.is_merge()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeInstructions {
    /// Internal map type of the merged output, e.g. "MAP_ORM".
    pub output_map_type: String,

    /// Channel count of the output image; 1 produces a grayscale map.
    pub output_channels: u8,

    /// Inputs in declaration order; the first input that loads establishes
    /// the output dimensions.
    pub inputs: Vec<MergeInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeInput {
    /// Id of the `FileRule` whose processed result feeds this channel.
    pub source_rule_id: String,

    /// Channel index to read from the source image.
    #[serde(default)]
    pub source_channel: u8,

    /// Channel index to write in the merged output.
    pub target_channel: u8,

    #[serde(default)]
    pub invert: bool,

    /// Fill value when the source map is missing or unprocessed.
    #[serde(default)]
    pub default_value: u8,
}
