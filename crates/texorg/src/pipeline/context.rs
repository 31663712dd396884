//! Per-asset state threaded through the pipeline stages.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::rules::{AssetRule, FileRule};

/// Status of one map through per-map processing and the conversion stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MapStatus {
    Pending,
    Processed,
    SourceNotFound,
    LoadFailed,
    SaveFailed,
    Failed,
    Skipped,
}

impl MapStatus {
    pub fn is_processed(self) -> bool {
        matches!(self, MapStatus::Processed)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            MapStatus::SourceNotFound | MapStatus::LoadFailed | MapStatus::SaveFailed | MapStatus::Failed
        )
    }
}

impl fmt::Display for MapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MapStatus::Pending => "Pending",
            MapStatus::Processed => "Processed",
            MapStatus::SourceNotFound => "Source Not Found",
            MapStatus::LoadFailed => "Load Failed",
            MapStatus::SaveFailed => "Save Failed",
            MapStatus::Failed => "Failed",
            MapStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// Everything the pipeline records about one map while it moves through
/// the run temp directory toward the output tree.
#[derive(Debug, Clone)]
pub struct MapDetail {
    pub status: MapStatus,
    pub map_type: String,
    pub source_file: Option<PathBuf>,
    pub temp_file: Option<PathBuf>,
    pub original_dimensions: Option<(u32, u32)>,
    pub processed_dimensions: Option<(u32, u32)>,
    pub resolution_key: Option<String>,
    pub final_outputs: Vec<PathBuf>,
    pub original_map_type_before_conversion: Option<String>,
    pub notes: Vec<String>,
}

impl MapDetail {
    pub fn new(map_type: impl Into<String>) -> Self {
        Self {
            status: MapStatus::Pending,
            map_type: map_type.into(),
            source_file: None,
            temp_file: None,
            original_dimensions: None,
            processed_dimensions: None,
            resolution_key: None,
            final_outputs: Vec::new(),
            original_map_type_before_conversion: None,
            notes: Vec::new(),
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Named error and skip flags. Stages raise these instead of propagating
/// errors so one bad map never takes the whole asset down unannounced.
#[derive(Debug, Clone, Default)]
pub struct StatusFlags {
    pub skip_asset: bool,
    pub skip_reason: Option<String>,
    pub supplier_error: bool,
    pub map_processing_error: bool,
    pub merge_error: bool,
    pub output_organization_error: bool,
    pub metadata_save_error: bool,
    /// Name of a stage that returned a hard error, if any.
    pub failed_stage: Option<String>,
}

impl StatusFlags {
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skip_asset = true;
        self.skip_reason = Some(reason.into());
    }

    pub fn any_error(&self) -> bool {
        self.map_processing_error
            || self.merge_error
            || self.output_organization_error
            || self.metadata_save_error
            || self.failed_stage.is_some()
    }
}

/// Final classification of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    Pending,
    Processed,
    Skipped,
    Failed(FailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    Stage(String),
    MapProcessing,
    Merge,
    OutputOrganization,
    MetadataSave,
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetStatus::Pending => f.write_str("Pending"),
            AssetStatus::Processed => f.write_str("Processed"),
            AssetStatus::Skipped => f.write_str("Skipped"),
            AssetStatus::Failed(kind) => match kind {
                FailureKind::Stage(name) => write!(f, "Failed (Stage {})", name),
                FailureKind::MapProcessing => f.write_str("Failed (Map Processing Error)"),
                FailureKind::Merge => f.write_str("Failed (Merge Error)"),
                FailureKind::OutputOrganization => {
                    f.write_str("Failed (Output Organization Error)")
                }
                FailureKind::MetadataSave => f.write_str("Failed (Metadata Save Error)"),
            },
        }
    }
}

/// One map entry in the persisted metadata, keyed by friendly map type.
/// Variants are an object keyed by resolution key, one filename each.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MapEntry {
    pub internal_map_type: String,
    pub variant_paths: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_map_type_before_conversion: Option<String>,
}

/// Metadata persisted next to the organized maps. `final_output_files`
/// is working state and is dropped at serialization time.
#[derive(Debug, Clone, Serialize)]
pub struct AssetMetadata {
    pub asset_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    pub supplier: String,
    pub status: String,
    pub processing_started: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_finished: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incrementing_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha5: Option<String>,
    pub maps: BTreeMap<String, MapEntry>,
    #[serde(skip_serializing)]
    pub final_output_files: Vec<PathBuf>,
    #[serde(flatten)]
    pub common_metadata: serde_json::Map<String, serde_json::Value>,
}

impl AssetMetadata {
    pub fn empty(asset_name: &str) -> Self {
        Self {
            asset_name: asset_name.to_string(),
            asset_type: None,
            supplier: String::new(),
            status: AssetStatus::Pending.to_string(),
            processing_started: Utc::now(),
            processing_finished: None,
            incrementing_value: None,
            sha5: None,
            maps: BTreeMap::new(),
            final_output_files: Vec::new(),
            common_metadata: serde_json::Map::new(),
        }
    }
}

/// State for a single asset, owned for the duration of its trip through
/// the stage sequence.
#[derive(Debug, Clone)]
pub struct AssetContext {
    pub config: Arc<Config>,
    pub asset_rule: AssetRule,

    pub supplier_identifier: Option<String>,
    pub supplier_override: Option<String>,
    pub effective_supplier: Option<String>,

    pub workspace_path: PathBuf,
    pub engine_temp_dir: PathBuf,
    pub output_base_path: PathBuf,
    pub overwrite: bool,

    pub incrementing_value: Option<String>,
    pub sha5_value: Option<String>,

    pub metadata: AssetMetadata,
    /// Per-map results keyed by `FileRule` id; includes synthetic rules
    /// added by the conversion stages.
    pub processed_maps: BTreeMap<String, MapDetail>,
    /// Merge results keyed by the merge rule's id.
    pub merged_maps: BTreeMap<String, MapDetail>,
    pub files_to_process: Vec<FileRule>,
    pub flags: StatusFlags,
}

impl AssetContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        asset_rule: AssetRule,
        supplier_identifier: Option<String>,
        supplier_override: Option<String>,
        workspace_path: PathBuf,
        engine_temp_dir: PathBuf,
        output_base_path: PathBuf,
        overwrite: bool,
        incrementing_value: Option<String>,
        sha5_value: Option<String>,
    ) -> Self {
        let metadata = AssetMetadata::empty(&asset_rule.asset_name);
        Self {
            config,
            asset_rule,
            supplier_identifier,
            supplier_override,
            effective_supplier: None,
            workspace_path,
            engine_temp_dir,
            output_base_path,
            overwrite,
            incrementing_value,
            sha5_value,
            metadata,
            processed_maps: BTreeMap::new(),
            merged_maps: BTreeMap::new(),
            files_to_process: Vec::new(),
            flags: StatusFlags::default(),
        }
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_rule.asset_name
    }

    pub fn supplier_or_unknown(&self) -> &str {
        self.effective_supplier.as_deref().unwrap_or("UnknownSupplier")
    }

    /// Derives the asset's final status from the accumulated flags.
    pub fn asset_status(&self) -> AssetStatus {
        if self.flags.skip_asset {
            return AssetStatus::Skipped;
        }
        if let Some(stage) = &self.flags.failed_stage {
            return AssetStatus::Failed(FailureKind::Stage(stage.clone()));
        }
        if self.flags.metadata_save_error {
            return AssetStatus::Failed(FailureKind::MetadataSave);
        }
        if self.flags.output_organization_error {
            return AssetStatus::Failed(FailureKind::OutputOrganization);
        }
        if self.flags.merge_error {
            return AssetStatus::Failed(FailureKind::Merge);
        }
        if self.flags.map_processing_error {
            return AssetStatus::Failed(FailureKind::MapProcessing);
        }
        AssetStatus::Processed
    }

    /// Iterates processed and merged map details together, the order the
    /// output stages consume them in.
    pub fn all_map_details(&self) -> impl Iterator<Item = (&String, &MapDetail)> {
        self.processed_maps.iter().chain(self.merged_maps.iter())
    }
}
