use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default overwrite policy; a per-run option can override it.
    #[serde(default)]
    pub overwrite_existing: bool,

    #[serde(default = "default_directory_pattern")]
    pub output_directory_pattern: String,

    #[serde(default = "default_filename_pattern")]
    pub output_filename_pattern: String,

    /// Suffix of the per-asset metadata file. The asset name is prepended,
    /// so "metadata.json" yields "Rock01_metadata.json".
    #[serde(default = "default_metadata_filename")]
    pub metadata_filename: String,

    /// Subdirectory (inside the asset directory) for EXTRA files.
    #[serde(default = "default_extra_files_subdir")]
    pub extra_files_subdir: String,

    #[serde(default = "default_temp_dir_prefix")]
    pub temp_dir_prefix: String,

    /// Invert the green channel of every processed normal map (DirectX
    /// versus OpenGL convention).
    #[serde(default)]
    pub invert_normal_green: bool,

    /// Internal map type -> definition, keyed by the "MAP_*" base type.
    #[serde(default = "default_file_type_definitions")]
    pub file_type_definitions: HashMap<String, FileTypeDefinition>,

    /// Base map types (without the "MAP_" prefix) that receive a "-1"
    /// suffix even when they occur only once in an asset.
    #[serde(default)]
    pub respect_variant_map_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypeDefinition {
    /// Filename-friendly alias, e.g. "COL" for "MAP_COL".
    pub standard_type: String,
}

fn default_directory_pattern() -> String {
    "[assetname]".to_string()
}

fn default_filename_pattern() -> String {
    "[assetname]_[maptype]_[resolution].[ext]".to_string()
}

fn default_metadata_filename() -> String {
    "metadata.json".to_string()
}

fn default_extra_files_subdir() -> String {
    "Extra".to_string()
}

fn default_temp_dir_prefix() -> String {
    "texorg_".to_string()
}

fn default_file_type_definitions() -> HashMap<String, FileTypeDefinition> {
    let mut defs = HashMap::new();
    for (internal, standard) in [
        ("MAP_COL", "COL"),
        ("MAP_ALBEDO", "ALBEDO"),
        ("MAP_GLOSS", "GLOSS"),
        ("MAP_ROUGH", "ROUGH"),
        ("MAP_NRM", "NRM"),
        ("MAP_MASK", "MASK"),
        ("MAP_AO", "AO"),
        ("MAP_METAL", "METAL"),
        ("MAP_DISP", "DISP"),
    ] {
        defs.insert(
            internal.to_string(),
            FileTypeDefinition {
                standard_type: standard.to_string(),
            },
        );
    }
    defs
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overwrite_existing: false,
            output_directory_pattern: default_directory_pattern(),
            output_filename_pattern: default_filename_pattern(),
            metadata_filename: default_metadata_filename(),
            extra_files_subdir: default_extra_files_subdir(),
            temp_dir_prefix: default_temp_dir_prefix(),
            invert_normal_green: false,
            file_type_definitions: default_file_type_definitions(),
            respect_variant_map_types: Vec::new(),
        }
    }
}
