//! Moves processed maps out of the run temp directory into the final
//! output tree, naming them from the configured patterns.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::error::StageError;
use crate::pattern;
use crate::pipeline::context::{AssetContext, MapEntry};
use crate::pipeline::stages::{short_circuit_skipped, Stage};
use crate::storage;

pub struct OutputOrganization;

const STAGE_NAME: &str = "OutputOrganization";

/// Tokens shared by every path built for this asset.
fn asset_tokens(ctx: &AssetContext) -> HashMap<String, String> {
    let mut tokens = HashMap::new();
    tokens.insert(
        "assetname".to_string(),
        pattern::sanitize_filename(ctx.asset_name()),
    );
    tokens.insert("supplier".to_string(), ctx.supplier_or_unknown().to_string());
    if let Some(value) = &ctx.incrementing_value {
        tokens.insert("incrementingvalue".to_string(), value.clone());
    }
    if let Some(value) = &ctx.sha5_value {
        tokens.insert("sha5".to_string(), value.clone());
    }
    if let Some(asset_type) = ctx.asset_rule.effective_type() {
        tokens.insert("assettype".to_string(), asset_type.to_string());
    }
    tokens
}

/// Resolves the asset's organized directory from the directory pattern.
/// A pattern that cannot resolve with asset-level tokens falls back to a
/// sanitized asset name directory so the metadata still has a home.
pub(crate) fn asset_directory(ctx: &AssetContext) -> PathBuf {
    let tokens = asset_tokens(ctx);
    match pattern::generate_path_from_pattern(&ctx.config.output_directory_pattern, &tokens) {
        Ok(relative) => ctx.output_base_path.join(relative),
        Err(e) => {
            warn!(
                asset = %ctx.asset_name(),
                pattern = %ctx.config.output_directory_pattern,
                error = %e,
                "directory pattern failed with asset-level tokens, using asset name"
            );
            ctx.output_base_path
                .join(pattern::sanitize_filename(ctx.asset_name()))
        }
    }
}

impl Stage for OutputOrganization {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if short_circuit_skipped(ctx, STAGE_NAME) {
            return Ok(());
        }

        let keys: Vec<(String, bool)> = ctx
            .all_map_details()
            .filter(|(_, d)| d.status.is_processed() && d.temp_file.is_some())
            .map(|(key, _)| (key.clone(), ctx.merged_maps.contains_key(key)))
            .collect();

        for (key, merged) in keys {
            if let Err(note) = organize_map(ctx, &key, merged) {
                error!(asset = %ctx.asset_name(), map = %key, error = %note, "output organization failed for map");
                ctx.flags.output_organization_error = true;
                let detail = if merged {
                    ctx.merged_maps.get_mut(&key)
                } else {
                    ctx.processed_maps.get_mut(&key)
                };
                if let Some(detail) = detail {
                    detail.note(note);
                }
            }
        }

        organize_extra_files(ctx);
        Ok(())
    }
}

fn organize_map(ctx: &mut AssetContext, key: &str, merged: bool) -> Result<(), String> {
    let detail = if merged {
        ctx.merged_maps.get(key)
    } else {
        ctx.processed_maps.get(key)
    };
    let Some(detail) = detail else {
        return Err("map detail disappeared".to_string());
    };
    let Some(temp_file) = detail.temp_file.clone() else {
        return Err("processed map has no temp file".to_string());
    };

    let friendly =
        pattern::filename_friendly_map_type(&detail.map_type, &ctx.config.file_type_definitions);
    let extension = temp_file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    let resolution = detail
        .resolution_key
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let internal_type = detail.map_type.clone();
    let converted_from = detail.original_map_type_before_conversion.clone();

    let mut tokens = asset_tokens(ctx);
    tokens.insert("maptype".to_string(), friendly.clone());
    tokens.insert("resolution".to_string(), resolution.clone());
    tokens.insert("ext".to_string(), extension);

    let directory = pattern::generate_path_from_pattern(&ctx.config.output_directory_pattern, &tokens)
        .map_err(|e| format!("directory pattern failed: {}", e))?;
    let filename = pattern::generate_path_from_pattern(&ctx.config.output_filename_pattern, &tokens)
        .map_err(|e| format!("filename pattern failed: {}", e))?;

    let destination = ctx.output_base_path.join(directory).join(filename);
    let outcome = storage::copy_file(&temp_file, &destination, ctx.overwrite)
        .map_err(|e| e.to_string())?;
    match outcome {
        storage::CopyOutcome::Copied => {
            info!(asset = %ctx.asset_name(), map = %internal_type, destination = %destination.display(), "map organized");
        }
        storage::CopyOutcome::SkippedExisting => {
            debug!(asset = %ctx.asset_name(), destination = %destination.display(), "destination exists, copy skipped");
        }
    }

    // The destination is recorded even when the copy was skipped so a
    // re-run with overwrite disabled still yields complete metadata.
    let entry = ctx
        .metadata
        .maps
        .entry(friendly)
        .or_insert_with(MapEntry::default);
    entry.internal_map_type = internal_type;
    entry
        .variant_paths
        .insert(resolution, destination.display().to_string());
    if entry.original_map_type_before_conversion.is_none() {
        entry.original_map_type_before_conversion = converted_from;
    }
    ctx.metadata.final_output_files.push(destination.clone());

    let detail = if merged {
        ctx.merged_maps.get_mut(key)
    } else {
        ctx.processed_maps.get_mut(key)
    };
    if let Some(detail) = detail {
        detail.final_outputs.push(destination);
    }
    Ok(())
}

/// EXTRA files copy verbatim into a subdirectory of the asset directory.
fn organize_extra_files(ctx: &mut AssetContext) {
    let extras: Vec<PathBuf> = ctx
        .files_to_process
        .iter()
        .filter(|rule| rule.is_extra())
        .map(|rule| PathBuf::from(&rule.file_path))
        .collect();
    if extras.is_empty() {
        return;
    }

    let extra_dir = asset_directory(ctx).join(&ctx.config.extra_files_subdir);
    for relative in extras {
        let source = if relative.is_absolute() {
            relative.clone()
        } else {
            ctx.workspace_path.join(&relative)
        };
        if !source.is_file() {
            warn!(asset = %ctx.asset_name(), path = %source.display(), "extra file not found");
            ctx.flags.output_organization_error = true;
            continue;
        }
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let destination = extra_dir.join(file_name);
        match storage::copy_file(&source, &destination, ctx.overwrite) {
            Ok(_) => {
                ctx.metadata.final_output_files.push(destination);
            }
            Err(e) => {
                error!(asset = %ctx.asset_name(), path = %source.display(), error = %e, "extra file copy failed");
                ctx.flags.output_organization_error = true;
            }
        }
    }
}
