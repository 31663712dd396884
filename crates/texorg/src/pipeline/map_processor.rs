//! Per-map processing: locate, load, transform, and stage each regular
//! map into the run temp directory.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::imaging::{self, MapImage, PixelData};
use crate::pipeline::context::{AssetContext, MapDetail, MapStatus};
use crate::rules::{ColorOrder, FileRule};

/// A map staged for saving: the outcome of loading and transforming one
/// `FileRule`, before it is written to the temp directory.
pub struct ProcessingItem {
    pub source_rule_id: String,
    pub map_type: String,
    pub image: MapImage,
    pub original_dimensions: (u32, u32),
    pub resolution_key: String,
    pub temp_filename: String,
}

/// Runs every processable file rule through the load/transform/save
/// sequence. Failures are per-map: the detail records the failure and
/// the remaining maps still run.
pub fn process_individual_maps(ctx: &mut AssetContext) {
    let rules: Vec<FileRule> = ctx
        .files_to_process
        .iter()
        .filter(|r| r.is_processable())
        .cloned()
        .collect();

    info!(asset = %ctx.asset_name(), maps = rules.len(), "processing individual maps");

    for rule in rules {
        let detail = process_file_rule(ctx, &rule);
        if detail.status.is_failure() {
            ctx.flags.map_processing_error = true;
        }
        ctx.processed_maps.insert(rule.id.clone(), detail);
    }
}

fn process_file_rule(ctx: &AssetContext, rule: &FileRule) -> MapDetail {
    let map_type = suffixed_map_type(ctx, rule);
    let mut detail = MapDetail::new(map_type.clone());

    let Some(source_path) = find_source_file(&ctx.workspace_path, &rule.file_path) else {
        warn!(
            asset = %ctx.asset_name(),
            pattern = %rule.file_path,
            "no source file matches rule"
        );
        detail.status = MapStatus::SourceNotFound;
        detail.note(format!("No file matching '{}' in workspace", rule.file_path));
        return detail;
    };
    detail.source_file = Some(source_path.clone());

    let mut image = match imaging::load_image(&source_path) {
        Ok(image) => image,
        Err(e) => {
            error!(asset = %ctx.asset_name(), path = %source_path.display(), error = %e, "image load failed");
            detail.status = MapStatus::LoadFailed;
            detail.note(e.to_string());
            return detail;
        }
    };

    let original = image.dimensions();
    detail.original_dimensions = Some(original);

    let target = rule.resolution_override.unwrap_or(original);
    let (tw, th) = imaging::calculate_target_dimensions(
        original,
        target,
        rule.resize_mode,
        rule.ensure_pot,
        rule.allow_upscale,
    );
    if (tw, th) != original {
        debug!(
            asset = %ctx.asset_name(),
            map_type = %map_type,
            from = ?original,
            to = ?(tw, th),
            "resizing map"
        );
        image = imaging::resize_image(&image, tw, th);
        detail.note(format!(
            "Resized from {}x{} to {}x{}",
            original.0, original.1, tw, th
        ));
    }
    detail.processed_dimensions = Some((tw, th));

    if rule.source_color_order == ColorOrder::Bgr && image.channels >= 3 {
        image.swap_red_blue();
        detail.note("Swapped red/blue channels (BGR source)");
    }

    let mut extension = rule
        .output_format_override
        .clone()
        .or_else(|| {
            source_path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
        })
        .unwrap_or_else(|| "png".to_string());
    if matches!(image.data, PixelData::F32(_)) && !extension.eq_ignore_ascii_case("exr") {
        detail.note(format!("Float pixel data forces exr (was {})", extension));
        extension = "exr".to_string();
    }

    let item = ProcessingItem {
        source_rule_id: rule.id.clone(),
        map_type: map_type.clone(),
        resolution_key: imaging::resolution_key(tw, th),
        original_dimensions: original,
        temp_filename: format!("processed_{}_{}.{}", map_type, rule.id, extension),
        image,
    };

    let temp_path = ctx.engine_temp_dir.join(&item.temp_filename);
    if let Err(e) = imaging::save_image(&temp_path, &item.image) {
        error!(asset = %ctx.asset_name(), path = %temp_path.display(), error = %e, "temp save failed");
        detail.status = MapStatus::SaveFailed;
        detail.temp_file = Some(temp_path);
        detail.note(e.to_string());
        return detail;
    }

    detail.status = MapStatus::Processed;
    detail.temp_file = Some(temp_path);
    detail.resolution_key = Some(item.resolution_key);
    info!(
        asset = %ctx.asset_name(),
        map_type = %map_type,
        source = %source_path.display(),
        "map processed"
    );
    detail
}

/// Resolves the rule's filename or glob pattern against the workspace,
/// returning the first matching regular file.
fn find_source_file(workspace: &Path, file_pattern: &str) -> Option<PathBuf> {
    let direct = workspace.join(file_pattern);
    if direct.is_file() {
        return Some(direct);
    }

    let pattern = format!("{}/{}", workspace.display(), file_pattern);
    let mut matches: Vec<PathBuf> = glob::glob(&pattern)
        .ok()?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// Appends an instance suffix when the asset carries several rules of the
/// same base map type: "MAP_COL" becomes "MAP_COL-2" for the second
/// occurrence. A single occurrence is suffixed "-1" only for base types
/// listed in `respect_variant_map_types`.
fn suffixed_map_type(ctx: &AssetContext, rule: &FileRule) -> String {
    let initial = rule.effective_type().to_string();

    let Ok(base_re) = Regex::new(r"^(MAP_[A-Z]+)") else {
        return initial;
    };
    let Some(caps) = base_re.captures(&initial) else {
        return initial;
    };
    let base = caps[1].to_string();

    let peers: Vec<&FileRule> = ctx
        .asset_rule
        .files
        .iter()
        .filter(|r| {
            base_re
                .captures(r.effective_type())
                .map(|c| c[1] == base)
                .unwrap_or(false)
        })
        .collect();

    let index = peers.iter().position(|r| r.id == rule.id).map(|i| i + 1);
    let respect = ctx
        .config
        .respect_variant_map_types
        .iter()
        .any(|t| t == base.trim_start_matches("MAP_"));

    match (peers.len(), index) {
        (n, Some(i)) if n > 1 => format!("{}-{}", base, i),
        (1, Some(_)) if respect => format!("{}-1", base),
        _ => initial,
    }
}
