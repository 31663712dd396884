use tracing::{debug, error, info};

use crate::error::StageError;
use crate::imaging;
use crate::pipeline::context::{AssetContext, MapDetail, MapStatus};
use crate::pipeline::stages::{short_circuit_skipped, Stage};
use crate::rules::FileRule;

/// Derives a mask map from the alpha channel of the first processed
/// 4-channel color map, unless the asset already has a mask. The synthetic
/// map gets its own rule so the output stages treat it like any other.
pub struct AlphaExtractionToMask;

impl Stage for AlphaExtractionToMask {
    fn name(&self) -> &'static str {
        "AlphaExtractionToMask"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if short_circuit_skipped(ctx, self.name()) {
            return Ok(());
        }

        let has_mask = ctx
            .processed_maps
            .values()
            .any(|d| d.map_type.starts_with("MAP_MASK"))
            || ctx
                .files_to_process
                .iter()
                .any(|r| r.effective_type().starts_with("MAP_MASK"));
        if has_mask {
            debug!(asset = %ctx.asset_name(), "mask already present, nothing to extract");
            return Ok(());
        }

        let candidate = ctx
            .processed_maps
            .iter()
            .filter(|(_, d)| {
                d.status.is_processed()
                    && (d.map_type.starts_with("MAP_COL") || d.map_type.starts_with("MAP_ALBEDO"))
            })
            .find_map(|(k, d)| d.temp_file.clone().map(|p| (k.clone(), p)));

        let Some((source_key, temp_file)) = candidate else {
            debug!(asset = %ctx.asset_name(), "no processed color map, no mask extraction");
            return Ok(());
        };

        let image = match imaging::load_image(&temp_file) {
            Ok(image) => image,
            Err(e) => {
                error!(asset = %ctx.asset_name(), path = %temp_file.display(), error = %e, "mask extraction load failed");
                ctx.flags.map_processing_error = true;
                return Ok(());
            }
        };
        if image.channels != 4 {
            debug!(
                asset = %ctx.asset_name(),
                channels = image.channels,
                "color map has no alpha channel, no mask extraction"
            );
            return Ok(());
        }

        let Some(mask) = image.extract_channel(3) else {
            return Ok(());
        };

        let extension = temp_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("png")
            .to_string();
        let mask_path = ctx
            .engine_temp_dir
            .join(format!("mask_from_alpha_{}.{}", source_key, extension));

        if let Err(e) = imaging::save_image(&mask_path, &mask) {
            error!(asset = %ctx.asset_name(), path = %mask_path.display(), error = %e, "mask save failed");
            ctx.flags.map_processing_error = true;
            return Ok(());
        }

        let mask_rule = FileRule::new("", "MAP_MASK");
        let mut detail = MapDetail::new("MAP_MASK");
        detail.status = MapStatus::Processed;
        detail.temp_file = Some(mask_path);
        detail.original_dimensions = Some(mask.dimensions());
        detail.processed_dimensions = Some(mask.dimensions());
        detail.resolution_key = Some(imaging::resolution_key(mask.width, mask.height));
        detail.note(format!("Extracted from alpha channel of '{}'", source_key));

        info!(asset = %ctx.asset_name(), source = %source_key, "mask extracted from alpha channel");
        ctx.processed_maps.insert(mask_rule.id.clone(), detail);
        ctx.files_to_process.push(mask_rule);

        Ok(())
    }
}
