use tracing::{error, info};

use crate::error::StageError;
use crate::imaging;
use crate::pipeline::context::AssetContext;
use crate::pipeline::stages::{short_circuit_skipped, Stage};

const GLOSS_PREFIX: &str = "MAP_GLOSS";
const ROUGH_PREFIX: &str = "MAP_ROUGH";

/// Converts processed gloss maps to roughness by inverting them. The
/// detail keeps its original type in `original_map_type_before_conversion`
/// so downstream consumers can tell a converted map from a native one.
/// Conversion failures are logged and noted only; the map keeps its
/// gloss temp file and the asset is not downgraded.
pub struct GlossToRough;

impl Stage for GlossToRough {
    fn name(&self) -> &'static str {
        "GlossToRough"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if short_circuit_skipped(ctx, self.name()) {
            return Ok(());
        }

        let keys: Vec<String> = ctx
            .processed_maps
            .iter()
            .filter(|(_, d)| d.status.is_processed() && d.map_type.starts_with(GLOSS_PREFIX))
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            let (temp_file, old_type) = {
                let detail = &ctx.processed_maps[&key];
                match &detail.temp_file {
                    Some(path) => (path.clone(), detail.map_type.clone()),
                    None => continue,
                }
            };

            let suffix = old_type.strip_prefix(GLOSS_PREFIX).unwrap_or_default();
            let new_type = format!("{}{}", ROUGH_PREFIX, suffix);

            let mut image = match imaging::load_image(&temp_file) {
                Ok(image) => image,
                Err(e) => {
                    error!(asset = %ctx.asset_name(), path = %temp_file.display(), error = %e, "gloss conversion load failed");
                    if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                        detail.note(format!("Gloss conversion load failed: {}", e));
                    }
                    continue;
                }
            };
            image.invert();

            let extension = temp_file
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("png")
                .to_string();
            let out_path = ctx
                .engine_temp_dir
                .join(format!("rough_from_gloss_{}.{}", key, extension));

            if let Err(e) = imaging::save_image(&out_path, &image) {
                error!(asset = %ctx.asset_name(), path = %out_path.display(), error = %e, "gloss conversion save failed");
                if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                    detail.note(format!("Gloss conversion save failed: {}", e));
                }
                continue;
            }

            if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                detail.original_map_type_before_conversion = Some(old_type.clone());
                detail.map_type = new_type.clone();
                detail.temp_file = Some(out_path);
                detail.note("Converted gloss to roughness by inversion");
            }
            if let Some(rule) = ctx.files_to_process.iter_mut().find(|r| r.id == key) {
                rule.item_type_override = Some(new_type.clone());
            }

            info!(asset = %ctx.asset_name(), from = %old_type, to = %new_type, "gloss map converted");
        }

        Ok(())
    }
}
