use tracing::{debug, error, info};

use crate::error::StageError;
use crate::imaging;
use crate::pipeline::context::AssetContext;
use crate::pipeline::stages::{short_circuit_skipped, Stage};

/// Inverts the green channel of every processed normal map, switching
/// between DirectX and OpenGL conventions. Gated on the config flag.
/// Failures are logged and noted on the detail only; the map keeps its
/// uninverted temp file and the asset is not downgraded.
pub struct NormalGreenChannel;

impl Stage for NormalGreenChannel {
    fn name(&self) -> &'static str {
        "NormalGreenChannel"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if short_circuit_skipped(ctx, self.name()) {
            return Ok(());
        }
        if !ctx.config.invert_normal_green {
            debug!(asset = %ctx.asset_name(), "normal green inversion disabled");
            return Ok(());
        }

        let keys: Vec<String> = ctx
            .processed_maps
            .iter()
            .filter(|(_, d)| d.status.is_processed() && d.map_type.starts_with("MAP_NRM"))
            .map(|(k, _)| k.clone())
            .collect();

        for key in keys {
            let Some(temp_file) = ctx.processed_maps[&key].temp_file.clone() else {
                continue;
            };

            let mut image = match imaging::load_image(&temp_file) {
                Ok(image) => image,
                Err(e) => {
                    error!(asset = %ctx.asset_name(), path = %temp_file.display(), error = %e, "normal map load failed");
                    if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                        detail.note(format!("Green inversion load failed: {}", e));
                    }
                    continue;
                }
            };

            if image.channels < 3 {
                error!(
                    asset = %ctx.asset_name(),
                    channels = image.channels,
                    "normal map has fewer than 3 channels, cannot invert green"
                );
                if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                    detail.note(format!(
                        "Green inversion skipped: {} channels",
                        image.channels
                    ));
                }
                continue;
            }

            image.invert_channel(1);

            let extension = temp_file
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("png")
                .to_string();
            let out_path = ctx
                .engine_temp_dir
                .join(format!("normal_g_inv_{}.{}", key, extension));

            if let Err(e) = imaging::save_image(&out_path, &image) {
                error!(asset = %ctx.asset_name(), path = %out_path.display(), error = %e, "normal map save failed");
                if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                    detail.note(format!("Green inversion save failed: {}", e));
                }
                continue;
            }

            if let Some(detail) = ctx.processed_maps.get_mut(&key) {
                detail.temp_file = Some(out_path);
                detail.note("Inverted green channel");
            }
            info!(asset = %ctx.asset_name(), map = %key, "normal map green channel inverted");
        }

        Ok(())
    }
}
