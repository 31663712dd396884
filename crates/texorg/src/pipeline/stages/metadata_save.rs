//! Finalizes the asset metadata and writes it next to the organized maps.

use chrono::Utc;
use tracing::{error, info};

use crate::error::StageError;
use crate::pattern;
use crate::pipeline::context::AssetContext;
use crate::pipeline::stages::organize::asset_directory;
use crate::pipeline::stages::{short_circuit_skipped, Stage};
use crate::storage;

pub struct MetadataFinalizationSave;

const STAGE_NAME: &str = "MetadataFinalizationSave";

impl Stage for MetadataFinalizationSave {
    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        // A skipped asset produced no outputs, so it gets no metadata file.
        if short_circuit_skipped(ctx, STAGE_NAME) {
            return Ok(());
        }

        ctx.metadata.processing_finished = Some(Utc::now());
        ctx.metadata.status = ctx.asset_status().to_string();

        let directory = asset_directory(ctx);

        // Variant paths persist relative to the asset directory so the
        // output tree can move without invalidating its metadata.
        for entry in ctx.metadata.maps.values_mut() {
            for path in entry.variant_paths.values_mut() {
                let relative =
                    storage::relative_to(std::path::Path::new(path.as_str()), &directory);
                *path = relative.display().to_string();
            }
        }

        let filename = format!(
            "{}_{}",
            pattern::sanitize_filename(ctx.asset_name()),
            ctx.config.metadata_filename
        );
        let destination = directory.join(filename);

        let value = match serde_json::to_value(&ctx.metadata) {
            Ok(value) => value,
            Err(e) => {
                error!(asset = %ctx.asset_name(), error = %e, "metadata serialization failed");
                ctx.flags.metadata_save_error = true;
                ctx.metadata.status = ctx.asset_status().to_string();
                return Ok(());
            }
        };

        if let Err(e) = storage::write_pretty_json(&destination, &value) {
            error!(asset = %ctx.asset_name(), path = %destination.display(), error = %e, "metadata write failed");
            ctx.flags.metadata_save_error = true;
            ctx.metadata.status = ctx.asset_status().to_string();
            return Ok(());
        }

        info!(asset = %ctx.asset_name(), path = %destination.display(), "metadata saved");
        Ok(())
    }
}
