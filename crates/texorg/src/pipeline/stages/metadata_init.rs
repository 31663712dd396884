use chrono::Utc;
use tracing::debug;

use crate::error::StageError;
use crate::pipeline::context::{AssetContext, AssetStatus};
use crate::pipeline::stages::{short_circuit_skipped, Stage};

/// Seeds the asset metadata: identity, supplier, run tokens, and the
/// free-form common metadata carried over from the rule.
pub struct MetadataInitialization;

impl Stage for MetadataInitialization {
    fn name(&self) -> &'static str {
        "MetadataInitialization"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if short_circuit_skipped(ctx, self.name()) {
            return Ok(());
        }

        ctx.metadata.asset_name = ctx.asset_rule.asset_name.clone();
        ctx.metadata.asset_type = ctx.asset_rule.effective_type().map(str::to_string);
        ctx.metadata.supplier = ctx.supplier_or_unknown().to_string();
        ctx.metadata.status = AssetStatus::Pending.to_string();
        ctx.metadata.processing_started = Utc::now();
        ctx.metadata.incrementing_value = ctx.incrementing_value.clone();
        ctx.metadata.sha5 = ctx.sha5_value.clone();
        ctx.metadata.common_metadata = ctx.asset_rule.common_metadata.clone();

        debug!(asset = %ctx.asset_name(), "metadata initialized");
        Ok(())
    }
}
