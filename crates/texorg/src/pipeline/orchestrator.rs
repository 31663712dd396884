//! Drives every asset of a source rule through the stage sequence and
//! classifies the outcomes.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, info_span, warn};

use crate::config::Config;
use crate::pipeline::context::{AssetContext, AssetStatus};
use crate::pipeline::stages::{
    AlphaExtractionToMask, AssetSkipLogic, FileRuleFilter, GlossToRough,
    MetadataFinalizationSave, MetadataInitialization, NormalGreenChannel, OutputOrganization,
    Stage, SupplierDetermination,
};
use crate::pipeline::{map_processor, merge};
use crate::rules::SourceRule;

/// Outcome of one run, one bucket per asset name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }
}

pub struct PipelineOrchestrator {
    config: Arc<Config>,
}

impl PipelineOrchestrator {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Processes every asset of `source_rule`. One asset's failure never
    /// stops the others; the summary reports all three buckets.
    #[allow(clippy::too_many_arguments)]
    pub fn process_source_rule(
        &self,
        source_rule: &SourceRule,
        workspace_path: &Path,
        engine_temp_dir: &Path,
        output_base_path: &Path,
        overwrite: bool,
        incrementing_value: Option<String>,
        sha5_value: Option<String>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        for asset_rule in &source_rule.assets {
            let span = info_span!("asset", name = %asset_rule.asset_name);
            let _guard = span.enter();

            let mut ctx = AssetContext::new(
                Arc::clone(&self.config),
                asset_rule.clone(),
                source_rule.supplier_identifier.clone(),
                source_rule.supplier_override.clone(),
                workspace_path.to_path_buf(),
                engine_temp_dir.to_path_buf(),
                output_base_path.to_path_buf(),
                overwrite,
                incrementing_value.clone(),
                sha5_value.clone(),
            );

            self.run_asset(&mut ctx);
            self.classify(&ctx, &mut summary);
        }

        info!(
            processed = summary.processed.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "source rule finished"
        );
        summary
    }

    fn run_asset(&self, ctx: &mut AssetContext) {
        let pre_stages: [&dyn Stage; 4] = [
            &SupplierDetermination,
            &AssetSkipLogic,
            &MetadataInitialization,
            &FileRuleFilter,
        ];
        for stage in pre_stages {
            if !self.run_stage(stage, ctx) {
                return;
            }
        }
        if ctx.flags.skip_asset {
            return;
        }

        map_processor::process_individual_maps(ctx);

        // Conversions run on the temp files before merges consume them.
        let conversions: [&dyn Stage; 3] = [
            &GlossToRough,
            &AlphaExtractionToMask,
            &NormalGreenChannel,
        ];
        for stage in conversions {
            if !self.run_stage(stage, ctx) {
                return;
            }
        }

        merge::process_merges(ctx);

        // The output stages still run when a map or merge failed so the
        // surviving maps land and the metadata records the failure.
        for stage in [&OutputOrganization as &dyn Stage, &MetadataFinalizationSave] {
            if !self.run_stage(stage, ctx) {
                return;
            }
        }
    }

    /// Returns false when the stage errored hard and the asset is done.
    fn run_stage(&self, stage: &dyn Stage, ctx: &mut AssetContext) -> bool {
        match stage.execute(ctx) {
            Ok(()) => true,
            Err(e) => {
                error!(stage = stage.name(), error = %e, "stage failed");
                ctx.flags.failed_stage = Some(stage.name().to_string());
                false
            }
        }
    }

    fn classify(&self, ctx: &AssetContext, summary: &mut RunSummary) {
        let name = ctx.asset_name().to_string();
        match ctx.asset_status() {
            AssetStatus::Processed => {
                info!("asset processed");
                summary.processed.push(name);
            }
            AssetStatus::Skipped => {
                let reason = ctx.flags.skip_reason.as_deref().unwrap_or("unspecified");
                info!(reason, "asset skipped");
                summary.skipped.push(name);
            }
            status @ AssetStatus::Failed(_) => {
                warn!(reason = %status, "asset failed");
                summary.failed.push(name);
            }
            AssetStatus::Pending => {
                // Should not happen once the stages ran; count it failed
                // rather than losing the asset from the summary.
                warn!("asset finished in pending state");
                summary.failed.push(name);
            }
        }
    }
}
