//! The fixed stage sequence each asset runs through.

pub mod alpha_mask;
pub mod file_filter;
pub mod gloss_to_rough;
pub mod metadata_init;
pub mod metadata_save;
pub mod normal_green;
pub mod organize;
pub mod skip;
pub mod supplier;

use crate::error::StageError;
use crate::pipeline::context::AssetContext;

pub use alpha_mask::AlphaExtractionToMask;
pub use file_filter::FileRuleFilter;
pub use gloss_to_rough::GlossToRough;
pub use metadata_init::MetadataInitialization;
pub use metadata_save::MetadataFinalizationSave;
pub use normal_green::NormalGreenChannel;
pub use organize::OutputOrganization;
pub use skip::AssetSkipLogic;
pub use supplier::SupplierDetermination;

/// One step of the asset pipeline. Stages mutate the context; a returned
/// error downgrades the asset to failed while the run continues with the
/// next asset.
pub trait Stage {
    fn name(&self) -> &'static str;

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError>;
}

/// Stages after the skip decision call this first so a skipped asset
/// passes through the rest of the sequence untouched.
pub(crate) fn short_circuit_skipped(ctx: &AssetContext, stage: &'static str) -> bool {
    if ctx.flags.skip_asset {
        tracing::debug!(asset = %ctx.asset_name(), stage, "asset skipped, stage short-circuits");
        true
    } else {
        false
    }
}
