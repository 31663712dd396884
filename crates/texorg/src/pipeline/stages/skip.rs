use tracing::info;

use crate::error::StageError;
use crate::pipeline::context::AssetContext;
use crate::pipeline::stages::Stage;
use crate::rules::ProcessStatus;

/// Decides whether the asset is processed at all. Skips on supplier
/// failure, an explicit SKIP marker, or a PROCESSED marker when
/// overwriting is disabled.
pub struct AssetSkipLogic;

impl Stage for AssetSkipLogic {
    fn name(&self) -> &'static str {
        "AssetSkipLogic"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if ctx.flags.supplier_error {
            ctx.flags.skip("Supplier could not be determined");
        } else {
            match ctx.asset_rule.process_status {
                Some(ProcessStatus::Skip) => {
                    ctx.flags.skip("Marked SKIP in rule");
                }
                Some(ProcessStatus::Processed) if !ctx.overwrite => {
                    ctx.flags.skip("Already processed and overwrite disabled");
                }
                _ => {}
            }
        }

        if ctx.flags.skip_asset {
            info!(
                asset = %ctx.asset_name(),
                reason = ctx.flags.skip_reason.as_deref().unwrap_or(""),
                "asset skipped"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::test_support::context_with_files;

    #[test]
    fn test_supplier_error_skips() {
        let mut ctx = context_with_files(vec![]);
        ctx.flags.supplier_error = true;
        AssetSkipLogic.execute(&mut ctx).unwrap();
        assert!(ctx.flags.skip_asset);
        assert_eq!(
            ctx.flags.skip_reason.as_deref(),
            Some("Supplier could not be determined")
        );
    }

    #[test]
    fn test_skip_marker() {
        let mut ctx = context_with_files(vec![]);
        ctx.asset_rule.process_status = Some(ProcessStatus::Skip);
        AssetSkipLogic.execute(&mut ctx).unwrap();
        assert!(ctx.flags.skip_asset);
    }

    #[test]
    fn test_processed_marker_respects_overwrite() {
        let mut ctx = context_with_files(vec![]);
        ctx.asset_rule.process_status = Some(ProcessStatus::Processed);
        AssetSkipLogic.execute(&mut ctx).unwrap();
        assert!(ctx.flags.skip_asset);

        let mut ctx = context_with_files(vec![]);
        ctx.asset_rule.process_status = Some(ProcessStatus::Processed);
        ctx.overwrite = true;
        AssetSkipLogic.execute(&mut ctx).unwrap();
        assert!(!ctx.flags.skip_asset);
    }

    #[test]
    fn test_normal_asset_not_skipped() {
        let mut ctx = context_with_files(vec![]);
        AssetSkipLogic.execute(&mut ctx).unwrap();
        assert!(!ctx.flags.skip_asset);
    }
}
