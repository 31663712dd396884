use tracing::{debug, warn};

use crate::error::StageError;
use crate::pipeline::context::AssetContext;
use crate::pipeline::stages::Stage;

/// Resolves the supplier for the asset: a non-blank user override wins,
/// then the detected identifier. Neither present raises the supplier
/// error flag; the skip stage turns that into a skip.
pub struct SupplierDetermination;

impl Stage for SupplierDetermination {
    fn name(&self) -> &'static str {
        "SupplierDetermination"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        let from_override = ctx
            .supplier_override
            .as_deref()
            .filter(|s| !s.trim().is_empty());
        let from_identifier = ctx
            .supplier_identifier
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        match from_override.or(from_identifier) {
            Some(supplier) => {
                debug!(asset = %ctx.asset_name(), supplier, "resolved supplier");
                ctx.effective_supplier = Some(supplier.trim().to_string());
            }
            None => {
                warn!(asset = %ctx.asset_name(), "no supplier identifier or override available");
                ctx.flags.supplier_error = true;
            }
        }

        Ok(())
    }
}
