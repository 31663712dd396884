//! Entry point for a processing run. Owns the run-scoped temp directory
//! and the values shared by every asset in the run.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, info_span};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::pattern;
use crate::pipeline::orchestrator::{PipelineOrchestrator, RunSummary};
use crate::rules::SourceRule;

/// Per-run overrides. Anything left `None` falls back to the config or
/// is derived at run start.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub overwrite: Option<bool>,
    pub incrementing_value: Option<String>,
    pub sha5_value: Option<String>,
}

pub struct ProcessingEngine {
    config: Arc<Config>,
}

impl ProcessingEngine {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Runs one source rule against an extracted workspace. The temp
    /// directory lives for the duration of the run and is removed when
    /// it drops, whatever the outcome.
    pub fn process(
        &self,
        source_rule: &SourceRule,
        workspace_path: &Path,
        output_base_path: &Path,
        options: &ProcessOptions,
    ) -> Result<RunSummary> {
        if !workspace_path.is_dir() {
            return Err(EngineError::InvalidWorkspace {
                path: workspace_path.to_path_buf(),
            }
            .into());
        }

        let temp_dir = tempfile::Builder::new()
            .prefix(&self.config.temp_dir_prefix)
            .tempdir()
            .map_err(|source| EngineError::TempDir { source })?;

        let overwrite = options
            .overwrite
            .unwrap_or(self.config.overwrite_existing);
        let incrementing_value = options.incrementing_value.clone().unwrap_or_else(|| {
            pattern::next_incrementing_value(
                output_base_path,
                &self.config.output_directory_pattern,
            )
        });

        let span = info_span!("run", input = %source_rule.input_path);
        let _guard = span.enter();
        info!(
            workspace = %workspace_path.display(),
            output = %output_base_path.display(),
            temp = %temp_dir.path().display(),
            overwrite,
            assets = source_rule.assets.len(),
            "processing run started"
        );

        let orchestrator = PipelineOrchestrator::new(Arc::clone(&self.config));
        let summary = orchestrator.process_source_rule(
            source_rule,
            workspace_path,
            temp_dir.path(),
            output_base_path,
            overwrite,
            Some(incrementing_value),
            options.sha5_value.clone(),
        );

        debug!(temp = %temp_dir.path().display(), "removing run temp directory");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TexorgError;
    use tempfile::TempDir;

    fn engine() -> ProcessingEngine {
        ProcessingEngine::new(Arc::new(Config::default()))
    }

    fn empty_rule() -> SourceRule {
        SourceRule {
            input_path: "input.zip".to_string(),
            supplier_identifier: Some("Quixel".to_string()),
            supplier_override: None,
            preset_name: None,
            assets: vec![],
        }
    }

    #[test]
    fn test_missing_workspace_is_rejected() {
        let temp = TempDir::new().unwrap();
        let result = engine().process(
            &empty_rule(),
            &temp.path().join("nope"),
            temp.path(),
            &ProcessOptions::default(),
        );
        assert!(matches!(
            result,
            Err(TexorgError::Engine(EngineError::InvalidWorkspace { .. }))
        ));
    }

    #[test]
    fn test_empty_rule_yields_empty_summary() {
        let temp = TempDir::new().unwrap();
        let summary = engine()
            .process(
                &empty_rule(),
                temp.path(),
                &temp.path().join("out"),
                &ProcessOptions::default(),
            )
            .unwrap();
        assert_eq!(summary.total(), 0);
    }
}
