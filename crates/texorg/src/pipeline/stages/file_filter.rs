use glob::Pattern;
use tracing::{debug, info, warn};

use crate::error::StageError;
use crate::pipeline::context::AssetContext;
use crate::pipeline::stages::{short_circuit_skipped, Stage};

/// Selects the file rules the rest of the pipeline operates on.
///
/// Two passes: FILE_IGNORE rules contribute glob patterns that exclude
/// matching files, then rules whose type is neither a map, a merge, nor
/// EXTRA are dropped. Ignore beats type, so an ignored gloss map stays
/// ignored.
pub struct FileRuleFilter;

impl Stage for FileRuleFilter {
    fn name(&self) -> &'static str {
        "FileRuleFilter"
    }

    fn execute(&self, ctx: &mut AssetContext) -> Result<(), StageError> {
        if short_circuit_skipped(ctx, self.name()) {
            return Ok(());
        }

        let ignore_patterns: Vec<Pattern> = ctx
            .asset_rule
            .files
            .iter()
            .filter(|r| r.is_ignore())
            .filter_map(|r| match Pattern::new(&r.file_path) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(
                        asset = %ctx.asset_name(),
                        pattern = %r.file_path,
                        error = %e,
                        "invalid ignore pattern, rule skipped"
                    );
                    None
                }
            })
            .collect();

        let mut selected = Vec::new();
        for rule in &ctx.asset_rule.files {
            if rule.is_ignore() {
                continue;
            }

            let file_name = std::path::Path::new(&rule.file_path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(&rule.file_path);

            if ignore_patterns
                .iter()
                .any(|p| p.matches(file_name) || p.matches(&rule.file_path))
            {
                debug!(
                    asset = %ctx.asset_name(),
                    file = %rule.file_path,
                    "excluded by ignore pattern"
                );
                continue;
            }

            if !rule.is_processable() && !rule.is_extra() && !rule.is_merge() {
                debug!(
                    asset = %ctx.asset_name(),
                    file = %rule.file_path,
                    item_type = %rule.effective_type(),
                    "excluded, type is not processable"
                );
                continue;
            }

            selected.push(rule.clone());
        }

        info!(
            asset = %ctx.asset_name(),
            selected = selected.len(),
            total = ctx.asset_rule.files.len(),
            "file rules filtered"
        );
        ctx.files_to_process = selected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::context::test_support::context_with_files;
    use crate::rules::FileRule;

    #[test]
    fn test_ignore_pattern_beats_type() {
        let mut ctx = context_with_files(vec![
            FileRule::new("*_gloss.png", "FILE_IGNORE"),
            FileRule::new("rock_gloss.png", "MAP_GLOSS"),
            FileRule::new("rock_col.png", "MAP_COL"),
        ]);

        FileRuleFilter.execute(&mut ctx).unwrap();

        let names: Vec<&str> = ctx
            .files_to_process
            .iter()
            .map(|r| r.file_path.as_str())
            .collect();
        assert_eq!(names, vec!["rock_col.png"]);
    }

    #[test]
    fn test_unknown_types_dropped() {
        let mut ctx = context_with_files(vec![
            FileRule::new("readme.txt", "DOCUMENT"),
            FileRule::new("preview.png", "EXTRA"),
            FileRule::new("rock_col.png", "MAP_COL"),
        ]);

        FileRuleFilter.execute(&mut ctx).unwrap();
        assert_eq!(ctx.files_to_process.len(), 2);
    }

    #[test]
    fn test_merge_rules_retained() {
        let mut ctx = context_with_files(vec![FileRule::new("", "MAP_MERGE")]);
        FileRuleFilter.execute(&mut ctx).unwrap();
        assert_eq!(ctx.files_to_process.len(), 1);
    }

    #[test]
    fn test_ignore_matches_nested_path() {
        let mut ctx = context_with_files(vec![
            FileRule::new("previews/*", "FILE_IGNORE"),
            FileRule::new("previews/shot.png", "EXTRA"),
            FileRule::new("rock_col.png", "MAP_COL"),
        ]);

        FileRuleFilter.execute(&mut ctx).unwrap();
        assert_eq!(ctx.files_to_process.len(), 1);
        assert_eq!(ctx.files_to_process[0].file_path, "rock_col.png");
    }
}
