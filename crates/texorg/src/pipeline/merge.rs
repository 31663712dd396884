//! Channel-packing merges: combine processed maps into a single output
//! image, one channel per input.

use tracing::{error, info, warn};

use crate::imaging::{self, MapImage};
use crate::pipeline::context::{AssetContext, MapDetail, MapStatus};
use crate::rules::{FileRule, MergeInput};

/// Runs every merge rule. A failed merge marks the asset but the other
/// merges still run.
pub fn process_merges(ctx: &mut AssetContext) {
    let rules: Vec<FileRule> = ctx
        .files_to_process
        .iter()
        .filter(|r| r.is_merge())
        .cloned()
        .collect();

    for rule in rules {
        let detail = process_merge_rule(ctx, &rule);
        if detail.status.is_failure() {
            ctx.flags.merge_error = true;
        }
        ctx.merged_maps.insert(rule.id.clone(), detail);
    }
}

fn process_merge_rule(ctx: &AssetContext, rule: &FileRule) -> MapDetail {
    let Some(instructions) = &rule.merge_instructions else {
        let mut detail = MapDetail::new("MAP_MERGE");
        detail.status = MapStatus::Failed;
        detail.note("Merge rule has no merge instructions");
        return detail;
    };

    let mut detail = MapDetail::new(instructions.output_map_type.clone());
    let output_channels = instructions.output_channels as usize;
    if output_channels == 0 || output_channels > 4 {
        detail.status = MapStatus::Failed;
        detail.note(format!("Invalid output channel count {}", output_channels));
        return detail;
    }

    // Inputs load in declaration order; the first one that loads fixes the
    // output geometry.
    let mut loaded: Vec<(MergeInput, Option<MapImage>)> = Vec::new();
    for input in &instructions.inputs {
        let source = ctx
            .processed_maps
            .get(&input.source_rule_id)
            .filter(|d| d.status.is_processed())
            .and_then(|d| d.temp_file.clone());

        match source {
            Some(path) => match imaging::load_image(&path) {
                Ok(image) => loaded.push((input.clone(), Some(image))),
                Err(e) => {
                    // An input that exists but cannot be read poisons the
                    // whole merge; silently substituting the default would
                    // hide real data loss.
                    error!(
                        asset = %ctx.asset_name(),
                        path = %path.display(),
                        error = %e,
                        "merge input failed to load"
                    );
                    detail.status = MapStatus::Failed;
                    detail.note(format!(
                        "Input '{}' failed to load: {}",
                        path.display(),
                        e
                    ));
                    return detail;
                }
            },
            None => {
                warn!(
                    asset = %ctx.asset_name(),
                    source_rule = %input.source_rule_id,
                    default = input.default_value,
                    "merge input missing, using default fill"
                );
                detail.note(format!(
                    "Input '{}' missing, channel {} filled with {}",
                    input.source_rule_id, input.target_channel, input.default_value
                ));
                loaded.push((input.clone(), None));
            }
        }
    }

    let Some((width, height)) = loaded
        .iter()
        .find_map(|(_, img)| img.as_ref().map(|i| i.dimensions()))
    else {
        detail.status = MapStatus::Failed;
        detail.note("No merge input could be loaded, cannot determine dimensions");
        return detail;
    };

    for (input, img) in loaded.iter_mut() {
        if let Some(image) = img {
            if image.dimensions() != (width, height) {
                info!(
                    asset = %ctx.asset_name(),
                    source_rule = %input.source_rule_id,
                    from = ?image.dimensions(),
                    to = ?(width, height),
                    "resizing merge input to match first input"
                );
                *image = imaging::resize_image(image, width, height);
            }
        }
    }

    let pixel_count = (width * height) as usize;
    let mut data = vec![0u8; pixel_count * output_channels];
    for (input, img) in &loaded {
        let target = input.target_channel as usize;
        if target >= output_channels {
            detail.note(format!(
                "Input '{}' targets channel {} outside the {}-channel output, ignored",
                input.source_rule_id, target, output_channels
            ));
            continue;
        }
        match img {
            Some(image) => {
                let source = input.source_channel as usize;
                for i in 0..pixel_count {
                    let mut value = image.channel_value_u8(i, source);
                    if input.invert {
                        value = 255 - value;
                    }
                    data[i * output_channels + target] = value;
                }
            }
            None => {
                for i in 0..pixel_count {
                    data[i * output_channels + target] = input.default_value;
                }
            }
        }
    }

    let merged = MapImage::new_u8(width, height, output_channels as u8, data);
    let out_path = ctx.engine_temp_dir.join(format!(
        "merged_{}_{}.png",
        instructions.output_map_type, rule.id
    ));
    if let Err(e) = imaging::save_image(&out_path, &merged) {
        error!(asset = %ctx.asset_name(), path = %out_path.display(), error = %e, "merged map save failed");
        detail.status = MapStatus::SaveFailed;
        detail.temp_file = Some(out_path);
        detail.note(e.to_string());
        return detail;
    }

    detail.status = MapStatus::Processed;
    detail.temp_file = Some(out_path);
    detail.processed_dimensions = Some((width, height));
    detail.resolution_key = Some(imaging::resolution_key(width, height));
    info!(
        asset = %ctx.asset_name(),
        output = %instructions.output_map_type,
        channels = output_channels,
        "merge completed"
    );
    detail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{load_image, save_image, PixelData};
    use crate::pipeline::context::test_support::context_with_files;
    use crate::rules::MergeInstructions;
    use tempfile::TempDir;

    fn processed(map_type: &str, path: std::path::PathBuf) -> MapDetail {
        let mut d = MapDetail::new(map_type);
        d.status = MapStatus::Processed;
        d.temp_file = Some(path);
        d
    }

    fn merge_rule(inputs: Vec<MergeInput>, output_channels: u8) -> FileRule {
        let mut rule = FileRule::new("", "MAP_MERGE");
        rule.merge_instructions = Some(MergeInstructions {
            output_map_type: "MAP_ORM".to_string(),
            output_channels,
            inputs,
        });
        rule
    }

    fn input(source: &str, target: u8) -> MergeInput {
        MergeInput {
            source_rule_id: source.to_string(),
            source_channel: 0,
            target_channel: target,
            invert: false,
            default_value: 0,
        }
    }

    #[test]
    fn test_two_channel_merge() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context_with_files(vec![]);
        ctx.engine_temp_dir = temp.path().to_path_buf();

        let ao = temp.path().join("ao.png");
        let rough = temp.path().join("rough.png");
        save_image(&ao, &MapImage::filled_u8(2, 2, 1, 10)).unwrap();
        save_image(&rough, &MapImage::filled_u8(2, 2, 1, 200)).unwrap();
        ctx.processed_maps.insert("ao".to_string(), processed("MAP_AO", ao));
        ctx.processed_maps
            .insert("rough".to_string(), processed("MAP_ROUGH", rough));

        let rule = merge_rule(vec![input("ao", 0), input("rough", 1), input("none", 2)], 3);
        let mut with_default = rule.clone();
        if let Some(instr) = &mut with_default.merge_instructions {
            instr.inputs[2].default_value = 128;
        }
        ctx.files_to_process = vec![with_default.clone()];

        process_merges(&mut ctx);

        let detail = &ctx.merged_maps[&with_default.id];
        assert_eq!(detail.status, MapStatus::Processed);
        assert!(!ctx.flags.merge_error);

        let merged = load_image(detail.temp_file.as_ref().unwrap()).unwrap();
        assert_eq!(merged.channels, 3);
        match merged.data {
            PixelData::U8(data) => {
                assert_eq!(&data[..3], &[10, 200, 128]);
            }
            _ => panic!("expected u8 merge output"),
        }
    }

    #[test]
    fn test_single_channel_output_is_grayscale() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context_with_files(vec![]);
        ctx.engine_temp_dir = temp.path().to_path_buf();

        let src = temp.path().join("m.png");
        save_image(&src, &MapImage::filled_u8(2, 2, 3, 60)).unwrap();
        ctx.processed_maps.insert("m".to_string(), processed("MAP_COL", src));

        let rule = merge_rule(vec![input("m", 0)], 1);
        ctx.files_to_process = vec![rule.clone()];
        process_merges(&mut ctx);

        let merged =
            load_image(ctx.merged_maps[&rule.id].temp_file.as_ref().unwrap()).unwrap();
        assert_eq!(merged.channels, 1);
    }

    #[test]
    fn test_all_inputs_missing_fails() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context_with_files(vec![]);
        ctx.engine_temp_dir = temp.path().to_path_buf();

        let rule = merge_rule(vec![input("a", 0), input("b", 1)], 2);
        ctx.files_to_process = vec![rule.clone()];
        process_merges(&mut ctx);

        assert_eq!(ctx.merged_maps[&rule.id].status, MapStatus::Failed);
        assert!(ctx.flags.merge_error);
    }

    #[test]
    fn test_unreadable_existing_input_fails_merge() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context_with_files(vec![]);
        ctx.engine_temp_dir = temp.path().to_path_buf();

        let good = temp.path().join("good.png");
        let bad = temp.path().join("bad.png");
        save_image(&good, &MapImage::filled_u8(2, 2, 1, 5)).unwrap();
        std::fs::write(&bad, b"not an image").unwrap();
        ctx.processed_maps.insert("good".to_string(), processed("MAP_AO", good));
        ctx.processed_maps.insert("bad".to_string(), processed("MAP_ROUGH", bad));

        let rule = merge_rule(vec![input("good", 0), input("bad", 1)], 2);
        ctx.files_to_process = vec![rule.clone()];
        process_merges(&mut ctx);

        let detail = &ctx.merged_maps[&rule.id];
        assert_eq!(detail.status, MapStatus::Failed);
        assert!(detail.notes.iter().any(|n| n.contains("bad.png")));
    }

    #[test]
    fn test_mismatched_input_resized_to_first() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context_with_files(vec![]);
        ctx.engine_temp_dir = temp.path().to_path_buf();

        let first = temp.path().join("first.png");
        let second = temp.path().join("second.png");
        save_image(&first, &MapImage::filled_u8(4, 4, 1, 10)).unwrap();
        save_image(&second, &MapImage::filled_u8(8, 8, 1, 20)).unwrap();
        ctx.processed_maps.insert("a".to_string(), processed("MAP_AO", first));
        ctx.processed_maps.insert("b".to_string(), processed("MAP_ROUGH", second));

        let rule = merge_rule(vec![input("a", 0), input("b", 1)], 2);
        ctx.files_to_process = vec![rule.clone()];
        process_merges(&mut ctx);

        let detail = &ctx.merged_maps[&rule.id];
        assert_eq!(detail.processed_dimensions, Some((4, 4)));
    }

    #[test]
    fn test_inverted_input_channel() {
        let temp = TempDir::new().unwrap();
        let mut ctx = context_with_files(vec![]);
        ctx.engine_temp_dir = temp.path().to_path_buf();

        let src = temp.path().join("g.png");
        save_image(&src, &MapImage::filled_u8(1, 1, 1, 40)).unwrap();
        ctx.processed_maps.insert("g".to_string(), processed("MAP_GLOSS", src));

        let mut inp = input("g", 0);
        inp.invert = true;
        let rule = merge_rule(vec![inp], 1);
        ctx.files_to_process = vec![rule.clone()];
        process_merges(&mut ctx);

        let merged =
            load_image(ctx.merged_maps[&rule.id].temp_file.as_ref().unwrap()).unwrap();
        assert_eq!(merged.data, PixelData::U8(vec![215]));
    }
}
