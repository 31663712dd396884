//! End-to-end runs through the processing engine against real files.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use texorg::imaging::{load_image, save_image, MapImage, PixelData};
use texorg::rules::{AssetRule, MergeInput, MergeInstructions};
use texorg::{Config, FileRule, ProcessOptions, ProcessingEngine, SourceRule};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn asset(name: &str, files: Vec<FileRule>) -> AssetRule {
    AssetRule {
        asset_name: name.to_string(),
        asset_type: None,
        asset_type_override: None,
        process_status: None,
        files,
        common_metadata: serde_json::Map::new(),
    }
}

fn source_rule(assets: Vec<AssetRule>) -> SourceRule {
    SourceRule {
        input_path: "delivery.zip".to_string(),
        supplier_identifier: Some("Quixel".to_string()),
        supplier_override: None,
        preset_name: None,
        assets,
    }
}

fn write_rock_fixtures(workspace: &Path) {
    let col = MapImage::new_u8(2, 2, 4, [100u8, 110, 120, 200].repeat(4));
    let gloss = MapImage::filled_u8(2, 2, 1, 40);
    let nrm = MapImage::new_u8(2, 2, 3, [128u8, 60, 255].repeat(4));
    save_image(&workspace.join("rock_col.png"), &col).unwrap();
    save_image(&workspace.join("rock_gloss.png"), &gloss).unwrap();
    save_image(&workspace.join("rock_nrm.png"), &nrm).unwrap();
}

fn rock_asset() -> AssetRule {
    asset(
        "Rock01",
        vec![
            FileRule::new("rock_col.png", "MAP_COL"),
            FileRule::new("rock_gloss.png", "MAP_GLOSS"),
            FileRule::new("rock_nrm.png", "MAP_NRM"),
        ],
    )
}

fn channel_values(image: &MapImage) -> Vec<u8> {
    match &image.data {
        PixelData::U8(data) => data.clone(),
        other => panic!("expected u8 pixels, got {:?}", other),
    }
}

#[test]
fn test_full_run_organizes_converted_maps() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let output = temp.path().join("out");
    std::fs::create_dir_all(&workspace).unwrap();
    write_rock_fixtures(&workspace);

    let mut config = Config::default();
    config.invert_normal_green = true;
    let engine = ProcessingEngine::new(Arc::new(config));
    let rule = source_rule(vec![rock_asset()]);

    let summary = engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();
    assert_eq!(summary.processed, vec!["Rock01".to_string()]);
    assert!(summary.failed.is_empty());

    let asset_dir = output.join("Rock01");

    // Color map lands untouched.
    let col = load_image(&asset_dir.join("Rock01_COL_2x2.png")).unwrap();
    assert_eq!(col.channels, 4);
    assert_eq!(&channel_values(&col)[..4], &[100, 110, 120, 200]);

    // Gloss became roughness by inversion.
    let rough = load_image(&asset_dir.join("Rock01_ROUGH_2x2.png")).unwrap();
    assert_eq!(channel_values(&rough)[0], 215);
    assert!(!asset_dir.join("Rock01_GLOSS_2x2.png").exists());

    // Alpha of the color map became a standalone mask.
    let mask = load_image(&asset_dir.join("Rock01_MASK_2x2.png")).unwrap();
    assert_eq!(mask.channels, 1);
    assert_eq!(channel_values(&mask)[0], 200);

    // Green channel of the normal map inverted, red and blue untouched.
    let nrm = load_image(&asset_dir.join("Rock01_NRM_2x2.png")).unwrap();
    assert_eq!(&channel_values(&nrm)[..3], &[128, 195, 255]);
}

#[test]
fn test_metadata_records_conversions_and_run_values() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let output = temp.path().join("out");
    std::fs::create_dir_all(&workspace).unwrap();
    write_rock_fixtures(&workspace);

    let engine = ProcessingEngine::new(Arc::new(Config::default()));
    let rule = source_rule(vec![rock_asset()]);
    engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();

    let text =
        std::fs::read_to_string(output.join("Rock01").join("Rock01_metadata.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(json["asset_name"], "Rock01");
    assert_eq!(json["supplier"], "Quixel");
    assert_eq!(json["status"], "Processed");
    assert_eq!(json["incrementing_value"], "00");
    assert_eq!(json["maps"]["ROUGH"]["internal_map_type"], "MAP_ROUGH");
    assert_eq!(
        json["maps"]["ROUGH"]["original_map_type_before_conversion"],
        "MAP_GLOSS"
    );
    assert!(json["maps"]["COL"]["variant_paths"].is_object());
    assert_eq!(
        json["maps"]["COL"]["variant_paths"]["2x2"],
        "Rock01_COL_2x2.png"
    );
    assert!(json["maps"]["MASK"].is_object());
}

#[test]
fn test_rerun_without_overwrite_leaves_outputs_untouched() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let output = temp.path().join("out");
    std::fs::create_dir_all(&workspace).unwrap();
    write_rock_fixtures(&workspace);

    let engine = ProcessingEngine::new(Arc::new(Config::default()));
    let rule = source_rule(vec![rock_asset()]);
    engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();

    let col_path = output.join("Rock01").join("Rock01_COL_2x2.png");
    std::fs::write(&col_path, b"sentinel").unwrap();

    let summary = engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();
    assert_eq!(summary.processed, vec!["Rock01".to_string()]);
    assert_eq!(std::fs::read(&col_path).unwrap(), b"sentinel");
}

#[test]
fn test_ignore_rule_beats_map_rule() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let output = temp.path().join("out");
    std::fs::create_dir_all(&workspace).unwrap();
    write_rock_fixtures(&workspace);

    let engine = ProcessingEngine::new(Arc::new(Config::default()));
    let rule = source_rule(vec![asset(
        "Rock01",
        vec![
            FileRule::new("*.png", "FILE_IGNORE"),
            FileRule::new("rock_col.png", "MAP_COL"),
        ],
    )]);

    let summary = engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();
    assert_eq!(summary.processed, vec!["Rock01".to_string()]);
    assert!(!output.join("Rock01").join("Rock01_COL_2x2.png").exists());
}

#[test]
fn test_merge_fills_missing_input_with_default() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let output = temp.path().join("out");
    std::fs::create_dir_all(&workspace).unwrap();
    write_rock_fixtures(&workspace);

    let mut col_rule = FileRule::new("rock_col.png", "MAP_COL");
    col_rule.id = "col".to_string();
    let mut merge_rule = FileRule::new("", "MAP_MERGE");
    merge_rule.merge_instructions = Some(MergeInstructions {
        output_map_type: "MAP_ORM".to_string(),
        output_channels: 2,
        inputs: vec![
            MergeInput {
                source_rule_id: "col".to_string(),
                source_channel: 0,
                target_channel: 0,
                invert: false,
                default_value: 0,
            },
            MergeInput {
                source_rule_id: "missing_ao".to_string(),
                source_channel: 0,
                target_channel: 1,
                invert: false,
                default_value: 128,
            },
        ],
    });

    let engine = ProcessingEngine::new(Arc::new(Config::default()));
    let rule = source_rule(vec![asset("Rock01", vec![col_rule, merge_rule])]);

    let summary = engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();
    assert_eq!(summary.processed, vec!["Rock01".to_string()]);

    // MAP_ORM has no configured alias, so the internal name is used.
    let merged = load_image(&output.join("Rock01").join("Rock01_MAP_ORM_2x2.png")).unwrap();
    assert_eq!(merged.channels, 2);
    assert_eq!(&channel_values(&merged)[..2], &[100, 128]);
}

#[test]
fn test_incrementing_value_advances_across_runs() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let output = temp.path().join("out");
    std::fs::create_dir_all(&workspace).unwrap();
    std::fs::create_dir_all(output.join("batch_00")).unwrap();
    std::fs::create_dir_all(output.join("batch_04")).unwrap();
    write_rock_fixtures(&workspace);

    let mut config = Config::default();
    config.output_directory_pattern = "batch_[IncrementingValue]".to_string();
    let engine = ProcessingEngine::new(Arc::new(config));
    let rule = source_rule(vec![rock_asset()]);

    let summary = engine
        .process(&rule, &workspace, &output, &ProcessOptions::default())
        .unwrap();
    assert_eq!(summary.processed, vec!["Rock01".to_string()]);
    assert!(output
        .join("batch_05")
        .join("Rock01_COL_2x2.png")
        .is_file());
}
