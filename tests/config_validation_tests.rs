//! Config Validation Tests
//!
//! Exercises file loading, typo detection, value validation and environment
//! overrides independently from the rest of the pipeline.

use std::io::Write;

use material_origin::config::validation::{known_config_keys, suggest_correction, validate_unknown_keys};
use material_origin::config::{AppConfig, ConfigError};
use material_origin::pipeline::{ParseMode, PipelineSettings};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_section_key_warns_with_suggestion() {
    let toml_str = r#"
[inference]
stage_timout_secs = 30
"#;
    let warnings = validate_unknown_keys(toml_str);
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert!(warnings[0].field.contains("stage_timout_secs"));
    assert_eq!(
        warnings[0].suggestion.as_deref(),
        Some("inference.stage_timeout_secs")
    );
}

#[test]
fn unknown_section_without_close_match_has_no_suggestion() {
    let warnings = validate_unknown_keys("[telemetry]\nendpoint = \"x\"\n");
    assert!(!warnings.is_empty());
    assert!(warnings.iter().all(|w| w.suggestion.is_none()));
}

#[test]
fn known_keys_produce_no_warnings() {
    let toml_str = r#"
[inference]
model = "gemini-1.5-flash"
stage_timeout_secs = 20

[parsing]
mode = "strict"
validate_coordinate_ranges = false

[server]
addr = "127.0.0.1:9000"
max_image_bytes = 1048576
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());
}

#[test]
fn suggestion_prefers_nearest_key() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("server.adr", &known).as_deref(),
        Some("server.addr")
    );
    assert_eq!(suggest_correction("completely.unrelated.key", &known), None);
}

#[test]
fn unknown_keys_do_not_fail_loading() {
    let file = write_config("[server]\naddres = \"127.0.0.1:1\"\n");
    let config = AppConfig::load_from_file(file.path()).unwrap();
    assert_eq!(config.server.addr, AppConfig::default().server.addr);
}

// ============================================================================
// Loading and Value Validation
// ============================================================================

#[test]
fn partial_file_keeps_defaults_for_missing_fields() {
    let file = write_config("[parsing]\nmode = \"strict\"\n");
    let config = AppConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.parsing.mode, ParseMode::Strict);
    assert!(config.parsing.validate_coordinate_ranges);
    assert_eq!(config.inference.stage_timeout_secs, 60);

    let settings = PipelineSettings::from(&config);
    assert_eq!(settings.parse_mode, ParseMode::Strict);
    assert_eq!(settings.stage_timeout.as_secs(), 60);
}

#[test]
fn zero_timeout_fails_validation() {
    let file = write_config("[inference]\nstage_timeout_secs = 0\n");
    let err = AppConfig::load(Some(file.path())).unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("stage_timeout_secs")));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn all_validation_errors_are_reported_together() {
    let mut config = AppConfig::default();
    config.inference.model = " ".to_string();
    config.inference.base_url = "ftp://example.com".to_string();
    config.server.max_image_bytes = 0;

    let Err(ConfigError::Validation(errors)) = config.validate() else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.len(), 3);
}

#[test]
fn malformed_toml_is_a_parse_error_naming_the_file() {
    let file = write_config("[inference\nmodel = ");
    let err = AppConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
    assert!(err.to_string().contains(&file.path().display().to_string()));
}

#[test]
fn explicit_missing_path_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let err = AppConfig::load(Some(&missing)).unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn config_round_trips_through_toml() {
    let mut config = AppConfig::default();
    config.parsing.mode = ParseMode::Strict;
    let text = config.to_toml().unwrap();
    let back = AppConfig::from_toml_str(&text).unwrap();
    assert_eq!(back.parsing.mode, ParseMode::Strict);
    assert_eq!(back.inference.model, config.inference.model);
}

// ============================================================================
// Environment Overrides
// ============================================================================

#[test]
fn env_overrides_replace_model_and_addr() {
    let mut config = AppConfig::default();
    config.apply_env_overrides(|key| match key {
        "MATERIAL_ORIGIN_MODEL" => Some("gemini-2.0-flash".to_string()),
        "MATERIAL_ORIGIN_SERVER_ADDR" => Some("127.0.0.1:3000".to_string()),
        _ => None,
    });
    assert_eq!(config.inference.model, "gemini-2.0-flash");
    assert_eq!(config.server.addr, "127.0.0.1:3000");
}

#[test]
fn blank_env_overrides_are_ignored() {
    let mut config = AppConfig::default();
    let model = config.inference.model.clone();
    config.apply_env_overrides(|_| Some("   ".to_string()));
    assert_eq!(config.inference.model, model);
}
