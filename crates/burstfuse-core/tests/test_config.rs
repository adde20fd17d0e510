use burstfuse_core::align::BorderPolicy;
use burstfuse_core::error::FusionError;
use burstfuse_core::fusion::{FusionMode, FusionModeKind};
use burstfuse_core::pipeline::PipelineConfig;
use burstfuse_core::tonemap::ClipPolicy;

#[test]
fn test_default_config_roundtrip() {
    let config = PipelineConfig::default();
    let text = config.to_toml_string().unwrap();
    let parsed = PipelineConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_config_json_roundtrip() {
    let mut config = PipelineConfig::default();
    config.best_effort = true;
    config.allowed_modes = vec![FusionModeKind::MaxLuminance];
    let json = serde_json::to_string(&config).unwrap();
    let restored: PipelineConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, config);
}

#[test]
fn test_partial_config_fills_defaults() {
    let text = r#"
        best_effort = true
        deadline_ms = 250

        [alignment]
        min_confidence = 0.5
        border = { Constant = 0.0 }

        [modes.denoise]
        outlier_k = 3.0
    "#;
    let config = PipelineConfig::from_toml_str(text).unwrap();
    assert!(config.best_effort);
    assert_eq!(config.deadline_ms, Some(250));
    assert_eq!(config.alignment.min_confidence, 0.5);
    assert_eq!(config.alignment.border, BorderPolicy::Constant(0.0));
    assert!(config.alignment.refine_rotation);
    assert_eq!(config.modes.denoise.outlier_k, 3.0);
    assert_eq!(config.allowed_modes, FusionModeKind::ALL.to_vec());
    // Finishing stages are opt-in when a file is given.
    assert!(config.tone_mapping.is_none());
    assert!(config.sharpening.is_none());
}

#[test]
fn test_finishing_stage_sections() {
    let text = r#"
        [tone_mapping]
        clip = "PerChannel"

        [sharpening]
        amount = 1.5
    "#;
    let config = PipelineConfig::from_toml_str(text).unwrap();
    let tone = config.tone_mapping.unwrap();
    assert_eq!(tone.clip, ClipPolicy::PerChannel);
    assert_eq!(tone.adaptation_radius, 16.0);
    assert_eq!(config.sharpening.unwrap().amount, 1.5);
}

#[test]
fn test_invalid_values_rejected() {
    let bad_confidence = "[alignment]\nmin_confidence = 1.5\n";
    assert!(matches!(
        PipelineConfig::from_toml_str(bad_confidence),
        Err(FusionError::Config(_))
    ));

    let zero_block = "[modes.sharpness]\nblock_size = 0\n";
    assert!(matches!(
        PipelineConfig::from_toml_str(zero_block),
        Err(FusionError::Config(_))
    ));

    let zero_threshold = "[modes.depth_blend]\nsubject_threshold = 0.0\n";
    assert!(matches!(
        PipelineConfig::from_toml_str(zero_threshold),
        Err(FusionError::Config(_))
    ));

    let unknown_mode = "allowed_modes = [\"Hdr\"]\n";
    assert!(matches!(
        PipelineConfig::from_toml_str(unknown_mode),
        Err(FusionError::Config(_))
    ));
}

#[test]
fn test_burst_target_respects_mode_limits() {
    let mut config = PipelineConfig::default();
    assert_eq!(config.burst_target(FusionModeKind::DenoiseAverage), 8);
    assert_eq!(config.burst_target(FusionModeKind::DepthAwareBlend), 1);

    config.collect.burst_length = Some(1);
    assert_eq!(config.burst_target(FusionModeKind::MaxLuminance), 2);

    config.collect.burst_length = Some(12);
    assert_eq!(config.burst_target(FusionModeKind::SharpnessSelect), 12);
    assert_eq!(config.burst_target(FusionModeKind::DepthAwareBlend), 1);
}

#[test]
fn test_named_mode_uses_configured_params() {
    let config = PipelineConfig::from_toml_str("[modes.sharpness]\nblock_size = 32\n").unwrap();
    match config.modes.mode(FusionModeKind::SharpnessSelect) {
        FusionMode::SharpnessSelect(params) => assert_eq!(params.block_size, 32),
        other => panic!("wrong mode: {other}"),
    }
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fusion.toml");
    std::fs::write(&path, "deadline_ms = 1000\n").unwrap();
    let config = PipelineConfig::load(&path).unwrap();
    assert_eq!(config.deadline_ms, Some(1000));

    let missing = PipelineConfig::load(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(FusionError::Io(_))));
}
