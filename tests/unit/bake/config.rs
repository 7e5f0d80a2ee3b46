use super::*;

#[test]
fn empty_object_yields_defaults() {
    let config = BakeConfig::from_json_str("{}").unwrap();
    assert_eq!(config, BakeConfig::default());
    assert_eq!(config.params().vertex_count, 32 * 32);
    assert_eq!(config.params().channels, ChannelSet::position_only());
}

#[test]
fn partial_sections_override_defaults() {
    let config = BakeConfig::from_json_str(
        r#"{
            "clip": { "frame_rate": 30.0, "duration_secs": 2.0 },
            "mesh": { "columns": 10, "rows": 4 },
            "channels": { "normal": true }
        }"#,
    )
    .unwrap();
    assert_eq!(config.clip.frame_count().unwrap(), 60);
    assert_eq!(config.mesh.amplitude, GridMeshConfig::default().amplitude);
    let params = config.params();
    assert_eq!(params.vertex_count, 40);
    assert!(params.channels.normal);
    assert!(!params.channels.tangent);
}

#[test]
fn unknown_keys_are_serde_errors() {
    let err = BakeConfig::from_json_str(r#"{ "meshes": {} }"#).unwrap_err();
    assert!(matches!(err, VatError::Serde(_)));
    let err = BakeConfig::from_json_str(r#"{ "channels": { "uv": true } }"#).unwrap_err();
    assert!(matches!(err, VatError::Serde(_)));
}

#[test]
fn invalid_values_fail_validation() {
    let err = BakeConfig::from_json_str(r#"{ "mesh": { "rows": 0 } }"#).unwrap_err();
    assert!(matches!(err, VatError::Validation(_)));
    let err = BakeConfig::from_json_str(r#"{ "clip": { "frame_rate": 24.0, "duration_secs": 0.0 } }"#)
        .unwrap_err();
    assert!(matches!(err, VatError::Validation(_)));
}

#[test]
fn missing_file_is_reported_with_path() {
    let err = BakeConfig::from_json_path(Path::new("/definitely/not/here.json")).unwrap_err();
    assert!(matches!(err, VatError::Other(_)));
    assert!(format!("{err:#}").contains("here.json"));
}

#[test]
fn update_replaces_only_set_fields() {
    let base = BakeParams::new(100, AnimationClip::default());
    assert_eq!(base.merged(&BakeUpdate::default()), base);
    assert!(BakeUpdate::default().is_empty());

    let update: BakeUpdate = serde_json::from_str(r#"{ "vertex_count": 9 }"#).unwrap();
    let merged = base.merged(&update);
    assert_eq!(merged.vertex_count, 9);
    assert_eq!(merged.clip, base.clip);

    let update = BakeUpdate {
        channels: Some(ChannelSet::all()),
        ..BakeUpdate::default()
    };
    assert_eq!(base.merged(&update).channels, ChannelSet::all());
}
