use super::*;

fn small_grid() -> GridMeshConfig {
    GridMeshConfig {
        columns: 4,
        rows: 3,
        ..GridMeshConfig::default()
    }
}

#[test]
fn pose_returns_row_major_grid_of_fixed_length() {
    let mut eval = WaveGridEvaluator::new(small_grid(), AnimationClip::default()).unwrap();
    let a = eval.pose(NormalizedTime(0.0)).unwrap();
    let b = eval.pose(NormalizedTime(0.25)).unwrap();
    assert_eq!(a.len(), 12);
    assert_eq!(b.len(), 12);
    assert_eq!(a[5].position[0], 1.0);
    assert_eq!(a[5].position[2], 1.0);
    assert_eq!(b[5].position[0], a[5].position[0]);
    assert_ne!(b[5].position[1], a[5].position[1]);
}

#[test]
fn pose_is_deterministic_and_moves_cursor() {
    let mut eval = WaveGridEvaluator::new(small_grid(), AnimationClip::default()).unwrap();
    let a = eval.pose(NormalizedTime(0.5)).unwrap();
    assert_eq!(eval.cursor(), NormalizedTime(0.5));
    let _ = eval.pose(NormalizedTime(0.1)).unwrap();
    let b = eval.pose(NormalizedTime(0.5)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn normals_are_unit_length() {
    let mut eval = WaveGridEvaluator::new(small_grid(), AnimationClip::default()).unwrap();
    for v in eval.pose(NormalizedTime(0.3)).unwrap() {
        let n = v.normal;
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-5);
    }
}

#[test]
fn unbound_grid_refuses_to_pose() {
    let mut eval = WaveGridEvaluator::unbound(small_grid()).unwrap();
    assert!(eval.clip().is_none());
    assert!(matches!(
        eval.pose(NormalizedTime(0.0)),
        Err(VatError::Precondition(_))
    ));
    eval.bind_clip(Some(AnimationClip::default()));
    assert!(eval.pose(NormalizedTime(0.0)).is_ok());
}

#[test]
fn invalid_mesh_configs_are_rejected() {
    let mut cfg = small_grid();
    cfg.columns = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = small_grid();
    cfg.wavelength = 0.0;
    assert!(cfg.validate().is_err());

    let cfg = GridMeshConfig {
        columns: u32::MAX,
        rows: 2,
        ..GridMeshConfig::default()
    };
    assert!(WaveGridEvaluator::new(cfg, AnimationClip::default()).is_err());
}
