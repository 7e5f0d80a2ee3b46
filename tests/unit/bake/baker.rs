use super::*;
use crate::{
    dispatch::{
        cpu::CpuSurface,
        surface::{AtlasDesc, Bindings, BufferSource, KernelId},
    },
    foundation::core::{AnimationClip, ChannelSet, NormalizedTime},
    sample::procedural::{GridMeshConfig, WaveGridEvaluator},
};

/// CPU surface whose `fail_on`-th dispatch reports a device failure, once.
/// `fail_atlas_on` does the same for atlas creation.
struct FlakySurface {
    inner: CpuSurface,
    fail_on: Option<u64>,
    dispatches: u64,
    fail_atlas_on: Option<u64>,
    atlases_created: u64,
}

impl FlakySurface {
    fn failing_on(n: u64) -> Self {
        Self {
            inner: CpuSurface::with_group_size(4),
            fail_on: Some(n),
            dispatches: 0,
            fail_atlas_on: None,
            atlases_created: 0,
        }
    }

    fn failing_atlas_on(n: u64) -> Self {
        Self {
            fail_on: None,
            fail_atlas_on: Some(n),
            ..Self::failing_on(0)
        }
    }
}

impl DispatchSurface for FlakySurface {
    fn group_size_x(&self, kernel: KernelId) -> u32 {
        self.inner.group_size_x(kernel)
    }

    fn create_atlas(&mut self, desc: &AtlasDesc) -> VatResult<AtlasHandle> {
        self.atlases_created += 1;
        if self.fail_atlas_on == Some(self.atlases_created) {
            self.fail_atlas_on = None;
            return Err(VatError::dispatch("atlas exceeds device limits"));
        }
        self.inner.create_atlas(desc)
    }

    fn release_atlas(&mut self, atlas: AtlasHandle) -> VatResult<()> {
        self.inner.release_atlas(atlas)
    }

    fn create_vertex_buffer(
        &mut self,
        vertices: &[VertexRecord],
        source: BufferSource,
    ) -> VatResult<VertexBufferHandle> {
        self.inner.create_vertex_buffer(vertices, source)
    }

    fn release_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> VatResult<()> {
        self.inner.release_vertex_buffer(buffer)
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        bindings: &Bindings<'_>,
        groups: [u32; 3],
    ) -> VatResult<()> {
        self.dispatches += 1;
        if self.fail_on == Some(self.dispatches) {
            self.fail_on = None;
            return Err(VatError::dispatch("device lost"));
        }
        self.inner.dispatch(kernel, bindings, groups)
    }

    fn read_vertex_buffer(&mut self, buffer: &VertexBufferHandle) -> VatResult<Vec<VertexRecord>> {
        self.inner.read_vertex_buffer(buffer)
    }

    fn read_atlas(&mut self, atlas: &AtlasHandle) -> VatResult<AtlasImage> {
        self.inner.read_atlas(atlas)
    }
}

fn mesh(columns: u32, rows: u32) -> GridMeshConfig {
    GridMeshConfig {
        columns,
        rows,
        ..GridMeshConfig::default()
    }
}

fn clip() -> AnimationClip {
    AnimationClip::new(12.0, 0.5).unwrap()
}

fn baker_for(mesh: &GridMeshConfig, channels: ChannelSet) -> VatBaker<CpuSurface> {
    let params = BakeParams::new(mesh.vertex_count(), clip()).with_channels(channels);
    VatBaker::new(CpuSurface::with_group_size(4), params).unwrap()
}

fn bits(v: &[f32]) -> Vec<u32> {
    v.iter().map(|f| f.to_bits()).collect()
}

#[test]
fn bake_then_read_frame_restores_every_channel_bitwise() {
    let mesh = mesh(5, 3);
    let mut baker = baker_for(&mesh, ChannelSet::all());
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();

    let stats = baker.bake(&mut evaluator).unwrap();
    assert_eq!(stats.frames, 6);
    assert_eq!(stats.channels, 3);
    assert_eq!(stats.dispatches, 18);
    assert_eq!(stats.texels_written, 15 * 6 * 3);
    assert_eq!(baker.surface().live_buffers(), 0);

    let mut reference = WaveGridEvaluator::new(mesh, clip()).unwrap();
    for frame in baker.layout().frames() {
        let restored = baker.read_frame(frame).unwrap();
        let expected = reference
            .pose(NormalizedTime::of_frame(frame, 6))
            .unwrap();
        assert_eq!(restored.len(), expected.len());
        for (got, want) in restored.iter().zip(&expected) {
            assert_eq!(bits(&got.position), bits(&want.position));
            assert_eq!(bits(&got.normal), bits(&want.normal));
            assert_eq!(bits(&got.tangent), bits(&want.tangent));
        }
    }
    // Only the scratch buffer remains.
    assert_eq!(baker.surface().live_buffers(), 1);
}

#[test]
fn padding_texels_read_zero_after_bake() {
    let mesh = mesh(5, 3);
    let mut baker = baker_for(&mesh, ChannelSet::position_only());
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();
    let stats = baker.bake(&mut evaluator).unwrap();

    let layout = *baker.layout();
    assert_eq!(stats.padding_texels, layout.padding_texels());
    let image = baker.read_atlas(VertexChannel::Position).unwrap();
    let mut padding = 0;
    for y in 0..image.height {
        for x in 0..image.width {
            let texel = image.texel(x, y).unwrap();
            if layout.is_padding_texel(x, y) {
                assert_eq!(texel, [0.0; 4], "padding texel ({x}, {y})");
                padding += 1;
            } else {
                assert_eq!(texel[3], 1.0);
            }
        }
    }
    assert_eq!(padding, layout.padding_texels());
}

#[test]
fn decode_before_bake_is_refused() {
    let mesh = mesh(4, 4);
    let mut baker = baker_for(&mesh, ChannelSet::position_only());
    let err = baker.read_frame(FrameIndex(0)).unwrap_err();
    assert!(matches!(err, VatError::Lifecycle(_)));

    let target = baker
        .surface_mut()
        .create_vertex_buffer(&[VertexRecord::default(); 16], BufferSource::Live)
        .unwrap();
    assert!(matches!(
        baker.decode_frame(FrameIndex(0), &target),
        Err(VatError::Lifecycle(_))
    ));
    baker.surface_mut().release_vertex_buffer(target).unwrap();
}

#[test]
fn decode_frame_into_shorter_live_buffer_proceeds() {
    let mesh = mesh(4, 4);
    let mut baker = baker_for(&mesh, ChannelSet::position_only());
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();
    baker.bake(&mut evaluator).unwrap();

    let target = baker
        .surface_mut()
        .create_vertex_buffer(&[VertexRecord::default(); 10], BufferSource::Live)
        .unwrap();
    let report = baker.decode_frame(FrameIndex(2), &target).unwrap();
    assert_eq!(report.mismatch, Some((10, 16)));
    let restored = baker.surface_mut().read_vertex_buffer(&target).unwrap();
    assert_eq!(restored.len(), 10);
    assert_eq!(restored[9].position[0], 1.0);
    baker.surface_mut().release_vertex_buffer(target).unwrap();
}

#[test]
fn update_replans_and_requires_a_new_bake() {
    let small = mesh(4, 4);
    let mut baker = baker_for(&small, ChannelSet::position_only());
    let mut evaluator = WaveGridEvaluator::new(small, clip()).unwrap();
    baker.bake(&mut evaluator).unwrap();
    assert_eq!(baker.layout_info().tile_width, 4);

    let large = mesh(10, 10);
    let info = baker
        .update(BakeUpdate {
            vertex_count: Some(large.vertex_count()),
            channels: Some(ChannelSet::all()),
            ..BakeUpdate::default()
        })
        .unwrap();
    assert_eq!(info.vertex_count, 100);
    assert_eq!(info.tile_width, 10);
    assert_eq!(info.frame_count, 6);
    assert_eq!(info.atlas_width, 30);
    assert_eq!(baker.surface().live_atlases(), 3);
    assert!(matches!(
        baker.read_frame(FrameIndex(0)),
        Err(VatError::Lifecycle(_))
    ));

    // The old evaluator no longer matches the layout.
    assert!(matches!(
        baker.bake(&mut evaluator),
        Err(VatError::Validation(_))
    ));
    let mut evaluator = WaveGridEvaluator::new(large, clip()).unwrap();
    baker.bake(&mut evaluator).unwrap();
    assert_eq!(baker.read_frame(FrameIndex(5)).unwrap().len(), 100);
}

#[test]
fn invalid_update_keeps_current_configuration() {
    let mesh = mesh(4, 4);
    let mut baker = baker_for(&mesh, ChannelSet::position_only());
    let before = baker.layout_info();
    let err = baker
        .update(BakeUpdate {
            vertex_count: Some(0),
            ..BakeUpdate::default()
        })
        .unwrap_err();
    assert!(matches!(err, VatError::Validation(_)));
    assert_eq!(baker.layout_info(), before);
    assert_eq!(baker.surface().live_atlases(), 1);
}

#[test]
fn failed_allocation_on_update_keeps_current_atlases() {
    let mesh = mesh(4, 4);
    let params = BakeParams::new(mesh.vertex_count(), clip());
    // Creation 1 is the position atlas; the update creates 2 (position) and fails on 3 (normal).
    let mut baker = VatBaker::new(FlakySurface::failing_atlas_on(3), params).unwrap();
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();
    baker.bake(&mut evaluator).unwrap();
    let before = baker.read_frame(FrameIndex(2)).unwrap();

    let err = baker
        .update(BakeUpdate {
            vertex_count: Some(100),
            channels: Some(ChannelSet::all()),
            ..BakeUpdate::default()
        })
        .unwrap_err();
    assert!(matches!(err, VatError::Dispatch(_)));
    assert_eq!(baker.params(), &params);
    assert_eq!(baker.layout_info().vertex_count, 16);
    // The half-built position atlas was released again.
    assert_eq!(baker.surface().inner.live_atlases(), 1);
    assert_eq!(baker.read_frame(FrameIndex(2)).unwrap(), before);

    baker.release().unwrap();
    assert_eq!(baker.surface().inner.live_atlases(), 0);
}

#[test]
fn decode_frame_into_longer_live_buffer_proceeds() {
    let mesh = mesh(5, 1);
    let mut baker = baker_for(&mesh, ChannelSet::position_only());
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();
    baker.bake(&mut evaluator).unwrap();

    for len in [6usize, 10, 64] {
        let target = baker
            .surface_mut()
            .create_vertex_buffer(&vec![VertexRecord::default(); len], BufferSource::Live)
            .unwrap();
        for frame in baker.layout().frames() {
            let report = baker.decode_frame(frame, &target).unwrap();
            assert_eq!(report.mismatch, Some((len as u32, 5)));
            let restored = baker.surface_mut().read_vertex_buffer(&target).unwrap();
            assert_eq!(restored[4].position[0], 4.0);
            assert!(restored[5..].iter().all(|v| *v == VertexRecord::default()));
        }
        baker.surface_mut().release_vertex_buffer(target).unwrap();
    }
}

#[test]
fn release_is_idempotent_and_blocks_further_use() {
    let mesh = mesh(3, 3);
    let mut baker = baker_for(&mesh, ChannelSet::all());
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();
    baker.bake(&mut evaluator).unwrap();
    baker.read_frame(FrameIndex(1)).unwrap();

    baker.release().unwrap();
    baker.release().unwrap();
    assert!(baker.is_released());
    assert_eq!(baker.surface().live_buffers(), 0);
    assert_eq!(baker.surface().live_atlases(), 0);

    assert!(matches!(
        baker.bake(&mut evaluator),
        Err(VatError::Lifecycle(_))
    ));
    assert!(matches!(
        baker.read_atlas(VertexChannel::Position),
        Err(VatError::Lifecycle(_))
    ));

    // A released baker can be configured again.
    baker.update(BakeUpdate::default()).unwrap();
    assert!(!baker.is_released());
    baker.bake(&mut evaluator).unwrap();
}

#[test]
fn unbound_evaluator_fails_before_any_upload() {
    let mesh = mesh(3, 3);
    let mut baker = baker_for(&mesh, ChannelSet::position_only());
    let mut evaluator = WaveGridEvaluator::unbound(mesh).unwrap();
    assert!(matches!(
        baker.bake(&mut evaluator),
        Err(VatError::Precondition(_))
    ));
    assert_eq!(baker.surface().live_buffers(), 0);
}

#[test]
fn dispatch_failure_mid_bake_propagates_and_release_cleans_up() {
    let mesh = mesh(5, 3);
    let params = BakeParams::new(mesh.vertex_count(), clip());
    let mut baker = VatBaker::new(FlakySurface::failing_on(3), params).unwrap();
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();

    let err = baker.bake(&mut evaluator).unwrap_err();
    assert!(matches!(err, VatError::Dispatch(_)));
    assert_eq!(baker.surface().inner.live_buffers(), 6);
    assert!(matches!(
        baker.read_frame(FrameIndex(0)),
        Err(VatError::Lifecycle(_))
    ));

    baker.release().unwrap();
    assert_eq!(baker.surface().inner.live_buffers(), 0);
    assert_eq!(baker.surface().inner.live_atlases(), 0);
}

#[test]
fn interrupted_bake_can_be_rerun() {
    let mesh = mesh(5, 3);
    let params = BakeParams::new(mesh.vertex_count(), clip());
    let mut baker = VatBaker::new(FlakySurface::failing_on(2), params).unwrap();
    let mut evaluator = WaveGridEvaluator::new(mesh, clip()).unwrap();

    assert!(baker.bake(&mut evaluator).is_err());
    let stats = baker.bake(&mut evaluator).unwrap();
    assert_eq!(stats.frames, 6);
    assert_eq!(baker.surface().inner.live_buffers(), 0);
    assert_eq!(baker.read_frame(FrameIndex(4)).unwrap().len(), 15);
}
