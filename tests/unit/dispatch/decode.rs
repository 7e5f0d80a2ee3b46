use super::*;
use crate::{
    dispatch::{cpu::CpuSurface, encode::EncodeDispatcher, surface::{AtlasDesc, BufferSource}},
    foundation::core::{TileOrigin, VertexRecord},
};

fn posed(frame: u32, n: u32) -> Vec<VertexRecord> {
    (0..n)
        .map(|v| {
            let t = frame as f32 * 0.1 + v as f32;
            VertexRecord::new([t, -t, t * 0.5], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0, 1.0])
        })
        .collect()
}

/// Bakes `frames` frames of `vertices` vertices into a position atlas.
fn baked(vertices: u32, frames: u32) -> (CpuSurface, TileLayout, AtlasHandle) {
    let layout = TileLayout::plan(vertices, frames).unwrap();
    let mut surface = CpuSurface::with_group_size(8);
    let atlas = surface
        .create_atlas(&AtlasDesc::square("p", layout.atlas_width()))
        .unwrap();
    let buffers: Vec<_> = layout
        .frames()
        .map(|f| {
            surface
                .create_vertex_buffer(&posed(f.0, vertices), BufferSource::Baked)
                .unwrap()
        })
        .collect();
    let frame_refs: Vec<_> = buffers
        .iter()
        .enumerate()
        .map(|(i, b)| (FrameIndex(i as u32), b))
        .collect();
    EncodeDispatcher::encode(
        &mut surface,
        &layout,
        &[(VertexChannel::Position, &atlas)],
        &frame_refs,
    )
    .unwrap();
    for b in buffers {
        surface.release_vertex_buffer(b).unwrap();
    }
    (surface, layout, atlas)
}

#[test]
fn decode_restores_positions_bitwise() {
    let (mut surface, layout, atlas) = baked(10, 5);
    let target = surface
        .create_vertex_buffer(&vec![VertexRecord::default(); 10], BufferSource::Live)
        .unwrap();

    for frame in layout.frames() {
        let report = DecodeDispatcher::decode(
            &mut surface,
            &layout,
            &[(VertexChannel::Position, &atlas)],
            frame,
            &target,
        )
        .unwrap();
        assert_eq!(report.mismatch, None);
        assert_eq!(report.dispatches, 1);

        let restored = surface.read_vertex_buffer(&target).unwrap();
        for (got, want) in restored.iter().zip(posed(frame.0, 10)) {
            assert_eq!(got.position.map(f32::to_bits), want.position.map(f32::to_bits));
            // Position decode leaves other channels alone.
            assert_eq!(got.normal, [0.0; 3]);
        }
    }
}

#[test]
fn mismatched_target_warns_and_proceeds() {
    let (mut surface, layout, atlas) = baked(10, 2);
    let target = surface
        .create_vertex_buffer(&vec![VertexRecord::default(); 6], BufferSource::Live)
        .unwrap();

    let report = DecodeDispatcher::decode(
        &mut surface,
        &layout,
        &[(VertexChannel::Position, &atlas)],
        FrameIndex(1),
        &target,
    )
    .unwrap();
    assert_eq!(report.mismatch, Some((6, 10)));

    let restored = surface.read_vertex_buffer(&target).unwrap();
    assert_eq!(restored.len(), 6);
    assert_eq!(restored[5].position, posed(1, 10)[5].position);
}

#[test]
fn longer_target_stops_at_baked_vertex_count() {
    // 5 vertices, 4 frames: tile 3, atlas 6; one group of 8 lanes covers the frame.
    let (mut surface, layout, atlas) = baked(5, 4);
    let last = FrameIndex(layout.frame_count() - 1);
    assert_eq!(layout.tile_origin(last).unwrap(), TileOrigin::new(3, 3));
    let target = surface
        .create_vertex_buffer(&vec![VertexRecord::default(); 10], BufferSource::Live)
        .unwrap();

    let report = DecodeDispatcher::decode(
        &mut surface,
        &layout,
        &[(VertexChannel::Position, &atlas)],
        last,
        &target,
    )
    .unwrap();
    assert_eq!(report.mismatch, Some((10, 5)));

    let restored = surface.read_vertex_buffer(&target).unwrap();
    for (got, want) in restored.iter().zip(posed(last.0, 5)) {
        assert_eq!(got.position.map(f32::to_bits), want.position.map(f32::to_bits));
    }
    assert!(restored[5..].iter().all(|v| *v == VertexRecord::default()));
}

#[test]
fn out_of_range_frame_is_rejected() {
    let (mut surface, layout, atlas) = baked(4, 3);
    let target = surface
        .create_vertex_buffer(&vec![VertexRecord::default(); 4], BufferSource::Live)
        .unwrap();
    let err = DecodeDispatcher::decode(
        &mut surface,
        &layout,
        &[(VertexChannel::Position, &atlas)],
        FrameIndex(3),
        &target,
    )
    .unwrap_err();
    assert!(matches!(err, VatError::Validation(_)));
    assert_eq!(surface.dispatch_count(), 3);
}
