use crate::{
    dispatch::surface::{AtlasHandle, Bindings, DispatchSurface, KernelId, VertexBufferHandle},
    foundation::{
        core::{FrameIndex, VertexChannel},
        error::{VatError, VatResult},
    },
    layout::planner::TileLayout,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DecodeReport {
    pub frame: FrameIndex,
    pub dispatches: u32,
    /// `(target_len, baked_vertex_count)` when they differ.
    pub mismatch: Option<(u32, u32)>,
}

/// Restores one frame from the atlases into a vertex buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeDispatcher;

impl DecodeDispatcher {
    #[tracing::instrument(skip_all, fields(frame = frame.0))]
    pub fn decode<S: DispatchSurface + ?Sized>(
        surface: &mut S,
        layout: &TileLayout,
        atlases: &[(VertexChannel, &AtlasHandle)],
        frame: FrameIndex,
        target: &VertexBufferHandle,
    ) -> VatResult<DecodeReport> {
        let start_pixel = layout.tile_origin(frame)?;
        if atlases.is_empty() {
            return Err(VatError::validation("decode needs at least one channel atlas"));
        }

        let mismatch = (target.len() != layout.vertex_count()).then(|| {
            tracing::warn!(
                frame = frame.0,
                target_vertices = target.len(),
                baked_vertices = layout.vertex_count(),
                "decode target does not match baked vertex count"
            );
            (target.len(), layout.vertex_count())
        });

        // Sized from the bake; the surface drops lanes past the target's end or the baked count.
        let groups_x = layout.thread_groups(surface.group_size_x(KernelId::Decode))?;
        let mut dispatches = 0;
        for (channel, atlas) in atlases {
            let bindings = Bindings {
                result: atlas,
                gpu_vertices: target,
                start_pixel,
                frame_width: layout.tile_width(),
                vertex_count: layout.vertex_count(),
                channel: *channel,
            };
            tracing::debug!(?channel, groups_x, "decode dispatch");
            surface.dispatch(KernelId::Decode, &bindings, [groups_x, 1, 1])?;
            dispatches += 1;
        }

        Ok(DecodeReport {
            frame,
            dispatches,
            mismatch,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dispatch/decode.rs"]
mod tests;
