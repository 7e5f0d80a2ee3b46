use crate::{
    dispatch::surface::{AtlasHandle, Bindings, DispatchSurface, KernelId, VertexBufferHandle},
    foundation::{
        core::{FrameIndex, VertexChannel},
        error::{VatError, VatResult},
    },
    layout::planner::TileLayout,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct EncodeReport {
    pub frames: u32,
    pub dispatches: u32,
    pub texels_written: u64,
}

/// Writes sampled frames into their tiles, one kernel-0 dispatch per frame and channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeDispatcher;

impl EncodeDispatcher {
    /// `frames` must hold every frame of `layout` exactly once, each with `vertex_count` records.
    /// Nothing is dispatched unless that holds.
    #[tracing::instrument(skip_all, fields(frames = frames.len(), channels = atlases.len()))]
    pub fn encode<S: DispatchSurface + ?Sized>(
        surface: &mut S,
        layout: &TileLayout,
        atlases: &[(VertexChannel, &AtlasHandle)],
        frames: &[(FrameIndex, &VertexBufferHandle)],
    ) -> VatResult<EncodeReport> {
        check_frame_set(layout, frames)?;
        if atlases.is_empty() {
            return Err(VatError::validation("encode needs at least one channel atlas"));
        }
        for (channel, atlas) in atlases {
            if atlas.width() != layout.atlas_width() || atlas.height() != layout.atlas_width() {
                return Err(VatError::validation(format!(
                    "{channel:?} atlas is {}x{}, layout needs {}x{}",
                    atlas.width(),
                    atlas.height(),
                    layout.atlas_width(),
                    layout.atlas_width()
                )));
            }
        }

        let groups_x = layout.thread_groups(surface.group_size_x(KernelId::Encode))?;
        let mut report = EncodeReport::default();
        for (frame, buffer) in frames {
            let start_pixel = layout.tile_origin(*frame)?;
            for (channel, atlas) in atlases {
                let bindings = Bindings {
                    result: atlas,
                    gpu_vertices: buffer,
                    start_pixel,
                    frame_width: layout.tile_width(),
                    vertex_count: layout.vertex_count(),
                    channel: *channel,
                };
                tracing::debug!(
                    frame = frame.0,
                    ?channel,
                    x = start_pixel.x,
                    y = start_pixel.y,
                    groups_x,
                    "encode dispatch"
                );
                surface.dispatch(KernelId::Encode, &bindings, [groups_x, 1, 1])?;
                report.dispatches += 1;
                report.texels_written += u64::from(layout.vertex_count());
            }
            report.frames += 1;
        }
        Ok(report)
    }
}

fn check_frame_set(layout: &TileLayout, frames: &[(FrameIndex, &VertexBufferHandle)]) -> VatResult<()> {
    let mut seen = vec![false; layout.frame_count() as usize];
    for (frame, buffer) in frames {
        layout.check_frame(*frame)?;
        let slot = &mut seen[frame.0 as usize];
        if *slot {
            return Err(VatError::validation(format!("frame {} supplied twice", frame.0)));
        }
        *slot = true;
        if buffer.len() != layout.vertex_count() {
            return Err(VatError::validation(format!(
                "frame {}: buffer holds {} vertices, expected {}",
                frame.0,
                buffer.len(),
                layout.vertex_count()
            )));
        }
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(VatError::validation(format!(
            "frame {missing} was never sampled ({} of {} frames supplied)",
            frames.len(),
            layout.frame_count()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/dispatch/encode.rs"]
mod tests;
