use std::time::Instant;

use crate::{
    bake::config::{BakeParams, BakeUpdate},
    dispatch::{
        decode::{DecodeDispatcher, DecodeReport},
        encode::EncodeDispatcher,
        surface::{AtlasHandle, AtlasImage, DispatchSurface, VertexBufferHandle},
    },
    foundation::{
        core::{FrameIndex, VertexChannel, VertexRecord},
        error::{VatError, VatResult},
    },
    layout::planner::{LayoutInfo, TileLayout},
    lifecycle::resources::{BakeResources, ResourceState},
    sample::{evaluator::PoseEvaluator, sampler::FrameSampler},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
pub struct BakeStats {
    pub frames: u32,
    pub channels: u32,
    pub dispatches: u32,
    pub texels_written: u64,
    pub padding_texels: u64,
    pub elapsed_ms: f64,
}

/// Bakes an animation into per-channel vertex animation atlases on a dispatch surface.
///
/// The baker owns the surface and every resource allocated on it. Construction and
/// [`VatBaker::update`] go through the same path: plan the layout, acquire atlases for it, then
/// release whatever the previous configuration held. Invalid parameters and failed allocations
/// are rejected before anything is released.
///
/// Teardown is [`VatBaker::release`]; dropping a baker that was not released runs it too.
pub struct VatBaker<S: DispatchSurface> {
    surface: S,
    params: BakeParams,
    layout: TileLayout,
    resources: BakeResources,
}

impl<S: DispatchSurface> VatBaker<S> {
    pub fn new(surface: S, params: BakeParams) -> VatResult<Self> {
        let layout = TileLayout::for_clip(params.vertex_count, &params.clip)?;
        let mut baker = Self {
            surface,
            params,
            layout,
            resources: BakeResources::new(),
        };
        baker.configure(params, layout)?;
        Ok(baker)
    }

    pub fn params(&self) -> &BakeParams {
        &self.params
    }

    pub fn layout(&self) -> &TileLayout {
        &self.layout
    }

    pub fn layout_info(&self) -> LayoutInfo {
        self.layout.info()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Re-plans with the fields `update` sets and re-acquires atlases.
    ///
    /// Atlases of the previous configuration are released, so the baker must be baked again
    /// before decoding. Works on a released baker as well. If planning or allocation fails, the
    /// previous configuration stays in effect.
    pub fn update(&mut self, update: BakeUpdate) -> VatResult<LayoutInfo> {
        let params = self.params.merged(&update);
        let layout = TileLayout::for_clip(params.vertex_count, &params.clip)?;
        self.configure(params, layout)?;
        Ok(self.layout.info())
    }

    /// Acquires resources for the new configuration, then swaps out the old ones.
    ///
    /// A failed acquire leaves the current configuration and its atlases untouched. If releasing
    /// the old resources fails, the new configuration is already in place and the error is
    /// returned.
    fn configure(&mut self, params: BakeParams, layout: TileLayout) -> VatResult<()> {
        let mut next = BakeResources::new();
        next.acquire(&mut self.surface, &layout, params.channels)?;
        let mut previous = std::mem::replace(&mut self.resources, next);
        let released = previous.release(&mut self.surface);
        self.params = params;
        self.layout = layout;
        tracing::debug!(
            vertex_count = layout.vertex_count(),
            frame_count = layout.frame_count(),
            atlas_width = layout.atlas_width(),
            "configured baker"
        );
        released
    }

    /// Samples every frame from `evaluator` and encodes it into the atlases.
    ///
    /// Per-frame buffers are released once encoded. On error they stay owned by the baker until
    /// the next bake or [`VatBaker::release`].
    #[tracing::instrument(
        skip_all,
        fields(vertices = self.layout.vertex_count(), frames = self.layout.frame_count())
    )]
    pub fn bake<E: PoseEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> VatResult<BakeStats> {
        self.ensure_ready("bake")?;
        let started = Instant::now();

        // Leftovers from an interrupted bake; also clears the encoded flags.
        self.resources.release_frames(&mut self.surface)?;

        let mut sampler = FrameSampler::bind(evaluator, &self.layout)?;
        let frames = sampler.sample_into(&mut self.surface, &mut self.resources)?;

        let report = {
            let atlases = self.resources.atlases()?;
            let frame_buffers = self.resources.frames()?;
            EncodeDispatcher::encode(&mut self.surface, &self.layout, &atlases, &frame_buffers)?
        };

        self.resources.release_frames(&mut self.surface)?;
        self.resources.mark_all_encoded()?;

        let channels = self.params.channels.channels().len() as u32;
        let stats = BakeStats {
            frames,
            channels,
            dispatches: report.dispatches,
            texels_written: report.texels_written,
            padding_texels: self.layout.padding_texels() * u64::from(channels),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        tracing::info!(
            frames = stats.frames,
            channels = stats.channels,
            atlas_width = self.layout.atlas_width(),
            dispatches = stats.dispatches,
            elapsed_ms = stats.elapsed_ms,
            "baked vertex animation"
        );
        Ok(stats)
    }

    pub fn atlas(&self, channel: VertexChannel) -> VatResult<&AtlasHandle> {
        self.resources.atlas(channel)
    }

    pub fn read_atlas(&mut self, channel: VertexChannel) -> VatResult<AtlasImage> {
        let atlas = self.resources.atlas(channel)?;
        self.surface.read_atlas(atlas)
    }

    /// Restores `frame` of the last bake into `target`, every baked channel.
    ///
    /// Refused until a bake has encoded `frame`.
    pub fn decode_frame(
        &mut self,
        frame: FrameIndex,
        target: &VertexBufferHandle,
    ) -> VatResult<DecodeReport> {
        self.ensure_decodable(frame)?;
        let atlases = self.resources.atlases()?;
        DecodeDispatcher::decode(&mut self.surface, &self.layout, &atlases, frame, target)
    }

    /// Decodes `frame` into the baker's scratch buffer and reads it back.
    pub fn read_frame(&mut self, frame: FrameIndex) -> VatResult<Vec<VertexRecord>> {
        self.ensure_decodable(frame)?;
        self.resources
            .scratch(&mut self.surface, self.layout.vertex_count())?;
        let atlases = self.resources.atlases()?;
        let scratch = self.resources.scratch_handle()?;
        DecodeDispatcher::decode(&mut self.surface, &self.layout, &atlases, frame, scratch)?;
        self.surface.read_vertex_buffer(scratch)
    }

    /// Releases every resource held on the surface. Idempotent.
    pub fn release(&mut self) -> VatResult<()> {
        self.resources.release(&mut self.surface)
    }

    pub fn is_released(&self) -> bool {
        self.resources.state() == ResourceState::Released
    }

    fn ensure_ready(&self, op: &'static str) -> VatResult<()> {
        match self.resources.state() {
            ResourceState::Acquired => Ok(()),
            ResourceState::Released => Err(VatError::lifecycle(format!(
                "{op} called on a released baker"
            ))),
            ResourceState::Idle => Err(VatError::lifecycle(format!(
                "{op} called before the baker was configured"
            ))),
        }
    }

    fn ensure_decodable(&self, frame: FrameIndex) -> VatResult<()> {
        self.ensure_ready("decode")?;
        self.layout.check_frame(frame)?;
        if !self.resources.is_encoded(frame)? {
            return Err(VatError::lifecycle(format!(
                "frame {} has not been encoded by a completed bake",
                frame.0
            )));
        }
        Ok(())
    }
}

impl<S: DispatchSurface> Drop for VatBaker<S> {
    fn drop(&mut self) {
        if let Err(e) = self.resources.release(&mut self.surface) {
            tracing::warn!(error = %e, "failed to release bake resources on drop");
        }
    }
}

impl<S: DispatchSurface> std::fmt::Debug for VatBaker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VatBaker")
            .field("params", &self.params)
            .field("layout", &self.layout)
            .field("resources", &self.resources)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bake/baker.rs"]
mod tests;
