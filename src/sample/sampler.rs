use crate::{
    dispatch::surface::{BufferSource, DispatchSurface, VertexBufferHandle},
    foundation::{
        core::{FrameIndex, NormalizedTime},
        error::{VatError, VatResult},
    },
    layout::planner::TileLayout,
    lifecycle::resources::BakeResources,
    sample::evaluator::PoseEvaluator,
};

/// One posed frame, uploaded and waiting to be encoded.
#[derive(Debug)]
pub struct SampledFrame {
    pub index: FrameIndex,
    pub buffer: VertexBufferHandle,
}

/// Samples a clip at `i / frame_count` for `i` in `0..frame_count`, strictly in order.
///
/// The sampler holds the evaluator's exclusive borrow for as long as it lives.
pub struct FrameSampler<'e, E: PoseEvaluator + ?Sized> {
    evaluator: &'e mut E,
    frame_count: u32,
    vertex_count: u32,
}

impl<'e, E: PoseEvaluator + ?Sized> FrameSampler<'e, E> {
    /// Checks the evaluator can be sampled for `layout` before any pose is taken.
    pub fn bind(evaluator: &'e mut E, layout: &TileLayout) -> VatResult<Self> {
        let Some(clip) = evaluator.clip() else {
            return Err(VatError::precondition("pose evaluator has no bound clip"));
        };
        if clip.is_zero_length() {
            return Err(VatError::precondition(format!(
                "bound clip has zero length ({} s)",
                clip.duration_secs
            )));
        }
        if evaluator.vertex_count() != layout.vertex_count() {
            return Err(VatError::validation(format!(
                "evaluator poses {} vertices but layout was planned for {}",
                evaluator.vertex_count(),
                layout.vertex_count()
            )));
        }
        Ok(Self {
            evaluator,
            frame_count: layout.frame_count(),
            vertex_count: layout.vertex_count(),
        })
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Sample schedule: frame `i` at normalized time `i / frame_count`.
    pub fn sample_times(&self) -> impl Iterator<Item = (FrameIndex, NormalizedTime)> + use<E> {
        let frame_count = self.frame_count;
        (0..frame_count).map(move |i| {
            let frame = FrameIndex(i);
            (frame, NormalizedTime::of_frame(frame, frame_count))
        })
    }

    /// Poses and uploads a single frame.
    pub fn sample_frame<S: DispatchSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        frame: FrameIndex,
    ) -> VatResult<SampledFrame> {
        if frame.0 >= self.frame_count {
            return Err(VatError::validation(format!(
                "frame {} out of range (frame count {})",
                frame.0, self.frame_count
            )));
        }
        let time = NormalizedTime::of_frame(frame, self.frame_count);
        let vertices = self.evaluator.pose(time)?;
        if vertices.len() != self.vertex_count as usize {
            return Err(VatError::validation(format!(
                "frame {}: evaluator returned {} vertices, expected {}",
                frame.0,
                vertices.len(),
                self.vertex_count
            )));
        }
        let buffer = surface.create_vertex_buffer(&vertices, BufferSource::Baked)?;
        Ok(SampledFrame {
            index: frame,
            buffer,
        })
    }

    /// Samples every frame in order, handing each buffer to `resources` before the next pose.
    ///
    /// On error the frames sampled so far stay in `resources` and are freed by its release.
    #[tracing::instrument(skip_all, fields(frames = self.frame_count))]
    pub fn sample_into<S: DispatchSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        resources: &mut BakeResources,
    ) -> VatResult<u32> {
        for i in 0..self.frame_count {
            let frame = self.sample_frame(surface, FrameIndex(i))?;
            resources.store_frame(surface, frame)?;
        }
        tracing::debug!(frames = self.frame_count, "sampled clip");
        Ok(self.frame_count)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sample/sampler.rs"]
mod tests;
