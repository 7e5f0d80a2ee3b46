use crate::{
    dispatch::surface::{AtlasDesc, AtlasHandle, BufferSource, DispatchSurface, VertexBufferHandle},
    foundation::{
        core::{ChannelSet, FrameIndex, VertexChannel, VertexRecord},
        error::{VatError, VatResult},
    },
    layout::planner::TileLayout,
    sample::sampler::SampledFrame,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    /// Nothing allocated yet.
    Idle,
    /// Atlases allocated for the current layout.
    Acquired,
    /// Torn down; may be acquired again.
    Released,
}

/// Owns every device resource of a bake: per-frame buffers, channel atlases, read-back scratch.
///
/// `release` is idempotent and works on any state, including a bake interrupted half way.
/// Nothing here relies on `Drop` of handles; the owner calls `release` at its teardown point.
#[derive(Debug)]
pub struct BakeResources {
    state: ResourceState,
    frames: Vec<Option<VertexBufferHandle>>,
    encoded: Vec<bool>,
    atlases: Vec<(VertexChannel, AtlasHandle)>,
    scratch: Option<VertexBufferHandle>,
}

impl Default for BakeResources {
    fn default() -> Self {
        Self::new()
    }
}

impl BakeResources {
    pub fn new() -> Self {
        Self {
            state: ResourceState::Idle,
            frames: Vec::new(),
            encoded: Vec::new(),
            atlases: Vec::new(),
            scratch: None,
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// True when no handle of any kind is held.
    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(Option::is_none) && self.atlases.is_empty() && self.scratch.is_none()
    }

    fn ensure_acquired(&self, op: &'static str) -> VatResult<()> {
        match self.state {
            ResourceState::Acquired => Ok(()),
            ResourceState::Idle => Err(VatError::lifecycle(format!(
                "{op} called before resources were acquired"
            ))),
            ResourceState::Released => Err(VatError::lifecycle(format!(
                "{op} called after resources were released"
            ))),
        }
    }

    /// Allocates one zero-filled atlas per channel and an empty frame slot per frame.
    #[tracing::instrument(skip_all, fields(atlas_width = layout.atlas_width()))]
    pub fn acquire<S: DispatchSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        layout: &TileLayout,
        channels: ChannelSet,
    ) -> VatResult<()> {
        if self.state == ResourceState::Acquired {
            return Err(VatError::lifecycle(
                "resources already acquired; release before acquiring again",
            ));
        }

        for channel in channels.channels() {
            let desc = AtlasDesc::square(atlas_label(channel), layout.atlas_width());
            match surface.create_atlas(&desc) {
                Ok(atlas) => self.atlases.push((channel, atlas)),
                Err(e) => {
                    // Leave nothing half-acquired behind.
                    if let Err(cleanup) = self.release(surface) {
                        tracing::warn!(
                            error = %cleanup,
                            "failed to release partially acquired resources"
                        );
                    }
                    return Err(e);
                }
            }
        }

        let frames = layout.frame_count() as usize;
        self.frames = std::iter::repeat_with(|| None).take(frames).collect();
        self.encoded = vec![false; frames];
        self.state = ResourceState::Acquired;
        tracing::debug!(atlases = self.atlases.len(), frames, "acquired bake resources");
        Ok(())
    }

    /// Takes ownership of a sampled frame's buffer.
    ///
    /// The buffer is released again if it cannot be stored.
    pub fn store_frame<S: DispatchSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        frame: SampledFrame,
    ) -> VatResult<()> {
        let err = match self.ensure_acquired("store_frame") {
            Err(e) => Some(e),
            Ok(()) => match self.frames.get(frame.index.0 as usize) {
                None => Some(VatError::validation(format!(
                    "frame {} out of range (frame count {})",
                    frame.index.0,
                    self.frames.len()
                ))),
                Some(Some(_)) => Some(VatError::lifecycle(format!(
                    "frame {} already holds a sampled buffer",
                    frame.index.0
                ))),
                Some(None) => None,
            },
        };
        if let Some(e) = err {
            surface.release_vertex_buffer(frame.buffer)?;
            return Err(e);
        }
        self.frames[frame.index.0 as usize] = Some(frame.buffer);
        Ok(())
    }

    /// Stored frame buffers in frame order. Empty slots are skipped.
    pub fn frames(&self) -> VatResult<Vec<(FrameIndex, &VertexBufferHandle)>> {
        self.ensure_acquired("frames")?;
        Ok(self
            .frames
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|b| (FrameIndex(i as u32), b)))
            .collect())
    }

    pub fn sampled_frames(&self) -> usize {
        self.frames.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn atlas(&self, channel: VertexChannel) -> VatResult<&AtlasHandle> {
        self.ensure_acquired("atlas")?;
        self.atlases
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, atlas)| atlas)
            .ok_or_else(|| VatError::validation(format!("channel {channel:?} is not baked")))
    }

    pub fn atlases(&self) -> VatResult<Vec<(VertexChannel, &AtlasHandle)>> {
        self.ensure_acquired("atlases")?;
        Ok(self.atlases.iter().map(|(c, a)| (*c, a)).collect())
    }

    pub fn mark_all_encoded(&mut self) -> VatResult<()> {
        self.ensure_acquired("mark_all_encoded")?;
        self.encoded.iter_mut().for_each(|e| *e = true);
        Ok(())
    }

    /// Whether the last bake finished encoding `frame`.
    pub fn is_encoded(&self, frame: FrameIndex) -> VatResult<bool> {
        self.ensure_acquired("is_encoded")?;
        Ok(self.encoded.get(frame.0 as usize).copied().unwrap_or(false))
    }

    /// Live read-back buffer of `vertex_count` records, created on first use.
    pub fn scratch<S: DispatchSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        vertex_count: u32,
    ) -> VatResult<&VertexBufferHandle> {
        self.ensure_acquired("scratch")?;
        if self
            .scratch
            .as_ref()
            .is_some_and(|s| s.len() != vertex_count)
            && let Some(stale) = self.scratch.take()
        {
            surface.release_vertex_buffer(stale)?;
        }
        if self.scratch.is_none() {
            let zeros = vec![VertexRecord::default(); vertex_count as usize];
            self.scratch = Some(surface.create_vertex_buffer(&zeros, BufferSource::Live)?);
        }
        self.scratch
            .as_ref()
            .ok_or_else(|| VatError::lifecycle("scratch buffer missing after creation"))
    }

    /// Scratch buffer created by an earlier [`BakeResources::scratch`] call.
    pub fn scratch_handle(&self) -> VatResult<&VertexBufferHandle> {
        self.ensure_acquired("scratch_handle")?;
        self.scratch
            .as_ref()
            .ok_or_else(|| VatError::lifecycle("no scratch buffer has been created"))
    }

    /// Releases the transient per-frame buffers, keeping atlases and scratch.
    pub fn release_frames<S: DispatchSurface + ?Sized>(&mut self, surface: &mut S) -> VatResult<()> {
        let mut first_err = None;
        for slot in self.frames.iter_mut() {
            if let Some(buffer) = slot.take()
                && let Err(e) = surface.release_vertex_buffer(buffer)
            {
                first_err.get_or_insert(e);
            }
        }
        self.encoded.iter_mut().for_each(|e| *e = false);
        first_err.map_or(Ok(()), Err)
    }

    /// Releases everything held and records `Released`. Safe to call repeatedly.
    ///
    /// Keeps going past individual failures; the first one is returned.
    #[tracing::instrument(skip_all)]
    pub fn release<S: DispatchSurface + ?Sized>(&mut self, surface: &mut S) -> VatResult<()> {
        let mut first_err = self.release_frames(surface).err();
        self.frames.clear();
        self.encoded.clear();

        if let Some(scratch) = self.scratch.take()
            && let Err(e) = surface.release_vertex_buffer(scratch)
        {
            first_err.get_or_insert(e);
        }
        for (channel, atlas) in self.atlases.drain(..) {
            if let Err(e) = surface.release_atlas(atlas) {
                tracing::warn!(?channel, error = %e, "failed to release atlas");
                first_err.get_or_insert(e);
            }
        }

        if self.state != ResourceState::Released {
            tracing::debug!("released bake resources");
        }
        self.state = ResourceState::Released;
        first_err.map_or(Ok(()), Err)
    }
}

fn atlas_label(channel: VertexChannel) -> &'static str {
    match channel {
        VertexChannel::Position => "vat_position_atlas",
        VertexChannel::Normal => "vat_normal_atlas",
        VertexChannel::Tangent => "vat_tangent_atlas",
    }
}

#[cfg(test)]
#[path = "../../tests/unit/lifecycle/resources.rs"]
mod tests;
