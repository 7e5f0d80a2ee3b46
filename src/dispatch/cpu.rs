use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    dispatch::surface::{
        AtlasDesc, AtlasHandle, AtlasId, AtlasImage, Bindings, BufferId, BufferSource,
        DispatchSurface, KernelId, VertexBufferHandle,
    },
    foundation::{
        core::VertexRecord,
        error::{VatError, VatResult},
    },
};

const DEFAULT_GROUP_SIZE_X: u32 = 64;

/// Host-memory execution of the encode/decode kernels.
///
/// Lanes of one dispatch run on the rayon pool: encode splits the tile by atlas row,
/// decode by vertex. Atlases start zero-filled.
#[derive(Debug)]
pub struct CpuSurface {
    group_size_x: u32,
    next_id: u64,
    buffers: HashMap<BufferId, Vec<VertexRecord>>,
    atlases: HashMap<AtlasId, AtlasImage>,
    dispatches: u64,
}

impl Default for CpuSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSurface {
    pub fn new() -> Self {
        Self::with_group_size(DEFAULT_GROUP_SIZE_X)
    }

    pub fn with_group_size(group_size_x: u32) -> Self {
        Self {
            group_size_x: group_size_x.max(1),
            next_id: 1,
            buffers: HashMap::new(),
            atlases: HashMap::new(),
            dispatches: 0,
        }
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_atlases(&self) -> usize {
        self.atlases.len()
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl DispatchSurface for CpuSurface {
    fn group_size_x(&self, _kernel: KernelId) -> u32 {
        self.group_size_x
    }

    fn create_atlas(&mut self, desc: &AtlasDesc) -> VatResult<AtlasHandle> {
        desc.validate()?;
        let id = AtlasId(self.alloc_id());
        self.atlases
            .insert(id, AtlasImage::zeroed(desc.width, desc.height));
        Ok(AtlasHandle::new(id, desc.width, desc.height))
    }

    fn release_atlas(&mut self, atlas: AtlasHandle) -> VatResult<()> {
        self.atlases
            .remove(&atlas.id())
            .map(|_| ())
            .ok_or_else(|| VatError::dispatch(format!("unknown atlas {:?}", atlas.id())))
    }

    fn create_vertex_buffer(
        &mut self,
        vertices: &[VertexRecord],
        source: BufferSource,
    ) -> VatResult<VertexBufferHandle> {
        let len = u32::try_from(vertices.len())
            .map_err(|_| VatError::validation("vertex buffer length overflows u32"))?;
        let id = BufferId(self.alloc_id());
        self.buffers.insert(id, vertices.to_vec());
        Ok(VertexBufferHandle::new(id, len, source))
    }

    fn release_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> VatResult<()> {
        self.buffers
            .remove(&buffer.id())
            .map(|_| ())
            .ok_or_else(|| VatError::dispatch(format!("unknown vertex buffer {:?}", buffer.id())))
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        bindings: &Bindings<'_>,
        groups: [u32; 3],
    ) -> VatResult<()> {
        let buffer_id = bindings.gpu_vertices.id();
        let atlas_id = bindings.result.id();
        let group_size_x = self.group_size_x;
        let fw = bindings.frame_width as usize;
        let start_x = bindings.start_pixel.x as usize;
        let start_y = bindings.start_pixel.y as usize;
        let channel = bindings.channel;

        match kernel {
            KernelId::Encode => {
                let vertices = self.buffers.get(&buffer_id).ok_or_else(|| {
                    VatError::dispatch(format!("unknown vertex buffer {buffer_id:?}"))
                })?;
                let atlas = self
                    .atlases
                    .get_mut(&atlas_id)
                    .ok_or_else(|| VatError::dispatch(format!("unknown atlas {atlas_id:?}")))?;
                let lanes = bindings.lanes(groups, group_size_x).min(vertices.len());
                bindings.check_tile(lanes)?;
                if lanes == 0 {
                    self.dispatches += 1;
                    return Ok(());
                }

                let width = atlas.width as usize;
                let rows = lanes.div_ceil(fw);
                let vertices = &vertices[..lanes];
                atlas
                    .texels
                    .par_chunks_mut(width)
                    .skip(start_y)
                    .take(rows)
                    .enumerate()
                    .for_each(|(row, texels)| {
                        let first = row * fw;
                        let last = (first + fw).min(lanes);
                        for (col, v) in vertices[first..last].iter().enumerate() {
                            texels[start_x + col] = channel.encode(v);
                        }
                    });
            }
            KernelId::Decode => {
                let atlas = self
                    .atlases
                    .get(&atlas_id)
                    .ok_or_else(|| VatError::dispatch(format!("unknown atlas {atlas_id:?}")))?;
                let vertices = self.buffers.get_mut(&buffer_id).ok_or_else(|| {
                    VatError::dispatch(format!("unknown vertex buffer {buffer_id:?}"))
                })?;
                let lanes = bindings.lanes(groups, group_size_x).min(vertices.len());
                bindings.check_tile(lanes)?;

                let width = atlas.width as usize;
                let texels = &atlas.texels;
                vertices[..lanes]
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, v)| {
                        let x = start_x + i % fw;
                        let y = start_y + i / fw;
                        channel.decode_into(texels[y * width + x], v);
                    });
            }
        }

        self.dispatches += 1;
        Ok(())
    }

    fn read_vertex_buffer(&mut self, buffer: &VertexBufferHandle) -> VatResult<Vec<VertexRecord>> {
        self.buffers
            .get(&buffer.id())
            .cloned()
            .ok_or_else(|| VatError::dispatch(format!("unknown vertex buffer {:?}", buffer.id())))
    }

    fn read_atlas(&mut self, atlas: &AtlasHandle) -> VatResult<AtlasImage> {
        self.atlases
            .get(&atlas.id())
            .cloned()
            .ok_or_else(|| VatError::dispatch(format!("unknown atlas {:?}", atlas.id())))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dispatch/cpu.rs"]
mod tests;
