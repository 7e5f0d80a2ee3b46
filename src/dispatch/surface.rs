use crate::foundation::{
    core::{TileOrigin, VertexChannel, VertexRecord},
    error::{VatError, VatResult},
};

/// Compute kernel selected by a dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelId {
    /// Vertex buffer -> atlas tile.
    Encode,
    /// Atlas tile -> vertex buffer.
    Decode,
}

impl KernelId {
    pub fn index(self) -> u32 {
        match self {
            Self::Encode => 0,
            Self::Decode => 1,
        }
    }
}

/// Where a vertex buffer came from. Dispatches treat both alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferSource {
    /// Acquired from a live mesh (decode targets, read-back scratch).
    Live,
    /// A freshly posed copy produced while sampling.
    Baked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtlasId(pub u64);

/// Device-resident vertex buffer. Exactly one owner holds it; releasing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct VertexBufferHandle {
    id: BufferId,
    len: u32,
    source: BufferSource,
}

impl VertexBufferHandle {
    /// Called by surfaces when they allocate a buffer.
    pub fn new(id: BufferId, len: u32, source: BufferSource) -> Self {
        Self { id, len, source }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Number of vertex records in the buffer.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn source(&self) -> BufferSource {
        self.source
    }
}

/// Device-resident `Rgba32Float` atlas texture.
#[derive(Debug, PartialEq, Eq)]
pub struct AtlasHandle {
    id: AtlasId,
    width: u32,
    height: u32,
}

impl AtlasHandle {
    pub fn new(id: AtlasId, width: u32, height: u32) -> Self {
        Self { id, width, height }
    }

    pub fn id(&self) -> AtlasId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AtlasDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

impl AtlasDesc {
    pub fn square(label: &'static str, width: u32) -> Self {
        Self {
            label,
            width,
            height: width,
        }
    }

    pub fn validate(&self) -> VatResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VatError::validation(format!(
                "atlas '{}' must have non-zero size",
                self.label
            )));
        }
        Ok(())
    }
}

/// Resources and uniforms bound to one dispatch.
///
/// `result` is the atlas, `gpu_vertices` the vertex buffer (read by encode, written by
/// decode), `start_pixel` the tile origin and `frame_width` the tile edge in texels.
/// `vertex_count` is the baked vertex count; no lane past it touches the tile.
#[derive(Debug)]
pub struct Bindings<'a> {
    pub result: &'a AtlasHandle,
    pub gpu_vertices: &'a VertexBufferHandle,
    pub start_pixel: TileOrigin,
    pub frame_width: u32,
    pub vertex_count: u32,
    pub channel: VertexChannel,
}

impl Bindings<'_> {
    /// Lanes that run for `groups`: clamped to the buffer length and the baked vertex count.
    pub(crate) fn lanes(&self, groups: [u32; 3], group_size_x: u32) -> usize {
        let len = self.gpu_vertices.len().min(self.vertex_count);
        active_lanes(groups, group_size_x, len)
    }

    /// Fails when `lanes` vertices laid out `frame_width` per row would leave the atlas.
    pub(crate) fn check_tile(&self, lanes: usize) -> VatResult<()> {
        if lanes == 0 {
            return Ok(());
        }
        let fw = self.frame_width as usize;
        if fw == 0 {
            return Err(VatError::dispatch("frame width must be > 0"));
        }
        let cols = lanes.min(fw);
        let rows = lanes.div_ceil(fw);
        let start = self.start_pixel;
        if start.x as usize + cols > self.result.width() as usize
            || start.y as usize + rows > self.result.height() as usize
        {
            return Err(VatError::dispatch(format!(
                "tile at ({}, {}) spanning {cols}x{rows} texels exceeds atlas {}x{}",
                start.x,
                start.y,
                self.result.width(),
                self.result.height()
            )));
        }
        Ok(())
    }
}

/// Dispatched threads, clamped to `len`.
pub(crate) fn active_lanes(groups: [u32; 3], group_size_x: u32, len: u32) -> usize {
    let dispatched = u64::from(groups[0])
        * u64::from(group_size_x)
        * u64::from(groups[1])
        * u64::from(groups[2]);
    dispatched.min(u64::from(len)) as usize
}

/// Host copy of an atlas, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct AtlasImage {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl AtlasImage {
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![[0.0; 4]; width as usize * height as usize],
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.texels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Opaque execution target for the encode/decode kernels.
///
/// Dispatches are ordered by submission on a single queue; a read-back observes every
/// dispatch submitted before it. Bounds-checking lanes past a buffer's length is the
/// surface's job.
pub trait DispatchSurface {
    fn group_size_x(&self, kernel: KernelId) -> u32;

    fn create_atlas(&mut self, desc: &AtlasDesc) -> VatResult<AtlasHandle>;

    fn release_atlas(&mut self, atlas: AtlasHandle) -> VatResult<()>;

    fn create_vertex_buffer(
        &mut self,
        vertices: &[VertexRecord],
        source: BufferSource,
    ) -> VatResult<VertexBufferHandle>;

    fn release_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> VatResult<()>;

    fn dispatch(
        &mut self,
        kernel: KernelId,
        bindings: &Bindings<'_>,
        groups: [u32; 3],
    ) -> VatResult<()>;

    fn read_vertex_buffer(&mut self, buffer: &VertexBufferHandle) -> VatResult<Vec<VertexRecord>>;

    fn read_atlas(&mut self, atlas: &AtlasHandle) -> VatResult<AtlasImage>;
}

impl<S: DispatchSurface + ?Sized> DispatchSurface for Box<S> {
    fn group_size_x(&self, kernel: KernelId) -> u32 {
        (**self).group_size_x(kernel)
    }

    fn create_atlas(&mut self, desc: &AtlasDesc) -> VatResult<AtlasHandle> {
        (**self).create_atlas(desc)
    }

    fn release_atlas(&mut self, atlas: AtlasHandle) -> VatResult<()> {
        (**self).release_atlas(atlas)
    }

    fn create_vertex_buffer(
        &mut self,
        vertices: &[VertexRecord],
        source: BufferSource,
    ) -> VatResult<VertexBufferHandle> {
        (**self).create_vertex_buffer(vertices, source)
    }

    fn release_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> VatResult<()> {
        (**self).release_vertex_buffer(buffer)
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        bindings: &Bindings<'_>,
        groups: [u32; 3],
    ) -> VatResult<()> {
        (**self).dispatch(kernel, bindings, groups)
    }

    fn read_vertex_buffer(&mut self, buffer: &VertexBufferHandle) -> VatResult<Vec<VertexRecord>> {
        (**self).read_vertex_buffer(buffer)
    }

    fn read_atlas(&mut self, atlas: &AtlasHandle) -> VatResult<AtlasImage> {
        (**self).read_atlas(atlas)
    }
}

/// Execution surfaces compiled into this build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    Cpu,
    #[cfg(feature = "gpu")]
    Gpu,
}

pub fn create_surface(kind: SurfaceKind) -> VatResult<Box<dyn DispatchSurface>> {
    match kind {
        SurfaceKind::Cpu => Ok(Box::new(crate::dispatch::cpu::CpuSurface::new())),
        #[cfg(feature = "gpu")]
        SurfaceKind::Gpu => Ok(Box::new(crate::dispatch::gpu::GpuSurface::new()?)),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dispatch/surface.rs"]
mod tests;
