//! vatbake bakes a skinned mesh animation into vertex animation textures (VATs).
//!
//! Every vertex of every sampled frame becomes one `Rgba32Float` texel, so a draw-time shader
//! can replay the animation by texture fetch alone.
//!
//! # Pipeline overview
//!
//! 1. **Plan**: `vertex_count + frame_count -> TileLayout` (square tiles on a square grid)
//! 2. **Sample**: a [`PoseEvaluator`] is posed at `i / frame_count` for each frame, in order
//! 3. **Encode**: each posed buffer is written into its tile by a compute dispatch
//! 4. **Decode** (optional): a tile is read back into a live vertex buffer
//!
//! Kernels run on a [`DispatchSurface`]: [`CpuSurface`] everywhere, `GpuSurface` (wgpu) with
//! the `gpu` feature. [`VatBaker`] ties the steps together and owns the resources they
//! allocate; [`LayoutInfo`] carries what a shader needs to address the atlas.

mod bake;
mod dispatch;
mod foundation;
mod layout;
mod lifecycle;
mod sample;

pub use bake::baker::{BakeStats, VatBaker};
pub use bake::config::{BakeConfig, BakeParams, BakeUpdate};
pub use dispatch::cpu::CpuSurface;
pub use dispatch::decode::{DecodeDispatcher, DecodeReport};
pub use dispatch::encode::{EncodeDispatcher, EncodeReport};
#[cfg(feature = "gpu")]
pub use dispatch::gpu::GpuSurface;
pub use dispatch::surface::{
    AtlasDesc, AtlasHandle, AtlasId, AtlasImage, Bindings, BufferId, BufferSource,
    DispatchSurface, KernelId, SurfaceKind, VertexBufferHandle, create_surface,
};
pub use foundation::core::{
    AnimationClip, ChannelSet, FrameIndex, NormalizedTime, TileOrigin, VertexChannel,
    VertexRecord,
};
pub use foundation::error::{VatError, VatResult};
pub use layout::planner::{LayoutInfo, TileLayout, TileRect};
pub use lifecycle::resources::{BakeResources, ResourceState};
pub use sample::evaluator::PoseEvaluator;
pub use sample::procedural::{GridMeshConfig, WaveGridEvaluator};
pub use sample::sampler::{FrameSampler, SampledFrame};
