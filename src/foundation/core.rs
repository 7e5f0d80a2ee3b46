use crate::foundation::error::{VatError, VatResult};

/// Index of a sampled frame, `0..frame_count`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u32);

/// Clip time mapped onto `[0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct NormalizedTime(pub f32);

impl NormalizedTime {
    /// Time of sample `frame` out of `frame_count` uniform steps: `frame / frame_count`.
    pub fn of_frame(frame: FrameIndex, frame_count: u32) -> Self {
        Self(frame.0 as f32 / frame_count as f32)
    }
}

/// Texel coordinate of a tile's top-left corner in the atlas.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TileOrigin {
    pub x: u32,
    pub y: u32,
}

impl TileOrigin {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// One skinned vertex as the evaluator produces it and as device buffers store it.
#[repr(C)]
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct VertexRecord {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 4],
}

impl VertexRecord {
    /// Number of `f32` lanes per record in device memory.
    pub const STRIDE_F32: usize = 10;

    pub fn new(position: [f32; 3], normal: [f32; 3], tangent: [f32; 4]) -> Self {
        Self {
            position,
            normal,
            tangent,
        }
    }
}

/// Read-only description of the animation being baked.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnimationClip {
    pub frame_rate: f32,
    pub duration_secs: f32,
}

impl Default for AnimationClip {
    fn default() -> Self {
        Self {
            frame_rate: 24.0,
            duration_secs: 1.0,
        }
    }
}

impl AnimationClip {
    pub fn new(frame_rate: f32, duration_secs: f32) -> VatResult<Self> {
        let clip = Self {
            frame_rate,
            duration_secs,
        };
        clip.frame_count()?;
        Ok(clip)
    }

    pub fn is_zero_length(&self) -> bool {
        self.duration_secs.is_nan() || self.duration_secs <= 0.0
    }

    /// Number of frames to record: `round(frame_rate * duration_secs)`.
    pub fn frame_count(&self) -> VatResult<u32> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(VatError::validation(format!(
                "clip frame rate must be finite and > 0 (got {})",
                self.frame_rate
            )));
        }
        if !self.duration_secs.is_finite() || self.is_zero_length() {
            return Err(VatError::validation(format!(
                "clip duration must be finite and > 0 (got {})",
                self.duration_secs
            )));
        }
        let frames = (f64::from(self.frame_rate) * f64::from(self.duration_secs)).round();
        if frames < 1.0 {
            return Err(VatError::validation(format!(
                "clip yields no frames ({} fps x {} s)",
                self.frame_rate, self.duration_secs
            )));
        }
        if frames > f64::from(u32::MAX) {
            return Err(VatError::validation("clip frame count overflows u32"));
        }
        Ok(frames as u32)
    }
}

/// Vertex attribute stored in one atlas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexChannel {
    Position,
    Normal,
    Tangent,
}

impl VertexChannel {
    /// Value passed to kernels through the `channel` uniform.
    pub fn index(self) -> u32 {
        match self {
            Self::Position => 0,
            Self::Normal => 1,
            Self::Tangent => 2,
        }
    }

    /// Texel written for `v`. Positions carry `w = 1`, normals `w = 0`.
    pub fn encode(self, v: &VertexRecord) -> [f32; 4] {
        match self {
            Self::Position => [v.position[0], v.position[1], v.position[2], 1.0],
            Self::Normal => [v.normal[0], v.normal[1], v.normal[2], 0.0],
            Self::Tangent => v.tangent,
        }
    }

    /// Writes this channel's fields of `v` from `texel`, leaving the others alone.
    pub fn decode_into(self, texel: [f32; 4], v: &mut VertexRecord) {
        match self {
            Self::Position => v.position = [texel[0], texel[1], texel[2]],
            Self::Normal => v.normal = [texel[0], texel[1], texel[2]],
            Self::Tangent => v.tangent = texel,
        }
    }
}

/// Optional channels baked next to the always-present position atlas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSet {
    pub normal: bool,
    pub tangent: bool,
}

impl ChannelSet {
    pub fn position_only() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            normal: true,
            tangent: true,
        }
    }

    /// Channels in atlas order; position is always first.
    pub fn channels(self) -> Vec<VertexChannel> {
        let mut out = vec![VertexChannel::Position];
        if self.normal {
            out.push(VertexChannel::Normal);
        }
        if self.tangent {
            out.push(VertexChannel::Tangent);
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
