use crate::foundation::{
    core::{AnimationClip, FrameIndex, TileOrigin},
    error::{VatError, VatResult},
    math::ceil_sqrt,
};

/// Grid placement of per-frame tiles inside a square atlas.
///
/// Each tile is the smallest square holding every vertex row-major, one vertex per texel:
/// `tile_width = ceil(sqrt(vertex_count))`. Tiles are laid out on the smallest square grid
/// holding every frame: `frames_per_row = ceil(sqrt(frame_count))`. Frame `i` lives at
/// `(i % frames_per_row, i / frames_per_row) * tile_width`.
///
/// Ceiling rounding leaves padding: texels past `vertex_count` inside a tile, and whole tiles
/// past `frame_count` in the last grid row. Surfaces zero-initialise atlases so those read as
/// zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileLayout {
    vertex_count: u32,
    frame_count: u32,
    frames_per_row: u32,
    tile_width: u32,
    atlas_width: u32,
}

/// Values a draw-time shader needs to replicate the tile-address formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LayoutInfo {
    pub vertex_count: u32,
    pub frame_count: u32,
    pub frames_per_row: u32,
    pub tile_width: u32,
    pub atlas_width: u32,
}

/// Texel rectangle covered by one tile, `[x, x + width) x [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    pub fn overlaps(&self, other: &TileRect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

impl TileLayout {
    pub fn plan(vertex_count: u32, frame_count: u32) -> VatResult<Self> {
        if vertex_count == 0 {
            return Err(VatError::validation("vertex count must be > 0"));
        }
        if frame_count == 0 {
            return Err(VatError::validation("frame count must be > 0"));
        }

        let tile_width = ceil_sqrt(vertex_count);
        let frames_per_row = ceil_sqrt(frame_count);
        let atlas_width = tile_width.checked_mul(frames_per_row).ok_or_else(|| {
            VatError::validation(format!(
                "atlas width overflows u32 (tile {tile_width} x {frames_per_row} tiles)"
            ))
        })?;

        Ok(Self {
            vertex_count,
            frame_count,
            frames_per_row,
            tile_width,
            atlas_width,
        })
    }

    /// Plans a layout for `clip`, deriving `frame_count = round(frame_rate * duration)`.
    pub fn for_clip(vertex_count: u32, clip: &AnimationClip) -> VatResult<Self> {
        Self::plan(vertex_count, clip.frame_count()?)
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn frames_per_row(&self) -> u32 {
        self.frames_per_row
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn atlas_width(&self) -> u32 {
        self.atlas_width
    }

    pub fn info(&self) -> LayoutInfo {
        LayoutInfo {
            vertex_count: self.vertex_count,
            frame_count: self.frame_count,
            frames_per_row: self.frames_per_row,
            tile_width: self.tile_width,
            atlas_width: self.atlas_width,
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameIndex> + use<> {
        (0..self.frame_count).map(FrameIndex)
    }

    pub fn check_frame(&self, frame: FrameIndex) -> VatResult<()> {
        if frame.0 >= self.frame_count {
            return Err(VatError::validation(format!(
                "frame {} out of range (frame count {})",
                frame.0, self.frame_count
            )));
        }
        Ok(())
    }

    pub fn tile_origin(&self, frame: FrameIndex) -> VatResult<TileOrigin> {
        self.check_frame(frame)?;
        Ok(TileOrigin::new(
            frame.0 % self.frames_per_row * self.tile_width,
            frame.0 / self.frames_per_row * self.tile_width,
        ))
    }

    pub fn tile_rect(&self, frame: FrameIndex) -> VatResult<TileRect> {
        let origin = self.tile_origin(frame)?;
        Ok(TileRect {
            x: origin.x,
            y: origin.y,
            width: self.tile_width,
            height: self.tile_width,
        })
    }

    /// Atlas texel holding `vertex` of `frame`.
    pub fn texel_for_vertex(&self, frame: FrameIndex, vertex: u32) -> VatResult<TileOrigin> {
        if vertex >= self.vertex_count {
            return Err(VatError::validation(format!(
                "vertex {vertex} out of range (vertex count {})",
                self.vertex_count
            )));
        }
        let origin = self.tile_origin(frame)?;
        Ok(TileOrigin::new(
            origin.x + vertex % self.tile_width,
            origin.y + vertex / self.tile_width,
        ))
    }

    /// True when no sampled vertex of any frame lands on `(x, y)`.
    pub fn is_padding_texel(&self, x: u32, y: u32) -> bool {
        if x >= self.atlas_width || y >= self.atlas_width {
            return true;
        }
        let frame = (y / self.tile_width) * self.frames_per_row + x / self.tile_width;
        if frame >= self.frame_count {
            return true;
        }
        let vertex = (y % self.tile_width) * self.tile_width + x % self.tile_width;
        vertex >= self.vertex_count
    }

    pub fn padding_texels(&self) -> u64 {
        let total = u64::from(self.atlas_width) * u64::from(self.atlas_width);
        total - u64::from(self.vertex_count) * u64::from(self.frame_count)
    }

    /// Workgroup count along x for a kernel with `group_size_x` lanes per group.
    pub fn thread_groups(&self, group_size_x: u32) -> VatResult<u32> {
        if group_size_x == 0 {
            return Err(VatError::validation("thread group size must be > 0"));
        }
        Ok(self.vertex_count.div_ceil(group_size_x))
    }

    /// Whether a grid sized with truncated `sqrt(frame_count)` would place some frames
    /// outside the square atlas. Ceiling rounding never does.
    pub fn truncated_grid_overflows(frame_count: u32) -> bool {
        let per_row = frame_count.isqrt();
        if per_row == 0 {
            return frame_count > 0;
        }
        (frame_count - 1) / per_row >= per_row
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layout/planner.rs"]
mod tests;
