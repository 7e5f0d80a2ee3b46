use std::path::Path;

use crate::{
    foundation::{
        core::{AnimationClip, ChannelSet},
        error::{VatError, VatResult},
    },
    sample::procedural::GridMeshConfig,
};

/// Everything needed to bake the procedural wave grid, as read from a JSON file.
///
/// Missing sections fall back to their defaults; unknown keys are rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BakeConfig {
    pub clip: AnimationClip,
    pub mesh: GridMeshConfig,
    pub channels: ChannelSet,
}

impl BakeConfig {
    pub fn from_json_str(s: &str) -> VatResult<Self> {
        let config: Self = serde_json::from_str(s).map_err(|e| VatError::serde(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_path(path: &Path) -> VatResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VatError::Other(anyhow::Error::new(e).context(format!("read {}", path.display())))
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> VatResult<()> {
        self.mesh.validate()?;
        self.clip.frame_count()?;
        Ok(())
    }

    pub fn params(&self) -> BakeParams {
        BakeParams {
            vertex_count: self.mesh.vertex_count(),
            clip: self.clip,
            channels: self.channels,
        }
    }
}

/// Inputs that determine a layout and its atlases.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BakeParams {
    pub vertex_count: u32,
    pub clip: AnimationClip,
    #[serde(default)]
    pub channels: ChannelSet,
}

impl BakeParams {
    pub fn new(vertex_count: u32, clip: AnimationClip) -> Self {
        Self {
            vertex_count,
            clip,
            channels: ChannelSet::default(),
        }
    }

    pub fn with_channels(mut self, channels: ChannelSet) -> Self {
        self.channels = channels;
        self
    }

    /// `self` with every field `update` sets replaced.
    pub fn merged(self, update: &BakeUpdate) -> Self {
        Self {
            vertex_count: update.vertex_count.unwrap_or(self.vertex_count),
            clip: update.clip.unwrap_or(self.clip),
            channels: update.channels.unwrap_or(self.channels),
        }
    }
}

/// Partial reconfiguration; `None` keeps the current value.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BakeUpdate {
    pub vertex_count: Option<u32>,
    pub clip: Option<AnimationClip>,
    pub channels: Option<ChannelSet>,
}

impl BakeUpdate {
    pub fn is_empty(&self) -> bool {
        self.vertex_count.is_none() && self.clip.is_none() && self.channels.is_none()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bake/config.rs"]
mod tests;
