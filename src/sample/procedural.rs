use std::f32::consts::TAU;

use crate::{
    foundation::{
        core::{AnimationClip, NormalizedTime, VertexRecord},
        error::{VatError, VatResult},
    },
    sample::evaluator::PoseEvaluator,
};

/// Flat grid in the XZ plane with a travelling sine wave along X.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridMeshConfig {
    pub columns: u32,
    pub rows: u32,
    pub amplitude: f32,
    pub wavelength: f32,
}

impl Default for GridMeshConfig {
    fn default() -> Self {
        Self {
            columns: 32,
            rows: 32,
            amplitude: 0.25,
            wavelength: 8.0,
        }
    }
}

impl GridMeshConfig {
    pub fn validate(&self) -> VatResult<()> {
        if self.columns == 0 || self.rows == 0 {
            return Err(VatError::validation("grid mesh must have at least one row and column"));
        }
        if self.columns.checked_mul(self.rows).is_none() {
            return Err(VatError::validation("grid mesh vertex count overflows u32"));
        }
        if !self.amplitude.is_finite() {
            return Err(VatError::validation("grid amplitude must be finite"));
        }
        if !self.wavelength.is_finite() || self.wavelength <= 0.0 {
            return Err(VatError::validation("grid wavelength must be finite and > 0"));
        }
        Ok(())
    }

    pub fn vertex_count(&self) -> u32 {
        self.columns * self.rows
    }
}

/// Deterministic stand-in for a skinned mesh: one wave period per clip.
///
/// Keeps a time cursor like a real animator; every `pose` moves it.
#[derive(Clone, Debug)]
pub struct WaveGridEvaluator {
    mesh: GridMeshConfig,
    clip: Option<AnimationClip>,
    cursor: NormalizedTime,
}

impl WaveGridEvaluator {
    pub fn new(mesh: GridMeshConfig, clip: AnimationClip) -> VatResult<Self> {
        mesh.validate()?;
        Ok(Self {
            mesh,
            clip: Some(clip),
            cursor: NormalizedTime(0.0),
        })
    }

    pub fn unbound(mesh: GridMeshConfig) -> VatResult<Self> {
        mesh.validate()?;
        Ok(Self {
            mesh,
            clip: None,
            cursor: NormalizedTime(0.0),
        })
    }

    pub fn bind_clip(&mut self, clip: Option<AnimationClip>) {
        self.clip = clip;
        self.cursor = NormalizedTime(0.0);
    }

    pub fn cursor(&self) -> NormalizedTime {
        self.cursor
    }

    pub fn mesh(&self) -> &GridMeshConfig {
        &self.mesh
    }

    fn vertex_at(&self, column: u32, row: u32, time: f32) -> VertexRecord {
        let x = column as f32;
        let z = row as f32;
        let k = TAU / self.mesh.wavelength;
        let phase = k * x - TAU * time;
        let y = self.mesh.amplitude * phase.sin();
        let slope = self.mesh.amplitude * k * phase.cos();

        let inv_len = 1.0 / (1.0 + slope * slope).sqrt();
        let normal = [-slope * inv_len, inv_len, 0.0];
        let tangent = [inv_len, slope * inv_len, 0.0, 1.0];
        VertexRecord::new([x, y, z], normal, tangent)
    }
}

impl PoseEvaluator for WaveGridEvaluator {
    fn vertex_count(&self) -> u32 {
        self.mesh.vertex_count()
    }

    fn clip(&self) -> Option<AnimationClip> {
        self.clip
    }

    fn pose(&mut self, time: NormalizedTime) -> VatResult<Vec<VertexRecord>> {
        if self.clip.is_none() {
            return Err(VatError::precondition("wave grid has no bound clip"));
        }
        self.cursor = time;
        let mut out = Vec::with_capacity(self.mesh.vertex_count() as usize);
        for row in 0..self.mesh.rows {
            for column in 0..self.mesh.columns {
                out.push(self.vertex_at(column, row, time.0));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sample/procedural.rs"]
mod tests;
