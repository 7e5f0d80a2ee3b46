use crate::foundation::{
    core::{AnimationClip, NormalizedTime, VertexRecord},
    error::VatResult,
};

/// External skinning / pose evaluator.
///
/// `pose` moves the evaluator's internal time cursor, so it takes `&mut self`: holding the
/// evaluator mutably for a whole bake is what keeps sampling single-writer.
pub trait PoseEvaluator {
    /// Vertex count of every buffer `pose` returns. Order is stable across calls.
    fn vertex_count(&self) -> u32;

    /// Clip currently bound to the evaluator, `None` when unbound.
    fn clip(&self) -> Option<AnimationClip>;

    /// Poses the mesh at `time` in `[0, 1)` of the bound clip.
    fn pose(&mut self, time: NormalizedTime) -> VatResult<Vec<VertexRecord>>;
}

impl<E: PoseEvaluator + ?Sized> PoseEvaluator for &mut E {
    fn vertex_count(&self) -> u32 {
        (**self).vertex_count()
    }

    fn clip(&self) -> Option<AnimationClip> {
        (**self).clip()
    }

    fn pose(&mut self, time: NormalizedTime) -> VatResult<Vec<VertexRecord>> {
        (**self).pose(time)
    }
}
