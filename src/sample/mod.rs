pub mod evaluator;
pub mod procedural;
pub mod sampler;
