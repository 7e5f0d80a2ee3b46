pub mod cpu;
pub mod decode;
pub mod encode;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod surface;
