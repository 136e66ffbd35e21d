//! Nearest-neighbor 3-D upsampling for 4-D tensors.
//!
//! Every element of the input is replicated over an `s0 x s1 x s2` block of
//! the output. [UpSampling3D] runs either directly on libtorch tensors or on
//! square-packed 2-D textures through a [ComputeRuntime](texture_runtime::ComputeRuntime),
//! and both paths produce identical results.

mod common;
pub mod config;
pub mod cpu;
pub mod error;
pub mod gpu;
pub mod index_map;
pub mod up_sample_3d;

pub use config::*;
pub use cpu::*;
pub use error::*;
pub use gpu::*;
pub use index_map::*;
pub use up_sample_3d::*;
