//! Square-packed 2-D texture storage and a gather-program runtime for tensors.
//!
//! Tensors of any rank are flattened into square 2-D textures so they can be
//! processed by compute backends that only address 2-D resources. The
//! [ComputeRuntime] trait abstracts such a backend, and [TchRuntime] implements
//! it with libtorch tensors on any [tch::Device].

mod common;
pub mod layer_tensor;
pub mod program;
pub mod runtime;
pub mod square;
pub mod tch_runtime;
pub mod texture;

pub use layer_tensor::*;
pub use program::*;
pub use runtime::*;
pub use square::*;
pub use tch_runtime::*;
pub use texture::*;
