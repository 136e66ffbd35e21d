use crate::{
    common::*,
    program::Program,
    texture::{Texture, TextureFormat, TextureInput},
};

/// Device failures reported by a [ComputeRuntime].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("program compilation failed: {0}")]
    Compile(String),
    #[error("program dispatch failed: {0}")]
    Dispatch(String),
    #[error("invalid texture: {0}")]
    InvalidTexture(String),
}

/// A compute backend restricted to 2-D textures.
///
/// Every call blocks until the device finishes. Failures are reported as
/// [RuntimeError] and are not retried.
pub trait ComputeRuntime {
    /// The device on which textures live.
    fn device(&self) -> Device;

    /// Compiles a program from source text. Compiling the same text twice
    /// returns the handle of the first compilation.
    fn compile_program(&mut self, source: &str) -> Result<Program>;

    /// Uploads a 2-D tensor as a new texture.
    fn create_texture(&mut self, data: &Tensor, format: TextureFormat) -> Result<Texture>;

    /// Allocates a zero-filled texture.
    fn allocate_texture(&mut self, rows: i64, cols: i64, format: TextureFormat)
        -> Result<Texture>;

    /// Copies the texture content back to host memory.
    fn read_texture(&self, texture: &Texture) -> Result<Tensor>;

    /// Runs a program with named texture inputs and writes the result to `output`.
    fn run_program(
        &mut self,
        program: &Program,
        inputs: &[TextureInput<'_>],
        output: &Texture,
    ) -> Result<()>;
}

/// Shared handle to a runtime. Layers on the same device share one runtime.
pub type RuntimeHandle = Rc<RefCell<dyn ComputeRuntime>>;

pub fn shared_runtime<R>(runtime: R) -> RuntimeHandle
where
    R: 'static + ComputeRuntime,
{
    Rc::new(RefCell::new(runtime))
}
