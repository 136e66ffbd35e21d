/// Errors raised by the upsampling layer itself.
///
/// Device failures are reported by the runtime as
/// [RuntimeError](texture_runtime::RuntimeError) and are passed through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum UpSampleError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("precondition violated: {0}")]
    Precondition(String),
}
