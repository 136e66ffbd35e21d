use crate::common::*;

/// Texel format of a 2-D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr)]
pub enum TextureFormat {
    /// 32-bit float texels, sampled by `sampler2D`.
    Float,
    /// 32-bit signed integer texels, sampled by `isampler2D`.
    Int,
}

impl TextureFormat {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Float => Kind::Float,
            Self::Int => Kind::Int,
        }
    }
}

/// Handle to a texture owned by a [ComputeRuntime](crate::ComputeRuntime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct Texture {
    id: usize,
    rows: i64,
    cols: i64,
    format: TextureFormat,
}

impl Texture {
    pub fn new(id: usize, rows: i64, cols: i64, format: TextureFormat) -> Self {
        Self {
            id,
            rows,
            cols,
            format,
        }
    }

    pub fn shape(&self) -> [i64; 2] {
        [self.rows, self.cols]
    }
}

/// A texture bound to a named sampler of a program.
#[derive(Debug, Clone, Copy)]
pub struct TextureInput<'a> {
    pub name: &'a str,
    pub texture: &'a Texture,
}

impl<'a> TextureInput<'a> {
    pub fn new(name: &'a str, texture: &'a Texture) -> Self {
        Self { name, texture }
    }
}
