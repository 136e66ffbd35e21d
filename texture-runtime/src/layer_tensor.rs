use crate::{
    common::*,
    runtime::ComputeRuntime,
    square::{SquareIndices, TensorExt as _},
    texture::{Texture, TextureFormat},
};

/// A tensor passed between layers.
///
/// It always knows its logical shape. The host data may be absent when the
/// tensor is produced on a device and kept there for the next consumer. The
/// square-packed form and its texture are created on demand.
#[derive(Debug)]
pub struct LayerTensor {
    shape: Vec<i64>,
    host: Option<Tensor>,
    packed: Option<Tensor>,
    indices: Option<SquareIndices>,
    texture: Option<Texture>,
}

impl LayerTensor {
    pub fn new(tensor: Tensor) -> Self {
        Self {
            shape: tensor.size(),
            host: Some(tensor),
            packed: None,
            indices: None,
            texture: None,
        }
    }

    /// Creates a tensor living only in a device texture.
    pub fn from_texture(shape: &[i64], texture: Texture) -> Result<Self> {
        let indices = SquareIndices::for_shape(shape)?;
        ensure!(
            texture.shape() == [indices.side(), indices.side()],
            "a {}x{} texture cannot hold a square-packed tensor of shape {:?}",
            texture.rows(),
            texture.cols(),
            shape
        );

        Ok(Self {
            shape: shape.to_vec(),
            host: None,
            packed: None,
            indices: Some(indices),
            texture: Some(texture),
        })
    }

    pub fn shape(&self) -> &[i64] {
        &self.shape
    }

    pub fn host(&self) -> Option<&Tensor> {
        self.host.as_ref()
    }

    pub fn indices(&self) -> Option<&SquareIndices> {
        self.indices.as_ref()
    }

    pub fn texture(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    /// The device texture together with the coordinates of its texels.
    ///
    /// A texture never exists without its indices, so this is `Some` exactly
    /// when [texture](Self::texture) is.
    pub fn packed_texture(&self) -> Option<(&SquareIndices, Texture)> {
        Some((self.indices.as_ref()?, self.texture?))
    }

    /// Square-packs the host data and records its texture coordinates.
    pub fn reshape_to_2d_square(&mut self) -> Result<&SquareIndices> {
        let indices = match self.indices.take() {
            Some(indices) => indices,
            None => {
                let host = self
                    .host
                    .as_ref()
                    .ok_or_else(|| format_err!("the tensor has no host data to pack"))?;
                let (packed, indices) = host.f_reshape_to_2d_square()?;
                self.packed = Some(packed);
                indices
            }
        };
        Ok(&*self.indices.insert(indices))
    }

    /// Uploads the square-packed data as a texture.
    pub fn create_texture(
        &mut self,
        runtime: &mut dyn ComputeRuntime,
        format: TextureFormat,
    ) -> Result<Texture> {
        let packed = self
            .packed
            .as_ref()
            .ok_or_else(|| format_err!("the tensor must be square-packed before upload"))?;
        let texture = runtime.create_texture(packed, format)?;
        self.texture = Some(texture);
        Ok(texture)
    }

    /// Reads the texture back and restores the logical shape on the host.
    pub fn transfer_from_texture(&mut self, runtime: &dyn ComputeRuntime) -> Result<&Tensor> {
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| format_err!("the tensor has no texture to read from"))?;
        let packed = runtime.read_texture(texture)?;
        let host = packed.f_reshape_from_2d_square(&self.shape)?;
        debug!(
            "read back a {}x{} texture into shape {:?}",
            texture.rows(),
            texture.cols(),
            self.shape
        );
        self.packed = Some(packed);
        Ok(&*self.host.insert(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tch_runtime::TchRuntime;

    #[test]
    fn upload_and_read_back() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let data = Tensor::rand(&[2, 3, 4, 5], tch::kind::FLOAT_CPU);
        let mut tensor = LayerTensor::new(data.shallow_clone());

        assert!(tensor
            .create_texture(&mut runtime, TextureFormat::Float)
            .is_err());
        assert!(tensor.packed_texture().is_none());

        let side = tensor.reshape_to_2d_square().unwrap().side();
        assert_eq!(side, 11);
        let texture = tensor
            .create_texture(&mut runtime, TextureFormat::Float)
            .unwrap();
        assert_eq!(texture.shape(), [11, 11]);

        let (indices, uploaded) = tensor.packed_texture().unwrap();
        assert_eq!(indices.side(), 11);
        assert_eq!(uploaded, texture);

        let mut resident = LayerTensor::from_texture(&[2, 3, 4, 5], texture).unwrap();
        assert!(resident.host().is_none());
        assert_eq!(resident.packed_texture().unwrap().1, texture);
        let restored = resident.transfer_from_texture(&runtime).unwrap();
        assert!(restored.equal(&data));
    }

    #[test]
    fn from_texture_rejects_wrong_size() {
        let texture = Texture::new(0, 3, 3, TextureFormat::Float);
        assert!(LayerTensor::from_texture(&[2, 2, 2, 2], texture).is_err());
    }
}
