//! Row and column index maps that let a gather program emulate the strided
//! broadcast on square-packed textures.

use crate::{
    common::*,
    config::{DataFormat, Size3},
    cpu::f_broadcast_strided_,
    error::UpSampleError,
};

/// Index maps of one output shape, packed and uploaded as integer textures.
///
/// For every output element `p`, `row[p]` and `col[p]` locate the texel of
/// the square-packed input holding its source value.
#[derive(Debug, Getters, CopyGetters)]
pub struct IndexMap {
    #[getset(get = "pub")]
    input_shape: Vec<i64>,
    #[getset(get = "pub")]
    output_shape: Vec<i64>,
    #[getset(get = "pub")]
    row: Tensor,
    #[getset(get = "pub")]
    col: Tensor,
    #[getset(get_copy = "pub")]
    row_texture: Texture,
    #[getset(get_copy = "pub")]
    col_texture: Texture,
}

impl IndexMap {
    /// Broadcasts the input texture coordinates to the output shape.
    ///
    /// Returns the unpacked row and column maps, laid out in `data_format`.
    pub fn f_broadcast_indices(
        indices: &SquareIndices,
        size: &Size3,
        data_format: DataFormat,
        output_shape: &[i64],
    ) -> Result<(Tensor, Tensor)> {
        let axes = data_format.spatial_axes();
        let device = indices.row().device();
        let mut row_map = Tensor::f_zeros(output_shape, (Kind::Int, device))?;
        let mut col_map = Tensor::f_zeros(output_shape, (Kind::Int, device))?;
        f_broadcast_strided_(&mut row_map, indices.row(), axes, size)?;
        f_broadcast_strided_(&mut col_map, indices.col(), axes, size)?;
        Ok((row_map, col_map))
    }

    /// Builds the maps for `indices` on the device of `runtime` and uploads them.
    pub fn build(
        indices: &SquareIndices,
        size: &Size3,
        data_format: DataFormat,
        output_shape: &[i64],
        runtime: &mut dyn ComputeRuntime,
    ) -> Result<Self> {
        let indices = indices.f_to_device(runtime.device())?;
        let (row_map, col_map) =
            Self::f_broadcast_indices(&indices, size, data_format, output_shape)?;
        let (row, _) = row_map.f_reshape_to_2d_square()?;
        let (col, _) = col_map.f_reshape_to_2d_square()?;
        let row_texture = runtime.create_texture(&row, TextureFormat::Int)?;
        let col_texture = runtime.create_texture(&col, TextureFormat::Int)?;

        Ok(Self {
            input_shape: indices.shape(),
            output_shape: output_shape.to_vec(),
            row,
            col,
            row_texture,
            col_texture,
        })
    }
}

/// Lazily built [IndexMap] owned by a layer.
///
/// The maps depend only on the input shape and the layer attributes, so they
/// are built on first use and kept for the lifetime of the layer.
#[derive(Debug, Default, CopyGetters)]
pub struct IndexMapCache {
    map: Option<IndexMap>,
    /// Number of times the maps were built.
    #[getset(get_copy = "pub")]
    num_builds: usize,
}

impl IndexMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&IndexMap> {
        self.map.as_ref()
    }

    pub fn get_or_build(
        &mut self,
        indices: &SquareIndices,
        size: &Size3,
        data_format: DataFormat,
        output_shape: &[i64],
        runtime: &mut dyn ComputeRuntime,
    ) -> Result<&IndexMap> {
        let map = match self.map.take() {
            Some(map) => {
                let input_shape = indices.shape();
                if *map.input_shape() != input_shape {
                    let err = UpSampleError::Precondition(format!(
                        "index maps were built for input shape {:?}, but get {:?}",
                        map.input_shape(),
                        input_shape
                    ));
                    self.map = Some(map);
                    return Err(err.into());
                }
                map
            }
            None => {
                let map = IndexMap::build(indices, size, data_format, output_shape, runtime)?;
                self.num_builds += 1;
                debug!(
                    "built index maps from input shape {:?} to output shape {:?}",
                    map.input_shape(),
                    map.output_shape()
                );
                map
            }
        };
        Ok(&*self.map.insert(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::up_sample_3d::UpSampling3DInit;
    use texture_runtime::TchRuntime;

    #[test]
    fn broadcast_indices_channels_last() {
        let size = Size3::new(1, 2, 1).unwrap();
        let indices = SquareIndices::for_shape(&[2, 1, 2, 1]).unwrap();
        let (row, col) =
            IndexMap::f_broadcast_indices(&indices, &size, DataFormat::ChannelsLast, &[2, 2, 2, 1])
                .unwrap();

        // input side is 2, so element f sits at (f / 2, f % 2)
        let row: Vec<i32> = row.reshape(&[-1]).into();
        let col: Vec<i32> = col.reshape(&[-1]).into();
        assert_eq!(row, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        assert_eq!(col, vec![0, 1, 0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn broadcast_indices_channels_first() {
        let init = UpSampling3DInit {
            size: Size3::new(2, 1, 1).unwrap(),
            data_format: DataFormat::ChannelsFirst,
            ..Default::default()
        };
        let indices = SquareIndices::for_shape(&[2, 1, 1, 1]).unwrap();
        let output_shape = init.output_shape(&indices.shape()).unwrap();
        assert_eq!(output_shape, [2, 2, 1, 1]);

        let (row, col) =
            IndexMap::f_broadcast_indices(&indices, &init.size, init.data_format, &output_shape)
                .unwrap();
        let row: Vec<i32> = row.reshape(&[-1]).into();
        let col: Vec<i32> = col.reshape(&[-1]).into();
        // input side is 2, so channel c sits at (0, c)
        assert_eq!(row, vec![0, 0, 0, 0]);
        assert_eq!(col, vec![0, 0, 1, 1]);
    }

    #[test]
    fn cache_builds_once() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let mut cache = IndexMapCache::new();
        let size = Size3::default();
        let indices = SquareIndices::for_shape(&[1, 2, 3, 4]).unwrap();
        let output_shape = [2, 4, 6, 4];

        for _ in 0..3 {
            let map = cache
                .get_or_build(
                    &indices,
                    &size,
                    DataFormat::ChannelsLast,
                    &output_shape,
                    &mut runtime,
                )
                .unwrap();
            assert_eq!(map.row().size(), [14, 14]);
            assert_eq!(map.row_texture().format(), TextureFormat::Int);
        }
        assert_eq!(cache.num_builds(), 1);
        assert_eq!(runtime.num_textures(), 2);
    }

    #[test]
    fn cache_rejects_other_input_shape() {
        let mut runtime = TchRuntime::new(Device::Cpu);
        let mut cache = IndexMapCache::new();
        let size = Size3::default();

        let indices = SquareIndices::for_shape(&[1, 1, 1, 1]).unwrap();
        cache
            .get_or_build(&indices, &size, DataFormat::ChannelsLast, &[2, 2, 2, 1], &mut runtime)
            .unwrap();

        let indices = SquareIndices::for_shape(&[1, 1, 1, 2]).unwrap();
        let err = cache
            .get_or_build(&indices, &size, DataFormat::ChannelsLast, &[2, 2, 2, 2], &mut runtime)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpSampleError>(),
            Some(UpSampleError::Precondition(_))
        ));
        assert!(cache.get().is_some());
        assert_eq!(cache.num_builds(), 1);
    }
}
