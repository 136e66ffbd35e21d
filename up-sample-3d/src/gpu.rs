//! Upsampling on square-packed textures.

use crate::{
    common::*,
    error::UpSampleError,
    index_map::{IndexMap, IndexMapCache},
    up_sample_3d::UpSampling3DInit,
};
use texture_runtime::MAP_INPUT_PROGRAM;

/// The texture execution path of [UpSampling3D](crate::UpSampling3D).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GpuUpSample3D {
    init: UpSampling3DInit,
    #[derivative(Debug = "ignore")]
    runtime: RuntimeHandle,
    program: Program,
    index_map: IndexMapCache,
    output: Option<LayerTensor>,
}

impl GpuUpSample3D {
    /// Compiles the gather program on `runtime`.
    pub fn new(init: UpSampling3DInit, runtime: RuntimeHandle) -> Result<Self> {
        let program = runtime.try_borrow_mut()?.compile_program(MAP_INPUT_PROGRAM)?;

        Ok(Self {
            init,
            runtime,
            program,
            index_map: IndexMapCache::new(),
            output: None,
        })
    }

    pub fn output(&self) -> Option<&LayerTensor> {
        self.output.as_ref()
    }

    pub fn index_map(&self) -> Option<&IndexMap> {
        self.index_map.get()
    }

    pub fn num_index_map_builds(&self) -> usize {
        self.index_map.num_builds()
    }

    pub fn forward(&mut self, input: &mut LayerTensor) -> Result<&LayerTensor> {
        let Self {
            init,
            runtime,
            program,
            index_map,
            output,
        } = self;
        let mut runtime = runtime.try_borrow_mut()?;
        let runtime = &mut *runtime;

        let output_shape = init.output_shape(input.shape())?;

        // upload the input if it is not on the device yet
        if input.texture().is_none() {
            if input.host().is_none() {
                return Err(UpSampleError::Precondition(
                    "the input tensor has neither host data nor a texture".into(),
                )
                .into());
            }
            input.reshape_to_2d_square()?;
            let texture = input.create_texture(runtime, TextureFormat::Float)?;
            debug!(
                "uploaded input of shape {:?} as a {}x{} texture",
                input.shape(),
                texture.rows(),
                texture.cols()
            );
        }
        let (indices, input_texture) = input
            .packed_texture()
            .ok_or_else(|| format_err!("the input tensor has no packed texture"))?;
        if input_texture.format() != TextureFormat::Float {
            return Err(UpSampleError::Precondition(format!(
                "expect a float input texture, but get a {} texture",
                input_texture.format().as_ref()
            ))
            .into());
        }

        let map = index_map.get_or_build(
            indices,
            &init.size,
            init.data_format,
            &output_shape,
            runtime,
        )?;

        let reusable = matches!(
            output.as_ref(),
            Some(prev) if prev.shape() == output_shape.as_slice()
        );
        if !reusable {
            let (side, _) = map.row().size2()?;
            let texture = runtime.allocate_texture(side, side, TextureFormat::Float)?;
            debug!(
                "allocated a {}x{} output texture for shape {:?}",
                side, side, output_shape
            );
            *output = Some(LayerTensor::from_texture(&output_shape, texture)?);
        }
        let output = output
            .as_mut()
            .ok_or_else(|| format_err!("the output tensor is not allocated"))?;
        let output_texture = *output
            .texture()
            .ok_or_else(|| format_err!("the output tensor has no texture"))?;

        runtime.run_program(
            program,
            &[
                TextureInput::new("x", &input_texture),
                TextureInput::new("rowIndexMap", &map.row_texture()),
                TextureInput::new("colIndexMap", &map.col_texture()),
            ],
            &output_texture,
        )?;

        // terminal layers hand the result back to the host
        if init.outbound == 0 {
            output.transfer_from_texture(runtime)?;
        }

        Ok(&*output)
    }
}
