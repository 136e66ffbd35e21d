use crate::{
    common::*,
    config::{DataFormat, ExecutionMode, Size3, UpSampling3DConfig},
    cpu::CpuUpSample3D,
    error::UpSampleError,
    gpu::GpuUpSample3D,
};

pub use up_sample_3d_init::*;
pub use up_sample_3d_::*;

mod up_sample_3d_init {
    use super::{up_sample_3d_::ExecutionPath, *};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UpSampling3DInit {
        pub size: Size3,
        pub data_format: DataFormat,
        /// Number of downstream consumers. Outputs of layers without consumers
        /// are read back to the host on the texture path.
        pub outbound: usize,
    }

    impl UpSampling3DInit {
        /// Computes the output shape of a 4-D input laid out in `data_format`.
        pub fn output_shape(&self, input_shape: &[i64]) -> Result<Vec<i64>> {
            let Self {
                size, data_format, ..
            } = *self;

            if input_shape.len() != 4 || input_shape.iter().any(|&dim| dim <= 0) {
                return Err(UpSampleError::Precondition(format!(
                    "expect a 4-dimensional input with positive dimensions, but get shape {:?}",
                    input_shape
                ))
                .into());
            }

            let mut output_shape = input_shape.to_vec();
            izip!(data_format.spatial_axes(), size.factors()).for_each(|(axis, factor)| {
                output_shape[axis] *= factor;
            });
            Ok(output_shape)
        }

        pub fn build(self, mode: ExecutionMode) -> Result<UpSampling3D> {
            let path = match mode {
                ExecutionMode::Cpu => ExecutionPath::Cpu(CpuUpSample3D::new(self)),
                ExecutionMode::Gpu(runtime) => {
                    ExecutionPath::Gpu(Box::new(GpuUpSample3D::new(self, runtime)?))
                }
            };
            info!(
                "build UpSampling3D with size {:?}, {} and {} path",
                self.size.as_ref(),
                self.data_format.as_ref(),
                path.as_ref()
            );

            Ok(UpSampling3D {
                init: self,
                path,
                input_shape: None,
                output_shape: None,
            })
        }
    }

    impl From<UpSampling3DConfig> for UpSampling3DInit {
        fn from(from: UpSampling3DConfig) -> Self {
            let UpSampling3DConfig {
                size,
                data_format,
                outbound,
            } = from;
            Self {
                size,
                data_format,
                outbound,
            }
        }
    }
}

mod up_sample_3d_ {
    use super::*;

    #[derive(Debug, AsRefStr)]
    #[strum(serialize_all = "snake_case")]
    pub(super) enum ExecutionPath {
        Cpu(CpuUpSample3D),
        Gpu(Box<GpuUpSample3D>),
    }

    /// Nearest-neighbor upsampling layer for 4-D tensors.
    #[derive(Debug, Getters)]
    pub struct UpSampling3D {
        #[getset(get = "pub")]
        pub(super) init: UpSampling3DInit,
        pub(super) path: ExecutionPath,
        /// Logical shape of the last input.
        #[getset(get = "pub")]
        pub(super) input_shape: Option<Vec<i64>>,
        /// Logical shape of the last output.
        #[getset(get = "pub")]
        pub(super) output_shape: Option<Vec<i64>>,
    }

    impl UpSampling3D {
        /// Upsamples `input` on the execution path chosen at construction.
        ///
        /// The output is owned by the layer and overwritten by the next call.
        /// On the texture path the input gains a packed texture if it has none.
        pub fn forward(&mut self, input: &mut LayerTensor) -> Result<&LayerTensor> {
            let output = match &mut self.path {
                ExecutionPath::Cpu(cpu) => cpu.forward(input)?,
                ExecutionPath::Gpu(gpu) => gpu.forward(input)?,
            };
            self.input_shape = Some(input.shape().to_vec());
            self.output_shape = Some(output.shape().to_vec());
            Ok(output)
        }

        /// Upsamples a host tensor and returns the output on the host.
        ///
        /// The returned tensor is a copy, so it is not overwritten by later calls.
        pub fn f_forward_tensor(&mut self, input: &Tensor) -> Result<Tensor> {
            let mut input = LayerTensor::new(input.shallow_clone());
            let output = self.forward(&mut input)?;
            let output = output.host().ok_or_else(|| {
                UpSampleError::Precondition(
                    "the output stays on the device because the layer has consumers".into(),
                )
            })?;
            Ok(output.copy())
        }

        pub fn forward_tensor(&mut self, input: &Tensor) -> Tensor {
            self.f_forward_tensor(input).unwrap()
        }

        pub fn output(&self) -> Option<&LayerTensor> {
            match &self.path {
                ExecutionPath::Cpu(cpu) => cpu.output(),
                ExecutionPath::Gpu(gpu) => gpu.output(),
            }
        }

        pub fn is_gpu(&self) -> bool {
            matches!(self.path, ExecutionPath::Gpu(_))
        }

        /// Number of times the index maps were built. Always zero on the host path.
        pub fn num_index_map_builds(&self) -> usize {
            match &self.path {
                ExecutionPath::Cpu(_) => 0,
                ExecutionPath::Gpu(gpu) => gpu.num_index_map_builds(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_shape_channels_last() {
        let init = UpSampling3DInit {
            size: Size3::new(1, 2, 3).unwrap(),
            ..Default::default()
        };
        assert_eq!(init.output_shape(&[4, 5, 6, 7]).unwrap(), [4, 10, 18, 7]);
    }

    #[test]
    fn output_shape_channels_first() {
        let init = UpSampling3DInit {
            size: Size3::new(1, 2, 3).unwrap(),
            data_format: DataFormat::ChannelsFirst,
            ..Default::default()
        };
        assert_eq!(init.output_shape(&[4, 5, 6, 7]).unwrap(), [4, 5, 12, 21]);
    }

    #[test]
    fn output_shape_rejects_non_4d_input() {
        let init = UpSampling3DInit::default();
        let err = init.output_shape(&[2, 2, 2]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpSampleError>(),
            Some(UpSampleError::Precondition(_))
        ));
    }

    #[test]
    fn output_shape_rejects_zero_sized_dimension() {
        let init = UpSampling3DInit::default();
        let err = init.output_shape(&[0, 1, 1, 1]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpSampleError>(),
            Some(UpSampleError::Precondition(_))
        ));
    }

    #[test]
    fn forward_records_shapes() {
        let mut layer = UpSampling3DInit::default()
            .build(ExecutionMode::Cpu)
            .unwrap();
        assert!(!layer.is_gpu());
        assert!(layer.output().is_none());

        let output = layer.forward_tensor(&Tensor::rand(&[1, 2, 3, 4], tch::kind::FLOAT_CPU));
        assert_eq!(output.size(), [2, 4, 6, 4]);
        assert_eq!(layer.input_shape().as_deref(), Some(&[1, 2, 3, 4][..]));
        assert_eq!(layer.output_shape().as_deref(), Some(&[2, 4, 6, 4][..]));
        assert_eq!(layer.num_index_map_builds(), 0);
    }

    #[test]
    fn init_from_config() {
        let config = UpSampling3DConfig::from_json5_str(
            "{ size: [3, 1, 2], data_format: 'channels_first', outbound: 2 }",
        )
        .unwrap();
        let init = UpSampling3DInit::from(config);
        assert_eq!(init.size.factors(), [3, 1, 2]);
        assert_eq!(init.data_format, DataFormat::ChannelsFirst);
        assert_eq!(init.outbound, 2);
    }
}
