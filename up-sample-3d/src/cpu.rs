//! Upsampling by strided assignment on host tensors.

use crate::{
    common::*,
    config::{DataFormat, Size3},
    error::UpSampleError,
    up_sample_3d::UpSampling3DInit,
};

/// Copies `src` into every strided sub-view of `dst` selected by the offset
/// block of `size`.
///
/// The sub-view for offset `(di, dj, dk)` starts at `di`, `dj` and `dk` on the
/// given spatial `axes`, at zero on the remaining axis, and steps by the
/// upsampling factors on the spatial axes. The loop runs once per offset, so
/// the number of bulk copies is `s0 * s1 * s2` regardless of the tensor size.
pub fn f_broadcast_strided_(
    dst: &mut Tensor,
    src: &Tensor,
    axes: [usize; 3],
    size: &Size3,
) -> Result<()> {
    let ndims = dst.dim();
    ensure!(
        src.dim() == ndims && axes.iter().all(|&axis| axis < ndims),
        "cannot broadcast a {}-dimensional tensor into a {}-dimensional tensor along axes {:?}",
        src.dim(),
        ndims,
        axes
    );
    let factors = size.factors();

    for (di, dj, dk) in iproduct!(0..factors[0], 0..factors[1], 0..factors[2]) {
        let mut start = vec![0; ndims];
        let mut step = vec![1; ndims];
        izip!(axes, [di, dj, dk], factors).for_each(|(axis, offset, factor)| {
            start[axis] = offset;
            step[axis] = factor;
        });
        dst.f_assign_strided_(&start, &step, src)?;
    }

    Ok(())
}

/// Upsamples `input` into `output`, both laid out in `data_format`.
///
/// Channels-first tensors are viewed as channels-last for the duration of the
/// copy. Neither tensor is reordered in memory.
pub fn f_up_sample_3d_into(
    output: &mut Tensor,
    input: &Tensor,
    size: &Size3,
    data_format: DataFormat,
) -> Result<()> {
    let to_last = data_format.to_channels_last();
    let input = input.f_permute(&to_last)?;
    let mut output = output.f_permute(&to_last)?;
    f_broadcast_strided_(&mut output, &input, [0, 1, 2], size)
}

/// Upsamples `input` into a newly allocated tensor.
pub fn f_up_sample_3d(input: &Tensor, size: &Size3, data_format: DataFormat) -> Result<Tensor> {
    let init = UpSampling3DInit {
        size: *size,
        data_format,
        ..Default::default()
    };
    let output_shape = init.output_shape(&input.size())?;
    let mut output = alloc_output(&output_shape, data_format, input.kind(), input.device())?;
    f_up_sample_3d_into(&mut output, input, size, data_format)?;
    Ok(output)
}

/// Allocates a contiguous channels-last buffer and returns it viewed in
/// `data_format`.
fn alloc_output(
    shape: &[i64],
    data_format: DataFormat,
    kind: Kind,
    device: Device,
) -> Result<Tensor> {
    let to_last = data_format.to_channels_last();
    let last_shape: Vec<i64> = to_last.iter().map(|&axis| shape[axis as usize]).collect();
    let buffer = Tensor::f_zeros(&last_shape, (kind, device))?;
    let output = buffer.f_permute(&data_format.from_channels_last())?;
    Ok(output)
}

/// The host execution path of [UpSampling3D](crate::UpSampling3D).
#[derive(Debug)]
pub struct CpuUpSample3D {
    init: UpSampling3DInit,
    output: Option<LayerTensor>,
}

impl CpuUpSample3D {
    pub fn new(init: UpSampling3DInit) -> Self {
        Self { init, output: None }
    }

    pub fn output(&self) -> Option<&LayerTensor> {
        self.output.as_ref()
    }

    pub fn forward(&mut self, input: &LayerTensor) -> Result<&LayerTensor> {
        let Self { init, output } = self;
        let input = input.host().ok_or_else(|| {
            UpSampleError::Precondition("the input tensor has no host data".into())
        })?;
        let output_shape = init.output_shape(&input.size())?;

        // reuse the previous buffer if it has the same layout
        let reusable = output.as_ref().and_then(|output| output.host()).filter(|prev| {
            prev.size() == output_shape
                && prev.kind() == input.kind()
                && prev.device() == input.device()
        });
        let mut buffer = match reusable {
            Some(prev) => prev.shallow_clone(),
            None => {
                debug!("allocate output buffer of shape {:?}", output_shape);
                alloc_output(&output_shape, init.data_format, input.kind(), input.device())?
            }
        };

        f_up_sample_3d_into(&mut buffer, input, &init.size, init.data_format)?;

        Ok(&*output.insert(LayerTensor::new(buffer)))
    }
}
