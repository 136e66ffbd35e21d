//! Square packing of N-D tensors into 2-D textures.

use crate::common::*;

/// Returns the side length of the smallest square holding `numel` elements.
pub fn square_side(numel: i64) -> i64 {
    if numel <= 0 {
        return 0;
    }

    let mut side = (numel as f64).sqrt().ceil() as i64;
    while side * side < numel {
        side += 1;
    }
    while side > 1 && (side - 1) * (side - 1) >= numel {
        side -= 1;
    }
    side
}

/// Texture coordinates of every element of a square-packed tensor.
///
/// The `row` and `col` tensors are shaped like the original tensor and hold
/// `Int` values. The element at row-major flat index `f` is stored at
/// `(f / side, f % side)` in the packed texture.
#[derive(Debug, TensorLike, CopyGetters, Getters)]
pub struct SquareIndices {
    #[tensor_like(copy)]
    #[getset(get_copy = "pub")]
    side: i64,
    #[getset(get = "pub")]
    row: Tensor,
    #[getset(get = "pub")]
    col: Tensor,
}

impl SquareIndices {
    pub fn for_shape(shape: &[i64]) -> Result<Self> {
        ensure!(
            shape.iter().all(|&size| size >= 0),
            "negative dimension in shape {:?}",
            shape
        );
        let numel: i64 = shape.iter().product();
        let side = square_side(numel);
        ensure!(
            side <= i32::MAX as i64,
            "shape {:?} is too large to be packed into an integer-indexed texture",
            shape
        );

        let (row, col): (Vec<i32>, Vec<i32>) = (0..numel)
            .map(|index| ((index / side) as i32, (index % side) as i32))
            .unzip();
        let row = Tensor::of_slice(&row).f_view(shape)?;
        let col = Tensor::of_slice(&col).f_view(shape)?;

        Ok(Self { side, row, col })
    }

    pub fn shape(&self) -> Vec<i64> {
        self.row.size()
    }
}

pub trait TensorExt {
    /// Creates a view starting at `start` and stepping by `step` along each axis.
    fn f_strided_view(&self, start: &[i64], step: &[i64]) -> Result<Tensor>;

    fn strided_view(&self, start: &[i64], step: &[i64]) -> Tensor {
        self.f_strided_view(start, step).unwrap()
    }

    /// Copies `src` into the strided view of `self` at `start` with `step`.
    fn f_assign_strided_(&mut self, start: &[i64], step: &[i64], src: &Tensor) -> Result<()>;

    fn f_reshape_to_2d_square(&self) -> Result<(Tensor, SquareIndices)>;

    fn reshape_to_2d_square(&self) -> (Tensor, SquareIndices) {
        self.f_reshape_to_2d_square().unwrap()
    }

    /// Undoes the square packing, restoring a tensor of `shape`.
    fn f_reshape_from_2d_square(&self, shape: &[i64]) -> Result<Tensor>;

    fn reshape_from_2d_square(&self, shape: &[i64]) -> Tensor {
        self.f_reshape_from_2d_square(shape).unwrap()
    }
}

impl TensorExt for Tensor {
    fn f_strided_view(&self, start: &[i64], step: &[i64]) -> Result<Tensor> {
        let shape = self.size();
        ensure!(
            start.len() == shape.len() && step.len() == shape.len(),
            "expect {} start offsets and steps, but get {} and {}",
            shape.len(),
            start.len(),
            step.len()
        );

        izip!(0.., &shape, start, step).try_fold(
            self.shallow_clone(),
            |view, (dim, &size, &start, &step)| -> Result<_> {
                ensure!(
                    step > 0 && (0..=size).contains(&start),
                    "invalid start {} and step {} for dimension {} of size {}",
                    start,
                    step,
                    dim,
                    size
                );
                Ok(view.f_slice(dim, start, size, step)?)
            },
        )
    }

    fn f_assign_strided_(&mut self, start: &[i64], step: &[i64], src: &Tensor) -> Result<()> {
        let mut view = self.f_strided_view(start, step)?;
        ensure!(
            view.size() == src.size(),
            "strided view of shape {:?} cannot be assigned from a tensor of shape {:?}",
            view.size(),
            src.size()
        );
        view.f_copy_(src)?;
        Ok(())
    }

    fn f_reshape_to_2d_square(&self) -> Result<(Tensor, SquareIndices)> {
        let shape = self.size();
        let indices = SquareIndices::for_shape(&shape)?;
        let numel: i64 = shape.iter().product();
        let side = indices.side();

        let packed = Tensor::f_zeros(&[side * side], (self.kind(), self.device()))?;
        packed
            .f_narrow(0, 0, numel)?
            .f_copy_(&self.f_reshape(&[numel])?)?;
        let packed = packed.f_view([side, side])?;

        Ok((packed, indices))
    }

    fn f_reshape_from_2d_square(&self, shape: &[i64]) -> Result<Tensor> {
        let (rows, cols) = self.size2()?;
        let numel: i64 = shape.iter().product();
        ensure!(
            rows == cols && rows == square_side(numel),
            "a {}x{} texture does not hold a square-packed tensor of shape {:?}",
            rows,
            cols,
            shape
        );

        let unpacked = self
            .f_reshape(&[rows * cols])?
            .f_narrow(0, 0, numel)?
            .f_reshape(shape)?;
        Ok(unpacked)
    }
}
