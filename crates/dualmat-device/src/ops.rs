//! Device-side matrix operations.
//!
//! [`DeviceOps`] mirrors the CPU methods of [`Matrix`] with an extra dispatcher
//! argument. Every method validates shapes with the same layouts as the CPU path, then
//! synthesizes a kernel and hands it to the dispatcher. Nothing falls back to the CPU:
//! an operation the device cannot run returns an error instead.
//!
//! Operands must have been sent to the device beforehand and results stay there until
//! received.

use dualmat_core::{
    shape::{require_height_equals, require_input, require_result, require_width_equals},
    transpose::{ElementwiseLayout, ProductLayout, ReductionLayout, UnaryLayout},
    Matrix, MatrixError, ReduceAxis, Shape, StoreKey, TransposeMode,
};
use dualmat_kernels::{
    synth::{self, Block},
    DeviceElement, KernelSource,
};

use crate::dispatch::{Dispatch, Launch};

/// Launches `kernel` unless its grid is empty.
fn run<T, D>(device: &D, kernel: &KernelSource, buffers: Vec<StoreKey>) -> Result<(), MatrixError>
where
    T: DeviceElement,
    D: Dispatch + ?Sized,
{
    if kernel.grid.is_empty() {
        log::debug!("skipping {} over an empty grid", kernel.entry);
        return Ok(());
    }
    let launch = Launch::new::<T>(kernel, buffers);
    log::debug!(
        "launching {} over {:?} with {} buffers",
        launch.entry,
        launch.extents,
        launch.buffers.len()
    );
    device.compute(&launch)
}

fn copy_blocks<T, D>(
    device: &D,
    blocks: &[Block],
    buffers: &[(StoreKey, StoreKey)],
) -> Result<(), MatrixError>
where
    T: DeviceElement,
    D: Dispatch + ?Sized,
{
    for (block, &(src, dst)) in blocks.iter().zip(buffers) {
        run::<T, D>(device, &synth::block_copy::<T>(block), vec![src, dst])?;
    }
    Ok(())
}

fn byte_len<T>(m: &Matrix<T>) -> usize {
    m.total_size() * std::mem::size_of::<T>()
}

/// Matrix operations executed by a [`Dispatch`] implementation.
///
/// The method names follow the CPU methods with an `_on` suffix, and the shape rules
/// are identical.
pub trait DeviceOps<T: DeviceElement> {
    /// Copies the host elements to the device.
    fn send<D: Dispatch + ?Sized>(&self, device: &D) -> Result<(), MatrixError>;

    /// Copies the device elements back to the host.
    fn receive<D: Dispatch + ?Sized>(&mut self, device: &D) -> Result<(), MatrixError>;

    /// Frees the device copy.
    fn release<D: Dispatch + ?Sized>(&self, device: &D) -> Result<(), MatrixError>;

    /// Sets every element to the value `body` assigns to `ret`, with `i` and `j` in scope.
    fn generate_on<D: Dispatch + ?Sized>(&mut self, body: &str, device: &D) -> Result<(), MatrixError>;

    /// Sets every element to `value`.
    fn full_on<D: Dispatch + ?Sized>(&mut self, value: T, device: &D) -> Result<(), MatrixError>;

    /// Copies `src`, which must have the same shape.
    fn cpy_on<D: Dispatch + ?Sized>(&mut self, src: &Matrix<T>, device: &D) -> Result<(), MatrixError>;

    /// Writes `body(v)` for every element into `dst`.
    fn map_on<D: Dispatch + ?Sized>(
        &self,
        body: &str,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Writes `body(v1, v2)` for every pair of elements of `self` and `other` into `dst`.
    fn transform_on<D: Dispatch + ?Sized>(
        &self,
        other: &Matrix<T>,
        body: &str,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Element-wise product.
    fn hadamard_on<D: Dispatch + ?Sized>(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Writes the transpose into `dst`.
    fn transpose_on<D: Dispatch + ?Sized>(&self, dst: &mut Matrix<T>, device: &D) -> Result<(), MatrixError>;

    /// Sums along `axis` into `dst`.
    ///
    /// # Errors
    ///
    /// [`ReduceAxis::Full`] returns [`MatrixError::Unsupported`] without launching, whatever
    /// the shape of `dst`.
    fn reduce_on<D: Dispatch + ?Sized>(
        &self,
        dst: &mut Matrix<T>,
        axis: ReduceAxis,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Matrix product.
    fn mul_on<D: Dispatch + ?Sized>(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Product with a scalar.
    fn mul_scalar_on<D: Dispatch + ?Sized>(
        &self,
        scalar: T,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Writes `[left | right]` into `self`.
    fn hstack_on<D: Dispatch + ?Sized>(
        &mut self,
        left: &Matrix<T>,
        right: &Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Writes `top` above `bottom` into `self`.
    fn vstack_on<D: Dispatch + ?Sized>(
        &mut self,
        top: &Matrix<T>,
        bottom: &Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Splits the columns of `self` into the pre-shaped `left` and `right`.
    fn hsplit_on<D: Dispatch + ?Sized>(
        &self,
        left: &mut Matrix<T>,
        right: &mut Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError>;

    /// Splits the rows of `self` into the pre-shaped `top` and `bottom`.
    fn vsplit_on<D: Dispatch + ?Sized>(
        &self,
        top: &mut Matrix<T>,
        bottom: &mut Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError>;
}

impl<T: DeviceElement> DeviceOps<T> for Matrix<T> {
    fn send<D: Dispatch + ?Sized>(&self, device: &D) -> Result<(), MatrixError> {
        // SAFETY: device elements are plain scalars without padding
        let bytes = unsafe { std::slice::from_raw_parts(self.as_ptr() as *const u8, byte_len(self)) };
        device.transfer_to_device(self.store_key(), bytes)
    }

    fn receive<D: Dispatch + ?Sized>(&mut self, device: &D) -> Result<(), MatrixError> {
        let key = self.store_key();
        let len = byte_len(self);
        // SAFETY: the byte view covers exactly the elements of the store, and only
        // canonical values of `T` are ever written through it
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr() as *mut u8, len) };
        if T::ANY_BIT_PATTERN {
            return device.transfer_from_device(key, bytes);
        }
        let mut scratch = vec![0u8; len];
        device.transfer_from_device(key, &mut scratch)?;
        T::canonicalize(&mut scratch);
        bytes.copy_from_slice(&scratch);
        Ok(())
    }

    fn release<D: Dispatch + ?Sized>(&self, device: &D) -> Result<(), MatrixError> {
        device.release_on_device(self.store_key())
    }

    fn generate_on<D: Dispatch + ?Sized>(&mut self, body: &str, device: &D) -> Result<(), MatrixError> {
        let kernel = synth::generate::<T>(self.shape(), body);
        run::<T, D>(device, &kernel, vec![self.store_key()])
    }

    fn full_on<D: Dispatch + ?Sized>(&mut self, value: T, device: &D) -> Result<(), MatrixError> {
        let kernel = synth::full::<T>(self.shape(), value);
        run::<T, D>(device, &kernel, vec![self.store_key()])
    }

    fn cpy_on<D: Dispatch + ?Sized>(&mut self, src: &Matrix<T>, device: &D) -> Result<(), MatrixError> {
        require_input(src, self.shape(), "cpy")?;
        let kernel = synth::block_copy::<T>(&Block::whole(self.shape()));
        run::<T, D>(device, &kernel, vec![src.store_key(), self.store_key()])
    }

    fn map_on<D: Dispatch + ?Sized>(
        &self,
        body: &str,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError> {
        require_result(dst, UnaryLayout::new(self.shape(), mode).result, "map")?;
        let kernel = synth::map::<T>(self.shape(), mode, body);
        run::<T, D>(device, &kernel, vec![self.store_key(), dst.store_key()])
    }

    fn transform_on<D: Dispatch + ?Sized>(
        &self,
        other: &Matrix<T>,
        body: &str,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError> {
        let layout = ElementwiseLayout::new(self.shape(), mode);
        require_input(other, layout.second, "transform")?;
        require_result(dst, layout.result, "transform")?;
        let kernel = synth::transform::<T>(self.shape(), mode, body);
        let buffers = vec![self.store_key(), other.store_key(), dst.store_key()];
        run::<T, D>(device, &kernel, buffers)
    }

    fn hadamard_on<D: Dispatch + ?Sized>(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError> {
        let layout = ElementwiseLayout::new(self.shape(), mode);
        require_input(other, layout.second, "hadamard")?;
        require_result(dst, layout.result, "hadamard")?;
        let kernel = synth::hadamard::<T>(self.shape(), mode);
        let buffers = vec![self.store_key(), other.store_key(), dst.store_key()];
        run::<T, D>(device, &kernel, buffers)
    }

    fn transpose_on<D: Dispatch + ?Sized>(&self, dst: &mut Matrix<T>, device: &D) -> Result<(), MatrixError> {
        require_result(dst, self.shape().transposed(), "transpose")?;
        let kernel = synth::transpose::<T>(self.shape());
        run::<T, D>(device, &kernel, vec![self.store_key(), dst.store_key()])
    }

    fn reduce_on<D: Dispatch + ?Sized>(
        &self,
        dst: &mut Matrix<T>,
        axis: ReduceAxis,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError> {
        // the axis decides support before any shape is checked
        let kernel = synth::reduce::<T>(self.shape(), axis, mode)?;
        require_result(dst, ReductionLayout::new(self.shape(), axis, mode).result, "reduce")?;
        run::<T, D>(device, &kernel, vec![self.store_key(), dst.store_key()])
    }

    fn mul_on<D: Dispatch + ?Sized>(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError> {
        let layout = ProductLayout::new(self.shape(), other.shape(), mode);
        require_input(other, layout.second, "mul")?;
        require_result(dst, layout.result, "mul")?;
        let kernel = synth::mul::<T>(self.shape(), other.shape(), mode);
        let buffers = vec![self.store_key(), other.store_key(), dst.store_key()];
        run::<T, D>(device, &kernel, buffers)
    }

    fn mul_scalar_on<D: Dispatch + ?Sized>(
        &self,
        scalar: T,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
        device: &D,
    ) -> Result<(), MatrixError> {
        require_result(dst, UnaryLayout::new(self.shape(), mode).result, "mul_scalar")?;
        let kernel = synth::mul_scalar::<T>(self.shape(), mode, scalar);
        run::<T, D>(device, &kernel, vec![self.store_key(), dst.store_key()])
    }

    fn hstack_on<D: Dispatch + ?Sized>(
        &mut self,
        left: &Matrix<T>,
        right: &Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError> {
        require_height_equals(left, right, "hstack")?;
        require_result(self, Shape::new(left.h(), left.w() + right.w()), "hstack")?;
        let blocks = synth::stack_blocks(&[left.shape(), right.shape()], self.shape(), true);
        let dst = self.store_key();
        copy_blocks::<T, D>(device, &blocks, &[(left.store_key(), dst), (right.store_key(), dst)])
    }

    fn vstack_on<D: Dispatch + ?Sized>(
        &mut self,
        top: &Matrix<T>,
        bottom: &Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError> {
        require_width_equals(top, bottom, "vstack")?;
        require_result(self, Shape::new(top.h() + bottom.h(), top.w()), "vstack")?;
        let blocks = synth::stack_blocks(&[top.shape(), bottom.shape()], self.shape(), false);
        let dst = self.store_key();
        copy_blocks::<T, D>(device, &blocks, &[(top.store_key(), dst), (bottom.store_key(), dst)])
    }

    fn hsplit_on<D: Dispatch + ?Sized>(
        &self,
        left: &mut Matrix<T>,
        right: &mut Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError> {
        let split = left.w().min(self.w());
        require_result(left, Shape::new(self.h(), split), "hsplit")?;
        require_result(right, Shape::new(self.h(), self.w() - split), "hsplit")?;
        let blocks = synth::split_blocks(self.shape(), &[left.shape(), right.shape()], true);
        let src = self.store_key();
        copy_blocks::<T, D>(device, &blocks, &[(src, left.store_key()), (src, right.store_key())])
    }

    fn vsplit_on<D: Dispatch + ?Sized>(
        &self,
        top: &mut Matrix<T>,
        bottom: &mut Matrix<T>,
        device: &D,
    ) -> Result<(), MatrixError> {
        let split = top.h().min(self.h());
        require_result(top, Shape::new(split, self.w()), "vsplit")?;
        require_result(bottom, Shape::new(self.h() - split, self.w()), "vsplit")?;
        let blocks = synth::split_blocks(self.shape(), &[top.shape(), bottom.shape()], false);
        let src = self.store_key();
        copy_blocks::<T, D>(device, &blocks, &[(src, top.store_key()), (src, bottom.store_key())])
    }
}
