#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use dualmat_core as matrix;

#[doc(inline)]
pub use dualmat_kernels as kernels;

#[doc(inline)]
pub use dualmat_device as device;

pub use dualmat_core::{Matrix, MatrixError, ReduceAxis, TransposeMode};
pub use dualmat_device::{Async, DeviceOps, Dispatch};
