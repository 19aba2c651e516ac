#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! The device half of dualmat. A [`Dispatch`] implementation owns device copies of
//! element stores and runs synthesized kernels on them; [`DeviceOps`] adds the device
//! variants of every matrix operation to [`dualmat_core::Matrix`].
//!
//! ```ignore
//! use dualmat_core::{Matrix, TransposeMode};
//! use dualmat_device::{opencl::OpenClDispatch, DeviceOps};
//!
//! let device = OpenClDispatch::new()?;
//! let a = Matrix::<f32>::from_fn(2, 3, |i, j| (i * 3 + j) as f32);
//! let mut b = Matrix::<f32>::new(3, 2);
//! a.send(&device)?;
//! b.send(&device)?;
//! a.map_on("ret = v * 2.0f;", &mut b, TransposeMode::First, &device)?;
//! b.receive(&device)?;
//! ```
//!
//! # Feature Flags
//!
//! - `opencl`: the [`opencl::OpenClDispatch`] dispatcher

/// Dispatcher interface.
pub mod dispatch;

/// Device variants of the matrix operations.
pub mod ops;

/// OpenCL dispatcher.
#[cfg(feature = "opencl")]
pub mod opencl;

pub use crate::dispatch::{Async, Dispatch, DispatchError, ExecMode, Launch};
pub use crate::ops::DeviceOps;
