#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `dualmat-kernels` turns a dualmat operation, its operand shapes, its transpose mode
//! and a caller-supplied expression into OpenCL C source. Kernels are first built as a
//! [`KernelSource`] of statements and [`IndexExpr`] trees, so the indexing can be
//! checked against the CPU path before any text is produced.
//!
//! ```rust
//! use dualmat_core::{Shape, TransposeMode};
//! use dualmat_kernels::synth;
//!
//! let kernel = synth::map::<f32>(Shape::new(4, 3), TransposeMode::First, "ret = v / 2.0f;");
//! let source = kernel.render();
//! assert!(source.contains("const float v = a[(j * 3 + i)];"));
//! assert_eq!(kernel.grid.extents(), vec![3, 4]);
//! ```

/// Element types accepted by kernels.
pub mod dtype;

/// Index expressions.
pub mod index;

/// Kernel synthesis per operation.
pub mod synth;

/// Structured kernel representation.
pub mod template;

pub use crate::dtype::DeviceElement;
pub use crate::index::{Bindings, IndexExpr, Var};
pub use crate::template::{Grid, KernelSource, Param, Stmt};
