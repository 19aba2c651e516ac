#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `dualmat-core` provides the dense [`Matrix`] type and the CPU half of the dual-target
//! engine: shape contracts, the transpose-mode index algebra shared with the kernel
//! synthesizer, and rayon-based execution strategies for every operation.
//!
//! # Architecture
//!
//! - **Matrix**: height, width and an element store, with the CPU operations as methods
//! - **ElementStore**: an owned buffer or a view over external memory, with a
//!   process-unique identity used by devices to track residency
//! - **Transpose algebra**: [`Access`] descriptors and per-operation layouts that map
//!   logical `(i, j)` positions to physical offsets without copying
//! - **Execution strategies**: [`ExecutionStrategy`] selects how the work is split across
//!   threads; the functions in [`ops`] take it explicitly
//!
//! # Quick Start
//!
//! ```rust
//! use dualmat_core::{Matrix, ReduceAxis, TransposeMode};
//!
//! let mut a = Matrix::<i32>::new(3, 3);
//! a.generate(|i, j| (i + j) as i32).unwrap();
//!
//! let mut rows = Matrix::new(3, 1);
//! a.reduce(&mut rows, ReduceAxis::Rows, TransposeMode::None).unwrap();
//! assert_eq!(rows.as_slice(), &[3, 6, 9]);
//! assert_eq!(a.sum().unwrap(), 18);
//! ```
//!
//! # Feature Flags
//!
//! - `serde`: `Serialize`/`Deserialize` for [`Matrix`] and [`Shape`]

/// Error types for matrix operations.
pub mod error;

/// Dense matrix type.
pub mod matrix;

/// CPU implementations of every operation.
pub mod ops;

/// Execution strategies for the CPU operations.
pub mod parallel;

/// Shape contract checks.
pub mod shape;

/// Element storage.
pub mod store;

/// Transpose-mode index algebra.
pub mod transpose;

/// Serialization support.
#[cfg(feature = "serde")]
mod serde;

pub use crate::error::MatrixError;
pub use crate::matrix::Matrix;
pub use crate::parallel::{ExecutionStrategy, ParallelError};
pub use crate::shape::{Role, Shape};
pub use crate::store::{ElementStore, StoreKey};
pub use crate::transpose::{Access, RavelOrder, ReduceAxis, TransposeMode};
