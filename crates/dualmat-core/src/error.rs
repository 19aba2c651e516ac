use thiserror::Error;

use crate::parallel::ParallelError;
use crate::shape::{Role, Shape};

/// Error type for matrix operations.
///
/// Every validation error is raised before the operation touches a result buffer, so a
/// failed call never leaves a partially written matrix behind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    /// An input or result matrix has the wrong dimensions for the operation.
    ///
    /// # Examples
    /// - Multiplying a 3x4 matrix by a 3x3 matrix without transposition
    /// - Stacking two matrices whose heights differ
    /// - Writing a transposed map into a result that was not shaped `w x h`
    #[error("{operation}: {role} shape mismatch, expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Name of the operation that rejected the shapes.
        operation: &'static str,
        /// Whether the offending matrix is an input or the result.
        role: Role,
        /// Shape required by the operation.
        expected: Shape,
        /// Shape that was supplied.
        actual: Shape,
    },

    /// The total number of elements does not match.
    ///
    /// Raised by reshape, ravel, views and constructors taking existing data, none of
    /// which care about the individual dimensions.
    #[error("{operation}: size mismatch, expected {expected} elements, got {actual}")]
    SizeMismatch {
        /// Name of the operation that rejected the size.
        operation: &'static str,
        /// Required element count.
        expected: usize,
        /// Supplied element count.
        actual: usize,
    },

    /// The element type cannot be used by the selected device.
    #[error("Unsupported element type {type_name}: {reason}")]
    UnsupportedType {
        /// The Rust type name of the element.
        type_name: &'static str,
        /// Why the device rejected it.
        reason: String,
    },

    /// The operation is not available on the selected execution target.
    #[error("Unsupported operation: {operation} - {reason}")]
    Unsupported {
        /// Name of the operation.
        operation: &'static str,
        /// Reason why the operation is not supported.
        reason: String,
    },

    /// The device layer failed to build or launch a kernel, or to move a buffer.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// The CPU execution strategy is misconfigured.
    #[error(transparent)]
    Parallel(#[from] ParallelError),
}

impl MatrixError {
    /// Creates a ShapeMismatch error.
    pub fn shape_mismatch(
        operation: &'static str,
        role: Role,
        expected: Shape,
        actual: Shape,
    ) -> Self {
        Self::ShapeMismatch {
            operation,
            role,
            expected,
            actual,
        }
    }

    /// Creates a SizeMismatch error.
    pub fn size_mismatch(operation: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            operation,
            expected,
            actual,
        }
    }

    /// Creates an Unsupported error.
    pub fn unsupported(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates a Dispatch error from any device-layer message.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch(message.into())
    }

    /// Returns true if the error comes from the caller passing incompatible matrices.
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. } | Self::SizeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_message() {
        let err = MatrixError::shape_mismatch("mul", Role::Result, Shape::new(4, 4), Shape::new(3, 3));
        assert_eq!(
            err.to_string(),
            "mul: result shape mismatch, expected 4x4, got 3x3"
        );
        assert!(err.is_shape_error());
    }

    #[test]
    fn test_size_mismatch_message() {
        let err = MatrixError::size_mismatch("reshape", 16, 15);
        assert_eq!(
            err.to_string(),
            "reshape: size mismatch, expected 16 elements, got 15"
        );
    }

    #[test]
    fn test_dispatch_is_not_shape_error() {
        let err = MatrixError::dispatch("build failed");
        assert!(!err.is_shape_error());
        assert_eq!(err.to_string(), "Dispatch error: build failed");
    }
}
