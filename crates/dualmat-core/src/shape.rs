//! Shape contracts shared by every operation.
//!
//! The checks are pure: they only read dimensions and return an error describing the
//! first violated contract. Operations call them before writing to any result.

use crate::{error::MatrixError, matrix::Matrix};

/// Height and width of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    /// Number of rows.
    pub h: usize,
    /// Number of columns.
    pub w: usize,
}

impl Shape {
    /// Creates a new shape.
    pub const fn new(h: usize, w: usize) -> Self {
        Self { h, w }
    }

    /// Returns the number of elements, `h * w`.
    #[inline]
    pub const fn total_size(&self) -> usize {
        self.h * self.w
    }

    /// Returns `h * w`, or `None` if the product does not fit a `usize`.
    #[inline]
    pub const fn checked_total_size(&self) -> Option<usize> {
        self.h.checked_mul(self.w)
    }

    /// Returns the shape with rows and columns swapped.
    #[inline]
    pub const fn transposed(&self) -> Self {
        Self {
            h: self.w,
            w: self.h,
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.h, self.w)
    }
}

/// Which side of an operation a matrix plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// A matrix the operation reads.
    Input,
    /// The matrix the operation writes.
    Result,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Input => write!(f, "input"),
            Role::Result => write!(f, "result"),
        }
    }
}

/// Checks that `matrix` is exactly `expected_h x expected_w`.
///
/// # Errors
///
/// Returns [`MatrixError::ShapeMismatch`] naming the operation, both shapes and `role`.
pub fn require_shape<T>(
    matrix: &Matrix<T>,
    expected_h: usize,
    expected_w: usize,
    op_name: &'static str,
    role: Role,
) -> Result<(), MatrixError> {
    let expected = Shape::new(expected_h, expected_w);
    if matrix.shape() != expected {
        return Err(MatrixError::shape_mismatch(
            op_name,
            role,
            expected,
            matrix.shape(),
        ));
    }
    Ok(())
}

/// Checks that the result `dst` is exactly `expected`.
pub fn require_result<T>(
    dst: &Matrix<T>,
    expected: Shape,
    op_name: &'static str,
) -> Result<(), MatrixError> {
    require_shape(dst, expected.h, expected.w, op_name, Role::Result)
}

/// Checks that the input `src` is exactly `expected`.
pub fn require_input<T>(
    src: &Matrix<T>,
    expected: Shape,
    op_name: &'static str,
) -> Result<(), MatrixError> {
    require_shape(src, expected.h, expected.w, op_name, Role::Input)
}

/// Returns the element count of an `h x w` matrix.
///
/// # Errors
///
/// Returns [`MatrixError::SizeMismatch`] with `usize::MAX` as the expected count if
/// `h * w` overflows; `actual` is the count the caller was given.
pub fn require_addressable(
    h: usize,
    w: usize,
    actual: usize,
    op_name: &'static str,
) -> Result<usize, MatrixError> {
    Shape::new(h, w)
        .checked_total_size()
        .ok_or_else(|| MatrixError::size_mismatch(op_name, usize::MAX, actual))
}

/// Checks that `b` has the same height as `a`.
pub fn require_height_equals<T>(
    a: &Matrix<T>,
    b: &Matrix<T>,
    op_name: &'static str,
) -> Result<(), MatrixError> {
    if a.h() != b.h() {
        return Err(MatrixError::shape_mismatch(
            op_name,
            Role::Input,
            Shape::new(a.h(), b.w()),
            b.shape(),
        ));
    }
    Ok(())
}

/// Checks that `b` has the same width as `a`.
pub fn require_width_equals<T>(
    a: &Matrix<T>,
    b: &Matrix<T>,
    op_name: &'static str,
) -> Result<(), MatrixError> {
    if a.w() != b.w() {
        return Err(MatrixError::shape_mismatch(
            op_name,
            Role::Input,
            Shape::new(b.h(), a.w()),
            b.shape(),
        ));
    }
    Ok(())
}

/// Checks only the element count of `matrix`, ignoring how it is split into rows.
///
/// # Errors
///
/// Returns [`MatrixError::SizeMismatch`] if `matrix.total_size() != expected_total`.
pub fn require_total_size<T>(
    matrix: &Matrix<T>,
    expected_total: usize,
    op_name: &'static str,
) -> Result<(), MatrixError> {
    if matrix.total_size() != expected_total {
        return Err(MatrixError::size_mismatch(
            op_name,
            expected_total,
            matrix.total_size(),
        ));
    }
    Ok(())
}
