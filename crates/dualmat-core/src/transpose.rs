//! Transpose-mode index algebra.
//!
//! Operations never materialize a transposed copy of an operand. Instead they read it
//! through an [`Access`] descriptor that maps a logical `(row, col)` pair to a physical
//! row-major offset. The layouts below derive, for every operation family, the shapes
//! each operand must have and the descriptors to read them with. The CPU loops call
//! [`Access::offset`] and the kernel synthesizer renders the same descriptors as index
//! expressions, so both targets share a single definition.
//!
//! For a binary elementwise operation over `A` (`h x w`) and `X`:
//!
//! | Mode     | X shape | Result shape | A read as | X read as |
//! |----------|---------|--------------|-----------|-----------|
//! | `None`   | `h x w` | `h x w`      | `A(i,j)`  | `X(i,j)`  |
//! | `First`  | `w x h` | `w x h`      | `A(j,i)`  | `X(i,j)`  |
//! | `Second` | `w x h` | `h x w`      | `A(i,j)`  | `X(j,i)`  |
//! | `Both`   | `h x w` | `w x h`      | `A(j,i)`  | `X(j,i)`  |

use crate::shape::Shape;

/// Which operands of an operation are read through their transpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransposeMode {
    /// Read every operand as stored.
    #[default]
    None,
    /// Read the first operand transposed.
    First,
    /// Read the second operand transposed.
    Second,
    /// Read both operands transposed.
    Both,
}

impl TransposeMode {
    /// All modes, in declaration order.
    pub const ALL: [TransposeMode; 4] = [Self::None, Self::First, Self::Second, Self::Both];

    /// Returns true if the first operand is read transposed.
    #[inline]
    pub fn first_transposed(self) -> bool {
        matches!(self, Self::First | Self::Both)
    }

    /// Returns true if the second operand is read transposed.
    #[inline]
    pub fn second_transposed(self) -> bool {
        matches!(self, Self::Second | Self::Both)
    }
}

/// Which axis a reduction collapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceAxis {
    /// Collapse everything into a single `1 x 1` value.
    Full,
    /// One value per row, result `h x 1`.
    Rows,
    /// One value per column, result `1 x w`.
    Columns,
}

/// Element order used by `ravel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RavelOrder {
    /// Flatten into a single row, `1 x N`.
    #[default]
    Row,
    /// Flatten into a single column, `N x 1`.
    Column,
}

/// Maps a logical `(i, j)` of an operand to its physical row-major offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// Whether the operand is read through its transpose.
    pub transposed: bool,
    /// Physical width of the stored operand.
    pub width: usize,
}

impl Access {
    /// Reads an operand of `shape` as stored.
    pub fn direct(shape: Shape) -> Self {
        Self {
            transposed: false,
            width: shape.w,
        }
    }

    /// Reads an operand of `shape`, transposed if `transposed` is set.
    pub fn new(shape: Shape, transposed: bool) -> Self {
        Self {
            transposed,
            width: shape.w,
        }
    }

    /// Returns the physical offset of logical element `(i, j)`.
    #[inline(always)]
    pub fn offset(&self, i: usize, j: usize) -> usize {
        if self.transposed {
            j * self.width + i
        } else {
            i * self.width + j
        }
    }
}

fn logical(shape: Shape, transposed: bool) -> Shape {
    if transposed {
        shape.transposed()
    } else {
        shape
    }
}

/// Shapes and accesses for a binary elementwise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementwiseLayout {
    /// Required shape of the second operand.
    pub second: Shape,
    /// Required shape of the result.
    pub result: Shape,
    /// How to read the first operand at result position `(i, j)`.
    pub a: Access,
    /// How to read the second operand at result position `(i, j)`.
    pub x: Access,
}

impl ElementwiseLayout {
    /// Derives the layout for a first operand of shape `a` under `mode`.
    pub fn new(a: Shape, mode: TransposeMode) -> Self {
        let result = logical(a, mode.first_transposed());
        let second = logical(result, mode.second_transposed());
        Self {
            second,
            result,
            a: Access::new(a, mode.first_transposed()),
            x: Access::new(second, mode.second_transposed()),
        }
    }
}

/// Shapes and access for a single-operand operation.
///
/// A unary operation only has a first operand, so `Second` reads it as stored and
/// `Both` reads it transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnaryLayout {
    /// Required shape of the result.
    pub result: Shape,
    /// How to read the operand at result position `(i, j)`.
    pub a: Access,
}

impl UnaryLayout {
    /// Derives the layout for an operand of shape `a` under `mode`.
    pub fn new(a: Shape, mode: TransposeMode) -> Self {
        Self {
            result: logical(a, mode.first_transposed()),
            a: Access::new(a, mode.first_transposed()),
        }
    }
}

/// Shapes and accesses for a matrix product `A' * X'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductLayout {
    /// Required shape of the second operand.
    pub second: Shape,
    /// Required shape of the result.
    pub result: Shape,
    /// Length of the contracted dimension.
    pub inner: usize,
    /// How to read `A'(i, k)`.
    pub a: Access,
    /// How to read `X'(k, j)`.
    pub x: Access,
}

impl ProductLayout {
    /// Derives the layout for operands of shapes `a` and `x` under `mode`.
    ///
    /// Only the contracted dimension of `x` is constrained, so the returned `second`
    /// shape keeps the free dimension of `x` as supplied.
    pub fn new(a: Shape, x: Shape, mode: TransposeMode) -> Self {
        let a_logical = logical(a, mode.first_transposed());
        let inner = a_logical.w;
        let second = if mode.second_transposed() {
            Shape::new(x.h, inner)
        } else {
            Shape::new(inner, x.w)
        };
        let x_logical = logical(second, mode.second_transposed());
        Self {
            second,
            result: Shape::new(a_logical.h, x_logical.w),
            inner,
            a: Access::new(a, mode.first_transposed()),
            x: Access::new(second, mode.second_transposed()),
        }
    }
}

/// Shapes and access for a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionLayout {
    /// Logical shape of the reduced operand.
    pub source: Shape,
    /// Required shape of the result.
    pub result: Shape,
    /// How to read the operand at logical position `(i, j)`.
    pub a: Access,
}

impl ReductionLayout {
    /// Derives the layout for an operand of shape `a` reduced along `axis` under `mode`.
    pub fn new(a: Shape, axis: ReduceAxis, mode: TransposeMode) -> Self {
        let source = logical(a, mode.first_transposed());
        let result = match axis {
            ReduceAxis::Full => Shape::new(1, 1),
            ReduceAxis::Rows => Shape::new(source.h, 1),
            ReduceAxis::Columns => Shape::new(1, source.w),
        };
        Self {
            source,
            result,
            a: Access::new(a, mode.first_transposed()),
        }
    }
}
