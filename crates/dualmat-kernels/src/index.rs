use std::fmt;

use dualmat_core::Access;

/// A loop or work-item variable of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// The row of the element being produced, `i`.
    Row,
    /// The column of the element being produced, `j`.
    Col,
    /// The contraction index of a product, `k`.
    Inner,
}

impl Var {
    /// Returns the variable name used in kernel source.
    pub fn name(self) -> &'static str {
        match self {
            Var::Row => "i",
            Var::Col => "j",
            Var::Inner => "k",
        }
    }
}

/// Values bound to the kernel variables when evaluating an [`IndexExpr`] on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bindings {
    /// Value of `i`.
    pub i: usize,
    /// Value of `j`.
    pub j: usize,
    /// Value of `k`.
    pub k: usize,
}

/// An integer index expression over the kernel variables.
///
/// The same tree renders to OpenCL C and evaluates on the host, which lets the tests
/// compare kernel indexing with [`Access::offset`] without parsing any text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexExpr {
    /// A kernel variable.
    Var(Var),
    /// A constant.
    Lit(usize),
    /// Sum of two expressions.
    Add(Box<IndexExpr>, Box<IndexExpr>),
    /// Product of two expressions.
    Mul(Box<IndexExpr>, Box<IndexExpr>),
}

impl IndexExpr {
    /// The row variable `i`.
    pub fn row() -> Self {
        Self::Var(Var::Row)
    }

    /// The column variable `j`.
    pub fn col() -> Self {
        Self::Var(Var::Col)
    }

    /// The contraction variable `k`.
    pub fn inner() -> Self {
        Self::Var(Var::Inner)
    }

    /// Returns `self + rhs`, folding constant zeros.
    pub fn plus(self, rhs: IndexExpr) -> Self {
        match (self, rhs) {
            (Self::Lit(0), e) | (e, Self::Lit(0)) => e,
            (Self::Lit(a), Self::Lit(b)) => Self::Lit(a + b),
            (a, b) => Self::Add(Box::new(a), Box::new(b)),
        }
    }

    /// Returns `self * rhs`, folding constant zeros and ones.
    pub fn times(self, rhs: IndexExpr) -> Self {
        match (self, rhs) {
            (Self::Lit(0), _) | (_, Self::Lit(0)) => Self::Lit(0),
            (Self::Lit(1), e) | (e, Self::Lit(1)) => e,
            (Self::Lit(a), Self::Lit(b)) => Self::Lit(a * b),
            (a, b) => Self::Mul(Box::new(a), Box::new(b)),
        }
    }

    /// Returns the row-major offset `row * width + col`.
    pub fn row_major(row: IndexExpr, col: IndexExpr, width: usize) -> Self {
        row.times(Self::Lit(width)).plus(col)
    }

    /// Renders `access` at logical position `(row, col)`.
    ///
    /// Matches [`Access::offset`] for every binding of the variables.
    pub fn access(access: &Access, row: IndexExpr, col: IndexExpr) -> Self {
        if access.transposed {
            Self::row_major(col, row, access.width)
        } else {
            Self::row_major(row, col, access.width)
        }
    }

    /// Evaluates the expression with the given variable values.
    pub fn eval(&self, b: &Bindings) -> usize {
        match self {
            Self::Var(Var::Row) => b.i,
            Self::Var(Var::Col) => b.j,
            Self::Var(Var::Inner) => b.k,
            Self::Lit(v) => *v,
            Self::Add(l, r) => l.eval(b) + r.eval(b),
            Self::Mul(l, r) => l.eval(b) * r.eval(b),
        }
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(v) => write!(f, "{}", v.name()),
            Self::Lit(v) => write!(f, "{v}"),
            Self::Add(l, r) => write!(f, "({l} + {r})"),
            Self::Mul(l, r) => write!(f, "{l} * {r}"),
        }
    }
}
