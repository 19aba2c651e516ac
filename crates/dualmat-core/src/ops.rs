//! CPU execution strategies.
//!
//! Every function validates all operand shapes first and only then writes into the
//! destination, so a failed call leaves the destination untouched. The work is split
//! across rows or elements according to the given [`ExecutionStrategy`]; reductions and
//! products accumulate into per-row values and never share counters between tasks.

use std::ops::Mul;

use num_traits::Zero;

use crate::{
    error::MatrixError,
    matrix::Matrix,
    parallel::{collect_indexed, for_each_element, for_each_row, ExecutionStrategy},
    shape::{require_height_equals, require_input, require_result, require_width_equals, Shape},
    transpose::{
        ElementwiseLayout, ProductLayout, ReduceAxis, ReductionLayout, TransposeMode,
        UnaryLayout,
    },
};

/// Sets every element of `dst` to `f(i, j)`.
pub fn generate<T, F>(dst: &mut Matrix<T>, strategy: ExecutionStrategy, f: F) -> Result<(), MatrixError>
where
    T: Send,
    F: Fn(usize, usize) -> T + Send + Sync,
{
    let w = dst.w();
    for_each_element(strategy, dst.as_slice_mut(), w, |i, j, v| *v = f(i, j))?;
    Ok(())
}

/// Sets every element of `dst` to `f(i, j, current)`.
pub fn update<T, F>(dst: &mut Matrix<T>, strategy: ExecutionStrategy, f: F) -> Result<(), MatrixError>
where
    T: Send,
    F: Fn(usize, usize, &T) -> T + Send + Sync,
{
    let w = dst.w();
    for_each_element(strategy, dst.as_slice_mut(), w, |i, j, v| *v = f(i, j, v))?;
    Ok(())
}

/// Sets every element of `dst` to `value`.
pub fn full<T>(dst: &mut Matrix<T>, value: T, strategy: ExecutionStrategy) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    let w = dst.w();
    for_each_row(strategy, dst.as_slice_mut(), w, |_, row| row.fill(value.clone()))?;
    Ok(())
}

/// Copies `src` into `dst`, which must have the same shape.
pub fn cpy<T>(src: &Matrix<T>, dst: &mut Matrix<T>, strategy: ExecutionStrategy) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    require_input(src, dst.shape(), "cpy")?;
    let w = dst.w();
    for_each_row(strategy, dst.as_slice_mut(), w, |i, row| {
        row.clone_from_slice(&src[i]);
    })?;
    Ok(())
}

/// Writes `f(v)` for every element of `src` into `dst`.
///
/// With `First` or `Both`, `src` is read transposed and `dst` must be `w x h`.
///
/// # Arguments
///
/// * `src` - The matrix to read.
/// * `dst` - The matrix to write, shaped per `mode`.
/// * `mode` - Whether `src` is read transposed.
/// * `strategy` - The execution strategy.
/// * `f` - The function applied to each element.
pub fn map<T, U, F>(
    src: &Matrix<T>,
    dst: &mut Matrix<U>,
    mode: TransposeMode,
    strategy: ExecutionStrategy,
    f: F,
) -> Result<(), MatrixError>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Send + Sync,
{
    let layout = UnaryLayout::new(src.shape(), mode);
    require_result(dst, layout.result, "map")?;

    let a = src.as_slice();
    let w = dst.w();
    for_each_element(strategy, dst.as_slice_mut(), w, |i, j, v| {
        *v = f(&a[layout.a.offset(i, j)]);
    })?;
    Ok(())
}

/// Writes `f(a, x)` for every pair of elements of `src1` and `src2` into `dst`.
///
/// See [`crate::transpose`] for the shapes each mode requires.
pub fn transform<T, U, F>(
    src1: &Matrix<T>,
    src2: &Matrix<T>,
    dst: &mut Matrix<U>,
    mode: TransposeMode,
    strategy: ExecutionStrategy,
    f: F,
) -> Result<(), MatrixError>
where
    T: Sync,
    U: Send,
    F: Fn(&T, &T) -> U + Send + Sync,
{
    let layout = ElementwiseLayout::new(src1.shape(), mode);
    require_input(src2, layout.second, "transform")?;
    require_result(dst, layout.result, "transform")?;

    let a = src1.as_slice();
    let x = src2.as_slice();
    let w = dst.w();
    for_each_element(strategy, dst.as_slice_mut(), w, |i, j, v| {
        *v = f(&a[layout.a.offset(i, j)], &x[layout.x.offset(i, j)]);
    })?;
    Ok(())
}

/// Writes the element-wise product of `src1` and `src2` into `dst`.
pub fn hadamard<T>(
    src1: &Matrix<T>,
    src2: &Matrix<T>,
    dst: &mut Matrix<T>,
    mode: TransposeMode,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Mul<Output = T> + Send + Sync,
{
    transform(src1, src2, dst, mode, strategy, |a, x| a.clone() * x.clone())
}

/// Writes the transpose of `src` into `dst`, which must be `w x h`.
pub fn transpose<T>(src: &Matrix<T>, dst: &mut Matrix<T>, strategy: ExecutionStrategy) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    map(src, dst, TransposeMode::First, strategy, |v| v.clone())
}

/// Writes `src * scalar` into `dst`.
pub fn mul_scalar<T>(
    src: &Matrix<T>,
    scalar: T,
    dst: &mut Matrix<T>,
    mode: TransposeMode,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Mul<Output = T> + Send + Sync,
{
    map(src, dst, mode, strategy, |v| v.clone() * scalar.clone())
}

/// Sums `src` along `axis` into `dst`.
///
/// `Rows` writes one value per row of the (possibly transposed) source into an `h x 1`
/// result, `Columns` one value per column into `1 x w`, and `Full` the total into
/// `1 x 1`. The full sum adds the per-row partial sums in row order, so the result does
/// not depend on the strategy.
///
/// Sums use the element type's `+`. Integer overflow therefore panics in debug builds
/// and wraps in release builds, while device kernels always wrap.
/// Elements of [`std::num::Wrapping`] wrap on the CPU as well.
pub fn reduce<T>(
    src: &Matrix<T>,
    dst: &mut Matrix<T>,
    axis: ReduceAxis,
    mode: TransposeMode,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Zero + Clone + Send + Sync,
{
    let layout = ReductionLayout::new(src.shape(), axis, mode);
    require_result(dst, layout.result, "reduce")?;

    let a = src.as_slice();
    let access = layout.a;
    let Shape { h: rows, w: cols } = layout.source;

    let row_sum = |i: usize| {
        (0..cols).fold(T::zero(), |acc, j| acc + a[access.offset(i, j)].clone())
    };
    let col_sum = |j: usize| {
        (0..rows).fold(T::zero(), |acc, i| acc + a[access.offset(i, j)].clone())
    };

    match axis {
        ReduceAxis::Rows => {
            for_each_row(strategy, dst.as_slice_mut(), 1, |i, out| out[0] = row_sum(i))?;
        }
        ReduceAxis::Columns => {
            for_each_element(strategy, dst.as_slice_mut(), cols, |_, j, out| *out = col_sum(j))?;
        }
        ReduceAxis::Full => {
            let partials = collect_indexed(strategy, rows, row_sum)?;
            let total = partials.into_iter().fold(T::zero(), |acc, v| acc + v);
            dst.as_slice_mut()[0] = total;
        }
    }
    Ok(())
}

/// Returns the sum of every element of `src`.
pub fn sum<T>(src: &Matrix<T>, strategy: ExecutionStrategy) -> Result<T, MatrixError>
where
    T: Zero + Clone + Send + Sync,
{
    map_reduce(src, strategy, |v| v.clone())
}

/// Returns the sum of `f(v)` over every element of `src`, folded in row order.
pub fn map_reduce<T, U, F>(src: &Matrix<T>, strategy: ExecutionStrategy, f: F) -> Result<U, MatrixError>
where
    T: Sync,
    U: Zero + Send,
    F: Fn(&T) -> U + Send + Sync,
{
    if src.w() == 0 {
        return Ok(U::zero());
    }
    let partials = collect_indexed(strategy, src.h(), |i| {
        src[i].iter().fold(U::zero(), |acc, v| acc + f(v))
    })?;
    Ok(partials.into_iter().fold(U::zero(), |acc, v| acc + v))
}

/// Writes the matrix product `src1' * src2'` into `dst`.
///
/// The primes denote the operands read per `mode`:
///
/// | Mode     | Requirement       | Result          |
/// |----------|-------------------|-----------------|
/// | `None`   | `src2.h == src1.w` | `src1.h x src2.w` |
/// | `First`  | `src2.h == src1.h` | `src1.w x src2.w` |
/// | `Second` | `src2.w == src1.w` | `src1.h x src2.h` |
/// | `Both`   | `src2.w == src1.h` | `src1.w x src2.h` |
///
/// Each result row is zeroed and accumulated in `(k, j)` order by a single task.
///
/// Accumulation uses the element type's `+` and `*`. Integer overflow therefore panics in
/// debug builds and wraps in release builds, while device kernels always wrap.
/// Elements of [`std::num::Wrapping`] wrap on the CPU as well.
pub fn mul<T>(
    src1: &Matrix<T>,
    src2: &Matrix<T>,
    dst: &mut Matrix<T>,
    mode: TransposeMode,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Zero + Clone + Mul<Output = T> + Send + Sync,
{
    let layout = ProductLayout::new(src1.shape(), src2.shape(), mode);
    require_input(src2, layout.second, "mul")?;
    require_result(dst, layout.result, "mul")?;

    let a = src1.as_slice();
    let x = src2.as_slice();
    let w = dst.w();
    for_each_row(strategy, dst.as_slice_mut(), w, |i, row| {
        row.fill(T::zero());
        for k in 0..layout.inner {
            let aik = a[layout.a.offset(i, k)].clone();
            for (j, out) in row.iter_mut().enumerate() {
                let acc = std::mem::replace(out, T::zero());
                *out = acc + aik.clone() * x[layout.x.offset(k, j)].clone();
            }
        }
    })?;
    Ok(())
}

/// Writes `[left | right]` into `dst`.
pub fn hstack<T>(
    left: &Matrix<T>,
    right: &Matrix<T>,
    dst: &mut Matrix<T>,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    hstack_all(&[left, right], dst, strategy).map_err(|e| rename(e, "hstack"))
}

/// Writes `top` above `bottom` into `dst`.
pub fn vstack<T>(
    top: &Matrix<T>,
    bottom: &Matrix<T>,
    dst: &mut Matrix<T>,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    vstack_all(&[top, bottom], dst, strategy).map_err(|e| rename(e, "vstack"))
}

fn rename(err: MatrixError, op_name: &'static str) -> MatrixError {
    match err {
        MatrixError::ShapeMismatch {
            role,
            expected,
            actual,
            ..
        } => MatrixError::shape_mismatch(op_name, role, expected, actual),
        other => other,
    }
}

/// Writes every matrix of `parts` side by side into `dst`.
///
/// All parts must share a height; `dst` must be that height times the summed widths.
pub fn hstack_all<T>(
    parts: &[&Matrix<T>],
    dst: &mut Matrix<T>,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    let h = parts.first().map_or(0, |p| p.h());
    let mut offsets = Vec::with_capacity(parts.len());
    let mut w = 0;
    for part in parts {
        require_height_equals(parts[0], part, "hstack_all")?;
        offsets.push(w);
        w += part.w();
    }
    require_result(dst, Shape::new(h, w), "hstack_all")?;

    for_each_row(strategy, dst.as_slice_mut(), w, |i, row| {
        for (part, &start) in parts.iter().zip(offsets.iter()) {
            row[start..start + part.w()].clone_from_slice(&part[i]);
        }
    })?;
    Ok(())
}

/// Writes every matrix of `parts` on top of each other into `dst`.
///
/// All parts must share a width; `dst` must be the summed heights times that width.
pub fn vstack_all<T>(
    parts: &[&Matrix<T>],
    dst: &mut Matrix<T>,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    let w = parts.first().map_or(0, |p| p.w());
    // (part, row within part) for every destination row
    let mut sources = Vec::new();
    for (p, part) in parts.iter().enumerate() {
        require_width_equals(parts[0], part, "vstack_all")?;
        sources.extend((0..part.h()).map(|r| (p, r)));
    }
    require_result(dst, Shape::new(sources.len(), w), "vstack_all")?;

    for_each_row(strategy, dst.as_slice_mut(), w, |i, row| {
        let (p, r) = sources[i];
        row.clone_from_slice(&parts[p][r]);
    })?;
    Ok(())
}

/// Copies the left columns of `src` into `left` and the remaining ones into `right`.
///
/// Both destinations are pre-shaped: they must share the height of `src` and their
/// widths must add up to `src.w`.
pub fn hsplit<T>(
    src: &Matrix<T>,
    left: &mut Matrix<T>,
    right: &mut Matrix<T>,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    let split = left.w().min(src.w());
    require_result(left, Shape::new(src.h(), split), "hsplit")?;
    require_result(right, Shape::new(src.h(), src.w() - split), "hsplit")?;

    let lw = left.w();
    for_each_row(strategy, left.as_slice_mut(), lw, |i, row| {
        row.clone_from_slice(&src[i][..split]);
    })?;
    let rw = right.w();
    for_each_row(strategy, right.as_slice_mut(), rw, |i, row| {
        row.clone_from_slice(&src[i][split..]);
    })?;
    Ok(())
}

/// Copies the top rows of `src` into `top` and the remaining ones into `bottom`.
///
/// Both destinations are pre-shaped: they must share the width of `src` and their
/// heights must add up to `src.h`.
pub fn vsplit<T>(
    src: &Matrix<T>,
    top: &mut Matrix<T>,
    bottom: &mut Matrix<T>,
    strategy: ExecutionStrategy,
) -> Result<(), MatrixError>
where
    T: Clone + Send + Sync,
{
    let split = top.h().min(src.h());
    require_result(top, Shape::new(split, src.w()), "vsplit")?;
    require_result(bottom, Shape::new(src.h() - split, src.w()), "vsplit")?;

    let w = src.w();
    for_each_row(strategy, top.as_slice_mut(), w, |i, row| {
        row.clone_from_slice(&src[i]);
    })?;
    for_each_row(strategy, bottom.as_slice_mut(), w, |i, row| {
        row.clone_from_slice(&src[split + i]);
    })?;
    Ok(())
}
