use std::ops::{Index, IndexMut, Mul};

use num_traits::Zero;

use crate::{
    error::MatrixError,
    ops,
    parallel::ExecutionStrategy,
    shape::{require_addressable, require_total_size, Shape},
    store::{ElementStore, StoreKey},
    transpose::{RavelOrder, ReduceAxis, TransposeMode},
};

/// A dense row-major matrix.
///
/// The matrix owns its elements unless it was built over external memory, in which case
/// it is a view and never frees that memory. Rows are reachable with `m[i]`, so
/// `m[i][j]` reads or writes a single element.
///
/// # Examples
///
/// ```
/// use dualmat_core::{Matrix, TransposeMode};
///
/// let a = Matrix::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
/// let mut t = Matrix::new(3, 2);
/// a.map(&mut t, TransposeMode::First, |v| *v).unwrap();
///
/// assert_eq!(t.as_slice(), &[1, 4, 2, 5, 3, 6]);
/// assert_eq!(t[2][1], 6);
/// ```
pub struct Matrix<T> {
    h: usize,
    w: usize,
    total_size: usize,
    store: ElementStore<T>,
}

impl<T> Matrix<T> {
    /// Creates an empty `0 x 0` matrix.
    pub fn empty() -> Self {
        Self {
            h: 0,
            w: 0,
            total_size: 0,
            store: ElementStore::empty(),
        }
    }

    /// Creates an `h x w` matrix filled with `T::default()`.
    ///
    /// # Panics
    ///
    /// Panics if `h * w` overflows `usize`.
    pub fn new(h: usize, w: usize) -> Self
    where
        T: Default + Clone,
    {
        let n = element_count(h, w);
        Self::from_store(h, w, ElementStore::from_vec(vec![T::default(); n]))
    }

    /// Creates an `h x w` matrix filled with zeros.
    ///
    /// # Panics
    ///
    /// Panics if `h * w` overflows `usize`.
    pub fn zeros(h: usize, w: usize) -> Self
    where
        T: Zero + Clone,
    {
        let n = element_count(h, w);
        Self::from_store(h, w, ElementStore::from_vec(vec![T::zero(); n]))
    }

    /// Creates an `h x w` matrix taking ownership of row-major `data`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::SizeMismatch`] if `data.len() != h * w` or the product
    /// overflows.
    pub fn from_vec(h: usize, w: usize, data: Vec<T>) -> Result<Self, MatrixError> {
        let n = require_addressable(h, w, data.len(), "from_vec")?;
        if data.len() != n {
            return Err(MatrixError::size_mismatch("from_vec", n, data.len()));
        }
        Ok(Self::from_store(h, w, ElementStore::from_vec(data)))
    }

    /// Creates an `h x w` matrix by evaluating `f(i, j)` for every element.
    ///
    /// # Panics
    ///
    /// Panics if `h * w` overflows `usize`.
    pub fn from_fn<F>(h: usize, w: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> T,
    {
        let data = (0..element_count(h, w)).map(|idx| f(idx / w, idx % w)).collect();
        Self::from_store(h, w, ElementStore::from_vec(data))
    }

    /// Creates an `h x w` view over `len` elements of external memory.
    ///
    /// The matrix never reallocates or frees the memory, and dropping it leaves the
    /// memory untouched.
    ///
    /// # Safety
    ///
    /// The caller must ensure that `ptr` is valid for reads and writes of `len` elements,
    /// and that the memory outlives the matrix and is not accessed through another path
    /// while the matrix is in use.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::SizeMismatch`] if `len != h * w` or the product overflows.
    pub unsafe fn from_raw_parts(
        h: usize,
        w: usize,
        ptr: *mut T,
        len: usize,
    ) -> Result<Self, MatrixError> {
        let n = require_addressable(h, w, len, "view")?;
        if len != n {
            return Err(MatrixError::size_mismatch("view", n, len));
        }
        let store = ElementStore::from_raw_parts(ptr, len)?;
        Ok(Self::from_store(h, w, store))
    }

    /// Rebinds this matrix to the elements of `other` without copying.
    ///
    /// The shape of `self` is kept, only the element counts have to agree.
    ///
    /// # Safety
    ///
    /// `other` must outlive every use of `self` and must not be resized or accessed
    /// through another path while `self` is in use.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::SizeMismatch`] if the element counts differ.
    pub unsafe fn view(&mut self, other: &mut Matrix<T>) -> Result<(), MatrixError> {
        require_total_size(other, self.total_size, "view")?;
        self.store.view(&mut other.store)
    }

    fn from_store(h: usize, w: usize, store: ElementStore<T>) -> Self {
        Self {
            h,
            w,
            total_size: h * w,
            store,
        }
    }

    /// Returns the number of rows.
    #[inline]
    pub fn h(&self) -> usize {
        self.h
    }

    /// Returns the number of columns.
    #[inline]
    pub fn w(&self) -> usize {
        self.w
    }

    /// Returns the number of elements, always `h * w`.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Returns the shape of the matrix.
    #[inline]
    pub fn shape(&self) -> Shape {
        Shape::new(self.h, self.w)
    }

    /// Returns true if the matrix aliases memory it does not own.
    #[inline]
    pub fn is_view(&self) -> bool {
        self.store.is_view()
    }

    /// Returns the key identifying the element store on a device.
    #[inline]
    pub fn store_key(&self) -> StoreKey {
        self.store.key()
    }

    /// Returns the elements in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.store.as_slice()
    }

    /// Returns the elements in row-major order, mutably.
    #[inline]
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        self.store.as_mut_slice()
    }

    /// Returns a pointer to the first element.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.store.as_ptr()
    }

    /// Returns a mutable pointer to the first element.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.store.as_mut_ptr()
    }

    /// Returns a reference to element `(i, j)`, or `None` when out of bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<&T> {
        if i < self.h && j < self.w {
            self.as_slice().get(i * self.w + j)
        } else {
            None
        }
    }

    /// Returns a mutable reference to element `(i, j)`, or `None` when out of bounds.
    pub fn get_mut(&mut self, i: usize, j: usize) -> Option<&mut T> {
        if i < self.h && j < self.w {
            let w = self.w;
            self.as_slice_mut().get_mut(i * w + j)
        } else {
            None
        }
    }

    /// Changes the shape to `h x w` without touching the elements.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::SizeMismatch`] if `h * w` differs from the element count
    /// or overflows.
    pub fn reshape(&mut self, h: usize, w: usize) -> Result<(), MatrixError> {
        let n = require_addressable(h, w, self.total_size, "reshape")?;
        require_total_size(self, n, "reshape")?;
        self.h = h;
        self.w = w;
        self.total_size = n;
        Ok(())
    }

    /// Flattens the shape into a single row or column.
    pub fn ravel(&mut self, order: RavelOrder) {
        let n = self.total_size;
        (self.h, self.w) = match order {
            RavelOrder::Row => (1, n),
            RavelOrder::Column => (n, 1),
        };
    }

    /// Moves the elements out, leaving `self` as an empty `0 x 0` matrix.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Returns true if `other` has the same shape and elements.
    pub fn equals(&self, other: &Matrix<T>) -> bool
    where
        T: PartialEq,
    {
        self.shape() == other.shape() && self.as_slice() == other.as_slice()
    }
}

/// CPU operations.
///
/// Every method validates all shapes before writing and runs with the default
/// [`ExecutionStrategy`]. The free functions in [`crate::ops`] take an explicit strategy.
impl<T: Send + Sync> Matrix<T> {
    /// Sets every element to `f(i, j)`.
    pub fn generate<F>(&mut self, f: F) -> Result<(), MatrixError>
    where
        F: Fn(usize, usize) -> T + Send + Sync,
    {
        ops::generate(self, ExecutionStrategy::default(), f)
    }

    /// Sets every element to `f(i, j, current)`.
    pub fn update<F>(&mut self, f: F) -> Result<(), MatrixError>
    where
        F: Fn(usize, usize, &T) -> T + Send + Sync,
    {
        ops::update(self, ExecutionStrategy::default(), f)
    }

    /// Sets every element to `value`.
    pub fn full(&mut self, value: T) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::full(self, value, ExecutionStrategy::default())
    }

    /// Copies the elements of `src`, which must have the same shape.
    pub fn cpy(&mut self, src: &Matrix<T>) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::cpy(src, self, ExecutionStrategy::default())
    }

    /// Writes `f(v)` for every element into `dst`, reading `self` per `mode`.
    pub fn map<U, F>(&self, dst: &mut Matrix<U>, mode: TransposeMode, f: F) -> Result<(), MatrixError>
    where
        U: Send + Sync,
        F: Fn(&T) -> U + Send + Sync,
    {
        ops::map(self, dst, mode, ExecutionStrategy::default(), f)
    }

    /// Writes `f(a, x)` for every pair of elements of `self` and `other` into `dst`.
    pub fn transform<U, F>(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<U>,
        mode: TransposeMode,
        f: F,
    ) -> Result<(), MatrixError>
    where
        U: Send + Sync,
        F: Fn(&T, &T) -> U + Send + Sync,
    {
        ops::transform(self, other, dst, mode, ExecutionStrategy::default(), f)
    }

    /// Writes the element-wise product of `self` and `other` into `dst`.
    pub fn hadamard(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
    ) -> Result<(), MatrixError>
    where
        T: Clone + Mul<Output = T>,
    {
        ops::hadamard(self, other, dst, mode, ExecutionStrategy::default())
    }

    /// Writes the transpose of `self` into `dst`.
    pub fn transpose(&self, dst: &mut Matrix<T>) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::transpose(self, dst, ExecutionStrategy::default())
    }

    /// Sums `self` along `axis` into `dst`.
    pub fn reduce(
        &self,
        dst: &mut Matrix<T>,
        axis: ReduceAxis,
        mode: TransposeMode,
    ) -> Result<(), MatrixError>
    where
        T: Zero + Clone,
    {
        ops::reduce(self, dst, axis, mode, ExecutionStrategy::default())
    }

    /// Returns the sum of all elements.
    pub fn sum(&self) -> Result<T, MatrixError>
    where
        T: Zero + Clone,
    {
        ops::sum(self, ExecutionStrategy::default())
    }

    /// Returns the sum of `f(v)` over all elements.
    pub fn map_reduce<U, F>(&self, f: F) -> Result<U, MatrixError>
    where
        U: Zero + Send,
        F: Fn(&T) -> U + Send + Sync,
    {
        ops::map_reduce(self, ExecutionStrategy::default(), f)
    }

    /// Writes the matrix product `self' * other'` into `dst`.
    pub fn mul(
        &self,
        other: &Matrix<T>,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
    ) -> Result<(), MatrixError>
    where
        T: Zero + Clone + Mul<Output = T>,
    {
        ops::mul(self, other, dst, mode, ExecutionStrategy::default())
    }

    /// Writes `self * scalar` into `dst`.
    pub fn mul_scalar(
        &self,
        scalar: T,
        dst: &mut Matrix<T>,
        mode: TransposeMode,
    ) -> Result<(), MatrixError>
    where
        T: Clone + Mul<Output = T>,
    {
        ops::mul_scalar(self, scalar, dst, mode, ExecutionStrategy::default())
    }

    /// Writes `[left | right]` into `self`.
    pub fn hstack(&mut self, left: &Matrix<T>, right: &Matrix<T>) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::hstack(left, right, self, ExecutionStrategy::default())
    }

    /// Writes `top` above `bottom` into `self`.
    pub fn vstack(&mut self, top: &Matrix<T>, bottom: &Matrix<T>) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::vstack(top, bottom, self, ExecutionStrategy::default())
    }

    /// Writes every matrix of `parts` side by side into `self`.
    pub fn hstack_all(&mut self, parts: &[&Matrix<T>]) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::hstack_all(parts, self, ExecutionStrategy::default())
    }

    /// Writes every matrix of `parts` on top of each other into `self`.
    pub fn vstack_all(&mut self, parts: &[&Matrix<T>]) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::vstack_all(parts, self, ExecutionStrategy::default())
    }

    /// Splits `self` column-wise into the pre-shaped `left` and `right`.
    pub fn hsplit(&self, left: &mut Matrix<T>, right: &mut Matrix<T>) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::hsplit(self, left, right, ExecutionStrategy::default())
    }

    /// Splits `self` row-wise into the pre-shaped `top` and `bottom`.
    pub fn vsplit(&self, top: &mut Matrix<T>, bottom: &mut Matrix<T>) -> Result<(), MatrixError>
    where
        T: Clone,
    {
        ops::vsplit(self, top, bottom, ExecutionStrategy::default())
    }
}

fn element_count(h: usize, w: usize) -> usize {
    match h.checked_mul(w) {
        Some(n) => n,
        None => panic!("matrix shape {h}x{w} overflows usize"),
    }
}

impl<T> Default for Matrix<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Clone> Clone for Matrix<T> {
    fn clone(&self) -> Self {
        Self::from_store(self.h, self.w, self.store.clone())
    }
}

impl<T: PartialEq> PartialEq for Matrix<T> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Matrix<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matrix")
            .field("h", &self.h)
            .field("w", &self.w)
            .field("is_view", &self.is_view())
            .field("data", &self.as_slice())
            .finish()
    }
}

impl<T> Index<usize> for Matrix<T> {
    type Output = [T];

    /// Returns row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= h`.
    fn index(&self, i: usize) -> &Self::Output {
        assert!(i < self.h, "row {i} out of bounds for {} rows", self.h);
        let w = self.w;
        &self.as_slice()[i * w..(i + 1) * w]
    }
}

impl<T> IndexMut<usize> for Matrix<T> {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        assert!(i < self.h, "row {i} out of bounds for {} rows", self.h);
        let w = self.w;
        &mut self.as_slice_mut()[i * w..(i + 1) * w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() -> Result<(), MatrixError> {
        let m = Matrix::<f32>::new(2, 3);
        assert_eq!(m.shape(), Shape::new(2, 3));
        assert_eq!(m.total_size(), 6);
        assert!(!m.is_view());
        assert!(m.as_slice().iter().all(|v| *v == 0.0));

        let e = Matrix::<u8>::empty();
        assert_eq!((e.h(), e.w(), e.total_size()), (0, 0, 0));

        let f = Matrix::from_fn(2, 2, |i, j| i * 2 + j);
        assert_eq!(f.as_slice(), &[0, 1, 2, 3]);

        assert_eq!(
            Matrix::from_vec(2, 2, vec![1, 2, 3]).unwrap_err(),
            MatrixError::size_mismatch("from_vec", 4, 3)
        );
        Ok(())
    }

    #[test]
    fn test_row_indexing() -> Result<(), MatrixError> {
        let mut m = Matrix::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6])?;
        assert_eq!(&m[1], &[4, 5, 6]);
        m[0][2] = 30;
        assert_eq!(m.get(0, 2), Some(&30));
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.get(0, 3), None);
        Ok(())
    }

    #[test]
    #[should_panic]
    fn test_row_index_out_of_bounds() {
        let m = Matrix::<i32>::new(2, 2);
        let _ = &m[2];
    }

    #[test]
    fn test_reshape_and_ravel() -> Result<(), MatrixError> {
        let mut m = Matrix::from_vec(2, 3, vec![1, 2, 3, 4, 5, 6])?;
        m.reshape(3, 2)?;
        assert_eq!(m.shape(), Shape::new(3, 2));
        assert_eq!(&m[2], &[5, 6]);

        assert_eq!(
            m.reshape(4, 2),
            Err(MatrixError::size_mismatch("reshape", 8, 6))
        );
        assert_eq!(m.shape(), Shape::new(3, 2));

        m.ravel(RavelOrder::Column);
        assert_eq!(m.shape(), Shape::new(6, 1));
        m.ravel(RavelOrder::Row);
        assert_eq!(m.shape(), Shape::new(1, 6));
        assert_eq!(m.total_size(), 6);
        Ok(())
    }

    #[test]
    fn test_overflowing_shape_is_rejected() {
        let huge = 1 << (usize::BITS - 1);
        assert_eq!(
            Matrix::<i32>::from_vec(huge, 2, vec![]).unwrap_err(),
            MatrixError::size_mismatch("from_vec", usize::MAX, 0)
        );

        let mut m = Matrix::<i32>::empty();
        assert_eq!(
            m.reshape(huge, 2),
            Err(MatrixError::size_mismatch("reshape", usize::MAX, 0))
        );
        assert_eq!(m.shape(), Shape::new(0, 0));

        let mut data = [1, 2];
        let res = unsafe { Matrix::from_raw_parts(huge, 4, data.as_mut_ptr(), 2) };
        assert!(matches!(res, Err(MatrixError::SizeMismatch { operation: "view", .. })));
    }

    #[test]
    #[should_panic(expected = "overflows usize")]
    fn test_new_panics_on_overflowing_shape() {
        let _ = Matrix::<u8>::new(usize::MAX, 2);
    }

    #[test]
    fn test_clone_is_independent() -> Result<(), MatrixError> {
        let a = Matrix::from_vec(1, 2, vec![1, 2])?;
        let mut b = a.clone();
        b[0][0] = 9;
        assert_eq!(a.as_slice(), &[1, 2]);
        assert_ne!(a.store_key(), b.store_key());
        assert!(!a.equals(&b));
        Ok(())
    }

    #[test]
    fn test_take_resets_source() -> Result<(), MatrixError> {
        let mut a = Matrix::from_vec(2, 1, vec![1, 2])?;
        let b = a.take();
        assert_eq!(b.as_slice(), &[1, 2]);
        assert_eq!(a.shape(), Shape::new(0, 0));
        assert!(a.as_slice().is_empty());
        Ok(())
    }

    #[test]
    fn test_view_over_matrix() -> Result<(), MatrixError> {
        let mut owner = Matrix::from_vec(2, 2, vec![1, 2, 3, 4])?;
        let mut viewer = Matrix::<i32>::new(1, 4);
        unsafe { viewer.view(&mut owner)? };
        assert!(viewer.is_view());
        assert_eq!(viewer.shape(), Shape::new(1, 4));
        viewer[0][3] = 40;
        assert_eq!(owner[1][1], 40);

        let mut small = Matrix::<i32>::new(1, 3);
        assert!(unsafe { small.view(&mut owner) }.is_err());
        Ok(())
    }

    #[test]
    fn test_equality() -> Result<(), MatrixError> {
        let a = Matrix::from_vec(2, 2, vec![1, 2, 3, 4])?;
        let b = Matrix::from_vec(2, 2, vec![1, 2, 3, 4])?;
        let c = Matrix::from_vec(1, 4, vec![1, 2, 3, 4])?;
        assert_eq!(a, b);
        assert!(!a.equals(&c));
        Ok(())
    }
}
