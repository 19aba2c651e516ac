//! Kernel synthesis per operation.
//!
//! Every function expects shapes that were already validated by the caller and derives
//! its index expressions from the layouts in [`dualmat_core::transpose`], the same ones
//! the CPU strategies use. The result buffer is always the last parameter and is named
//! `dst`.

use dualmat_core::{
    transpose::{ElementwiseLayout, ProductLayout, ReductionLayout, UnaryLayout},
    MatrixError, ReduceAxis, Shape, TransposeMode,
};

use crate::{
    dtype::DeviceElement,
    index::{IndexExpr, Var},
    template::{Grid, KernelSource, Param, Stmt},
};

fn zero<T: DeviceElement>() -> String {
    format!("(({})0)", T::DEVICE_TYPE)
}

fn begin<T: DeviceElement>(entry: &str, grid: Grid) -> KernelSource {
    let mut kernel = KernelSource::new(entry, grid);
    kernel.fp64 = T::NEEDS_FP64;
    kernel
}

fn declare_ret<T: DeviceElement>(kernel: &mut KernelSource) {
    kernel.preamble.push(Stmt::Declare {
        name: "ret",
        ty: T::DEVICE_TYPE,
        init: zero::<T>(),
    });
}

fn store_ret(kernel: &mut KernelSource, index: IndexExpr) {
    kernel.epilogue.push(Stmt::Store {
        buffer: "dst",
        index,
        value: "ret".to_string(),
    });
}

fn result_index(result: Shape) -> IndexExpr {
    IndexExpr::row_major(IndexExpr::row(), IndexExpr::col(), result.w)
}

/// `dst(i, j) = body`, where `body` reads `i` and `j` and writes `ret`.
pub fn generate<T: DeviceElement>(result: Shape, body: &str) -> KernelSource {
    let mut kernel = begin::<T>("dualmat_generate", Grid::Planar(result.h, result.w));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));
    declare_ret::<T>(&mut kernel);
    kernel.body = body.to_string();
    store_ret(&mut kernel, result_index(result));
    kernel
}

/// `dst(i, j) = value`.
pub fn full<T: DeviceElement>(result: Shape, value: T) -> KernelSource {
    let mut kernel = begin::<T>("dualmat_full", Grid::Planar(result.h, result.w));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));
    kernel.epilogue.push(Stmt::Store {
        buffer: "dst",
        index: result_index(result),
        value: value.literal(),
    });
    kernel
}

/// `dst = body(v)` with `v` read from `a` per `mode`.
pub fn map<T: DeviceElement>(a: Shape, mode: TransposeMode, body: &str) -> KernelSource {
    let layout = UnaryLayout::new(a, mode);
    let mut kernel = begin::<T>("dualmat_map", Grid::Planar(layout.result.h, layout.result.w));
    kernel.params.push(Param::input("a", T::DEVICE_TYPE));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));
    kernel.preamble.push(Stmt::Load {
        name: "v",
        ty: T::DEVICE_TYPE,
        buffer: "a",
        index: IndexExpr::access(&layout.a, IndexExpr::row(), IndexExpr::col()),
    });
    declare_ret::<T>(&mut kernel);
    kernel.body = body.to_string();
    store_ret(&mut kernel, result_index(layout.result));
    kernel
}

/// `dst = body(v1, v2)` with `v1` read from `a` and `v2` from `x` per `mode`.
pub fn transform<T: DeviceElement>(a: Shape, mode: TransposeMode, body: &str) -> KernelSource {
    let layout = ElementwiseLayout::new(a, mode);
    let grid = Grid::Planar(layout.result.h, layout.result.w);
    let mut kernel = begin::<T>("dualmat_transform", grid);
    kernel.params.push(Param::input("a", T::DEVICE_TYPE));
    kernel.params.push(Param::input("x", T::DEVICE_TYPE));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));
    kernel.preamble.push(Stmt::Load {
        name: "v1",
        ty: T::DEVICE_TYPE,
        buffer: "a",
        index: IndexExpr::access(&layout.a, IndexExpr::row(), IndexExpr::col()),
    });
    kernel.preamble.push(Stmt::Load {
        name: "v2",
        ty: T::DEVICE_TYPE,
        buffer: "x",
        index: IndexExpr::access(&layout.x, IndexExpr::row(), IndexExpr::col()),
    });
    declare_ret::<T>(&mut kernel);
    kernel.body = body.to_string();
    store_ret(&mut kernel, result_index(layout.result));
    kernel
}

/// Element-wise product.
pub fn hadamard<T: DeviceElement>(a: Shape, mode: TransposeMode) -> KernelSource {
    transform::<T>(a, mode, "ret = v1 * v2;")
}

/// Product with a scalar.
pub fn mul_scalar<T: DeviceElement>(a: Shape, mode: TransposeMode, scalar: T) -> KernelSource {
    map::<T>(a, mode, &format!("ret = v * {};", scalar.literal()))
}

/// Transpose of `a`.
pub fn transpose<T: DeviceElement>(a: Shape) -> KernelSource {
    map::<T>(a, TransposeMode::First, "ret = v;")
}

/// Sum of `a` along `axis`, one work-item per output element.
///
/// # Errors
///
/// Returns [`MatrixError::Unsupported`] for [`ReduceAxis::Full`], which would need
/// accumulation across work-items.
pub fn reduce<T: DeviceElement>(
    a: Shape,
    axis: ReduceAxis,
    mode: TransposeMode,
) -> Result<KernelSource, MatrixError> {
    let layout = ReductionLayout::new(a, axis, mode);
    let (grid, var, extent, index) = match axis {
        ReduceAxis::Full => {
            return Err(MatrixError::unsupported(
                "reduce",
                "full reduction is not available on the device, reduce rows or columns instead",
            ))
        }
        ReduceAxis::Rows => (
            Grid::Linear(layout.source.h, Var::Row),
            Var::Col,
            layout.source.w,
            IndexExpr::row(),
        ),
        ReduceAxis::Columns => (
            Grid::Linear(layout.source.w, Var::Col),
            Var::Row,
            layout.source.h,
            IndexExpr::col(),
        ),
    };

    let mut kernel = begin::<T>("dualmat_reduce", grid);
    kernel.params.push(Param::input("a", T::DEVICE_TYPE));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));
    declare_ret::<T>(&mut kernel);
    kernel.preamble.push(Stmt::Accumulate {
        target: "ret",
        var,
        extent,
        terms: vec![(
            "a",
            IndexExpr::access(&layout.a, IndexExpr::row(), IndexExpr::col()),
        )],
    });
    store_ret(&mut kernel, index);
    Ok(kernel)
}

/// Matrix product `a' * x'` per `mode`, one work-item per result element.
pub fn mul<T: DeviceElement>(a: Shape, x: Shape, mode: TransposeMode) -> KernelSource {
    let layout = ProductLayout::new(a, x, mode);
    let mut kernel = begin::<T>("dualmat_mul", Grid::Planar(layout.result.h, layout.result.w));
    kernel.params.push(Param::input("a", T::DEVICE_TYPE));
    kernel.params.push(Param::input("x", T::DEVICE_TYPE));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));
    declare_ret::<T>(&mut kernel);
    kernel.preamble.push(Stmt::Accumulate {
        target: "ret",
        var: Var::Inner,
        extent: layout.inner,
        terms: vec![
            (
                "a",
                IndexExpr::access(&layout.a, IndexExpr::row(), IndexExpr::inner()),
            ),
            (
                "x",
                IndexExpr::access(&layout.x, IndexExpr::inner(), IndexExpr::col()),
            ),
        ],
    });
    store_ret(&mut kernel, result_index(layout.result));
    kernel
}

/// A rectangular region copied from one matrix into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Shape of the source matrix.
    pub src: Shape,
    /// Shape of the destination matrix.
    pub dst: Shape,
    /// Top-left `(row, col)` of the region in the source.
    pub src_origin: (usize, usize),
    /// Top-left `(row, col)` of the region in the destination.
    pub dst_origin: (usize, usize),
    /// Size of the region.
    pub extent: Shape,
}

impl Block {
    /// Copies all of `shape` into the same position of an equally shaped matrix.
    pub fn whole(shape: Shape) -> Self {
        Self {
            src: shape,
            dst: shape,
            src_origin: (0, 0),
            dst_origin: (0, 0),
            extent: shape,
        }
    }
}

/// Blocks that place `parts` side by side (`horizontal`) or on top of each other.
pub fn stack_blocks(parts: &[Shape], dst: Shape, horizontal: bool) -> Vec<Block> {
    let mut offset = 0;
    parts
        .iter()
        .map(|&part| {
            let dst_origin = if horizontal { (0, offset) } else { (offset, 0) };
            offset += if horizontal { part.w } else { part.h };
            Block {
                src: part,
                dst,
                src_origin: (0, 0),
                dst_origin,
                extent: part,
            }
        })
        .collect()
}

/// Blocks that cut `src` into `parts`, the inverse of [`stack_blocks`].
pub fn split_blocks(src: Shape, parts: &[Shape], horizontal: bool) -> Vec<Block> {
    stack_blocks(parts, src, horizontal)
        .into_iter()
        .map(|b| Block {
            src,
            dst: b.src,
            src_origin: b.dst_origin,
            dst_origin: (0, 0),
            extent: b.extent,
        })
        .collect()
}

/// Copies `block` from buffer `src` into buffer `dst`.
pub fn block_copy<T: DeviceElement>(block: &Block) -> KernelSource {
    let grid = Grid::Planar(block.extent.h, block.extent.w);
    let mut kernel = begin::<T>("dualmat_block_copy", grid);
    kernel.params.push(Param::input("src", T::DEVICE_TYPE));
    kernel.params.push(Param::output("dst", T::DEVICE_TYPE));

    let (sr, sc) = block.src_origin;
    let (dr, dc) = block.dst_origin;
    kernel.preamble.push(Stmt::Load {
        name: "v",
        ty: T::DEVICE_TYPE,
        buffer: "src",
        index: IndexExpr::row_major(
            IndexExpr::row().plus(IndexExpr::Lit(sr)),
            IndexExpr::col().plus(IndexExpr::Lit(sc)),
            block.src.w,
        ),
    });
    kernel.epilogue.push(Stmt::Store {
        buffer: "dst",
        index: IndexExpr::row_major(
            IndexExpr::row().plus(IndexExpr::Lit(dr)),
            IndexExpr::col().plus(IndexExpr::Lit(dc)),
            block.dst.w,
        ),
        value: "v".to_string(),
    });
    kernel
}
