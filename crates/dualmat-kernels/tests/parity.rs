//! Runs synthesized kernels through a small host interpreter and compares the results
//! with the CPU strategies. This exercises every index expression a kernel contains
//! without needing a device.

use std::collections::HashMap;

use dualmat_core::{Matrix, MatrixError, ReduceAxis, Shape, TransposeMode};
use dualmat_kernels::{synth, Bindings, Grid, KernelSource, Stmt, Var};

type Buffers = HashMap<&'static str, Vec<i64>>;

fn bind(mut b: Bindings, var: Var, value: usize) -> Bindings {
    match var {
        Var::Row => b.i = value,
        Var::Col => b.j = value,
        Var::Inner => b.k = value,
    }
    b
}

fn work_items(grid: Grid) -> Vec<Bindings> {
    match grid {
        Grid::Linear(n, var) => (0..n).map(|t| bind(Bindings::default(), var, t)).collect(),
        Grid::Planar(h, w) => (0..h)
            .flat_map(|i| (0..w).map(move |j| Bindings { i, j, k: 0 }))
            .collect(),
    }
}

/// Value of an i64 literal as rendered by `DeviceElement::literal`.
fn literal(text: &str) -> Option<i64> {
    if text == "LONG_MIN" {
        return Some(i64::MIN);
    }
    text.strip_prefix("((long)")?.strip_suffix("L)")?.parse().ok()
}

fn value_of(vars: &HashMap<&str, i64>, text: &str) -> i64 {
    literal(text).unwrap_or_else(|| vars[text])
}

fn interpret(kernel: &KernelSource, buffers: &mut Buffers) {
    for b in work_items(kernel.grid) {
        let mut vars: HashMap<&str, i64> = HashMap::new();
        for stmt in &kernel.preamble {
            match stmt {
                Stmt::Load {
                    name,
                    buffer,
                    index,
                    ..
                } => {
                    vars.insert(*name, buffers[buffer][index.eval(&b)]);
                }
                Stmt::Declare { name, .. } => {
                    vars.insert(*name, 0);
                }
                Stmt::Accumulate {
                    target,
                    var,
                    extent,
                    terms,
                } => {
                    let mut acc = vars[target];
                    for t in 0..*extent {
                        let bt = bind(b, *var, t);
                        acc += terms
                            .iter()
                            .map(|(buffer, index)| buffers[buffer][index.eval(&bt)])
                            .product::<i64>();
                    }
                    vars.insert(*target, acc);
                }
                _ => {}
            }
        }
        let ret = match kernel.body.as_str() {
            "" => vars.get("ret").copied(),
            "ret = v;" => Some(vars["v"]),
            "ret = v1;" => Some(vars["v1"]),
            "ret = v1 * v2;" => Some(vars["v1"] * vars["v2"]),
            "ret = i + j;" => Some((b.i + b.j) as i64),
            other => match other
                .strip_prefix("ret = v * ")
                .and_then(|rest| rest.strip_suffix(';'))
                .and_then(literal)
            {
                Some(scalar) => Some(vars["v"] * scalar),
                None => panic!("interpreter does not understand {other:?}"),
            },
        };
        if let Some(ret) = ret {
            vars.insert("ret", ret);
        }
        for stmt in &kernel.epilogue {
            if let Stmt::Store {
                buffer,
                index,
                value,
            } = stmt
            {
                let v = value_of(&vars, value);
                let idx = index.eval(&b);
                if let Some(buf) = buffers.get_mut(buffer) {
                    buf[idx] = v;
                }
            }
        }
    }
}

fn sample(h: usize, w: usize, seed: i64) -> Matrix<i64> {
    Matrix::from_fn(h, w, |i, j| seed + (i * 7 + j * 3) as i64 % 11 - 5)
}

#[test]
fn test_map_parity() -> Result<(), MatrixError> {
    let a = sample(3, 5, 1);
    for mode in TransposeMode::ALL {
        let kernel = synth::map::<i64>(a.shape(), mode, "ret = v;");
        let Grid::Planar(h, w) = kernel.grid else {
            panic!("map uses a planar grid");
        };

        let mut expected = Matrix::zeros(h, w);
        a.map(&mut expected, mode, |v| *v)?;

        let mut buffers = Buffers::from([("a", a.as_slice().to_vec()), ("dst", vec![0; h * w])]);
        interpret(&kernel, &mut buffers);
        assert_eq!(buffers["dst"], expected.as_slice(), "{mode:?}");
    }
    Ok(())
}

#[test]
fn test_transform_parity() -> Result<(), MatrixError> {
    let a = sample(2, 4, 3);
    for mode in TransposeMode::ALL {
        let layout = dualmat_core::transpose::ElementwiseLayout::new(a.shape(), mode);
        let x = sample(layout.second.h, layout.second.w, -2);

        let mut expected = Matrix::zeros(layout.result.h, layout.result.w);
        a.hadamard(&x, &mut expected, mode)?;

        let kernel = synth::hadamard::<i64>(a.shape(), mode);
        let mut buffers = Buffers::from([
            ("a", a.as_slice().to_vec()),
            ("x", x.as_slice().to_vec()),
            ("dst", vec![0; expected.total_size()]),
        ]);
        interpret(&kernel, &mut buffers);
        assert_eq!(buffers["dst"], expected.as_slice(), "{mode:?}");
    }
    Ok(())
}

#[test]
fn test_mul_parity() -> Result<(), MatrixError> {
    let a = sample(2, 3, 0);
    let cases = [
        (TransposeMode::None, Shape::new(3, 4)),
        (TransposeMode::First, Shape::new(2, 4)),
        (TransposeMode::Second, Shape::new(4, 3)),
        (TransposeMode::Both, Shape::new(4, 2)),
    ];
    for (mode, xs) in cases {
        let x = sample(xs.h, xs.w, 4);
        let kernel = synth::mul::<i64>(a.shape(), x.shape(), mode);
        let Grid::Planar(h, w) = kernel.grid else {
            panic!("mul uses a planar grid");
        };

        let mut expected = Matrix::zeros(h, w);
        a.mul(&x, &mut expected, mode)?;

        let mut buffers = Buffers::from([
            ("a", a.as_slice().to_vec()),
            ("x", x.as_slice().to_vec()),
            ("dst", vec![0; h * w]),
        ]);
        interpret(&kernel, &mut buffers);
        assert_eq!(buffers["dst"], expected.as_slice(), "{mode:?}");
    }
    Ok(())
}

#[test]
fn test_reduce_parity() -> Result<(), MatrixError> {
    let a = sample(3, 4, 2);
    for mode in TransposeMode::ALL {
        for axis in [ReduceAxis::Rows, ReduceAxis::Columns] {
            let layout = dualmat_core::transpose::ReductionLayout::new(a.shape(), axis, mode);
            let mut expected = Matrix::zeros(layout.result.h, layout.result.w);
            a.reduce(&mut expected, axis, mode)?;

            let kernel = synth::reduce::<i64>(a.shape(), axis, mode)?;
            let mut buffers = Buffers::from([
                ("a", a.as_slice().to_vec()),
                ("dst", vec![0; expected.total_size()]),
            ]);
            interpret(&kernel, &mut buffers);
            assert_eq!(buffers["dst"], expected.as_slice(), "{mode:?} {axis:?}");
        }
    }
    Ok(())
}

#[test]
fn test_stack_split_parity() -> Result<(), MatrixError> {
    let left = sample(3, 2, 1);
    let right = sample(3, 3, 9);

    let mut expected = Matrix::zeros(3, 5);
    expected.hstack(&left, &right)?;

    let mut dst = vec![0; 15];
    for (part, block) in [&left, &right]
        .iter()
        .zip(synth::stack_blocks(&[left.shape(), right.shape()], Shape::new(3, 5), true))
    {
        let kernel = synth::block_copy::<i64>(&block);
        let mut buffers = Buffers::from([("src", part.as_slice().to_vec()), ("dst", dst)]);
        interpret(&kernel, &mut buffers);
        dst = buffers.remove("dst").unwrap_or_default();
    }
    assert_eq!(dst, expected.as_slice());

    let top = sample(1, 5, 0);
    let mut stacked = Matrix::zeros(4, 5);
    stacked.vstack(&top, &expected)?;
    let blocks = synth::split_blocks(stacked.shape(), &[top.shape(), expected.shape()], false);
    let kernel = synth::block_copy::<i64>(&blocks[1]);
    let mut buffers = Buffers::from([("src", stacked.as_slice().to_vec()), ("dst", vec![0; 15])]);
    interpret(&kernel, &mut buffers);
    assert_eq!(buffers["dst"], expected.as_slice());
    Ok(())
}

#[test]
fn test_fill_parity() -> Result<(), MatrixError> {
    for value in [5, -3, i64::MIN] {
        let mut expected = Matrix::zeros(2, 3);
        expected.full(value)?;

        let kernel = synth::full::<i64>(expected.shape(), value);
        let mut buffers = Buffers::from([("dst", vec![0; 6])]);
        interpret(&kernel, &mut buffers);
        assert_eq!(buffers["dst"], expected.as_slice(), "{value}");
    }

    let mut expected = Matrix::zeros(3, 2);
    expected.generate(|i, j| (i + j) as i64)?;
    let kernel = synth::generate::<i64>(expected.shape(), "ret = i + j;");
    let mut buffers = Buffers::from([("dst", vec![0; 6])]);
    interpret(&kernel, &mut buffers);
    assert_eq!(buffers["dst"], expected.as_slice());
    Ok(())
}

#[test]
fn test_mul_scalar_and_transpose_parity() -> Result<(), MatrixError> {
    let a = sample(2, 5, 6);
    for mode in TransposeMode::ALL {
        let kernel = synth::mul_scalar::<i64>(a.shape(), mode, -7);
        let Grid::Planar(h, w) = kernel.grid else {
            panic!("mul_scalar uses a planar grid");
        };

        let mut expected = Matrix::zeros(h, w);
        a.mul_scalar(-7, &mut expected, mode)?;

        let mut buffers = Buffers::from([("a", a.as_slice().to_vec()), ("dst", vec![0; h * w])]);
        interpret(&kernel, &mut buffers);
        assert_eq!(buffers["dst"], expected.as_slice(), "{mode:?}");
    }

    let mut expected = Matrix::zeros(5, 2);
    a.transpose(&mut expected)?;
    let kernel = synth::transpose::<i64>(a.shape());
    let mut buffers = Buffers::from([("a", a.as_slice().to_vec()), ("dst", vec![0; 10])]);
    interpret(&kernel, &mut buffers);
    assert_eq!(buffers["dst"], expected.as_slice());
    Ok(())
}

#[test]
fn test_copy_and_split_parity() -> Result<(), MatrixError> {
    let a = sample(4, 3, 2);

    let mut expected = Matrix::zeros(4, 3);
    expected.cpy(&a)?;
    let kernel = synth::block_copy::<i64>(&synth::Block::whole(a.shape()));
    let mut buffers = Buffers::from([("src", a.as_slice().to_vec()), ("dst", vec![0; 12])]);
    interpret(&kernel, &mut buffers);
    assert_eq!(buffers["dst"], expected.as_slice());

    let (mut top, mut bottom) = (Matrix::zeros(1, 3), Matrix::zeros(3, 3));
    a.vsplit(&mut top, &mut bottom)?;
    let (mut left, mut right) = (Matrix::zeros(4, 2), Matrix::zeros(4, 1));
    a.hsplit(&mut left, &mut right)?;

    for (horizontal, parts) in [(false, [&top, &bottom]), (true, [&left, &right])] {
        let shapes = [parts[0].shape(), parts[1].shape()];
        for (part, block) in parts.iter().zip(synth::split_blocks(a.shape(), &shapes, horizontal)) {
            let kernel = synth::block_copy::<i64>(&block);
            let mut buffers = Buffers::from([
                ("src", a.as_slice().to_vec()),
                ("dst", vec![0; part.total_size()]),
            ]);
            interpret(&kernel, &mut buffers);
            assert_eq!(buffers["dst"], part.as_slice(), "horizontal {horizontal}");
        }
    }
    Ok(())
}
