#![cfg(feature = "opencl")]

use approx::assert_relative_eq;
use dualmat_core::{Matrix, MatrixError, ReduceAxis, TransposeMode};
use dualmat_device::{
    opencl::{DeviceConfig, DeviceKind, OpenClDispatch},
    Async, DeviceOps, Dispatch,
};

fn device() -> Option<OpenClDispatch> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = DeviceConfig {
        kind: DeviceKind::Any,
        ..Default::default()
    };
    match OpenClDispatch::with_config(config) {
        Ok(device) => Some(device),
        Err(err) => {
            eprintln!("skipping, no OpenCL device: {err}");
            None
        }
    }
}

#[test]
fn generate_and_reduce_rows() -> Result<(), MatrixError> {
    let Some(device) = device() else { return Ok(()) };

    let mut a = Matrix::<i32>::new(3, 3);
    let mut rows = Matrix::<i32>::new(3, 1);
    a.send(&device)?;
    rows.send(&device)?;
    a.generate_on("ret = (int)(i + j);", &device)?;
    a.reduce_on(&mut rows, ReduceAxis::Rows, TransposeMode::None, &device)?;
    a.receive(&device)?;
    rows.receive(&device)?;

    assert_eq!(a.as_slice(), &[0, 1, 2, 1, 2, 3, 2, 3, 4]);
    assert_eq!(rows.as_slice(), &[3, 6, 9]);
    Ok(())
}

#[test]
fn integer_mul_matches_cpu_in_every_mode() -> Result<(), MatrixError> {
    let Some(device) = device() else { return Ok(()) };

    let a = Matrix::<i64>::from_fn(3, 3, |i, j| (i * 3 + j) as i64 - 4);
    let b = Matrix::<i64>::from_fn(3, 3, |i, j| (i as i64) - 2 * (j as i64));
    a.send(&device)?;
    b.send(&device)?;
    for mode in TransposeMode::ALL {
        let mut cpu = Matrix::<i64>::new(3, 3);
        let mut gpu = Matrix::<i64>::new(3, 3);
        a.mul(&b, &mut cpu, mode)?;
        gpu.send(&device)?;
        a.mul_on(&b, &mut gpu, mode, &device)?;
        gpu.receive(&device)?;
        gpu.release(&device)?;
        assert_eq!(cpu, gpu, "mode {mode:?}");
    }
    Ok(())
}

#[test]
fn float_transform_matches_cpu() -> Result<(), MatrixError> {
    let Some(device) = device() else { return Ok(()) };

    let a = Matrix::<f32>::from_fn(4, 2, |i, j| i as f32 * 0.5 + j as f32);
    let b = Matrix::<f32>::from_fn(2, 4, |i, j| 1.0 + i as f32 - j as f32 * 0.25);
    let mut cpu = Matrix::<f32>::new(4, 2);
    let mut gpu = Matrix::<f32>::new(4, 2);
    a.transform(&b, &mut cpu, TransposeMode::Second, |x, y| x * y + 1.0)?;

    a.send(&device)?;
    b.send(&device)?;
    gpu.send(&device)?;
    a.transform_on(&b, "ret = v1 * v2 + 1.0f;", &mut gpu, TransposeMode::Second, &Async(&device))?;
    device.await_all()?;
    gpu.receive(&device)?;

    for (c, g) in cpu.as_slice().iter().zip(gpu.as_slice()) {
        assert_relative_eq!(c, g, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn stack_then_split_on_device() -> Result<(), MatrixError> {
    let Some(device) = device() else { return Ok(()) };

    let top = Matrix::<u8>::from_fn(1, 3, |_, j| j as u8);
    let bottom = Matrix::<u8>::from_fn(2, 3, |i, j| 10 + (i * 3 + j) as u8);
    let mut both = Matrix::<u8>::new(3, 3);
    let mut t2 = Matrix::<u8>::new(1, 3);
    let mut b2 = Matrix::<u8>::new(2, 3);
    for m in [&top, &bottom, &both, &t2, &b2] {
        m.send(&device)?;
    }

    both.vstack_on(&top, &bottom, &device)?;
    both.vsplit_on(&mut t2, &mut b2, &device)?;
    t2.receive(&device)?;
    b2.receive(&device)?;
    assert_eq!(t2, top);
    assert_eq!(b2, bottom);
    Ok(())
}

#[test]
fn f64_follows_device_capability() -> Result<(), MatrixError> {
    let Some(device) = device() else { return Ok(()) };

    let mut a = Matrix::<f64>::new(2, 2);
    a.send(&device)?;
    let res = a.full_on(0.5, &device);
    if device.supports_fp64() {
        res?;
        a.receive(&device)?;
        assert_eq!(a.as_slice(), &[0.5; 4]);
    } else {
        assert!(matches!(res, Err(MatrixError::UnsupportedType { .. })));
    }
    Ok(())
}

#[test]
fn kernels_are_cached_per_source() -> Result<(), MatrixError> {
    let Some(device) = device() else { return Ok(()) };

    let a = Matrix::<i32>::new(2, 2);
    let mut b = Matrix::<i32>::new(2, 2);
    a.send(&device)?;
    b.send(&device)?;
    let before = device.cached_kernels();
    a.map_on("ret = v + 1;", &mut b, TransposeMode::None, &device)?;
    a.map_on("ret = v + 1;", &mut b, TransposeMode::None, &device)?;
    assert_eq!(device.cached_kernels(), before + 1);
    assert!(device.is_resident(b.store_key()));
    b.release(&device)?;
    assert!(!device.is_resident(b.store_key()));
    Ok(())
}
