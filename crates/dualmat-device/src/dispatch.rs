use dualmat_core::{MatrixError, StoreKey};
use dualmat_kernels::{DeviceElement, KernelSource};
use thiserror::Error;

/// Failures reported by a device dispatcher.
///
/// They reach callers as [`MatrixError::Dispatch`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// No usable device matched the configuration.
    #[error("no device found: {0}")]
    NoDevice(String),

    /// The kernel failed to compile.
    #[error("failed to build kernel {entry}: {log}")]
    Build {
        /// Kernel entry point.
        entry: String,
        /// Compiler output.
        log: String,
    },

    /// The kernel failed to launch.
    #[error("failed to launch kernel {entry}: {reason}")]
    Launch {
        /// Kernel entry point.
        entry: String,
        /// Runtime message.
        reason: String,
    },

    /// A kernel or transfer referenced a store that was never sent to the device.
    #[error("store {0} is not resident on the device")]
    NotResident(u64),

    /// A host/device copy failed.
    #[error("transfer of store {id} failed: {reason}")]
    Transfer {
        /// Store id.
        id: u64,
        /// Runtime message.
        reason: String,
    },

    /// Any other device runtime failure.
    #[error("device runtime error: {0}")]
    Runtime(String),
}

impl From<DispatchError> for MatrixError {
    fn from(err: DispatchError) -> Self {
        MatrixError::dispatch(err.to_string())
    }
}

/// Whether a launch returns before the kernel finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Block until the kernel completed.
    #[default]
    Sync,
    /// Return once the kernel is queued; call [`Dispatch::await_all`] before reading.
    Async,
}

/// Everything a dispatcher needs to run one kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Launch {
    /// Kernel entry point name.
    pub entry: String,
    /// OpenCL C source.
    pub source: String,
    /// Operand stores, in kernel argument order.
    pub buffers: Vec<StoreKey>,
    /// Global work sizes, one per grid dimension.
    pub extents: Vec<usize>,
    /// Whether the kernel needs double precision.
    pub fp64: bool,
    /// Rust name of the element type.
    pub element_type: &'static str,
}

impl Launch {
    /// Renders `kernel` over elements of type `T` with the given operand stores.
    pub fn new<T: DeviceElement>(kernel: &KernelSource, buffers: Vec<StoreKey>) -> Self {
        Self {
            entry: kernel.entry.clone(),
            source: kernel.render(),
            buffers,
            extents: kernel.grid.extents(),
            fp64: kernel.fp64,
            element_type: std::any::type_name::<T>(),
        }
    }
}

/// A compute device able to hold copies of element stores and run kernels on them.
///
/// Residency is keyed by [`StoreKey`]: a matrix is resident once its store was
/// transferred and until it is released. Kernel compilation caching is up to the
/// implementation.
pub trait Dispatch {
    /// Execution mode used by [`Dispatch::compute`].
    fn exec_mode(&self) -> ExecMode {
        ExecMode::Sync
    }

    /// Builds (or reuses) and launches a kernel.
    ///
    /// A build or launch failure is returned to the caller even in async mode.
    fn compute_with(&self, launch: &Launch, mode: ExecMode) -> Result<(), MatrixError>;

    /// Launches a kernel with the dispatcher's execution mode.
    fn compute(&self, launch: &Launch) -> Result<(), MatrixError> {
        self.compute_with(launch, self.exec_mode())
    }

    /// Copies `bytes` into the device copy of `key`, allocating it if needed.
    fn transfer_to_device(&self, key: StoreKey, bytes: &[u8]) -> Result<(), MatrixError>;

    /// Copies the device copy of `key` into `bytes`.
    fn transfer_from_device(&self, key: StoreKey, bytes: &mut [u8]) -> Result<(), MatrixError>;

    /// Drops the device copy of `key`.
    fn release_on_device(&self, key: StoreKey) -> Result<(), MatrixError>;

    /// Blocks until every queued operation completed.
    fn await_all(&self) -> Result<(), MatrixError>;
}

/// Runs every launch through `D` in [`ExecMode::Async`].
///
/// ```ignore
/// a.map_on("ret = v * 2;", &mut b, TransposeMode::None, &Async(&device))?;
/// device.await_all()?;
/// ```
pub struct Async<'a, D: ?Sized>(pub &'a D);

impl<D: Dispatch + ?Sized> Dispatch for Async<'_, D> {
    fn exec_mode(&self) -> ExecMode {
        ExecMode::Async
    }

    fn compute_with(&self, launch: &Launch, mode: ExecMode) -> Result<(), MatrixError> {
        self.0.compute_with(launch, mode)
    }

    fn transfer_to_device(&self, key: StoreKey, bytes: &[u8]) -> Result<(), MatrixError> {
        self.0.transfer_to_device(key, bytes)
    }

    fn transfer_from_device(&self, key: StoreKey, bytes: &mut [u8]) -> Result<(), MatrixError> {
        self.0.transfer_from_device(key, bytes)
    }

    fn release_on_device(&self, key: StoreKey) -> Result<(), MatrixError> {
        self.0.release_on_device(key)
    }

    fn await_all(&self) -> Result<(), MatrixError> {
        self.0.await_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_conversion() {
        let err: MatrixError = DispatchError::NotResident(7).into();
        assert_eq!(
            err,
            MatrixError::Dispatch("store 7 is not resident on the device".to_string())
        );
    }

    #[test]
    fn test_launch_from_kernel() {
        let kernel = dualmat_kernels::synth::full::<f64>(dualmat_core::Shape::new(2, 3), 0.0);
        let key = StoreKey { id: 1, bytes: 48 };
        let launch = Launch::new::<f64>(&kernel, vec![key]);
        assert_eq!(launch.entry, "dualmat_full");
        assert_eq!(launch.extents, vec![2, 3]);
        assert!(launch.fp64);
        assert_eq!(launch.element_type, "f64");
        assert!(launch.source.contains("__kernel void dualmat_full"));
    }
}
