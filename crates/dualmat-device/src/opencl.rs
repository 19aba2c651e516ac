//! OpenCL dispatcher.
//!
//! One context and one in-order command queue per [`OpenClDispatch`]. Compiled kernels
//! are cached per source text for the lifetime of the dispatcher, and device buffers are
//! keyed by store id. Host/device transfers always block; kernel launches block unless
//! run in [`ExecMode::Async`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use dualmat_core::{MatrixError, StoreKey};
use opencl3::{
    command_queue::CommandQueue,
    context::Context,
    device::{Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU},
    error_codes::ClError,
    kernel::{ExecuteKernel, Kernel},
    memory::{Buffer as ClBuffer, ClMem, CL_MEM_READ_WRITE},
    platform::get_platforms,
    program::Program,
    types::{cl_device_type, CL_BLOCKING},
};

use crate::dispatch::{Dispatch, DispatchError, ExecMode, Launch};

/// Kind of OpenCL device to select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceKind {
    /// A GPU.
    #[default]
    Gpu,
    /// A CPU device.
    Cpu,
    /// Any device.
    Any,
}

impl DeviceKind {
    fn cl_type(self) -> cl_device_type {
        match self {
            DeviceKind::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceKind::Cpu => CL_DEVICE_TYPE_CPU,
            DeviceKind::Any => CL_DEVICE_TYPE_ALL,
        }
    }
}

/// Selection of the OpenCL device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    /// Index into the list of platforms.
    pub platform_index: usize,
    /// Index into the devices of `kind` on the platform.
    pub device_index: usize,
    /// Kind of device to list.
    pub kind: DeviceKind,
    /// Execution mode of [`Dispatch::compute`].
    pub exec_mode: ExecMode,
}

struct CompiledKernel {
    // the kernel borrows the program on the device side
    _program: Program,
    kernel: Kernel,
}

/// A [`Dispatch`] implementation on top of an OpenCL device.
pub struct OpenClDispatch {
    context: Context,
    queue: CommandQueue,
    device: Device,
    supports_fp64: bool,
    exec_mode: ExecMode,
    kernels: Mutex<HashMap<String, CompiledKernel>>,
    buffers: Mutex<HashMap<u64, ClBuffer<u8>>>,
}

fn runtime(what: &str, err: impl std::fmt::Debug) -> DispatchError {
    DispatchError::Runtime(format!("{what}: {err:?}"))
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DispatchError> {
    mutex
        .lock()
        .map_err(|_| DispatchError::Runtime("dispatcher state lock poisoned".to_string()))
}

impl OpenClDispatch {
    /// Opens the first GPU of the first platform.
    pub fn new() -> Result<Self, MatrixError> {
        Self::with_config(DeviceConfig::default())
    }

    /// Opens the device selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MatrixError::Dispatch`] if the platform or device does not exist or the
    /// context cannot be created.
    pub fn with_config(config: DeviceConfig) -> Result<Self, MatrixError> {
        let platforms = get_platforms().map_err(|e| runtime("failed to list platforms", e))?;
        let platform = platforms.get(config.platform_index).ok_or_else(|| {
            DispatchError::NoDevice(format!(
                "platform index {} out of range (found {} platforms)",
                config.platform_index,
                platforms.len()
            ))
        })?;
        let ids = platform
            .get_devices(config.kind.cl_type())
            .map_err(|e| runtime("failed to list devices", e))?;
        let id = ids.get(config.device_index).ok_or_else(|| {
            DispatchError::NoDevice(format!(
                "{:?} device index {} out of range (found {} devices)",
                config.kind,
                config.device_index,
                ids.len()
            ))
        })?;

        let device = Device::new(*id);
        let context =
            Context::from_device(&device).map_err(|e| runtime("failed to create context", e))?;
        let queue = CommandQueue::create_default(&context, 0)
            .map_err(|e| runtime("failed to create queue", e))?;
        let supports_fp64 = device
            .extensions()
            .map(|ext| ext.contains("cl_khr_fp64"))
            .unwrap_or(false);

        let dispatch = Self {
            context,
            queue,
            device,
            supports_fp64,
            exec_mode: config.exec_mode,
            kernels: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
        };
        log::info!("opened OpenCL device {}", dispatch.device_info());
        if !supports_fp64 {
            log::warn!("device lacks cl_khr_fp64, f64 kernels will be rejected");
        }
        Ok(dispatch)
    }

    /// Returns the device name and vendor.
    pub fn device_info(&self) -> String {
        let name = self.device.name().unwrap_or_else(|_| "unknown".into());
        let vendor = self.device.vendor().unwrap_or_else(|_| "unknown".into());
        format!("{name} ({vendor})")
    }

    /// Returns true if the device runs double precision kernels.
    pub fn supports_fp64(&self) -> bool {
        self.supports_fp64
    }

    /// Returns the number of cached kernels.
    pub fn cached_kernels(&self) -> usize {
        lock(&self.kernels).map(|k| k.len()).unwrap_or(0)
    }

    /// Returns true if a device copy of `key` exists.
    pub fn is_resident(&self, key: StoreKey) -> bool {
        lock(&self.buffers)
            .map(|b| b.contains_key(&key.id))
            .unwrap_or(false)
    }

    fn compile(&self, launch: &Launch) -> Result<CompiledKernel, DispatchError> {
        log::debug!("building kernel {}", launch.entry);
        let program = Program::create_and_build_from_source(&self.context, &launch.source, "")
            .map_err(|log| DispatchError::Build {
                entry: launch.entry.clone(),
                log,
            })?;
        let kernel = Kernel::create(&program, &launch.entry).map_err(|e| DispatchError::Build {
            entry: launch.entry.clone(),
            log: format!("{e:?}"),
        })?;
        Ok(CompiledKernel {
            _program: program,
            kernel,
        })
    }

    fn launch(&self, launch: &Launch, mode: ExecMode) -> Result<(), DispatchError> {
        let mut kernels = lock(&self.kernels)?;
        if !kernels.contains_key(&launch.source) {
            let compiled = self.compile(launch)?;
            kernels.insert(launch.source.clone(), compiled);
        } else {
            log::debug!("kernel cache hit for {}", launch.entry);
        }
        let compiled = kernels
            .get(&launch.source)
            .ok_or_else(|| DispatchError::Runtime("kernel cache miss after insert".to_string()))?;

        let buffers = lock(&self.buffers)?;
        let mut args = Vec::with_capacity(launch.buffers.len());
        for key in &launch.buffers {
            args.push(buffers.get(&key.id).ok_or(DispatchError::NotResident(key.id))?);
        }

        let failed = |e: ClError| DispatchError::Launch {
            entry: launch.entry.clone(),
            reason: format!("{e:?}"),
        };
        let mut exec = ExecuteKernel::new(&compiled.kernel);
        // SAFETY: every argument is a live device buffer matching a `__global` parameter
        unsafe {
            for buffer in &args {
                exec.set_arg(*buffer);
            }
            exec.set_global_work_sizes(&launch.extents)
                .enqueue_nd_range(&self.queue)
                .map_err(failed)?;
        }

        if mode == ExecMode::Sync {
            self.queue.finish().map_err(failed)?;
        }
        Ok(())
    }
}

impl Dispatch for OpenClDispatch {
    fn exec_mode(&self) -> ExecMode {
        self.exec_mode
    }

    fn compute_with(&self, launch: &Launch, mode: ExecMode) -> Result<(), MatrixError> {
        if launch.fp64 && !self.supports_fp64 {
            return Err(MatrixError::UnsupportedType {
                type_name: launch.element_type,
                reason: format!("{} does not support cl_khr_fp64", self.device_info()),
            });
        }
        Ok(self.launch(launch, mode)?)
    }

    fn transfer_to_device(&self, key: StoreKey, bytes: &[u8]) -> Result<(), MatrixError> {
        let mut buffers = lock(&self.buffers)?;
        let stale = buffers
            .get(&key.id)
            .and_then(|b| b.size().ok())
            .is_some_and(|size| size != bytes.len().max(1));
        if stale || !buffers.contains_key(&key.id) {
            // SAFETY: no host pointer is passed, the runtime owns the allocation
            let buffer = unsafe {
                ClBuffer::<u8>::create(
                    &self.context,
                    CL_MEM_READ_WRITE,
                    bytes.len().max(1),
                    std::ptr::null_mut(),
                )
            }
            .map_err(|e| DispatchError::Transfer {
                id: key.id,
                reason: format!("allocation failed: {e:?}"),
            })?;
            log::debug!("allocated {} bytes for store {}", bytes.len(), key.id);
            buffers.insert(key.id, buffer);
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let buffer = buffers
            .get_mut(&key.id)
            .ok_or(DispatchError::NotResident(key.id))?;
        // SAFETY: blocking write, `bytes` outlives the call
        unsafe {
            self.queue
                .enqueue_write_buffer(buffer, CL_BLOCKING, 0, bytes, &[])
                .map_err(|e| DispatchError::Transfer {
                    id: key.id,
                    reason: format!("{e:?}"),
                })?;
        }
        Ok(())
    }

    fn transfer_from_device(&self, key: StoreKey, bytes: &mut [u8]) -> Result<(), MatrixError> {
        let buffers = lock(&self.buffers)?;
        let buffer = buffers
            .get(&key.id)
            .ok_or(DispatchError::NotResident(key.id))?;
        if bytes.is_empty() {
            return Ok(());
        }
        // SAFETY: blocking read into a host slice of the resident size
        unsafe {
            self.queue
                .enqueue_read_buffer(buffer, CL_BLOCKING, 0, bytes, &[])
                .map_err(|e| DispatchError::Transfer {
                    id: key.id,
                    reason: format!("{e:?}"),
                })?;
        }
        Ok(())
    }

    fn release_on_device(&self, key: StoreKey) -> Result<(), MatrixError> {
        if lock(&self.buffers)?.remove(&key.id).is_some() {
            log::debug!("released store {}", key.id);
        }
        Ok(())
    }

    fn await_all(&self) -> Result<(), MatrixError> {
        self.queue
            .finish()
            .map_err(|e| runtime("failed to drain the queue", e))?;
        Ok(())
    }
}

// OpenCL objects are thread-safe, the maps are behind mutexes
unsafe impl Send for OpenClDispatch {}
unsafe impl Sync for OpenClDispatch {}
