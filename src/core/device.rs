//! Compute devices.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use super::program::{Program, ProgramHandle};
use super::storage::Buffer;
use super::tensor::TensorKernels;
use crate::backend::{get_backend, Backend};
use crate::error::{DeviceError, Result};
use crate::ops::cpu::{self, HostBuffer};

/// Broad class of a compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Other,
}

pub(crate) enum DeviceBackend {
    Host,
    #[cfg(feature = "wgpu")]
    Wgpu(crate::ops::wgpu::WgpuAdapter),
}

/// The lazily created runtime state of a device.
pub(crate) enum Context {
    Host(rayon::ThreadPool),
    #[cfg(feature = "wgpu")]
    Wgpu(crate::ops::wgpu::WgpuContext),
}

pub(crate) struct DeviceInner {
    backend: DeviceBackend,
    context: OnceLock<Option<Context>>,
    programs: Mutex<HashMap<String, Program>>,
    tensor_kernels: OnceLock<TensorKernels>,
    last_error: Mutex<Option<DeviceError>>,
    error_count: AtomicUsize,
}

lazy_static::lazy_static! {
    static ref HOST_DEVICE: Device = Device::new_host();
}

/// One compute accelerator.
///
/// `Device` is a cheap handle: clones refer to the same context, program
/// cache and error log. Every buffer, program, kernel and queue created from a
/// device keeps what it needs of it alive.
///
/// # Failure reporting
///
/// Backend failures never panic. They are passed to [`Device::error`], which
/// logs them and records the most recent one, and the handle being created is
/// left unusable. Callers that care check [`Device::error_count`] or
/// [`Device::last_error`].
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    fn from_backend(backend: DeviceBackend) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                backend,
                context: OnceLock::new(),
                programs: Mutex::new(HashMap::new()),
                tensor_kernels: OnceLock::new(),
                last_error: Mutex::new(None),
                error_count: AtomicUsize::new(0),
            }),
        }
    }

    /// The process-wide host device.
    #[must_use]
    pub fn host() -> Self {
        HOST_DEVICE.clone()
    }

    /// A fresh host device with its own context, program cache and error log.
    #[must_use]
    pub fn new_host() -> Self {
        Self::from_backend(DeviceBackend::Host)
    }

    /// Every device available to this build: the host device first, then one
    /// device per adapter when the `wgpu` feature is enabled.
    #[must_use]
    pub fn find_all() -> Vec<Self> {
        #[allow(unused_mut)]
        let mut devices = vec![Self::host()];
        #[cfg(feature = "wgpu")]
        devices.extend(
            crate::ops::wgpu::enumerate_adapters()
                .into_iter()
                .map(|adapter| Self::from_backend(DeviceBackend::Wgpu(adapter))),
        );
        devices
    }

    /// Every GPU available to this build.
    #[must_use]
    pub fn find_gpus() -> Vec<Self> {
        Self::find_all()
            .into_iter()
            .filter(|d| d.kind() == DeviceKind::Gpu)
            .collect()
    }

    /// The device matching the global [`Backend`], falling back to the host
    /// device when no GPU can be found.
    #[must_use]
    pub fn default_device() -> Self {
        if get_backend() == Backend::Wgpu {
            if let Some(gpu) = Self::find_gpus().into_iter().next() {
                return gpu;
            }
            tracing::warn!("no GPU adapter available, falling back to the host device");
        }
        Self::host()
    }

    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        match &self.inner.backend {
            DeviceBackend::Host => DeviceKind::Cpu,
            #[cfg(feature = "wgpu")]
            DeviceBackend::Wgpu(adapter) => adapter.kind(),
        }
    }

    #[must_use]
    pub fn is_gpu(&self) -> bool {
        self.kind() == DeviceKind::Gpu
    }

    #[must_use]
    pub fn is_cpu(&self) -> bool {
        self.kind() == DeviceKind::Cpu
    }

    #[must_use]
    pub fn name(&self) -> String {
        match &self.inner.backend {
            DeviceBackend::Host => "host".to_string(),
            #[cfg(feature = "wgpu")]
            DeviceBackend::Wgpu(adapter) => adapter.name(),
        }
    }

    #[must_use]
    pub fn vendor(&self) -> String {
        match &self.inner.backend {
            DeviceBackend::Host => env!("CARGO_PKG_NAME").to_string(),
            #[cfg(feature = "wgpu")]
            DeviceBackend::Wgpu(adapter) => adapter.vendor(),
        }
    }

    #[must_use]
    pub fn version(&self) -> String {
        match &self.inner.backend {
            DeviceBackend::Host => env!("CARGO_PKG_VERSION").to_string(),
            #[cfg(feature = "wgpu")]
            DeviceBackend::Wgpu(adapter) => adapter.version(),
        }
    }

    /// Largest number of work items a single workgroup may hold.
    #[must_use]
    pub fn max_threads_per_workgroup(&self) -> usize {
        match &self.inner.backend {
            DeviceBackend::Host => 1024,
            #[cfg(feature = "wgpu")]
            DeviceBackend::Wgpu(adapter) => adapter.max_threads_per_workgroup(),
        }
    }

    /// Creates the context and the tensor kernels up front.
    ///
    /// Returns whether the device is usable.
    pub fn init(&self) -> bool {
        let usable = self.context().is_some();
        if usable {
            self.tensor_kernels();
            tracing::info!(device = %self.name(), vendor = %self.vendor(), "device initialized");
        }
        usable
    }

    /// The compute context, created on first use.
    pub(crate) fn context(&self) -> Option<&Context> {
        self.inner
            .context
            .get_or_init(|| match self.create_context() {
                Ok(context) => Some(context),
                Err(err) => {
                    self.error(err);
                    None
                }
            })
            .as_ref()
    }

    fn create_context(&self) -> Result<Context> {
        match &self.inner.backend {
            DeviceBackend::Host => rayon::ThreadPoolBuilder::new()
                .thread_name(|i| format!("nnfit-host-{i}"))
                .build()
                .map(Context::Host)
                .map_err(|e| DeviceError::Context(e.to_string())),
            #[cfg(feature = "wgpu")]
            DeviceBackend::Wgpu(adapter) => adapter.create_context().map(Context::Wgpu),
        }
    }

    /// Returns the program called `name`, building it on first request.
    ///
    /// Builds happen at most once per device and program name; a failed build
    /// is cached too, as an unusable program.
    pub fn program(&self, name: &str) -> Program {
        let mut programs = self.inner.programs.lock();
        if let Some(program) = programs.get(name) {
            return program.clone();
        }
        let handle = match self.build_program(name) {
            Ok(handle) => {
                tracing::debug!(program = name, device = %self.name(), "program built");
                Some(handle)
            }
            Err(err) => {
                self.error(err);
                None
            }
        };
        let program = Program::new(name, handle, self.downgrade());
        programs.insert(name.to_string(), program.clone());
        program
    }

    fn build_program(&self, name: &str) -> Result<ProgramHandle> {
        match self.context().ok_or(DeviceError::Unusable("compute context"))? {
            Context::Host(_) => cpu::program(name).map(ProgramHandle::Host),
            #[cfg(feature = "wgpu")]
            Context::Wgpu(ctx) => ctx
                .build_program(name)
                .map(|program| ProgramHandle::Wgpu(Arc::new(program))),
        }
    }

    /// The kernels behind the tensor operations, created on first use.
    pub fn tensor_kernels(&self) -> &TensorKernels {
        self.inner
            .tensor_kernels
            .get_or_init(|| TensorKernels::new(self))
    }

    pub(crate) fn create_buffer(&self, size: usize, data: Option<&[u8]>) -> Result<Buffer> {
        match self.context().ok_or(DeviceError::Unusable("compute context"))? {
            Context::Host(_) => Ok(Buffer::Host(HostBuffer::new(size, data))),
            #[cfg(feature = "wgpu")]
            Context::Wgpu(ctx) => ctx.create_buffer(size, data).map(Buffer::Wgpu),
        }
    }

    /// Reports a backend failure.
    ///
    /// The error is logged with its code and kept as [`Device::last_error`].
    pub fn error(&self, err: DeviceError) {
        tracing::error!(code = err.code(), device = %self.name(), "{err}");
        self.inner.error_count.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_error.lock() = Some(err);
    }

    /// Most recent error reported on this device.
    #[must_use]
    pub fn last_error(&self) -> Option<DeviceError> {
        self.inner.last_error.lock().clone()
    }

    /// Number of errors reported on this device so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.inner.error_count.load(Ordering::Relaxed)
    }

    /// Whether both handles refer to the same device.
    #[must_use]
    pub fn ptr_eq(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakDevice {
        WeakDevice(Arc::downgrade(&self.inner))
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

/// A device reference that does not keep the device alive.
///
/// Programs hold one so that the device's own program cache does not form a
/// reference cycle.
#[derive(Clone, Default)]
pub(crate) struct WeakDevice(Weak<DeviceInner>);

impl WeakDevice {
    pub fn upgrade(&self) -> Option<Device> {
        self.0.upgrade().map(|inner| Device { inner })
    }
}
