//! Programs, kernels and argument binding.

use std::fmt;
use std::sync::Arc;

#[cfg(feature = "wgpu")]
use super::device::Context;
use super::device::WeakDevice;
use super::{Matrix, Storage, Vector};
use crate::error::{DeviceError, Result};
use crate::ops::cpu::{HostKernelFn, HostProgram};

#[derive(Clone)]
pub(crate) enum ProgramHandle {
    Host(&'static HostProgram),
    #[cfg(feature = "wgpu")]
    Wgpu(Arc<crate::ops::wgpu::WgpuProgram>),
}

/// A named, built set of kernels on one device.
///
/// Obtained through [`Device::program`](super::Device::program), which builds
/// each program once and hands out clones afterwards. A program whose build
/// failed is still returned, but every kernel taken from it is unusable.
#[derive(Clone)]
pub struct Program {
    name: Arc<str>,
    handle: Option<ProgramHandle>,
    device: WeakDevice,
}

impl Program {
    pub(crate) fn new(name: &str, handle: Option<ProgramHandle>, device: WeakDevice) -> Self {
        Self {
            name: name.into(),
            handle,
            device,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.handle.is_some()
    }

    /// Shorthand for [`Kernel::new`].
    #[must_use]
    pub fn kernel(&self, name: &str) -> Kernel {
        Kernel::new(self, name)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .field("usable", &self.is_usable())
            .finish()
    }
}

#[derive(Clone)]
pub(crate) enum KernelHandle {
    Host(HostKernelFn),
    #[cfg(feature = "wgpu")]
    Wgpu(Arc<crate::ops::wgpu::WgpuKernel>),
}

/// One entry point of a [`Program`].
///
/// The default kernel is unusable; launching it reports an error and does
/// nothing.
#[derive(Clone, Default)]
pub struct Kernel {
    name: Arc<str>,
    handle: Option<KernelHandle>,
}

impl Kernel {
    /// Looks up the entry point `name` in `program`.
    ///
    /// A missing entry point is reported through the program's device and
    /// yields an unusable kernel.
    pub fn new(program: &Program, name: &str) -> Self {
        let handle = match Self::resolve(program, name) {
            Ok(handle) => Some(handle),
            Err(err) => {
                if let Some(device) = program.device.upgrade() {
                    device.error(err);
                }
                None
            }
        };
        Self {
            name: name.into(),
            handle,
        }
    }

    fn resolve(program: &Program, name: &str) -> Result<KernelHandle> {
        let not_found = || DeviceError::KernelNotFound {
            program: program.name.to_string(),
            kernel: name.to_string(),
        };
        match program.handle.as_ref().ok_or(DeviceError::Unusable("program"))? {
            ProgramHandle::Host(host) => host.kernel(name).map(KernelHandle::Host).ok_or_else(not_found),
            #[cfg(feature = "wgpu")]
            ProgramHandle::Wgpu(wgpu_program) => {
                let device = program.device.upgrade().ok_or(DeviceError::Unusable("device"))?;
                match device.context() {
                    Some(Context::Wgpu(ctx)) => ctx
                        .create_kernel(wgpu_program, name)
                        .map(|kernel| KernelHandle::Wgpu(Arc::new(kernel))),
                    _ => Err(DeviceError::Unusable("compute context")),
                }
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn handle(&self) -> Option<&KernelHandle> {
        self.handle.as_ref()
    }

    /// Starts binding arguments for a launch.
    #[must_use]
    pub fn invoke(&self) -> KernelInvocation<'_> {
        KernelInvocation {
            kernel: self,
            args: Vec::new(),
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.name)
            .field("usable", &self.is_usable())
            .finish()
    }
}

/// Work-group local scratch memory of the given size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMemory(pub usize);

/// A positional kernel argument.
#[derive(Debug, Clone, Copy)]
pub enum KernelArg<'a> {
    Buffer(&'a Storage),
    Float(f32),
    Uint(u32),
    /// Local scratch memory, in bytes.
    Local(usize),
}

/// Conversion into a [`KernelArg`].
pub trait IntoKernelArg<'a> {
    fn into_kernel_arg(self) -> KernelArg<'a>;
}

impl<'a> IntoKernelArg<'a> for &'a Storage {
    fn into_kernel_arg(self) -> KernelArg<'a> {
        KernelArg::Buffer(self)
    }
}

impl<'a> IntoKernelArg<'a> for &'a Vector {
    fn into_kernel_arg(self) -> KernelArg<'a> {
        KernelArg::Buffer(self.storage())
    }
}

impl<'a> IntoKernelArg<'a> for &'a Matrix {
    fn into_kernel_arg(self) -> KernelArg<'a> {
        KernelArg::Buffer(self.storage())
    }
}

impl<'a> IntoKernelArg<'a> for f32 {
    fn into_kernel_arg(self) -> KernelArg<'a> {
        KernelArg::Float(self)
    }
}

impl<'a> IntoKernelArg<'a> for u32 {
    fn into_kernel_arg(self) -> KernelArg<'a> {
        KernelArg::Uint(self)
    }
}

impl<'a> IntoKernelArg<'a> for usize {
    /// # Panics
    ///
    /// If the value does not fit in 32 bits.
    fn into_kernel_arg(self) -> KernelArg<'a> {
        let value = u32::try_from(self)
            .unwrap_or_else(|_| panic!("kernel argument {self} does not fit in 32 bits"));
        KernelArg::Uint(value)
    }
}

impl<'a> IntoKernelArg<'a> for LocalMemory {
    fn into_kernel_arg(self) -> KernelArg<'a> {
        KernelArg::Local(self.0)
    }
}

/// A kernel together with its bound arguments, ready to enqueue.
///
/// # Example
///
/// ```
/// use nnfit::core::{CommandQueue, Device, Vector};
///
/// let device = Device::host();
/// let queue = CommandQueue::new(&device);
/// let x = Vector::from_slice(&device, &[1.0f32, 2.0, 3.0]);
/// let fill = device.program("generic").kernel("fill");
/// queue.enqueue_1d(&fill.invoke().arg(&x).arg(7.0f32), x.len());
/// assert_eq!(x.read::<f32>(&queue), vec![7.0; 3]);
/// ```
#[derive(Debug, Clone)]
pub struct KernelInvocation<'a> {
    kernel: &'a Kernel,
    args: Vec<KernelArg<'a>>,
}

impl<'a> KernelInvocation<'a> {
    /// Appends the next positional argument.
    #[must_use]
    pub fn arg(mut self, arg: impl IntoKernelArg<'a>) -> Self {
        self.args.push(arg.into_kernel_arg());
        self
    }

    #[must_use]
    pub fn kernel(&self) -> &'a Kernel {
        self.kernel
    }

    #[must_use]
    pub fn args(&self) -> &[KernelArg<'a>] {
        &self.args
    }
}
