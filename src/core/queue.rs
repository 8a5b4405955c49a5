//! Command queues.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::device::{Context, Device};
use super::program::{Kernel, KernelArg, KernelHandle, KernelInvocation};
use super::range::{NdRange, Range2D, Range3D};
use super::storage::{Buffer, StorageRef};
use crate::error::{DeviceError, Result};
use crate::ops::cpu;

/// Accumulated launch statistics of one kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileEntry {
    pub invocations: usize,
    pub total: Duration,
}

/// An in-order channel of commands to one [`Device`].
///
/// Commands issued on the same queue are observed in submission order. With
/// profiling enabled every launch blocks until the device is done, and the
/// elapsed time is accumulated per kernel name.
///
/// # Example
///
/// ```
/// use nnfit::core::{CommandQueue, Device, Vector};
///
/// let device = Device::host();
/// let queue = CommandQueue::new(&device);
/// let v = Vector::from_slice(&device, &[1u32, 2, 3]);
/// queue.fill(v.storage(), v.storage().size(), &7u32.to_ne_bytes());
/// queue.finish();
/// assert_eq!(v.read::<u32>(&queue), vec![7, 7, 7]);
/// ```
pub struct CommandQueue {
    device: Device,
    profiling: Option<Mutex<HashMap<String, ProfileEntry>>>,
}

impl CommandQueue {
    pub fn new(device: &Device) -> Self {
        Self::create(device, false)
    }

    /// A queue recording per-kernel execution times.
    pub fn with_profiling(device: &Device) -> Self {
        Self::create(device, true)
    }

    fn create(device: &Device, profiling: bool) -> Self {
        if device.context().is_none() {
            device.error(DeviceError::Queue("device has no compute context".to_string()));
        }
        Self {
            device: device.clone(),
            profiling: profiling.then(|| Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.device.context().is_some()
    }

    #[must_use]
    pub fn is_profiling(&self) -> bool {
        self.profiling.is_some()
    }

    /// Launches `invocation` over `global` work items.
    ///
    /// `local`, when given, is the workgroup shape and must divide `global`
    /// along every dimension. An empty global range launches nothing.
    ///
    /// # Panics
    ///
    /// If `local` has a different dimensionality than `global` or does not
    /// divide it.
    pub fn enqueue(&self, invocation: &KernelInvocation<'_>, global: impl Into<NdRange>, local: Option<NdRange>) {
        let global = global.into();
        if global.volume() == 0 {
            return;
        }
        if let Some(local) = &local {
            assert_eq!(local.dims(), global.dims(), "local and global ranges differ in dimensions");
            for (g, l) in global.sizes().iter().zip(local.sizes()) {
                assert!(l > 0 && g % l == 0, "local size {l} does not divide global size {g}");
            }
        }

        let kernel = invocation.kernel();
        let started = Instant::now();
        match self.launch(kernel, invocation.args(), global, local) {
            Ok(()) => {
                if let Some(profile) = &self.profiling {
                    let elapsed = started.elapsed();
                    let mut profile = profile.lock();
                    let entry = profile.entry(kernel.name().to_string()).or_default();
                    entry.invocations += 1;
                    entry.total += elapsed;
                }
            }
            Err(err) => self.device.error(err),
        }
    }

    fn launch(&self, kernel: &Kernel, args: &[KernelArg<'_>], global: NdRange, local: Option<NdRange>) -> Result<()> {
        let handle = kernel.handle().ok_or_else(|| DeviceError::Enqueue {
            kernel: kernel.name().to_string(),
            message: "kernel is unusable".to_string(),
        })?;
        let context = self.device.context().ok_or(DeviceError::Unusable("command queue"))?;
        match (context, handle) {
            (Context::Host(pool), KernelHandle::Host(entry)) => {
                cpu::launch(pool, *entry, kernel.name(), args, global, local)
            }
            #[cfg(feature = "wgpu")]
            (Context::Wgpu(ctx), KernelHandle::Wgpu(wgpu_kernel)) => {
                ctx.launch(wgpu_kernel, args, global, self.profiling.is_some())
            }
            #[cfg(feature = "wgpu")]
            _ => Err(DeviceError::Enqueue {
                kernel: kernel.name().to_string(),
                message: "kernel was built for another backend".to_string(),
            }),
        }
    }

    pub fn enqueue_1d(&self, invocation: &KernelInvocation<'_>, global: usize) {
        self.enqueue(invocation, global, None);
    }

    pub fn enqueue_2d(&self, invocation: &KernelInvocation<'_>, global: Range2D, local: Option<Range2D>) {
        self.enqueue(invocation, global, local.map(NdRange::from));
    }

    pub fn enqueue_3d(&self, invocation: &KernelInvocation<'_>, global: Range3D, local: Option<Range3D>) {
        self.enqueue(invocation, global, local.map(NdRange::from));
    }

    /// Repeats `pattern` over `size` bytes starting at `dest`.
    ///
    /// # Panics
    ///
    /// If the region runs past the buffer or `size` is not a multiple of the
    /// pattern length.
    pub fn fill<'s>(&self, dest: impl Into<StorageRef<'s>>, size: usize, pattern: &[u8]) {
        let dest = dest.into();
        assert!(!pattern.is_empty(), "empty fill pattern");
        assert!(size <= dest.remaining(), "fill of {size} bytes overruns the buffer");
        assert_eq!(size % pattern.len(), 0, "fill size is not a multiple of the pattern");
        if size == 0 {
            return;
        }
        let result = self.buffer(dest).and_then(|buffer| match buffer {
            Buffer::Host(host) => {
                host.fill(dest.offset(), size, pattern);
                Ok(())
            }
            #[cfg(feature = "wgpu")]
            Buffer::Wgpu(gpu) => self.wgpu()?.fill(gpu, dest.offset(), size, pattern),
        });
        self.report(result);
    }

    /// Copies `size` bytes from `src` to `dest`. The regions may belong to the
    /// same buffer but must not overlap.
    ///
    /// # Panics
    ///
    /// If either region runs past its buffer.
    pub fn copy<'s, 'd>(&self, src: impl Into<StorageRef<'s>>, dest: impl Into<StorageRef<'d>>, size: usize) {
        let (src, dest) = (src.into(), dest.into());
        assert!(size <= src.remaining(), "copy of {size} bytes overruns the source");
        assert!(size <= dest.remaining(), "copy of {size} bytes overruns the destination");
        if size == 0 {
            return;
        }
        let result = self.buffer(src).and_then(|from| {
            let to = self.buffer(dest)?;
            match (from, to) {
                (Buffer::Host(from), Buffer::Host(to)) => {
                    cpu::copy(from, src.offset(), to, dest.offset(), size);
                    Ok(())
                }
                #[cfg(feature = "wgpu")]
                (Buffer::Wgpu(from), Buffer::Wgpu(to)) => {
                    self.wgpu()?.copy(from, src.offset(), to, dest.offset(), size)
                }
                #[cfg(feature = "wgpu")]
                _ => Err(DeviceError::Transfer("buffers belong to different backends".to_string())),
            }
        });
        self.report(result);
    }

    /// Reads `out.len()` bytes starting at `src`, waiting for every command
    /// issued before.
    ///
    /// # Panics
    ///
    /// If the region runs past the buffer.
    pub fn blocking_read<'s>(&self, src: impl Into<StorageRef<'s>>, out: &mut [u8]) {
        let src = src.into();
        assert!(out.len() <= src.remaining(), "read of {} bytes overruns the buffer", out.len());
        if out.is_empty() {
            return;
        }
        let result = self.buffer(src).and_then(|buffer| match buffer {
            Buffer::Host(host) => {
                host.read_bytes(src.offset(), out);
                Ok(())
            }
            #[cfg(feature = "wgpu")]
            Buffer::Wgpu(gpu) => self.wgpu()?.read(gpu, src.offset(), out),
        });
        self.report(result);
    }

    /// Writes `data` starting at `dest`.
    ///
    /// # Panics
    ///
    /// If the region runs past the buffer.
    pub fn blocking_write<'d>(&self, dest: impl Into<StorageRef<'d>>, data: &[u8]) {
        let dest = dest.into();
        assert!(data.len() <= dest.remaining(), "write of {} bytes overruns the buffer", data.len());
        if data.is_empty() {
            return;
        }
        let result = self.buffer(dest).and_then(|buffer| match buffer {
            Buffer::Host(host) => {
                host.write_bytes(dest.offset(), data);
                Ok(())
            }
            #[cfg(feature = "wgpu")]
            Buffer::Wgpu(gpu) => self.wgpu()?.write(gpu, dest.offset(), data),
        });
        self.report(result);
    }

    /// Blocks until every issued command has completed.
    pub fn finish(&self) {
        #[cfg(feature = "wgpu")]
        if let Some(Context::Wgpu(ctx)) = self.device.context() {
            let result = ctx.finish();
            self.report(result);
        }
    }

    /// Hands every issued command to the device without waiting.
    pub fn flush(&self) {
        #[cfg(feature = "wgpu")]
        if let Some(Context::Wgpu(ctx)) = self.device.context() {
            ctx.flush();
        }
    }

    /// Per-kernel statistics, sorted by kernel name. Empty unless profiling.
    #[must_use]
    pub fn profile(&self) -> Vec<(String, ProfileEntry)> {
        let mut entries: Vec<_> = self
            .profiling
            .as_ref()
            .map(|p| p.lock().iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Total time spent in profiled launches.
    #[must_use]
    pub fn profiled_time(&self) -> Duration {
        self.profiling
            .as_ref()
            .map(|p| p.lock().values().map(|e| e.total).sum())
            .unwrap_or_default()
    }

    pub fn reset_profile(&self) {
        if let Some(profile) = &self.profiling {
            profile.lock().clear();
        }
    }

    fn buffer<'s>(&self, at: StorageRef<'s>) -> Result<&'s Buffer> {
        at.storage()
            .buffer()
            .map(|buffer| &**buffer)
            .ok_or(DeviceError::Unusable("storage"))
    }

    #[cfg(feature = "wgpu")]
    fn wgpu(&self) -> Result<&crate::ops::wgpu::WgpuContext> {
        match self.device.context() {
            Some(Context::Wgpu(ctx)) => Ok(ctx),
            _ => Err(DeviceError::Transfer("buffer belongs to another backend".to_string())),
        }
    }

    fn report(&self, result: Result<()>) {
        if let Err(err) = result {
            self.device.error(err);
        }
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("device", &self.device)
            .field("profiling", &self.is_profiling())
            .finish()
    }
}
