//! Host compute backend.
//!
//! Buffers live in host memory and kernels are plain Rust functions, looked up
//! by entry-point name in per-program tables and run inside the device's
//! [`rayon`](https://docs.rs/rayon) thread pool. Launches execute
//! synchronously, so a host queue is trivially in order and `finish` has
//! nothing to wait for.
//!
//! ## Programs
//!
//! - `generic`: elementwise arithmetic, fills, partial sums and matrix-vector products
//! - `fixed`: fixed-width integer reductions
//! - `nn`: transfer functions, error criteria, gradient accumulation, classification
//! - `optimizers`: weight update rules
//! - `random`: xorshift128 uniform numbers and inverted dropout
//!
//! Entry-point names and argument order are the same contract the WGSL shaders
//! implement, so both backends are interchangeable behind a [`Kernel`](crate::core::Kernel).
//!
//! ## Determinism
//!
//! Every reduction accumulates sequentially in index order. Parallelism is only
//! spread across independent outputs and independent column parts, so results
//! do not depend on the thread count. Matrix-vector products split each row
//! into the launch's `parts` and add the part sums in order, like the shaders.

mod fixed;
mod generic;
mod nn;
mod optimizers;
mod random;

use std::collections::HashMap;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::core::{KernelArg, NdRange};
use crate::error::{DeviceError, Result};

/// A host kernel entry point.
pub(crate) type HostKernelFn = fn(&HostLaunch<'_>) -> Result<()>;

/// One named table of host kernels.
pub(crate) struct HostProgram {
    pub name: &'static str,
    kernels: &'static [(&'static str, HostKernelFn)],
}

impl HostProgram {
    pub fn kernel(&self, name: &str) -> Option<HostKernelFn> {
        self.kernels
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, f)| *f)
    }
}

lazy_static::lazy_static! {
    static ref PROGRAMS: HashMap<&'static str, HostProgram> = {
        let mut programs = HashMap::new();
        for program in [
            HostProgram { name: "generic", kernels: generic::KERNELS },
            HostProgram { name: "fixed", kernels: fixed::KERNELS },
            HostProgram { name: "nn", kernels: nn::KERNELS },
            HostProgram { name: "optimizers", kernels: optimizers::KERNELS },
            HostProgram { name: "random", kernels: random::KERNELS },
        ] {
            programs.insert(program.name, program);
        }
        programs
    };
}

/// Looks up a host program by name.
pub(crate) fn program(name: &str) -> Result<&'static HostProgram> {
    PROGRAMS
        .get(name)
        .ok_or_else(|| DeviceError::ProgramBuild {
            program: name.to_string(),
            message: "no host program with this name".to_string(),
        })
}

/// Host memory behind a [`Storage`](crate::core::Storage).
///
/// Contents are kept as 32-bit words so that every element type can be viewed
/// in place through `bytemuck` without alignment concerns.
#[derive(Debug)]
pub(crate) struct HostBuffer {
    words: Mutex<Vec<u32>>,
    size: usize,
}

impl HostBuffer {
    pub fn new(size: usize, data: Option<&[u8]>) -> Self {
        let mut words = vec![0u32; size.div_ceil(4)];
        if let Some(data) = data {
            bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..data.len()].copy_from_slice(data);
        }
        Self {
            words: Mutex::new(words),
            size,
        }
    }

    /// Size in bytes, as requested at creation.
    pub fn size(&self) -> usize {
        self.size
    }

    /// # Panics
    ///
    /// If the range runs past [`size`](Self::size).
    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        self.check_range(offset, out.len());
        let words = self.words.lock();
        let bytes = bytemuck::cast_slice::<u32, u8>(&words);
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }

    /// # Panics
    ///
    /// If the range runs past [`size`](Self::size).
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        self.check_range(offset, data.len());
        let mut words = self.words.lock();
        let bytes = bytemuck::cast_slice_mut::<u32, u8>(&mut words);
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn fill(&self, offset: usize, size: usize, pattern: &[u8]) {
        self.check_range(offset, size);
        let mut words = self.words.lock();
        let bytes = bytemuck::cast_slice_mut::<u32, u8>(&mut words);
        for (dst, src) in bytes[offset..offset + size]
            .iter_mut()
            .zip(pattern.iter().cycle())
        {
            *dst = *src;
        }
    }

    fn check_range(&self, offset: usize, len: usize) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.size),
            "{len} bytes at offset {offset} overrun a buffer of {}",
            self.size
        );
    }

    /// Copies the first `count` elements out as `T`.
    fn snapshot<T: Pod>(&self, count: usize) -> Option<Vec<T>> {
        let words = self.words.lock();
        bytemuck::cast_slice::<u32, T>(&words)
            .get(..count)
            .map(<[T]>::to_vec)
    }

    /// Runs `f` over the first `count` elements viewed as `T`.
    fn update<T: Pod>(&self, count: usize, f: impl FnOnce(&mut [T])) -> bool {
        let mut words = self.words.lock();
        match bytemuck::cast_slice_mut::<u32, T>(&mut words).get_mut(..count) {
            Some(view) => {
                f(view);
                true
            }
            None => false,
        }
    }
}

/// Copies `size` bytes between two host buffers, which may be the same one.
pub(crate) fn copy(src: &HostBuffer, src_offset: usize, dest: &HostBuffer, dest_offset: usize, size: usize) {
    let mut staging = vec![0u8; size];
    src.read_bytes(src_offset, &mut staging);
    dest.write_bytes(dest_offset, &staging);
}

/// Arguments and index space of one host kernel launch.
pub(crate) struct HostLaunch<'a> {
    kernel: &'a str,
    args: &'a [KernelArg<'a>],
    global: NdRange,
    local: Option<NdRange>,
}

impl HostLaunch<'_> {
    /// Global size along dimension `dim`.
    fn size(&self, dim: usize) -> usize {
        self.global.sizes()[dim]
    }

    /// Work items per workgroup tile, 1 without a local range.
    fn tile(&self) -> usize {
        self.local.map_or(1, |local| local.volume().max(1))
    }

    fn arg_error(&self, index: usize, message: impl Into<String>) -> DeviceError {
        DeviceError::Argument {
            kernel: self.kernel.to_string(),
            index,
            message: message.into(),
        }
    }

    fn buffer(&self, index: usize) -> Result<&HostBuffer> {
        match self.args.get(index) {
            Some(KernelArg::Buffer(storage)) => storage
                .buffer()
                .ok_or(DeviceError::Unusable("storage"))?
                .as_host()
                .ok_or_else(|| self.arg_error(index, "buffer belongs to another backend")),
            _ => Err(self.arg_error(index, "expected a buffer")),
        }
    }

    fn float(&self, index: usize) -> Result<f32> {
        match self.args.get(index) {
            Some(KernelArg::Float(v)) => Ok(*v),
            _ => Err(self.arg_error(index, "expected a float")),
        }
    }

    fn uint(&self, index: usize) -> Result<usize> {
        match self.args.get(index) {
            Some(KernelArg::Uint(v)) => Ok(*v as usize),
            _ => Err(self.arg_error(index, "expected an unsigned integer")),
        }
    }

    /// Reads the first `count` elements of buffer argument `index`.
    fn read<T: Pod>(&self, index: usize, count: usize) -> Result<Vec<T>> {
        self.buffer(index)?
            .snapshot(count)
            .ok_or_else(|| self.arg_error(index, format!("buffer holds fewer than {count} elements")))
    }

    /// Mutates the first `count` elements of buffer argument `index`.
    fn update<T: Pod>(&self, index: usize, count: usize, f: impl FnOnce(&mut [T])) -> Result<()> {
        if self.buffer(index)?.update(count, f) {
            Ok(())
        } else {
            Err(self.arg_error(index, format!("buffer holds fewer than {count} elements")))
        }
    }
}

/// Runs a host kernel over `global` inside the device thread pool.
///
/// A `local` tile is the smallest batch of work items one rayon task takes.
/// Local memory arguments are ignored.
pub(crate) fn launch(
    pool: &rayon::ThreadPool,
    entry: HostKernelFn,
    kernel: &str,
    args: &[KernelArg<'_>],
    global: NdRange,
    local: Option<NdRange>,
) -> Result<()> {
    let launch = HostLaunch {
        kernel,
        args,
        global,
        local,
    };
    pool.install(|| entry(&launch))
}
