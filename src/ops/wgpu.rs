//! GPU compute backend using WGPU.
//!
//! Every kernel is one WGSL compute shader with a `main` entry point, loaded
//! with `include_str!`, checked through `briny`'s [`Validate`] and compiled
//! once per device when its program is first requested.
//!
//! # Binding Convention
//!
//! - buffer arguments are bound in argument order at bindings `0..n`, all as
//!   `var<storage, read_write>`; local-memory arguments are skipped
//! - binding `n` is a read-only `array<u32>` holding the three global sizes
//!   followed by the scalar arguments in order, floats as their bit pattern
//! - shaders run 64 invocations per workgroup and flatten the global range
//!   row-major, last dimension fastest
//!
//! uint8 and uint16 vectors are addressed as packed 32-bit words.
//!
//! # Notes
//!
//! - every command is submitted as soon as it is issued
//! - profiled launches wait for the device before returning
//! - transfers that are not 4-byte aligned go through a read-modify-write of
//!   the surrounding words
//! - matrix-vector shaders sum each of a row's `parts` in its own invocation
//!   and reduce them through workgroup memory in part order; the
//!   `rows_per_workgroup` hint is not applied since every workgroup has 64
//!   invocations

use std::collections::HashMap;
use std::sync::mpsc;

use briny::prelude::*;
use wgpu::util::DeviceExt;

use crate::core::{DeviceKind, KernelArg, NdRange};
use crate::error::{DeviceError, Result};

/// Invocations per workgroup, matching `@workgroup_size` in every shader.
const WORKGROUP_SIZE: usize = 64;

/// Largest workgroup count along one dispatch dimension.
const MAX_GROUPS_PER_DIMENSION: usize = 65_535;

/// `(program, entry point, source)` for every shader.
const SHADERS: &[(&str, &str, &str)] = &[
    ("generic", "fill", include_str!("shaders/generic/fill.wgsl")),
    ("generic", "constantMul", include_str!("shaders/generic/constant_mul.wgsl")),
    ("generic", "constantDiv", include_str!("shaders/generic/constant_div.wgsl")),
    ("generic", "elementAdd", include_str!("shaders/generic/element_add.wgsl")),
    ("generic", "elementAddParallel", include_str!("shaders/generic/element_add_parallel.wgsl")),
    ("generic", "elementSub", include_str!("shaders/generic/element_sub.wgsl")),
    ("generic", "elementMul", include_str!("shaders/generic/element_mul.wgsl")),
    ("generic", "partialSum", include_str!("shaders/generic/partial_sum.wgsl")),
    ("generic", "matrixIdentity", include_str!("shaders/generic/matrix_identity.wgsl")),
    ("generic", "matrixVectorMul", include_str!("shaders/generic/matrix_vector_mul.wgsl")),
    ("generic", "matrixVectorMul4", include_str!("shaders/generic/matrix_vector_mul4.wgsl")),
    (
        "generic",
        "matrixVectorMulParallel",
        include_str!("shaders/generic/matrix_vector_mul_parallel.wgsl"),
    ),
    (
        "generic",
        "matrixVectorMul4Parallel",
        include_str!("shaders/generic/matrix_vector_mul4_parallel.wgsl"),
    ),
    (
        "generic",
        "transposeMatrixVectorMulParallel",
        include_str!("shaders/generic/transpose_matrix_vector_mul_parallel.wgsl"),
    ),
    ("fixed", "partialTrueCount", include_str!("shaders/fixed/partial_true_count.wgsl")),
    ("nn", "sigmoidPredict", include_str!("shaders/nn/sigmoid_predict.wgsl")),
    ("nn", "sigmoidFeedforward", include_str!("shaders/nn/sigmoid_feedforward.wgsl")),
    ("nn", "tanhPredict", include_str!("shaders/nn/tanh_predict.wgsl")),
    ("nn", "tanhFeedforward", include_str!("shaders/nn/tanh_feedforward.wgsl")),
    ("nn", "reluPredict", include_str!("shaders/nn/relu_predict.wgsl")),
    ("nn", "reluFeedforward", include_str!("shaders/nn/relu_feedforward.wgsl")),
    ("nn", "meanSquaredError", include_str!("shaders/nn/mean_squared_error.wgsl")),
    ("nn", "crossEntropyError", include_str!("shaders/nn/cross_entropy_error.wgsl")),
    ("nn", "computeMSELayerError", include_str!("shaders/nn/mse_layer_error.wgsl")),
    (
        "nn",
        "computeCrossEntropyLayerError",
        include_str!("shaders/nn/cross_entropy_layer_error.wgsl"),
    ),
    ("nn", "computeWeightGradient", include_str!("shaders/nn/weight_gradient.wgsl")),
    ("nn", "computeBiasGradient", include_str!("shaders/nn/bias_gradient.wgsl")),
    ("nn", "evaluateClassification", include_str!("shaders/nn/evaluate_classification.wgsl")),
    ("optimizers", "gradientDescent", include_str!("shaders/optimizers/gradient_descent.wgsl")),
    ("optimizers", "momentum", include_str!("shaders/optimizers/momentum.wgsl")),
    ("random", "uniformRandom", include_str!("shaders/random/uniform_random.wgsl")),
    ("random", "invertedDropout", include_str!("shaders/random/inverted_dropout.wgsl")),
];

lazy_static::lazy_static! {
    static ref INSTANCE: wgpu::Instance = wgpu::Instance::default();
}

/// Secure wrapper for WGSL source code.
pub struct WgslSource<'a>(pub &'a str);

impl Validate for WgslSource<'_> {
    fn validate(&self) -> core::result::Result<(), ValidationError> {
        let src = self.0;

        if src.len() > 65536 {
            return Err(ValidationError);
        }

        if !src.contains("fn main") {
            return Err(ValidationError);
        }

        if src.contains("import") || src.contains("#include") {
            return Err(ValidationError);
        }

        let forbidden = ["asm", "unsafe", "ptr", "std::"];
        if forbidden.iter().any(|bad| src.contains(bad)) {
            return Err(ValidationError);
        }

        Ok(())
    }
}

/// Every adapter the default instance can see.
pub(crate) fn enumerate_adapters() -> Vec<WgpuAdapter> {
    INSTANCE
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|adapter| WgpuAdapter {
            info: adapter.get_info(),
            limits: adapter.limits(),
            adapter,
        })
        .collect()
}

/// A physical adapter, before a device has been opened on it.
pub(crate) struct WgpuAdapter {
    adapter: wgpu::Adapter,
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
}

impl WgpuAdapter {
    pub fn kind(&self) -> DeviceKind {
        match self.info.device_type {
            wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::VirtualGpu => {
                DeviceKind::Gpu
            }
            wgpu::DeviceType::Cpu => DeviceKind::Cpu,
            wgpu::DeviceType::Other => DeviceKind::Other,
        }
    }

    pub fn name(&self) -> String {
        self.info.name.clone()
    }

    pub fn vendor(&self) -> String {
        if self.info.driver.is_empty() {
            format!("{:#06x}", self.info.vendor)
        } else {
            self.info.driver.clone()
        }
    }

    pub fn version(&self) -> String {
        format!("{:?} {}", self.info.backend, self.info.driver_info)
    }

    pub fn max_threads_per_workgroup(&self) -> usize {
        self.limits.max_compute_invocations_per_workgroup as usize
    }

    /// Opens a logical device and its queue.
    pub fn create_context(&self) -> Result<WgpuContext> {
        let (device, queue) = pollster::block_on(self.adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("nnfit"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|e| DeviceError::Context(e.to_string()))?;
        tracing::info!(adapter = %self.info.name, backend = ?self.info.backend, "wgpu device opened");
        Ok(WgpuContext { device, queue })
    }
}

/// A device buffer. The allocation is rounded up to whole 32-bit words.
#[derive(Debug)]
pub(crate) struct WgpuBuffer {
    buffer: wgpu::Buffer,
    size: usize,
}

impl WgpuBuffer {
    /// Allocated size in bytes, a multiple of four.
    fn allocated(&self) -> usize {
        self.buffer.size() as usize
    }
}

/// The compiled shader modules of one program.
pub(crate) struct WgpuProgram {
    name: String,
    modules: HashMap<&'static str, wgpu::ShaderModule>,
}

/// A compute pipeline and the layout of its only bind group.
pub(crate) struct WgpuKernel {
    name: String,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Holds the WGPU device and queue of one [`Device`](crate::core::Device).
pub(crate) struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

fn round_up_to_word(size: usize) -> usize {
    size.div_ceil(4) * 4
}

impl WgpuContext {
    /// Pops the innermost error scope, turning a captured error into `err`.
    fn pop_scope(&self, err: impl FnOnce(String) -> DeviceError) -> Result<()> {
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(e) => Err(err(e.to_string())),
            None => Ok(()),
        }
    }

    pub fn create_buffer(&self, size: usize, data: Option<&[u8]>) -> Result<WgpuBuffer> {
        let allocated = round_up_to_word(size).max(4);
        if allocated as u64 > self.device.limits().max_buffer_size {
            return Err(DeviceError::Allocation {
                size,
                message: "exceeds the device buffer size limit".to_string(),
            });
        }
        let usage = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST;
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = match data {
            Some(data) => {
                let mut contents = data.to_vec();
                contents.resize(allocated, 0);
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: None,
                    contents: &contents,
                    usage,
                })
            }
            None => self.device.create_buffer(&wgpu::BufferDescriptor {
                label: None,
                size: allocated as u64,
                usage,
                mapped_at_creation: false,
            }),
        };
        self.pop_scope(|message| DeviceError::Allocation { size, message })?;
        Ok(WgpuBuffer { buffer, size })
    }

    /// Validates and compiles every shader of program `name`.
    pub fn build_program(&self, name: &str) -> Result<WgpuProgram> {
        let build_error = |message: String| DeviceError::ProgramBuild {
            program: name.to_string(),
            message,
        };
        let mut modules = HashMap::new();
        for &(_, entry, source) in SHADERS.iter().filter(|(program, _, _)| *program == name) {
            WgslSource(source)
                .validate()
                .map_err(|e| build_error(format!("shader `{entry}` failed validation: {e}")))?;
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(entry),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            self.pop_scope(|message| build_error(format!("shader `{entry}`: {message}")))?;
            modules.insert(entry, module);
        }
        if modules.is_empty() {
            return Err(build_error("no shaders with this program name".to_string()));
        }
        Ok(WgpuProgram {
            name: name.to_string(),
            modules,
        })
    }

    pub fn create_kernel(&self, program: &WgpuProgram, entry: &str) -> Result<WgpuKernel> {
        let module = program.modules.get(entry).ok_or_else(|| DeviceError::KernelNotFound {
            program: program.name.clone(),
            kernel: entry.to_string(),
        })?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(entry),
            layout: None,
            module,
            entry_point: Some("main"),
            cache: None,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });
        let layout = pipeline.get_bind_group_layout(0);
        self.pop_scope(|message| DeviceError::ProgramBuild {
            program: program.name.clone(),
            message: format!("pipeline `{entry}`: {message}"),
        })?;
        Ok(WgpuKernel {
            name: entry.to_string(),
            pipeline,
            layout,
        })
    }

    /// Binds `args` and dispatches enough workgroups to cover `global`.
    pub fn launch(&self, kernel: &WgpuKernel, args: &[KernelArg<'_>], global: NdRange, wait: bool) -> Result<()> {
        let enqueue_error = |message: String| DeviceError::Enqueue {
            kernel: kernel.name.clone(),
            message,
        };
        let sizes = global.sizes();
        let mut params = Vec::with_capacity(3 + args.len());
        for size in sizes {
            params.push(u32::try_from(size).map_err(|_| enqueue_error(format!("global size {size} exceeds 32 bits")))?);
        }
        let mut buffers = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            match arg {
                KernelArg::Buffer(storage) => {
                    let buffer = storage
                        .buffer()
                        .ok_or(DeviceError::Unusable("storage"))?
                        .as_wgpu()
                        .ok_or_else(|| DeviceError::Argument {
                            kernel: kernel.name.clone(),
                            index,
                            message: "buffer belongs to another backend".to_string(),
                        })?;
                    buffers.push(buffer);
                }
                KernelArg::Float(v) => params.push(v.to_bits()),
                KernelArg::Uint(v) => params.push(*v),
                KernelArg::Local(_) => {}
            }
        }

        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::cast_slice(&params),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let mut entries: Vec<_> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.buffer.as_entire_binding(),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: buffers.len() as u32,
            resource: params.as_entire_binding(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&kernel.name),
            layout: &kernel.layout,
            entries: &entries,
        });

        let groups = global.volume().div_ceil(WORKGROUP_SIZE);
        let (x, y) = if groups <= MAX_GROUPS_PER_DIMENSION {
            (groups, 1)
        } else {
            (MAX_GROUPS_PER_DIMENSION, groups.div_ceil(MAX_GROUPS_PER_DIMENSION))
        };
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&kernel.name),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&kernel.name),
                timestamp_writes: None,
            });
            pass.set_pipeline(&kernel.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(x as u32, y as u32, 1);
        }
        self.queue.submit(Some(encoder.finish()));
        self.pop_scope(enqueue_error)?;

        if wait {
            self.wait()?;
        }
        Ok(())
    }

    fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| DeviceError::Queue(e.to_string()))
    }

    /// Reads `out.len()` bytes starting at `offset`.
    pub fn read(&self, buffer: &WgpuBuffer, offset: usize, out: &mut [u8]) -> Result<()> {
        let start = offset & !3;
        let end = round_up_to_word(offset + out.len()).min(buffer.allocated());
        let words = self.read_span(buffer, start, end - start)?;
        out.copy_from_slice(&words[offset - start..offset - start + out.len()]);
        Ok(())
    }

    /// Copies an aligned span into a mappable staging buffer and maps it.
    fn read_span(&self, buffer: &WgpuBuffer, start: usize, len: usize) -> Result<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: len as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("read"),
        });
        encoder.copy_buffer_to_buffer(&buffer.buffer, start as u64, &staging, 0, len as u64);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.wait()?;
        receiver
            .recv()
            .map_err(|e| DeviceError::Transfer(e.to_string()))?
            .map_err(|e| DeviceError::Transfer(e.to_string()))?;
        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    /// Writes `data` starting at `offset`.
    pub fn write(&self, buffer: &WgpuBuffer, offset: usize, data: &[u8]) -> Result<()> {
        if offset % 4 == 0 && data.len() % 4 == 0 {
            self.queue.write_buffer(&buffer.buffer, offset as u64, data);
            return Ok(());
        }
        let start = offset & !3;
        let end = round_up_to_word(offset + data.len()).min(buffer.allocated());
        let mut words = self.read_span(buffer, start, end - start)?;
        words[offset - start..offset - start + data.len()].copy_from_slice(data);
        self.queue.write_buffer(&buffer.buffer, start as u64, &words);
        Ok(())
    }

    pub fn copy(&self, src: &WgpuBuffer, src_offset: usize, dest: &WgpuBuffer, dest_offset: usize, size: usize) -> Result<()> {
        let aligned = src_offset % 4 == 0 && dest_offset % 4 == 0 && size % 4 == 0;
        if aligned && src.buffer != dest.buffer {
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy"),
            });
            encoder.copy_buffer_to_buffer(&src.buffer, src_offset as u64, &dest.buffer, dest_offset as u64, size as u64);
            self.queue.submit(Some(encoder.finish()));
            return Ok(());
        }
        let mut staging = vec![0u8; size];
        self.read(src, src_offset, &mut staging)?;
        self.write(dest, dest_offset, &staging)
    }

    pub fn fill(&self, buffer: &WgpuBuffer, offset: usize, size: usize, pattern: &[u8]) -> Result<()> {
        let data: Vec<u8> = pattern.iter().copied().cycle().take(size).collect();
        self.write(buffer, offset, &data)
    }

    pub fn finish(&self) -> Result<()> {
        self.wait()
    }

    pub fn flush(&self) {
        let _ = self.device.poll(wgpu::PollType::Poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shader_passes_validation() {
        for (program, entry, source) in SHADERS {
            assert!(
                WgslSource(source).validate().is_ok(),
                "{program}/{entry} failed validation"
            );
        }
    }

    #[test]
    fn every_host_kernel_has_a_shader() {
        for program in ["generic", "fixed", "nn", "optimizers", "random"] {
            let count = SHADERS.iter().filter(|(p, _, _)| *p == program).count();
            assert!(count > 0, "no shaders for {program}");
        }
    }

    #[test]
    fn words_round_up() {
        assert_eq!(round_up_to_word(0), 0);
        assert_eq!(round_up_to_word(5), 8);
        assert_eq!(round_up_to_word(8), 8);
    }
}
