//! Tensor operations.
//!
//! Every operation checks its shape and type preconditions with assertions,
//! binds its arguments to one of the device's cached [`TensorKernels`] and
//! enqueues a launch on the given queue. Destination and source may be the
//! same vector wherever the `_assign` form exists.
//!
//! # Launch geometry
//!
//! Matrix-vector products split the contraction (column) dimension into
//! `parts` and group `rows_per_workgroup` rows per workgroup. Without an
//! explicit [`Range2D`] hint, see [`default_geometry`]. When every part holds
//! a multiple of four columns the four-wide kernel variant is launched; both
//! variants produce identical results.

use super::device::Device;
use super::matrix::Matrix;
use super::program::{Kernel, LocalMemory};
use super::range::{Range2D, Range3D};
use super::vector::Vector;
use super::{CommandQueue, ValueType};

/// Workgroup row counts tried, in order of preference.
pub const ROWS_PER_WORKGROUP_CANDIDATES: [usize; 9] = [32, 16, 10, 8, 7, 5, 4, 3, 1];

/// Column part counts tried, in order of preference.
pub const PART_CANDIDATES: [usize; 6] = [32, 16, 8, 4, 2, 1];

/// The kernels behind the tensor operations, created once per device.
#[derive(Debug, Clone)]
pub struct TensorKernels {
    pub fill: Kernel,
    pub constant_mul: Kernel,
    pub constant_div: Kernel,
    pub element_add: Kernel,
    pub element_add_parallel: Kernel,
    pub element_sub: Kernel,
    pub element_mul: Kernel,
    pub partial_sum: Kernel,
    pub matrix_identity: Kernel,
    pub matrix_vector_mul: Kernel,
    pub matrix_vector_mul4: Kernel,
    pub matrix_vector_mul_parallel: Kernel,
    pub matrix_vector_mul4_parallel: Kernel,
    pub transpose_matrix_vector_mul_parallel: Kernel,
    pub partial_true_count: Kernel,
}

impl TensorKernels {
    pub fn new(device: &Device) -> Self {
        let generic = device.program("generic");
        let fixed = device.program("fixed");
        Self {
            fill: generic.kernel("fill"),
            constant_mul: generic.kernel("constantMul"),
            constant_div: generic.kernel("constantDiv"),
            element_add: generic.kernel("elementAdd"),
            element_add_parallel: generic.kernel("elementAddParallel"),
            element_sub: generic.kernel("elementSub"),
            element_mul: generic.kernel("elementMul"),
            partial_sum: generic.kernel("partialSum"),
            matrix_identity: generic.kernel("matrixIdentity"),
            matrix_vector_mul: generic.kernel("matrixVectorMul"),
            matrix_vector_mul4: generic.kernel("matrixVectorMul4"),
            matrix_vector_mul_parallel: generic.kernel("matrixVectorMulParallel"),
            matrix_vector_mul4_parallel: generic.kernel("matrixVectorMul4Parallel"),
            transpose_matrix_vector_mul_parallel: generic.kernel("transposeMatrixVectorMulParallel"),
            partial_true_count: fixed.kernel("partialTrueCount"),
        }
    }
}

fn kernels(v: &Vector) -> &TensorKernels {
    v.device().tensor_kernels()
}

fn assert_float(v: &Vector) {
    assert_eq!(v.value_type(), ValueType::Float, "expected a float vector, got {}", v.value_type());
}

fn binary(queue: &CommandQueue, kernel: &Kernel, dest: &Vector, x: &Vector, y: &Vector) {
    assert_float(x);
    assert!(
        dest.value_type() == x.value_type() && y.value_type() == x.value_type(),
        "operand types differ"
    );
    assert!(
        dest.len() == x.len() && y.len() == x.len(),
        "operand lengths differ: {} {} {}",
        dest.len(),
        x.len(),
        y.len()
    );
    queue.enqueue_1d(&kernel.invoke().arg(x).arg(y).arg(dest), x.len());
}

fn scalar(queue: &CommandQueue, kernel: &Kernel, dest: &Vector, x: &Vector, k: f32) {
    assert_float(x);
    assert_eq!(dest.value_type(), x.value_type(), "operand types differ");
    assert_eq!(dest.len(), x.len(), "operand lengths differ");
    queue.enqueue_1d(&kernel.invoke().arg(x).arg(k).arg(dest), x.len());
}

/// `dest = x + y`
pub fn add(queue: &CommandQueue, dest: &Vector, x: &Vector, y: &Vector) {
    binary(queue, &kernels(dest).element_add, dest, x, y);
}

/// `x += y`
pub fn add_assign(queue: &CommandQueue, x: &Vector, y: &Vector) {
    binary(queue, &kernels(x).element_add, x, x, y);
}

/// `dest = x - y`
pub fn sub(queue: &CommandQueue, dest: &Vector, x: &Vector, y: &Vector) {
    binary(queue, &kernels(dest).element_sub, dest, x, y);
}

/// `x -= y`
pub fn sub_assign(queue: &CommandQueue, x: &Vector, y: &Vector) {
    binary(queue, &kernels(x).element_sub, x, x, y);
}

/// `dest = x * k`
pub fn mul(queue: &CommandQueue, dest: &Vector, x: &Vector, k: f32) {
    scalar(queue, &kernels(dest).constant_mul, dest, x, k);
}

/// `x *= k`
pub fn mul_assign(queue: &CommandQueue, x: &Vector, k: f32) {
    scalar(queue, &kernels(x).constant_mul, x, x, k);
}

/// `dest = x / k`
pub fn div(queue: &CommandQueue, dest: &Vector, x: &Vector, k: f32) {
    scalar(queue, &kernels(dest).constant_div, dest, x, k);
}

/// `x /= k`
pub fn div_assign(queue: &CommandQueue, x: &Vector, k: f32) {
    scalar(queue, &kernels(x).constant_div, x, x, k);
}

/// `dest = x .* y`
pub fn elementwise_mul(queue: &CommandQueue, dest: &Vector, x: &Vector, y: &Vector) {
    binary(queue, &kernels(dest).element_mul, dest, x, y);
}

/// `x = x .* y`
pub fn elementwise_mul_assign(queue: &CommandQueue, x: &Vector, y: &Vector) {
    binary(queue, &kernels(x).element_mul, x, x, y);
}

/// Broadcast add over stacked vectors: `dest[v] = x + y[v]` for each of the
/// `dest.len() / x.len()` vectors stacked in `y` and `dest`.
///
/// # Panics
///
/// If `dest` and `y` differ in length, `dest` is not a whole number of `x`s,
/// or the types are not all float.
pub fn parallel_add(queue: &CommandQueue, dest: &Vector, x: &Vector, y: &Vector) {
    assert!(!x.is_empty(), "broadcast of an empty vector");
    let vector_count = dest.len() / x.len();
    if vector_count == 1 {
        return add(queue, dest, x, y);
    }
    assert_float(x);
    assert!(
        dest.value_type() == x.value_type() && y.value_type() == x.value_type(),
        "operand types differ"
    );
    assert_eq!(dest.len(), y.len(), "operand lengths differ");
    assert_eq!(dest.len() % x.len(), 0, "{} is not a multiple of {}", dest.len(), x.len());
    let kernel = &kernels(dest).element_add_parallel;
    queue.enqueue_2d(
        &kernel.invoke().arg(x).arg(y).arg(dest),
        Range2D::new([vector_count, x.len()]),
        None,
    );
}

/// Size of each of `parts` contiguous parts covering `len` elements; the last
/// part may be shorter.
fn part_size(len: usize, parts: usize) -> usize {
    len.div_ceil(parts)
}

/// Sums `x` in `dest.len()` contiguous parts.
///
/// # Example
///
/// ```
/// use nnfit::core::{partial_sum, CommandQueue, Device, Vector};
///
/// let device = Device::host();
/// let queue = CommandQueue::new(&device);
/// let x = Vector::from_slice(&device, &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
/// let sums = Vector::zeroed(&device, 4);
/// partial_sum(&queue, &sums, &x);
/// assert_eq!(sums.read::<f32>(&queue), vec![6.0, 15.0, 24.0, 10.0]);
/// ```
pub fn partial_sum(queue: &CommandQueue, dest: &Vector, x: &Vector) {
    assert_float(x);
    assert_eq!(dest.value_type(), x.value_type(), "operand types differ");
    assert!(!dest.is_empty(), "partial sum into an empty vector");
    let parts = dest.len();
    let kernel = &kernels(x).partial_sum;
    queue.enqueue_1d(
        &kernel
            .invoke()
            .arg(x)
            .arg(x.len())
            .arg(part_size(x.len(), parts))
            .arg(dest),
        parts,
    );
}

/// Counts the non-zero bytes of `x` in `dest.len()` contiguous parts.
///
/// # Panics
///
/// Unless `x` is uint8 and `dest` uint32.
pub fn partial_true_count(queue: &CommandQueue, dest: &Vector, x: &Vector) {
    assert_eq!(x.value_type(), ValueType::Uint8, "true counts need a uint8 input");
    assert_eq!(dest.value_type(), ValueType::Uint32, "true counts need a uint32 output");
    assert!(!dest.is_empty(), "true count into an empty vector");
    let parts = dest.len();
    let kernel = &kernels(x).partial_true_count;
    queue.enqueue_1d(
        &kernel
            .invoke()
            .arg(x)
            .arg(x.len())
            .arg(part_size(x.len(), parts))
            .arg(dest),
        parts,
    );
}

/// Default number of column parts: the largest power of two up to 32 that
/// divides `columns`, for more than eight columns, else 1.
#[must_use]
pub fn select_parts(columns: usize) -> usize {
    if columns > 8 {
        for parts in [32, 16, 8, 4, 2] {
            if columns % parts == 0 {
                return parts;
            }
        }
    }
    1
}

/// Default workgroup row count: the first candidate dividing `rows`.
#[must_use]
pub fn select_rows_per_workgroup(rows: usize) -> usize {
    ROWS_PER_WORKGROUP_CANDIDATES
        .into_iter()
        .find(|&r| rows % r == 0)
        .unwrap_or(1)
}

/// Launch geometry `(rows_per_workgroup, parts)` chosen for `m` when no hint
/// is given.
#[must_use]
pub fn default_geometry(m: &Matrix) -> Range2D {
    Range2D::geometry(select_rows_per_workgroup(m.rows()), select_parts(m.columns()))
}

fn resolve_geometry(m: &Matrix, geometry: Range2D) -> (usize, usize) {
    let geometry = if geometry[1] == 0 {
        default_geometry(m)
    } else {
        geometry
    };
    let (rows_per_workgroup, parts) = (geometry[0], geometry[1]);
    assert!(
        rows_per_workgroup > 0 && m.rows() % rows_per_workgroup == 0,
        "{rows_per_workgroup} rows per workgroup do not divide {} rows",
        m.rows()
    );
    assert!(PART_CANDIDATES.contains(&parts), "{parts} is not a supported part count");
    assert_eq!(m.columns() % parts, 0, "{parts} parts do not divide {} columns", m.columns());
    (rows_per_workgroup, parts)
}

/// `dest = m v`.
///
/// `geometry` is a `(rows_per_workgroup, parts)` hint; the default range picks
/// one with [`default_geometry`].
///
/// # Panics
///
/// If the shapes do not line up or the geometry does not divide the matrix.
pub fn mvmul(queue: &CommandQueue, dest: &Vector, m: &Matrix, v: &Vector, geometry: Range2D) {
    assert!(
        m.value_type() == v.value_type() && m.value_type() == dest.value_type(),
        "operand types differ"
    );
    assert_eq!(m.columns(), v.len(), "{} columns times a vector of {}", m.columns(), v.len());
    assert_eq!(m.rows(), dest.len(), "{} rows into a vector of {}", m.rows(), dest.len());
    let (rows_per_workgroup, parts) = resolve_geometry(m, geometry);
    let part_size = m.columns() / parts;
    let local = LocalMemory(parts * rows_per_workgroup * m.value_type().size());
    let global = Range2D::new([m.rows(), parts]);
    let local_range = Some(Range2D::new([rows_per_workgroup, parts]));

    let kernels = kernels(m);
    if part_size % 4 == 0 {
        let invocation = kernels
            .matrix_vector_mul4
            .invoke()
            .arg(m)
            .arg(v)
            .arg(m.columns() / 4)
            .arg(part_size / 4)
            .arg(dest)
            .arg(local);
        queue.enqueue_2d(&invocation, global, local_range);
    } else {
        let invocation = kernels
            .matrix_vector_mul
            .invoke()
            .arg(m)
            .arg(v)
            .arg(m.columns())
            .arg(part_size)
            .arg(dest)
            .arg(local);
        queue.enqueue_2d(&invocation, global, local_range);
    }
}

/// `dest[k] = m v[k]` for every vector stacked in `v`.
///
/// # Panics
///
/// If `v` is not a whole number of `m.columns()` vectors or `dest` does not
/// hold as many `m.rows()` results.
pub fn parallel_mvmul(queue: &CommandQueue, dest: &Vector, m: &Matrix, v: &Vector, geometry: Range2D) {
    assert!(m.columns() > 0, "product with an empty matrix");
    let vector_count = v.len() / m.columns();
    if vector_count == 1 {
        return mvmul(queue, dest, m, v, geometry);
    }
    assert!(
        m.value_type() == v.value_type() && m.value_type() == dest.value_type(),
        "operand types differ"
    );
    assert_eq!(v.len() % m.columns(), 0, "input is not a whole number of {}-vectors", m.columns());
    assert_eq!(dest.len() % m.rows(), 0, "output is not a whole number of {}-vectors", m.rows());
    assert_eq!(vector_count, dest.len() / m.rows(), "input and output vector counts differ");
    let (rows_per_workgroup, parts) = resolve_geometry(m, geometry);
    let part_size = m.columns() / parts;
    let local = LocalMemory(parts * rows_per_workgroup * m.value_type().size());
    let global = Range3D::new([vector_count, m.rows(), parts]);
    let local_range = Some(Range3D::new([1, rows_per_workgroup, parts]));

    let kernels = kernels(m);
    let invocation = if part_size % 4 == 0 {
        kernels
            .matrix_vector_mul4_parallel
            .invoke()
            .arg(m)
            .arg(v)
            .arg(m.columns() / 4)
            .arg(part_size / 4)
            .arg(dest)
            .arg(local)
    } else {
        kernels
            .matrix_vector_mul_parallel
            .invoke()
            .arg(m)
            .arg(v)
            .arg(m.columns())
            .arg(part_size)
            .arg(dest)
            .arg(local)
    };
    queue.enqueue_3d(&invocation, global, local_range);
}

/// `dest[k] = m^T v[k]` for `vector_count` stacked vectors.
///
/// # Panics
///
/// If `dest` does not hold `vector_count * m.columns()` elements or `v`
/// does not hold `vector_count * m.rows()`.
pub fn transpose_mvmul(queue: &CommandQueue, dest: &Vector, m: &Matrix, v: &Vector, vector_count: usize) {
    assert_eq!(m.columns() * vector_count, dest.len(), "transposed product output size");
    assert_eq!(m.rows() * vector_count, v.len(), "transposed product input size");
    let kernel = &kernels(m).transpose_matrix_vector_mul_parallel;
    queue.enqueue_2d(
        &kernel.invoke().arg(m).arg(v).arg(m.rows()).arg(dest),
        Range2D::new([vector_count, m.columns()]),
        None,
    );
}
