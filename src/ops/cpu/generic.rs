//! `generic` program: float arithmetic, reductions and matrix-vector products.

use rayon::prelude::*;

use super::{HostKernelFn, HostLaunch};
use crate::error::Result;

pub(super) const KERNELS: &[(&str, HostKernelFn)] = &[
    ("fill", fill as HostKernelFn),
    ("constantMul", constant_mul as HostKernelFn),
    ("constantDiv", constant_div as HostKernelFn),
    ("elementAdd", element_add as HostKernelFn),
    ("elementAddParallel", element_add_parallel as HostKernelFn),
    ("elementSub", element_sub as HostKernelFn),
    ("elementMul", element_mul as HostKernelFn),
    ("partialSum", partial_sum as HostKernelFn),
    ("matrixIdentity", matrix_identity as HostKernelFn),
    ("matrixVectorMul", matrix_vector_mul as HostKernelFn),
    ("matrixVectorMul4", matrix_vector_mul4 as HostKernelFn),
    ("matrixVectorMulParallel", matrix_vector_mul_parallel as HostKernelFn),
    ("matrixVectorMul4Parallel", matrix_vector_mul4_parallel as HostKernelFn),
    ("transposeMatrixVectorMulParallel", transpose_matrix_vector_mul_parallel as HostKernelFn),
];

/// `fill(x, value)`
fn fill(l: &HostLaunch<'_>) -> Result<()> {
    let n = l.size(0);
    let value = l.float(1)?;
    l.update(0, n, |x: &mut [f32]| x.par_iter_mut().for_each(|v| *v = value))
}

/// `op(x, k, dest)` with a scalar right-hand side.
fn scalar_op(l: &HostLaunch<'_>, op: impl Fn(f32, f32) -> f32 + Sync + Send) -> Result<()> {
    let n = l.size(0);
    let x = l.read::<f32>(0, n)?;
    let k = l.float(1)?;
    l.update(2, n, |dest: &mut [f32]| {
        dest.par_iter_mut()
            .zip(x.par_iter())
            .for_each(|(d, &a)| *d = op(a, k));
    })
}

/// `op(x, y, dest)` elementwise.
fn binary_op(l: &HostLaunch<'_>, op: impl Fn(f32, f32) -> f32 + Sync + Send) -> Result<()> {
    let n = l.size(0);
    let x = l.read::<f32>(0, n)?;
    let y = l.read::<f32>(1, n)?;
    l.update(2, n, |dest: &mut [f32]| {
        dest.par_iter_mut()
            .zip(x.par_iter().zip(y.par_iter()))
            .for_each(|(d, (&a, &b))| *d = op(a, b));
    })
}

fn constant_mul(l: &HostLaunch<'_>) -> Result<()> {
    scalar_op(l, |a, k| a * k)
}

fn constant_div(l: &HostLaunch<'_>) -> Result<()> {
    scalar_op(l, |a, k| a / k)
}

fn element_add(l: &HostLaunch<'_>) -> Result<()> {
    binary_op(l, |a, b| a + b)
}

fn element_sub(l: &HostLaunch<'_>) -> Result<()> {
    binary_op(l, |a, b| a - b)
}

fn element_mul(l: &HostLaunch<'_>) -> Result<()> {
    binary_op(l, |a, b| a * b)
}

/// `elementAddParallel(x, y, dest)` over `(vectors, n)`: `dest[v][i] = x[i] + y[v][i]`.
fn element_add_parallel(l: &HostLaunch<'_>) -> Result<()> {
    let vectors = l.size(0);
    let n = l.size(1);
    let x = l.read::<f32>(0, n)?;
    let y = l.read::<f32>(1, vectors * n)?;
    l.update(2, vectors * n, |dest: &mut [f32]| {
        dest.par_chunks_mut(n)
            .zip(y.par_chunks(n))
            .for_each(|(d, yv)| {
                for ((d, &a), &b) in d.iter_mut().zip(&x).zip(yv) {
                    *d = a + b;
                }
            });
    })
}

/// `partialSum(x, len, partSize, dest)`
fn partial_sum(l: &HostLaunch<'_>) -> Result<()> {
    let parts = l.size(0);
    let len = l.uint(1)?;
    let part_size = l.uint(2)?;
    let x = l.read::<f32>(0, len)?;
    l.update(3, parts, |dest: &mut [f32]| {
        dest.par_iter_mut().enumerate().for_each(|(p, d)| {
            let start = (p * part_size).min(len);
            let end = (start + part_size).min(len);
            *d = x[start..end].iter().fold(0.0, |acc, &v| acc + v);
        });
    })
}

/// `matrixIdentity(m, columns)` over `(rows, columns)`.
fn matrix_identity(l: &HostLaunch<'_>) -> Result<()> {
    let rows = l.size(0);
    let columns = l.uint(1)?;
    l.update(0, rows * columns, |m: &mut [f32]| {
        m.par_chunks_mut(columns).enumerate().for_each(|(r, row)| {
            for (c, v) in row.iter_mut().enumerate() {
                *v = if r == c { 1.0 } else { 0.0 };
            }
        });
    })
}

fn dot(row: &[f32], v: &[f32]) -> f32 {
    let mut acc = 0.0f32;
    for (&a, &b) in row.iter().zip(v) {
        acc += a * b;
    }
    acc
}

/// Four lanes per step, accumulated in the same order as [`dot`] so both
/// paths produce identical bits.
fn dot4(row: &[f32], v: &[f32]) -> f32 {
    let mut acc = 0.0f32;
    for (a, b) in row.chunks_exact(4).zip(v.chunks_exact(4)) {
        acc += a[0] * b[0];
        acc += a[1] * b[1];
        acc += a[2] * b[2];
        acc += a[3] * b[3];
    }
    acc
}

/// Shared body of the matrix-vector kernels.
///
/// `vectors` stacked inputs of `columns` elements produce `vectors` stacked
/// outputs of `rows` elements. Every row is split into `parts` runs of
/// `part_size` columns; the runs are summed independently and then added in
/// part order, the same two-level sum the shaders compute.
fn mvmul(
    l: &HostLaunch<'_>,
    vectors: usize,
    rows: usize,
    parts: usize,
    part_size: usize,
    row_dot: fn(&[f32], &[f32]) -> f32,
) -> Result<()> {
    let columns = parts * part_size;
    let m = l.read::<f32>(0, rows * columns)?;
    let v = l.read::<f32>(1, vectors * columns)?;

    let mut partials = vec![0.0f32; vectors * rows * parts];
    partials
        .par_iter_mut()
        .with_min_len(l.tile())
        .enumerate()
        .for_each(|(i, s)| {
            let (k, r, p) = (i / (rows * parts), (i / parts) % rows, i % parts);
            let start = p * part_size;
            *s = row_dot(
                &m[r * columns + start..r * columns + start + part_size],
                &v[k * columns + start..k * columns + start + part_size],
            );
        });

    l.update(4, vectors * rows, |dest: &mut [f32]| {
        dest.par_iter_mut()
            .zip(partials.par_chunks(parts.max(1)))
            .for_each(|(d, sums)| *d = sums.iter().fold(0.0, |acc, &s| acc + s));
    })
}

/// `matrixVectorMul(m, v, columns, partSize, dest, local)` over `(rows, parts)`.
fn matrix_vector_mul(l: &HostLaunch<'_>) -> Result<()> {
    let part_size = l.uint(3)?;
    mvmul(l, 1, l.size(0), l.size(1), part_size, dot)
}

/// `matrixVectorMul4(m, v, columns / 4, partSize / 4, dest, local)` over `(rows, parts)`.
fn matrix_vector_mul4(l: &HostLaunch<'_>) -> Result<()> {
    let part_size = l.uint(3)? * 4;
    mvmul(l, 1, l.size(0), l.size(1), part_size, dot4)
}

/// `matrixVectorMulParallel(m, v, columns, partSize, dest, local)` over `(vectors, rows, parts)`.
fn matrix_vector_mul_parallel(l: &HostLaunch<'_>) -> Result<()> {
    let part_size = l.uint(3)?;
    mvmul(l, l.size(0), l.size(1), l.size(2), part_size, dot)
}

/// `matrixVectorMul4Parallel(m, v, columns / 4, partSize / 4, dest, local)` over `(vectors, rows, parts)`.
fn matrix_vector_mul4_parallel(l: &HostLaunch<'_>) -> Result<()> {
    let part_size = l.uint(3)? * 4;
    mvmul(l, l.size(0), l.size(1), l.size(2), part_size, dot4)
}

/// `transposeMatrixVectorMulParallel(m, v, rows, dest)` over `(vectors, columns)`.
fn transpose_matrix_vector_mul_parallel(l: &HostLaunch<'_>) -> Result<()> {
    let vectors = l.size(0);
    let columns = l.size(1);
    let rows = l.uint(2)?;
    let m = l.read::<f32>(0, rows * columns)?;
    let v = l.read::<f32>(1, vectors * rows)?;
    l.update(3, vectors * columns, |dest: &mut [f32]| {
        dest.par_iter_mut().enumerate().for_each(|(i, d)| {
            let (k, c) = (i / columns, i % columns);
            let mut acc = 0.0f32;
            for r in 0..rows {
                acc += m[r * columns + c] * v[k * rows + r];
            }
            *d = acc;
        });
    })
}
