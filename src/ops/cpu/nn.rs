//! `nn` program: transfer functions, error criteria and gradients.

use rayon::prelude::*;

use super::{HostKernelFn, HostLaunch};
use crate::error::Result;

pub(super) const KERNELS: &[(&str, HostKernelFn)] = &[
    ("sigmoidPredict", sigmoid_predict as HostKernelFn),
    ("sigmoidFeedforward", sigmoid_feedforward as HostKernelFn),
    ("tanhPredict", tanh_predict as HostKernelFn),
    ("tanhFeedforward", tanh_feedforward as HostKernelFn),
    ("reluPredict", relu_predict as HostKernelFn),
    ("reluFeedforward", relu_feedforward as HostKernelFn),
    ("meanSquaredError", mean_squared_error as HostKernelFn),
    ("crossEntropyError", cross_entropy_error as HostKernelFn),
    ("computeMSELayerError", mse_layer_error as HostKernelFn),
    ("computeCrossEntropyLayerError", cross_entropy_layer_error as HostKernelFn),
    ("computeWeightGradient", weight_gradient as HostKernelFn),
    ("computeBiasGradient", bias_gradient as HostKernelFn),
    ("evaluateClassification", evaluate_classification as HostKernelFn),
];

/// Clamp keeping logarithms and divisions finite.
const EPSILON: f32 = 1e-7;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// `xxxPredict(x)`: applies `f` in place.
fn predict(l: &HostLaunch<'_>, f: impl Fn(f32) -> f32 + Sync + Send) -> Result<()> {
    let n = l.size(0);
    l.update(0, n, |x: &mut [f32]| x.par_iter_mut().for_each(|v| *v = f(*v)))
}

/// `xxxFeedforward(x, derivative)`: applies `f` in place and stores
/// `f'` expressed through the activation.
fn feedforward(
    l: &HostLaunch<'_>,
    f: impl Fn(f32) -> f32 + Sync + Send,
    derivative: impl Fn(f32, f32) -> f32 + Sync + Send,
) -> Result<()> {
    let n = l.size(0);
    let z = l.read::<f32>(0, n)?;
    let a: Vec<f32> = z.par_iter().map(|&v| f(v)).collect();
    l.update(1, n, |d: &mut [f32]| {
        d.par_iter_mut()
            .zip(z.par_iter().zip(a.par_iter()))
            .for_each(|(d, (&z, &a))| *d = derivative(z, a));
    })?;
    l.update(0, n, |x: &mut [f32]| x.copy_from_slice(&a))
}

fn sigmoid_predict(l: &HostLaunch<'_>) -> Result<()> {
    predict(l, sigmoid)
}

fn sigmoid_feedforward(l: &HostLaunch<'_>) -> Result<()> {
    feedforward(l, sigmoid, |_, a| a * (1.0 - a))
}

fn tanh_predict(l: &HostLaunch<'_>) -> Result<()> {
    predict(l, f32::tanh)
}

fn tanh_feedforward(l: &HostLaunch<'_>) -> Result<()> {
    feedforward(l, f32::tanh, |_, a| 1.0 - a * a)
}

fn relu_predict(l: &HostLaunch<'_>) -> Result<()> {
    predict(l, |x| x.max(0.0))
}

fn relu_feedforward(l: &HostLaunch<'_>) -> Result<()> {
    feedforward(l, |x| x.max(0.0), |z, _| if z > 0.0 { 1.0 } else { 0.0 })
}

/// `op(prediction, expected, target)` updating `target` in place.
fn accumulate(l: &HostLaunch<'_>, op: impl Fn(f32, f32, f32) -> f32 + Sync + Send) -> Result<()> {
    let n = l.size(0);
    let p = l.read::<f32>(0, n)?;
    let y = l.read::<f32>(1, n)?;
    l.update(2, n, |t: &mut [f32]| {
        t.par_iter_mut()
            .zip(p.par_iter().zip(y.par_iter()))
            .for_each(|(t, (&p, &y))| *t = op(p, y, *t));
    })
}

/// `meanSquaredError(p, y, acc)`: `acc += (y - p)^2`
fn mean_squared_error(l: &HostLaunch<'_>) -> Result<()> {
    accumulate(l, |p, y, acc| acc + (y - p) * (y - p))
}

/// `crossEntropyError(p, y, acc)`: `acc += -y ln p - (1 - y) ln (1 - p)`
fn cross_entropy_error(l: &HostLaunch<'_>) -> Result<()> {
    accumulate(l, |p, y, acc| {
        let p = p.clamp(EPSILON, 1.0 - EPSILON);
        acc - y * p.ln() - (1.0 - y) * (1.0 - p).ln()
    })
}

/// `computeMSELayerError(p, y, e)`: `e = (p - y) * e`
fn mse_layer_error(l: &HostLaunch<'_>) -> Result<()> {
    accumulate(l, |p, y, e| (p - y) * e)
}

/// `computeCrossEntropyLayerError(p, y, e)`: `e = (p - y) / (p (1 - p)) * e`
fn cross_entropy_layer_error(l: &HostLaunch<'_>) -> Result<()> {
    accumulate(l, |p, y, e| (p - y) / (p * (1.0 - p)).max(EPSILON) * e)
}

/// `computeWeightGradient(error, input, vectors, gradient)` over `(rows, columns)`.
fn weight_gradient(l: &HostLaunch<'_>) -> Result<()> {
    let rows = l.size(0);
    let columns = l.size(1);
    let vectors = l.uint(2)?;
    let error = l.read::<f32>(0, vectors * rows)?;
    let input = l.read::<f32>(1, vectors * columns)?;
    l.update(3, rows * columns, |g: &mut [f32]| {
        g.par_iter_mut().enumerate().for_each(|(i, g)| {
            let (r, c) = (i / columns, i % columns);
            let mut acc = *g;
            for k in 0..vectors {
                acc += error[k * rows + r] * input[k * columns + c];
            }
            *g = acc;
        });
    })
}

/// `computeBiasGradient(error, vectors, gradient)` over `rows`.
fn bias_gradient(l: &HostLaunch<'_>) -> Result<()> {
    let rows = l.size(0);
    let vectors = l.uint(1)?;
    let error = l.read::<f32>(0, vectors * rows)?;
    l.update(2, rows, |g: &mut [f32]| {
        g.par_iter_mut().enumerate().for_each(|(r, g)| {
            let mut acc = *g;
            for k in 0..vectors {
                acc += error[k * rows + r];
            }
            *g = acc;
        });
    })
}

/// `evaluateClassification(hypothesis, classes, labels: u16, result: u8, first)`
/// over the examples of one batch.
///
/// The predicted class is the first index holding the maximum activation.
fn evaluate_classification(l: &HostLaunch<'_>) -> Result<()> {
    let count = l.size(0);
    let classes = l.uint(1)?;
    let first = l.uint(4)?;
    let hypothesis = l.read::<f32>(0, count * classes)?;
    let labels = l.read::<u16>(2, first + count)?;
    l.update(3, first + count, |result: &mut [u8]| {
        result[first..]
            .par_iter_mut()
            .enumerate()
            .for_each(|(j, out)| {
                let scores = &hypothesis[j * classes..(j + 1) * classes];
                let mut best = 0;
                for (i, &s) in scores.iter().enumerate() {
                    if s > scores[best] {
                        best = i;
                    }
                }
                *out = u8::from(best == usize::from(labels[first + j]));
            });
    })
}
